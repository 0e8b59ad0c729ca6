//! The engine facade: owns the listener table and the job queue, drives the
//! tick loop, and exposes the operations the administrative collaborator
//! may invoke (force-check, actualize, job state, shutdown).

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::PoisonError;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use sigwatch_core::{Result, SigwatchConfig, SigwatchError};
use sigwatch_sources::{CronSchedule, Listener, resolve_timezone};
use sigwatch_store::Storage;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::jobs::{Job, JobKind, JobQueue};
use crate::transport::Transport;

/// One pending job in a [`Engine::job_state`] snapshot.
#[derive(Debug, Clone)]
pub struct JobState {
    pub name: String,
    pub due: DateTime<Utc>,
}

/// The listener scheduling and delivery engine.
///
/// The listener table maps definition ids to live runtime listeners. It is
/// mutated only by the actualizer; the dispatcher reads it. Each listener
/// sits behind its own mutex so a reconciliation hand-off and an in-flight
/// check on the same listener are serialized.
pub struct Engine {
    pub(crate) config: SigwatchConfig,
    pub(crate) tz: Tz,
    pub(crate) storage: Arc<dyn Storage>,
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) jobs: JobQueue,
    pub(crate) listeners: Mutex<HashMap<i64, Arc<Mutex<Listener>>>>,
    pub(crate) actualizer_cron: Mutex<CronSchedule>,
    pub(crate) developers: StdMutex<Vec<i64>>,
    /// Force-check jobs currently executing (already taken off the queue).
    pub(crate) checkers_inflight: AtomicUsize,
    stopped: AtomicBool,
}

impl Engine {
    pub fn new(
        config: SigwatchConfig,
        storage: Arc<dyn Storage>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        let tz = resolve_timezone(&config.timezone);
        let actualizer_cron = CronSchedule::new(&config.timeout.actualizer_cron, tz)
            .map_err(|e| SigwatchError::Config(format!("Bad actualizer cron: {e}")))?;
        Ok(Self {
            config,
            tz,
            storage,
            transport,
            jobs: JobQueue::new(),
            listeners: Mutex::new(HashMap::new()),
            actualizer_cron: Mutex::new(actualizer_cron),
            developers: StdMutex::new(Vec::new()),
            checkers_inflight: AtomicUsize::new(0),
            stopped: AtomicBool::new(false),
        })
    }

    /// Drive the engine until shutdown: an initial reconciliation pass,
    /// then a 1-second tick taking due jobs and spawning one task per job
    /// so a slow delivery never delays other listeners' due times.
    pub async fn run(self: Arc<Self>) {
        tracing::info!("⏰ Engine started (timezone {})", self.tz);
        if let Err(e) = self.actualize().await {
            tracing::error!("Initial reconciliation failed: {e}");
        }

        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            interval.tick().await;
            if self.stopped.load(Ordering::SeqCst) {
                break;
            }
            for job in self.jobs.take_due(Utc::now()) {
                // Counted before the task starts so a force-check poll never
                // sees the job gone from the queue but not yet in flight.
                if job.kind == JobKind::Checker {
                    self.checkers_inflight.fetch_add(1, Ordering::SeqCst);
                }
                let engine = Arc::clone(&self);
                tokio::spawn(async move { engine.handle_job(job).await });
            }
        }

        self.close_all().await;
        tracing::info!("👋 Engine stopped");
    }

    async fn handle_job(self: Arc<Self>, job: Job) {
        match job.kind {
            JobKind::Actualizer => {
                if let Err(e) = self.actualize().await {
                    tracing::error!("Reconciliation pass failed: {e}");
                }
            }
            JobKind::Listener => self.run_check_job(&job).await,
            JobKind::Checker => {
                self.run_check_job(&job).await;
                self.checkers_inflight.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    /// Immediately check the given listeners (all live ones when `ids` is
    /// `None`) and block until the one-shots have drained, bounded by the
    /// common timeout.
    pub async fn force_check(
        &self,
        ids: Option<&HashSet<i64>>,
        caller: Option<i64>,
    ) -> Result<()> {
        {
            let table = self.listeners.lock().await;
            for id in table.keys() {
                if ids.is_none_or(|wanted| wanted.contains(id)) {
                    self.jobs.schedule(Job::checker(*id, caller));
                }
            }
        }
        let budget = Duration::from_secs(self.config.timeout.common);
        let started = Instant::now();
        while self.jobs.has(JobKind::Checker) || self.checkers_inflight.load(Ordering::SeqCst) > 0
        {
            if started.elapsed() > budget {
                return Err(SigwatchError::Timeout(budget));
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    }

    /// Snapshot of pending jobs plus the live listener count.
    pub async fn job_state(&self) -> (Vec<JobState>, usize) {
        let table = self.listeners.lock().await;
        let states = self
            .jobs
            .snapshot()
            .into_iter()
            .map(|job| {
                let name = match job.listener_id {
                    Some(id) => match table.get(&id).and_then(|cell| cell.try_lock().ok()) {
                        Some(listener) => {
                            format!("{} '{}' [{id}]", job.kind.label(), listener.name)
                        }
                        None => format!("{} [{id}]", job.kind.label()),
                    },
                    None => job.kind.label().to_string(),
                };
                JobState { name, due: job.due }
            })
            .collect();
        (states, table.len())
    }

    /// Request shutdown after the configured close delay. The only way the
    /// engine terminates.
    pub async fn shutdown(&self) {
        tracing::info!(
            "🛑 Shutdown requested, stopping in {}s",
            self.config.timeout.close
        );
        tokio::time::sleep(Duration::from_secs(self.config.timeout.close)).await;
        self.stopped.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    async fn close_all(&self) {
        self.jobs.clear();
        let mut table = self.listeners.lock().await;
        for (_, cell) in table.drain() {
            cell.lock().await.close();
        }
    }

    pub(crate) fn developer_chats(&self) -> Vec<i64> {
        self.developers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.config.timeout.retry_interval)
    }

    pub(crate) fn lifetime(&self) -> Duration {
        Duration::from_secs(self.config.timeout.lifetime)
    }

    pub(crate) fn common_timeout(&self) -> Duration {
        Duration::from_secs(self.config.timeout.common)
    }
}
