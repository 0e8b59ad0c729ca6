//! Dispatch: run a due listener's check, resolve its subscribers, deliver,
//! and escalate failures to the developer audience.

use std::sync::Arc;

use sigwatch_core::SigwatchError;
use sigwatch_sources::Listener;
use tokio::sync::Mutex;

use crate::delivery::fan_out;
use crate::engine::Engine;
use crate::jobs::{Job, JobKind};

impl Engine {
    /// Resolve a fired job's listener and run the check. A job whose
    /// listener was retired between scheduling and firing is dropped.
    pub(crate) async fn run_check_job(self: &Arc<Self>, job: &Job) {
        let Some(id) = job.listener_id else { return };
        let cell = self.listeners.lock().await.get(&id).cloned();
        let Some(cell) = cell else {
            tracing::warn!("⚠️ Job for unknown listener [{id}] dropped");
            return;
        };
        self.run_check(cell, job.kind == JobKind::Listener, job.caller_chat)
            .await;
    }

    /// Check one listener and deliver its findings.
    ///
    /// Rescheduling happens whether the check succeeded or failed, so a
    /// single failing listener never stops being polled; force-checks
    /// (`reschedule == false`) leave the cron-driven job alone.
    pub(crate) async fn run_check(
        &self,
        cell: Arc<Mutex<Listener>>,
        reschedule: bool,
        caller: Option<i64>,
    ) {
        let mut listener = cell.lock().await;
        let (id, name) = (listener.id, listener.name.clone());
        tracing::debug!(
            "🔎 Checking listener '{}' [{}] since {}",
            name,
            id,
            listener.checkpoint()
        );
        let result = listener.check();

        if reschedule
            && let Some(when) = listener.next_due()
            && !self.jobs.has_listener_job(id)
        {
            self.jobs.schedule(Job::listener(id, when));
            tracing::info!("📅 Job listener '{}' [{}] scheduled @ {}", name, id, when);
        }
        drop(listener);

        match result {
            Ok(messages) if messages.is_empty() => {
                tracing::info!("Listener '{}' [{}] has no updates", name, id);
            }
            Ok(messages) => match self.storage.subscribers(id, true) {
                Ok(subscribers) => {
                    tracing::info!(
                        "📣 Listener '{}' [{}]: {} message(s) for {} subscriber(s)",
                        name,
                        id,
                        messages.len(),
                        subscribers.len()
                    );
                    fan_out(
                        Arc::clone(&self.transport),
                        subscribers,
                        Arc::new(messages),
                        self.retry_interval(),
                        self.lifetime(),
                        self.common_timeout(),
                    )
                    .await;
                }
                Err(e) => {
                    tracing::error!("Subscriber resolution for [{id}] failed: {e}");
                    self.escalate_degraded().await;
                }
            },
            Err(e) => {
                let error = SigwatchError::check_failed(id, &name, caller, e);
                tracing::error!("{error}");
                self.escalate_check_failure(&error).await;
            }
        }
    }

    /// Notify the developer audience (plus the force-check caller, if any)
    /// that a listener's check raised.
    pub(crate) async fn escalate_check_failure(&self, error: &SigwatchError) {
        let caller = match error {
            SigwatchError::Check { caller, .. } => *caller,
            _ => None,
        };
        let mut audience = self.developer_chats();
        if let Some(chat_id) = caller
            && !audience.contains(&chat_id)
        {
            audience.push(chat_id);
        }
        fan_out(
            Arc::clone(&self.transport),
            audience,
            Arc::new(vec![format!("❗ {error}")]),
            self.retry_interval(),
            self.lifetime(),
            self.common_timeout(),
        )
        .await;
    }

    /// Generic "service degraded" notice for persistence failures.
    pub(crate) async fn escalate_degraded(&self) {
        fan_out(
            Arc::clone(&self.transport),
            self.developer_chats(),
            Arc::new(vec![
                "🤒 Service degraded: storage is unavailable. Check the log please.".to_string(),
            ]),
            self.retry_interval(),
            self.lifetime(),
            self.common_timeout(),
        )
        .await;
    }
}
