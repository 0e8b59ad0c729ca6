//! Reconciliation: keep the live listener table and the job queue in sync
//! with the persisted definitions, without losing incremental checkpoints.

use std::sync::Arc;
use std::sync::PoisonError;

use chrono::Utc;
use sigwatch_core::Result;
use sigwatch_sources::Listener;
use sigwatch_store::role;
use tokio::sync::Mutex;

use crate::engine::Engine;
use crate::jobs::{Job, JobKind};

impl Engine {
    /// One reconciliation pass. Runs at process start, on the actualizer
    /// cron, on administrative request, and as retry after its own failure.
    ///
    /// Re-arms itself before anything else so a failed definitions read can
    /// never stall the loop; a failed pass aborts (escalated as a degraded
    /// notice) and the retry-interval re-arm picks it up again.
    pub async fn actualize(self: &Arc<Self>) -> Result<()> {
        tracing::debug!("♻️ Reconciling listeners against definitions");
        let defs = self.storage.listeners(true);

        let next = match &defs {
            Ok(_) => self
                .actualizer_cron
                .lock()
                .await
                .next_t()
                .map(|(_, when)| when),
            Err(_) => Some(
                Utc::now() + chrono::Duration::seconds(self.config.timeout.retry_interval as i64),
            ),
        };
        if let Some(when) = next
            && !self.jobs.has(JobKind::Actualizer)
        {
            self.jobs.schedule(Job::actualizer(when));
            tracing::info!("📅 Job actualizer scheduled @ {}", when);
        }

        let defs = match defs {
            Ok(defs) => defs,
            Err(e) => {
                tracing::error!("Listener definitions read failed: {e}");
                self.escalate_degraded().await;
                return Err(e);
            }
        };

        self.refresh_developers();

        // Pending listener-check jobs are recomputed from the fresh
        // definitions; force-check one-shots in flight are independent.
        self.jobs.cancel(JobKind::Listener);

        let mut table = self.listeners.lock().await;
        let mut previous = std::mem::take(&mut *table);

        for def in defs {
            let listener = match Listener::from_definition(
                def.listener_id,
                &def.name,
                &def.kind,
                &def.parameters,
                &def.cron,
                self.tz,
            ) {
                Ok(listener) => listener,
                Err(e) => {
                    tracing::error!(
                        "Listener '{}' [{}] construction failed: {e}",
                        def.name,
                        def.listener_id
                    );
                    continue;
                }
            };
            let cell = Arc::new(Mutex::new(listener));

            if let Some(old_cell) = previous.remove(&def.listener_id) {
                // Locking the old instance serializes the hand-off against
                // an in-flight check on it.
                let mut old = old_cell.lock().await;
                let mut new = cell.lock().await;
                if new.inherit(&old) {
                    tracing::info!(
                        "🧬 Listener '{}' [{}] inherited state",
                        new.name,
                        new.id
                    );
                    old.close();
                } else {
                    // Driver kind changed: flush the old instance once
                    // before discarding it, best effort.
                    drop(new);
                    drop(old);
                    tracing::info!(
                        "🔁 Listener '{}' [{}] changed kind, final flush scheduled",
                        def.name,
                        def.listener_id
                    );
                    let engine = Arc::clone(self);
                    tokio::spawn(async move {
                        engine.run_check(Arc::clone(&old_cell), false, None).await;
                        old_cell.lock().await.close();
                    });
                }
            }

            let when = cell.lock().await.next_due();
            table.insert(def.listener_id, cell);
            if let Some(when) = when {
                self.jobs.schedule(Job::listener(def.listener_id, when));
                tracing::info!(
                    "📅 Job listener '{}' [{}] scheduled @ {}",
                    def.name,
                    def.listener_id,
                    when
                );
            }
        }

        // Whatever is left was retired or deactivated.
        for (id, cell) in previous {
            let mut listener = cell.lock().await;
            listener.close();
            tracing::info!("🗑️ Listener '{}' [{}] retired", listener.name, id);
        }

        Ok(())
    }

    /// Recompute the escalation audience: active private chats carrying the
    /// developer role. A failed read keeps the previous audience.
    fn refresh_developers(&self) {
        match self.storage.chats(true, true) {
            Ok(chats) => {
                let devs: Vec<i64> = chats
                    .iter()
                    .filter(|chat| chat.has_role(role::DEVELOPER))
                    .map(|chat| chat.chat_id)
                    .collect();
                *self
                    .developers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = devs;
            }
            Err(e) => tracing::warn!("⚠️ Developer audience refresh failed: {e}"),
        }
    }
}
