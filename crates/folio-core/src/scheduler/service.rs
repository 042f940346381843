use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::AppConfig;
use crate::maintenance::{CleanupOrchestrator, CleanupReport};
use crate::storage::Database;
use crate::Result;

/// Events emitted by the scheduler after each run
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A cleanup run completed
    CleanupFinished { report: CleanupReport },
    /// Another process held the cleanup lock
    CleanupSkipped,
    /// A run aborted before finishing
    Error { task: String, message: String },
}

/// Background scheduler that runs the cleanup orchestrator on a fixed interval
pub struct SchedulerService {
    config: Arc<AppConfig>,
    orchestrator: CleanupOrchestrator,
    event_tx: Option<mpsc::UnboundedSender<SchedulerEvent>>,
}

impl SchedulerService {
    pub fn new(db: Arc<Database>, config: Arc<AppConfig>) -> Self {
        Self {
            orchestrator: CleanupOrchestrator::new(db, Arc::clone(&config)),
            config,
            event_tx: None,
        }
    }

    /// Set the event sender for run notifications
    pub fn with_event_sender(mut self, tx: mpsc::UnboundedSender<SchedulerEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    fn send_event(&self, event: SchedulerEvent) {
        if let Some(ref tx) = self.event_tx {
            if tx.send(event).is_err() {
                warn!("Failed to send scheduler event: receiver dropped");
            }
        }
    }

    /// Run cleanup periodically until the shutdown signal flips to true
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let interval_secs = self.config.maintenance.interval_secs.max(1);
        info!(
            interval_secs,
            revisions = self.config.revisions.cleanup_enabled,
            trash = self.config.trash.auto_delete_enabled,
            "Scheduler started"
        );

        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        // Skip the first tick (fires immediately)
        interval.tick().await;

        loop {
            tokio::select! {
                result = shutdown.changed() => {
                    if result.is_err() || *shutdown.borrow() {
                        info!("Scheduler received shutdown signal");
                        break;
                    }
                }

                _ = interval.tick() => {
                    debug!("Running scheduled cleanup");
                    if let Err(e) = self.run_now().await {
                        error!("Scheduled cleanup failed: {}", e);
                    }
                }
            }
        }

        info!("Scheduler stopped");
    }

    /// Run a single cleanup immediately and report it to listeners
    pub async fn run_now(&self) -> Result<CleanupReport> {
        match self.orchestrator.run().await {
            Ok(report) if report.skipped => {
                self.send_event(SchedulerEvent::CleanupSkipped);
                Ok(report)
            }
            Ok(report) => {
                self.send_event(SchedulerEvent::CleanupFinished {
                    report: report.clone(),
                });
                Ok(report)
            }
            Err(e) => {
                self.send_event(SchedulerEvent::Error {
                    task: "cleanup".to_string(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentStatus, ContentType, NewContent};
    use crate::storage::{ContentRepository, TrashRepository};
    use chrono::Utc;
    use tokio::time::timeout;

    fn config(interval_secs: u64) -> Arc<AppConfig> {
        let mut config = AppConfig::default();
        config.maintenance.interval_secs = interval_secs;
        Arc::new(config)
    }

    #[tokio::test]
    async fn test_run_now_emits_report() {
        let db = Arc::new(Database::new_in_memory().await.unwrap());
        let item = ContentRepository::new(&db)
            .create(
                ContentType::Page,
                &NewContent {
                    title: "Old".to_string(),
                    content: String::new(),
                    slug: None,
                    status: ContentStatus::Draft,
                },
            )
            .await
            .unwrap();
        TrashRepository::new(&db)
            .move_to_trash(
                ContentType::Page,
                item.id,
                None,
                None,
                Utc::now() - chrono::Duration::days(60),
            )
            .await
            .unwrap();

        let (tx, mut rx) = mpsc::unbounded_channel();
        let scheduler = SchedulerService::new(db, config(3600)).with_event_sender(tx);

        let report = scheduler.run_now().await.unwrap();
        assert_eq!(report.trash.total.deleted, 1);

        match rx.recv().await {
            Some(SchedulerEvent::CleanupFinished { report }) => {
                assert_eq!(report.trash.total.deleted, 1)
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scheduled_tick_and_shutdown() {
        let db = Arc::new(Database::new_in_memory().await.unwrap());
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let scheduler = SchedulerService::new(db, config(1)).with_event_sender(tx);
        let handle = tokio::spawn(scheduler.run(shutdown_rx));

        let event = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("scheduler never ticked");
        assert!(matches!(event, Some(SchedulerEvent::CleanupFinished { .. })));

        shutdown_tx.send(true).unwrap();
        let stopped = timeout(Duration::from_secs(5), handle).await;
        assert!(stopped.is_ok());
    }
}
