use chrono::{DateTime, Utc};

use super::lease::LeaseKeeper;
use super::report::{TrashCleanupReport, TrashResult};
use crate::content::ContentType;
use crate::storage::{Database, TrashRepository};
use crate::Result;

/// Purges trash entries whose scheduled delete or retention window has passed
pub struct TrashCleanupTask<'a> {
    db: &'a Database,
    retention_days: u32,
    batch_size: u32,
    lease: Option<&'a LeaseKeeper<'a>>,
}

impl<'a> TrashCleanupTask<'a> {
    pub fn new(db: &'a Database, retention_days: u32, batch_size: u32) -> Self {
        Self {
            db,
            retention_days,
            batch_size: batch_size.max(1),
            lease: None,
        }
    }

    /// Renew `keeper` between pages and stop if it is lost
    pub fn with_lease(mut self, keeper: &'a LeaseKeeper<'a>) -> Self {
        self.lease = Some(keeper);
        self
    }

    pub async fn run_for(
        &self,
        content_type: ContentType,
        now: DateTime<Utc>,
    ) -> Result<TrashResult> {
        let repo = TrashRepository::new(self.db);
        let mut result = TrashResult::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = repo
                .expired_candidates(
                    content_type,
                    self.retention_days,
                    now,
                    cursor.as_deref(),
                    self.batch_size,
                )
                .await?;

            for raw in &page.malformed {
                result.found += 1;
                result.failed += 1;
                tracing::warn!(
                    content_type = %content_type,
                    item_id = %raw,
                    "Malformed item id in trash, skipping"
                );
            }

            for entry in &page.items {
                if !entry.is_expired(self.retention_days, now) {
                    continue;
                }
                result.found += 1;

                match repo.purge(content_type, entry.item_id).await {
                    Ok(removed) => {
                        result.deleted += 1;
                        tracing::debug!(
                            content_type = %content_type,
                            item_id = %entry.item_id,
                            removed,
                            "Purged expired trash entry"
                        );
                    }
                    Err(e) => {
                        result.failed += 1;
                        tracing::warn!(
                            content_type = %content_type,
                            item_id = %entry.item_id,
                            error = %e,
                            "Failed to purge trash entry, skipping"
                        );
                    }
                }
            }

            if page.is_final(self.batch_size) {
                break;
            }
            cursor = page.last;

            if let Some(keeper) = self.lease {
                keeper.renew().await?;
            }
        }

        Ok(result)
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<TrashCleanupReport> {
        let mut report = TrashCleanupReport::new(self.retention_days);

        for content_type in ContentType::ALL {
            let result = self.run_for(content_type, now).await?;
            report.record(content_type, result);
        }

        Ok(report)
    }
}
