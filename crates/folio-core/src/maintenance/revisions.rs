use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::lease::LeaseKeeper;
use super::report::{CleanupResult, RevisionCleanupReport};
use crate::content::ContentType;
use crate::retention::{self, RetentionPlan, RetentionPolicy};
use crate::storage::{Database, RevisionRepository};
use crate::Result;

/// Applies the retention policy to the revision history of every item
pub struct RevisionCleanupTask<'a> {
    db: &'a Database,
    policy: RetentionPolicy,
    batch_size: u32,
    lease: Option<&'a LeaseKeeper<'a>>,
}

impl<'a> RevisionCleanupTask<'a> {
    pub fn new(db: &'a Database, policy: RetentionPolicy, batch_size: u32) -> Self {
        Self {
            db,
            policy,
            batch_size: batch_size.max(1),
            lease: None,
        }
    }

    /// Renew `keeper` between pages and stop if it is lost
    pub fn with_lease(mut self, keeper: &'a LeaseKeeper<'a>) -> Self {
        self.lease = Some(keeper);
        self
    }

    /// Compute the plan for one item without deleting anything
    pub async fn preview(
        &self,
        content_type: ContentType,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RetentionPlan> {
        let stamps = RevisionRepository::new(self.db)
            .stamps(content_type, item_id)
            .await?;
        Ok(retention::plan(&stamps, &self.policy, now))
    }

    /// Thin one item's history. Returns the executed plan.
    pub async fn clean_item(
        &self,
        content_type: ContentType,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<RetentionPlan> {
        let plan = self.preview(content_type, item_id, now).await?;

        if !plan.delete.is_empty() {
            RevisionRepository::new(self.db)
                .delete_many(content_type, item_id, &plan.delete)
                .await?;
        }

        tracing::debug!(
            content_type = %content_type,
            item_id = %item_id,
            kept = plan.kept_count(),
            deleted = plan.delete.len(),
            "Applied revision retention"
        );

        Ok(plan)
    }

    /// Walk every item that has revisions, one page of ids at a time.
    ///
    /// A failure on one item is logged and counted; only a failure to list
    /// item ids or to keep the lease aborts the run.
    pub async fn run_for(
        &self,
        content_type: ContentType,
        now: DateTime<Utc>,
    ) -> Result<CleanupResult> {
        let repo = RevisionRepository::new(self.db);
        let mut result = CleanupResult::default();
        let mut cursor: Option<String> = None;

        loop {
            let page = repo
                .item_ids_page(content_type, cursor.as_deref(), self.batch_size)
                .await?;

            for raw in &page.malformed {
                result.processed += 1;
                result.failed += 1;
                tracing::warn!(
                    content_type = %content_type,
                    item_id = %raw,
                    "Malformed item id in revision history, skipping"
                );
            }

            for item_id in &page.items {
                result.processed += 1;
                match self.clean_item(content_type, *item_id, now).await {
                    Ok(plan) => {
                        result.kept += plan.kept_count() as u64;
                        result.deleted += plan.delete.len() as u64;
                    }
                    Err(e) => {
                        result.failed += 1;
                        tracing::warn!(
                            content_type = %content_type,
                            item_id = %item_id,
                            error = %e,
                            "Revision cleanup failed for item, skipping"
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

    pub async fn run(&self, now: DateTime<Utc>) -> Result<RevisionCleanupReport> {
        let mut report = RevisionCleanupReport::new(self.policy);

        for content_type in ContentType::ALL {
            let result = self.run_for(content_type, now).await?;
            tracing::debug!(
                content_type = %content_type,
                processed = result.processed,
                deleted = result.deleted,
                kept = result.kept,
                "Revision cleanup finished for content type"
            );
            report.record(content_type, result);
        }

        Ok(report)
    }
}
