//! Scheduled cleanup of revision history and trash.
//!
//! [`CleanupOrchestrator`] is the single entry point a scheduler calls. It
//! takes the `cleanup` lease so overlapping runs cannot race on the same rows,
//! renews it between pages, runs the revision and trash tasks for every
//! content type and reports the totals.

mod lease;
mod report;
mod revisions;
mod trash;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

pub use lease::LeaseKeeper;
pub use report::{
    CleanupReport, CleanupResult, RevisionCleanupReport, TrashCleanupReport, TrashResult,
};
pub use revisions::RevisionCleanupTask;
pub use trash::TrashCleanupTask;

use crate::config::AppConfig;
use crate::storage::{Database, LockRepository};
use crate::Result;

/// Name of the lease row guarding cleanup runs
pub const CLEANUP_LOCK: &str = "cleanup";

pub struct CleanupOrchestrator {
    db: Arc<Database>,
    config: Arc<AppConfig>,
}

impl CleanupOrchestrator {
    pub fn new(db: Arc<Database>, config: Arc<AppConfig>) -> Self {
        Self { db, config }
    }

    pub async fn run(&self) -> Result<CleanupReport> {
        self.run_at(Utc::now()).await
    }

    /// Run both cleanup tasks as of `now`
    pub async fn run_at(&self, now: DateTime<Utc>) -> Result<CleanupReport> {
        if !self.config.any_cleanup_enabled() {
            tracing::info!("Revision cleanup and trash purge are both disabled, nothing to do");
            return Ok(CleanupReport::idle(now, false));
        }

        let locks = LockRepository::new(&self.db);
        let ttl = Duration::seconds(self.config.maintenance.lock_ttl_secs as i64);
        let lease = match locks.try_acquire(CLEANUP_LOCK, ttl, now).await? {
            Some(lease) => lease,
            None => {
                tracing::warn!("Cleanup already running elsewhere, skipping this run");
                return Ok(CleanupReport::idle(now, true));
            }
        };

        let keeper = LeaseKeeper::new(&self.db, lease, ttl);
        let outcome = self.run_tasks(now, &keeper).await;

        match locks.release(keeper.lease()).await {
            Ok(true) => {}
            Ok(false) => tracing::warn!("Cleanup lock was already taken over at release"),
            Err(e) => tracing::warn!(error = %e, "Failed to release cleanup lock; it will expire"),
        }

        match outcome {
            Ok(report) => {
                tracing::info!("{}", report.summary_line());
                Ok(report)
            }
            Err(e) => {
                tracing::error!(error = %e, "Cleanup run aborted");
                Err(e)
            }
        }
    }

    async fn run_tasks(
        &self,
        now: DateTime<Utc>,
        keeper: &LeaseKeeper<'_>,
    ) -> Result<CleanupReport> {
        let batch_size = self.config.maintenance.batch_size;
        let mut report = CleanupReport::idle(now, false);

        if self.config.revisions.cleanup_enabled {
            let policy = self.config.revisions.policy();
            tracing::debug!(%policy, "Running revision cleanup");
            report.revisions = RevisionCleanupTask::new(&self.db, policy, batch_size)
                .with_lease(keeper)
                .run(now)
                .await?;
        }

        if self.config.trash.auto_delete_enabled {
            let retention_days = self.config.trash.retention_days;
            tracing::debug!(retention_days, "Running trash cleanup");
            keeper.renew().await?;
            report.trash = TrashCleanupTask::new(&self.db, retention_days, batch_size)
                .with_lease(keeper)
                .run(now)
                .await?;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentStatus, ContentType, NewContent, Revision};
    use crate::storage::{ContentRepository, RevisionRepository, TrashRepository};
    use uuid::Uuid;

    fn config(keep_recent: u32, keep_monthly: u32, keep_yearly: u32) -> AppConfig {
        let mut config = AppConfig::default();
        config.revisions.keep_recent = keep_recent;
        config.revisions.keep_monthly = keep_monthly;
        config.revisions.keep_yearly = keep_yearly;
        config.trash.retention_days = 30;
        config.maintenance.batch_size = 2;
        config
    }

    async fn create(db: &Database, content_type: ContentType, title: &str) -> Uuid {
        ContentRepository::new(db)
            .create(
                content_type,
                &NewContent {
                    title: title.to_string(),
                    content: String::new(),
                    slug: Some(title.to_lowercase()),
                    status: ContentStatus::Published,
                },
            )
            .await
            .unwrap()
            .id
    }

    /// Add `count` revisions dated one every `step_days` before `now`
    async fn backfill(
        db: &Database,
        content_type: ContentType,
        item_id: Uuid,
        count: i64,
        step_days: i64,
        now: DateTime<Utc>,
    ) {
        let repo = RevisionRepository::new(db);
        for k in 1..=count {
            repo.insert(
                content_type,
                &Revision {
                    id: Uuid::new_v4(),
                    item_id,
                    title: "t".to_string(),
                    content: format!("rev {}", k),
                    is_autosave: k % 3 == 0,
                    created_at: now - Duration::days(step_days * k),
                },
            )
            .await
            .unwrap();
        }
    }

    fn orchestrator(db: &Database, config: AppConfig) -> CleanupOrchestrator {
        CleanupOrchestrator::new(Arc::new(db.clone()), Arc::new(config))
    }

    #[tokio::test]
    async fn test_disabled_run_never_touches_the_store() {
        let db = Database::new_in_memory().await.unwrap();
        let mut config = config(5, 12, 3);
        config.revisions.cleanup_enabled = false;
        config.trash.auto_delete_enabled = false;

        // Any query against a closed pool fails, so success proves nothing was touched
        db.pool().close().await;

        let report = orchestrator(&db, config).run().await.unwrap();
        assert!(!report.skipped);
        assert!(!report.revisions.enabled);
        assert!(!report.trash.enabled);
        assert_eq!(report.revisions.total, CleanupResult::default());
    }

    #[tokio::test]
    async fn test_revision_cleanup_across_types_and_pages() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now();

        // Five items with batch_size 2 forces three pages of ids
        let mut items = Vec::new();
        for i in 0..3 {
            let id = create(&db, ContentType::Page, &format!("page{}", i)).await;
            backfill(&db, ContentType::Page, id, 20, 10, now).await;
            items.push((ContentType::Page, id));
        }
        for i in 0..2 {
            let id = create(&db, ContentType::BlogPost, &format!("post{}", i)).await;
            backfill(&db, ContentType::BlogPost, id, 2, 10, now).await;
            items.push((ContentType::BlogPost, id));
        }

        let report = orchestrator(&db, config(5, 6, 1)).run_at(now).await.unwrap();

        let pages = report.revisions.per_type[&ContentType::Page];
        assert_eq!(pages.processed, 3);
        assert_eq!(pages.failed, 0);
        assert_eq!(pages.kept + pages.deleted, 3 * 21);

        // Blog posts have three revisions each, under keep_recent
        let posts = report.revisions.per_type[&ContentType::BlogPost];
        assert_eq!(posts, CleanupResult { processed: 2, deleted: 0, kept: 6, failed: 0 });

        let repo = RevisionRepository::new(&db);
        for (content_type, id) in &items {
            let remaining = repo.count(*content_type, *id).await.unwrap() as u64;
            let expected = if *content_type == ContentType::Page { pages.kept / 3 } else { 3 };
            assert_eq!(remaining, expected);
        }

        // A second run with the same clock has nothing left to delete
        let again = orchestrator(&db, config(5, 6, 1)).run_at(now).await.unwrap();
        assert_eq!(again.revisions.total.deleted, 0);
        assert_eq!(again.revisions.total.kept, report.revisions.total.kept);
    }

    #[tokio::test]
    async fn test_trash_purge_paths_and_cascade() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now();
        let trash = TrashRepository::new(&db);
        let content = ContentRepository::new(&db);

        let aged = create(&db, ContentType::Page, "aged").await;
        let scheduled = create(&db, ContentType::BlogPost, "scheduled").await;
        let recent = create(&db, ContentType::Page, "recent").await;
        let live = create(&db, ContentType::Page, "live").await;

        content.set_meta(ContentType::Page, aged, "layout", "wide").await.unwrap();
        content.add_tags(scheduled, &["news".to_string()]).await.unwrap();

        trash
            .move_to_trash(ContentType::Page, aged, None, None, now - Duration::days(31))
            .await
            .unwrap();
        trash
            .move_to_trash(
                ContentType::BlogPost,
                scheduled,
                Some("admin"),
                Some(now - Duration::minutes(5)),
                now - Duration::days(1),
            )
            .await
            .unwrap();
        trash
            .move_to_trash(ContentType::Page, recent, None, None, now - Duration::days(3))
            .await
            .unwrap();

        let mut config = config(5, 12, 3);
        config.revisions.cleanup_enabled = false;
        let report = orchestrator(&db, config).run_at(now).await.unwrap();

        assert!(!report.revisions.enabled);
        assert_eq!(report.trash.retention_days, Some(30));
        assert_eq!(report.trash.per_type[&ContentType::Page].deleted, 1);
        assert_eq!(report.trash.per_type[&ContentType::BlogPost].deleted, 1);
        assert_eq!(report.trash.total, TrashResult { found: 2, deleted: 2, failed: 0 });

        for (content_type, id) in [(ContentType::Page, aged), (ContentType::BlogPost, scheduled)] {
            let counts = content.dependent_rows(content_type, id).await.unwrap();
            assert!(counts.iter().all(|(_, n)| *n == 0), "{:?}", counts);
        }
        assert!(trash.find(ContentType::Page, recent).await.unwrap().is_some());
        assert!(content.find_by_id(ContentType::Page, live).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_failed_purge_is_isolated_and_atomic() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now();
        let trash = TrashRepository::new(&db);
        let content = ContentRepository::new(&db);

        let blocked = create(&db, ContentType::Page, "blocked").await;
        let free = create(&db, ContentType::Page, "free").await;
        for id in [blocked, free] {
            trash
                .move_to_trash(ContentType::Page, id, None, None, now - Duration::days(90))
                .await
                .unwrap();
        }

        // A table outside the cascade still references one page, so its final delete fails
        sqlx::query("CREATE TABLE page_comments (page_id TEXT NOT NULL REFERENCES pages(id))")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO page_comments (page_id) VALUES (?)")
            .bind(blocked.to_string())
            .execute(db.pool())
            .await
            .unwrap();

        let mut config = config(5, 12, 3);
        config.revisions.cleanup_enabled = false;
        let report = orchestrator(&db, config).run_at(now).await.unwrap();

        assert_eq!(report.trash.total, TrashResult { found: 2, deleted: 1, failed: 1 });

        // The failed item was rolled back as a whole
        let counts = content.dependent_rows(ContentType::Page, blocked).await.unwrap();
        assert!(counts.contains(&("pages", 1)));
        assert!(counts.contains(&("page_revisions", 1)));
        assert!(counts.contains(&("page_trash", 1)));
        assert!(counts.contains(&("slugs", 1)));

        assert!(content.find_by_id(ContentType::Page, free).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_run_skipped_while_lock_held() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now();
        let id = create(&db, ContentType::Page, "busy").await;
        backfill(&db, ContentType::Page, id, 30, 40, now).await;

        let locks = LockRepository::new(&db);
        let lease = locks
            .try_acquire(CLEANUP_LOCK, Duration::minutes(30), now)
            .await
            .unwrap()
            .unwrap();

        let report = orchestrator(&db, config(1, 0, 0)).run_at(now).await.unwrap();
        assert!(report.skipped);
        assert_eq!(
            RevisionRepository::new(&db).count(ContentType::Page, id).await.unwrap(),
            31
        );

        locks.release(&lease).await.unwrap();
        let report = orchestrator(&db, config(1, 0, 0)).run_at(now).await.unwrap();
        assert!(!report.skipped);
        assert!(report.revisions.total.deleted > 0);

        // The run released its own lease
        assert!(locks.current(CLEANUP_LOCK).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_revision_delete_is_isolated() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now();

        let mut ids = Vec::new();
        for i in 0..3 {
            let id = create(&db, ContentType::Page, &format!("page{}", i)).await;
            backfill(&db, ContentType::Page, id, 20, 10, now).await;
            ids.push(id);
        }
        let blocked = ids[1];

        sqlx::query(&format!(
            "CREATE TRIGGER block_rev BEFORE DELETE ON page_revisions \
             WHEN old.item_id = '{}' BEGIN SELECT RAISE(ABORT, 'blocked'); END",
            blocked
        ))
        .execute(db.pool())
        .await
        .unwrap();

        let mut config = config(1, 0, 0);
        config.trash.auto_delete_enabled = false;
        let report = orchestrator(&db, config).run_at(now).await.unwrap();

        let pages = report.revisions.per_type[&ContentType::Page];
        assert_eq!(pages.processed, 3);
        assert_eq!(pages.failed, 1);
        assert_eq!(pages.deleted, 2 * 20);

        let repo = RevisionRepository::new(&db);
        for id in &ids {
            let remaining = repo.count(ContentType::Page, *id).await.unwrap();
            if *id == blocked {
                assert_eq!(remaining, 21);
            } else {
                assert_eq!(remaining, 1);
            }
        }
    }

    #[tokio::test]
    async fn test_revision_walk_stops_when_lease_is_taken_over() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now();

        let mut ids = Vec::new();
        for i in 0..3 {
            let id = create(&db, ContentType::Page, &format!("page{}", i)).await;
            backfill(&db, ContentType::Page, id, 5, 10, now).await;
            ids.push(id);
        }

        let locks = LockRepository::new(&db);
        let ttl = Duration::minutes(1);
        let lease = locks
            .try_acquire(CLEANUP_LOCK, ttl, now - Duration::minutes(10))
            .await
            .unwrap()
            .unwrap();
        let keeper = LeaseKeeper::new(&db, lease, ttl);

        // The first lease has lapsed, so another run takes it over
        let other = locks
            .try_acquire(CLEANUP_LOCK, Duration::minutes(30), now)
            .await
            .unwrap()
            .unwrap();

        let task = RevisionCleanupTask::new(&db, config(1, 0, 0).revisions.policy(), 1)
            .with_lease(&keeper);
        let err = task.run_for(ContentType::Page, now).await.unwrap_err();
        assert!(matches!(err, crate::Error::LockLost(ref name) if name == CLEANUP_LOCK));

        // Only the first page of ids was thinned before the walk stopped
        let repo = RevisionRepository::new(&db);
        let mut thinned = 0;
        for id in &ids {
            match repo.count(ContentType::Page, *id).await.unwrap() {
                1 => thinned += 1,
                n => assert_eq!(n, 6),
            }
        }
        assert_eq!(thinned, 1);

        // The new holder keeps its lease
        let current = locks.current(CLEANUP_LOCK).await.unwrap().unwrap();
        assert_eq!(current.holder, other.holder);
    }

    #[tokio::test]
    async fn test_purge_leaving_item_row_counts_as_failed() {
        let db = Database::new_in_memory().await.unwrap();
        let now = Utc::now();
        let id = create(&db, ContentType::BlogPost, "sticky").await;
        TrashRepository::new(&db)
            .move_to_trash(ContentType::BlogPost, id, None, None, now - Duration::days(90))
            .await
            .unwrap();

        sqlx::query(
            "CREATE TRIGGER keep_post BEFORE DELETE ON blog_posts \
             BEGIN SELECT RAISE(IGNORE); END",
        )
        .execute(db.pool())
        .await
        .unwrap();

        let mut config = config(5, 12, 3);
        config.revisions.cleanup_enabled = false;
        let report = orchestrator(&db, config).run_at(now).await.unwrap();

        assert_eq!(report.trash.total, TrashResult { found: 1, deleted: 0, failed: 1 });
        assert!(TrashRepository::new(&db)
            .find(ContentType::BlogPost, id)
            .await
            .unwrap()
            .is_some());
    }
}
