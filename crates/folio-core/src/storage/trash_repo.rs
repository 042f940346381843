use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::content_repo::not_found;
use super::retry::with_retry;
use super::{parse_id, ContentRepository, Database, Page};
use crate::content::{ContentItem, ContentTables, ContentType, TrashEntry};
use crate::{Error, Result};

/// Repository for the soft-delete lifecycle: trash, restore and purge
pub struct TrashRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct TrashRow {
    item_id: String,
    title: String,
    deleted_at: DateTime<Utc>,
    deleted_by: Option<String>,
    scheduled_permanent_delete_at: Option<DateTime<Utc>>,
}

impl TrashRow {
    fn into_entry(self, content_type: ContentType) -> Result<TrashEntry> {
        Ok(TrashEntry {
            item_id: parse_id(&self.item_id)?,
            content_type,
            title: self.title,
            deleted_at: self.deleted_at,
            deleted_by: self.deleted_by,
            scheduled_permanent_delete_at: self.scheduled_permanent_delete_at,
        })
    }
}

fn select_entries(tables: &ContentTables) -> String {
    format!(
        "SELECT t.item_id, i.title, t.deleted_at, t.deleted_by, t.scheduled_permanent_delete_at \
         FROM {} t JOIN {} i ON i.id = t.item_id",
        tables.trash, tables.items
    )
}

/// Delete an item and every row that references it, children first.
///
/// Runs in one transaction: the item is either fully purged or left intact.
/// If the item row itself is not removed the whole purge rolls back with
/// `RowNotFound`.
async fn purge_cascade(
    pool: &sqlx::SqlitePool,
    content_type: ContentType,
    item_id: &str,
) -> std::result::Result<u64, sqlx::Error> {
    let tables = content_type.tables();
    let mut tx = pool.begin().await?;
    let mut removed = 0;

    let children = [
        Some(tables.revisions),
        Some(tables.trash),
        Some(tables.translations),
        Some(tables.meta),
        tables.categories,
        tables.tags,
    ];
    for table in children.into_iter().flatten() {
        let sql = format!("DELETE FROM {} WHERE item_id = ?", table);
        removed += sqlx::query(&sql)
            .bind(item_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
    }

    removed += sqlx::query("DELETE FROM slugs WHERE module = ? AND reference_id = ?")
        .bind(tables.slug_module)
        .bind(item_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

    let sql = format!("DELETE FROM {} WHERE id = ?", tables.items);
    let item_rows = sqlx::query(&sql)
        .bind(item_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();
    if item_rows == 0 {
        return Err(sqlx::Error::RowNotFound);
    }
    removed += item_rows;

    tx.commit().await?;
    Ok(removed)
}

impl<'a> TrashRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Soft-delete an item.
    ///
    /// `purge_at` requests a permanent delete sooner than the retention
    /// window would allow; whichever comes first wins.
    pub async fn move_to_trash(
        &self,
        content_type: ContentType,
        id: Uuid,
        deleted_by: Option<&str>,
        purge_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<TrashEntry> {
        let tables = content_type.tables();
        let item = ContentRepository::new(self.db).get(content_type, id).await?;
        if item.is_trashed() {
            return Err(Error::InvalidTransition {
                action: "trash",
                content_type: content_type.to_string(),
                id: id.to_string(),
                state: "already in the trash",
            });
        }

        let mut tx = self.db.pool().begin().await?;

        let sql = format!(
            "UPDATE {} SET deleted_at = ?, updated_at = ? WHERE id = ?",
            tables.items
        );
        sqlx::query(&sql)
            .bind(now)
            .bind(now)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        let sql = format!(
            "INSERT INTO {} (item_id, deleted_at, deleted_by, scheduled_permanent_delete_at) \
             VALUES (?, ?, ?, ?)",
            tables.trash
        );
        sqlx::query(&sql)
            .bind(id.to_string())
            .bind(now)
            .bind(deleted_by)
            .bind(purge_at)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(content_type = %content_type, item_id = %id, "Moved to trash");

        Ok(TrashEntry {
            item_id: id,
            content_type,
            title: item.title,
            deleted_at: now,
            deleted_by: deleted_by.map(str::to_string),
            scheduled_permanent_delete_at: purge_at,
        })
    }

    /// Take an item out of the trash. Only the soft-delete markers change.
    pub async fn restore(&self, content_type: ContentType, id: Uuid) -> Result<ContentItem> {
        let tables = content_type.tables();
        let content_repo = ContentRepository::new(self.db);
        let item = content_repo.get(content_type, id).await?;
        if !item.is_trashed() {
            return Err(Error::InvalidTransition {
                action: "restore",
                content_type: content_type.to_string(),
                id: id.to_string(),
                state: "not in the trash",
            });
        }

        let mut tx = self.db.pool().begin().await?;

        let sql = format!(
            "UPDATE {} SET deleted_at = NULL, updated_at = ? WHERE id = ?",
            tables.items
        );
        sqlx::query(&sql)
            .bind(Utc::now())
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        let sql = format!("DELETE FROM {} WHERE item_id = ?", tables.trash);
        sqlx::query(&sql)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        tracing::info!(content_type = %content_type, item_id = %id, "Restored from trash");

        content_repo.get(content_type, id).await
    }

    /// Trash entries of one type, most recently deleted first
    pub async fn list(&self, content_type: ContentType) -> Result<Vec<TrashEntry>> {
        let sql = format!(
            "{} ORDER BY t.deleted_at DESC",
            select_entries(content_type.tables())
        );
        let rows: Vec<TrashRow> = sqlx::query_as(&sql).fetch_all(self.db.pool()).await?;

        rows.into_iter().map(|r| r.into_entry(content_type)).collect()
    }

    pub async fn find(&self, content_type: ContentType, id: Uuid) -> Result<Option<TrashEntry>> {
        let sql = format!("{} WHERE t.item_id = ?", select_entries(content_type.tables()));
        let row: Option<TrashRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;

        row.map(|r| r.into_entry(content_type)).transpose()
    }

    /// One page of entries whose scheduled delete or retention window may have passed.
    ///
    /// This is a coarse pre-filter; callers confirm with [`TrashEntry::is_expired`].
    pub async fn expired_candidates(
        &self,
        content_type: ContentType,
        retention_days: u32,
        now: DateTime<Utc>,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Page<TrashEntry>> {
        let cutoff = now - Duration::days(retention_days as i64);

        let sql = format!(
            "{} WHERE t.item_id > ? \
               AND ((t.scheduled_permanent_delete_at IS NOT NULL AND t.scheduled_permanent_delete_at <= ?) \
                    OR t.deleted_at <= ?) \
             ORDER BY t.item_id LIMIT ?",
            select_entries(content_type.tables())
        );
        let rows: Vec<TrashRow> = sqlx::query_as(&sql)
            .bind(after.unwrap_or(""))
            .bind(now)
            .bind(cutoff)
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        Ok(Page::from_rows(
            rows,
            |r| r.item_id.as_str(),
            |r| r.into_entry(content_type),
        ))
    }

    /// Permanently remove an item and all dependent rows. Returns the number of rows removed.
    pub async fn purge(&self, content_type: ContentType, id: Uuid) -> Result<u64> {
        let pool = self.db.pool().clone();
        let item_id = id.to_string();

        let removed = with_retry(|| {
            let pool = pool.clone();
            let item_id = item_id.clone();
            async move { purge_cascade(&pool, content_type, &item_id).await }
        })
        .await?;

        tracing::debug!(content_type = %content_type, item_id = %id, removed, "Purged item");
        Ok(removed)
    }

    /// Purge a trashed item right away, regardless of its retention window
    pub async fn force_delete(&self, content_type: ContentType, id: Uuid) -> Result<u64> {
        let item = ContentRepository::new(self.db)
            .find_by_id(content_type, id)
            .await?
            .ok_or_else(|| not_found(content_type, id))?;
        if !item.is_trashed() {
            return Err(Error::InvalidTransition {
                action: "force-delete",
                content_type: content_type.to_string(),
                id: id.to_string(),
                state: "not in the trash",
            });
        }

        let removed = self.purge(content_type, id).await?;
        tracing::info!(content_type = %content_type, item_id = %id, removed, "Force-deleted item");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::{ContentStatus, NewContent};

    async fn blog_post_with_dependents(db: &Database) -> Uuid {
        let repo = ContentRepository::new(db);
        let item = repo
            .create(
                ContentType::BlogPost,
                &NewContent {
                    title: "Release notes".to_string(),
                    content: "body".to_string(),
                    slug: Some("release-notes".to_string()),
                    status: ContentStatus::Published,
                },
            )
            .await
            .unwrap();
        let id = item.id;

        repo.save(ContentType::BlogPost, id, None, "body v2", false).await.unwrap();
        repo.set_translation(ContentType::BlogPost, id, "de", "Versionshinweise", "Text")
            .await
            .unwrap();
        repo.set_meta(ContentType::BlogPost, id, "seo_title", "Release notes").await.unwrap();
        repo.set_slug(ContentType::BlogPost, id, "de", "versionshinweise").await.unwrap();
        repo.add_category(id, "news").await.unwrap();
        repo.add_tags(id, &["release".to_string(), "changelog".to_string()]).await.unwrap();
        id
    }

    #[tokio::test]
    async fn test_trash_and_restore_round_trip() {
        let db = Database::new_in_memory().await.unwrap();
        let id = blog_post_with_dependents(&db).await;
        let trash = TrashRepository::new(&db);
        let content = ContentRepository::new(&db);

        let entry = trash
            .move_to_trash(ContentType::BlogPost, id, Some("editor"), None, Utc::now())
            .await
            .unwrap();
        assert_eq!(entry.title, "Release notes");
        assert!(content.list(ContentType::BlogPost).await.unwrap().is_empty());
        assert_eq!(trash.list(ContentType::BlogPost).await.unwrap().len(), 1);

        let restored = trash.restore(ContentType::BlogPost, id).await.unwrap();
        assert!(!restored.is_trashed());
        assert!(trash.find(ContentType::BlogPost, id).await.unwrap().is_none());
        assert_eq!(content.list(ContentType::BlogPost).await.unwrap().len(), 1);

        // Dependents survive the round trip untouched
        let counts = content.dependent_rows(ContentType::BlogPost, id).await.unwrap();
        assert!(counts.contains(&("blog_post_revisions", 2)));
        assert!(counts.contains(&("blog_post_tags", 2)));
        assert!(counts.contains(&("slugs", 2)));
    }

    #[tokio::test]
    async fn test_invalid_transitions() {
        let db = Database::new_in_memory().await.unwrap();
        let id = blog_post_with_dependents(&db).await;
        let trash = TrashRepository::new(&db);
        let content = ContentRepository::new(&db);

        let err = trash.restore(ContentType::BlogPost, id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { action: "restore", .. }));

        let err = trash.force_delete(ContentType::BlogPost, id).await.unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { action: "force-delete", .. }));

        trash
            .move_to_trash(ContentType::BlogPost, id, None, None, Utc::now())
            .await
            .unwrap();

        let err = trash
            .move_to_trash(ContentType::BlogPost, id, None, None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { action: "trash", .. }));

        let err = content
            .save(ContentType::BlogPost, id, None, "edit", true)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidTransition { action: "autosave", .. }));

        let err = trash.force_delete(ContentType::Page, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, Error::ItemNotFound { .. }));
    }

    #[tokio::test]
    async fn test_force_delete_cascades_everywhere() {
        let db = Database::new_in_memory().await.unwrap();
        let id = blog_post_with_dependents(&db).await;
        let other = blog_post_with_dependents_named(&db, "other-post").await;
        let trash = TrashRepository::new(&db);
        let content = ContentRepository::new(&db);

        trash
            .move_to_trash(ContentType::BlogPost, id, None, None, Utc::now())
            .await
            .unwrap();
        let removed = trash.force_delete(ContentType::BlogPost, id).await.unwrap();
        // 2 revisions, trash row, translation, meta, category, 2 tags, 2 slugs, item
        assert_eq!(removed, 11);

        let counts = content.dependent_rows(ContentType::BlogPost, id).await.unwrap();
        assert!(counts.iter().all(|(_, n)| *n == 0), "{:?}", counts);

        let untouched = content.dependent_rows(ContentType::BlogPost, other).await.unwrap();
        assert!(untouched.contains(&("blog_posts", 1)));
        assert!(untouched.contains(&("slugs", 1)));
    }

    async fn blog_post_with_dependents_named(db: &Database, slug: &str) -> Uuid {
        ContentRepository::new(db)
            .create(
                ContentType::BlogPost,
                &NewContent {
                    title: "Other".to_string(),
                    content: String::new(),
                    slug: Some(slug.to_string()),
                    status: ContentStatus::Draft,
                },
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_slug_purge_is_scoped_to_module() {
        let db = Database::new_in_memory().await.unwrap();
        let content = ContentRepository::new(&db);
        let trash = TrashRepository::new(&db);
        let page = content
            .create(
                ContentType::Page,
                &NewContent {
                    title: "Shared".to_string(),
                    content: String::new(),
                    slug: None,
                    status: ContentStatus::Draft,
                },
            )
            .await
            .unwrap();

        // A blog-module slug row that happens to carry the page's id
        sqlx::query("INSERT INTO slugs (module, reference_id, locale, slug) VALUES ('blog', ?, '', 'x')")
            .bind(page.id.to_string())
            .execute(db.pool())
            .await
            .unwrap();
        content.set_slug(ContentType::Page, page.id, "", "shared").await.unwrap();

        trash
            .move_to_trash(ContentType::Page, page.id, None, None, Utc::now())
            .await
            .unwrap();
        trash.force_delete(ContentType::Page, page.id).await.unwrap();

        let remaining: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM slugs WHERE reference_id = ?")
            .bind(page.id.to_string())
            .fetch_one(db.pool())
            .await
            .unwrap();
        assert_eq!(remaining, 1);
    }

    #[tokio::test]
    async fn test_expired_candidates_prefilter() {
        let db = Database::new_in_memory().await.unwrap();
        let trash = TrashRepository::new(&db);
        let now = Utc::now();

        let old = blog_post_with_dependents_named(&db, "old").await;
        let fresh = blog_post_with_dependents_named(&db, "fresh").await;
        let scheduled = blog_post_with_dependents_named(&db, "scheduled").await;

        trash
            .move_to_trash(ContentType::BlogPost, old, None, None, now - Duration::days(40))
            .await
            .unwrap();
        trash
            .move_to_trash(ContentType::BlogPost, fresh, None, None, now - Duration::days(2))
            .await
            .unwrap();
        trash
            .move_to_trash(
                ContentType::BlogPost,
                scheduled,
                None,
                Some(now - Duration::hours(1)),
                now - Duration::days(2),
            )
            .await
            .unwrap();

        let candidates = trash
            .expired_candidates(ContentType::BlogPost, 30, now, None, 100)
            .await
            .unwrap();
        assert_eq!(candidates.rows, 2);
        let mut ids: Vec<Uuid> = candidates.items.iter().map(|e| e.item_id).collect();
        ids.sort();
        let mut expected = vec![old, scheduled];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_purge_rolls_back_when_item_row_survives() {
        let db = Database::new_in_memory().await.unwrap();
        let trash = TrashRepository::new(&db);
        let id = blog_post_with_dependents(&db).await;
        trash
            .move_to_trash(ContentType::BlogPost, id, None, None, Utc::now())
            .await
            .unwrap();

        // Silently skip the final delete of this one row
        sqlx::query(&format!(
            "CREATE TRIGGER keep_post BEFORE DELETE ON blog_posts WHEN old.id = '{}' \
             BEGIN SELECT RAISE(IGNORE); END",
            id
        ))
        .execute(db.pool())
        .await
        .unwrap();

        let err = trash.purge(ContentType::BlogPost, id).await.unwrap_err();
        assert!(matches!(err, Error::Database(sqlx::Error::RowNotFound)));

        let counts = ContentRepository::new(&db)
            .dependent_rows(ContentType::BlogPost, id)
            .await
            .unwrap();
        assert!(counts.contains(&("blog_post_trash", 1)));
        assert!(counts.contains(&("blog_posts", 1)));
    }
}
