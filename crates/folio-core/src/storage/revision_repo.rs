use chrono::{DateTime, Utc};
use sqlx::{FromRow, Sqlite};
use uuid::Uuid;

use super::retry::with_retry;
use super::{parse_id, Database, Page};
use crate::content::{ContentType, Revision};
use crate::retention::RevisionStamp;
use crate::Result;

/// SQLite caps bound parameters per statement; stay well below the old 999 limit
const DELETE_CHUNK: usize = 500;

/// Repository for revision history of pages and blog posts
pub struct RevisionRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct RevisionRow {
    id: String,
    item_id: String,
    title: String,
    content: String,
    is_autosave: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<RevisionRow> for Revision {
    type Error = crate::Error;

    fn try_from(row: RevisionRow) -> Result<Self> {
        Ok(Revision {
            id: parse_id(&row.id)?,
            item_id: parse_id(&row.item_id)?,
            title: row.title,
            content: row.content,
            is_autosave: row.is_autosave != 0,
            created_at: row.created_at,
        })
    }
}

/// Insert a revision row on any executor (pool or open transaction)
pub(crate) async fn insert_revision<'e, E>(
    executor: E,
    content_type: ContentType,
    revision: &Revision,
) -> std::result::Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let sql = format!(
        "INSERT INTO {} (id, item_id, title, content, is_autosave, created_at) \
         VALUES (?, ?, ?, ?, ?, ?)",
        content_type.tables().revisions
    );
    sqlx::query(&sql)
        .bind(revision.id.to_string())
        .bind(revision.item_id.to_string())
        .bind(&revision.title)
        .bind(&revision.content)
        .bind(revision.is_autosave as i32)
        .bind(revision.created_at)
        .execute(executor)
        .await?;
    Ok(())
}

impl<'a> RevisionRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Store a revision with an explicit timestamp (imports, backfills)
    pub async fn insert(&self, content_type: ContentType, revision: &Revision) -> Result<()> {
        insert_revision(self.db.pool(), content_type, revision).await?;
        Ok(())
    }

    /// All revisions of an item, newest first
    pub async fn list(&self, content_type: ContentType, item_id: Uuid) -> Result<Vec<Revision>> {
        let sql = format!(
            "SELECT id, item_id, title, content, is_autosave, created_at FROM {} \
             WHERE item_id = ? ORDER BY created_at DESC, id DESC",
            content_type.tables().revisions
        );
        let rows: Vec<RevisionRow> = sqlx::query_as(&sql)
            .bind(item_id.to_string())
            .fetch_all(self.db.pool())
            .await?;

        rows.into_iter().map(Revision::try_from).collect()
    }

    /// Find a revision belonging to the given item
    pub async fn find(
        &self,
        content_type: ContentType,
        item_id: Uuid,
        revision_id: Uuid,
    ) -> Result<Option<Revision>> {
        let sql = format!(
            "SELECT id, item_id, title, content, is_autosave, created_at FROM {} \
             WHERE id = ? AND item_id = ?",
            content_type.tables().revisions
        );
        let row: Option<RevisionRow> = sqlx::query_as(&sql)
            .bind(revision_id.to_string())
            .bind(item_id.to_string())
            .fetch_optional(self.db.pool())
            .await?;

        row.map(Revision::try_from).transpose()
    }

    /// Id and timestamp of every revision of an item, as the retention engine needs them
    pub async fn stamps(
        &self,
        content_type: ContentType,
        item_id: Uuid,
    ) -> Result<Vec<RevisionStamp>> {
        let sql = format!(
            "SELECT id, created_at FROM {} WHERE item_id = ? ORDER BY created_at DESC, id DESC",
            content_type.tables().revisions
        );
        let rows: Vec<(String, DateTime<Utc>)> = sqlx::query_as(&sql)
            .bind(item_id.to_string())
            .fetch_all(self.db.pool())
            .await?;

        rows.into_iter()
            .map(|(id, created_at)| {
                Ok(RevisionStamp {
                    id: parse_id(&id)?,
                    created_at,
                })
            })
            .collect()
    }

    pub async fn count(&self, content_type: ContentType, item_id: Uuid) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {} WHERE item_id = ?",
            content_type.tables().revisions
        );
        let count: i64 = sqlx::query_scalar(&sql)
            .bind(item_id.to_string())
            .fetch_one(self.db.pool())
            .await?;
        Ok(count)
    }

    /// One page of distinct item ids that have revisions, ordered by id.
    ///
    /// Pass `last` of the previous page as `after` to continue.
    pub async fn item_ids_page(
        &self,
        content_type: ContentType,
        after: Option<&str>,
        limit: u32,
    ) -> Result<Page<Uuid>> {
        let sql = format!(
            "SELECT DISTINCT item_id FROM {} WHERE item_id > ? ORDER BY item_id LIMIT ?",
            content_type.tables().revisions
        );
        let rows: Vec<String> = sqlx::query_scalar(&sql)
            .bind(after.unwrap_or(""))
            .bind(limit)
            .fetch_all(self.db.pool())
            .await?;

        Ok(Page::from_rows(rows, |r| r.as_str(), |r| parse_id(&r)))
    }

    /// Delete the given revisions of one item in a single transaction.
    ///
    /// Either every id is removed or none is. Busy/locked errors are retried.
    pub async fn delete_many(
        &self,
        content_type: ContentType,
        item_id: Uuid,
        ids: &[Uuid],
    ) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let table = content_type.tables().revisions;
        let pool = self.db.pool().clone();
        let item_id_str = item_id.to_string();
        let id_strings: Vec<String> = ids.iter().map(|id| id.to_string()).collect();

        let deleted = with_retry(|| {
            let pool = pool.clone();
            let item_id_str = item_id_str.clone();
            let id_strings = id_strings.clone();
            async move {
                let mut tx = pool.begin().await?;
                let mut deleted = 0;

                for chunk in id_strings.chunks(DELETE_CHUNK) {
                    let placeholders: Vec<&str> = chunk.iter().map(|_| "?").collect();
                    let sql = format!(
                        "DELETE FROM {} WHERE item_id = ? AND id IN ({})",
                        table,
                        placeholders.join(", ")
                    );

                    let mut query = sqlx::query(&sql).bind(&item_id_str);
                    for id in chunk {
                        query = query.bind(id);
                    }
                    deleted += query.execute(&mut *tx).await?.rows_affected();
                }

                tx.commit().await?;
                Ok(deleted)
            }
        })
        .await?;

        Ok(deleted)
    }
}
