use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::revision_repo::insert_revision;
use super::{parse_id, Database, RevisionRepository};
use crate::content::{ContentItem, ContentStatus, ContentType, NewContent, Revision};
use crate::{Error, Result};

/// Repository for pages and blog posts and their dependent rows
pub struct ContentRepository<'a> {
    db: &'a Database,
}

#[derive(FromRow)]
struct ItemRow {
    id: String,
    title: String,
    content: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl ItemRow {
    fn into_item(self, content_type: ContentType) -> Result<ContentItem> {
        Ok(ContentItem {
            id: parse_id(&self.id)?,
            content_type,
            title: self.title,
            content: self.content,
            status: ContentStatus::parse(&self.status),
            created_at: self.created_at,
            updated_at: self.updated_at,
            deleted_at: self.deleted_at,
        })
    }
}

pub(crate) fn not_found(content_type: ContentType, id: Uuid) -> Error {
    Error::ItemNotFound {
        content_type: content_type.to_string(),
        id: id.to_string(),
    }
}

impl<'a> ContentRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Create an item together with its first revision and optional default-locale slug
    pub async fn create(
        &self,
        content_type: ContentType,
        new_content: &NewContent,
    ) -> Result<ContentItem> {
        let tables = content_type.tables();
        let id = Uuid::new_v4();
        let now = Utc::now();

        let mut tx = self.db.pool().begin().await?;

        let sql = format!(
            "INSERT INTO {} (id, title, content, status, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
            tables.items
        );
        sqlx::query(&sql)
            .bind(id.to_string())
            .bind(&new_content.title)
            .bind(&new_content.content)
            .bind(new_content.status.as_str())
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

        let revision = Revision {
            id: Uuid::new_v4(),
            item_id: id,
            title: new_content.title.clone(),
            content: new_content.content.clone(),
            is_autosave: false,
            created_at: now,
        };
        insert_revision(&mut *tx, content_type, &revision).await?;

        if let Some(slug) = &new_content.slug {
            sqlx::query("INSERT INTO slugs (module, reference_id, locale, slug) VALUES (?, ?, '', ?)")
                .bind(tables.slug_module)
                .bind(id.to_string())
                .bind(slug)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(content_type = %content_type, item_id = %id, "Created content item");

        self.get(content_type, id).await
    }

    /// Find an item by ID, trashed or not
    pub async fn find_by_id(
        &self,
        content_type: ContentType,
        id: Uuid,
    ) -> Result<Option<ContentItem>> {
        let sql = format!(
            "SELECT id, title, content, status, created_at, updated_at, deleted_at \
             FROM {} WHERE id = ?",
            content_type.tables().items
        );
        let row: Option<ItemRow> = sqlx::query_as(&sql)
            .bind(id.to_string())
            .fetch_optional(self.db.pool())
            .await?;

        row.map(|r| r.into_item(content_type)).transpose()
    }

    /// Like `find_by_id`, failing with `ItemNotFound` when absent
    pub async fn get(&self, content_type: ContentType, id: Uuid) -> Result<ContentItem> {
        self.find_by_id(content_type, id)
            .await?
            .ok_or_else(|| not_found(content_type, id))
    }

    /// Live items, most recently updated first. Trashed items are excluded.
    pub async fn list(&self, content_type: ContentType) -> Result<Vec<ContentItem>> {
        let sql = format!(
            "SELECT id, title, content, status, created_at, updated_at, deleted_at \
             FROM {} WHERE deleted_at IS NULL ORDER BY updated_at DESC",
            content_type.tables().items
        );
        let rows: Vec<ItemRow> = sqlx::query_as(&sql).fetch_all(self.db.pool()).await?;

        rows.into_iter().map(|r| r.into_item(content_type)).collect()
    }

    /// Save new content and record a revision of it.
    ///
    /// Autosaves are recorded the same way but flagged, so editors can tell
    /// them apart from explicit saves.
    pub async fn save(
        &self,
        content_type: ContentType,
        id: Uuid,
        title: Option<&str>,
        content: &str,
        autosave: bool,
    ) -> Result<Revision> {
        let item = self.get(content_type, id).await?;
        if item.is_trashed() {
            return Err(Error::InvalidTransition {
                action: if autosave { "autosave" } else { "save" },
                content_type: content_type.to_string(),
                id: id.to_string(),
                state: "in the trash",
            });
        }

        let now = Utc::now();
        let revision = Revision {
            id: Uuid::new_v4(),
            item_id: id,
            title: title.map(str::to_string).unwrap_or(item.title),
            content: content.to_string(),
            is_autosave: autosave,
            created_at: now,
        };

        let mut tx = self.db.pool().begin().await?;

        let sql = format!(
            "UPDATE {} SET title = ?, content = ?, updated_at = ? WHERE id = ?",
            content_type.tables().items
        );
        sqlx::query(&sql)
            .bind(&revision.title)
            .bind(&revision.content)
            .bind(now)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        insert_revision(&mut *tx, content_type, &revision).await?;

        tx.commit().await?;

        tracing::debug!(
            content_type = %content_type,
            item_id = %id,
            revision_id = %revision.id,
            autosave,
            "Saved revision"
        );

        Ok(revision)
    }

    /// Roll an item back to an earlier revision. The rollback is itself a new revision.
    pub async fn restore_revision(
        &self,
        content_type: ContentType,
        id: Uuid,
        revision_id: Uuid,
    ) -> Result<Revision> {
        let revision = RevisionRepository::new(self.db)
            .find(content_type, id, revision_id)
            .await?
            .ok_or_else(|| Error::RevisionNotFound(revision_id.to_string()))?;

        self.save(
            content_type,
            id,
            Some(&revision.title),
            &revision.content,
            false,
        )
        .await
    }

    /// Insert or replace a translation
    pub async fn set_translation(
        &self,
        content_type: ContentType,
        id: Uuid,
        locale: &str,
        title: &str,
        content: &str,
    ) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (item_id, locale, title, content) VALUES (?, ?, ?, ?) \
             ON CONFLICT(item_id, locale) DO UPDATE SET title = excluded.title, content = excluded.content",
            content_type.tables().translations
        );
        sqlx::query(&sql)
            .bind(id.to_string())
            .bind(locale)
            .bind(title)
            .bind(content)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Insert or replace a metadata entry
    pub async fn set_meta(
        &self,
        content_type: ContentType,
        id: Uuid,
        key: &str,
        value: &str,
    ) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (item_id, meta_key, meta_value) VALUES (?, ?, ?) \
             ON CONFLICT(item_id, meta_key) DO UPDATE SET meta_value = excluded.meta_value",
            content_type.tables().meta
        );
        sqlx::query(&sql)
            .bind(id.to_string())
            .bind(key)
            .bind(value)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Register the slug of an item for a locale ("" is the default locale)
    pub async fn set_slug(
        &self,
        content_type: ContentType,
        id: Uuid,
        locale: &str,
        slug: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO slugs (module, reference_id, locale, slug) VALUES (?, ?, ?, ?)
            ON CONFLICT(module, reference_id, locale) DO UPDATE SET slug = excluded.slug
            "#,
        )
        .bind(content_type.tables().slug_module)
        .bind(id.to_string())
        .bind(locale)
        .bind(slug)
        .execute(self.db.pool())
        .await?;
        Ok(())
    }

    /// Attach a blog post to a category
    pub async fn add_category(&self, id: Uuid, category_id: &str) -> Result<()> {
        let table = ContentType::BlogPost
            .tables()
            .categories
            .ok_or_else(|| Error::Other("blog posts have no category table".to_string()))?;
        let sql = format!("INSERT OR IGNORE INTO {} (item_id, category_id) VALUES (?, ?)", table);
        sqlx::query(&sql)
            .bind(id.to_string())
            .bind(category_id)
            .execute(self.db.pool())
            .await?;
        Ok(())
    }

    /// Tag a blog post
    pub async fn add_tags(&self, id: Uuid, tags: &[String]) -> Result<()> {
        let table = ContentType::BlogPost
            .tables()
            .tags
            .ok_or_else(|| Error::Other("blog posts have no tag table".to_string()))?;
        let sql = format!("INSERT OR IGNORE INTO {} (item_id, tag) VALUES (?, ?)", table);

        for tag in tags {
            sqlx::query(&sql)
                .bind(id.to_string())
                .bind(tag)
                .execute(self.db.pool())
                .await?;
        }
        Ok(())
    }

    /// Row counts of every table that references the item, the item row included
    pub async fn dependent_rows(
        &self,
        content_type: ContentType,
        id: Uuid,
    ) -> Result<Vec<(&'static str, i64)>> {
        let tables = content_type.tables();
        let mut counts = Vec::new();

        let child_tables = [
            Some(tables.revisions),
            Some(tables.trash),
            Some(tables.translations),
            Some(tables.meta),
            tables.categories,
            tables.tags,
        ];
        for table in child_tables.into_iter().flatten() {
            let sql = format!("SELECT COUNT(*) FROM {} WHERE item_id = ?", table);
            let count: i64 = sqlx::query_scalar(&sql)
                .bind(id.to_string())
                .fetch_one(self.db.pool())
                .await?;
            counts.push((table, count));
        }

        let slugs: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM slugs WHERE module = ? AND reference_id = ?")
                .bind(tables.slug_module)
                .bind(id.to_string())
                .fetch_one(self.db.pool())
                .await?;
        counts.push(("slugs", slugs));

        let sql = format!("SELECT COUNT(*) FROM {} WHERE id = ?", tables.items);
        let items: i64 = sqlx::query_scalar(&sql)
            .bind(id.to_string())
            .fetch_one(self.db.pool())
            .await?;
        counts.push((tables.items, items));

        Ok(counts)
    }
}
