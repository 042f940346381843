use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;

use crate::config::AppConfig;
use crate::Result;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    /// Open (or create) the CMS database and run migrations
    pub async fn new(config: &AppConfig) -> Result<Self> {
        let db_path = config.database_path();

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db_url = format!("sqlite:{}", db_path.display());

        tracing::info!("Connecting to database: {}", db_path.display());

        // Set per connection so every pooled connection enforces foreign keys;
        // the purge cascade relies on them to refuse deleting a parent first.
        let options = SqliteConnectOptions::from_str(&db_url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Create an in-memory database for testing
    #[cfg(test)]
    pub async fn new_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        tracing::debug!("Running database migrations...");

        for migration in [
            MIGRATION_001_PAGES,
            MIGRATION_002_BLOG_POSTS,
            MIGRATION_003_SLUGS,
            MIGRATION_004_MAINTENANCE_LOCKS,
            MIGRATION_INDEXES,
        ] {
            sqlx::query(migration).execute(&self.pool).await?;
        }

        tracing::debug!("Database migrations completed");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

const MIGRATION_001_PAGES: &str = r#"
CREATE TABLE IF NOT EXISTS pages (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'draft',
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL,
    deleted_at DATETIME
);
CREATE TABLE IF NOT EXISTS page_revisions (
    id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL REFERENCES pages(id),
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    is_autosave INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL
);
CREATE TABLE IF NOT EXISTS page_trash (
    item_id TEXT PRIMARY KEY REFERENCES pages(id),
    deleted_at DATETIME NOT NULL,
    deleted_by TEXT,
    scheduled_permanent_delete_at DATETIME
);
CREATE TABLE IF NOT EXISTS page_translations (
    item_id TEXT NOT NULL REFERENCES pages(id),
    locale TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (item_id, locale)
);
CREATE TABLE IF NOT EXISTS page_meta (
    item_id TEXT NOT NULL REFERENCES pages(id),
    meta_key TEXT NOT NULL,
    meta_value TEXT,
    PRIMARY KEY (item_id, meta_key)
)
"#;

const MIGRATION_002_BLOG_POSTS: &str = r#"
CREATE TABLE IF NOT EXISTS blog_posts (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'draft',
    created_at DATETIME NOT NULL,
    updated_at DATETIME NOT NULL,
    deleted_at DATETIME
);
CREATE TABLE IF NOT EXISTS blog_post_revisions (
    id TEXT PRIMARY KEY,
    item_id TEXT NOT NULL REFERENCES blog_posts(id),
    title TEXT NOT NULL,
    content TEXT NOT NULL,
    is_autosave INTEGER NOT NULL DEFAULT 0,
    created_at DATETIME NOT NULL
);
CREATE TABLE IF NOT EXISTS blog_post_trash (
    item_id TEXT PRIMARY KEY REFERENCES blog_posts(id),
    deleted_at DATETIME NOT NULL,
    deleted_by TEXT,
    scheduled_permanent_delete_at DATETIME
);
CREATE TABLE IF NOT EXISTS blog_post_translations (
    item_id TEXT NOT NULL REFERENCES blog_posts(id),
    locale TEXT NOT NULL,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    PRIMARY KEY (item_id, locale)
);
CREATE TABLE IF NOT EXISTS blog_post_meta (
    item_id TEXT NOT NULL REFERENCES blog_posts(id),
    meta_key TEXT NOT NULL,
    meta_value TEXT,
    PRIMARY KEY (item_id, meta_key)
);
CREATE TABLE IF NOT EXISTS blog_post_categories (
    item_id TEXT NOT NULL REFERENCES blog_posts(id),
    category_id TEXT NOT NULL,
    PRIMARY KEY (item_id, category_id)
);
CREATE TABLE IF NOT EXISTS blog_post_tags (
    item_id TEXT NOT NULL REFERENCES blog_posts(id),
    tag TEXT NOT NULL,
    PRIMARY KEY (item_id, tag)
)
"#;

// Shared across content types, so no foreign key; rows are removed by module + reference_id
const MIGRATION_003_SLUGS: &str = r#"
CREATE TABLE IF NOT EXISTS slugs (
    module TEXT NOT NULL,
    reference_id TEXT NOT NULL,
    locale TEXT NOT NULL DEFAULT '',
    slug TEXT NOT NULL,
    PRIMARY KEY (module, reference_id, locale),
    UNIQUE (module, locale, slug)
)
"#;

const MIGRATION_004_MAINTENANCE_LOCKS: &str = r#"
CREATE TABLE IF NOT EXISTS maintenance_locks (
    name TEXT PRIMARY KEY,
    holder TEXT NOT NULL,
    acquired_at DATETIME NOT NULL,
    expires_at DATETIME NOT NULL
)
"#;

const MIGRATION_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_pages_deleted_at ON pages(deleted_at);
CREATE INDEX IF NOT EXISTS idx_page_revisions_item ON page_revisions(item_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_page_trash_deleted_at ON page_trash(deleted_at);
CREATE INDEX IF NOT EXISTS idx_page_trash_scheduled ON page_trash(scheduled_permanent_delete_at);
CREATE INDEX IF NOT EXISTS idx_blog_posts_deleted_at ON blog_posts(deleted_at);
CREATE INDEX IF NOT EXISTS idx_blog_post_revisions_item ON blog_post_revisions(item_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_blog_post_trash_deleted_at ON blog_post_trash(deleted_at);
CREATE INDEX IF NOT EXISTS idx_blog_post_trash_scheduled ON blog_post_trash(scheduled_permanent_delete_at);
CREATE INDEX IF NOT EXISTS idx_slugs_reference ON slugs(module, reference_id)
"#;
