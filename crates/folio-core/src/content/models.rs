use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kinds of content governed by revisions and trash
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Page,
    BlogPost,
}

/// Static table layout of one content type.
///
/// Every identifier interpolated into SQL comes from here, never from input.
#[derive(Debug, Clone, Copy)]
pub struct ContentTables {
    pub items: &'static str,
    pub revisions: &'static str,
    pub trash: &'static str,
    pub translations: &'static str,
    pub meta: &'static str,
    pub categories: Option<&'static str>,
    pub tags: Option<&'static str>,
    /// Discriminator in the shared `slugs` table
    pub slug_module: &'static str,
}

const PAGE_TABLES: ContentTables = ContentTables {
    items: "pages",
    revisions: "page_revisions",
    trash: "page_trash",
    translations: "page_translations",
    meta: "page_meta",
    categories: None,
    tags: None,
    slug_module: "pages",
};

const BLOG_POST_TABLES: ContentTables = ContentTables {
    items: "blog_posts",
    revisions: "blog_post_revisions",
    trash: "blog_post_trash",
    translations: "blog_post_translations",
    meta: "blog_post_meta",
    categories: Some("blog_post_categories"),
    tags: Some("blog_post_tags"),
    slug_module: "blog",
};

impl ContentType {
    pub const ALL: [ContentType; 2] = [ContentType::Page, ContentType::BlogPost];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Page => "page",
            ContentType::BlogPost => "blog_post",
        }
    }

    pub fn tables(&self) -> &'static ContentTables {
        match self {
            ContentType::Page => &PAGE_TABLES,
            ContentType::BlogPost => &BLOG_POST_TABLES,
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "page" | "pages" => Ok(ContentType::Page),
            "blog" | "post" | "blog_post" | "blog-post" | "posts" => Ok(ContentType::BlogPost),
            other => Err(crate::Error::Other(format!(
                "Unknown content type '{}' (expected 'page' or 'blog')",
                other
            ))),
        }
    }
}

/// Publication status of a content item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatus {
    Draft,
    Published,
}

impl ContentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentStatus::Draft => "draft",
            ContentStatus::Published => "published",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "published" => ContentStatus::Published,
            _ => ContentStatus::Draft,
        }
    }
}

/// A page or blog post
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: Uuid,
    pub content_type: ContentType,
    pub title: String,
    pub content: String,
    pub status: ContentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set while the item sits in the trash
    pub deleted_at: Option<DateTime<Utc>>,
}

impl ContentItem {
    pub fn is_trashed(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Data required to create a new content item
#[derive(Debug, Clone)]
pub struct NewContent {
    pub title: String,
    pub content: String,
    pub slug: Option<String>,
    pub status: ContentStatus,
}

/// An immutable snapshot of a content item taken on save or autosave
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    pub id: Uuid,
    pub item_id: Uuid,
    pub title: String,
    pub content: String,
    pub is_autosave: bool,
    pub created_at: DateTime<Utc>,
}

/// A row in a content type's trash registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrashEntry {
    pub item_id: Uuid,
    pub content_type: ContentType,
    pub title: String,
    pub deleted_at: DateTime<Utc>,
    pub deleted_by: Option<String>,
    pub scheduled_permanent_delete_at: Option<DateTime<Utc>>,
}

impl TrashEntry {
    /// When the age-based retention window closes
    pub fn retention_expires_at(&self, retention_days: u32) -> DateTime<Utc> {
        self.deleted_at + Duration::days(retention_days as i64)
    }

    /// The earlier of the scheduled delete and the retention expiry
    pub fn purge_due_at(&self, retention_days: u32) -> DateTime<Utc> {
        let by_age = self.retention_expires_at(retention_days);
        match self.scheduled_permanent_delete_at {
            Some(scheduled) if scheduled < by_age => scheduled,
            _ => by_age,
        }
    }

    /// An entry is purged once either its scheduled delete or its retention window has passed
    pub fn is_expired(&self, retention_days: u32, now: DateTime<Utc>) -> bool {
        let scheduled_passed = self
            .scheduled_permanent_delete_at
            .map(|at| at <= now)
            .unwrap_or(false);

        scheduled_passed || self.retention_expires_at(retention_days) <= now
    }
}
