mod models;

pub use models::{
    ContentItem, ContentStatus, ContentTables, ContentType, NewContent, Revision, TrashEntry,
};
