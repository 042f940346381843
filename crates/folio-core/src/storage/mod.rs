mod content_repo;
mod database;
mod lock_repo;
mod page;
pub mod retry;
mod revision_repo;
mod trash_repo;

pub use content_repo::ContentRepository;
pub use database::Database;
pub use lock_repo::{LockLease, LockRepository};
pub use page::Page;
pub(crate) use page::parse_id;
pub use revision_repo::RevisionRepository;
pub use trash_repo::TrashRepository;
