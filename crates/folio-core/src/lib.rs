pub mod config;
pub mod content;
pub mod error;
pub mod maintenance;
pub mod retention;
pub mod scheduler;
pub mod storage;

pub use config::AppConfig;
pub use content::ContentType;
pub use error::{Error, Result};
pub use maintenance::{CleanupOrchestrator, CleanupReport};
pub use retention::{KeepReason, RetentionPlan, RetentionPolicy};
