use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{content_type} not found: {id}")]
    ItemNotFound { content_type: String, id: String },

    #[error("Revision not found: {0}")]
    RevisionNotFound(String),

    #[error("Cannot {action} {content_type} {id}: item is {state}")]
    InvalidTransition {
        action: &'static str,
        content_type: String,
        id: String,
        state: &'static str,
    },

    #[error("Malformed id in store: '{0}'")]
    MalformedId(String),

    #[error("Maintenance lock '{0}' was taken over by another run")]
    LockLost(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
