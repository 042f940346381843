//! Backoff for SQLite contention.
//!
//! The CMS web process writes revisions and trash rows into the same database
//! file while a cleanup run is deleting. Statements that hit a busy or locked
//! database are retried a few times before the per-item failure is reported.

use std::future::Future;
use std::time::Duration;

/// Maximum number of retry attempts for a contended statement
pub const MAX_RETRIES: u32 = 5;

/// Check if a SQLite error is transient and worth retrying
///
/// - SQLITE_BUSY (5) and SQLITE_BUSY_SNAPSHOT (1032)
/// - SQLITE_LOCKED (6)
/// - SQLITE_IOERR (10) and its read/write/fsync/lock extended codes
pub fn is_transient_error(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            let code = db_err.code().map(|c| c.to_string());
            matches!(
                code.as_deref(),
                Some("5")
                    | Some("6")
                    | Some("10")
                    | Some("266")  // SQLITE_IOERR_READ
                    | Some("522")  // SQLITE_IOERR_SHORT_READ
                    | Some("1032")
                    | Some("2314") // SQLITE_IOERR_WRITE
                    | Some("3338") // SQLITE_IOERR_FSYNC
                    | Some("5386") // SQLITE_IOERR_LOCK
            )
        }
        sqlx::Error::PoolTimedOut => true,
        _ => false,
    }
}

/// Exponential backoff: 200ms, 400ms, 800ms, 1600ms, 3200ms
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis(200 * 2u64.pow(attempt.saturating_sub(1)))
}

/// Run a database operation, retrying transient contention errors with backoff.
///
/// The operation is rebuilt from scratch on every attempt, so it should open
/// its own transaction if it issues more than one statement.
pub async fn with_retry<F, Fut, T>(operation: F) -> std::result::Result<T, sqlx::Error>
where
    F: Fn() -> Fut,
    Fut: Future<Output = std::result::Result<T, sqlx::Error>>,
{
    let mut attempts = 0;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if is_transient_error(&e) && attempts < MAX_RETRIES => {
                attempts += 1;
                let delay = backoff_delay(attempts);
                tracing::debug!(
                    error = %e,
                    attempt = attempts,
                    max_retries = MAX_RETRIES,
                    delay_ms = delay.as_millis(),
                    "Database busy, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
