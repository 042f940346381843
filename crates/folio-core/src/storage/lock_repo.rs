use chrono::{DateTime, Duration, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use super::{parse_id, Database};
use crate::{Error, Result};

/// A held lease on a named maintenance job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    pub name: String,
    pub holder: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct LockRow {
    name: String,
    holder: String,
    acquired_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<LockRow> for LockLease {
    type Error = Error;

    fn try_from(row: LockRow) -> Result<Self> {
        Ok(LockLease {
            holder: parse_id(&row.holder)?,
            name: row.name,
            acquired_at: row.acquired_at,
            expires_at: row.expires_at,
        })
    }
}

/// Lease locks that keep two cleanup runs from working the same tables at once
pub struct LockRepository<'a> {
    db: &'a Database,
}

impl<'a> LockRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Try to take the named lease for `ttl`. Returns `None` while another holder's lease is live.
    pub async fn try_acquire(
        &self,
        name: &str,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<LockLease>> {
        let lease = LockLease {
            name: name.to_string(),
            holder: Uuid::new_v4(),
            acquired_at: now,
            expires_at: now + ttl,
        };

        let mut tx = self.db.pool().begin().await?;

        let stale = sqlx::query("DELETE FROM maintenance_locks WHERE name = ? AND expires_at <= ?")
            .bind(name)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        if stale.rows_affected() > 0 {
            tracing::warn!(lock = name, "Took over expired maintenance lock");
        }

        let inserted = sqlx::query(
            r#"
            INSERT OR IGNORE INTO maintenance_locks (name, holder, acquired_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(name)
        .bind(lease.holder.to_string())
        .bind(lease.acquired_at)
        .bind(lease.expires_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        if inserted.rows_affected() == 1 {
            Ok(Some(lease))
        } else {
            Ok(None)
        }
    }

    /// Push the lease's expiry to `now + ttl`.
    ///
    /// Returns false when the row no longer belongs to this holder, i.e. the
    /// lease expired and another run took it over.
    pub async fn renew(
        &self,
        lease: &LockLease,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE maintenance_locks SET expires_at = ? WHERE name = ? AND holder = ?",
        )
        .bind(now + ttl)
        .bind(&lease.name)
        .bind(lease.holder.to_string())
        .execute(self.db.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// Give the lease back. Returns false if it had already expired and been taken over.
    pub async fn release(&self, lease: &LockLease) -> Result<bool> {
        let result = sqlx::query("DELETE FROM maintenance_locks WHERE name = ? AND holder = ?")
            .bind(&lease.name)
            .bind(lease.holder.to_string())
            .execute(self.db.pool())
            .await?;

        Ok(result.rows_affected() == 1)
    }

    /// The current lease on `name`, live or expired
    pub async fn current(&self, name: &str) -> Result<Option<LockLease>> {
        let row: Option<LockRow> = sqlx::query_as(
            "SELECT name, holder, acquired_at, expires_at FROM maintenance_locks WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(self.db.pool())
        .await?;

        row.map(LockLease::try_from).transpose()
    }
}
