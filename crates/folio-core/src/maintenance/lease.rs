use chrono::{Duration, Utc};

use crate::storage::{Database, LockLease, LockRepository};
use crate::{Error, Result};

/// A held lease plus what is needed to keep it alive during a long run
pub struct LeaseKeeper<'a> {
    db: &'a Database,
    lease: LockLease,
    ttl: Duration,
}

impl<'a> LeaseKeeper<'a> {
    pub fn new(db: &'a Database, lease: LockLease, ttl: Duration) -> Self {
        Self { db, lease, ttl }
    }

    pub fn lease(&self) -> &LockLease {
        &self.lease
    }

    /// Extend the lease from the wall clock. Fails with `LockLost` once
    /// another run has taken it over.
    pub async fn renew(&self) -> Result<()> {
        let renewed = LockRepository::new(self.db)
            .renew(&self.lease, self.ttl, Utc::now())
            .await?;

        if !renewed {
            return Err(Error::LockLost(self.lease.name.clone()));
        }
        tracing::debug!(lock = %self.lease.name, "Renewed maintenance lock");
        Ok(())
    }
}
