use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MILLIS_PER_DAY: f64 = 86_400_000.0;
const DAYS_PER_MONTH: f64 = 30.0;
const DAYS_PER_YEAR: f64 = 365.0;

/// How many revisions survive cleanup, per tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPolicy {
    /// Most recent revisions kept regardless of age
    pub keep_recent: u32,
    /// Age window, in 30-day months, for one-per-month retention
    pub keep_monthly: u32,
    /// Age window, in 365-day years, for one-per-year retention
    pub keep_yearly: u32,
}

impl RetentionPolicy {
    pub fn new(keep_recent: u32, keep_monthly: u32, keep_yearly: u32) -> Self {
        Self {
            keep_recent,
            keep_monthly,
            keep_yearly,
        }
    }
}

impl fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "recent={} monthly={} yearly={}",
            self.keep_recent, self.keep_monthly, self.keep_yearly
        )
    }
}

/// Why a revision survived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepReason {
    Recent,
    Monthly,
    Yearly,
}

impl KeepReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeepReason::Recent => "recent",
            KeepReason::Monthly => "monthly",
            KeepReason::Yearly => "yearly",
        }
    }
}

/// The part of a revision the engine looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevisionStamp {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeptRevision {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub reason: KeepReason,
}

/// Partition of one item's history. Both lists are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionPlan {
    pub keep: Vec<KeptRevision>,
    pub delete: Vec<Uuid>,
}

impl RetentionPlan {
    pub fn kept_count(&self) -> usize {
        self.keep.len()
    }

    pub fn count_by_reason(&self, reason: KeepReason) -> usize {
        self.keep.iter().filter(|k| k.reason == reason).count()
    }
}

/// Exact days elapsed, fractional. Negative for timestamps after `now`.
fn age_days(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - created_at).num_milliseconds() as f64 / MILLIS_PER_DAY
}

fn age_in_months(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    age_days(created_at, now) / DAYS_PER_MONTH
}

fn age_in_years(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    age_days(created_at, now) / DAYS_PER_YEAR
}

/// Decide which revisions of a single item to keep.
///
/// The input may be in any order; it is walked newest first (ties broken by
/// id, descending) so the most recent revision of every bucket is the one
/// that survives.
pub fn plan(
    revisions: &[RevisionStamp],
    policy: &RetentionPolicy,
    now: DateTime<Utc>,
) -> RetentionPlan {
    let mut ordered = revisions.to_vec();
    ordered.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    });

    let keep_recent = policy.keep_recent as usize;

    if ordered.len() <= keep_recent {
        return RetentionPlan {
            keep: ordered
                .into_iter()
                .map(|r| KeptRevision {
                    id: r.id,
                    created_at: r.created_at,
                    reason: KeepReason::Recent,
                })
                .collect(),
            delete: Vec::new(),
        };
    }

    let mut decided: Vec<Option<KeepReason>> = vec![None; ordered.len()];
    for slot in decided.iter_mut().take(keep_recent) {
        *slot = Some(KeepReason::Recent);
    }

    let mut months_taken: HashSet<(i32, u32)> = HashSet::new();
    for (idx, rev) in ordered.iter().enumerate().skip(keep_recent) {
        if age_in_months(rev.created_at, now) > policy.keep_monthly as f64 {
            continue;
        }
        let bucket = (rev.created_at.year(), rev.created_at.month());
        if months_taken.insert(bucket) {
            decided[idx] = Some(KeepReason::Monthly);
        }
    }

    let mut years_taken: HashSet<i32> = HashSet::new();
    for (idx, rev) in ordered.iter().enumerate().skip(keep_recent) {
        if decided[idx].is_some() {
            continue;
        }
        if age_in_years(rev.created_at, now) > policy.keep_yearly as f64 {
            continue;
        }
        if years_taken.insert(rev.created_at.year()) {
            decided[idx] = Some(KeepReason::Yearly);
        }
    }

    let mut result = RetentionPlan::default();
    for (rev, reason) in ordered.into_iter().zip(decided) {
        match reason {
            Some(reason) => result.keep.push(KeptRevision {
                id: rev.id,
                created_at: rev.created_at,
                reason,
            }),
            None => result.delete.push(rev.id),
        }
    }

    result
}
