use std::collections::BTreeMap;
use std::ops::AddAssign;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::content::ContentType;
use crate::retention::RetentionPolicy;

/// Revision cleanup counts for one content type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupResult {
    /// Items whose history was examined
    pub processed: u64,
    /// Revisions removed
    pub deleted: u64,
    /// Revisions that survived
    pub kept: u64,
    /// Items skipped after an error
    pub failed: u64,
}

impl AddAssign for CleanupResult {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.deleted += other.deleted;
        self.kept += other.kept;
        self.failed += other.failed;
    }
}

/// Trash purge counts for one content type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashResult {
    /// Expired entries found
    pub found: u64,
    /// Entries purged with all dependents
    pub deleted: u64,
    /// Entries left in place after an error
    pub failed: u64,
}

impl AddAssign for TrashResult {
    fn add_assign(&mut self, other: Self) {
        self.found += other.found;
        self.deleted += other.deleted;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionCleanupReport {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy: Option<RetentionPolicy>,
    pub per_type: BTreeMap<ContentType, CleanupResult>,
    pub total: CleanupResult,
}

impl RevisionCleanupReport {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            policy: None,
            per_type: BTreeMap::new(),
            total: CleanupResult::default(),
        }
    }

    pub fn new(policy: RetentionPolicy) -> Self {
        Self {
            enabled: true,
            policy: Some(policy),
            per_type: BTreeMap::new(),
            total: CleanupResult::default(),
        }
    }

    pub fn record(&mut self, content_type: ContentType, result: CleanupResult) {
        *self.per_type.entry(content_type).or_default() += result;
        self.total += result;
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrashCleanupReport {
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retention_days: Option<u32>,
    pub per_type: BTreeMap<ContentType, TrashResult>,
    pub total: TrashResult,
}

impl TrashCleanupReport {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            retention_days: None,
            per_type: BTreeMap::new(),
            total: TrashResult::default(),
        }
    }

    pub fn new(retention_days: u32) -> Self {
        Self {
            enabled: true,
            retention_days: Some(retention_days),
            per_type: BTreeMap::new(),
            total: TrashResult::default(),
        }
    }

    pub fn record(&mut self, content_type: ContentType, result: TrashResult) {
        *self.per_type.entry(content_type).or_default() += result;
        self.total += result;
    }
}

/// Outcome of one orchestrated cleanup run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub started_at: DateTime<Utc>,
    /// Another run held the lock, nothing was done
    pub skipped: bool,
    pub revisions: RevisionCleanupReport,
    pub trash: TrashCleanupReport,
}

impl CleanupReport {
    pub fn idle(started_at: DateTime<Utc>, skipped: bool) -> Self {
        Self {
            started_at,
            skipped,
            revisions: RevisionCleanupReport::disabled(),
            trash: TrashCleanupReport::disabled(),
        }
    }

    /// One human-readable line with the run totals
    pub fn summary_line(&self) -> String {
        if self.skipped {
            return "Cleanup skipped: another run holds the lock".to_string();
        }

        let revisions = if self.revisions.enabled {
            let t = &self.revisions.total;
            format!(
                "revisions: {} items processed, {} deleted, {} kept, {} failed",
                t.processed, t.deleted, t.kept, t.failed
            )
        } else {
            "revisions: disabled".to_string()
        };

        let trash = if self.trash.enabled {
            let t = &self.trash.total;
            format!(
                "trash: {} expired, {} purged, {} failed",
                t.found, t.deleted, t.failed
            )
        } else {
            "trash: disabled".to_string()
        };

        format!("Cleanup finished ({}; {})", revisions, trash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_accumulates_per_type_and_total() {
        let mut report = RevisionCleanupReport::new(RetentionPolicy::new(5, 12, 3));
        report.record(
            ContentType::Page,
            CleanupResult { processed: 1, deleted: 3, kept: 5, failed: 0 },
        );
        report.record(
            ContentType::Page,
            CleanupResult { processed: 1, deleted: 0, kept: 2, failed: 1 },
        );
        report.record(
            ContentType::BlogPost,
            CleanupResult { processed: 1, deleted: 1, kept: 1, failed: 0 },
        );

        assert_eq!(report.per_type[&ContentType::Page].processed, 2);
        assert_eq!(report.per_type[&ContentType::Page].failed, 1);
        assert_eq!(report.total.deleted, 4);
        assert_eq!(report.total.kept, 8);
    }

    #[test]
    fn test_disabled_serializes_without_policy() {
        let report = CleanupReport::idle(Utc::now(), false);
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["revisions"]["enabled"], false);
        assert!(json["revisions"].get("policy").is_none());
        assert_eq!(json["trash"]["enabled"], false);
        assert!(json["trash"].get("retention_days").is_none());
    }

    #[test]
    fn test_per_type_keys_are_snake_case() {
        let mut report = TrashCleanupReport::new(30);
        report.record(ContentType::BlogPost, TrashResult { found: 2, deleted: 2, failed: 0 });
        let json = serde_json::to_value(&report).unwrap();

        assert_eq!(json["per_type"]["blog_post"]["deleted"], 2);
        assert_eq!(json["retention_days"], 30);
    }

    #[test]
    fn test_summary_line() {
        let mut report = CleanupReport::idle(Utc::now(), false);
        report.trash = TrashCleanupReport::new(30);
        report.trash.record(ContentType::Page, TrashResult { found: 3, deleted: 2, failed: 1 });

        assert_eq!(
            report.summary_line(),
            "Cleanup finished (revisions: disabled; trash: 3 expired, 2 purged, 1 failed)"
        );
        assert!(CleanupReport::idle(Utc::now(), true).summary_line().contains("skipped"));
    }
}
