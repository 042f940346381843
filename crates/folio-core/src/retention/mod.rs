//! Tiered revision retention.
//!
//! A content item's revision history is thinned to three tiers: the most
//! recent `keep_recent` revisions, one revision per calendar month inside the
//! `keep_monthly` window and one per calendar year inside the `keep_yearly`
//! window. Window ages use fixed 30-day months and 365-day years; the bucket
//! keys use the calendar month and year of the revision timestamp.

mod engine;

pub use engine::{plan, KeepReason, KeptRevision, RetentionPlan, RetentionPolicy, RevisionStamp};
