use std::sync::Arc;

use anyhow::Result;

use folio_core::{storage::Database, AppConfig, CleanupOrchestrator};

pub async fn run(db: Arc<Database>, config: Arc<AppConfig>, json: bool) -> Result<()> {
    let report = CleanupOrchestrator::new(db, Arc::clone(&config)).run().await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.skipped {
        println!("Another cleanup run holds the lock; nothing was done.");
        return Ok(());
    }

    if report.revisions.enabled {
        let t = &report.revisions.total;
        println!(
            "Revisions ({}): {} items processed, {} deleted, {} kept, {} failed",
            config.revisions.policy(),
            t.processed,
            t.deleted,
            t.kept,
            t.failed
        );
        for (content_type, r) in &report.revisions.per_type {
            println!(
                "  {}: {} items, {} deleted, {} kept, {} failed",
                content_type, r.processed, r.deleted, r.kept, r.failed
            );
        }
    } else {
        println!("Revision cleanup is disabled.");
    }

    if report.trash.enabled {
        let t = &report.trash.total;
        println!(
            "Trash (retention {} days): {} expired, {} purged, {} failed",
            config.trash.retention_days, t.found, t.deleted, t.failed
        );
        for (content_type, r) in &report.trash.per_type {
            println!(
                "  {}: {} expired, {} purged, {} failed",
                content_type, r.found, r.deleted, r.failed
            );
        }
    } else {
        println!("Trash auto-delete is disabled.");
    }

    Ok(())
}
