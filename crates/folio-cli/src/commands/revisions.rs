use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use folio_core::{
    maintenance::RevisionCleanupTask,
    storage::{ContentRepository, Database, RevisionRepository},
    AppConfig, ContentType,
};

pub async fn list(db: &Database, content_type: ContentType, id: Uuid) -> Result<()> {
    let item = ContentRepository::new(db).get(content_type, id).await?;
    let revisions = RevisionRepository::new(db).list(content_type, id).await?;

    println!("Revisions of {} '{}' ({}):\n", content_type, item.title, revisions.len());

    for revision in &revisions {
        let kind = if revision.is_autosave { " [autosave]" } else { "" };
        println!(
            "  {}  {}  {}{}",
            revision.id,
            revision.created_at.format("%Y-%m-%d %H:%M"),
            revision.title,
            kind
        );
    }

    Ok(())
}

/// Show what a cleanup run would do to one item, without deleting anything
pub async fn plan(
    db: &Database,
    config: &AppConfig,
    content_type: ContentType,
    id: Uuid,
) -> Result<()> {
    ContentRepository::new(db).get(content_type, id).await?;

    let policy = config.revisions.policy();
    let task = RevisionCleanupTask::new(db, policy, config.maintenance.batch_size);
    let plan = task.preview(content_type, id, Utc::now()).await?;

    println!("Policy: {}", policy);
    if !config.revisions.cleanup_enabled {
        println!("(revision cleanup is disabled; scheduled runs will not apply this plan)");
    }

    println!("\nKeep ({}):", plan.kept_count());
    for kept in &plan.keep {
        println!(
            "  {}  {}  {}",
            kept.id,
            kept.created_at.format("%Y-%m-%d %H:%M"),
            kept.reason.as_str()
        );
    }

    println!("\nDelete ({}):", plan.delete.len());
    for id in &plan.delete {
        println!("  {}", id);
    }

    Ok(())
}

pub async fn restore(
    db: &Database,
    content_type: ContentType,
    id: Uuid,
    revision_id: Uuid,
) -> Result<()> {
    let revision = ContentRepository::new(db)
        .restore_revision(content_type, id, revision_id)
        .await?;

    println!(
        "Restored {} {} to revision {} (new revision {}).",
        content_type, id, revision_id, revision.id
    );
    Ok(())
}
