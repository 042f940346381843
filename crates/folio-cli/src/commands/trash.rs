use anyhow::Result;
use chrono::{Duration, Utc};
use uuid::Uuid;

use folio_core::{
    storage::{Database, TrashRepository},
    AppConfig, ContentType,
};

pub async fn list(
    db: &Database,
    config: &AppConfig,
    content_type: Option<ContentType>,
) -> Result<()> {
    let repo = TrashRepository::new(db);
    let types = match content_type {
        Some(t) => vec![t],
        None => ContentType::ALL.to_vec(),
    };
    let retention_days = config.trash.retention_days;
    let now = Utc::now();

    let mut total = 0;
    for content_type in types {
        let entries = repo.list(content_type).await?;
        total += entries.len();

        for entry in &entries {
            let by = entry.deleted_by.as_deref().unwrap_or("unknown");
            let due = if entry.is_expired(retention_days, now) {
                "due now".to_string()
            } else {
                format!(
                    "purge after {}",
                    entry.purge_due_at(retention_days).format("%Y-%m-%d %H:%M")
                )
            };
            println!(
                "  [{}] {} - {} (deleted {} by {}, {})",
                content_type,
                entry.item_id,
                entry.title,
                entry.deleted_at.format("%Y-%m-%d %H:%M"),
                by,
                due
            );
        }
    }

    if total == 0 {
        println!("Trash is empty.");
    }

    Ok(())
}

pub async fn move_to_trash(
    db: &Database,
    content_type: ContentType,
    id: Uuid,
    purge_after_days: Option<u32>,
    deleted_by: Option<&str>,
) -> Result<()> {
    let now = Utc::now();
    let purge_at = purge_after_days.map(|days| now + Duration::days(days as i64));

    let entry = TrashRepository::new(db)
        .move_to_trash(content_type, id, deleted_by, purge_at, now)
        .await?;

    println!("Moved '{}' to the trash.", entry.title);
    if let Some(at) = entry.scheduled_permanent_delete_at {
        println!("Scheduled for permanent deletion at {}.", at.format("%Y-%m-%d %H:%M"));
    }
    Ok(())
}

pub async fn restore(db: &Database, content_type: ContentType, id: Uuid) -> Result<()> {
    let item = TrashRepository::new(db).restore(content_type, id).await?;
    println!("Restored '{}' from the trash.", item.title);
    Ok(())
}

/// Permanently delete a trashed item and everything that depends on it
pub async fn purge(db: &Database, content_type: ContentType, id: Uuid) -> Result<()> {
    let removed = TrashRepository::new(db).force_delete(content_type, id).await?;
    println!("Permanently deleted {} {} ({} rows removed).", content_type, id, removed);
    Ok(())
}
