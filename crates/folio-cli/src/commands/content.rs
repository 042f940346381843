use anyhow::Result;
use uuid::Uuid;

use folio_core::{
    content::{ContentStatus, NewContent},
    storage::{ContentRepository, Database},
    ContentType,
};

pub async fn create(
    db: &Database,
    content_type: ContentType,
    title: &str,
    slug: Option<String>,
    content: Option<String>,
    publish: bool,
) -> Result<()> {
    let status = if publish {
        ContentStatus::Published
    } else {
        ContentStatus::Draft
    };

    let item = ContentRepository::new(db)
        .create(
            content_type,
            &NewContent {
                title: title.to_string(),
                content: content.unwrap_or_default(),
                slug,
                status,
            },
        )
        .await?;

    println!("Created {} '{}' ({}).", content_type, item.title, item.id);
    Ok(())
}

pub async fn save(
    db: &Database,
    content_type: ContentType,
    id: Uuid,
    title: Option<&str>,
    content: &str,
    autosave: bool,
) -> Result<()> {
    let revision = ContentRepository::new(db)
        .save(content_type, id, title, content, autosave)
        .await?;

    let kind = if autosave { "Autosaved" } else { "Saved" };
    println!("{} '{}' as revision {}.", kind, revision.title, revision.id);
    Ok(())
}

pub async fn list(db: &Database, content_type: ContentType) -> Result<()> {
    let items = ContentRepository::new(db).list(content_type).await?;

    if items.is_empty() {
        println!("No {} items yet.", content_type);
        return Ok(());
    }

    println!("{} ({}):\n", content_type, items.len());
    for item in &items {
        println!(
            "  {} - {} [{}] updated {}",
            item.id,
            item.title,
            item.status.as_str(),
            item.updated_at.format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}
