use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use folio_core::{storage::Database, AppConfig, ContentType};

mod commands;

#[derive(Parser)]
#[command(name = "folio")]
#[command(author, version, about = "Revision retention and trash maintenance for Folio CMS")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run revision cleanup and trash purge once
    Cleanup {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Inspect and restore revisions
    Revisions {
        #[command(subcommand)]
        action: RevisionsAction,
    },
    /// Manage the trash
    Trash {
        #[command(subcommand)]
        action: TrashAction,
    },
    /// Create and edit content
    Content {
        #[command(subcommand)]
        action: ContentAction,
    },
    /// Background daemon for scheduled cleanup
    Daemon {
        #[command(subcommand)]
        action: DaemonAction,
    },
}

#[derive(Subcommand)]
enum RevisionsAction {
    /// List the revisions of an item, newest first
    List {
        /// Content type (page or blog)
        #[arg(short = 't', long = "type")]
        content_type: ContentType,
        #[arg(long)]
        id: Uuid,
    },
    /// Show which revisions the retention policy would keep or delete
    Plan {
        #[arg(short = 't', long = "type")]
        content_type: ContentType,
        #[arg(long)]
        id: Uuid,
    },
    /// Roll an item back to a revision
    Restore {
        #[arg(short = 't', long = "type")]
        content_type: ContentType,
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        revision: Uuid,
    },
}

#[derive(Subcommand)]
enum TrashAction {
    /// List trashed items
    List {
        #[arg(short = 't', long = "type")]
        content_type: Option<ContentType>,
    },
    /// Move an item to the trash
    Move {
        #[arg(short = 't', long = "type")]
        content_type: ContentType,
        #[arg(long)]
        id: Uuid,
        /// Permanently delete after this many days, if sooner than the retention window
        #[arg(long)]
        purge_after_days: Option<u32>,
        /// Who deleted the item
        #[arg(long = "by")]
        deleted_by: Option<String>,
    },
    /// Take an item out of the trash
    Restore {
        #[arg(short = 't', long = "type")]
        content_type: ContentType,
        #[arg(long)]
        id: Uuid,
    },
    /// Permanently delete a trashed item now
    Purge {
        #[arg(short = 't', long = "type")]
        content_type: ContentType,
        #[arg(long)]
        id: Uuid,
    },
}

#[derive(Subcommand)]
enum ContentAction {
    /// Create an item with its first revision
    Create {
        #[arg(short = 't', long = "type")]
        content_type: ContentType,
        #[arg(long)]
        title: String,
        #[arg(long)]
        slug: Option<String>,
        #[arg(long)]
        content: Option<String>,
        /// Create as published instead of draft
        #[arg(long)]
        publish: bool,
    },
    /// Save new content, recording a revision
    Save {
        #[arg(short = 't', long = "type")]
        content_type: ContentType,
        #[arg(long)]
        id: Uuid,
        #[arg(long)]
        content: String,
        #[arg(long)]
        title: Option<String>,
        /// Record the revision as an autosave
        #[arg(long)]
        autosave: bool,
    },
    /// List live items
    List {
        #[arg(short = 't', long = "type")]
        content_type: ContentType,
    },
}

#[derive(Subcommand)]
enum DaemonAction {
    /// Start the background daemon
    Start,
    /// Stop the background daemon
    Stop,
    /// Check daemon status
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    // Load configuration
    let config = Arc::new(AppConfig::load()?);

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    // Daemon stop/status only need the PID file
    if let Commands::Daemon { action } = &cli.command {
        match action {
            DaemonAction::Stop => return commands::daemon::stop(&config).await,
            DaemonAction::Status => return commands::daemon::status(&config).await,
            DaemonAction::Start => {}
        }
    }

    // Initialize database
    let db = Arc::new(Database::new(&config).await?);

    match cli.command {
        Commands::Cleanup { json } => commands::cleanup::run(db, config, json).await,
        Commands::Revisions { action } => match action {
            RevisionsAction::List { content_type, id } => {
                commands::revisions::list(&db, content_type, id).await
            }
            RevisionsAction::Plan { content_type, id } => {
                commands::revisions::plan(&db, &config, content_type, id).await
            }
            RevisionsAction::Restore {
                content_type,
                id,
                revision,
            } => commands::revisions::restore(&db, content_type, id, revision).await,
        },
        Commands::Trash { action } => match action {
            TrashAction::List { content_type } => {
                commands::trash::list(&db, &config, content_type).await
            }
            TrashAction::Move {
                content_type,
                id,
                purge_after_days,
                deleted_by,
            } => {
                commands::trash::move_to_trash(
                    &db,
                    content_type,
                    id,
                    purge_after_days,
                    deleted_by.as_deref(),
                )
                .await
            }
            TrashAction::Restore { content_type, id } => {
                commands::trash::restore(&db, content_type, id).await
            }
            TrashAction::Purge { content_type, id } => {
                commands::trash::purge(&db, content_type, id).await
            }
        },
        Commands::Content { action } => match action {
            ContentAction::Create {
                content_type,
                title,
                slug,
                content,
                publish,
            } => {
                commands::content::create(&db, content_type, &title, slug, content, publish)
                    .await
            }
            ContentAction::Save {
                content_type,
                id,
                content,
                title,
                autosave,
            } => {
                commands::content::save(
                    &db,
                    content_type,
                    id,
                    title.as_deref(),
                    &content,
                    autosave,
                )
                .await
            }
            ContentAction::List { content_type } => {
                commands::content::list(&db, content_type).await
            }
        },
        Commands::Daemon { .. } => commands::daemon::start(db, config).await,
    }
}
