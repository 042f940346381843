use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use folio_core::{
    scheduler::{SchedulerEvent, SchedulerService},
    storage::Database,
    AppConfig,
};

/// Check if daemon is running
fn is_daemon_running(pid_path: &Path) -> Option<u32> {
    if !pid_path.exists() {
        return None;
    }

    let mut file = fs::File::open(pid_path).ok()?;
    let mut contents = String::new();
    file.read_to_string(&mut contents).ok()?;
    let pid: u32 = contents.trim().parse().ok()?;

    #[cfg(unix)]
    {
        use std::process::Command;
        let output = Command::new("kill")
            .arg("-0")
            .arg(pid.to_string())
            .output()
            .ok()?;
        if output.status.success() {
            return Some(pid);
        }
    }

    #[cfg(windows)]
    {
        return Some(pid);
    }

    // Stale PID file
    let _ = fs::remove_file(pid_path);
    None
}

fn write_pid_file(pid_path: &Path) -> Result<()> {
    if let Some(parent) = pid_path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::File::create(pid_path)?;
    writeln!(file, "{}", std::process::id())?;
    Ok(())
}

/// Wait for Ctrl+C, or SIGTERM on unix
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}

/// One console line per scheduler event
fn describe_event(event: &SchedulerEvent) -> String {
    let at = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    match event {
        SchedulerEvent::CleanupFinished { report } => format!("[{}] {}", at, report.summary_line()),
        SchedulerEvent::CleanupSkipped => {
            format!("[{}] Cleanup skipped: another run holds the lock", at)
        }
        SchedulerEvent::Error { task, message } => format!("[{}] {} failed: {}", at, task, message),
    }
}

/// Start the daemon in the foreground
pub async fn start(db: Arc<Database>, config: Arc<AppConfig>) -> Result<()> {
    let pid_path = config.pid_path();

    if let Some(pid) = is_daemon_running(&pid_path) {
        println!("Daemon is already running (PID: {})", pid);
        return Ok(());
    }

    println!("Starting folio daemon...");
    write_pid_file(&pid_path)?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal");
        let _ = shutdown_tx.send(true);
    });

    let (event_tx, mut event_rx) = mpsc::unbounded_channel();
    let scheduler = SchedulerService::new(db, Arc::clone(&config)).with_event_sender(event_tx);
    let events = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            println!("{}", describe_event(&event));
        }
    });

    println!(
        "Daemon started (PID: {}). Press Ctrl+C or run 'folio daemon stop' to stop.",
        std::process::id()
    );
    println!("  Cleanup interval: {} seconds", config.maintenance.interval_secs);
    println!(
        "  Revision cleanup: {} ({})",
        if config.revisions.cleanup_enabled { "on" } else { "off" },
        config.revisions.policy()
    );
    println!(
        "  Trash auto-delete: {} ({} days)",
        if config.trash.auto_delete_enabled { "on" } else { "off" },
        config.trash.retention_days
    );

    // First run right away, then on the interval
    if let Err(e) = scheduler.run_now().await {
        warn!("Initial cleanup failed: {}", e);
    }
    scheduler.run(shutdown_rx).await;
    // The scheduler owned the only sender, so the printer drains and exits
    let _ = events.await;

    let _ = fs::remove_file(&pid_path);
    println!("Daemon stopped.");

    Ok(())
}

pub async fn stop(config: &AppConfig) -> Result<()> {
    let pid_path = config.pid_path();

    match is_daemon_running(&pid_path) {
        Some(pid) => {
            println!("Stopping daemon (PID: {})...", pid);

            #[cfg(unix)]
            {
                use std::process::Command;
                let output = Command::new("kill")
                    .arg("-TERM")
                    .arg(pid.to_string())
                    .output()?;

                if output.status.success() {
                    // Give the current run a moment to release its lock
                    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;

                    if is_daemon_running(&pid_path).is_none() {
                        println!("Daemon stopped successfully.");
                    } else {
                        let _ = Command::new("kill").arg("-9").arg(pid.to_string()).output();
                        let _ = fs::remove_file(&pid_path);
                        println!("Daemon forcefully terminated.");
                    }
                } else {
                    println!(
                        "Failed to stop daemon. You may need to kill it manually: kill {}",
                        pid
                    );
                }
            }

            #[cfg(windows)]
            {
                println!("Please stop the daemon manually on Windows (PID: {})", pid);
            }
        }
        None => {
            println!("Daemon is not running.");
        }
    }

    Ok(())
}

pub async fn status(config: &AppConfig) -> Result<()> {
    let pid_path = config.pid_path();

    match is_daemon_running(&pid_path) {
        Some(pid) => {
            println!("Daemon is running (PID: {})", pid);
            println!("PID file: {}", pid_path.display());
        }
        None => {
            println!("Daemon is not running.");
        }
    }

    Ok(())
}
