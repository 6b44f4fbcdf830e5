//! Run one full sync cycle.

use anyhow::Result;
use std::path::Path;
use sync_client::{OfflineReason, SyncOutcome, SyncSummary};

/// Run the sync command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let manager = super::build_manager(data_dir).await?;

    let pending = manager.pending_changes();
    println!("Syncing ({} queued change(s))...", pending);

    match manager.sync().await {
        SyncOutcome::Completed(summary) => {
            print_summary(&summary);
            Ok(())
        }
        SyncOutcome::Skipped => {
            println!("A sync is already running.");
            Ok(())
        }
        SyncOutcome::Disabled => {
            println!("Sync is disabled in settings.");
            Ok(())
        }
        SyncOutcome::Offline(OfflineReason::NotAuthenticated) => {
            anyhow::bail!(
                "Not authenticated. Add an access token to {}.",
                data_dir.join("server.json").display()
            )
        }
        SyncOutcome::Offline(OfflineReason::NoConnectivity) => {
            anyhow::bail!("Offline. Check your network connection.")
        }
        SyncOutcome::Failed { error } => anyhow::bail!("Sync failed: {}", error),
    }
}

fn print_summary(summary: &SyncSummary) {
    println!("Sync complete!");
    println!();
    println!(
        "  Pushed:    {} accepted, {} rejected",
        summary.push.total_success(),
        summary.push.total_failed()
    );
    println!(
        "  Applied:   {} saved, {} deleted",
        summary.applied.saved, summary.applied.deleted
    );
    if summary.applied.settings {
        println!("  Settings:  updated from server");
    }
    if summary.conflicts_detected > 0 {
        println!(
            "  Conflicts: {} detected, {} unresolved",
            summary.conflicts_detected, summary.conflicts_unresolved
        );
    }
    println!("  Watermark: {}", summary.timestamp);
}
