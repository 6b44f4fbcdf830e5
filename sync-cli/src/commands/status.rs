//! Show local and server sync status.

use anyhow::Result;
use std::path::Path;
use sync_types::Timestamp;

use crate::config::{DeviceConfig, ServerConfig};

/// Run the status command.
pub async fn run(data_dir: &Path, json: bool) -> Result<()> {
    if json {
        let manager = super::build_manager(data_dir).await?;
        let report = manager.status().await;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("=== jobdeck-sync status ===");
    println!();

    // Check device
    match DeviceConfig::load(data_dir).await {
        Ok(device) => {
            let id_display = if device.device_id.len() > 16 {
                &device.device_id[..16]
            } else {
                device.device_id.as_str()
            };
            println!("Device:");
            println!("  ID:   {}...", id_display);
            println!("  Name: {}", device.device_name);
            println!("  Init: {}", format_timestamp(&device.created_at));
        }
        Err(_) => {
            println!("Device: NOT INITIALIZED");
            println!();
            println!("Run 'jobdeck-sync init --name <name> --server <url>' to initialize.");
            return Ok(());
        }
    }

    println!();

    // Check server connection
    match ServerConfig::load(data_dir).await {
        Ok(server) => {
            println!("Server:");
            println!("  URL:   {}", server.server_url);
            let token = if server.access_token.is_some() {
                "configured"
            } else {
                "MISSING"
            };
            println!("  Token: {}", token);
        }
        Err(_) => {
            println!("Server: NOT CONFIGURED");
            println!();
            println!("Run 'jobdeck-sync init' to configure the server connection.");
            return Ok(());
        }
    }

    println!();

    let manager = super::build_manager(data_dir).await?;
    let report = manager.status().await;

    println!("Sync:");
    println!("  State:     {}", report.state);
    let last_sync = report
        .last_sync
        .as_ref()
        .map_or_else(|| "never".to_string(), format_timestamp);
    println!("  Last sync: {}", last_sync);
    println!("  Queued:    {} change(s)", report.queued_changes);
    if report.unresolved_conflicts > 0 {
        println!("  Conflicts: {} unresolved", report.unresolved_conflicts);
    }
    if let Some(error) = &report.last_error {
        println!("  Error:     {}", error);
    }

    println!();

    match (&report.server, &report.server_error) {
        (Some(server), _) => {
            println!("Server view:");
            if let Some(last_sync) = &server.last_sync {
                println!("  Last sync: {}", format_timestamp(last_sync));
            }
            println!("  Devices:   {} session(s)", server.sessions.len());
            for session in &server.sessions {
                let name = session.device_name.as_deref().unwrap_or("unnamed");
                let last = session
                    .last_sync
                    .as_ref()
                    .map_or_else(|| "never".to_string(), format_timestamp);
                println!("    {} (last sync {}, {} syncs)", name, last, session.sync_count);
            }
        }
        (None, Some(error)) => {
            println!("Server view: UNAVAILABLE");
            println!("  {}", error);
        }
        (None, None) => {}
    }

    Ok(())
}

/// Format a timestamp as a relative human-readable string.
fn format_timestamp(ts: &Timestamp) -> String {
    let secs = Timestamp::now().abs_diff_millis(ts) / 1000;

    if secs < 60 {
        "just now".to_string()
    } else if secs < 3600 {
        format!("{} minutes ago", secs / 60)
    } else if secs < 86400 {
        format!("{} hours ago", secs / 3600)
    } else {
        format!("{} days ago", secs / 86400)
    }
}
