//! Pull server changes and apply them locally.

use anyhow::{Context, Result};
use std::path::Path;

/// Run the pull command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let manager = super::build_manager(data_dir).await?;

    println!("Pulling changes from the server...");
    let applied = manager.pull().await.context("Pull failed")?;

    println!(
        "Pull complete: {} saved, {} deleted",
        applied.saved, applied.deleted
    );
    if applied.settings {
        println!("  Settings updated from server.");
    }
    if let Some(watermark) = manager.last_sync() {
        println!("  Watermark: {}", watermark);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, ServerConfig};
    use tempfile::tempdir;

    #[tokio::test]
    async fn pull_requires_init() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn pull_against_unreachable_server_fails() {
        let dir = tempdir().unwrap();
        DeviceConfig::new("Test").save(dir.path()).await.unwrap();
        ServerConfig::new("http://127.0.0.1:9", Some("tok"))
            .save(dir.path())
            .await
            .unwrap();

        let result = run(dir.path()).await;
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Pull failed"), "got: {}", err);
    }
}
