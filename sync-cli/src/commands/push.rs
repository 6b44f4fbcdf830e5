//! Push queued local changes to the server.

use anyhow::{Context, Result};
use std::path::Path;

/// Run the push command.
pub async fn run(data_dir: &Path) -> Result<()> {
    let manager = super::build_manager(data_dir).await?;

    let pending = manager.pending_changes();
    if pending == 0 {
        println!("Nothing to push.");
        return Ok(());
    }

    println!("Pushing {} queued change(s)...", pending);
    let summary = manager.push().await.context("Push failed")?;

    println!(
        "Push complete: {} accepted, {} rejected",
        summary.total_success(),
        summary.total_failed()
    );
    for error in &summary.errors {
        println!(
            "  {} {}: {}",
            error.entity,
            error.id.as_deref().unwrap_or("(unknown id)"),
            error.error
        );
    }

    let remaining = manager.pending_changes();
    if remaining > 0 {
        println!("{} change(s) still queued for retry.", remaining);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, ServerConfig};
    use crate::store::FileStore;
    use serde_json::json;
    use std::sync::Arc;
    use sync_client::{SyncQueue, SystemClock};
    use sync_types::{EntityType, Operation};
    use tempfile::tempdir;

    async fn init_configs(dir: &Path, token: Option<&str>) {
        DeviceConfig::new("Test").save(dir).await.unwrap();
        ServerConfig::new("http://127.0.0.1:9", token)
            .save(dir)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn push_requires_init() {
        let dir = tempdir().unwrap();
        assert!(run(dir.path()).await.is_err());
    }

    #[tokio::test]
    async fn push_with_empty_queue_skips_the_network() {
        let dir = tempdir().unwrap();
        init_configs(dir.path(), Some("tok")).await;

        // The server is unreachable, but an empty queue never dials it.
        run(dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn push_against_unreachable_server_fails() {
        let dir = tempdir().unwrap();
        init_configs(dir.path(), Some("tok")).await;

        let store = Arc::new(FileStore::new(dir.path()));
        let queue = SyncQueue::load(store, Arc::new(SystemClock)).await;
        queue
            .enqueue(
                EntityType::Job,
                "job_1",
                Operation::Create,
                Some(json!({"company": "Acme"})),
            )
            .await;

        let result = run(dir.path()).await;
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Push failed"), "got: {}", err);
    }
}
