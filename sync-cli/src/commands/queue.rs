//! Inspect or edit the offline mutation queue.
//!
//! Queue commands work directly on the durable queue in the local
//! store, so they never need the server connection.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use sync_client::{SyncQueue, SystemClock};
use sync_types::{EntityType, Operation};

use crate::store::FileStore;

async fn load_queue(data_dir: &Path) -> SyncQueue {
    let store = Arc::new(FileStore::new(data_dir));
    SyncQueue::load(store, Arc::new(SystemClock)).await
}

/// List queued changes.
pub async fn list(data_dir: &Path) -> Result<()> {
    let queue = load_queue(data_dir).await;
    let items = queue.items();

    if items.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    println!("{} queued change(s):", items.len());
    println!();
    for (i, item) in items.iter().enumerate() {
        println!(
            "  {}. {} {} {} (queued {})",
            i + 1,
            item.operation,
            item.entity_type,
            item.entity_id,
            item.timestamp
        );
        if item.retries > 0 {
            let error = item.last_error.as_deref().unwrap_or("unknown error");
            println!("     {} failed attempt(s), last: {}", item.retries, error);
        }
    }

    Ok(())
}

/// Show queue statistics.
pub async fn stats(data_dir: &Path) -> Result<()> {
    let queue = load_queue(data_dir).await;
    let stats = queue.stats();

    println!("Queue statistics:");
    println!();
    println!("  Total:     {}", stats.total);
    println!(
        "  By type:   {} job(s), {} resume(s), {} cover letter(s), {} settings",
        stats.by_type.jobs,
        stats.by_type.resumes,
        stats.by_type.cover_letters,
        stats.by_type.settings
    );
    println!(
        "  By op:     {} create(s), {} update(s), {} delete(s)",
        stats.by_operation.creates, stats.by_operation.updates, stats.by_operation.deletes
    );
    println!("  Retryable: {}", stats.retryable);
    println!("  Failed:    {}", stats.failed);

    Ok(())
}

/// Queue a change by hand.
pub async fn add(
    data_dir: &Path,
    entity_type: &str,
    entity_id: &str,
    operation: &str,
    data: Option<&str>,
) -> Result<()> {
    let entity_type: EntityType = entity_type.parse()?;
    let operation: Operation = operation.parse()?;

    let data = match data {
        Some(raw) => {
            Some(serde_json::from_str::<Value>(raw).context("--data is not valid JSON")?)
        }
        None => None,
    };
    if data.is_none() && !operation.is_delete() {
        anyhow::bail!("--data is required for {} operations", operation);
    }

    let queue = load_queue(data_dir).await;
    let item = queue.enqueue(entity_type, entity_id, operation, data).await;

    println!(
        "Queued {} {} {} as {}.",
        item.operation, item.entity_type, item.entity_id, item.id
    );
    println!("{} change(s) now queued.", queue.pending_count());

    Ok(())
}

/// Drop all queued changes.
pub async fn clear(data_dir: &Path) -> Result<()> {
    let queue = load_queue(data_dir).await;
    let dropped = queue.pending_count();
    queue.clear().await;

    println!("Removed {} queued change(s).", dropped);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn add_then_reload_roundtrip() {
        let dir = tempdir().unwrap();

        add(
            dir.path(),
            "job",
            "job_1",
            "create",
            Some(r#"{"company": "Acme"}"#),
        )
        .await
        .unwrap();

        let queue = load_queue(dir.path()).await;
        let items = queue.items();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].entity_id, "job_1");
        assert_eq!(items[0].entity_type, EntityType::Job);

        list(dir.path()).await.unwrap();
        stats(dir.path()).await.unwrap();
    }

    #[tokio::test]
    async fn add_coalesces_per_entity() {
        let dir = tempdir().unwrap();

        add(dir.path(), "job", "job_1", "create", Some(r#"{"v": 1}"#))
            .await
            .unwrap();
        add(dir.path(), "job", "job_1", "update", Some(r#"{"v": 2}"#))
            .await
            .unwrap();

        let queue = load_queue(dir.path()).await;
        assert_eq!(queue.pending_count(), 1);
    }

    #[tokio::test]
    async fn add_rejects_unknown_type_and_operation() {
        let dir = tempdir().unwrap();

        assert!(add(dir.path(), "invoice", "x", "create", Some("{}"))
            .await
            .is_err());
        assert!(add(dir.path(), "job", "x", "upsert", Some("{}"))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn add_rejects_invalid_json() {
        let dir = tempdir().unwrap();

        let result = add(dir.path(), "job", "job_1", "create", Some("not json")).await;
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("not valid JSON"), "got: {}", err);
    }

    #[tokio::test]
    async fn add_requires_data_for_creates() {
        let dir = tempdir().unwrap();

        assert!(add(dir.path(), "job", "job_1", "create", None).await.is_err());
        // Deletes carry no body.
        add(dir.path(), "job", "job_1", "delete", None).await.unwrap();
    }

    #[tokio::test]
    async fn clear_empties_the_queue() {
        let dir = tempdir().unwrap();

        add(dir.path(), "job", "a", "delete", None).await.unwrap();
        add(dir.path(), "resume", "b", "delete", None).await.unwrap();
        clear(dir.path()).await.unwrap();

        let queue = load_queue(dir.path()).await;
        assert_eq!(queue.pending_count(), 0);
    }

    #[tokio::test]
    async fn list_handles_empty_queue() {
        let dir = tempdir().unwrap();
        list(dir.path()).await.unwrap();
    }
}
