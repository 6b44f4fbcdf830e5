//! Restore account data from a backup file.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::Path;
use sync_types::{ExportPayload, PullData};

/// Run the import command.
pub async fn run(data_dir: &Path, file: &Path, overwrite: bool) -> Result<()> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let data = parse_backup(&contents)?;

    let manager = super::build_manager(data_dir).await?;

    let mode = if overwrite {
        " (replacing server data)"
    } else {
        ""
    };
    println!("Importing {} record(s){}...", data.record_count(), mode);

    let response = manager
        .import_data(data, overwrite)
        .await
        .context("Import failed")?;
    if !response.success {
        anyhow::bail!("Server rejected the import");
    }

    println!("Import complete!");
    if let Some(results) = &response.results {
        println!("  Accepted: {}", results.total_success());
        if results.total_failed() > 0 {
            println!("  Rejected: {}", results.total_failed());
        }
    }

    Ok(())
}

/// Parse a backup file: either a full export payload or bare account
/// data.
fn parse_backup(contents: &str) -> Result<PullData> {
    let value: Value = serde_json::from_str(contents).context("Backup file is not valid JSON")?;
    if value.get("data").is_some() {
        let payload: ExportPayload =
            serde_json::from_value(value).context("Invalid export payload")?;
        Ok(payload.data)
    } else {
        serde_json::from_value(value).context("Invalid backup data")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeviceConfig, ServerConfig};
    use tempfile::tempdir;

    #[test]
    fn parse_backup_accepts_export_payloads() {
        let contents = r#"{
            "version": "1.0",
            "exportedAt": "2024-06-01T00:00:00.000Z",
            "data": {
                "jobs": [{"id": "job_1", "data": {"company": "Acme"}}],
                "settings": {"theme": "dark"}
            }
        }"#;

        let data = parse_backup(contents).unwrap();
        assert_eq!(data.record_count(), 2);
        assert_eq!(data.jobs[0].id, "job_1");
        assert!(data.settings.is_some());
    }

    #[test]
    fn parse_backup_accepts_bare_data() {
        let contents = r#"{
            "jobs": [{"id": "job_1"}],
            "coverLetters": [{"id": "cl_1"}]
        }"#;

        let data = parse_backup(contents).unwrap();
        assert_eq!(data.record_count(), 2);
        assert_eq!(data.cover_letters[0].id, "cl_1");
    }

    #[test]
    fn parse_backup_rejects_invalid_json() {
        let err = parse_backup("not json").unwrap_err();
        assert!(err.to_string().contains("not valid JSON"), "got: {}", err);
    }

    #[tokio::test]
    async fn import_requires_a_readable_file() {
        let dir = tempdir().unwrap();

        let result = run(dir.path(), &dir.path().join("missing.json"), false).await;
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to read"), "got: {}", err);
    }

    #[tokio::test]
    async fn import_against_unreachable_server_fails() {
        let dir = tempdir().unwrap();
        DeviceConfig::new("Test").save(dir.path()).await.unwrap();
        ServerConfig::new("http://127.0.0.1:9", Some("tok"))
            .save(dir.path())
            .await
            .unwrap();

        let backup = dir.path().join("backup.json");
        tokio::fs::write(&backup, r#"{"jobs": [{"id": "job_1"}]}"#)
            .await
            .unwrap();

        let result = run(dir.path(), &backup, false).await;
        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Import failed"), "got: {}", err);
    }
}
