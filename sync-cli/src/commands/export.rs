//! Download a full account backup.

use anyhow::{Context, Result};
use std::path::Path;

/// Run the export command.
pub async fn run(data_dir: &Path, output: Option<&Path>) -> Result<()> {
    let manager = super::build_manager(data_dir).await?;

    let payload = manager.export_data().await.context("Export failed")?;
    let contents = serde_json::to_string_pretty(&payload)?;

    match output {
        Some(path) => {
            tokio::fs::write(path, &contents)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!(
                "Export written to {} ({} record(s)).",
                path.display(),
                payload.data.record_count()
            );
        }
        // Bare JSON on stdout so the output can be piped.
        None => println!("{}", contents),
    }

    Ok(())
}
