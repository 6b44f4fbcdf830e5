//! Configuration files for jobdeck-sync.
//!
//! Two JSON files live at the root of the data directory: `device.json`
//! holds the device identity, `server.json` holds the server URL and the
//! account's access token. Both are written with 0600 permissions.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use sync_types::{DeviceId, Timestamp};

/// Device identity stored locally in `device.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Unique device identifier (URL-safe base64).
    pub device_id: String,
    /// Human-readable device name.
    pub device_name: String,
    /// When the device was initialized.
    pub created_at: Timestamp,
}

impl DeviceConfig {
    /// Create a new device configuration with a random device id.
    pub fn new(name: &str) -> Self {
        Self {
            device_id: DeviceId::random().to_string(),
            device_name: name.to_string(),
            created_at: Timestamp::now(),
        }
    }

    /// Parse the stored device id.
    pub fn parsed_device_id(&self) -> Result<DeviceId> {
        self.device_id
            .parse()
            .context("Invalid device id in device.json")
    }

    /// Load device configuration from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("device.json");
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Device not initialized. Run 'jobdeck-sync init' first.")?;
        serde_json::from_str(&contents).context("Invalid device configuration")
    }

    /// Save device configuration to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join("device.json");
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save device configuration")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if the device is initialized.
    pub async fn exists(data_dir: &Path) -> bool {
        data_dir.join("device.json").exists()
    }
}

/// Server connection stored locally in `server.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the sync server.
    pub server_url: String,
    /// Bearer token for the account session.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// When the server connection was configured.
    pub configured_at: Timestamp,
}

impl ServerConfig {
    /// Create a new server configuration.
    pub fn new(server_url: &str, access_token: Option<&str>) -> Self {
        Self {
            server_url: server_url.to_string(),
            access_token: access_token.map(str::to_string),
            configured_at: Timestamp::now(),
        }
    }

    /// Load server configuration from a directory.
    pub async fn load(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join("server.json");
        let contents = tokio::fs::read_to_string(&path)
            .await
            .context("Server not configured. Run 'jobdeck-sync init' first.")?;
        serde_json::from_str(&contents).context("Invalid server configuration")
    }

    /// Save server configuration to a directory.
    pub async fn save(&self, data_dir: &Path) -> Result<()> {
        let path = data_dir.join("server.json");
        let contents = serde_json::to_string_pretty(self)?;
        tokio::fs::write(&path, contents)
            .await
            .context("Failed to save server configuration")?;
        set_file_permissions_0600(&path).await?;
        Ok(())
    }

    /// Check if a server connection is configured.
    pub async fn exists(data_dir: &Path) -> bool {
        data_dir.join("server.json").exists()
    }
}

/// Set file permissions to 0600 (owner read/write only) on Unix.
/// No-op on non-Unix platforms.
async fn set_file_permissions_0600(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .await
            .context("Failed to set file permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Set directory permissions to 0700 (owner only) on Unix.
/// No-op on non-Unix platforms.
pub async fn set_dir_permissions_0700(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))
            .await
            .context("Failed to set directory permissions")?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn device_config_roundtrip() {
        let dir = tempdir().unwrap();
        let config = DeviceConfig::new("Work Laptop");
        config.save(dir.path()).await.unwrap();

        let loaded = DeviceConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.device_id, config.device_id);
        assert_eq!(loaded.device_name, "Work Laptop");
        assert_eq!(loaded.created_at, config.created_at);
        loaded.parsed_device_id().unwrap();
    }

    #[tokio::test]
    async fn device_config_load_missing_fails() {
        let dir = tempdir().unwrap();
        let err = DeviceConfig::load(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not initialized"), "got: {}", err);
    }

    #[tokio::test]
    async fn server_config_roundtrip_with_token() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::new("https://sync.jobdeck.app", Some("tok-123"));
        config.save(dir.path()).await.unwrap();

        let loaded = ServerConfig::load(dir.path()).await.unwrap();
        assert_eq!(loaded.server_url, "https://sync.jobdeck.app");
        assert_eq!(loaded.access_token.as_deref(), Some("tok-123"));
    }

    #[tokio::test]
    async fn server_config_token_is_optional() {
        let dir = tempdir().unwrap();
        let config = ServerConfig::new("https://sync.jobdeck.app", None);
        config.save(dir.path()).await.unwrap();

        // The token field is omitted entirely when absent.
        let raw = tokio::fs::read_to_string(dir.path().join("server.json"))
            .await
            .unwrap();
        assert!(!raw.contains("access_token"));

        let loaded = ServerConfig::load(dir.path()).await.unwrap();
        assert!(loaded.access_token.is_none());
    }

    #[tokio::test]
    async fn server_config_load_missing_fails() {
        let dir = tempdir().unwrap();
        let err = ServerConfig::load(dir.path()).await.unwrap_err();
        assert!(err.to_string().contains("not configured"), "got: {}", err);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn config_file_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        DeviceConfig::new("Test").save(dir.path()).await.unwrap();
        ServerConfig::new("http://localhost", Some("t"))
            .save(dir.path())
            .await
            .unwrap();

        for file in ["device.json", "server.json"] {
            let path = dir.path().join(file);
            let perms = tokio::fs::metadata(&path).await.unwrap().permissions();
            assert_eq!(perms.mode() & 0o777, 0o600, "{} should be 0600", file);
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn data_dir_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let data_dir = dir.path().join("jobdeck-data");
        tokio::fs::create_dir_all(&data_dir).await.unwrap();
        set_dir_permissions_0700(&data_dir).await.unwrap();

        let perms = tokio::fs::metadata(&data_dir).await.unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o700, "dir should be 0700");
    }
}
