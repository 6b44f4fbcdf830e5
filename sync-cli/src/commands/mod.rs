//! Command implementations for jobdeck-sync.

pub mod export;
pub mod import;
pub mod init;
pub mod pull;
pub mod push;
pub mod queue;
pub mod status;
pub mod sync;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use sync_client::{AuthProvider, HttpSyncApi, StaticAuth, SyncManager, SyncManagerBuilder};

use crate::config::{DeviceConfig, ServerConfig};
use crate::store::FileStore;

/// Build a [`SyncManager`] wired to the configured server and the
/// on-disk store. Fails if `init` has not been run.
pub(crate) async fn build_manager(data_dir: &Path) -> Result<Arc<SyncManager>> {
    let device = DeviceConfig::load(data_dir).await?;
    let server = ServerConfig::load(data_dir).await?;

    let device_id = device.parsed_device_id()?;
    let auth: Arc<dyn AuthProvider> =
        Arc::new(StaticAuth::new(device_id, server.access_token.clone()));
    let api = HttpSyncApi::new(&server.server_url, Arc::clone(&auth))
        .context("Failed to create the API client")?;
    let store = Arc::new(FileStore::new(data_dir));

    SyncManagerBuilder::new()
        .with_api(Arc::new(api))
        .with_store(store)
        .with_auth(auth)
        .build()
        .await
        .context("Failed to initialize the sync engine")
}
