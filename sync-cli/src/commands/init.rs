//! Initialize the device identity and server connection.

use anyhow::Result;
use std::path::Path;

use crate::config::{DeviceConfig, ServerConfig};

/// Run the init command.
pub async fn run(data_dir: &Path, name: &str, server: &str, token: Option<&str>) -> Result<()> {
    if DeviceConfig::exists(data_dir).await {
        anyhow::bail!(
            "Device already initialized. Delete {} to start over.",
            data_dir.join("device.json").display()
        );
    }

    let device = DeviceConfig::new(name);
    device.save(data_dir).await?;

    let server_config = ServerConfig::new(server, token);
    server_config.save(data_dir).await?;

    println!("Device initialized!");
    println!();
    println!("  Device ID:   {}", device.device_id);
    println!("  Device name: {}", device.device_name);
    println!("  Server:      {}", server);
    println!("  Data dir:    {}", data_dir.display());

    if token.is_none() {
        println!();
        println!("No access token configured; sync will report offline.");
        println!("Add one to server.json when you have a session token.");
    }

    println!();
    println!("Next steps:");
    println!("  jobdeck-sync status    # check the connection");
    println!("  jobdeck-sync sync      # run a full sync");

    Ok(())
}
