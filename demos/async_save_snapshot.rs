//! Take a snapshot of a configuration and persist it, as an authenticated
//! user, with the async client.
//!
//! Run:
//! `SAVE_RESTORE_USER_NAME=user SAVE_RESTORE_USER_PASSWORD=userPass \
//!  SAVE_RESTORE_CONFIG_ID=<uniqueId> cargo run --example async_save_snapshot`
//!
//! Required env vars:
//! - `SAVE_RESTORE_BASE_URL`
//! - `SAVE_RESTORE_CONFIG_ID` (uniqueId of a configuration node)
//! - `SAVE_RESTORE_USER_NAME` / `SAVE_RESTORE_USER_PASSWORD`
//!
//! Optional env vars:
//! - `SAVE_RESTORE_SNAPSHOT_NAME` (defaults to `demo snapshot`)

use save_restore_client::SaveRestoreClient;

fn require_env(name: &str) -> String {
    match std::env::var(name) {
        Ok(value) => value,
        Err(_) => {
            eprintln!("Set {name} before running this example.");
            std::process::exit(2);
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = require_env("SAVE_RESTORE_BASE_URL");
    let config_id = require_env("SAVE_RESTORE_CONFIG_ID");
    let user_name = require_env("SAVE_RESTORE_USER_NAME");
    let password = require_env("SAVE_RESTORE_USER_PASSWORD");
    let snapshot_name =
        std::env::var("SAVE_RESTORE_SNAPSHOT_NAME").unwrap_or_else(|_| "demo snapshot".to_owned());

    let mut client = SaveRestoreClient::new(base_url)?;
    client.auth_set(&user_name, &password);

    let saved = client
        .take_snapshot_save(&config_id, Some(&snapshot_name), Some("created by demo"), None)
        .await?;
    if let Some(node) = saved.json() {
        println!("Snapshot node:\n{}", serde_json::to_string_pretty(node)?);
    }
    Ok(())
}
