//! Read the live PV values of a configuration without persisting them.
//!
//! Run:
//! `SAVE_RESTORE_CONFIG_ID=<uniqueId> cargo run --example blocking_take_snapshot`
//!
//! Required env vars:
//! - `SAVE_RESTORE_BASE_URL`
//! - `SAVE_RESTORE_CONFIG_ID` (uniqueId of a configuration node)

use save_restore_client::BlockingSaveRestoreClient;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = match std::env::var("SAVE_RESTORE_BASE_URL") {
        Ok(value) => value,
        Err(_) => {
            eprintln!("Set SAVE_RESTORE_BASE_URL before running this example.");
            std::process::exit(2);
        }
    };
    let config_id = match std::env::var("SAVE_RESTORE_CONFIG_ID") {
        Ok(value) => value,
        Err(_) => {
            eprintln!("Set SAVE_RESTORE_CONFIG_ID before running this example.");
            std::process::exit(2);
        }
    };

    let client = BlockingSaveRestoreClient::new(base_url)?;

    // GET /take-snapshot reads the PVs but does not store a snapshot node
    let snapshot = client.take_snapshot_get(&config_id)?;
    if let Some(items) = snapshot.json() {
        println!("{}", serde_json::to_string_pretty(items)?);
    }
    Ok(())
}
