//! Read the root folder and list its children with the async client.
//!
//! Run:
//! `SAVE_RESTORE_BASE_URL=http://localhost:8080/save-restore cargo run --example async_root_children`

use save_restore_client::{ROOT_NODE_UID, SaveRestoreClient};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let base_url = match std::env::var("SAVE_RESTORE_BASE_URL") {
        Ok(value) => value,
        Err(_) => {
            eprintln!("Set SAVE_RESTORE_BASE_URL before running this example.");
            std::process::exit(2);
        }
    };

    let client = SaveRestoreClient::new(base_url)?;

    let root = client.node_get(ROOT_NODE_UID).await?;
    if let Some(node) = root.json() {
        println!("Root node:\n{}", serde_json::to_string_pretty(node)?);
    }

    let children = client.node_get_children(ROOT_NODE_UID).await?;
    if let Some(nodes) = children.json() {
        println!("Children:\n{}", serde_json::to_string_pretty(nodes)?);
    }
    Ok(())
}
