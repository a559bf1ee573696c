//! Watch a key and print every new value
//!
//! Run with: KV_ENDPOINT=http://localhost:3000 cargo run --example watch_key -- <key>

use raccoon_kv_client::{logging, Client, ClientConfig, WatchContext};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init();

    let key = std::env::args().nth(1).unwrap_or_else(|| "example:hello".to_string());

    let config = ClientConfig::from_env().unwrap_or_else(|_| ClientConfig::default());
    let client = Client::with_config(config)?;

    let current = client.get(&key).await?;
    info!(
        "Current value of '{}' (found: {}, version: {}): {}",
        key,
        current.found,
        current.version,
        String::from_utf8_lossy(&current.value)
    );

    // Stop on Ctrl-C
    let ctx = WatchContext::new();
    let stop = ctx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received SIGINT, stopping watch");
            stop.cancel();
        }
    });

    client
        .watch(&key, &ctx, |value| {
            info!("'{}' changed: {}", key, String::from_utf8_lossy(&value));
        })
        .await;

    Ok(())
}
