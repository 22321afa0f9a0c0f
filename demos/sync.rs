//! Sync - connect to the compositor and wait for a `wl_callback.done`.
//!
//! This demo shows:
//! - Connecting with settings from `XDG_RUNTIME_DIR` / `WAYLAND_DISPLAY`
//! - Sending `wl_display.sync` and waiting on the callback's slot
//! - Closing the connection
//!
//! ```sh
//! RUST_LOG=wayland_wire=trace cargo run --example sync
//! ```

use std::time::Duration;

use tracing_subscriber::EnvFilter;
use wayland_wire::{Connection, DispatchMode};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let connection = Connection::builder()
        .dispatch_mode(DispatchMode::FreeRunning)
        .connect()
        .await?;

    let callback = connection.display().sync().await?;
    match tokio::time::timeout(Duration::from_secs(5), callback.done().recv()).await {
        Ok(Some(data)) => println!("sync done, callback data {data}"),
        Ok(None) => println!("connection closed before sync completed"),
        Err(_) => println!("compositor did not answer within 5s"),
    }

    connection.close().await?;
    Ok(())
}
