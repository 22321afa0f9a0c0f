//! Globals - list every global the compositor advertises.
//!
//! Uses triggered dispatch: `roundtrip` pumps events until the compositor
//! has answered, so every `wl_registry.global` sent before is delivered.
//!
//! ```sh
//! cargo run --example globals
//! ```

use tracing_subscriber::EnvFilter;
use wayland_wire::Connection;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let connection = Connection::connect().await?;
    let registry = connection.display().get_registry().await?;
    connection.roundtrip().await?;

    for global in registry.globals() {
        println!("{:>4}  {:<40} v{}", global.name, global.interface, global.version);
    }

    connection.close().await?;
    Ok(())
}
