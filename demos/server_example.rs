//! packetlog Server Example

use packetlog::config::ServerConfig;
use packetlog::server::{LogServer, ShutdownController};
use tempfile::tempdir;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Starting packetlog Server Example");

    // Keep the journal out of /var/tmp for this example
    let temp_dir = tempdir()?;

    let mut config = ServerConfig::default();
    config.server.bind_address = "127.0.0.1".to_string();
    config.storage.data_file = temp_dir.path().join("journal");
    config.logging.syslog.enabled = false;

    println!("Configuration created:");
    println!("  Address: {}", config.server.socket_addr()?);
    println!("  Journal: {}", config.storage.data_file.display());

    let shutdown = ShutdownController::new();
    shutdown.listen_for_signals()?;
    let server = LogServer::with_shutdown(config, shutdown).await?;

    println!("packetlog server starting...");
    println!("Press Ctrl+C to stop the server");

    if let Err(e) = server.run().await {
        eprintln!("Server error: {}", e);
    }

    println!("Server stopped");
    Ok(())
}
