use chatrelay_server::{RelayServer, Settings};
use dotenv::dotenv;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> chatrelay_server::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logging
    FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();

    // Load configuration
    let config = Settings::new()?;
    info!("Configuration loaded successfully");

    // Bind the listener up front: failure here is the one fatal error,
    // and it must exit the process with a non-zero status
    let listener =
        TcpListener::bind(format!("{}:{}", config.server.host, config.server.port)).await?;

    info!(
        "Relay server listening on ws://{}:{}",
        config.server.host, config.server.port
    );

    let server = Arc::new(RelayServer::new());
    server.run(listener).await;

    Ok(())
}
