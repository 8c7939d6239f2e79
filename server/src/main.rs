use clap::Parser;
use log::info;
use server::config::ServerConfig;
use server::map::GalaxyGenerator;
use server::network::Server;

/// Main-method of the application.
/// Parses command-line arguments, binds the listener and runs the pipeline until Ctrl+C.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Hint: set RUST_LOG=info (or debug) to see server logs");
    }
    env_logger::init();

    let config = ServerConfig::parse();
    let generator = GalaxyGenerator::new(config.map_scale, config.map_seed);

    // Failing to bind is the only fatal error.
    let server = Server::bind(config).await?;
    let handle = server.start(Box::new(generator))?;
    info!("Accepting players on {}", handle.local_addr());

    tokio::signal::ctrl_c().await?;
    info!("Received Ctrl+C, shutting down gracefully...");
    handle.stop().await;

    Ok(())
}
