//! Command line configuration for the game server.

use clap::Parser;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Server IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    pub host: String,

    /// Server port to listen on
    #[arg(short, long, default_value = "10800")]
    pub port: u16,

    /// Maximum number of players in one session
    #[arg(short, long, default_value = "8")]
    pub max_clients: usize,

    /// Upper bound in seconds on a single wait for new connections
    #[arg(long, default_value = "10")]
    pub poll_timeout: u64,

    /// Galaxy size multiplier (the map is 16x9 times this value)
    #[arg(long, default_value = "100")]
    pub map_scale: u32,

    /// Seed for reproducible galaxies
    #[arg(long)]
    pub map_seed: Option<u64>,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout.max(1))
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig::parse_from(["server"])
    }
}
