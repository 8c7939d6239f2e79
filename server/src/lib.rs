//! # Galaxy Game Server Library
//!
//! Authoritative server for a session-based real-time strategy game. Players
//! connect over TCP, ready up, receive a generated galaxy and then send
//! unordered commands (move, select, reinforce, attack) that the server
//! applies to the shared game state and relays to every participant.
//!
//! ## Architecture
//!
//! Three long-running tokio tasks form a pipeline:
//!
//! - **Receiver**: accepts connections while the session is in its lobby and
//!   decodes length-prefixed JSON frames into player events.
//! - **Resolver**: the only writer of the game state. Pops the most urgent
//!   inbound event, applies the game rules and queues notifications.
//! - **Broadcaster**: pops notifications and writes them to their recipients.
//!   A failed write takes the same disconnect path as a closed socket.
//!
//! The stages talk through two [`queue::PriorityEventQueue`]s. Movement is
//! resolved ahead of slower commands; equal priorities keep arrival order.
//! Every loop watches one shutdown channel, and [`network::ServerHandle::stop`]
//! joins them all.
//!
//! ## Session lifecycle
//!
//! `Lobby` → (every player ready, at least two) → `MapReady` → `AwaitingRender`
//! → (every player rendered) → `Playing` → (fewer than two players hold a
//! planet) → `GameOver` → back to `Lobby`.
//!
//! ## Module Organization
//!
//! - `config`: command line options
//! - `connection`: sockets of connected players
//! - `error`: server error kinds
//! - `event`: inbound and outbound pipeline events
//! - `game`: players, phases and the combat and economy rules
//! - `map`: galaxy generation
//! - `network`: receiver, broadcaster and server handle
//! - `planet`: planets and the planet registry
//! - `queue`: the priority event queue
//! - `resolver`: the game-rule state machine
//! - `utils`: id generation and rounding helpers
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::config::ServerConfig;
//! use server::map::GalaxyGenerator;
//! use server::network::Server;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::default();
//!     let generator = GalaxyGenerator::new(config.map_scale, config.map_seed);
//!
//!     let handle = Server::bind(config).await?.start(Box::new(generator))?;
//!     tokio::signal::ctrl_c().await?;
//!     handle.stop().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod game;
pub mod map;
pub mod network;
pub mod planet;
pub mod queue;
pub mod resolver;
pub mod utils;
