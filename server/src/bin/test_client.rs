//! Headless bot for smoke testing a running server. Run two of them against
//! one server to play a full session.

use clap::Parser;
use log::{debug, info, warn};
use shared::{
    decode_body, read_frame, write_frame, ClientMessage, PlanetDict, PlanetId, PlayerId,
    ServerMessage,
};
use std::collections::BTreeMap;
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server address to connect to
    #[arg(short = 's', long, default_value = "127.0.0.1:10800")]
    server: String,

    /// Name used in this bot's log lines
    #[arg(short = 'n', long, default_value = "bot")]
    name: String,

    /// Share of the home garrison sent to attack, in percent
    #[arg(short = 'p', long, default_value = "50")]
    percentage: u32,
}

/// What the bot knows about the session.
#[derive(Default)]
struct BotState {
    id: Option<PlayerId>,
    planets: BTreeMap<PlanetId, PlanetDict>,
}

impl BotState {
    fn home(&self) -> Option<&PlanetDict> {
        let id = self.id?;
        self.planets.values().find(|p| p.owner == Some(id))
    }

    /// Closest planet this bot does not own.
    fn nearest_target(&self, from: &PlanetDict) -> Option<&PlanetDict> {
        self.planets
            .values()
            .filter(|p| p.owner != self.id)
            .min_by(|a, b| {
                from.coords
                    .distance(&a.coords)
                    .total_cmp(&from.coords.distance(&b.coords))
            })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();

    info!("[{}] Connecting to {}", args.name, args.server);
    let mut stream = TcpStream::connect(&args.server).await?;
    let mut state = BotState::default();

    write_frame(&mut stream, &ClientMessage::Ready { ready: true }).await?;

    loop {
        let body = match read_frame(&mut stream).await? {
            Some(body) => body,
            None => {
                info!("[{}] Server closed the connection", args.name);
                break;
            }
        };

        let message: ServerMessage = match decode_body(&body) {
            Ok(message) => message,
            Err(e) => {
                warn!("[{}] Undecodable frame: {}", args.name, e);
                continue;
            }
        };
        info!("[{}] <- {}", args.name, message.name());
        debug!("[{}] {:?}", args.name, message);

        match message {
            ServerMessage::PlayerInit { players, id } => {
                info!("[{}] Joined as player {} ({} already here)", args.name, id, players.len());
                state.id = Some(id);
            }
            ServerMessage::MapInit { map } => {
                state.planets = map.into_iter().map(|p| (p.id, p)).collect();
                write_frame(&mut stream, &ClientMessage::Rendered {}).await?;
            }
            ServerMessage::GameStarted {} => {
                if let Some(home) = state.home() {
                    let select = ClientMessage::Select {
                        from: vec![home.id],
                        percentage: args.percentage,
                    };
                    write_frame(&mut stream, &select).await?;
                }
            }
            ServerMessage::Select { selected } => {
                let home = match state.home() {
                    Some(home) => home,
                    None => continue,
                };
                let units = match selected.get(&home.id) {
                    Some(units) => units.clone(),
                    None => continue,
                };
                let target = match state.nearest_target(home) {
                    Some(target) => target.clone(),
                    None => continue,
                };

                info!(
                    "[{}] Sending {} units to planet {}",
                    args.name,
                    units.len(),
                    target.id
                );
                for unit_id in units {
                    let movement = ClientMessage::Move {
                        unit_id,
                        x: f64::from(target.coords.x),
                        y: f64::from(target.coords.y),
                    };
                    write_frame(&mut stream, &movement).await?;

                    let hit = ClientMessage::Damage {
                        planet_id: target.id,
                        unit_id,
                        hp_count: shared::DEFAULT_HIT_POINTS,
                    };
                    write_frame(&mut stream, &hit).await?;
                }
            }
            ServerMessage::Damage { planet_change, .. } => {
                if let Some(planet) = state.planets.get_mut(&planet_change.id) {
                    planet.owner = planet_change.owner;
                    planet.units_count = planet_change.units_count;
                }
            }
            ServerMessage::AddHp {
                planet_id,
                hp_count,
            } => {
                if let Some(planet) = state.planets.get_mut(&planet_id) {
                    planet.units_count += hp_count;
                }
            }
            ServerMessage::GameOver { winner } => {
                info!("[{}] Game over, winner: {:?}", args.name, winner);
                break;
            }
            _ => {}
        }
    }

    info!("[{}] Test client finished", args.name);
    Ok(())
}
