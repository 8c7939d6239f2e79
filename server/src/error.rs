//! Error kinds raised while accepting connections and resolving commands.

use shared::{FrameError, PlanetId, PlayerId, UnitId};
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    /// The listening socket could not be created. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("protocol framing error: {0}")]
    ProtocolFraming(#[from] FrameError),

    #[error("player {0} is not in the session")]
    UnknownPlayer(PlayerId),

    #[error("planet {0} does not exist")]
    UnknownPlanet(PlanetId),

    #[error("unit {unit} is not owned by player {player}")]
    UnitNotOwned { player: PlayerId, unit: UnitId },

    #[error("planet {planet} is not owned by player {player}")]
    PlanetNotOwned { player: PlayerId, planet: PlanetId },

    #[error("connection from {0} refused: lobby closed or full")]
    CapacityExceeded(SocketAddr),

    #[error("player {0} disconnected")]
    PeerDisconnected(PlayerId),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ServerError {
    /// Errors caused by a command naming something the sender cannot touch.
    /// These are dropped silently.
    pub fn is_unknown_reference(&self) -> bool {
        matches!(
            self,
            ServerError::UnknownPlayer(_)
                | ServerError::UnknownPlanet(_)
                | ServerError::UnitNotOwned { .. }
                | ServerError::PlanetNotOwned { .. }
        )
    }
}
