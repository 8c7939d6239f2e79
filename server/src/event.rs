//! Events flowing through the two pipeline queues.

use crate::queue::Priority;
use shared::{ClientMessage, PlayerId, ServerMessage};
use std::net::SocketAddr;

/// Something a connected player caused, queued for the resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerEvent {
    pub sender: PlayerId,
    pub kind: PlayerEventKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEventKind {
    /// The receiver accepted a new connection for this player.
    Joined { addr: SocketAddr },
    /// A decoded frame.
    Command(ClientMessage),
    /// The connection is gone and has been removed from the connection table.
    Left,
}

impl PlayerEvent {
    pub fn joined(sender: PlayerId, addr: SocketAddr) -> Self {
        Self {
            sender,
            kind: PlayerEventKind::Joined { addr },
        }
    }

    pub fn command(sender: PlayerId, message: ClientMessage) -> Self {
        Self {
            sender,
            kind: PlayerEventKind::Command(message),
        }
    }

    pub fn left(sender: PlayerId) -> Self {
        Self {
            sender,
            kind: PlayerEventKind::Left,
        }
    }

    /// Movement jumps ahead of every slower command. A join is queued ahead of
    /// the new player's first command, a leave behind the commands it sent.
    pub fn priority(&self) -> Priority {
        match &self.kind {
            PlayerEventKind::Joined { .. } => Priority::HIGH,
            PlayerEventKind::Command(ClientMessage::Move { .. }) => Priority::HIGH,
            PlayerEventKind::Command(_) => Priority::NORMAL,
            PlayerEventKind::Left => Priority::NORMAL,
        }
    }
}

/// Who receives an outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recipients {
    All,
    Only(Vec<PlayerId>),
    AllExcept(PlayerId),
}

impl Recipients {
    pub fn includes(&self, player: PlayerId) -> bool {
        match self {
            Recipients::All => true,
            Recipients::Only(players) => players.contains(&player),
            Recipients::AllExcept(excluded) => *excluded != player,
        }
    }
}

/// Work for the broadcaster.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    Send {
        message: ServerMessage,
        recipients: Recipients,
    },
    /// Close a connection the session will not admit.
    Drop { player: PlayerId },
}

impl OutboundEvent {
    pub fn broadcast(message: ServerMessage) -> Self {
        OutboundEvent::Send {
            message,
            recipients: Recipients::All,
        }
    }

    pub fn to_player(player: PlayerId, message: ServerMessage) -> Self {
        OutboundEvent::Send {
            message,
            recipients: Recipients::Only(vec![player]),
        }
    }

    pub fn to_others(player: PlayerId, message: ServerMessage) -> Self {
        OutboundEvent::Send {
            message,
            recipients: Recipients::AllExcept(player),
        }
    }

    /// Movement rebroadcasts jump ahead of every other notification.
    pub fn priority(&self) -> Priority {
        match self {
            OutboundEvent::Send {
                message: ServerMessage::Move { .. },
                ..
            } => Priority::HIGH,
            _ => Priority::NORMAL,
        }
    }
}
