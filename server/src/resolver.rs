//! Resolver stage: the only writer of game state.
//!
//! Pops player events in priority order, applies the session rules and queues
//! the resulting notifications for the broadcaster. A failing event is logged
//! and skipped; it never stops the loop.

use crate::error::ServerError;
use crate::event::{OutboundEvent, PlayerEvent, PlayerEventKind};
use crate::game::{GameState, Phase, MIN_PLAYERS};
use crate::map::MapGenerator;
use crate::queue::PriorityEventQueue;
use log::{debug, info, warn};
use shared::{ClientMessage, PlayerId, ServerMessage};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

pub struct Resolver {
    state: GameState,
    generator: Box<dyn MapGenerator + Send>,
    phase: watch::Sender<Phase>,
}

impl Resolver {
    pub fn new(
        state: GameState,
        generator: Box<dyn MapGenerator + Send>,
        phase: watch::Sender<Phase>,
    ) -> Self {
        phase.send_replace(state.phase());
        Self {
            state,
            generator,
            phase,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Applies one event and returns the notifications it produced.
    pub fn handle(&mut self, event: PlayerEvent) -> Result<Vec<OutboundEvent>, ServerError> {
        let mut out = Vec::new();
        let sender = event.sender;

        let result = match event.kind {
            PlayerEventKind::Joined { addr } => {
                self.on_joined(sender, addr, &mut out);
                Ok(())
            }
            PlayerEventKind::Left => {
                self.on_left(sender, &mut out);
                Ok(())
            }
            PlayerEventKind::Command(message) => self.on_command(sender, message, &mut out),
        };

        self.phase.send_replace(self.state.phase());
        result.map(|()| out)
    }

    fn on_joined(&mut self, player: PlayerId, addr: SocketAddr, out: &mut Vec<OutboundEvent>) {
        if self.state.phase() != Phase::Lobby {
            info!(
                "Player {} joined after the lobby closed, dropping connection",
                player
            );
            out.push(OutboundEvent::Drop { player });
            return;
        }

        let roster = self.state.roster();
        let info = self.state.add_player(player, addr).info();

        out.push(OutboundEvent::to_player(
            player,
            ServerMessage::PlayerInit {
                players: roster,
                id: player,
            },
        ));
        out.push(OutboundEvent::to_others(
            player,
            ServerMessage::Connect { player: info },
        ));
    }

    fn on_left(&mut self, player: PlayerId, out: &mut Vec<OutboundEvent>) {
        let removed = match self.state.remove_player(player) {
            Some(removed) => removed,
            None => return,
        };
        out.push(OutboundEvent::broadcast(ServerMessage::Disconnect {
            player: removed.info(),
        }));

        match self.state.phase() {
            Phase::Lobby => self.try_start_map(out),
            Phase::MapReady | Phase::AwaitingRender => {
                if self.state.player_count() < MIN_PLAYERS {
                    let winner = self.state.player_ids().first().copied();
                    self.finish(winner, out);
                } else {
                    self.try_start_game(out);
                }
            }
            Phase::Playing => self.check_game_over(out),
            Phase::GameOver => {}
        }
    }

    fn on_command(
        &mut self,
        player: PlayerId,
        message: ClientMessage,
        out: &mut Vec<OutboundEvent>,
    ) -> Result<(), ServerError> {
        if self.state.player(player).is_none() {
            return Err(ServerError::UnknownPlayer(player));
        }

        let phase = self.state.phase();
        let allowed = match &message {
            ClientMessage::Ready { .. } => phase.before_play(),
            ClientMessage::Rendered {} => {
                matches!(phase, Phase::MapReady | Phase::AwaitingRender)
            }
            _ => phase == Phase::Playing,
        };
        if !allowed {
            debug!(
                "Dropping {} from player {} during {:?}",
                message.name(),
                player,
                phase
            );
            return Ok(());
        }

        match message {
            ClientMessage::Ready { ready } => {
                self.state.set_ready(player, ready)?;
                out.push(OutboundEvent::broadcast(ServerMessage::Ready { player, ready }));
                if phase == Phase::Lobby {
                    self.try_start_map(out);
                }
            }
            ClientMessage::Rendered {} => {
                self.state.set_rendered(player)?;
                self.try_start_game(out);
            }
            ClientMessage::Move { unit_id, x, y } => {
                if !self.state.owns_unit(player, unit_id) {
                    return Err(ServerError::UnitNotOwned {
                        player,
                        unit: unit_id,
                    });
                }
                out.push(OutboundEvent::broadcast(ServerMessage::Move { unit_id, x, y }));
            }
            ClientMessage::Select { from, percentage } => {
                let selected = self.state.select_units(player, &from, percentage)?;
                out.push(OutboundEvent::broadcast(ServerMessage::Select { selected }));
            }
            ClientMessage::AddHp {
                planet_id,
                hp_count,
            } => {
                let added = self.state.reinforce(player, planet_id, hp_count)?;
                out.push(OutboundEvent::broadcast(ServerMessage::AddHp {
                    planet_id,
                    hp_count: added,
                }));
            }
            ClientMessage::Damage {
                planet_id,
                unit_id,
                hp_count,
            } => {
                let strike = self.state.strike(player, planet_id, unit_id, hp_count)?;
                let planet_change = self
                    .state
                    .planets()
                    .get(strike.planet)
                    .map(|planet| planet.change())
                    .ok_or(ServerError::UnknownPlanet(strike.planet))?;
                out.push(OutboundEvent::broadcast(ServerMessage::Damage {
                    planet_change,
                    unit_id,
                }));
                self.check_game_over(out);
            }
        }
        Ok(())
    }

    /// Lobby -> map ready -> awaiting render once everyone is ready.
    fn try_start_map(&mut self, out: &mut Vec<OutboundEvent>) {
        if self.state.phase() != Phase::Lobby || !self.state.all_ready() {
            return;
        }

        self.state.set_phase(Phase::MapReady);
        let players = self.state.player_ids();
        let planets = self.generator.generate(&players, self.state.ids());
        self.state.install_map(planets);

        out.push(OutboundEvent::broadcast(ServerMessage::MapInit {
            map: self.state.planets().to_dicts(),
        }));
        self.state.set_phase(Phase::AwaitingRender);
    }

    fn try_start_game(&mut self, out: &mut Vec<OutboundEvent>) {
        if !matches!(self.state.phase(), Phase::MapReady | Phase::AwaitingRender)
            || !self.state.all_rendered()
        {
            return;
        }

        self.state.set_phase(Phase::Playing);
        out.push(OutboundEvent::broadcast(ServerMessage::GameStarted {}));
    }

    fn check_game_over(&mut self, out: &mut Vec<OutboundEvent>) {
        let active = self.state.active_players();
        if active.len() < MIN_PLAYERS {
            self.finish(active.first().copied(), out);
        }
    }

    fn finish(&mut self, winner: Option<PlayerId>, out: &mut Vec<OutboundEvent>) {
        self.state.set_phase(Phase::GameOver);
        info!("Game over, winner: {:?}", winner);
        out.push(OutboundEvent::broadcast(ServerMessage::GameOver { winner }));
        self.state.reset_to_lobby();
    }

    /// Resolver loop. Runs until the shutdown flag flips.
    pub async fn run(
        mut self,
        inbound: Arc<PriorityEventQueue<PlayerEvent>>,
        outbound: Arc<PriorityEventQueue<OutboundEvent>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Resolver started");

        loop {
            if *shutdown.borrow() {
                break;
            }

            let event = tokio::select! {
                _ = shutdown.changed() => break,
                event = inbound.remove() => event,
            };

            let sender = event.sender;
            match self.handle(event) {
                Ok(events) => {
                    for event in events {
                        let priority = event.priority();
                        outbound.insert(event, priority);
                    }
                }
                Err(e) if e.is_unknown_reference() => {
                    debug!("Ignoring command from player {}: {}", sender, e);
                }
                Err(e) => {
                    warn!("Failed to resolve event from player {}: {}", sender, e);
                }
            }
        }

        info!("Resolver stopped");
    }
}
