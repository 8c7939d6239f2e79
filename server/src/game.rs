//! Authoritative session state: players, planets and the lifecycle phase.
//!
//! Only the resolver task holds a `GameState`, so nothing in here locks.

use crate::error::ServerError;
use crate::planet::{Planet, PlanetRegistry, MAX_GARRISON};
use crate::utils::{percentage_of, IdGenerator};
use log::info;
use shared::{PlanetId, PlayerId, PlayerInfo, UnitId};
use std::collections::{BTreeMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;

/// Minimum number of players needed to start a session.
pub const MIN_PLAYERS: usize = 2;

/// Most units one `select` may launch across all its planets, so the
/// resulting `select` notification always fits in a frame.
pub const MAX_SELECTED_UNITS: u32 = 2 * MAX_GARRISON;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Lobby,
    MapReady,
    AwaitingRender,
    Playing,
    GameOver,
}

impl Phase {
    /// True while players may still toggle readiness.
    pub fn before_play(self) -> bool {
        matches!(self, Phase::Lobby | Phase::MapReady | Phase::AwaitingRender)
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub id: PlayerId,
    pub addr: SocketAddr,
    pub name: String,
    pub ready: bool,
    pub rendered: bool,
    pub owned_units: HashSet<UnitId>,
}

impl Player {
    pub fn new(id: PlayerId, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            name: format!("client {}", id),
            ready: false,
            rendered: false,
            owned_units: HashSet::new(),
        }
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            id: self.id,
            name: self.name.clone(),
            ready: self.ready,
        }
    }

    fn reset_session_flags(&mut self) {
        self.ready = false;
        self.rendered = false;
        self.owned_units.clear();
    }
}

/// Result of one `damage` command.
#[derive(Debug, Clone, PartialEq)]
pub struct Strike {
    pub planet: PlanetId,
    pub units_count: u32,
    pub owner: Option<PlayerId>,
    pub captured: bool,
}

#[derive(Debug)]
pub struct GameState {
    phase: Phase,
    players: BTreeMap<PlayerId, Player>,
    planets: PlanetRegistry,
    ids: Arc<IdGenerator>,
}

impl GameState {
    pub fn new(ids: Arc<IdGenerator>) -> Self {
        Self {
            phase: Phase::Lobby,
            players: BTreeMap::new(),
            planets: PlanetRegistry::new(),
            ids,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            info!("Session phase {:?} -> {:?}", self.phase, phase);
            self.phase = phase;
        }
    }

    pub fn ids(&self) -> &IdGenerator {
        &self.ids
    }

    pub fn add_player(&mut self, id: PlayerId, addr: SocketAddr) -> &Player {
        info!("Added player {} from {}", id, addr);
        self.players
            .entry(id)
            .or_insert_with(|| Player::new(id, addr))
    }

    pub fn remove_player(&mut self, id: PlayerId) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    pub fn player(&self, id: PlayerId) -> Option<&Player> {
        self.players.get(&id)
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.players.values()
    }

    pub fn player_ids(&self) -> Vec<PlayerId> {
        self.players.keys().copied().collect()
    }

    pub fn player_count(&self) -> usize {
        self.players.len()
    }

    pub fn roster(&self) -> Vec<PlayerInfo> {
        self.players.values().map(Player::info).collect()
    }

    pub fn planets(&self) -> &PlanetRegistry {
        &self.planets
    }

    pub fn set_ready(&mut self, id: PlayerId, ready: bool) -> Result<(), ServerError> {
        self.player_mut(id)?.ready = ready;
        Ok(())
    }

    pub fn set_rendered(&mut self, id: PlayerId) -> Result<(), ServerError> {
        self.player_mut(id)?.rendered = true;
        Ok(())
    }

    /// Lobby exit guard: enough players and every one of them ready.
    pub fn all_ready(&self) -> bool {
        self.players.len() >= MIN_PLAYERS && self.players.values().all(|p| p.ready)
    }

    pub fn all_rendered(&self) -> bool {
        !self.players.is_empty() && self.players.values().all(|p| p.rendered)
    }

    /// Replaces the planet set with a freshly generated galaxy.
    pub fn install_map(&mut self, planets: Vec<Planet>) {
        self.planets.clear();
        for planet in planets {
            self.planets.insert(planet);
        }
        info!("Installed galaxy with {} planets", self.planets.len());
    }

    pub fn owns_unit(&self, player: PlayerId, unit: UnitId) -> bool {
        self.players
            .get(&player)
            .map_or(false, |p| p.owned_units.contains(&unit))
    }

    /// Launches `percentage` of the garrison of every listed planet the player
    /// owns as fresh units. Planets the player does not own are skipped. Once
    /// `MAX_SELECTED_UNITS` have launched, later planets keep their garrison.
    pub fn select_units(
        &mut self,
        player: PlayerId,
        planet_ids: &[PlanetId],
        percentage: u32,
    ) -> Result<BTreeMap<PlanetId, Vec<UnitId>>, ServerError> {
        if !self.players.contains_key(&player) {
            return Err(ServerError::UnknownPlayer(player));
        }

        let mut selected = BTreeMap::new();
        let mut budget = MAX_SELECTED_UNITS;
        for &planet_id in planet_ids {
            if selected.contains_key(&planet_id) {
                continue;
            }
            let planet = match self.planets.get_mut(planet_id) {
                Some(planet) if planet.is_owned_by(player) => planet,
                _ => continue,
            };

            let spawned = percentage_of(planet.units_count, percentage).min(budget);
            budget -= spawned;
            planet.units_count -= spawned;
            let units = self.ids.take(spawned);
            selected.insert(planet_id, units);
        }

        let owner = self.player_mut(player)?;
        for units in selected.values() {
            owner.owned_units.extend(units.iter().copied());
        }
        Ok(selected)
    }

    /// Adds units to a planet the player owns, up to the garrison cap.
    /// Returns how many were actually added.
    pub fn reinforce(
        &mut self,
        player: PlayerId,
        planet_id: PlanetId,
        hp: u32,
    ) -> Result<u32, ServerError> {
        let planet = self
            .planets
            .get_mut(planet_id)
            .ok_or(ServerError::UnknownPlanet(planet_id))?;
        if !planet.is_owned_by(player) {
            return Err(ServerError::PlanetNotOwned {
                player,
                planet: planet_id,
            });
        }

        Ok(planet.reinforce(hp))
    }

    /// Spends one of the player's units against a planet.
    pub fn strike(
        &mut self,
        player: PlayerId,
        planet_id: PlanetId,
        unit: UnitId,
        hp: u32,
    ) -> Result<Strike, ServerError> {
        if !self.owns_unit(player, unit) {
            return Err(ServerError::UnitNotOwned { player, unit });
        }
        let planet = self
            .planets
            .get_mut(planet_id)
            .ok_or(ServerError::UnknownPlanet(planet_id))?;

        let captured = planet.take_hit(player, hp);
        let strike = Strike {
            planet: planet.id,
            units_count: planet.units_count,
            owner: planet.owner,
            captured,
        };

        self.player_mut(player)?.owned_units.remove(&unit);
        if captured {
            info!("Player {} captured planet {}", player, planet_id);
        }
        Ok(strike)
    }

    /// Players in the session that still own at least one planet.
    pub fn active_players(&self) -> Vec<PlayerId> {
        self.players
            .keys()
            .copied()
            .filter(|&id| self.planets.owned_by(id).next().is_some())
            .collect()
    }

    /// Back to the lobby: planets cleared, players kept with fresh flags.
    pub fn reset_to_lobby(&mut self) {
        self.planets.clear();
        for player in self.players.values_mut() {
            player.reset_session_flags();
        }
        self.set_phase(Phase::Lobby);
    }

    fn player_mut(&mut self, id: PlayerId) -> Result<&mut Player, ServerError> {
        self.players
            .get_mut(&id)
            .ok_or(ServerError::UnknownPlayer(id))
    }
}
