//! Planets and the per-session planet arena.

use shared::{Coords, PlanetChange, PlanetDict, PlanetId, PlanetKind, PlayerId};
use std::collections::BTreeMap;

/// Largest garrison a planet can hold. Keeps every `select` launch small
/// enough to be reported in one frame.
pub const MAX_GARRISON: u32 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct Planet {
    pub id: PlanetId,
    pub coords: Coords,
    pub kind: PlanetKind,
    pub owner: Option<PlayerId>,
    pub units_count: u32,
}

impl Planet {
    pub fn new(
        id: PlanetId,
        coords: Coords,
        kind: PlanetKind,
        owner: Option<PlayerId>,
        units_count: u32,
    ) -> Self {
        Self {
            id,
            coords,
            kind,
            owner,
            units_count,
        }
    }

    pub fn is_owned_by(&self, player: PlayerId) -> bool {
        self.owner == Some(player)
    }

    /// Adds up to `hp` units without passing `MAX_GARRISON`. Returns how
    /// many were actually added.
    pub fn reinforce(&mut self, hp: u32) -> u32 {
        let added = hp.min(MAX_GARRISON.saturating_sub(self.units_count));
        self.units_count += added;
        added
    }

    /// Applies one unit's hit. The owner's own units heal the planet, anyone
    /// else's damage it. A hit at least as strong as the garrison captures the
    /// planet and the surplus becomes the new garrison.
    ///
    /// Returns true when ownership changed.
    pub fn take_hit(&mut self, attacker: PlayerId, hp: u32) -> bool {
        if self.is_owned_by(attacker) {
            self.reinforce(hp);
            return false;
        }

        let remaining = i64::from(self.units_count) - i64::from(hp);
        if remaining <= 0 {
            self.owner = Some(attacker);
            self.units_count = remaining.unsigned_abs().min(u64::from(MAX_GARRISON)) as u32;
            true
        } else {
            self.units_count = remaining as u32;
            false
        }
    }

    pub fn to_dict(&self) -> PlanetDict {
        PlanetDict {
            id: self.id,
            kind: self.kind,
            owner: self.owner,
            units_count: self.units_count,
            coords: self.coords,
        }
    }

    pub fn change(&self) -> PlanetChange {
        PlanetChange {
            id: self.id,
            units_count: self.units_count,
            owner: self.owner,
        }
    }
}

/// Planets of the running session, keyed by id.
#[derive(Debug, Default, Clone)]
pub struct PlanetRegistry {
    planets: BTreeMap<PlanetId, Planet>,
}

impl PlanetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, planet: Planet) {
        self.planets.insert(planet.id, planet);
    }

    pub fn get(&self, id: PlanetId) -> Option<&Planet> {
        self.planets.get(&id)
    }

    pub fn get_mut(&mut self, id: PlanetId) -> Option<&mut Planet> {
        self.planets.get_mut(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Planet> {
        self.planets.values()
    }

    pub fn owned_by(&self, player: PlayerId) -> impl Iterator<Item = &Planet> {
        self.planets
            .values()
            .filter(move |planet| planet.is_owned_by(player))
    }

    pub fn len(&self) -> usize {
        self.planets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planets.is_empty()
    }

    pub fn clear(&mut self) {
        self.planets.clear();
    }

    pub fn to_dicts(&self) -> Vec<PlanetDict> {
        self.planets.values().map(Planet::to_dict).collect()
    }
}
