//! Procedural galaxy generation.
//!
//! The galaxy is a 16:9 rectangle centred on the origin. Every player gets a
//! `Big` home planet on a common circle, a neutral `Biggest` planet sits in the
//! middle, each home is surrounded by a cluster of secondary planets and the
//! rest of the space is filled with scattered planets. All planets keep a
//! clearance radius from each other and from the rectangle border.

use crate::planet::Planet;
use crate::utils::IdGenerator;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use shared::{Coords, PlanetKind, PlayerId};
use std::f64::consts::PI;

pub const LENGTH_MULTIPLIER: u32 = 16;
pub const HEIGHT_MULTIPLIER: u32 = 9;
pub const HOME_UNITS: u32 = 100;
pub const MIN_PLANETS: usize = 40;
pub const MAX_PLANETS: usize = 55;
/// Consecutive rejected placements after which a home cluster is considered full.
pub const SECONDARY_RETRIES: u32 = 25;
pub const SCATTER_RETRIES: u32 = SECONDARY_RETRIES * 200;

const KIND_WEIGHTS: [(PlanetKind, u32); 3] = [
    (PlanetKind::Small, 600),
    (PlanetKind::Medium, 300),
    (PlanetKind::Big, 200),
];

/// Builds the initial planet set for a session.
pub trait MapGenerator {
    fn generate(&mut self, players: &[PlayerId], ids: &IdGenerator) -> Vec<Planet>;
}

impl<F> MapGenerator for F
where
    F: FnMut(&[PlayerId], &IdGenerator) -> Vec<Planet>,
{
    fn generate(&mut self, players: &[PlayerId], ids: &IdGenerator) -> Vec<Planet> {
        self(players, ids)
    }
}

pub struct GalaxyGenerator {
    length: f64,
    height: f64,
    clearance: f64,
    rng: StdRng,
}

impl GalaxyGenerator {
    pub fn new(scale: u32, seed: Option<u64>) -> Self {
        let scale = scale.max(1);
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Self {
            length: f64::from(LENGTH_MULTIPLIER * scale),
            height: f64::from(HEIGHT_MULTIPLIER * scale),
            clearance: (50.0 / 120.0 * f64::from(scale)).round().max(1.0),
            rng,
        }
    }

    pub fn clearance(&self) -> f64 {
        self.clearance
    }

    pub fn half_extents(&self) -> (f64, f64) {
        (self.length / 2.0, self.height / 2.0)
    }

    /// Distance from the origin to the rectangle border along `angle` degrees.
    fn border_distance(&self, angle: f64) -> f64 {
        let (half_length, half_height) = self.half_extents();
        let radians = angle.to_radians();
        let (cos, sin) = (radians.cos().abs(), radians.sin().abs());

        let along_x = if cos > f64::EPSILON {
            half_length / cos
        } else {
            f64::INFINITY
        };
        let along_y = if sin > f64::EPSILON {
            half_height / sin
        } else {
            f64::INFINITY
        };
        along_x.min(along_y)
    }

    fn in_bounds(&self, coords: &Coords) -> bool {
        let (half_length, half_height) = self.half_extents();
        f64::from(coords.x.abs()) <= half_length - self.clearance
            && f64::from(coords.y.abs()) <= half_height - self.clearance
    }

    fn clear_of(&self, coords: &Coords, planets: &[Planet]) -> bool {
        planets
            .iter()
            .all(|planet| coords.distance(&planet.coords) >= 2.0 * self.clearance)
    }

    fn random_kind(&mut self) -> PlanetKind {
        KIND_WEIGHTS
            .choose_weighted(&mut self.rng, |&(_, weight)| weight)
            .map(|&(kind, _)| kind)
            .unwrap_or(PlanetKind::Small)
    }

    fn neutral_garrison(&mut self, kind: PlanetKind) -> u32 {
        self.rng.gen_range(0..=40) * kind.multiplier()
    }

    /// Places home planets and returns them with the radius they sit on.
    fn home_planets(&mut self, players: &[PlayerId], ids: &IdGenerator) -> (Vec<Planet>, f64) {
        let step = 360.0 / players.len() as f64;
        let start = f64::from(self.rng.gen_range(0..=step as u32));
        let angles: Vec<f64> = (0..players.len())
            .map(|i| (start + step * i as f64) % 360.0)
            .collect();

        let radius = angles
            .iter()
            .map(|&angle| self.border_distance(angle))
            .fold(f64::INFINITY, f64::min)
            - self.clearance;

        let homes = players
            .iter()
            .zip(&angles)
            .map(|(&player, &angle)| {
                let radians = angle.to_radians();
                let coords = Coords::new(
                    (radius * radians.cos()) as i32,
                    (radius * radians.sin()) as i32,
                );
                Planet::new(ids.next_id(), coords, PlanetKind::Big, Some(player), HOME_UNITS)
            })
            .collect();

        (homes, radius)
    }

    fn secondary_planets(
        &mut self,
        planets: &mut Vec<Planet>,
        homes: usize,
        per_home: usize,
        max_distance: f64,
        ids: &IdGenerator,
    ) {
        let min_distance = 2.0 * self.clearance;
        let max_distance = max_distance - self.clearance;
        if max_distance < min_distance {
            return;
        }

        for home in 0..homes {
            let center = planets[home].coords;
            let mut placed = 0;
            let mut tries = 0;

            while placed < per_home && tries <= SECONDARY_RETRIES {
                let angle = f64::from(self.rng.gen_range(0..360u32)).to_radians();
                let distance = self.rng.gen_range(min_distance..=max_distance);
                let coords = Coords::new(
                    center.x + (distance * angle.cos()) as i32,
                    center.y + (distance * angle.sin()) as i32,
                );

                if !self.in_bounds(&coords) || !self.clear_of(&coords, planets) {
                    tries += 1;
                    continue;
                }

                let kind = self.random_kind();
                let units = self.neutral_garrison(kind);
                planets.push(Planet::new(ids.next_id(), coords, kind, None, units));
                placed += 1;
                tries = 0;
            }
        }
    }

    fn scattered_planets(
        &mut self,
        planets: &mut Vec<Planet>,
        homes: usize,
        target: usize,
        home_exclusion: f64,
        ids: &IdGenerator,
    ) {
        let (half_length, half_height) = self.half_extents();
        let (half_length, half_height) = (half_length as i32, half_height as i32);
        let mut tries = 0;

        while planets.len() < target {
            let coords = Coords::new(
                self.rng.gen_range(-half_length..=half_length),
                self.rng.gen_range(-half_height..=half_height),
            );

            let near_home = planets[..homes]
                .iter()
                .any(|home| coords.distance(&home.coords) < home_exclusion);

            if near_home || !self.in_bounds(&coords) || !self.clear_of(&coords, planets) {
                tries += 1;
                if tries > SCATTER_RETRIES {
                    debug!("Gave up scattering planets at {}", planets.len());
                    break;
                }
                continue;
            }

            let kind = self.random_kind();
            let units = self.neutral_garrison(kind);
            planets.push(Planet::new(ids.next_id(), coords, kind, None, units));
            tries = 0;
        }
    }
}

impl MapGenerator for GalaxyGenerator {
    fn generate(&mut self, players: &[PlayerId], ids: &IdGenerator) -> Vec<Planet> {
        if players.is_empty() {
            return Vec::new();
        }

        let target = self.rng.gen_range(MIN_PLANETS..=MAX_PLANETS);
        let (mut planets, radius) = self.home_planets(players, ids);
        let homes = planets.len();

        let cluster_radius = radius * (PI / homes as f64).sin();

        if self.clear_of(&Coords::default(), &planets) {
            let units = self.neutral_garrison(PlanetKind::Biggest);
            planets.push(Planet::new(
                ids.next_id(),
                Coords::default(),
                PlanetKind::Biggest,
                None,
                units,
            ));
        }

        let per_home = ((target.saturating_sub(homes + 1)) as f64 * 0.6 / homes as f64).round();
        self.secondary_planets(&mut planets, homes, per_home as usize, cluster_radius, ids);
        self.scattered_planets(&mut planets, homes, target, cluster_radius, ids);

        debug!(
            "Generated {} planets for {} players (target {})",
            planets.len(),
            homes,
            target
        );
        planets
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    fn generate(players: &[PlayerId], seed: u64) -> (GalaxyGenerator, Vec<Planet>) {
        let mut generator = GalaxyGenerator::new(100, Some(seed));
        let planets = generator.generate(players, &IdGenerator::new());
        (generator, planets)
    }

    #[test]
    fn test_one_home_planet_per_player() {
        for players in 2..=8u32 {
            let ids: Vec<PlayerId> = (1..=players).collect();
            let (_, planets) = generate(&ids, u64::from(players));

            for id in &ids {
                let homes: Vec<&Planet> = planets
                    .iter()
                    .filter(|p| p.owner == Some(*id))
                    .collect();
                assert_eq!(homes.len(), 1, "player {} homes", id);
                assert_eq!(homes[0].kind, PlanetKind::Big);
                assert_eq!(homes[0].units_count, HOME_UNITS);
            }
            assert_eq!(
                planets.iter().filter(|p| p.owner.is_some()).count(),
                ids.len()
            );
        }
    }

    #[test]
    fn test_homes_share_one_radius() {
        let (_, planets) = generate(&[1, 2, 3, 4], 7);
        let radii: Vec<f64> = planets[..4]
            .iter()
            .map(|p| p.coords.distance(&Coords::default()))
            .collect();

        for radius in &radii[1..] {
            assert_approx_eq!(*radius, radii[0], 2.0);
        }
    }

    #[test]
    fn test_planets_keep_clearance_and_bounds() {
        let (generator, planets) = generate(&[1, 2, 3], 11);
        let (half_length, half_height) = generator.half_extents();
        let clearance = generator.clearance();

        assert!(planets.len() <= MAX_PLANETS);
        for (i, a) in planets.iter().enumerate() {
            assert!(f64::from(a.coords.x.abs()) <= half_length);
            assert!(f64::from(a.coords.y.abs()) <= half_height);
            for b in &planets[i + 1..] {
                // Homes are truncated to integer coordinates.
                assert!(
                    a.coords.distance(&b.coords) >= 2.0 * clearance - 2.0,
                    "planets {} and {} overlap",
                    a.id,
                    b.id
                );
            }
        }
    }

    #[test]
    fn test_planet_ids_are_unique_and_fresh() {
        let ids = IdGenerator::new();
        ids.take(10);
        let mut generator = GalaxyGenerator::new(100, Some(3));
        let planets = generator.generate(&[1, 2], &ids);

        let mut planet_ids: Vec<u64> = planets.iter().map(|p| p.id).collect();
        assert!(planet_ids.iter().all(|&id| id > 10));
        planet_ids.sort_unstable();
        planet_ids.dedup();
        assert_eq!(planet_ids.len(), planets.len());
    }

    #[test]
    fn test_neutral_garrisons_scale_with_kind() {
        let (_, planets) = generate(&[1, 2], 5);
        for planet in planets.iter().filter(|p| p.owner.is_none()) {
            assert_eq!(planet.units_count % planet.kind.multiplier(), 0);
            assert!(planet.units_count <= 40 * planet.kind.multiplier());
        }
    }

    #[test]
    fn test_same_seed_same_galaxy() {
        let (_, first) = generate(&[1, 2], 99);
        let (_, second) = generate(&[1, 2], 99);
        assert_eq!(first, second);
    }

    #[test]
    fn test_no_players_no_planets() {
        let (_, planets) = generate(&[], 1);
        assert!(planets.is_empty());
    }

    #[test]
    fn test_closure_generator() {
        let mut fixed = |players: &[PlayerId], ids: &IdGenerator| {
            players
                .iter()
                .map(|&p| Planet::new(ids.next_id(), Coords::default(), PlanetKind::Big, Some(p), 5))
                .collect::<Vec<_>>()
        };
        let planets = fixed.generate(&[4, 9], &IdGenerator::new());
        assert_eq!(planets.len(), 2);
        assert_eq!(planets[1].owner, Some(9));
    }
}
