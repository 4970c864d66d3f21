//! Authoritative world state: players, food, and the rules that mutate them.
//!
//! The `World` is owned exclusively by the server's event loop. Every
//! mutation arrives through a validated entry point and leaves the state
//! satisfying the core invariants: live food count is constant, player sizes
//! stay in `(0, MAX_PLAYER_SIZE]`, and positions stay inside the arena.

use log::info;
use rand::Rng;
use shared::{
    distance, direction_valid, Food, Player, PlayerInfo, Snapshot, ABSORB_GAIN, ABSORB_RATIO,
    FOOD_COLOR_COUNT, FOOD_SAFE_MARGIN, GROWTH_PER_FOOD, MAX_PLAYER_SIZE, PLAYER_SAFE_MARGIN,
    SPAWN_ATTEMPTS, SPAWN_JITTER,
};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Clamp on the movement delta derived from session activity timestamps, so
/// an idle-then-move session cannot cross the arena in one event.
pub const MAX_MOVEMENT_DT: f32 = 0.25;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    #[error("session already owns a player")]
    DuplicateSession,
    #[error("unknown player")]
    UnknownPlayer,
    #[error("unknown food id")]
    UnknownFood,
    #[error("claimed position fails the reach check")]
    OutOfRange,
    #[error("arena dimensions must be positive and finite")]
    InvalidDimensions,
}

/// One player absorbed by another during a collision pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Elimination {
    pub eaten_id: u32,
    pub eater_id: u32,
}

pub struct World {
    pub width: f32,
    pub height: f32,
    pub players: HashMap<u32, Player>,
    pub foods: Vec<Food>,
    food_count: usize,
    next_food_id: u64,
}

impl World {
    pub fn new(width: f32, height: f32, food_count: usize) -> Self {
        let mut world = Self {
            width,
            height,
            players: HashMap::new(),
            foods: Vec::with_capacity(food_count),
            food_count,
            next_food_id: 1,
        };
        world.spawn_food(food_count);
        world
    }

    /// Spawns `n` food items at rejection-sampled positions. Each position is
    /// resampled while it lands within `size/2 + margin` of any player, up to
    /// the attempt budget; after that the last sample is accepted as-is so
    /// the world never stalls hunting for a safe spot.
    pub fn spawn_food(&mut self, n: usize) {
        let mut rng = rand::thread_rng();
        for _ in 0..n {
            let (x, y) = sample_position(
                &mut rng,
                &self.players,
                self.width,
                self.height,
                FOOD_SAFE_MARGIN,
                None,
            );
            let color_index = rng.gen_range(0..FOOD_COLOR_COUNT);
            let id = self.take_food_id();
            self.foods.push(Food::new(id, x, y, color_index));
        }
    }

    /// Replacement for a consumed item: fresh id, fresh position, inherited
    /// color lineage.
    fn spawn_replacement(&mut self, color_index: u8) {
        let mut rng = rand::thread_rng();
        let (x, y) = sample_position(
            &mut rng,
            &self.players,
            self.width,
            self.height,
            FOOD_SAFE_MARGIN,
            None,
        );
        let id = self.take_food_id();
        self.foods.push(Food::new(id, x, y, color_index));
    }

    // Food ids are monotonic and never reused, even across arena resizes.
    fn take_food_id(&mut self) -> u64 {
        let id = self.next_food_id;
        self.next_food_id += 1;
        id
    }

    pub fn create_player(&mut self, id: u32, name: String) -> Result<&Player, WorldError> {
        if self.players.contains_key(&id) {
            return Err(WorldError::DuplicateSession);
        }

        let mut rng = rand::thread_rng();
        let (x, y) = sample_position(
            &mut rng,
            &self.players,
            self.width,
            self.height,
            PLAYER_SAFE_MARGIN,
            Some(SPAWN_JITTER),
        );

        let player = Player::new(id, x, y, name);
        info!("Added player {} at ({:.1}, {:.1})", id, player.x, player.y);
        Ok(self.players.entry(id).or_insert(player))
    }

    pub fn remove_player(&mut self, id: u32) -> Option<Player> {
        let removed = self.players.remove(&id);
        if removed.is_some() {
            info!("Removed player {}", id);
        }
        removed
    }

    /// Moves an existing player to a new session id, preserving position,
    /// size and name. Used when a reconnecting client reclaims its entity.
    pub fn rebind_player(&mut self, old_id: u32, new_id: u32) -> Result<PlayerInfo, WorldError> {
        if self.players.contains_key(&new_id) {
            return Err(WorldError::DuplicateSession);
        }
        let mut player = self
            .players
            .remove(&old_id)
            .ok_or(WorldError::UnknownPlayer)?;
        player.id = new_id;
        let snapshot = player.info();
        self.players.insert(new_id, player);
        Ok(snapshot)
    }

    pub fn set_paused(&mut self, id: u32, paused: bool) {
        if let Some(player) = self.players.get_mut(&id) {
            player.paused = paused;
        }
    }

    /// Applies one movement input. Returns whether the player actually moved;
    /// every failure mode (unknown id, bad vector, paused) is a silent no-op.
    pub fn apply_movement(&mut self, id: u32, direction_x: f32, direction_y: f32, dt: f32) -> bool {
        if !direction_valid(direction_x, direction_y) {
            return false;
        }
        let (width, height) = (self.width, self.height);
        let player = match self.players.get_mut(&id) {
            Some(p) => p,
            None => return false,
        };
        if player.paused {
            return false;
        }

        let dt = dt.clamp(0.0, MAX_MOVEMENT_DT);
        let step = player.speed() * dt;
        player.x += direction_x * step;
        player.y += direction_y * step;
        clamp_to_bounds(player, width, height);
        true
    }

    /// Consumes one food item on behalf of a player. The claimed position is
    /// trusted for placement (it already passed the reach check) but clamped
    /// to the arena so the bounds invariant survives the mutation.
    pub fn resolve_eating(
        &mut self,
        id: u32,
        food_id: u64,
        claimed_x: f32,
        claimed_y: f32,
    ) -> Result<(), WorldError> {
        if !claimed_x.is_finite() || !claimed_y.is_finite() {
            return Err(WorldError::OutOfRange);
        }
        if !self.players.contains_key(&id) {
            return Err(WorldError::UnknownPlayer);
        }
        let food_index = self
            .foods
            .iter()
            .position(|f| f.id == food_id)
            .ok_or(WorldError::UnknownFood)?;

        let food = self.foods[food_index].clone();
        let (width, height) = (self.width, self.height);
        let player = self
            .players
            .get_mut(&id)
            .ok_or(WorldError::UnknownPlayer)?;

        let reach = (player.size + food.size) / 2.0;
        if distance(claimed_x, claimed_y, food.x, food.y) >= reach {
            return Err(WorldError::OutOfRange);
        }

        player.size = (player.size + GROWTH_PER_FOOD).min(MAX_PLAYER_SIZE);
        player.x = claimed_x;
        player.y = claimed_y;
        clamp_to_bounds(player, width, height);

        self.foods.swap_remove(food_index);
        self.spawn_replacement(food.color_index);
        Ok(())
    }

    /// One collision pass over all unordered player pairs. A pair eliminates
    /// when the circles overlap and one side outweighs the other by more
    /// than the absorb ratio; overlapping near-equals coexist untouched.
    /// A player eliminated earlier in the pass takes no further part in it.
    pub fn resolve_collisions(&mut self) -> Vec<Elimination> {
        let mut ids: Vec<u32> = self.players.keys().copied().collect();
        ids.sort_unstable(); // deterministic pass order regardless of map layout
        let mut eliminations = Vec::new();
        let mut gone: HashSet<u32> = HashSet::new();

        for i in 0..ids.len() {
            for j in (i + 1)..ids.len() {
                let (id1, id2) = (ids[i], ids[j]);
                if gone.contains(&id1) || gone.contains(&id2) {
                    continue;
                }
                let (s1, s2, d) = match (self.players.get(&id1), self.players.get(&id2)) {
                    (Some(p1), Some(p2)) => {
                        (p1.size, p2.size, distance(p1.x, p1.y, p2.x, p2.y))
                    }
                    _ => continue,
                };
                if d >= (s1 + s2) / 2.0 {
                    continue;
                }

                let (eater_id, eaten_id, gained) = if s1 > s2 * ABSORB_RATIO {
                    (id1, id2, s2 * ABSORB_GAIN)
                } else if s2 > s1 * ABSORB_RATIO {
                    (id2, id1, s1 * ABSORB_GAIN)
                } else {
                    continue;
                };

                if let Some(eater) = self.players.get_mut(&eater_id) {
                    eater.size = (eater.size + gained).min(MAX_PLAYER_SIZE);
                }
                gone.insert(eaten_id);
                eliminations.push(Elimination { eaten_id, eater_id });
            }
        }

        for e in &eliminations {
            if self.players.remove(&e.eaten_id).is_some() {
                info!("Player {} absorbed by player {}", e.eaten_id, e.eater_id);
            }
        }
        eliminations
    }

    /// Adopts new arena dimensions: the entire food batch respawns (fresh
    /// ids, same count) and players are pulled back inside the new bounds.
    pub fn resize(&mut self, width: f32, height: f32) -> Result<(), WorldError> {
        if !width.is_finite() || !height.is_finite() || width <= 0.0 || height <= 0.0 {
            return Err(WorldError::InvalidDimensions);
        }
        self.width = width;
        self.height = height;
        for player in self.players.values_mut() {
            clamp_to_bounds(player, width, height);
        }
        self.foods.clear();
        self.spawn_food(self.food_count);
        Ok(())
    }

    /// Full immutable copy of the world for broadcast. Always the complete
    /// state, never a delta.
    pub fn snapshot(&self, server_time: u64) -> Snapshot {
        Snapshot {
            server_time,
            foods: self.foods.clone(),
            players: self
                .players
                .iter()
                .map(|(id, player)| (*id, player.info()))
                .collect(),
        }
    }
}

fn clamp_to_bounds(player: &mut Player, width: f32, height: f32) {
    let half = player.size / 2.0;
    player.x = player.x.max(half).min(width - half);
    player.y = player.y.max(half).min(height - half);
}

/// Rejection-sampled spawn position. With `center_jitter` the candidates
/// cluster around the arena center (player spawns); otherwise they are
/// uniform over the arena (food spawns). Exhausting the attempt budget
/// yields the last candidate unchanged.
fn sample_position<R: Rng>(
    rng: &mut R,
    players: &HashMap<u32, Player>,
    width: f32,
    height: f32,
    margin: f32,
    center_jitter: Option<f32>,
) -> (f32, f32) {
    let mut x = 0.0;
    let mut y = 0.0;
    for _ in 0..SPAWN_ATTEMPTS {
        match center_jitter {
            Some(jitter) => {
                x = width / 2.0 + (rng.gen::<f32>() * 2.0 - 1.0) * jitter;
                y = height / 2.0 + (rng.gen::<f32>() * 2.0 - 1.0) * jitter;
            }
            None => {
                x = rng.gen::<f32>() * width;
                y = rng.gen::<f32>() * height;
            }
        }
        let safe = players
            .values()
            .all(|p| distance(x, y, p.x, p.y) >= p.size / 2.0 + margin);
        if safe {
            return (x, y);
        }
    }
    (x, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;
    use shared::{FOOD_SIZE, INITIAL_PLAYER_SIZE};

    fn test_world() -> World {
        World::new(1000.0, 1000.0, 40)
    }

    fn place_player(world: &mut World, id: u32, x: f32, y: f32, size: f32) {
        world
            .create_player(id, format!("player-{}", id))
            .expect("create failed");
        let player = world.players.get_mut(&id).unwrap();
        player.x = x;
        player.y = y;
        player.size = size;
    }

    #[test]
    fn test_initial_food_batch() {
        let world = test_world();
        assert_eq!(world.foods.len(), 40);
        for food in &world.foods {
            assert!(food.x >= 0.0 && food.x <= 1000.0);
            assert!(food.y >= 0.0 && food.y <= 1000.0);
            assert_eq!(food.size, FOOD_SIZE);
            assert!(food.color_index < FOOD_COLOR_COUNT);
        }
    }

    #[test]
    fn test_food_ids_unique() {
        let world = test_world();
        let mut ids: Vec<u64> = world.foods.iter().map(|f| f.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 40);
    }

    #[test]
    fn test_create_player_near_center() {
        let mut world = test_world();
        let player = world.create_player(1, "Alice".to_string()).unwrap();
        assert!((player.x - 500.0).abs() <= SPAWN_JITTER);
        assert!((player.y - 500.0).abs() <= SPAWN_JITTER);
        assert_eq!(player.size, INITIAL_PLAYER_SIZE);
    }

    #[test]
    fn test_create_player_duplicate_session() {
        let mut world = test_world();
        world.create_player(1, "Alice".to_string()).unwrap();
        assert_eq!(
            world.create_player(1, "Alice2".to_string()).unwrap_err(),
            WorldError::DuplicateSession
        );
        assert_eq!(world.players.len(), 1);
    }

    #[test]
    fn test_movement_applies_speed_and_dt() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 100.0);
        let moved = world.apply_movement(1, 1.0, 0.0, 0.1);
        assert!(moved);
        let player = &world.players[&1];
        // speed = 600 / sqrt(100) = 60, step = 6
        assert_approx_eq!(player.x, 506.0, 0.001);
        assert_approx_eq!(player.y, 500.0, 0.001);
    }

    #[test]
    fn test_movement_clamped_to_bounds() {
        let mut world = test_world();
        place_player(&mut world, 1, 12.0, 12.0, 20.0);
        world.apply_movement(1, -1.0, -1.0, 0.2);
        let player = &world.players[&1];
        assert_approx_eq!(player.x, 10.0, 0.001);
        assert_approx_eq!(player.y, 10.0, 0.001);
    }

    #[test]
    fn test_movement_rejects_oversized_direction() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 20.0);
        assert!(!world.apply_movement(1, 1.5, 0.0, 0.1));
        let player = &world.players[&1];
        assert_eq!(player.x, 500.0);
        assert_eq!(player.y, 500.0);
    }

    #[test]
    fn test_movement_rejects_non_finite() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 20.0);
        assert!(!world.apply_movement(1, f32::NAN, 0.0, 0.1));
        assert!(!world.apply_movement(1, 0.5, f32::INFINITY, 0.1));
        assert_eq!(world.players[&1].x, 500.0);
    }

    #[test]
    fn test_movement_noop_while_paused() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 20.0);
        world.set_paused(1, true);
        assert!(!world.apply_movement(1, 1.0, 0.0, 0.1));
        assert_eq!(world.players[&1].x, 500.0);
    }

    #[test]
    fn test_movement_unknown_player() {
        let mut world = test_world();
        assert!(!world.apply_movement(99, 1.0, 0.0, 0.1));
    }

    #[test]
    fn test_movement_dt_clamped() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 100.0);
        world.apply_movement(1, 1.0, 0.0, 100.0);
        // 60 units/s capped at 0.25s: at most 15 units of travel
        assert_approx_eq!(world.players[&1].x, 515.0, 0.001);
    }

    #[test]
    fn test_eating_grows_and_replaces() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 20.0);
        let food = world.foods[0].clone();

        world
            .resolve_eating(1, food.id, food.x + 1.0, food.y)
            .unwrap();

        let player = &world.players[&1];
        assert_approx_eq!(player.size, 22.0, 0.001);
        assert_eq!(world.foods.len(), 40);
        assert!(world.foods.iter().all(|f| f.id != food.id));
        // replacement carries the color lineage
        assert!(world
            .foods
            .iter()
            .any(|f| f.color_index == food.color_index));
    }

    #[test]
    fn test_eating_moves_player_to_claimed_position() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 20.0);
        let food = world.foods[0].clone();
        let (cx, cy) = (food.x + 2.0, food.y - 2.0);
        world.resolve_eating(1, food.id, cx, cy).unwrap();
        let player = &world.players[&1];
        let half = player.size / 2.0;
        assert_approx_eq!(player.x, cx.max(half).min(1000.0 - half), 0.001);
        assert_approx_eq!(player.y, cy.max(half).min(1000.0 - half), 0.001);
    }

    #[test]
    fn test_eating_fails_out_of_reach() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 20.0);
        let food = world.foods[0].clone();
        let reach = (20.0 + food.size) / 2.0;

        let err = world
            .resolve_eating(1, food.id, food.x + reach + 1.0, food.y)
            .unwrap_err();
        assert_eq!(err, WorldError::OutOfRange);
        assert_eq!(world.players[&1].size, 20.0);
        assert!(world.foods.iter().any(|f| f.id == food.id));
    }

    #[test]
    fn test_eating_unknown_ids() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 20.0);
        let food = world.foods[0].clone();
        assert_eq!(
            world.resolve_eating(2, food.id, food.x, food.y).unwrap_err(),
            WorldError::UnknownPlayer
        );
        assert_eq!(
            world.resolve_eating(1, 999_999, 0.0, 0.0).unwrap_err(),
            WorldError::UnknownFood
        );
    }

    #[test]
    fn test_eating_rejects_non_finite_claim() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 20.0);
        let food = world.foods[0].clone();
        assert_eq!(
            world
                .resolve_eating(1, food.id, f32::NAN, food.y)
                .unwrap_err(),
            WorldError::OutOfRange
        );
    }

    #[test]
    fn test_size_capped_at_max() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, MAX_PLAYER_SIZE - 0.5);
        let food = world.foods[0].clone();
        world.resolve_eating(1, food.id, food.x, food.y).unwrap();
        assert_eq!(world.players[&1].size, MAX_PLAYER_SIZE);
    }

    #[test]
    fn test_collision_absorbs_larger_eats_smaller() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 30.0);
        place_player(&mut world, 2, 520.0, 500.0, 40.0); // d=20 < 35, 40 > 30*1.2

        let eliminations = world.resolve_collisions();

        assert_eq!(
            eliminations,
            vec![Elimination {
                eaten_id: 1,
                eater_id: 2
            }]
        );
        assert!(!world.players.contains_key(&1));
        assert_approx_eq!(world.players[&2].size, 55.0, 0.001);
    }

    #[test]
    fn test_collision_below_ratio_coexists() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 30.0);
        place_player(&mut world, 2, 520.0, 500.0, 34.0); // overlap, 34 < 30*1.2

        let eliminations = world.resolve_collisions();

        assert!(eliminations.is_empty());
        assert_eq!(world.players.len(), 2);
        assert_eq!(world.players[&1].size, 30.0);
        assert_eq!(world.players[&2].size, 34.0);
    }

    #[test]
    fn test_collision_eliminated_player_cannot_eat() {
        let mut world = test_world();
        // 2 eats 1; 1 must not also eat 3 afterwards, despite overlapping it.
        place_player(&mut world, 1, 500.0, 500.0, 100.0);
        place_player(&mut world, 2, 510.0, 500.0, 200.0);
        place_player(&mut world, 3, 490.0, 500.0, 30.0);

        let eliminations = world.resolve_collisions();

        assert!(eliminations
            .iter()
            .all(|e| e.eaten_id != 3 || e.eater_id != 1));
        assert!(!world.players.contains_key(&1));
    }

    #[test]
    fn test_collision_gain_capped() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 490.0);
        place_player(&mut world, 2, 520.0, 500.0, 100.0);

        world.resolve_collisions();
        assert_eq!(world.players[&1].size, MAX_PLAYER_SIZE);
    }

    #[test]
    fn test_resize_respawns_food_and_clamps_players() {
        let mut world = test_world();
        place_player(&mut world, 1, 950.0, 950.0, 20.0);
        let old_ids: HashSet<u64> = world.foods.iter().map(|f| f.id).collect();

        world.resize(400.0, 400.0).unwrap();

        assert_eq!(world.foods.len(), 40);
        // respawned batch gets fresh ids
        assert!(world.foods.iter().all(|f| !old_ids.contains(&f.id)));
        let player = &world.players[&1];
        assert!(player.x <= 400.0 - player.size / 2.0);
        assert!(player.y <= 400.0 - player.size / 2.0);
    }

    #[test]
    fn test_resize_rejects_bad_dimensions() {
        let mut world = test_world();
        assert_eq!(
            world.resize(0.0, 100.0).unwrap_err(),
            WorldError::InvalidDimensions
        );
        assert_eq!(
            world.resize(100.0, f32::NAN).unwrap_err(),
            WorldError::InvalidDimensions
        );
        assert_eq!(world.width, 1000.0);
    }

    #[test]
    fn test_snapshot_is_full_copy() {
        let mut world = test_world();
        place_player(&mut world, 1, 500.0, 500.0, 20.0);
        let snapshot = world.snapshot(777);

        assert_eq!(snapshot.server_time, 777);
        assert_eq!(snapshot.foods.len(), world.foods.len());
        assert_eq!(snapshot.players.len(), 1);

        // mutating the world afterwards must not affect the copy
        world.players.get_mut(&1).unwrap().x = 0.0;
        assert_eq!(snapshot.players[&1].x, 500.0);
    }

    #[test]
    fn test_rebind_preserves_entity() {
        let mut world = test_world();
        place_player(&mut world, 1, 321.0, 123.0, 44.0);

        let info = world.rebind_player(1, 7).unwrap();

        assert_eq!(info.x, 321.0);
        assert_eq!(info.size, 44.0);
        assert!(!world.players.contains_key(&1));
        assert_eq!(world.players[&7].id, 7);
        assert_eq!(
            world.rebind_player(99, 100).unwrap_err(),
            WorldError::UnknownPlayer
        );
    }
}
