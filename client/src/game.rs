//! Client-side state reconciliation.
//!
//! Snapshots arrive at broadcast rate, frames render much faster, and the
//! two must never visibly disagree. Every entity keeps a current value the
//! screen shows and a target value the server last reported; each frame the
//! current value closes a fraction of the remaining gap (exponential
//! smoothing, not fixed-duration interpolation), so late or lost snapshots
//! degrade into drift instead of teleports.

use shared::{distance, Food, PlayerInfo, Snapshot, MAX_PLAYER_SIZE};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Frame delta ceiling: a stalled tab must not cause one giant catch-up jump.
pub const MAX_FRAME_DT: f32 = 0.1;
/// Per-second position smoothing rate; `dt * rate` capped at 1 is the blend
/// factor for the frame.
pub const POSITION_BLEND_RATE: f32 = 20.0;
/// Size snaps faster than position so growth feels immediate.
pub const SIZE_BLEND_FACTOR: f32 = 0.5;
/// A remote entity with no authoritative refresh for this long is dropped
/// even if no removal notice ever arrived.
pub const REMOTE_TIMEOUT: Duration = Duration::from_secs(10);

/// Smoothing state for one on-screen entity.
#[derive(Debug, Clone)]
pub struct SmoothedEntity {
    pub current_x: f32,
    pub current_y: f32,
    pub current_size: f32,
    pub target_x: f32,
    pub target_y: f32,
    pub target_size: f32,
    pub last_update: Instant,
}

impl SmoothedEntity {
    pub fn new(x: f32, y: f32, size: f32) -> Self {
        Self {
            current_x: x,
            current_y: y,
            current_size: size,
            target_x: x,
            target_y: y,
            target_size: size,
            last_update: Instant::now(),
        }
    }

    pub fn set_target(&mut self, x: f32, y: f32, size: f32) {
        self.target_x = x;
        self.target_y = y;
        self.target_size = size;
        self.last_update = Instant::now();
    }

    /// One frame of smoothing. Non-finite targets freeze the entity at its
    /// last good position rather than propagating the poison.
    pub fn blend(&mut self, dt: f32) {
        let dt = dt.min(MAX_FRAME_DT);

        if self.target_x.is_finite() && self.target_y.is_finite() {
            let factor = (dt * POSITION_BLEND_RATE).min(1.0);
            self.current_x += (self.target_x - self.current_x) * factor;
            self.current_y += (self.target_y - self.current_y) * factor;
        }

        if self.target_size.is_finite() {
            let capped = self.target_size.min(MAX_PLAYER_SIZE);
            self.current_size += (capped - self.current_size) * SIZE_BLEND_FACTOR;
        }
    }
}

#[derive(Debug, Clone)]
pub struct RemotePlayer {
    pub entity: SmoothedEntity,
    pub name: String,
}

/// Client-observed lifecycle of this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Disconnected,
    AwaitingName,
    Active,
    /// Absorbed by a larger player; back to the name menu next.
    Eaten,
    /// Evicted by the server for inactivity; back to the name menu next.
    Inactive,
}

#[derive(Debug, Clone)]
pub struct ScoreEntry {
    pub name: String,
    pub size: f32,
}

/// Owns everything the presentation layer reads: the predicted own entity,
/// interpolated remotes, tracked food and the session phase machine.
pub struct Reconciler {
    pub phase: SessionPhase,
    pub own_id: Option<u32>,
    pub own: Option<SmoothedEntity>,
    pub own_name: String,
    pub remotes: HashMap<u32, RemotePlayer>,
    pub foods: Vec<Food>,
    pub scoreboard: Vec<ScoreEntry>,
    /// Food ids already submitted for eating and not yet confirmed gone.
    pending_eats: HashSet<u64>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self {
            phase: SessionPhase::Disconnected,
            own_id: None,
            own: None,
            own_name: String::new(),
            remotes: HashMap::new(),
            foods: Vec::new(),
            scoreboard: Vec::new(),
            pending_eats: HashSet::new(),
        }
    }

    // ---- phase machine ----

    pub fn on_connected(&mut self, session_id: u32) {
        self.own_id = Some(session_id);
        if self.phase == SessionPhase::Disconnected {
            self.phase = SessionPhase::AwaitingName;
        }
    }

    pub fn on_admitted(&mut self, info: &PlayerInfo) {
        self.own = Some(SmoothedEntity::new(info.x, info.y, info.size));
        self.own_name = info.name.clone();
        self.pending_eats.clear();
        self.phase = SessionPhase::Active;
    }

    pub fn on_eaten(&mut self) {
        self.own = None;
        self.phase = SessionPhase::Eaten;
    }

    pub fn on_evicted(&mut self) {
        self.own = None;
        self.phase = SessionPhase::Inactive;
    }

    /// Eaten/evicted players land back on the name menu.
    pub fn back_to_menu(&mut self) {
        if matches!(self.phase, SessionPhase::Eaten | SessionPhase::Inactive) {
            self.phase = SessionPhase::AwaitingName;
        }
    }

    pub fn on_transport_lost(&mut self) {
        self.own = None;
        self.own_id = None;
        self.remotes.clear();
        self.phase = SessionPhase::Disconnected;
    }

    // ---- snapshot intake ----

    /// Folds one authoritative snapshot into the tracked state.
    ///
    /// Food is matched by id: known items update in place, new items are
    /// created, and anything the server no longer reports is pruned (which
    /// also releases its pending-eat slot). Players likewise match by
    /// session id; the own entity only ever moves its targets.
    pub fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        self.pending_eats
            .retain(|id| snapshot.foods.iter().any(|f| f.id == *id));

        let mut known: HashMap<u64, Food> = self.foods.drain(..).map(|f| (f.id, f)).collect();
        self.foods = snapshot
            .foods
            .iter()
            .filter(|f| f.x.is_finite() && f.y.is_finite() && f.size.is_finite())
            .map(|f| match known.remove(&f.id) {
                Some(mut tracked) => {
                    tracked.x = f.x;
                    tracked.y = f.y;
                    tracked.size = f.size;
                    tracked.color_index = f.color_index;
                    tracked
                }
                None => f.clone(),
            })
            .collect();

        for (id, info) in &snapshot.players {
            if !info.x.is_finite() || !info.y.is_finite() || !info.size.is_finite() {
                continue;
            }

            if Some(*id) == self.own_id {
                match self.own.as_mut() {
                    Some(own) => own.set_target(info.x, info.y, info.size),
                    None => self.own = Some(SmoothedEntity::new(info.x, info.y, info.size)),
                }
            } else {
                match self.remotes.get_mut(id) {
                    Some(remote) => {
                        remote.entity.set_target(info.x, info.y, info.size);
                        remote.name = info.name.clone();
                    }
                    None => {
                        self.remotes.insert(
                            *id,
                            RemotePlayer {
                                entity: SmoothedEntity::new(info.x, info.y, info.size),
                                name: info.name.clone(),
                            },
                        );
                    }
                }
            }
        }

        self.scoreboard = top_scores(&snapshot.players, 5);
    }

    /// Removal notice from the server (absorption or inactivity eviction).
    pub fn remove_remote(&mut self, session_id: u32) {
        self.remotes.remove(&session_id);
    }

    // ---- per-frame work ----

    pub fn blend_all(&mut self, dt: f32) {
        if let Some(own) = self.own.as_mut() {
            own.blend(dt);
        }
        for remote in self.remotes.values_mut() {
            remote.entity.blend(dt);
        }
    }

    /// Fallback removal for remotes the protocol never said goodbye to.
    pub fn prune_stale_remotes(&mut self) {
        self.remotes
            .retain(|_, remote| remote.entity.last_update.elapsed() <= REMOTE_TIMEOUT);
    }

    /// Food items the own entity currently overlaps and has not yet claimed.
    /// Claiming marks them so each id is submitted at most once until the
    /// server confirms the removal in a later snapshot.
    pub fn claim_eats(&mut self) -> Vec<(u64, f32, f32)> {
        let own = match self.own.as_ref() {
            Some(own) if own.current_x.is_finite() && own.current_y.is_finite() => own.clone(),
            _ => return Vec::new(),
        };

        let mut claims = Vec::new();
        for food in &self.foods {
            if self.pending_eats.contains(&food.id) {
                continue;
            }
            let reach = (own.current_size + food.size) / 2.0;
            if distance(own.current_x, own.current_y, food.x, food.y) < reach {
                self.pending_eats.insert(food.id);
                claims.push((food.id, own.current_x, own.current_y));
            }
        }
        claims
    }

    #[cfg(test)]
    fn pending_eat_count(&self) -> usize {
        self.pending_eats.len()
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new()
    }
}

fn top_scores(players: &HashMap<u32, PlayerInfo>, limit: usize) -> Vec<ScoreEntry> {
    let mut entries: Vec<ScoreEntry> = players
        .values()
        .map(|p| ScoreEntry {
            name: p.name.clone(),
            size: p.size,
        })
        .collect();
    entries.sort_by(|a, b| b.size.partial_cmp(&a.size).unwrap_or(std::cmp::Ordering::Equal));
    entries.truncate(limit);
    entries
}
