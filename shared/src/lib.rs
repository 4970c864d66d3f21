use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const ARENA_WIDTH: f32 = 1000.0;
pub const ARENA_HEIGHT: f32 = 1000.0;
pub const FOOD_COUNT: usize = 80;
pub const FOOD_SIZE: f32 = 10.0;
pub const FOOD_COLOR_COUNT: u8 = 6;
pub const FOOD_SAFE_MARGIN: f32 = 10.0;
pub const PLAYER_SAFE_MARGIN: f32 = 20.0;
pub const SPAWN_ATTEMPTS: u32 = 10;
pub const SPAWN_JITTER: f32 = 10.0;
pub const INITIAL_PLAYER_SIZE: f32 = 20.0;
pub const MAX_PLAYER_SIZE: f32 = 500.0;
pub const BASE_SPEED: f32 = 600.0;
pub const GROWTH_PER_FOOD: f32 = 2.0;
pub const ABSORB_RATIO: f32 = 1.2;
pub const ABSORB_GAIN: f32 = 0.5;
pub const MAX_DIRECTION_MAGNITUDE: f32 = 1.1;
pub const MAX_NAME_LEN: usize = 20;
pub const MAX_CHAT_LEN: usize = 100;

/// Wire protocol between client and server.
///
/// Every message is bincode-encoded. The transport is assumed reliable and
/// ordered per connection; only the payload contract lives here.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub enum Message {
    // Client -> server
    Connect,
    SetPlayerName {
        name: String,
    },
    RestorePlayer {
        name: String,
    },
    UpdatePlayerPosition {
        direction_x: f32,
        direction_y: f32,
    },
    EatFood {
        id: u64,
        player_x: f32,
        player_y: f32,
    },
    SetCanvasSize {
        width: f32,
        height: f32,
    },
    SetPaused {
        paused: bool,
    },
    Disconnect,

    // Both directions: client submits, server rebroadcasts sanitized
    ChatMessage {
        name: String,
        message: String,
    },

    // Server -> client
    Connected {
        session_id: u32,
    },
    SetPlayerNameResponse {
        success: bool,
        player: Option<PlayerInfo>,
        message: Option<String>,
    },
    RestorePlayerResponse {
        success: bool,
        player: Option<PlayerInfo>,
        message: Option<String>,
    },
    UpdateGameState(Snapshot),
    PlayerInactive {
        session_id: u32,
    },
    PlayerEaten {
        eaten_id: u32,
        eater_id: u32,
    },
    NameTaken,
}

/// Full-state broadcast. Never a delta: resending the complete world every
/// tick is what keeps the protocol idempotent under packet loss.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Snapshot {
    pub server_time: u64,
    pub foods: Vec<Food>,
    pub players: HashMap<u32, PlayerInfo>,
}

/// Player fields as seen on the wire (snapshots and admission responses).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PlayerInfo {
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub name: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Food {
    pub id: u64,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub color_index: u8,
}

impl Food {
    pub fn new(id: u64, x: f32, y: f32, color_index: u8) -> Self {
        Self {
            id,
            x,
            y,
            size: FOOD_SIZE,
            color_index: color_index % FOOD_COLOR_COUNT,
        }
    }
}

/// Authoritative player entity. Only the server mutates these; clients see
/// the `PlayerInfo` projection.
#[derive(Debug, Clone)]
pub struct Player {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub size: f32,
    pub name: String,
    pub paused: bool,
}

impl Player {
    pub fn new(id: u32, x: f32, y: f32, name: String) -> Self {
        Self {
            id,
            x,
            y,
            size: INITIAL_PLAYER_SIZE,
            name,
            paused: false,
        }
    }

    /// Movement speed in units/second. Growth slows you down: the square
    /// root falloff is the core balancing rule of the game.
    pub fn speed(&self) -> f32 {
        BASE_SPEED / self.size.sqrt()
    }

    pub fn info(&self) -> PlayerInfo {
        PlayerInfo {
            x: self.x,
            y: self.y,
            size: self.size,
            name: self.name.clone(),
        }
    }
}

pub fn distance(x1: f32, y1: f32, x2: f32, y2: f32) -> f32 {
    let dx = x2 - x1;
    let dy = y2 - y1;
    (dx * dx + dy * dy).sqrt()
}

/// A direction vector is acceptable when both components are finite and the
/// magnitude stays within 1.1 (unit length plus slack for normalization
/// error on the client).
pub fn direction_valid(direction_x: f32, direction_y: f32) -> bool {
    if !direction_x.is_finite() || !direction_y.is_finite() {
        return false;
    }
    (direction_x * direction_x + direction_y * direction_y).sqrt() <= MAX_DIRECTION_MAGNITUDE
}

/// Trim, cap at 20 characters, strip angle brackets. Returns an empty string
/// for all-whitespace input; callers reject that case explicitly.
pub fn sanitize_name(raw: &str) -> String {
    raw.trim()
        .chars()
        .take(MAX_NAME_LEN)
        .filter(|c| *c != '<' && *c != '>')
        .collect()
}

/// Same treatment as names, with the chat length cap.
pub fn sanitize_chat(raw: &str) -> String {
    raw.trim()
        .chars()
        .take(MAX_CHAT_LEN)
        .filter(|c| *c != '<' && *c != '>')
        .collect()
}
