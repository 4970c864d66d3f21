//! Session registry and admission rules.
//!
//! A session is the transient binding of one transport connection to at most
//! one player id. Admission (name registration, reconnect restore) and chat
//! throttling are enforced here, before anything reaches the world.

use crate::world::{World, WorldError};
use log::info;
use shared::{sanitize_name, PlayerInfo, MAX_NAME_LEN};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use thiserror::Error;

pub const CHAT_COOLDOWN: Duration = Duration::from_secs(1);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("name must not be empty")]
    EmptyName,
    #[error("name already in use")]
    NameTaken,
    #[error("no live player under that name")]
    NotFound,
    #[error(transparent)]
    World(#[from] WorldError),
}

#[derive(Debug)]
pub struct Session {
    pub id: u32,
    pub addr: SocketAddr,
    last_chat: Option<Instant>,
}

/// All live sessions, indexed by the server-assigned session id.
pub struct SessionRegistry {
    sessions: HashMap<u32, Session>,
    next_session_id: u32,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self {
            sessions: HashMap::new(),
            next_session_id: 1,
        }
    }

    /// Binds a fresh session id to a connection address.
    pub fn connect(&mut self, addr: SocketAddr) -> u32 {
        let session_id = self.next_session_id;
        self.next_session_id += 1;
        self.sessions.insert(
            session_id,
            Session {
                id: session_id,
                addr,
                last_chat: None,
            },
        );
        info!("Session {} connected from {}", session_id, addr);
        session_id
    }

    pub fn remove(&mut self, session_id: u32) -> bool {
        if self.sessions.remove(&session_id).is_some() {
            info!("Session {} removed", session_id);
            true
        } else {
            false
        }
    }

    /// Associates an incoming datagram with its session, if any.
    pub fn find_by_addr(&self, addr: SocketAddr) -> Option<u32> {
        self.sessions
            .iter()
            .find(|(_, session)| session.addr == addr)
            .map(|(id, _)| *id)
    }

    /// Session ids with addresses, for snapshot fan-out.
    pub fn addrs(&self) -> Vec<(u32, SocketAddr)> {
        self.sessions
            .iter()
            .map(|(id, session)| (*id, session.addr))
            .collect()
    }

    /// One chat message per second per session; anything faster is dropped.
    pub fn chat_allowed(&mut self, session_id: u32) -> bool {
        let session = match self.sessions.get_mut(&session_id) {
            Some(s) => s,
            None => return false,
        };
        let now = Instant::now();
        match session.last_chat {
            Some(last) if now.duration_since(last) < CHAT_COOLDOWN => false,
            _ => {
                session.last_chat = Some(now);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[cfg(test)]
    pub fn backdate_chat(&mut self, session_id: u32, by: Duration) {
        if let Some(session) = self.sessions.get_mut(&session_id) {
            session.last_chat = Some(Instant::now() - by);
        }
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Registers (or renames) the player for `session_id` under a sanitized
/// name. The uniqueness check is case-insensitive against every player owned
/// by a *different* live session.
pub fn register_name(
    world: &mut World,
    session_id: u32,
    raw_name: &str,
) -> Result<PlayerInfo, AdmissionError> {
    let name = sanitize_name(raw_name);
    if name.is_empty() {
        return Err(AdmissionError::EmptyName);
    }

    let lowered = name.to_lowercase();
    let taken = world
        .players
        .iter()
        .any(|(id, player)| *id != session_id && player.name.to_lowercase() == lowered);
    if taken {
        return Err(AdmissionError::NameTaken);
    }

    if let Some(player) = world.players.get_mut(&session_id) {
        // Session already owns a player: registration renames it in place.
        player.name = name;
        return Ok(player.info());
    }

    let player = world.create_player(session_id, name)?;
    Ok(player.info())
}

/// Reconnect path: rebinds the live player carrying the claimed name (exact
/// match, unlike registration) to the new session. Fails closed when the
/// name is unknown or already bound to this very session.
///
/// Returns the evicted old session id alongside the restored player.
pub fn restore_player(
    world: &mut World,
    session_id: u32,
    raw_name: &str,
) -> Result<(u32, PlayerInfo), AdmissionError> {
    let name = sanitize_name(raw_name);
    if name.is_empty() {
        return Err(AdmissionError::EmptyName);
    }

    let old_id = world
        .players
        .iter()
        .find(|(id, player)| **id != session_id && player.name == name)
        .map(|(id, _)| *id)
        .ok_or(AdmissionError::NotFound)?;

    let info = world.rebind_player(old_id, session_id)?;
    info!(
        "Player '{}' restored: session {} -> {}",
        info.name, old_id, session_id
    );
    Ok((old_id, info))
}

/// Chat sender names ride the payload unverified; they only get the same
/// length cap as registered names.
pub fn clip_chat_name(raw: &str) -> String {
    raw.chars().take(MAX_NAME_LEN).collect()
}
