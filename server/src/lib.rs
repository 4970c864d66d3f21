//! # Arena Game Server Library
//!
//! Authoritative server for the multiplayer arena game. This process owns
//! the only valid copy of the world: every player position, size and food
//! item lives here, and clients only ever see it through full-state
//! snapshots.
//!
//! ## Core Responsibilities
//!
//! ### Authoritative Simulation
//! The world module holds the canonical rules: movement speed falls with
//! size, food consumption grows the eater and respawns a replacement, and a
//! per-tick collision pass lets sufficiently larger players absorb smaller
//! ones. Clients submit intents; only the server decides outcomes.
//!
//! ### Admission and Validation
//! The session module binds each connection to at most one player and
//! enforces the admission rules: sanitized unique names, reconnect restore
//! against live players only, and per-session chat throttling. Malformed
//! input is dropped before it can touch the world.
//!
//! ### Liveness Tracking
//! The activity module timestamps every accepted event per session and
//! evicts sessions that go quiet past the inactivity timeout, freeing their
//! players for the rest of the arena.
//!
//! ### State Broadcasting
//! The network module runs the single owner loop: a fixed-rate tick resolves
//! collisions and pushes a snapshot to every session, and every successful
//! mutation (join, restore, move, eat, resize) triggers an immediate extra
//! snapshot so perceived latency stays low between ticks.
//!
//! ## Architecture
//!
//! One `tokio::select!` loop serializes all mutations; receive, send and the
//! inactivity sweep run as side tasks bridged by channels. Because no
//! handler blocks and nothing else mutates the world, the event loop itself
//! is the synchronization mechanism.
//!
//! ## Usage Example
//!
//! ```rust,no_run
//! use server::network::Server;
//! use server::world::World;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let world = World::new(1000.0, 1000.0, 80);
//!     let mut server = Server::new(
//!         "127.0.0.1:8080",
//!         Duration::from_millis(16), // ~60Hz broadcast tick
//!         world,
//!         Duration::from_secs(120),  // inactivity timeout
//!     ).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod network;
pub mod session;
pub mod world;
