//! # Arena Game Client Library
//!
//! Client-side of the multiplayer arena game: network plumbing, input
//! capture, state reconciliation and the presentation boundary.
//!
//! ## Architecture Overview
//!
//! The server broadcasts full snapshots at a fixed rate; frames render much
//! faster and in between the client is on its own. The reconciler bridges
//! the gap with exponential smoothing: every entity carries a current value
//! (what the screen shows) and a target value (what the server last said),
//! and each frame closes a fraction of the remaining distance. The own
//! entity never teleports; remote entities are created, refreshed and
//! pruned purely from authoritative data.
//!
//! ## Module Organization
//!
//! ### Game Module (`game`)
//! Snapshot intake, per-frame smoothing, the eat-submission dedup set and
//! the session phase machine
//! (`Disconnected → AwaitingName → Active → Eaten/Inactive`).
//!
//! ### Input Module (`input`)
//! Cursor-relative steering vectors, normalized so the server's magnitude
//! bound is always respected, plus pause toggling.
//!
//! ### Network Module (`network`)
//! The `tokio::select!` loop tying socket traffic, input cadence, smoothing
//! and frame presentation together. Movement and eat submissions are
//! fire-and-forget.
//!
//! ### View Module (`view`)
//! The explicit rendering-capability trait implemented by the presentation
//! layer, with a macroquad backend and a headless no-op backend. View
//! errors degrade to skipped frames and never disturb the simulation state.

pub mod game;
pub mod input;
pub mod network;
pub mod view;
