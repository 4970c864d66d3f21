//! Session liveness tracking.
//!
//! Every accepted inbound event refreshes the sender's last-seen time. A
//! periodic sweep, running on its own timer so the collision loop can never
//! starve it, evicts sessions that stayed silent past the timeout.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const SWEEP_INTERVAL: Duration = Duration::from_secs(10);

pub struct ActivityMonitor {
    pub last_seen: HashMap<u32, Instant>,
    timeout: Duration,
}

impl ActivityMonitor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_seen: HashMap::new(),
            timeout,
        }
    }

    /// Marks a session as alive right now.
    pub fn record(&mut self, session_id: u32) {
        self.last_seen.insert(session_id, Instant::now());
    }

    /// Drops tracking for a session that went away through another path
    /// (disconnect, absorption, restore rebinding).
    pub fn forget(&mut self, session_id: u32) {
        self.last_seen.remove(&session_id);
    }

    /// Time since the session's last accepted event. Used as the movement
    /// integration step, mirroring how the activity clock doubles as the
    /// input clock.
    pub fn elapsed(&self, session_id: u32) -> Option<Duration> {
        self.last_seen.get(&session_id).map(|t| t.elapsed())
    }

    /// Removes and returns every session idle longer than the timeout.
    pub fn sweep(&mut self) -> Vec<u32> {
        let timeout = self.timeout;
        let expired: Vec<u32> = self
            .last_seen
            .iter()
            .filter(|(_, seen)| seen.elapsed() > timeout)
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            self.last_seen.remove(id);
        }
        expired
    }

    pub fn len(&self) -> usize {
        self.last_seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.last_seen.is_empty()
    }
}
