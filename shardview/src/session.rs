//! Session-level plumbing the frame loop reads: the connection-lost flag set
//! by the socket callback, and the stale-connection timer that requests a
//! resync after a fixed silence interval.

use crate::action::{ActionQueue, ClientAction};

/// Silence on the wire longer than this triggers a resync request.
pub const STALE_CONNECTION_MS: u64 = 30_000;

/// How a connection loss should be surfaced, per profile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectBehavior {
    /// Kick off the automatic reconnect path.
    Reconnect,
    /// Surface a user-facing prompt.
    Prompt,
}

/// Connection state shared between the socket callback and the frame loop.
pub struct Session {
    connection_lost: bool,
    last_traffic_at: u64,
    resync_sent: bool,
}

impl Session {
    pub fn new() -> Self {
        Self {
            connection_lost: false,
            last_traffic_at: 0,
            resync_sent: false,
        }
    }

    /// Socket-disconnect callback. Safe to call from outside the tick; the
    /// flag is consumed at the next Update.
    pub fn on_connection_lost(&mut self) {
        self.connection_lost = true;
    }

    /// Consume the disconnect flag, mapping it to the configured behavior.
    pub fn take_disconnect(&mut self, auto_reconnect: bool) -> Option<DisconnectBehavior> {
        if !self.connection_lost {
            return None;
        }
        self.connection_lost = false;
        log::warn!("connection lost");
        Some(if auto_reconnect {
            DisconnectBehavior::Reconnect
        } else {
            DisconnectBehavior::Prompt
        })
    }

    /// Record inbound traffic, resetting the stale timer.
    pub fn on_traffic(&mut self, now: u64) {
        self.last_traffic_at = now;
        self.resync_sent = false;
    }

    /// Per-tick stale check: one resync request per silence interval.
    pub fn tick(&mut self, now: u64, actions: &mut ActionQueue) {
        if self.resync_sent {
            return;
        }
        if now.saturating_sub(self.last_traffic_at) >= STALE_CONNECTION_MS {
            actions.push(ClientAction::Resync);
            self.resync_sent = true;
        }
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}
