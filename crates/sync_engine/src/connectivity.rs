//! Connectivity monitoring.
//!
//! A pure observer of the platform's online/offline signals. It tracks
//! how long the client has been offline and exposes a short grace window
//! after reconnecting so callers can show "back online" feedback. The
//! host is expected to forward platform signals into `set_online` /
//! `set_offline` and to drive `tick` roughly once per second while the
//! page is alive.
//!
//! The monitor itself has no side effects; the `BackOnline` change it
//! returns is the hook callers use to start a queue drain.

use crate::storage::current_timestamp_ms;
use serde::{Deserialize, Serialize};

/// Grace window after reconnecting during which `was_offline` stays true.
pub const DEFAULT_GRACE_WINDOW_MS: u64 = 5_000;

/// Interval at which the host should call `tick` while offline.
pub const TICK_INTERVAL_MS: u64 = 1_000;

/// Result of feeding a platform signal into the monitor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectivityChange {
    /// The client just lost connectivity.
    WentOffline,
    /// The client just regained connectivity. Callers should trigger a
    /// queue drain on this transition.
    BackOnline {
        /// Final duration of the offline period.
        offline_for_ms: u64,
    },
    /// The signal matched the current state.
    Unchanged,
}

/// Observes online/offline transitions and measures offline duration.
#[derive(Clone, Debug)]
pub struct ConnectivityMonitor {
    /// Whether the client is currently offline.
    offline: bool,
    /// When the current offline period started (ms since epoch).
    offline_since: Option<u64>,
    /// Duration of the current or last offline period.
    offline_duration_ms: u64,
    /// When connectivity was last regained.
    reconnected_at: Option<u64>,
    /// Grace window for `was_offline`.
    grace_window_ms: u64,
}

impl ConnectivityMonitor {
    /// Create a monitor that assumes the client starts online.
    pub fn new() -> Self {
        Self {
            offline: false,
            offline_since: None,
            offline_duration_ms: 0,
            reconnected_at: None,
            grace_window_ms: DEFAULT_GRACE_WINDOW_MS,
        }
    }

    /// Check whether the client is currently offline.
    pub fn is_offline(&self) -> bool {
        self.offline
    }

    /// True for a short grace window after reconnecting.
    pub fn was_offline(&self) -> bool {
        self.was_offline_at(current_timestamp_ms())
    }

    /// Duration of the current offline period, or of the last one after
    /// reconnecting.
    pub fn offline_duration_ms(&self) -> u64 {
        self.offline_duration_ms
    }

    /// Record the platform's offline signal.
    pub fn set_offline(&mut self) -> ConnectivityChange {
        self.set_offline_at(current_timestamp_ms())
    }

    /// Record the platform's online signal.
    pub fn set_online(&mut self) -> ConnectivityChange {
        self.set_online_at(current_timestamp_ms())
    }

    /// Periodic update of the offline duration while offline.
    pub fn tick(&mut self) {
        self.tick_at(current_timestamp_ms());
    }

    fn set_offline_at(&mut self, now: u64) -> ConnectivityChange {
        if self.offline {
            return ConnectivityChange::Unchanged;
        }
        self.offline = true;
        self.offline_since = Some(now);
        self.offline_duration_ms = 0;
        tracing::debug!("connectivity lost");
        ConnectivityChange::WentOffline
    }

    fn set_online_at(&mut self, now: u64) -> ConnectivityChange {
        if !self.offline {
            return ConnectivityChange::Unchanged;
        }
        // Freeze the final duration before clearing the start marker.
        if let Some(since) = self.offline_since {
            self.offline_duration_ms = now.saturating_sub(since);
        }
        self.offline = false;
        self.offline_since = None;
        self.reconnected_at = Some(now);
        tracing::debug!(
            offline_for_ms = self.offline_duration_ms,
            "connectivity restored"
        );
        ConnectivityChange::BackOnline {
            offline_for_ms: self.offline_duration_ms,
        }
    }

    fn tick_at(&mut self, now: u64) {
        if let Some(since) = self.offline_since {
            self.offline_duration_ms = now.saturating_sub(since);
        }
    }

    fn was_offline_at(&self, now: u64) -> bool {
        self.reconnected_at
            .map(|at| now.saturating_sub(at) <= self.grace_window_ms)
            .unwrap_or(false)
    }

    /// Connectivity summary for UI display.
    pub fn info(&self) -> ConnectivityInfo {
        ConnectivityInfo {
            is_offline: self.offline,
            was_offline: self.was_offline(),
            offline_duration_ms: self.offline_duration_ms,
        }
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// UI display information about connectivity.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ConnectivityInfo {
    pub is_offline: bool,
    pub was_offline: bool,
    pub offline_duration_ms: u64,
}
