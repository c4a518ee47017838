//! Live event channel state machine.
//!
//! Owns the connection lifecycle for the push-event channel: the
//! `disconnected → connecting → connected` happy path, the unclean path
//! through `error → reconnecting` with exponential backoff, and the
//! terminal `failed` state after the reconnect cap, which only a manual
//! reconnect leaves.
//!
//! The transport itself (WebSocket or otherwise) is an external
//! collaborator: it feeds `on_open` / `on_error` / `on_close` /
//! `handle_incoming` into this state machine, drains the outbound
//! receiver, and arms a timer for each `RetrySchedule` the machine hands
//! back. The channel holds no event history; each received event
//! overwrites a single latest-event slot under a monotonically
//! increasing timestamp.

use crate::event::{ClientEvent, EventEnvelope, PushEvent};
use crate::storage::current_timestamp_ms;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Default base delay for reconnect backoff.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;

/// Default cap on consecutive reconnect attempts.
pub const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 5;

/// Connection state of the live channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection and none in progress.
    Disconnected,
    /// A connection attempt is in flight.
    Connecting,
    /// Connected; events flow.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// The transport reported a failure; a retry decision is pending.
    Error,
    /// Reconnect attempts are exhausted; manual reconnect required.
    Failed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

/// Channel configuration.
#[derive(Clone, Copy, Debug)]
pub struct ChannelConfig {
    /// Base delay for exponential backoff.
    pub base_delay_ms: u64,
    /// Attempt cap before entering `Failed`.
    pub max_reconnect_attempts: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_reconnect_attempts: DEFAULT_MAX_RECONNECT_ATTEMPTS,
        }
    }
}

/// Outcome of an error report: either one retry timer to arm, or
/// exhaustion.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RetrySchedule {
    /// Arm exactly one timer for `delay_ms`, then call `fire_retry`.
    Scheduled { delay_ms: u64, attempt: u32 },
    /// The attempt cap was reached; the channel is now `Failed`.
    Exhausted,
}

/// Channel status for UI display.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub state: ConnectionState,
    pub reconnect_attempts: u32,
    /// Receipt timestamp of the last event, 0 if none.
    pub last_event_at: u64,
}

/// The live event channel state machine.
pub struct LiveChannel {
    /// Current connection state.
    state: ConnectionState,
    /// Consecutive failed reconnect attempts.
    reconnect_attempts: u32,
    /// Configuration.
    config: ChannelConfig,
    /// Delay of the single currently armed retry timer, if any.
    pending_retry_ms: Option<u64>,
    /// Latest received event; overwritten by each new one.
    last_event: Option<EventEnvelope>,
    /// Subscribers receiving every wrapped event.
    subscribers: Vec<mpsc::UnboundedSender<EventEnvelope>>,
    /// Outbound client events for the transport to send.
    outbound: mpsc::UnboundedSender<ClientEvent>,
}

impl LiveChannel {
    /// Create a channel and the receiver the transport drains for
    /// outbound emissions.
    pub fn new(config: ChannelConfig) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let channel = Self {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            config,
            pending_retry_ms: None,
            last_event: None,
            subscribers: Vec::new(),
            outbound,
        };
        (channel, outbound_rx)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Consecutive failed reconnect attempts.
    pub fn reconnect_attempts(&self) -> u32 {
        self.reconnect_attempts
    }

    /// Delay of the currently armed retry timer, if any.
    pub fn pending_retry_ms(&self) -> Option<u64> {
        self.pending_retry_ms
    }

    /// Latest received event, if any.
    pub fn last_event(&self) -> Option<&EventEnvelope> {
        self.last_event.as_ref()
    }

    /// Status summary for UI display.
    pub fn status(&self) -> ChannelStatus {
        ChannelStatus {
            state: self.state,
            reconnect_attempts: self.reconnect_attempts,
            last_event_at: self.last_event.as_ref().map(|e| e.timestamp).unwrap_or(0),
        }
    }

    /// Begin a connection attempt.
    ///
    /// Legal from `Disconnected` and, as the manual reconnect trigger,
    /// from `Failed`. Returns false from any other state.
    pub fn connect(&mut self) -> bool {
        match self.state {
            ConnectionState::Disconnected | ConnectionState::Failed => {
                self.reconnect_attempts = 0;
                self.pending_retry_ms = None;
                self.transition(ConnectionState::Connecting);
                true
            }
            _ => false,
        }
    }

    /// Manual reconnect: synchronously tear down whatever is in flight
    /// and start over. Events in flight on the old connection are
    /// discarded by the transport when it drops the old socket.
    pub fn manual_reconnect(&mut self) {
        self.pending_retry_ms = None;
        self.reconnect_attempts = 0;
        self.transition(ConnectionState::Connecting);
    }

    /// The transport established the connection.
    pub fn on_open(&mut self) {
        self.reconnect_attempts = 0;
        self.pending_retry_ms = None;
        self.transition(ConnectionState::Connected);
    }

    /// The transport closed cleanly.
    pub fn on_close(&mut self) {
        self.pending_retry_ms = None;
        self.transition(ConnectionState::Disconnected);
    }

    /// The transport reported a failure (failed connect attempt or an
    /// unclean drop).
    ///
    /// Clears any pending retry timer before scheduling a new one, so at
    /// most one timer is armed at a time. Delay doubles per attempt:
    /// `base_delay * 2^attempt`.
    pub fn on_error(&mut self) -> RetrySchedule {
        self.pending_retry_ms = None;
        self.transition(ConnectionState::Error);

        if self.reconnect_attempts >= self.config.max_reconnect_attempts {
            self.transition(ConnectionState::Failed);
            tracing::warn!(
                attempts = self.reconnect_attempts,
                "live channel exhausted reconnect attempts"
            );
            return RetrySchedule::Exhausted;
        }

        let attempt = self.reconnect_attempts;
        let delay_ms = self.config.base_delay_ms.saturating_mul(1u64 << attempt.min(63));
        self.reconnect_attempts += 1;
        self.pending_retry_ms = Some(delay_ms);
        self.transition(ConnectionState::Reconnecting);
        RetrySchedule::Scheduled { delay_ms, attempt }
    }

    /// The armed retry timer fired; move into a new connection attempt.
    pub fn fire_retry(&mut self) -> bool {
        if self.state != ConnectionState::Reconnecting {
            return false;
        }
        self.pending_retry_ms = None;
        self.transition(ConnectionState::Connecting);
        true
    }

    /// Register a subscriber for every wrapped inbound event.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<EventEnvelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Wrap an inbound event, update the latest-event slot, and fan the
    /// envelope out to subscribers.
    ///
    /// Envelope timestamps are forced monotonically increasing even when
    /// the wall clock stalls, so slot overwrites always order correctly.
    pub fn handle_incoming(&mut self, event: PushEvent) -> EventEnvelope {
        let mut timestamp = current_timestamp_ms();
        if let Some(last) = &self.last_event {
            if timestamp <= last.timestamp {
                timestamp = last.timestamp + 1;
            }
        }
        let envelope = EventEnvelope { event, timestamp };
        self.last_event = Some(envelope.clone());

        // Drop subscribers whose receiving side is gone.
        self.subscribers
            .retain(|tx| tx.send(envelope.clone()).is_ok());
        envelope
    }

    /// Heartbeat: acknowledge a server ping with an immediate pong.
    ///
    /// Pass-through only; liveness decisions belong to the transport's
    /// own timeout.
    pub fn handle_ping(&mut self, _server_timestamp: u64) -> bool {
        self.emit(ClientEvent::Pong {
            timestamp: current_timestamp_ms(),
        })
    }

    /// Emit a client event, best-effort.
    ///
    /// Returns false without error when the channel is not connected;
    /// callers needing durability use the action queue and REST path.
    pub fn emit(&mut self, event: ClientEvent) -> bool {
        if self.state != ConnectionState::Connected {
            tracing::warn!(
                kind = event.kind(),
                state = ?self.state,
                "dropping emission, channel not connected"
            );
            return false;
        }
        self.outbound.send(event).is_ok()
    }

    fn transition(&mut self, next: ConnectionState) {
        if self.state != next {
            tracing::debug!(from = ?self.state, to = ?next, "channel state transition");
            self.state = next;
        }
    }
}
