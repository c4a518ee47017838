//! Client-side task synchronization engine.
//!
//! Keeps a task list responsive and consistent on an unreliable
//! network:
//!
//! - **Optimistic mutations**: every change lands in the local
//!   collection immediately and is confirmed (or rolled back) against
//!   the authoritative API.
//! - **Durable action queue**: mutations made while offline persist
//!   across restarts and replay in order on reconnect, with a bounded
//!   retry cap per action.
//! - **Live channel**: a typed push-event stream with exponential
//!   reconnect backoff and a terminal failed state after the attempt
//!   cap.
//! - **Reconciler**: merges push events into the canonical collection
//!   with per-event-kind dedup rules, falling back to single-entity
//!   fetches or a full resync when a merge is impossible.
//! - **Caches**: whole-collection snapshots for offline reads plus a
//!   TTL-bounded response cache.
//! - **Tab sync**: display theme propagation across tabs sharing one
//!   storage area.
//!
//! [`TaskSyncEngine`] composes all of the above behind one mutation
//! surface; the individual components are exported for hosts that need
//! to wire them differently.

pub mod api;
pub mod cache;
pub mod channel;
pub mod connectivity;
pub mod engine;
pub mod error;
pub mod event;
pub mod memory_api;
pub mod queue;
pub mod reconciler;
pub mod storage;
pub mod tabsync;

pub use api::{ApiError, Page, TaskApi, TaskPage};
pub use cache::{ResponseCache, SnapshotCache, SnapshotKind};
pub use channel::{ChannelConfig, ChannelStatus, ConnectionState, LiveChannel, RetrySchedule};
pub use connectivity::{ConnectivityChange, ConnectivityInfo, ConnectivityMonitor};
pub use engine::{SyncStatus, TaskSyncEngine};
pub use error::{SyncError, SyncResult};
pub use event::{ClientEvent, EventEnvelope, PushEvent};
pub use memory_api::InMemoryApi;
pub use queue::{ActionQueue, DrainReport, QueuedAction, ReplayOutcome, ReplayState, TaskAction};
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use storage::{KeyValueStore, MemoryStore};
pub use tabsync::{SignalSource, TabSync};
