//! Durable action queue.
//!
//! An ordered, persisted log of mutations created while the
//! authoritative API is unreachable. Entries replay in FIFO order on
//! reconnect; each carries an explicit replay state
//! (`Pending → Retrying(n) → {Succeeded | Failed}`) so retry exhaustion
//! is a state transition, not a mutated counter.
//!
//! The queue never exceeds its capacity: when full, the oldest entries
//! are evicted to make room. A drain walks the whole queue once per
//! invocation and never stops on an individual failure.

use crate::api::{ApiError, TaskApi};
use crate::storage::{self, keys, KeyValueStore};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use task_model::{Task, TaskDraft, TaskPatch, TaskStatus};
use uuid::Uuid;

/// Default queue capacity.
pub const DEFAULT_CAPACITY: usize = 100;

/// Default retry cap per action.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// A mutation to replay against the authoritative API.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskAction {
    /// Create a task. `local_id` is the optimistic temporary identifier
    /// the reconciler swaps for the server-assigned one on confirmation.
    Create { local_id: String, draft: TaskDraft },
    /// Patch an existing task.
    Update { id: String, patch: TaskPatch },
    /// Delete a task.
    Delete { id: String },
    /// Toggle completion.
    Toggle { id: String },
    /// Move a task to another lifecycle state.
    Move { id: String, to_state: TaskStatus },
}

impl TaskAction {
    /// The entity this action targets.
    pub fn target_id(&self) -> &str {
        match self {
            TaskAction::Create { local_id, .. } => local_id,
            TaskAction::Update { id, .. }
            | TaskAction::Delete { id }
            | TaskAction::Toggle { id }
            | TaskAction::Move { id, .. } => id,
        }
    }

    /// Wire tag of this action, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            TaskAction::Create { .. } => "create",
            TaskAction::Update { .. } => "update",
            TaskAction::Delete { .. } => "delete",
            TaskAction::Toggle { .. } => "toggle",
            TaskAction::Move { .. } => "move",
        }
    }

    /// Re-point the action at a different entity id.
    ///
    /// Used when a deferred mutation queued against an optimistic
    /// temporary id is released after the creation confirmation assigns
    /// the final id.
    pub fn retarget(&mut self, new_id: &str) {
        match self {
            TaskAction::Create { local_id, .. } => *local_id = new_id.to_string(),
            TaskAction::Update { id, .. }
            | TaskAction::Delete { id }
            | TaskAction::Toggle { id }
            | TaskAction::Move { id, .. } => *id = new_id.to_string(),
        }
    }
}

/// Replay progress of one queued action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplayState {
    /// Never attempted.
    Pending,
    /// Attempted and failed the given number of times.
    Retrying(u32),
    /// Replayed successfully; the entry leaves the queue.
    Succeeded,
    /// Retry cap exhausted; the entry leaves the queue and is reported.
    Failed,
}

impl ReplayState {
    /// Number of failed attempts so far.
    pub fn retry_count(self) -> u32 {
        match self {
            ReplayState::Retrying(n) => n,
            _ => 0,
        }
    }

    /// The state after one more failed attempt.
    pub fn after_failure(self) -> ReplayState {
        ReplayState::Retrying(self.retry_count() + 1)
    }
}

/// One entry in the durable queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct QueuedAction {
    /// Unique entry identifier.
    pub id: Uuid,
    /// The mutation to replay.
    pub action: TaskAction,
    /// Enqueue timestamp (ms since epoch).
    pub queued_at: u64,
    /// Replay progress.
    pub state: ReplayState,
    /// Retry cap for this entry.
    pub max_retries: u32,
}

/// Result of one successful replay, for the reconciler to confirm.
#[derive(Clone, Debug, PartialEq)]
pub enum ReplayOutcome {
    /// A creation was confirmed; swap `local_id` for the server task.
    Created { local_id: String, task: Task },
    /// The server returned the authoritative entity after a mutation.
    Updated { task: Task },
    /// A deletion was confirmed.
    Deleted { id: String },
}

/// Summary of one drain pass.
#[derive(Clone, Debug, Default)]
pub struct DrainReport {
    /// Successful replays in queue order.
    pub replayed: Vec<ReplayOutcome>,
    /// Entries dropped after exhausting their retry cap.
    pub failed: Vec<QueuedAction>,
    /// Entries kept for the next drain cycle.
    pub retained: usize,
    /// True if this invocation was skipped because a drain was already
    /// in flight.
    pub skipped: bool,
}

impl DrainReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }
}

/// The durable action queue.
pub struct ActionQueue {
    /// Entries in FIFO order.
    entries: VecDeque<QueuedAction>,
    /// Capacity; oldest entries are evicted beyond it.
    capacity: usize,
    /// Retry cap applied to new entries.
    max_retries: u32,
    /// Guard against concurrent drains.
    draining: bool,
    /// Backing persistence.
    store: Box<dyn KeyValueStore>,
}

impl ActionQueue {
    /// Create a queue with default limits, reloading any persisted
    /// entries from the store.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        Self::with_limits(store, DEFAULT_CAPACITY, DEFAULT_MAX_RETRIES)
    }

    /// Create a queue with explicit capacity and retry cap.
    pub fn with_limits(store: Box<dyn KeyValueStore>, capacity: usize, max_retries: u32) -> Self {
        let entries: VecDeque<QueuedAction> =
            storage::load_enveloped::<Vec<QueuedAction>>(store.as_ref(), keys::ACTION_QUEUE)
                .unwrap_or_default()
                .into();
        Self {
            entries,
            capacity,
            max_retries,
            draining: false,
            store,
        }
    }

    /// Current queue length.
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Check whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether a drain is currently in flight.
    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Iterate queued entries in FIFO order.
    pub fn entries(&self) -> impl Iterator<Item = &QueuedAction> {
        self.entries.iter()
    }

    /// Append a mutation.
    ///
    /// Evicts the oldest entries first when at capacity. Returns the new
    /// entry's id, or `None` only when persisting the updated queue
    /// failed.
    pub fn enqueue(&mut self, action: TaskAction) -> Option<Uuid> {
        let mut evicted = Vec::new();
        while self.entries.len() >= self.capacity {
            if let Some(oldest) = self.entries.pop_front() {
                evicted.push(oldest);
            }
        }

        let entry = QueuedAction {
            id: Uuid::new_v4(),
            action,
            queued_at: storage::current_timestamp_ms(),
            state: ReplayState::Pending,
            max_retries: self.max_retries,
        };
        let id = entry.id;
        self.entries.push_back(entry);

        if !self.persist() {
            // The write failed; the entry offers no durability, so
            // reject it and put any evicted entries back in place.
            self.entries.pop_back();
            for oldest in evicted.into_iter().rev() {
                self.entries.push_front(oldest);
            }
            return None;
        }

        for oldest in &evicted {
            tracing::warn!(
                action_id = %oldest.id,
                kind = oldest.action.kind(),
                "queue at capacity, evicted oldest entry"
            );
        }
        Some(id)
    }

    /// Replay every queued action against the API, once each.
    ///
    /// Invoked on reconnect. Failures advance the entry's replay state;
    /// entries that exhaust their cap are dropped and reported in the
    /// returned report. A second drain invoked while one is in flight is
    /// skipped.
    pub async fn drain<A: TaskApi>(&mut self, api: &A) -> DrainReport {
        if self.draining {
            tracing::debug!("drain already in flight, skipping");
            return DrainReport::skipped();
        }
        self.draining = true;

        let mut report = DrainReport::default();
        let mut retained: VecDeque<QueuedAction> = VecDeque::new();

        while let Some(mut entry) = self.entries.pop_front() {
            match Self::execute(api, &entry.action).await {
                Ok(outcome) => {
                    entry.state = ReplayState::Succeeded;
                    report.replayed.push(outcome);
                }
                Err(err) => {
                    entry.state = entry.state.after_failure();
                    if entry.state.retry_count() >= entry.max_retries {
                        entry.state = ReplayState::Failed;
                        tracing::warn!(
                            action_id = %entry.id,
                            kind = entry.action.kind(),
                            %err,
                            "queued action exhausted its retry cap"
                        );
                        report.failed.push(entry);
                    } else {
                        tracing::debug!(
                            action_id = %entry.id,
                            retries = entry.state.retry_count(),
                            %err,
                            "queued action failed, retained for next drain"
                        );
                        retained.push_back(entry);
                    }
                }
            }
        }

        report.retained = retained.len();
        self.entries = retained;
        self.persist();
        self.draining = false;

        tracing::info!(
            replayed = report.replayed.len(),
            failed = report.failed.len(),
            retained = report.retained,
            "queue drain complete"
        );
        report
    }

    async fn execute<A: TaskApi>(api: &A, action: &TaskAction) -> Result<ReplayOutcome, ApiError> {
        match action {
            TaskAction::Create { local_id, draft } => {
                api.create_task(draft).await.map(|task| ReplayOutcome::Created {
                    local_id: local_id.clone(),
                    task,
                })
            }
            TaskAction::Update { id, patch } => api
                .update_task(id, patch)
                .await
                .map(|task| ReplayOutcome::Updated { task }),
            TaskAction::Delete { id } => api
                .delete_task(id)
                .await
                .map(|_| ReplayOutcome::Deleted { id: id.clone() }),
            TaskAction::Toggle { id } => api
                .toggle_task(id)
                .await
                .map(|task| ReplayOutcome::Updated { task }),
            TaskAction::Move { id, to_state } => api
                .move_task(id, *to_state)
                .await
                .map(|task| ReplayOutcome::Updated { task }),
        }
    }

    fn persist(&mut self) -> bool {
        let entries: Vec<QueuedAction> = self.entries.iter().cloned().collect();
        storage::save_enveloped(self.store.as_mut(), keys::ACTION_QUEUE, &entries)
    }
}
