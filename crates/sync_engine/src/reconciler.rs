//! State reconciler: merges optimistic local mutations, replay
//! confirmations, and live push events into one canonical collection.
//!
//! The reconciler is a pure state machine. It never performs I/O; when
//! merging an event requires data it does not have, it returns a
//! follow-up in [`ReconcileOutcome`] and the engine performs the fetch
//! or resynchronization.
//!
//! Merge rules per event kind:
//! - Creations are deduplicated by id, so a push for a task the replay
//!   path already confirmed is a no-op.
//! - Updates and moves to vanished tasks are stale and silently
//!   ignored; only withheld creations and orphaned file events fall
//!   back to a single-entity fetch.
//! - Bulk operations are too coarse to merge field-by-field and demand
//!   a full resynchronization.
//! - Creations flagged `upload_pending` are withheld until the upload
//!   completion event or a fetch delivers the full entity.

use crate::event::PushEvent;
use crate::queue::ReplayOutcome;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use task_model::{Notification, Task, TaskDraft, TaskPatch, TaskStats, TaskStatus};
use uuid::Uuid;

/// What the engine must do after a push event was merged.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The event changed local state; nothing further to do.
    Applied,
    /// The event was redundant or irrelevant here.
    NoOp,
    /// The event referenced a task this client does not hold; fetch it.
    FetchTask(String),
    /// The event is too coarse to merge; refetch the full collection.
    Resync,
    /// The shared display theme changed to the given value.
    ThemeChanged(String),
}

/// Canonical client-side state and the merge logic over it.
#[derive(Default)]
pub struct Reconciler {
    tasks: HashMap<String, Task>,
    notifications: Vec<Notification>,
    /// Ids of pushed creations withheld until their upload completes.
    withheld: HashSet<String>,
    stats: TaskStats,
}

impl Reconciler {
    /// Create an empty reconciler.
    pub fn new() -> Self {
        Self::default()
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Look up one task.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Snapshot of the canonical collection, oldest first.
    pub fn tasks(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.tasks.values().cloned().collect();
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        tasks
    }

    /// Number of tasks held.
    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    /// Current notifications, delivery order.
    pub fn notifications(&self) -> &[Notification] {
        &self.notifications
    }

    /// Number of unread notifications.
    pub fn unread_count(&self) -> usize {
        self.notifications.iter().filter(|n| !n.read).count()
    }

    /// Statistics over the canonical collection, recomputed after every
    /// mutation.
    pub fn stats(&self) -> TaskStats {
        self.stats
    }

    // ---------------------------------------------------------------
    // Local mutations (optimistic)
    // ---------------------------------------------------------------

    /// Insert an optimistic task under a temporary identifier.
    pub fn create_local(&mut self, draft: TaskDraft) -> Task {
        let local_id = format!("local-{}", Uuid::new_v4());
        let task = draft.into_optimistic(local_id);
        self.tasks.insert(task.id.clone(), task.clone());
        self.refresh_stats();
        task
    }

    /// Apply a patch locally. Returns the updated task, or `None` if
    /// the id is unknown.
    pub fn update_local(&mut self, id: &str, patch: &TaskPatch) -> Option<Task> {
        let task = self.tasks.get_mut(id)?;
        task.apply_patch(patch);
        let task = task.clone();
        self.refresh_stats();
        Some(task)
    }

    /// Remove a task locally. Returns the removed task.
    pub fn delete_local(&mut self, id: &str) -> Option<Task> {
        let removed = self.tasks.remove(id);
        if removed.is_some() {
            self.withheld.remove(id);
            self.refresh_stats();
        }
        removed
    }

    /// Toggle completion locally. Returns the updated task.
    pub fn toggle_local(&mut self, id: &str) -> Option<Task> {
        let task = self.tasks.get_mut(id)?;
        task.toggle();
        let task = task.clone();
        self.refresh_stats();
        Some(task)
    }

    /// Move a task to another lifecycle state locally.
    pub fn move_local(&mut self, id: &str, to_state: TaskStatus) -> Option<Task> {
        let task = self.tasks.get_mut(id)?;
        task.set_status(to_state);
        let task = task.clone();
        self.refresh_stats();
        Some(task)
    }

    // ---------------------------------------------------------------
    // Server confirmations
    // ---------------------------------------------------------------

    /// Fold a replay confirmation into the canonical collection.
    ///
    /// A confirmed creation swaps the optimistic placeholder for the
    /// server's entity. If a push event already delivered that entity,
    /// the placeholder is simply dropped so no duplicate survives.
    pub fn confirm(&mut self, outcome: &ReplayOutcome) {
        match outcome {
            ReplayOutcome::Created { local_id, task } => {
                self.tasks.remove(local_id);
                self.tasks.insert(task.id.clone(), task.clone());
            }
            ReplayOutcome::Updated { task } => {
                self.tasks.insert(task.id.clone(), task.clone());
            }
            ReplayOutcome::Deleted { id } => {
                self.tasks.remove(id);
            }
        }
        self.refresh_stats();
    }

    /// Insert a task fetched from the authoritative API, releasing any
    /// withheld marker for it.
    pub fn insert_fetched(&mut self, task: Task) {
        self.withheld.remove(&task.id);
        self.tasks.insert(task.id.clone(), task);
        self.refresh_stats();
    }

    /// Replace the whole collection, e.g. after a resynchronization.
    pub fn replace_tasks(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        self.withheld.clear();
        self.refresh_stats();
    }

    /// Replace all notifications, e.g. from a snapshot read-back.
    pub fn replace_notifications(&mut self, notifications: Vec<Notification>) {
        self.notifications = notifications;
    }

    /// Mark one notification read. Returns false if the id is unknown
    /// or it was already read.
    pub fn mark_notification_read(&mut self, id: &str) -> bool {
        match self.notifications.iter_mut().find(|n| n.id == id) {
            Some(n) if !n.read => {
                n.read = true;
                true
            }
            _ => false,
        }
    }

    // ---------------------------------------------------------------
    // Push events
    // ---------------------------------------------------------------

    /// Merge one push event into the canonical state.
    pub fn apply_push(&mut self, event: &PushEvent) -> ReconcileOutcome {
        let outcome = match event {
            PushEvent::TodoCreated {
                task,
                upload_pending,
            } => self.on_created(task, *upload_pending),
            PushEvent::TodoUpdated { id, changes } => self.on_updated(id, changes),
            PushEvent::TodoDeleted { id } => self.on_deleted(id),
            PushEvent::TodoMoved { id, to_state, .. } => self.on_moved(id, *to_state),
            PushEvent::FileUploaded { todo_id, file } => {
                if self.withheld.contains(todo_id) || !self.tasks.contains_key(todo_id) {
                    // The upload completes a creation we never held in
                    // full; fetch the entity instead of patching air.
                    ReconcileOutcome::FetchTask(todo_id.clone())
                } else if let Some(task) = self.tasks.get_mut(todo_id) {
                    task.attachments.add(file.clone());
                    task.updated_at = Utc::now();
                    ReconcileOutcome::Applied
                } else {
                    ReconcileOutcome::NoOp
                }
            }
            PushEvent::FileDeleted { todo_id, file_id } => match self.tasks.get_mut(todo_id) {
                Some(task) => {
                    if task.attachments.remove(file_id) {
                        task.updated_at = Utc::now();
                        ReconcileOutcome::Applied
                    } else {
                        ReconcileOutcome::NoOp
                    }
                }
                None => ReconcileOutcome::NoOp,
            },
            PushEvent::BulkAction { action } => {
                tracing::info!(action = %action, "bulk action pushed, resynchronizing");
                ReconcileOutcome::Resync
            }
            PushEvent::Notification { notification } => self.on_notification(notification.clone()),
            PushEvent::NotificationBatch { notifications } => {
                let mut applied = false;
                for notification in notifications {
                    if self.on_notification(notification.clone()) == ReconcileOutcome::Applied {
                        applied = true;
                    }
                }
                if applied {
                    ReconcileOutcome::Applied
                } else {
                    ReconcileOutcome::NoOp
                }
            }
            PushEvent::NotificationsRead { count } => self.on_notifications_read(*count),
            PushEvent::UserActivity(_) => ReconcileOutcome::NoOp,
            PushEvent::ThemeChanged { theme } => ReconcileOutcome::ThemeChanged(theme.clone()),
        };

        if outcome == ReconcileOutcome::Applied {
            self.refresh_stats();
        }
        tracing::debug!(kind = event.kind(), ?outcome, "push event merged");
        outcome
    }

    fn on_created(&mut self, task: &Task, upload_pending: bool) -> ReconcileOutcome {
        if self.tasks.contains_key(&task.id) {
            // Already confirmed through the replay path or an earlier
            // duplicate delivery
            return ReconcileOutcome::NoOp;
        }
        if upload_pending {
            self.withheld.insert(task.id.clone());
            return ReconcileOutcome::NoOp;
        }
        self.tasks.insert(task.id.clone(), task.clone());
        ReconcileOutcome::Applied
    }

    fn on_updated(&mut self, id: &str, changes: &TaskPatch) -> ReconcileOutcome {
        match self.tasks.get_mut(id) {
            Some(task) => {
                task.apply_patch(changes);
                ReconcileOutcome::Applied
            }
            // A withheld creation exists server-side; fetch the full
            // entity. A plain unknown target was already deleted locally
            // and the update is stale.
            None if self.withheld.contains(id) => ReconcileOutcome::FetchTask(id.to_string()),
            None => ReconcileOutcome::NoOp,
        }
    }

    fn on_deleted(&mut self, id: &str) -> ReconcileOutcome {
        self.withheld.remove(id);
        if self.tasks.remove(id).is_some() {
            ReconcileOutcome::Applied
        } else {
            ReconcileOutcome::NoOp
        }
    }

    fn on_moved(&mut self, id: &str, to_state: TaskStatus) -> ReconcileOutcome {
        match self.tasks.get_mut(id) {
            Some(task) => {
                task.set_status(to_state);
                ReconcileOutcome::Applied
            }
            None if self.withheld.contains(id) => ReconcileOutcome::FetchTask(id.to_string()),
            None => ReconcileOutcome::NoOp,
        }
    }

    fn on_notification(&mut self, notification: Notification) -> ReconcileOutcome {
        if self.notifications.iter().any(|n| n.id == notification.id) {
            return ReconcileOutcome::NoOp;
        }
        self.notifications.push(notification);
        ReconcileOutcome::Applied
    }

    /// Mark the oldest `count` unread notifications as read.
    fn on_notifications_read(&mut self, count: usize) -> ReconcileOutcome {
        let mut remaining = count;
        let mut applied = false;
        for notification in self.notifications.iter_mut() {
            if remaining == 0 {
                break;
            }
            if !notification.read {
                notification.read = true;
                remaining -= 1;
                applied = true;
            }
        }
        if applied {
            ReconcileOutcome::Applied
        } else {
            ReconcileOutcome::NoOp
        }
    }

    fn refresh_stats(&mut self) {
        self.stats = TaskStats::compute(self.tasks.values(), Utc::now());
    }
}
