//! The synchronization engine facade.
//!
//! Composes the connectivity monitor, durable action queue, snapshot and
//! response caches, live channel, reconciler, and tab synchronizer into
//! one mutation surface:
//!
//! - Every mutation lands in the canonical collection immediately
//!   (optimistic), then either hits the API directly or, while offline,
//!   is queued for replay.
//! - Regaining connectivity drains the queue, folds the confirmations
//!   back in, and releases any mutations that were deferred because
//!   their target had not been confirmed yet.
//! - Push events flow through the reconciler; fetch fallbacks and full
//!   resynchronizations are executed here.
//!
//! The engine assumes a single-threaded cooperative host: methods take
//! `&mut self` and no mutation can interleave with another's await.

use crate::api::{ApiError, Page, TaskApi};
use crate::cache::{ResponseCache, SnapshotCache};
use crate::channel::{ChannelConfig, ChannelStatus, LiveChannel};
use crate::connectivity::{ConnectivityChange, ConnectivityInfo, ConnectivityMonitor};
use crate::error::{SyncError, SyncResult};
use crate::event::{ClientEvent, PushEvent};
use crate::queue::{ActionQueue, DrainReport, QueuedAction, ReplayOutcome, TaskAction};
use crate::reconciler::{ReconcileOutcome, Reconciler};
use crate::storage::KeyValueStore;
use crate::tabsync::TabSync;
use std::collections::HashMap;
use tokio::sync::mpsc;
use task_model::{Notification, Task, TaskDraft, TaskPatch, TaskStats, TaskStatus};
use uuid::Uuid;

/// Full engine status for UI display.
#[derive(Clone, Debug)]
pub struct SyncStatus {
    pub connectivity: ConnectivityInfo,
    pub channel: ChannelStatus,
    /// Actions waiting in the durable queue.
    pub queued_actions: usize,
    /// Mutations held back until their target's creation confirms.
    pub deferred_actions: usize,
    pub stats: TaskStats,
    pub unread_notifications: usize,
    pub theme: String,
}

/// Client-side task synchronization engine.
pub struct TaskSyncEngine<A: TaskApi> {
    api: A,
    connectivity: ConnectivityMonitor,
    queue: ActionQueue,
    snapshots: SnapshotCache,
    responses: ResponseCache,
    channel: LiveChannel,
    reconciler: Reconciler,
    tabs: TabSync,
    /// Mutations keyed by the optimistic id they target, released and
    /// retargeted once the creation confirmation assigns the final id.
    deferred: HashMap<String, Vec<TaskAction>>,
}

impl<A: TaskApi> TaskSyncEngine<A> {
    /// Create an engine over one shared storage area, recovering any
    /// persisted snapshots, queue entries, and theme.
    ///
    /// Returns the engine plus the receiver the channel transport
    /// drains for outbound client events.
    pub fn new<S>(api: A, store: S) -> (Self, mpsc::UnboundedReceiver<ClientEvent>)
    where
        S: KeyValueStore + Clone + 'static,
    {
        let (channel, outbound_rx) = LiveChannel::new(ChannelConfig::default());
        let snapshots = SnapshotCache::new(Box::new(store.clone()));

        let mut reconciler = Reconciler::new();
        if let Some(tasks) = snapshots.load_tasks() {
            reconciler.replace_tasks(tasks);
        }
        if let Some(notifications) = snapshots.load_notifications() {
            reconciler.replace_notifications(notifications);
        }

        let engine = Self {
            api,
            connectivity: ConnectivityMonitor::new(),
            queue: ActionQueue::new(Box::new(store.clone())),
            snapshots,
            responses: ResponseCache::new(Box::new(store.clone())),
            channel,
            reconciler,
            tabs: TabSync::new(Box::new(store)),
            deferred: HashMap::new(),
        };
        (engine, outbound_rx)
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// The canonical task collection, oldest first.
    pub fn tasks(&self) -> Vec<Task> {
        self.reconciler.tasks()
    }

    /// Look up one task.
    pub fn task(&self, id: &str) -> Option<&Task> {
        self.reconciler.task(id)
    }

    /// Current notifications.
    pub fn notifications(&self) -> &[Notification] {
        self.reconciler.notifications()
    }

    /// Locally computed statistics.
    pub fn stats(&self) -> TaskStats {
        self.reconciler.stats()
    }

    /// The theme this client currently shows.
    pub fn theme(&self) -> &str {
        self.tabs.theme()
    }

    /// Full status summary for UI display.
    pub fn status(&self) -> SyncStatus {
        SyncStatus {
            connectivity: self.connectivity.info(),
            channel: self.channel.status(),
            queued_actions: self.queue.count(),
            deferred_actions: self.deferred.values().map(Vec::len).sum(),
            stats: self.reconciler.stats(),
            unread_notifications: self.reconciler.unread_count(),
            theme: self.tabs.theme().to_string(),
        }
    }

    /// The live channel, for the transport to drive.
    pub fn channel_mut(&mut self) -> &mut LiveChannel {
        &mut self.channel
    }

    // ---------------------------------------------------------------
    // Mutations
    // ---------------------------------------------------------------

    /// Create a task.
    ///
    /// The optimistic placeholder is returned immediately when the API
    /// is unreachable; the creation replays on reconnect and the
    /// placeholder is swapped for the server's entity.
    pub async fn create_task(&mut self, draft: TaskDraft) -> SyncResult<Task> {
        let optimistic = self.reconciler.create_local(draft.clone());

        if self.connectivity.is_offline() {
            self.enqueue_or_rollback(
                TaskAction::Create {
                    local_id: optimistic.id.clone(),
                    draft,
                },
                &optimistic.id,
            )?;
            return Ok(optimistic);
        }

        match self.api.create_task(&draft).await {
            Ok(task) => {
                self.reconciler.confirm(&ReplayOutcome::Created {
                    local_id: optimistic.id,
                    task: task.clone(),
                });
                self.snapshot_tasks();
                Ok(task)
            }
            Err(err) if err.is_transient() => {
                self.enqueue_or_rollback(
                    TaskAction::Create {
                        local_id: optimistic.id.clone(),
                        draft,
                    },
                    &optimistic.id,
                )?;
                Ok(optimistic)
            }
            Err(err) => {
                self.reconciler.delete_local(&optimistic.id);
                Err(api_error(err))
            }
        }
    }

    /// Patch a task. Applied locally first; unreachable servers get the
    /// patch on replay.
    pub async fn update_task(&mut self, id: &str, patch: TaskPatch) -> SyncResult<Task> {
        let updated = self
            .reconciler
            .update_local(id, &patch)
            .ok_or_else(|| SyncError::UnknownTask(id.to_string()))?;

        let action = TaskAction::Update {
            id: id.to_string(),
            patch: patch.clone(),
        };
        if updated.optimistic {
            self.defer(id, action);
            return Ok(updated);
        }
        if self.connectivity.is_offline() {
            self.enqueue(action)?;
            return Ok(updated);
        }

        match self.api.update_task(id, &patch).await {
            Ok(task) => {
                self.reconciler
                    .confirm(&ReplayOutcome::Updated { task: task.clone() });
                self.snapshot_tasks();
                Ok(task)
            }
            Err(err) if err.is_transient() => {
                self.enqueue(action)?;
                Ok(updated)
            }
            Err(err) => Err(api_error(err)),
        }
    }

    /// Delete a task.
    pub async fn delete_task(&mut self, id: &str) -> SyncResult<()> {
        let removed = self
            .reconciler
            .delete_local(id)
            .ok_or_else(|| SyncError::UnknownTask(id.to_string()))?;

        let action = TaskAction::Delete { id: id.to_string() };
        if removed.optimistic {
            self.defer(id, action);
            return Ok(());
        }
        if self.connectivity.is_offline() {
            self.enqueue(action)?;
            return Ok(());
        }

        match self.api.delete_task(id).await {
            Ok(()) => {
                self.snapshot_tasks();
                Ok(())
            }
            Err(err) if err.is_transient() => {
                self.enqueue(action)?;
                Ok(())
            }
            Err(err) => {
                // Reinstate the task the server refused to delete
                self.reconciler.insert_fetched(removed);
                Err(api_error(err))
            }
        }
    }

    /// Toggle a task's completion.
    pub async fn toggle_task(&mut self, id: &str) -> SyncResult<Task> {
        let toggled = self
            .reconciler
            .toggle_local(id)
            .ok_or_else(|| SyncError::UnknownTask(id.to_string()))?;

        let action = TaskAction::Toggle { id: id.to_string() };
        if toggled.optimistic {
            self.defer(id, action);
            return Ok(toggled);
        }
        if self.connectivity.is_offline() {
            self.enqueue(action)?;
            return Ok(toggled);
        }

        match self.api.toggle_task(id).await {
            Ok(task) => {
                self.reconciler
                    .confirm(&ReplayOutcome::Updated { task: task.clone() });
                self.snapshot_tasks();
                Ok(task)
            }
            Err(err) if err.is_transient() => {
                self.enqueue(action)?;
                Ok(toggled)
            }
            Err(err) => Err(api_error(err)),
        }
    }

    /// Move a task to another lifecycle state.
    pub async fn move_task(&mut self, id: &str, to_state: TaskStatus) -> SyncResult<Task> {
        let moved = self
            .reconciler
            .move_local(id, to_state)
            .ok_or_else(|| SyncError::UnknownTask(id.to_string()))?;

        let action = TaskAction::Move {
            id: id.to_string(),
            to_state,
        };
        if moved.optimistic {
            self.defer(id, action);
            return Ok(moved);
        }
        if self.connectivity.is_offline() {
            self.enqueue(action)?;
            return Ok(moved);
        }

        match self.api.move_task(id, to_state).await {
            Ok(task) => {
                self.reconciler
                    .confirm(&ReplayOutcome::Updated { task: task.clone() });
                self.snapshot_tasks();
                Ok(task)
            }
            Err(err) if err.is_transient() => {
                self.enqueue(action)?;
                Ok(moved)
            }
            Err(err) => Err(api_error(err)),
        }
    }

    /// Apply one patch to many tasks.
    ///
    /// Offline, the bulk operation decomposes into per-task updates in
    /// the queue, since queued actions are single-entity. Returns the
    /// number of tasks the server (or, offline, the local collection)
    /// reported as updated.
    pub async fn bulk_update(&mut self, ids: &[String], patch: TaskPatch) -> SyncResult<usize> {
        let mut touched = Vec::new();
        for id in ids {
            if let Some(task) = self.reconciler.update_local(id, &patch) {
                touched.push((id.clone(), task.optimistic));
            }
        }

        if self.connectivity.is_offline() {
            self.queue_per_task(&touched, |id| TaskAction::Update {
                id,
                patch: patch.clone(),
            })?;
            return Ok(touched.len());
        }

        match self.api.bulk_update(ids, &patch).await {
            Ok(count) => {
                self.snapshot_tasks();
                Ok(count)
            }
            Err(err) if err.is_transient() => {
                self.queue_per_task(&touched, |id| TaskAction::Update {
                    id,
                    patch: patch.clone(),
                })?;
                Ok(touched.len())
            }
            Err(err) => Err(api_error(err)),
        }
    }

    /// Delete many tasks. Same offline decomposition as [`bulk_update`].
    ///
    /// [`bulk_update`]: Self::bulk_update
    pub async fn bulk_delete(&mut self, ids: &[String]) -> SyncResult<usize> {
        let mut touched = Vec::new();
        for id in ids {
            if let Some(task) = self.reconciler.delete_local(id) {
                touched.push((id.clone(), task.optimistic));
            }
        }

        if self.connectivity.is_offline() {
            self.queue_per_task(&touched, |id| TaskAction::Delete { id })?;
            return Ok(touched.len());
        }

        match self.api.bulk_delete(ids).await {
            Ok(count) => {
                self.snapshot_tasks();
                Ok(count)
            }
            Err(err) if err.is_transient() => {
                self.queue_per_task(&touched, |id| TaskAction::Delete { id })?;
                Ok(touched.len())
            }
            Err(err) => Err(api_error(err)),
        }
    }

    // ---------------------------------------------------------------
    // Connectivity
    // ---------------------------------------------------------------

    /// Platform went offline.
    pub fn handle_offline(&mut self) {
        self.connectivity.set_offline();
    }

    /// Platform came back online. Drains the queue on the transition.
    pub async fn handle_online(&mut self) -> DrainReport {
        match self.connectivity.set_online() {
            ConnectivityChange::BackOnline { offline_for_ms } => {
                tracing::info!(offline_for_ms, "back online, draining action queue");
                self.drain_queue().await
            }
            _ => DrainReport::default(),
        }
    }

    /// One-second host tick: updates the offline duration and runs the
    /// tab-sync poll fallback. Returns a theme adopted from another tab,
    /// if any.
    pub fn tick(&mut self) -> Option<String> {
        self.connectivity.tick();
        self.tabs.poll_tick()
    }

    /// Replay the durable queue and fold confirmations back in.
    pub async fn drain_queue(&mut self) -> DrainReport {
        let report = self.queue.drain(&self.api).await;
        self.discard_failed(&report.failed);
        let released = self.confirm_all(&report.replayed);

        // Deferred mutations never include creations, so one extra pass
        // settles everything that was released.
        if !released.is_empty() {
            for action in released {
                if self.queue.enqueue(action).is_none() {
                    tracing::warn!("failed to enqueue released deferred action");
                }
            }
            let followup = self.queue.drain(&self.api).await;
            self.confirm_all(&followup.replayed);
        }

        self.snapshot_tasks();
        report
    }

    /// A creation that exhausted its retry cap can never be confirmed,
    /// so its optimistic placeholder and any mutations deferred under
    /// its local id have nowhere to land; drop both.
    fn discard_failed(&mut self, failed: &[QueuedAction]) {
        for entry in failed {
            if let TaskAction::Create { local_id, .. } = &entry.action {
                let dropped = self.deferred.remove(local_id).map_or(0, |actions| actions.len());
                self.reconciler.delete_local(local_id);
                tracing::warn!(
                    local_id = %local_id,
                    dropped_deferred = dropped,
                    "creation permanently failed, discarding optimistic placeholder"
                );
            }
        }
    }

    fn confirm_all(&mut self, outcomes: &[ReplayOutcome]) -> Vec<TaskAction> {
        let mut released = Vec::new();
        for outcome in outcomes {
            self.reconciler.confirm(outcome);
            if let ReplayOutcome::Created { local_id, task } = outcome {
                if let Some(actions) = self.deferred.remove(local_id) {
                    for mut action in actions {
                        action.retarget(&task.id);
                        released.push(action);
                    }
                }
            }
        }
        released
    }

    // ---------------------------------------------------------------
    // Push events
    // ---------------------------------------------------------------

    /// Feed one push event from the transport through the channel and
    /// reconciler, executing any fetch or resync follow-up.
    pub async fn handle_push(&mut self, event: PushEvent) -> SyncResult<ReconcileOutcome> {
        let envelope = self.channel.handle_incoming(event);
        let outcome = self.reconciler.apply_push(&envelope.event);

        match &outcome {
            ReconcileOutcome::FetchTask(id) => match self.api.fetch_task(id).await {
                Ok(task) => self.reconciler.insert_fetched(task),
                Err(err) => {
                    tracing::warn!(id = %id, %err, "fetch fallback failed, task stays absent")
                }
            },
            ReconcileOutcome::Resync => {
                self.refresh().await?;
            }
            ReconcileOutcome::ThemeChanged(theme) => {
                let theme = theme.clone();
                self.adopt_theme(&theme);
            }
            ReconcileOutcome::Applied | ReconcileOutcome::NoOp => {}
        }

        self.snapshot_tasks();
        self.snapshot_notifications();
        Ok(outcome)
    }

    /// Refetch the full collection, or serve the last known-good state
    /// while offline. Optimistic placeholders survive the refetch.
    pub async fn refresh(&mut self) -> SyncResult<Vec<Task>> {
        if self.connectivity.is_offline() {
            return Ok(self.reconciler.tasks());
        }

        let mut fetched = Vec::new();
        let mut page = Page::default();
        loop {
            let batch = self.api.fetch_tasks(page).await.map_err(api_error)?;
            let more = batch.has_more();
            fetched.extend(batch.tasks);
            if !more {
                break;
            }
            page.number += 1;
        }

        let optimistic: Vec<Task> = self
            .reconciler
            .tasks()
            .into_iter()
            .filter(|t| t.optimistic)
            .collect();
        self.reconciler.replace_tasks(fetched);
        for task in optimistic {
            self.reconciler.insert_fetched(task);
        }

        self.snapshot_tasks();
        Ok(self.reconciler.tasks())
    }

    /// Server-side statistics through the response cache.
    ///
    /// Offline, statistics are computed over the local collection.
    pub async fn fetch_stats(&mut self) -> SyncResult<TaskStats> {
        if self.connectivity.is_offline() {
            return Ok(self.reconciler.stats());
        }

        let key = ResponseCache::cache_key("GET", "/stats", "");
        if let Some(cached) = self.responses.load(&key) {
            if let Ok(stats) = serde_json::from_value::<TaskStats>(cached) {
                return Ok(stats);
            }
        }

        let stats = self.api.fetch_stats().await.map_err(api_error)?;
        match serde_json::to_value(stats) {
            Ok(value) => {
                self.responses.save(&key, value);
            }
            Err(err) => tracing::warn!(%err, "failed to serialize stats for caching"),
        }
        Ok(stats)
    }

    // ---------------------------------------------------------------
    // Notifications and theme
    // ---------------------------------------------------------------

    /// Mark a notification read locally and broadcast the read.
    pub fn read_notification(&mut self, id: &str) -> bool {
        if !self.reconciler.mark_notification_read(id) {
            return false;
        }
        self.channel.emit(ClientEvent::NotificationRead {
            notification_id: id.to_string(),
        });
        self.snapshot_notifications();
        true
    }

    /// Switch theme: adopt locally, publish for other tabs, broadcast
    /// over the channel.
    pub fn set_theme(&mut self, theme: &str) {
        self.adopt_theme(theme);
        self.channel.emit(ClientEvent::ThemeChanged {
            theme: theme.to_string(),
        });
    }

    /// Another tab wrote to the shared store; adopt its theme if it
    /// diverged.
    pub fn on_tab_storage_signal(&mut self) -> Option<String> {
        self.tabs.on_storage_signal()
    }

    /// This tab regained focus; catch up with the shared theme.
    pub fn on_tab_focus(&mut self) -> Option<String> {
        self.tabs.on_focus()
    }

    fn adopt_theme(&mut self, theme: &str) {
        self.tabs.publish(theme);
        let mut preferences = self.snapshots.load_preferences().unwrap_or_default();
        preferences.theme = theme.to_string();
        self.snapshots.save_preferences(&preferences);
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    /// Hold back a mutation whose target is still optimistic, and
    /// snapshot the local change that preceded it.
    fn defer(&mut self, local_id: &str, action: TaskAction) {
        tracing::debug!(
            target_id = local_id,
            kind = action.kind(),
            "deferring mutation until creation confirms"
        );
        self.deferred
            .entry(local_id.to_string())
            .or_default()
            .push(action);
        self.snapshot_tasks();
    }

    /// Queue one action per touched task, deferring those whose target
    /// is still optimistic.
    fn queue_per_task<F>(&mut self, touched: &[(String, bool)], mut make: F) -> SyncResult<()>
    where
        F: FnMut(String) -> TaskAction,
    {
        for (id, optimistic) in touched {
            let action = make(id.clone());
            if *optimistic {
                self.defer(id, action);
            } else {
                self.enqueue(action)?;
            }
        }
        Ok(())
    }

    /// Queue a mutation for replay and snapshot the optimistic state
    /// that preceded it.
    fn enqueue(&mut self, action: TaskAction) -> SyncResult<Uuid> {
        let id = self
            .queue
            .enqueue(action)
            .ok_or_else(|| SyncError::Persistence("failed to persist queued action".to_string()))?;
        self.snapshot_tasks();
        Ok(id)
    }

    /// Enqueue an offline creation; if even the queue write fails the
    /// optimistic placeholder is rolled back, since it could never be
    /// replayed.
    fn enqueue_or_rollback(&mut self, action: TaskAction, local_id: &str) -> SyncResult<Uuid> {
        match self.enqueue(action) {
            Ok(id) => Ok(id),
            Err(err) => {
                self.reconciler.delete_local(local_id);
                self.snapshot_tasks();
                Err(err)
            }
        }
    }

    fn snapshot_tasks(&mut self) {
        let tasks = self.reconciler.tasks();
        self.snapshots.save_tasks(&tasks);
    }

    fn snapshot_notifications(&mut self) {
        let notifications = self.reconciler.notifications().to_vec();
        self.snapshots.save_notifications(&notifications);
    }
}

fn api_error(err: ApiError) -> SyncError {
    match err {
        ApiError::Network(message) => SyncError::Transient(message),
        ApiError::Status { status } if status >= 500 => {
            SyncError::Transient(format!("server status {}", status))
        }
        ApiError::Status { status } => SyncError::Rejected { status },
        ApiError::NotFound(id) => SyncError::UnknownTask(id),
        ApiError::Decode(message) => SyncError::Serialization(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_api::InMemoryApi;
    use crate::storage::MemoryStore;
    use task_model::Priority;

    fn make_engine() -> TaskSyncEngine<InMemoryApi> {
        let (engine, _outbound) = TaskSyncEngine::new(InMemoryApi::new(), MemoryStore::new());
        engine
    }

    // ========== Online Mutation Tests ==========

    #[tokio::test]
    async fn test_online_create_confirms_immediately() {
        let mut engine = make_engine();
        let task = engine.create_task(TaskDraft::new("Buy milk")).await.unwrap();

        assert_eq!(task.id, "srv-1");
        assert!(!task.optimistic);
        assert_eq!(engine.tasks().len(), 1);
        assert!(engine.status().queued_actions == 0);
    }

    #[tokio::test]
    async fn test_transient_failure_falls_back_to_queue() {
        let mut engine = make_engine();
        engine.api.fail_next(1);

        let task = engine.create_task(TaskDraft::new("Buy milk")).await.unwrap();
        assert!(task.optimistic);
        assert_eq!(engine.status().queued_actions, 1);
    }

    #[tokio::test]
    async fn test_unknown_task_update_is_rejected() {
        let mut engine = make_engine();
        let err = engine
            .update_task("ghost", TaskPatch::default())
            .await
            .unwrap_err();
        assert_eq!(err, SyncError::UnknownTask("ghost".to_string()));
    }

    #[tokio::test]
    async fn test_rejected_delete_reinstates_task() {
        let mut engine = make_engine();
        let task = engine.create_task(TaskDraft::new("Keep me")).await.unwrap();

        // Remove it server-side first so the engine's delete is rejected
        // with a non-transient not-found
        engine.api.delete_task(&task.id).await.unwrap();
        let err = engine.delete_task(&task.id).await.unwrap_err();
        assert_eq!(err, SyncError::UnknownTask(task.id.clone()));

        // The optimistically removed task came back
        assert!(engine.task(&task.id).is_some());
    }

    // ========== Bulk Operation Tests ==========

    #[tokio::test]
    async fn test_bulk_update_online() {
        let mut engine = make_engine();
        let a = engine.create_task(TaskDraft::new("a")).await.unwrap();
        let b = engine.create_task(TaskDraft::new("b")).await.unwrap();

        let count = engine
            .bulk_update(
                &[a.id.clone(), b.id.clone()],
                TaskPatch {
                    priority: Some(Priority::Low),
                    ..TaskPatch::default()
                },
            )
            .await
            .unwrap();

        assert_eq!(count, 2);
        assert_eq!(engine.task(&a.id).unwrap().priority, Priority::Low);
        assert_eq!(engine.api.task(&b.id).unwrap().priority, Priority::Low);
    }

    #[tokio::test]
    async fn test_bulk_delete_offline_decomposes_into_queue() {
        let mut engine = make_engine();
        let a = engine.create_task(TaskDraft::new("a")).await.unwrap();
        let b = engine.create_task(TaskDraft::new("b")).await.unwrap();

        engine.handle_offline();
        engine.api.set_offline(true);

        let count = engine
            .bulk_delete(&[a.id.clone(), b.id.clone()])
            .await
            .unwrap();
        assert_eq!(count, 2);
        assert!(engine.tasks().is_empty());
        assert_eq!(engine.status().queued_actions, 2);

        engine.api.set_offline(false);
        engine.handle_online().await;
        assert!(engine.api.is_empty());
    }

    // ========== Offline Flow Tests ==========

    #[tokio::test]
    async fn test_offline_create_queues_and_drains() {
        let mut engine = make_engine();
        engine.handle_offline();
        engine.api.set_offline(true);

        let optimistic = engine.create_task(TaskDraft::new("Buy milk")).await.unwrap();
        assert!(optimistic.optimistic);
        assert_eq!(engine.status().queued_actions, 1);

        engine.api.set_offline(false);
        let report = engine.handle_online().await;

        assert_eq!(report.replayed.len(), 1);
        assert_eq!(engine.status().queued_actions, 0);
        assert_eq!(engine.tasks().len(), 1);
        let confirmed = &engine.tasks()[0];
        assert_eq!(confirmed.id, "srv-1");
        assert!(!confirmed.optimistic);
    }

    #[tokio::test]
    async fn test_repeated_online_signal_drains_once() {
        let mut engine = make_engine();
        engine.handle_offline();
        engine.api.set_offline(true);
        engine.create_task(TaskDraft::new("a")).await.unwrap();

        engine.api.set_offline(false);
        let first = engine.handle_online().await;
        assert_eq!(first.replayed.len(), 1);

        // Already online; no transition, no second drain
        let second = engine.handle_online().await;
        assert!(second.replayed.is_empty());
        assert_eq!(engine.api.calls(), 1);
    }

    // ========== Deferred Mutation Tests ==========

    #[tokio::test]
    async fn test_mutation_on_optimistic_task_is_deferred_and_retargeted() {
        let mut engine = make_engine();
        engine.handle_offline();
        engine.api.set_offline(true);

        let optimistic = engine.create_task(TaskDraft::new("Draft")).await.unwrap();
        let patch = TaskPatch {
            priority: Some(Priority::High),
            ..TaskPatch::default()
        };
        let updated = engine.update_task(&optimistic.id, patch).await.unwrap();
        assert_eq!(updated.priority, Priority::High);

        // The patch is deferred, not queued
        assert_eq!(engine.status().queued_actions, 1);
        assert_eq!(engine.status().deferred_actions, 1);

        engine.api.set_offline(false);
        engine.handle_online().await;

        // Creation and the released patch both reached the server
        assert_eq!(engine.status().deferred_actions, 0);
        assert_eq!(engine.tasks().len(), 1);
        let server_side = engine.api.task("srv-1").unwrap();
        assert_eq!(server_side.priority, Priority::High);
    }

    #[tokio::test]
    async fn test_failed_creation_discards_placeholder_and_deferred_work() {
        let mut engine = make_engine();
        engine.handle_offline();
        engine.api.set_offline(true);

        let optimistic = engine.create_task(TaskDraft::new("doomed")).await.unwrap();
        engine.toggle_task(&optimistic.id).await.unwrap();
        assert_eq!(engine.status().deferred_actions, 1);

        // Three drains against a dead server exhaust the creation's cap
        engine.drain_queue().await;
        engine.drain_queue().await;
        let report = engine.drain_queue().await;
        assert_eq!(report.failed.len(), 1);

        // Nothing lingers: no placeholder, no unreleasable deferred work
        assert_eq!(engine.status().queued_actions, 0);
        assert_eq!(engine.status().deferred_actions, 0);
        assert!(engine.task(&optimistic.id).is_none());
    }

    // ========== Push Handling Tests ==========

    #[tokio::test]
    async fn test_push_file_upload_for_unknown_task_fetches() {
        let mut engine = make_engine();
        let mut remote = Task::new("srv-7", "remote");
        remote
            .attachments
            .add(task_model::Attachment::new("f1", "scan.pdf", 4096));
        engine.api.insert(remote);

        let outcome = engine
            .handle_push(PushEvent::FileUploaded {
                todo_id: "srv-7".to_string(),
                file: task_model::Attachment::new("f1", "scan.pdf", 4096),
            })
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::FetchTask("srv-7".to_string()));
        assert_eq!(engine.task("srv-7").unwrap().attachments.count, 1);
    }

    #[tokio::test]
    async fn test_push_bulk_action_resyncs() {
        let mut engine = make_engine();
        engine.api.insert(Task::new("srv-1", "a"));
        engine.api.insert(Task::new("srv-2", "b"));

        let outcome = engine
            .handle_push(PushEvent::BulkAction {
                action: "import".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Resync);
        assert_eq!(engine.tasks().len(), 2);
    }

    #[tokio::test]
    async fn test_push_theme_change_propagates_to_tabs() {
        let mut engine = make_engine();
        engine
            .handle_push(PushEvent::ThemeChanged {
                theme: "dark".to_string(),
            })
            .await
            .unwrap();

        assert_eq!(engine.theme(), "dark");
    }

    // ========== Refresh Tests ==========

    #[tokio::test]
    async fn test_refresh_preserves_optimistic_placeholders() {
        let mut engine = make_engine();
        engine.api.insert(Task::new("srv-1", "remote"));

        engine.handle_offline();
        engine.api.set_offline(true);
        let optimistic = engine.create_task(TaskDraft::new("local")).await.unwrap();

        engine.connectivity.set_online();
        engine.api.set_offline(false);
        let tasks = engine.refresh().await.unwrap();

        assert_eq!(tasks.len(), 2);
        assert!(engine.task(&optimistic.id).unwrap().optimistic);
        assert!(engine.task("srv-1").is_some());
    }

    #[tokio::test]
    async fn test_refresh_offline_serves_local_state() {
        let mut engine = make_engine();
        engine.create_task(TaskDraft::new("kept")).await.unwrap();

        engine.handle_offline();
        engine.api.set_offline(true);
        let calls_before = engine.api.calls();

        let tasks = engine.refresh().await.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(engine.api.calls(), calls_before);
    }

    // ========== Recovery Tests ==========

    #[tokio::test]
    async fn test_snapshot_recovery_at_construction() {
        let mut seeded = MemoryStore::new();
        crate::storage::save_enveloped(
            &mut seeded,
            crate::storage::keys::TASKS,
            &vec![Task::new("srv-1", "persisted")],
        );

        let (engine, _outbound) = TaskSyncEngine::new(InMemoryApi::new(), seeded);
        assert_eq!(engine.tasks().len(), 1);
        assert_eq!(engine.tasks()[0].title, "persisted");
    }

    // ========== Stats and Notification Tests ==========

    #[tokio::test]
    async fn test_fetch_stats_uses_response_cache() {
        let mut engine = make_engine();
        engine.api.insert(Task::new("srv-1", "a"));

        let first = engine.fetch_stats().await.unwrap();
        assert_eq!(first.total, 1);
        let calls_after_first = engine.api.calls();

        // Second fetch inside the TTL is served from the cache
        let second = engine.fetch_stats().await.unwrap();
        assert_eq!(second, first);
        assert_eq!(engine.api.calls(), calls_after_first);
    }

    #[tokio::test]
    async fn test_read_notification() {
        let mut engine = make_engine();
        engine
            .handle_push(PushEvent::Notification {
                notification: Notification::new("n1", "hello"),
            })
            .await
            .unwrap();
        assert_eq!(engine.status().unread_notifications, 1);

        assert!(engine.read_notification("n1"));
        assert_eq!(engine.status().unread_notifications, 0);
        assert!(!engine.read_notification("n1"));
    }
}
