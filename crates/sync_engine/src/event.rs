//! Typed event vocabulary for the live channel.
//!
//! Inbound push events and outbound client emissions are closed tagged
//! unions so the reconciler's merge logic can match exhaustively. The
//! wire format is `{"type": ..., "data": {...}}` with snake_case tags.
//!
//! Push events are transient: each is wrapped in an `EventEnvelope` with
//! a local receipt timestamp, consumed immediately, and never persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use task_model::{Attachment, Notification, Task, TaskPatch, TaskStatus};

/// A server-originated event received over the live channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum PushEvent {
    /// A task was created. `upload_pending` marks a creation bundled
    /// with a file upload that has not completed yet; such creations
    /// are withheld from the canonical collection until a completion
    /// event or fetch fallback delivers the full entity.
    TodoCreated {
        #[serde(flatten)]
        task: Task,
        #[serde(default)]
        upload_pending: bool,
    },
    /// Fields of an existing task changed.
    TodoUpdated {
        id: String,
        #[serde(flatten)]
        changes: TaskPatch,
    },
    /// A task was deleted.
    TodoDeleted { id: String },
    /// A task moved to another lifecycle state.
    TodoMoved {
        id: String,
        to_state: TaskStatus,
        moved_at: DateTime<Utc>,
    },
    /// A file finished uploading and is attached to a task.
    FileUploaded { todo_id: String, file: Attachment },
    /// A file was detached from a task.
    FileDeleted { todo_id: String, file_id: String },
    /// A bulk operation ran server-side; clients resynchronize rather
    /// than merging field-by-field.
    BulkAction { action: String },
    /// A single notification for the user.
    Notification {
        #[serde(flatten)]
        notification: Notification,
    },
    /// Several notifications delivered at once.
    NotificationBatch { notifications: Vec<Notification> },
    /// The given number of notifications were marked read elsewhere.
    NotificationsRead { count: usize },
    /// Presence information about other users. Opaque to the engine.
    UserActivity(serde_json::Value),
    /// The shared display theme changed.
    ThemeChanged { theme: String },
}

impl PushEvent {
    /// Wire tag of this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            PushEvent::TodoCreated { .. } => "todo_created",
            PushEvent::TodoUpdated { .. } => "todo_updated",
            PushEvent::TodoDeleted { .. } => "todo_deleted",
            PushEvent::TodoMoved { .. } => "todo_moved",
            PushEvent::FileUploaded { .. } => "file_uploaded",
            PushEvent::FileDeleted { .. } => "file_deleted",
            PushEvent::BulkAction { .. } => "bulk_action",
            PushEvent::Notification { .. } => "notification",
            PushEvent::NotificationBatch { .. } => "notification_batch",
            PushEvent::NotificationsRead { .. } => "notifications_read",
            PushEvent::UserActivity(_) => "user_activity",
            PushEvent::ThemeChanged { .. } => "theme_changed",
        }
    }
}

/// A push event wrapped with its local receipt timestamp.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// The event itself.
    pub event: PushEvent,
    /// Receipt timestamp (ms since epoch), monotonically increasing
    /// within one channel.
    pub timestamp: u64,
}

/// A client-originated event emitted over the live channel.
///
/// Emissions are best-effort presence traffic, never durable writes;
/// durable writes go through the action queue and REST path.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// The user did something worth broadcasting as presence.
    UserActivity { action: String, timestamp: u64 },
    /// The user read a notification.
    NotificationRead {
        #[serde(rename = "notificationId")]
        notification_id: String,
    },
    /// The user switched display theme.
    ThemeChanged { theme: String },
    /// Heartbeat acknowledgement of a server ping.
    Pong { timestamp: u64 },
}

impl ClientEvent {
    /// Wire tag of this event, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientEvent::UserActivity { .. } => "user_activity",
            ClientEvent::NotificationRead { .. } => "notification_read",
            ClientEvent::ThemeChanged { .. } => "theme_changed",
            ClientEvent::Pong { .. } => "pong",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_event_wire_tags() {
        let event = PushEvent::TodoDeleted {
            id: "42".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "todo_deleted");
        assert_eq!(json["data"]["id"], "42");
    }

    #[test]
    fn test_todo_created_flattens_task_fields() {
        let task = Task::new("7", "Flat");
        let event = PushEvent::TodoCreated {
            task,
            upload_pending: false,
        };
        let json = serde_json::to_value(&event).unwrap();

        // Task fields sit directly in the data object
        assert_eq!(json["data"]["id"], "7");
        assert_eq!(json["data"]["title"], "Flat");
    }

    #[test]
    fn test_upload_pending_defaults_to_false() {
        let json = serde_json::json!({
            "type": "todo_created",
            "data": {
                "id": "9",
                "title": "No marker",
                "created_at": "2024-01-01T00:00:00Z",
                "updated_at": "2024-01-01T00:00:00Z"
            }
        });

        let event: PushEvent = serde_json::from_value(json).unwrap();
        match event {
            PushEvent::TodoCreated { upload_pending, .. } => assert!(!upload_pending),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_push_event_round_trip() {
        let event = PushEvent::TodoMoved {
            id: "3".to_string(),
            to_state: TaskStatus::InProgress,
            moved_at: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let restored: PushEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, event);
    }

    #[test]
    fn test_user_activity_is_opaque() {
        let json = serde_json::json!({
            "type": "user_activity",
            "data": { "user": "u1", "action": "typing" }
        });

        let event: PushEvent = serde_json::from_value(json).unwrap();
        assert_eq!(event.kind(), "user_activity");
    }

    #[test]
    fn test_client_event_notification_read_uses_camel_case_id() {
        let event = ClientEvent::NotificationRead {
            notification_id: "n1".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["type"], "notification_read");
        assert_eq!(json["data"]["notificationId"], "n1");
    }

    #[test]
    fn test_client_event_pong() {
        let event = ClientEvent::Pong { timestamp: 12345 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "pong");
        assert_eq!(json["data"]["timestamp"], 12345);
    }
}
