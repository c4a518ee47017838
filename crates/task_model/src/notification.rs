//! User notifications delivered over the live channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification shown to the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Unique notification identifier.
    pub id: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the user has read the notification.
    #[serde(default)]
    pub read: bool,
    /// Delivery timestamp.
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Create a new unread notification.
    pub fn new(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            message: message.into(),
            read: false,
            created_at: Utc::now(),
        }
    }
}
