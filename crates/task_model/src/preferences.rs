//! User preferences shared across tabs of the same profile.

use crate::task::Priority;
use serde::{Deserialize, Serialize};

/// Per-profile user preferences.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Preferences {
    /// Display theme name.
    pub theme: String,
    /// Whether notifications are shown.
    pub notifications_enabled: bool,
    /// Priority assigned to newly created tasks.
    pub default_priority: Priority,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            theme: "light".to_string(),
            notifications_enabled: true,
            default_priority: Priority::Medium,
        }
    }
}
