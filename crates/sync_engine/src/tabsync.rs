//! Cross-tab propagation of the shared display theme.
//!
//! Tabs share one persistence area but no channel; a tab that changes
//! the theme publishes it through the store, and other tabs converge by
//! re-reading on one of three signals: a storage-change notification,
//! a window-focus event, or a periodic poll. The poll is a fallback for
//! hosts that deliver neither signal and can be disabled.

use crate::storage::{self, keys, KeyValueStore};

/// Which signal triggered a theme re-read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignalSource {
    /// The host reported that another tab wrote to the store.
    StorageEvent,
    /// This tab regained focus.
    WindowFocus,
    /// The periodic poll fired.
    Poll,
}

/// One tab's view of the shared theme.
pub struct TabSync {
    store: Box<dyn KeyValueStore>,
    current: String,
    poll_enabled: bool,
}

impl TabSync {
    /// Create a tab view, adopting any theme already persisted.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        let current = storage::load_enveloped::<String>(store.as_ref(), keys::THEME)
            .unwrap_or_else(|| "light".to_string());
        Self {
            store,
            current,
            poll_enabled: true,
        }
    }

    /// The theme this tab currently shows.
    pub fn theme(&self) -> &str {
        &self.current
    }

    /// Enable or disable the periodic poll fallback.
    pub fn set_poll_enabled(&mut self, enabled: bool) {
        self.poll_enabled = enabled;
    }

    /// Adopt a new theme in this tab and publish it for the others.
    /// Returns `false` if persisting failed; the local change sticks.
    pub fn publish(&mut self, theme: impl Into<String>) -> bool {
        self.current = theme.into();
        storage::save_enveloped(self.store.as_mut(), keys::THEME, &self.current)
    }

    /// Another tab wrote to the store.
    pub fn on_storage_signal(&mut self) -> Option<String> {
        self.refresh(SignalSource::StorageEvent)
    }

    /// This tab regained focus.
    pub fn on_focus(&mut self) -> Option<String> {
        self.refresh(SignalSource::WindowFocus)
    }

    /// The periodic poll fired. A no-op while the poll is disabled.
    pub fn poll_tick(&mut self) -> Option<String> {
        if !self.poll_enabled {
            return None;
        }
        self.refresh(SignalSource::Poll)
    }

    /// Re-read the persisted theme and adopt it if it diverged.
    /// Returns the newly adopted theme, or `None` if nothing changed.
    pub fn refresh(&mut self, source: SignalSource) -> Option<String> {
        let persisted = storage::load_enveloped::<String>(self.store.as_ref(), keys::THEME)?;
        if persisted == self.current {
            return None;
        }
        tracing::debug!(?source, theme = %persisted, "adopting theme from another tab");
        self.current = persisted.clone();
        Some(persisted)
    }
}
