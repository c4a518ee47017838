//! Task Model - Core task entities and derived statistics
//!
//! This crate provides the entity model consumed by the sync engine and any
//! host application: tasks with lifecycle status and priority, attachment
//! summaries, notifications, user preferences, and statistics derived from
//! the canonical task collection.

mod attachment;
mod notification;
mod preferences;
mod stats;
mod task;

pub use attachment::*;
pub use notification::*;
pub use preferences::*;
pub use stats::*;
pub use task::*;
