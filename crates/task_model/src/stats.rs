//! Statistics derived from the canonical task collection.
//!
//! Statistics are always recomputed from the full collection after a
//! mutation rather than maintained incrementally, so they cannot drift
//! from the tasks they describe.

use crate::task::{Priority, Task, TaskStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Counts by status, priority, and overdue state.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    /// Total number of tasks.
    pub total: usize,
    /// Tasks with `pending` status.
    pub pending: usize,
    /// Tasks with `in_progress` status.
    pub in_progress: usize,
    /// Tasks with `completed` status.
    pub completed: usize,
    /// Tasks with low priority.
    pub low_priority: usize,
    /// Tasks with medium priority.
    pub medium_priority: usize,
    /// Tasks with high priority.
    pub high_priority: usize,
    /// Incomplete tasks past their due date.
    pub overdue: usize,
}

impl TaskStats {
    /// Compute statistics over a task collection at the given instant.
    pub fn compute<'a>(tasks: impl IntoIterator<Item = &'a Task>, now: DateTime<Utc>) -> Self {
        let mut stats = TaskStats::default();
        for task in tasks {
            stats.total += 1;
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::InProgress => stats.in_progress += 1,
                TaskStatus::Completed => stats.completed += 1,
            }
            match task.priority {
                Priority::Low => stats.low_priority += 1,
                Priority::Medium => stats.medium_priority += 1,
                Priority::High => stats.high_priority += 1,
            }
            if task.is_overdue(now) {
                stats.overdue += 1;
            }
        }
        stats
    }

    /// Fraction of tasks completed, in the range 0.0..=1.0.
    pub fn completion_ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_task(id: &str, status: TaskStatus, priority: Priority) -> Task {
        let mut task = Task::new(id, "task");
        task.status = status;
        task.priority = priority;
        task
    }

    #[test]
    fn test_compute_empty() {
        let tasks: Vec<Task> = Vec::new();
        let stats = TaskStats::compute(&tasks, Utc::now());
        assert_eq!(stats, TaskStats::default());
        assert_eq!(stats.completion_ratio(), 0.0);
    }

    #[test]
    fn test_compute_counts() {
        let now = Utc::now();
        let tasks = vec![
            make_task("1", TaskStatus::Pending, Priority::Low),
            make_task("2", TaskStatus::InProgress, Priority::Medium),
            make_task("3", TaskStatus::Completed, Priority::High),
            make_task("4", TaskStatus::Completed, Priority::High),
        ];

        let stats = TaskStats::compute(&tasks, now);

        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.in_progress, 1);
        assert_eq!(stats.completed, 2);
        assert_eq!(stats.low_priority, 1);
        assert_eq!(stats.medium_priority, 1);
        assert_eq!(stats.high_priority, 2);
        assert_eq!(stats.completion_ratio(), 0.5);
    }

    #[test]
    fn test_compute_overdue_excludes_completed() {
        let now = Utc::now();
        let mut overdue = make_task("1", TaskStatus::Pending, Priority::Low);
        overdue.due_date = Some(now - Duration::hours(2));

        let mut done = make_task("2", TaskStatus::Completed, Priority::Low);
        done.due_date = Some(now - Duration::hours(2));

        let stats = TaskStats::compute([&overdue, &done], now);
        assert_eq!(stats.overdue, 1);
    }
}
