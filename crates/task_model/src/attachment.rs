//! Attachment summary carried on each task.

use serde::{Deserialize, Serialize};

/// A file attached to a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Unique attachment identifier.
    pub id: String,
    /// Original file name.
    pub name: String,
    /// File size in bytes.
    #[serde(default)]
    pub size: u64,
}

impl Attachment {
    /// Create a new attachment record.
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: u64) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            size,
        }
    }
}

/// Attachment count plus the attachment list for a task.
///
/// The count is always recomputed from the list after a mutation rather
/// than maintained independently.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentSummary {
    /// Number of attachments.
    pub count: usize,
    /// The attachments themselves.
    #[serde(default)]
    pub files: Vec<Attachment>,
}

impl AttachmentSummary {
    /// Append an attachment, ignoring duplicates by id.
    pub fn add(&mut self, attachment: Attachment) {
        if !self.files.iter().any(|f| f.id == attachment.id) {
            self.files.push(attachment);
        }
        self.count = self.files.len();
    }

    /// Remove an attachment by id. Returns true if one was removed.
    pub fn remove(&mut self, attachment_id: &str) -> bool {
        let before = self.files.len();
        self.files.retain(|f| f.id != attachment_id);
        self.count = self.files.len();
        before != self.files.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_recomputes_count() {
        let mut summary = AttachmentSummary::default();
        summary.add(Attachment::new("a1", "photo.png", 1024));
        summary.add(Attachment::new("a2", "doc.pdf", 2048));

        assert_eq!(summary.count, 2);
        assert_eq!(summary.files.len(), 2);
    }

    #[test]
    fn test_add_duplicate_is_noop() {
        let mut summary = AttachmentSummary::default();
        summary.add(Attachment::new("a1", "photo.png", 1024));
        summary.add(Attachment::new("a1", "photo.png", 1024));

        assert_eq!(summary.count, 1);
    }

    #[test]
    fn test_remove() {
        let mut summary = AttachmentSummary::default();
        summary.add(Attachment::new("a1", "photo.png", 1024));

        assert!(summary.remove("a1"));
        assert_eq!(summary.count, 0);

        // Removing a missing id is a no-op
        assert!(!summary.remove("a1"));
    }
}
