//! Note data model.
//!
//! This module defines the unit of persisted content and the in-memory store
//! that owns the ordered collection:
//! - `Note` and `NotePatch` value types
//! - Identifier allocation for new notes
//! - The authoritative `NoteStore` with its selection pointer and pending deletions

mod ids;
mod store;

pub use ids::next_id;
pub use store::{NoteStore, PendingDeletion, SelectionHint, StoreSnapshot};

use serde::{Deserialize, Serialize};

/// Unique identifier for a note, stable for the note's lifetime
pub type NoteId = u64;

/// Title given to freshly created notes
pub const DEFAULT_TITLE: &str = "New Note";

/// A titled piece of text content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    /// Plain text or serialized rich-text markup, depending on the editor
    pub content: String,
}

impl Note {
    /// Create a note with the default title and empty content
    pub fn new(id: NoteId) -> Self {
        Self {
            id,
            title: DEFAULT_TITLE.to_string(),
            content: String::new(),
        }
    }

    #[cfg(test)]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[cfg(test)]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    /// Merge a patch into this note, returning whether anything changed
    pub fn apply(&mut self, patch: NotePatch) -> bool {
        let mut changed = false;
        if let Some(title) = patch.title {
            changed |= self.title != title;
            self.title = title;
        }
        if let Some(content) = patch.content {
            changed |= self.content != content;
            self.content = content;
        }
        changed
    }
}

/// Partial update for a note; absent fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NotePatch {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl NotePatch {
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            content: None,
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self {
            title: None,
            content: Some(content.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.content.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_note_defaults() {
        let note = Note::new(7);
        assert_eq!(note.id, 7);
        assert_eq!(note.title, "New Note");
        assert!(note.content.is_empty());
    }

    #[test]
    fn test_apply_patch_only_touches_present_fields() {
        let mut note = Note::new(1).with_content("body");

        assert!(note.apply(NotePatch::title("Groceries")));
        assert_eq!(note.title, "Groceries");
        assert_eq!(note.content, "body");

        assert!(!note.apply(NotePatch::content("body")));
        assert!(!note.apply(NotePatch::default()));
    }

    #[test]
    fn test_note_json_shape() {
        let note = Note::new(3).with_title("Todo").with_content("<p>milk</p>");
        let json = serde_json::to_value(&note).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"id": 3, "title": "Todo", "content": "<p>milk</p>"})
        );
    }

    #[test]
    fn test_patch_deserializes_partial_body() {
        let patch: NotePatch = serde_json::from_str(r#"{"content":"hello"}"#).unwrap();
        assert_eq!(patch, NotePatch::content("hello"));
        assert!(!patch.is_empty());
    }
}
