//! Export of the note collection as a downloadable document.
//!
//! The document is the pretty-printed JSON array of notes, ascending by id,
//! which is the same shape older builds wrote under the storage key. It can be
//! fed back as a stored value as-is.

use crate::notes::StoreSnapshot;

/// Suggested file name for the exported document
pub const EXPORT_FILE_NAME: &str = "notepad-extension-data.json";

/// Serialize the notes of a snapshot for download
pub fn export_json(snapshot: &StoreSnapshot) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&snapshot.notes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notes::Note;
    use crate::sync::snapshot::decode_state;

    #[test]
    fn test_export_is_indented_array() {
        let snapshot = StoreSnapshot {
            notes: vec![Note::new(1).with_title("a"), Note::new(2)],
            selected_id: Some(2),
        };
        let json = export_json(&snapshot).unwrap();

        assert!(json.starts_with("[\n  {\n    \"id\": 1,"));
        assert!(!json.contains("selectedId"));
    }

    #[test]
    fn test_export_of_empty_collection() {
        assert_eq!(export_json(&StoreSnapshot::default()).unwrap(), "[]");
    }

    #[test]
    fn test_export_can_be_loaded_back() {
        let snapshot = StoreSnapshot {
            notes: vec![Note::new(3).with_content("<p>x</p>")],
            selected_id: None,
        };
        let json = export_json(&snapshot).unwrap();
        let state = decode_state("import", json.as_bytes()).unwrap();

        assert_eq!(state.notes, snapshot.notes);
    }
}
