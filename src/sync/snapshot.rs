//! Encoding of the persisted state.
//!
//! The current layout is one JSON document holding both the notes and the
//! selection, so they can never be written separately:
//!
//! ```json
//! {"notes":[{"id":1,"title":"New Note","content":""}],"selectedId":1}
//! ```
//!
//! Older builds stored a bare array of notes under the same key and kept the
//! last opened note under a second key. Both are still accepted on load.

use serde::{Deserialize, Deserializer};

use super::{SyncError, SyncResult};
use crate::notes::{Note, NoteId, SelectionHint, StoreSnapshot};

/// Decoded persisted state, before validation against the store invariants
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredState {
    /// Notes in stored order
    pub notes: Vec<Note>,
    pub selection: SelectionHint,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Envelope(Envelope),
    Notes(Vec<Note>),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    notes: Vec<Note>,
    // Missing field and explicit null mean different things
    #[serde(default, deserialize_with = "present")]
    selected_id: Option<Option<NoteId>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LegacySelection {
    Id(NoteId),
    Note { id: NoteId },
}

fn present<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Serialize the full state as one value
pub fn encode_state(snapshot: &StoreSnapshot) -> SyncResult<Vec<u8>> {
    serde_json::to_vec(snapshot).map_err(SyncError::Encode)
}

/// Decode the value stored under `key`
pub fn decode_state(key: &str, bytes: &[u8]) -> SyncResult<StoredState> {
    let value: StoredValue = serde_json::from_slice(bytes).map_err(|source| SyncError::Decode {
        key: key.to_string(),
        source,
    })?;

    Ok(match value {
        StoredValue::Envelope(envelope) => StoredState {
            notes: envelope.notes,
            selection: match envelope.selected_id {
                None => SelectionHint::Unknown,
                Some(None) => SelectionHint::Cleared,
                Some(Some(id)) => SelectionHint::Note(id),
            },
        },
        StoredValue::Notes(notes) => StoredState {
            notes,
            selection: SelectionHint::Unknown,
        },
    })
}

/// Decode a separately stored selection: either a bare id or a note object
pub fn decode_legacy_selection(key: &str, bytes: &[u8]) -> SyncResult<NoteId> {
    let selection: LegacySelection =
        serde_json::from_slice(bytes).map_err(|source| SyncError::Decode {
            key: key.to_string(),
            source,
        })?;
    Ok(match selection {
        LegacySelection::Id(id) | LegacySelection::Note { id } => id,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_writes_both_fields() {
        let snapshot = StoreSnapshot {
            notes: vec![Note::new(1).with_content("hi")],
            selected_id: None,
        };
        let json: serde_json::Value = serde_json::from_slice(&encode_state(&snapshot).unwrap()).unwrap();

        assert_eq!(
            json,
            serde_json::json!({
                "notes": [{"id": 1, "title": "New Note", "content": "hi"}],
                "selectedId": null
            })
        );
    }

    #[test]
    fn test_round_trip_preserves_selection() {
        let snapshot = StoreSnapshot {
            notes: vec![Note::new(1), Note::new(4).with_title("Later")],
            selected_id: Some(4),
        };
        let state = decode_state("k", &encode_state(&snapshot).unwrap()).unwrap();

        assert_eq!(state.notes, snapshot.notes);
        assert_eq!(state.selection, SelectionHint::Note(4));
    }

    #[test]
    fn test_null_and_missing_selection_differ() {
        let cleared = decode_state("k", br#"{"notes":[],"selectedId":null}"#).unwrap();
        assert_eq!(cleared.selection, SelectionHint::Cleared);

        let missing = decode_state("k", br#"{"notes":[]}"#).unwrap();
        assert_eq!(missing.selection, SelectionHint::Unknown);
    }

    #[test]
    fn test_bare_array_layout() {
        let state = decode_state(
            "k",
            br#"[{"id":2,"title":"b","content":""},{"id":1,"title":"a","content":""}]"#,
        )
        .unwrap();

        assert_eq!(state.notes.iter().map(|n| n.id).collect::<Vec<_>>(), vec![2, 1]);
        assert_eq!(state.selection, SelectionHint::Unknown);
    }

    #[test]
    fn test_garbage_is_a_decode_error() {
        let err = decode_state("notepad-data", b"{not json").unwrap_err();
        assert!(matches!(err, SyncError::Decode { ref key, .. } if key == "notepad-data"));
    }

    #[test]
    fn test_legacy_selection_forms() {
        assert_eq!(decode_legacy_selection("k", b"3").unwrap(), 3);
        assert_eq!(
            decode_legacy_selection("k", br#"{"id":5,"title":"x","content":""}"#).unwrap(),
            5
        );
        assert!(decode_legacy_selection("k", br#""five""#).is_err());
    }
}
