//! Identifier allocation for new notes.

use super::{Note, NoteId};

/// Next free id for a collection kept sorted ascending by id.
///
/// Derived from the highest existing id rather than the collection length, so
/// a collection with gaps left by deletions (`{1, 3}`) yields `4`, never `3`.
/// `None` once the highest id is `NoteId::MAX`.
pub fn next_id(notes: &[Note]) -> Option<NoteId> {
    debug_assert!(notes.windows(2).all(|w| w[0].id < w[1].id));
    match notes.last() {
        Some(last) => last.id.checked_add(1),
        None => Some(1),
    }
}
