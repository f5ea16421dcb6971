//! Authoritative in-memory note collection.
//!
//! The store keeps two invariants at all times:
//! - ids are pairwise unique
//! - notes are sorted ascending by id
//!
//! and a selection pointer that is either `None` or the id of a note that is
//! present in the collection.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use super::{next_id, Note, NoteId, NotePatch};

/// What persisted state says about the selection before it is validated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelectionHint {
    /// No selection information was stored
    #[default]
    Unknown,
    /// The session explicitly had nothing open
    Cleared,
    /// A specific note was open
    Note(NoteId),
}

/// Anomalies found while hydrating a store from persisted data
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HydrationReport {
    /// Ids that appeared more than once; earlier copies were dropped
    pub duplicate_ids: Vec<NoteId>,
    /// A stored selection that referenced a missing note
    pub dangling_selection: Option<NoteId>,
}

impl HydrationReport {
    pub fn is_clean(&self) -> bool {
        self.duplicate_ids.is_empty() && self.dangling_selection.is_none()
    }
}

/// Owned, immutable copy of the store state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreSnapshot {
    pub notes: Vec<Note>,
    pub selected_id: Option<NoteId>,
}

/// The note collection plus the active note pointer
#[derive(Debug, Clone, Default)]
pub struct NoteStore {
    notes: Vec<Note>,
    selected: Option<NoteId>,
}

impl NoteStore {
    /// Build a store from notes in stored order.
    ///
    /// Duplicate ids keep the later entry. A valid hinted selection is restored;
    /// otherwise, unless the hint says nothing was open, the lowest id is selected.
    pub fn hydrate(notes: Vec<Note>, hint: SelectionHint) -> (Self, HydrationReport) {
        let mut report = HydrationReport::default();
        let mut by_id = BTreeMap::new();
        for note in notes {
            let id = note.id;
            if by_id.insert(id, note).is_some() {
                report.duplicate_ids.push(id);
            }
        }

        let mut store = Self {
            notes: by_id.into_values().collect(),
            selected: None,
        };

        let restore_default = match hint {
            SelectionHint::Cleared => false,
            SelectionHint::Unknown => true,
            SelectionHint::Note(id) if store.contains(id) => {
                store.selected = Some(id);
                false
            }
            SelectionHint::Note(id) => {
                report.dangling_selection = Some(id);
                true
            }
        };
        if restore_default {
            store.selected = store.notes.first().map(|n| n.id);
        }

        (store, report)
    }

    #[cfg(test)]
    pub fn notes(&self) -> &[Note] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    pub fn contains(&self, id: NoteId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: NoteId) -> Option<&Note> {
        self.position(id).map(|idx| &self.notes[idx])
    }

    pub fn selected_id(&self) -> Option<NoteId> {
        self.selected
    }

    /// The selected note, resolved against the current collection
    #[cfg(test)]
    pub fn selected(&self) -> Option<&Note> {
        self.selected.and_then(|id| self.get(id))
    }

    /// Append a new default note and make it the selection.
    ///
    /// Returns `None` without touching the store when no id above the current
    /// highest is left.
    pub fn create(&mut self) -> Option<&Note> {
        let id = next_id(&self.notes)?;
        self.notes.push(Note::new(id));
        self.selected = Some(id);
        self.notes.last()
    }

    /// Merge a patch into the note with the given id; `None` if it is absent
    pub fn update(&mut self, id: NoteId, patch: NotePatch) -> Option<&Note> {
        let idx = self.position(id)?;
        let note = &mut self.notes[idx];
        note.apply(patch);
        Some(note)
    }

    /// Replace only the title of a note
    pub fn rename(&mut self, id: NoteId, title: impl Into<String>) -> Option<&Note> {
        self.update(id, NotePatch::title(title))
    }

    /// Remove every note whose id is in `ids`, returning the ids actually removed
    pub fn remove(&mut self, ids: &BTreeSet<NoteId>) -> Vec<NoteId> {
        let mut removed = Vec::new();
        self.notes.retain(|note| {
            let drop = ids.contains(&note.id);
            if drop {
                removed.push(note.id);
            }
            !drop
        });

        if self.selected.is_some_and(|id| ids.contains(&id)) {
            self.selected = None;
        }
        removed
    }

    /// Point the selection at `id` if it exists; returns whether it moved there
    pub fn select(&mut self, id: NoteId) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.selected = Some(id);
        true
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            notes: self.notes.clone(),
            selected_id: self.selected,
        }
    }

    fn position(&self, id: NoteId) -> Option<usize> {
        self.notes.binary_search_by_key(&id, |n| n.id).ok()
    }
}

/// Ids marked for removal but not yet applied to the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingDeletion {
    ids: BTreeSet<NoteId>,
}

impl PendingDeletion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an id to the batch; false if it was already marked
    pub fn mark(&mut self, id: NoteId) -> bool {
        self.ids.insert(id)
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = NoteId> + '_ {
        self.ids.iter().copied()
    }

    /// Forget ids that were removed by other means
    pub fn discard(&mut self, ids: &BTreeSet<NoteId>) {
        self.ids.retain(|id| !ids.contains(id));
    }

    /// Drain the batch, leaving it empty
    pub fn take(&mut self) -> BTreeSet<NoteId> {
        std::mem::take(&mut self.ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(store: &NoteStore) -> Vec<NoteId> {
        store.notes().iter().map(|n| n.id).collect()
    }

    fn store_with(count: usize) -> NoteStore {
        let mut store = NoteStore::default();
        for _ in 0..count {
            store.create();
        }
        store
    }

    #[test]
    fn test_create_allocates_and_selects() {
        let mut store = NoteStore::default();
        assert_eq!(store.create().unwrap().id, 1);
        assert_eq!(store.create().unwrap().id, 2);

        assert_eq!(ids(&store), vec![1, 2]);
        assert_eq!(store.selected_id(), Some(2));
        assert_eq!(store.selected().unwrap().title, "New Note");
    }

    #[test]
    fn test_create_after_gap_uses_highest_id() {
        let mut store = store_with(3);
        store.remove(&BTreeSet::from([2]));
        assert_eq!(ids(&store), vec![1, 3]);

        assert_eq!(store.create().unwrap().id, 4);
    }

    #[test]
    fn test_create_refuses_when_ids_exhausted() {
        let notes = vec![Note::new(3), Note::new(NoteId::MAX).with_title("last")];
        let (mut store, _) = NoteStore::hydrate(notes, SelectionHint::Note(3));

        assert!(store.create().is_none());
        assert_eq!(ids(&store), vec![3, NoteId::MAX]);
        assert_eq!(store.selected_id(), Some(3));
    }

    #[test]
    fn test_update_missing_note_is_noop() {
        let mut store = store_with(1);
        let before = store.snapshot();

        assert!(store.update(42, NotePatch::title("ghost")).is_none());
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_selected_note_reflects_updates() {
        let mut store = store_with(2);
        store.select(1);

        store.update(1, NotePatch::content("draft"));
        store.rename(1, "Ideas");

        let selected = store.selected().unwrap();
        assert_eq!(selected.title, "Ideas");
        assert_eq!(selected.content, "draft");
    }

    #[test]
    fn test_remove_clears_selection_only_when_removed() {
        let mut store = store_with(5);
        store.select(3);

        assert_eq!(store.remove(&BTreeSet::from([1, 4])), vec![1, 4]);
        assert_eq!(ids(&store), vec![2, 3, 5]);
        assert_eq!(store.selected_id(), Some(3));

        assert_eq!(store.remove(&BTreeSet::from([3, 99])), vec![3]);
        assert_eq!(store.selected_id(), None);
    }

    #[test]
    fn test_select_unknown_id_is_noop() {
        let mut store = store_with(2);
        assert!(!store.select(7));
        assert_eq!(store.selected_id(), Some(2));
        assert!(store.select(1));
        assert_eq!(store.selected_id(), Some(1));
    }

    #[test]
    fn test_mixed_operations_keep_ids_unique_and_sorted() {
        let mut store = NoteStore::default();
        for round in 0..20u64 {
            store.create();
            if round % 3 == 0 {
                let first = store.notes()[0].id;
                store.remove(&BTreeSet::from([first]));
            }
            if round % 4 == 0 {
                let last = store.notes().last().unwrap().id;
                store.update(last, NotePatch::content(format!("round {round}")));
            }
            let current = ids(&store);
            assert!(current.windows(2).all(|w| w[0] < w[1]), "{current:?}");
        }
    }

    #[test]
    fn test_hydrate_sorts_and_selects_lowest_by_default() {
        let notes = vec![Note::new(4), Note::new(2), Note::new(9)];
        let (store, report) = NoteStore::hydrate(notes, SelectionHint::Unknown);

        assert!(report.is_clean());
        assert_eq!(ids(&store), vec![2, 4, 9]);
        assert_eq!(store.selected_id(), Some(2));
    }

    #[test]
    fn test_hydrate_later_duplicate_wins() {
        let notes = vec![
            Note::new(1).with_title("old"),
            Note::new(2),
            Note::new(1).with_title("new"),
        ];
        let (store, report) = NoteStore::hydrate(notes, SelectionHint::Unknown);

        assert_eq!(report.duplicate_ids, vec![1]);
        assert_eq!(ids(&store), vec![1, 2]);
        assert_eq!(store.get(1).unwrap().title, "new");
    }

    #[test]
    fn test_hydrate_dangling_selection_falls_back() {
        let (store, report) = NoteStore::hydrate(vec![Note::new(1)], SelectionHint::Note(9));

        assert_eq!(report.dangling_selection, Some(9));
        assert_eq!(store.selected_id(), Some(1));
    }

    #[test]
    fn test_hydrate_respects_cleared_selection() {
        let (store, _) = NoteStore::hydrate(vec![Note::new(1)], SelectionHint::Cleared);
        assert_eq!(store.selected_id(), None);

        let (empty, _) = NoteStore::hydrate(Vec::new(), SelectionHint::Unknown);
        assert!(empty.is_empty());
        assert_eq!(empty.selected_id(), None);
    }

    #[test]
    fn test_pending_deletion_batch() {
        let mut pending = PendingDeletion::new();
        assert!(pending.mark(5));
        assert!(pending.mark(2));
        assert!(!pending.mark(5));
        assert_eq!(pending.ids().collect::<Vec<_>>(), vec![2, 5]);

        let batch = pending.take();
        assert_eq!(batch, BTreeSet::from([2, 5]));
        assert!(pending.is_empty());
    }
}
