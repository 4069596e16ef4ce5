//! Observer-facing summaries of state updates.
//!
//! A [`ViewUpdate`] bundles the transactions applied since the observer last
//! looked, their composed change set, the changed ranges in both coordinate
//! spaces, and coarse flags for what kind of invalidation is needed.

use bitflags::bitflags;

use core_state::{ChangeDesc, ChangeSet, EditorState, StateError, Transaction};

/// A region touched by an edit, in old (`a`) and new (`b`) coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangedRange {
    pub from_a: usize,
    pub to_a: usize,
    pub from_b: usize,
    pub to_b: usize,
}

impl ChangedRange {
    /// The changed ranges of an edit description.
    pub fn from_changes(changes: &ChangeDesc) -> Vec<ChangedRange> {
        changes
            .iter_changed_ranges()
            .map(|(from_a, to_a, from_b, to_b)| ChangedRange {
                from_a,
                to_a,
                from_b,
                to_b,
            })
            .collect()
    }

    pub fn len_diff(&self) -> isize {
        (self.to_b - self.from_b) as isize - (self.to_a - self.from_a) as isize
    }

    /// Insert `self` into a sorted set, merging with every range it touches.
    pub fn add_to_set(self, set: &mut Vec<ChangedRange>) {
        let mut merged = self;
        let mut i = 0;
        while i < set.len() {
            let other = set[i];
            if other.to_a < merged.from_a {
                i += 1;
                continue;
            }
            if other.from_a > merged.to_a {
                break;
            }
            merged = ChangedRange {
                from_a: merged.from_a.min(other.from_a),
                to_a: merged.to_a.max(other.to_a),
                from_b: merged.from_b.min(other.from_b),
                to_b: merged.to_b.max(other.to_b),
            };
            set.remove(i);
        }
        set.insert(i, merged);
    }
}

bitflags! {
    /// What an update invalidated.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct UpdateFlags: u8 {
        const DOC_CHANGED = 1 << 0;
        const SELECTION_SET = 1 << 1;
        const HEIGHT_CHANGED = 1 << 2;
        const GEOMETRY_CHANGED = 1 << 3;
        const FOCUS_CHANGED = 1 << 4;
    }
}

/// Summary of one or more state updates, handed to observers.
pub struct ViewUpdate {
    start_state: EditorState,
    state: EditorState,
    transactions: Vec<Transaction>,
    changes: ChangeSet,
    changed_ranges: Vec<ChangedRange>,
    flags: UpdateFlags,
}

impl ViewUpdate {
    /// Summarize `transactions` leading from `start_state` to `state`.
    pub fn new(
        start_state: EditorState,
        state: EditorState,
        transactions: Vec<Transaction>,
    ) -> Result<ViewUpdate, StateError> {
        let mut changes = ChangeSet::empty(start_state.doc().len());
        let mut flags = UpdateFlags::empty();
        for tr in &transactions {
            changes = changes.compose(tr.changes())?;
            if tr.doc_changed() {
                flags |= UpdateFlags::DOC_CHANGED | UpdateFlags::HEIGHT_CHANGED;
            }
            if tr.explicit_selection().is_some() {
                flags |= UpdateFlags::SELECTION_SET;
            }
        }
        let mut changed_ranges = Vec::new();
        for range in ChangedRange::from_changes(changes.desc()) {
            range.add_to_set(&mut changed_ranges);
        }
        Ok(ViewUpdate {
            start_state,
            state,
            transactions,
            changes,
            changed_ranges,
            flags,
        })
    }

    pub fn start_state(&self) -> &EditorState {
        &self.start_state
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn changes(&self) -> &ChangeSet {
        &self.changes
    }

    pub fn changed_ranges(&self) -> &[ChangedRange] {
        &self.changed_ranges
    }

    pub fn flags(&self) -> UpdateFlags {
        self.flags
    }

    pub fn doc_changed(&self) -> bool {
        self.flags.contains(UpdateFlags::DOC_CHANGED)
    }

    pub fn selection_set(&self) -> bool {
        self.flags.contains(UpdateFlags::SELECTION_SET)
    }

    pub fn height_changed(&self) -> bool {
        self.flags.contains(UpdateFlags::HEIGHT_CHANGED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_state::{Change, Selection, TransactionSpec};

    #[test]
    fn changed_ranges_merge_touching_regions() {
        let mut set = Vec::new();
        ChangedRange {
            from_a: 0,
            to_a: 2,
            from_b: 0,
            to_b: 3,
        }
        .add_to_set(&mut set);
        ChangedRange {
            from_a: 10,
            to_a: 12,
            from_b: 11,
            to_b: 13,
        }
        .add_to_set(&mut set);
        ChangedRange {
            from_a: 2,
            to_a: 10,
            from_b: 3,
            to_b: 11,
        }
        .add_to_set(&mut set);
        assert_eq!(
            set,
            vec![ChangedRange {
                from_a: 0,
                to_a: 12,
                from_b: 0,
                to_b: 13,
            }]
        );
    }

    #[test]
    fn view_update_composes_transactions() {
        let state = EditorState::builder().doc("hello").build().unwrap();
        let (s1, tr1) = state
            .update(vec![TransactionSpec::change(Change::insert(5, " world"))])
            .unwrap();
        let (s2, tr2) = s1
            .update(vec![TransactionSpec {
                changes: Some(Change::insert(0, ">").into()),
                selection: Some(Selection::cursor(1, 0)),
                ..Default::default()
            }])
            .unwrap();
        let update = ViewUpdate::new(state, s2, vec![tr1, tr2]).unwrap();
        assert!(update.doc_changed());
        assert!(update.selection_set());
        assert!(update.height_changed());
        assert_eq!(update.state().doc().to_string(), ">hello world");
        assert_eq!(update.changes().new_len(), 12);
        assert_eq!(update.changed_ranges().len(), 2);
    }

    #[test]
    fn empty_update_sets_no_flags() {
        let state = EditorState::builder().doc("x").build().unwrap();
        let (s1, tr) = state.update(vec![TransactionSpec::default()]).unwrap();
        let update = ViewUpdate::new(state, s1, vec![tr]).unwrap();
        assert!(!update.doc_changed());
        assert!(!update.selection_set());
        assert!(update.changed_ranges().is_empty());
    }
}
