//! Multi-range selections.
//!
//! A selection always holds at least one range; ranges are kept sorted by
//! `from` and non-overlapping (overlaps merge on construction and after
//! mapping). Each range carries the caret association side, an optional goal
//! column for vertical motion, and an optional cached bidi level.

use thiserror::Error;

use crate::change::ChangeDesc;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SelectionError {
    #[error("a selection needs at least one range")]
    Empty,
}

/// One selection range between `anchor` (the fixed side) and `head` (the side
/// that moves).
#[derive(Debug, Clone, Copy)]
pub struct SelectionRange {
    pub anchor: usize,
    pub head: usize,
    /// Side the caret prefers when boundaries touch: -1, 0 or 1.
    pub assoc: i8,
    /// Column vertical motion aims for, surviving moves over short lines.
    pub goal_column: Option<u32>,
    /// Bidi level recorded by visual motion for stable subsequent movement.
    pub bidi_level: Option<u8>,
}

impl SelectionRange {
    /// A cursor (empty range) at `pos`.
    pub fn cursor(pos: usize, assoc: i8) -> SelectionRange {
        SelectionRange {
            anchor: pos,
            head: pos,
            assoc,
            goal_column: None,
            bidi_level: None,
        }
    }

    /// A range from `anchor` to `head` (either order).
    pub fn range(anchor: usize, head: usize) -> SelectionRange {
        SelectionRange {
            anchor,
            head,
            assoc: if head < anchor {
                1
            } else if head > anchor {
                -1
            } else {
                0
            },
            goal_column: None,
            bidi_level: None,
        }
    }

    pub fn with_goal_column(mut self, goal: u32) -> SelectionRange {
        self.goal_column = Some(goal);
        self
    }

    pub fn with_bidi_level(mut self, level: u8) -> SelectionRange {
        self.bidi_level = Some(level);
        self
    }

    /// Lower bound of the range.
    pub fn from(&self) -> usize {
        self.anchor.min(self.head)
    }

    /// Upper bound of the range.
    pub fn to(&self) -> usize {
        self.anchor.max(self.head)
    }

    pub fn is_empty(&self) -> bool {
        self.anchor == self.head
    }

    pub fn is_inverted(&self) -> bool {
        self.head < self.anchor
    }

    /// Map the range through an edit. Cursors follow their association side;
    /// non-empty ranges shrink inward (content inserted exactly at an edge
    /// stays outside the range).
    pub fn map(&self, changes: &ChangeDesc) -> SelectionRange {
        if self.is_empty() {
            let pos = changes.map_pos(self.head, self.assoc as i32);
            SelectionRange {
                anchor: pos,
                head: pos,
                ..*self
            }
        } else {
            let from = changes.map_pos(self.from(), 1);
            let to = changes.map_pos(self.to(), -1);
            let (anchor, head) = if self.is_inverted() {
                (to, from)
            } else {
                (from, to)
            };
            SelectionRange { anchor, head, ..*self }
        }
    }

    /// Equality by extent and association; goal column and bidi level are
    /// transient motion state and do not participate.
    pub fn eq_range(&self, other: &SelectionRange) -> bool {
        self.anchor == other.anchor && self.head == other.head && self.assoc == other.assoc
    }
}

impl PartialEq for SelectionRange {
    fn eq(&self, other: &Self) -> bool {
        self.eq_range(other)
    }
}

impl Eq for SelectionRange {}

/// An ordered set of ranges with one of them marked as main.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    ranges: Vec<SelectionRange>,
    main_index: usize,
}

impl Selection {
    /// Build a selection, sorting ranges and merging overlaps. `main_index`
    /// follows its range through the reordering and is clamped.
    pub fn create(
        ranges: Vec<SelectionRange>,
        main_index: usize,
    ) -> Result<Selection, SelectionError> {
        if ranges.is_empty() {
            return Err(SelectionError::Empty);
        }
        let main_index = main_index.min(ranges.len() - 1);
        Ok(Self::normalized(ranges, main_index))
    }

    /// A single-cursor selection.
    pub fn cursor(pos: usize, assoc: i8) -> Selection {
        Selection {
            ranges: vec![SelectionRange::cursor(pos, assoc)],
            main_index: 0,
        }
    }

    /// A single-range selection.
    pub fn single(anchor: usize, head: usize) -> Selection {
        Selection {
            ranges: vec![SelectionRange::range(anchor, head)],
            main_index: 0,
        }
    }

    fn normalized(mut ranges: Vec<SelectionRange>, main_index: usize) -> Selection {
        let mut indexed: Vec<(usize, SelectionRange)> = ranges.drain(..).enumerate().collect();
        indexed.sort_by_key(|(_, r)| r.from());
        let mut main_index = indexed
            .iter()
            .position(|(orig, _)| *orig == main_index)
            .unwrap_or(0);
        let mut out: Vec<SelectionRange> = Vec::with_capacity(indexed.len());
        for (i, (_, range)) in indexed.into_iter().enumerate() {
            let Some(prev) = out.last() else {
                out.push(range);
                continue;
            };
            // An empty cursor sitting on a range edge folds into that range.
            let overlaps = if range.is_empty() {
                range.from() <= prev.to()
            } else {
                range.from() < prev.to()
            };
            if overlaps {
                let from = prev.from();
                let to = range.to().max(prev.to());
                let merged = if range.is_inverted() {
                    SelectionRange::range(to, from)
                } else {
                    SelectionRange::range(from, to)
                };
                if i <= main_index && main_index > 0 {
                    main_index -= 1;
                }
                *out.last_mut().expect("just checked") = merged;
            } else {
                out.push(range);
            }
        }
        let main_index = main_index.min(out.len() - 1);
        Selection {
            ranges: out,
            main_index,
        }
    }

    pub fn ranges(&self) -> &[SelectionRange] {
        &self.ranges
    }

    pub fn main_index(&self) -> usize {
        self.main_index
    }

    pub fn main(&self) -> &SelectionRange {
        &self.ranges[self.main_index]
    }

    /// A copy holding only the main range.
    pub fn as_single(&self) -> Selection {
        Selection {
            ranges: vec![*self.main()],
            main_index: 0,
        }
    }

    /// Add a range; when `as_main` is set it becomes the main range.
    pub fn add_range(&self, range: SelectionRange, as_main: bool) -> Selection {
        let mut ranges = self.ranges.clone();
        let main_src = if as_main {
            ranges.len()
        } else {
            self.main_index
        };
        ranges.push(range);
        Self::normalized(ranges, main_src)
    }

    /// Replace the range at `index` (defaulting to the main range).
    pub fn replace_range(&self, range: SelectionRange, index: Option<usize>) -> Selection {
        let index = index.unwrap_or(self.main_index).min(self.ranges.len() - 1);
        let mut ranges = self.ranges.clone();
        ranges[index] = range;
        Self::normalized(ranges, self.main_index)
    }

    /// Map every range through an edit, re-normalizing afterwards.
    pub fn map(&self, changes: &ChangeDesc) -> Selection {
        if changes.is_empty() {
            return self.clone();
        }
        let ranges = self.ranges.iter().map(|r| r.map(changes)).collect();
        Self::normalized(ranges, self.main_index)
    }

    /// Range-by-range equality including association.
    pub fn eq_sel(&self, other: &Selection) -> bool {
        self.main_index == other.main_index
            && self.ranges.len() == other.ranges.len()
            && self
                .ranges
                .iter()
                .zip(&other.ranges)
                .all(|(a, b)| a.eq_range(b))
    }

    /// Largest position mentioned by any range.
    pub fn max_pos(&self) -> usize {
        self.ranges.iter().map(|r| r.to()).max().unwrap_or(0)
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "ranges": self
                .ranges
                .iter()
                .map(|r| serde_json::json!({"anchor": r.anchor, "head": r.head}))
                .collect::<Vec<_>>(),
            "main": self.main_index,
        })
    }

    pub fn from_json(value: &serde_json::Value) -> Result<Selection, SelectionError> {
        let ranges = value
            .get("ranges")
            .and_then(|v| v.as_array())
            .ok_or(SelectionError::Empty)?
            .iter()
            .filter_map(|r| {
                let anchor = r.get("anchor")?.as_u64()? as usize;
                let head = r.get("head")?.as_u64()? as usize;
                Some(SelectionRange::range(anchor, head))
            })
            .collect::<Vec<_>>();
        let main = value.get("main").and_then(|v| v.as_u64()).unwrap_or(0) as usize;
        Selection::create(ranges, main)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::change::{Change, ChangeSet};

    fn changes(list: Vec<Change>, len: usize) -> ChangeSet {
        ChangeSet::of(list, len).unwrap()
    }

    #[test]
    fn create_sorts_and_tracks_main() {
        let sel = Selection::create(
            vec![SelectionRange::range(8, 10), SelectionRange::range(0, 2)],
            0,
        )
        .unwrap();
        assert_eq!(sel.ranges()[0].from(), 0);
        assert_eq!(sel.ranges()[1].from(), 8);
        assert_eq!(sel.main_index(), 1);
        assert_eq!(sel.main().from(), 8);
    }

    #[test]
    fn create_rejects_empty() {
        assert_eq!(Selection::create(vec![], 0), Err(SelectionError::Empty));
    }

    #[test]
    fn overlapping_ranges_merge() {
        let sel = Selection::create(
            vec![SelectionRange::range(0, 5), SelectionRange::range(3, 9)],
            1,
        )
        .unwrap();
        assert_eq!(sel.ranges().len(), 1);
        assert_eq!((sel.main().from(), sel.main().to()), (0, 9));
    }

    #[test]
    fn cursor_on_range_edge_merges() {
        let sel = Selection::create(
            vec![SelectionRange::range(0, 4), SelectionRange::cursor(4, 0)],
            0,
        )
        .unwrap();
        assert_eq!(sel.ranges().len(), 1);
        // A cursor strictly after the range survives.
        let sel = Selection::create(
            vec![SelectionRange::range(0, 4), SelectionRange::cursor(5, 0)],
            0,
        )
        .unwrap();
        assert_eq!(sel.ranges().len(), 2);
    }

    #[test]
    fn map_through_insertion() {
        // Scenario: [2..5] range and a cursor at 10, insert "XY" at 3.
        let sel = Selection::create(
            vec![SelectionRange::range(2, 5), SelectionRange::cursor(10, 0)],
            0,
        )
        .unwrap();
        let cs = changes(vec![Change::insert(3, "XY")], 12);
        let mapped = sel.map(cs.desc());
        assert_eq!((mapped.ranges()[0].from(), mapped.ranges()[0].to()), (2, 7));
        assert_eq!(mapped.ranges()[1].head, 12);
        assert_eq!(mapped.main_index(), 0);
    }

    #[test]
    fn edge_insertions_stay_outside_ranges() {
        let sel = Selection::single(2, 5);
        let at_start = changes(vec![Change::insert(2, "ab")], 8);
        let m = sel.map(at_start.desc());
        assert_eq!((m.main().from(), m.main().to()), (4, 7));
        let at_end = changes(vec![Change::insert(5, "ab")], 8);
        let m = sel.map(at_end.desc());
        assert_eq!((m.main().from(), m.main().to()), (2, 5));
    }

    #[test]
    fn cursors_follow_assoc_through_insertions() {
        let before = Selection::cursor(3, -1);
        let after = Selection::cursor(3, 1);
        let cs = changes(vec![Change::insert(3, "ab")], 6);
        assert_eq!(before.map(cs.desc()).main().head, 3);
        assert_eq!(after.map(cs.desc()).main().head, 5);
    }

    #[test]
    fn inverted_range_keeps_direction_through_map() {
        let sel = Selection::single(5, 2);
        assert!(sel.main().is_inverted());
        let cs = changes(vec![Change::insert(0, "xx")], 8);
        let mapped = sel.map(cs.desc());
        assert!(mapped.main().is_inverted());
        assert_eq!((mapped.main().anchor, mapped.main().head), (7, 4));
    }

    #[test]
    fn deletion_collapses_ranges_onto_the_gap() {
        let sel = Selection::create(
            vec![SelectionRange::range(1, 3), SelectionRange::range(5, 7)],
            1,
        )
        .unwrap();
        // Deleting [2..6) truncates both ranges against position 2; they end
        // up touching but not overlapping, so both survive.
        let cs = changes(vec![Change::delete(2, 6)], 8);
        let mapped = sel.map(cs.desc());
        assert_eq!(mapped.ranges().len(), 2);
        assert_eq!((mapped.ranges()[0].from(), mapped.ranges()[0].to()), (1, 2));
        assert_eq!((mapped.ranges()[1].from(), mapped.ranges()[1].to()), (2, 3));
        assert_eq!(mapped.main_index(), 1);
    }

    #[test]
    fn eq_compares_association() {
        let a = Selection::cursor(3, -1);
        let b = Selection::cursor(3, 1);
        assert!(!a.eq_sel(&b));
        let c = Selection::cursor(3, -1);
        assert!(a.eq_sel(&c));
        // Goal column does not participate.
        let d = Selection::create(
            vec![SelectionRange::cursor(3, -1).with_goal_column(7)],
            0,
        )
        .unwrap();
        assert!(a.eq_sel(&d));
    }

    #[test]
    fn json_round_trip() {
        let sel = Selection::create(
            vec![SelectionRange::range(1, 4), SelectionRange::cursor(9, 0)],
            1,
        )
        .unwrap();
        let back = Selection::from_json(&sel.to_json()).unwrap();
        assert_eq!(sel.ranges().len(), back.ranges().len());
        assert_eq!(sel.main_index(), back.main_index());
        assert_eq!(sel.main().from(), back.main().from());
    }
}
