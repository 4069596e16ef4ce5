//! Ordering and mapping laws for range sets over generated inputs.

use core_ranges::{Range, RangeSet, RangeValue};
use core_state::{Change, ChangeSet, MapMode};
use core_text::Text;
use proptest::prelude::*;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Tag(u8);

impl RangeValue for Tag {
    fn start_side(&self) -> i32 {
        (self.0 % 5) as i32 - 2
    }

    fn end_side(&self) -> i32 {
        (self.0 % 3) as i32 - 1
    }

    fn point(&self) -> bool {
        self.0 % 4 == 0
    }

    fn map_mode(&self) -> MapMode {
        MapMode::TrackDel
    }
}

const DOC_LEN: usize = 200;

fn arb_ranges() -> impl Strategy<Value = Vec<Range<Tag>>> {
    prop::collection::vec((0usize..DOC_LEN, 0usize..40, any::<u8>()), 0..60).prop_map(|raw| {
        raw.into_iter()
            .map(|(from, width, tag)| {
                let to = (from + width as usize % 12).min(DOC_LEN);
                Range::new(from, to, Tag(tag))
            })
            .collect()
    })
}

fn arb_changes() -> impl Strategy<Value = ChangeSet> {
    prop::collection::vec((0usize..DOC_LEN, 0usize..10, "[a-z]{0,6}"), 0..8).prop_map(|raw| {
        let mut cuts: Vec<(usize, usize, String)> = raw
            .into_iter()
            .map(|(a, w, s)| (a, (a + w).min(DOC_LEN), s))
            .collect();
        cuts.sort_by_key(|c| (c.0, c.1));
        let mut out = Vec::new();
        let mut pos = 0;
        for (a, b, s) in cuts {
            if a < pos || (a == b && s.is_empty()) {
                continue;
            }
            out.push(Change::replace(a, b, Text::from(s.as_str())));
            pos = b;
        }
        ChangeSet::of(out, DOC_LEN).expect("valid changes")
    })
}

fn items(set: &RangeSet<Tag>) -> Vec<(usize, usize, Tag)> {
    set.iter().map(|(f, t, v)| (f, t, v.clone())).collect()
}

proptest! {
    #[test]
    fn iteration_is_ordered(ranges in arb_ranges()) {
        let set = RangeSet::of(ranges, false).unwrap();
        let got = items(&set);
        for pair in got.windows(2) {
            let a = (pair[0].0, pair[0].2.start_side());
            let b = (pair[1].0, pair[1].2.start_side());
            prop_assert!(a <= b, "iteration out of order: {a:?} then {b:?}");
        }
    }

    #[test]
    fn mapping_through_identity_changes_nothing(ranges in arb_ranges()) {
        let set = RangeSet::of(ranges, false).unwrap();
        let mapped = set.map(ChangeSet::empty(DOC_LEN).desc());
        prop_assert_eq!(items(&set), items(&mapped));
    }

    #[test]
    fn mapping_keeps_order_and_bounds(ranges in arb_ranges(), cs in arb_changes()) {
        let set = RangeSet::of(ranges, false).unwrap();
        let mapped = set.map(cs.desc());
        let got = items(&mapped);
        for (from, to, _) in &got {
            prop_assert!(from <= to);
            prop_assert!(*to <= cs.new_len());
        }
        for pair in got.windows(2) {
            let a = (pair[0].0, pair[0].2.start_side());
            let b = (pair[1].0, pair[1].2.start_side());
            prop_assert!(a <= b, "mapped iteration out of order");
        }
        prop_assert!(mapped.size() <= set.size());
    }

    #[test]
    fn join_preserves_every_range(ranges in arb_ranges(), split in 0usize..60) {
        let mut left = Vec::new();
        let mut right = Vec::new();
        for (i, r) in ranges.into_iter().enumerate() {
            if i < split { left.push(r) } else { right.push(r) }
        }
        let total = left.len() + right.len();
        let a = RangeSet::of(left, false).unwrap();
        let b = RangeSet::of(right, false).unwrap();
        let joined = RangeSet::join(vec![a, b]);
        prop_assert_eq!(joined.size(), total);
        let got = items(&joined);
        for pair in got.windows(2) {
            prop_assert!((pair[0].0, pair[0].2.start_side()) <= (pair[1].0, pair[1].2.start_side()));
        }
    }
}
