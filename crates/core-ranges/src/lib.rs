//! Ordered sets of tagged document ranges.
//!
//! A [`RangeSet`] holds ranges sorted by `(from, start_side)` in chunks of up
//! to [`CHUNK_SIZE`] entries; chunk offsets are relative to a per-chunk base
//! position so mapping a set through an edit can reuse every chunk the edit
//! does not touch. Cheap additions layer a fresh set over the existing one
//! (`next_layer`); iteration merges the layers back into one ordered stream.
//!
//! Values implement [`RangeValue`] to declare their side bias at equal
//! positions, whether they are atomic points, and how their endpoints track
//! deletions when mapped.

use std::sync::Arc;

use core_state::{ChangeDesc, MapMode, Touched};
use thiserror::Error;

mod spans;

pub use spans::{RangeComparator, SpanIterator, compare, spans};

/// Maximum ranges per chunk.
pub(crate) const CHUNK_SIZE: usize = 250;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RangeError {
    #[error("range {from}..{to} is out of order at position {at}")]
    OutOfOrder { from: usize, to: usize, at: usize },
    #[error("invalid range: start {from} is after end {to}")]
    Invalid { from: usize, to: usize },
}

/// Behavior a value stored in a [`RangeSet`] declares for its ranges.
pub trait RangeValue: Clone + PartialEq {
    /// Bias of the start boundary; ranges at equal positions order by this.
    fn start_side(&self) -> i32 {
        0
    }

    /// Bias of the end boundary.
    fn end_side(&self) -> i32 {
        0
    }

    /// Atomic zero-or-more-width marker treated as a unit by span iteration.
    fn point(&self) -> bool {
        false
    }

    /// How a zero-width range's position tracks deletions when mapped.
    fn map_mode(&self) -> MapMode {
        MapMode::TrackDel
    }
}

/// A tagged range. `from <= to` always holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range<V> {
    pub from: usize,
    pub to: usize,
    pub value: V,
}

impl<V: RangeValue> Range<V> {
    pub fn new(from: usize, to: usize, value: V) -> Range<V> {
        Range { from, to, value }
    }
}

fn cmp_range<V: RangeValue>(a: &Range<V>, b: &Range<V>) -> std::cmp::Ordering {
    (a.from, a.value.start_side()).cmp(&(b.from, b.value.start_side()))
}

#[derive(Debug)]
pub(crate) struct Chunk<V> {
    /// Offsets relative to the chunk's base position.
    from: Vec<usize>,
    to: Vec<usize>,
    value: Vec<V>,
    /// Longest point range in the chunk, or -1 when it has none.
    max_point: isize,
}

impl<V: RangeValue> Chunk<V> {
    fn new(from: Vec<usize>, to: Vec<usize>, value: Vec<V>) -> Chunk<V> {
        let max_point = value
            .iter()
            .enumerate()
            .filter(|(_, v)| v.point())
            .map(|(i, _)| (to[i] - from[i]) as isize)
            .max()
            .unwrap_or(-1);
        Chunk {
            from,
            to,
            value,
            max_point,
        }
    }

    fn len(&self) -> usize {
        self.value.len()
    }

    /// End of the last range, relative to the chunk base.
    fn length(&self) -> usize {
        self.to.iter().copied().max().unwrap_or(0)
    }

    /// Map every range through `changes`, the chunk base being `offset`.
    /// Returns the surviving ranges in absolute coordinates.
    fn map(&self, offset: usize, changes: &ChangeDesc) -> Vec<Range<V>> {
        let mut out = Vec::with_capacity(self.len());
        for i in 0..self.len() {
            let value = &self.value[i];
            let cur_from = self.from[i] + offset;
            let cur_to = self.to[i] + offset;
            if cur_from == cur_to {
                // Zero-width ranges follow their declared tracking mode.
                let Some(from) =
                    changes.map_pos_tracked(cur_from, value.start_side(), value.map_mode())
                else {
                    continue;
                };
                let mut to = from;
                if value.start_side() != value.end_side() {
                    to = changes.map_pos(cur_from, value.end_side());
                    if to < from {
                        continue;
                    }
                }
                out.push(Range::new(from, to, value.clone()));
            } else {
                let from = changes.map_pos(cur_from, value.start_side());
                let to = changes.map_pos(cur_to, value.end_side());
                // A span whose content was entirely deleted collapses; it is
                // dropped unless its sides keep an empty range meaningful.
                if from > to || (from == to && value.start_side() > 0 && value.end_side() <= 0) {
                    continue;
                }
                out.push(Range::new(from, to, value.clone()));
            }
        }
        out
    }
}

/// An ordered, layered multiset of ranges over one document.
#[derive(Debug)]
pub struct RangeSet<V: RangeValue> {
    chunk_pos: Vec<usize>,
    chunks: Vec<Arc<Chunk<V>>>,
    next_layer: Option<Box<RangeSet<V>>>,
    max_point: isize,
}

impl<V: RangeValue> Clone for RangeSet<V> {
    fn clone(&self) -> Self {
        RangeSet {
            chunk_pos: self.chunk_pos.clone(),
            chunks: self.chunks.clone(),
            next_layer: self.next_layer.clone(),
            max_point: self.max_point,
        }
    }
}

impl<V: RangeValue> Default for RangeSet<V> {
    fn default() -> Self {
        Self::empty()
    }
}

/// Parameters for [`RangeSet::update`].
pub struct RangeSetUpdate<'a, V: RangeValue> {
    pub add: Vec<Range<V>>,
    /// Set when `add` is not already sorted by `(from, start_side)`.
    pub sort: bool,
    #[allow(clippy::type_complexity)]
    pub filter: Option<&'a mut dyn FnMut(usize, usize, &V) -> bool>,
    pub filter_from: usize,
    pub filter_to: usize,
}

impl<V: RangeValue> Default for RangeSetUpdate<'_, V> {
    fn default() -> Self {
        RangeSetUpdate {
            add: Vec::new(),
            sort: false,
            filter: None,
            filter_from: 0,
            filter_to: usize::MAX,
        }
    }
}

impl<V: RangeValue> RangeSet<V> {
    pub fn empty() -> RangeSet<V> {
        RangeSet {
            chunk_pos: Vec::new(),
            chunks: Vec::new(),
            next_layer: None,
            max_point: -1,
        }
    }

    /// Build a set from ranges; `sorted` warrants they are already ordered by
    /// `(from, start_side)`.
    pub fn of(mut ranges: Vec<Range<V>>, sorted: bool) -> Result<RangeSet<V>, RangeError> {
        if !sorted {
            ranges.sort_by(cmp_range);
        }
        let mut b = RangeSetBuilder::new();
        for r in ranges {
            b.add(r.from, r.to, r.value)?;
        }
        Ok(b.finish())
    }

    /// Number of ranges across all layers.
    pub fn size(&self) -> usize {
        let own: usize = self.chunks.iter().map(|c| c.len()).sum();
        own + self.next_layer.as_ref().map_or(0, |l| l.size())
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Length of the longest point range in the set.
    pub fn max_point(&self) -> isize {
        self.max_point
    }

    /// A new set with ranges added and/or filtered out.
    ///
    /// Additions land in a fresh layer over the current chunks, keeping the
    /// existing chunk storage shared, unless a filter forces a rebuild of the
    /// filtered region.
    pub fn update(&self, update: RangeSetUpdate<'_, V>) -> Result<RangeSet<V>, RangeError> {
        let RangeSetUpdate {
            mut add,
            sort,
            mut filter,
            filter_from,
            filter_to,
        } = update;
        if add.is_empty() && filter.is_none() {
            return Ok(self.clone());
        }
        if sort {
            add.sort_by(cmp_range);
        }
        let base = match &mut filter {
            None => self.clone(),
            Some(f) => {
                let mut b = RangeSetBuilder::new();
                for (from, to, value) in self.iter() {
                    let drop =
                        from <= filter_to && to >= filter_from && !f(from, to, value);
                    if !drop {
                        b.add(from, to, value.clone())?;
                    }
                }
                b.finish()
            }
        };
        if add.is_empty() {
            return Ok(base);
        }
        let added = RangeSet::of(add, true)?;
        Ok(base.with_layer(added))
    }

    /// Attach `self` beneath `top`'s deepest layer; `top` wins ties.
    fn with_layer(self, mut top: RangeSet<V>) -> RangeSet<V> {
        if self.chunks.is_empty() && self.next_layer.is_none() {
            return top;
        }
        if top.is_empty() {
            return self;
        }
        fn attach<V: RangeValue>(node: &mut RangeSet<V>, bottom: RangeSet<V>) {
            node.max_point = node.max_point.max(bottom.max_point);
            match &mut node.next_layer {
                Some(next) => attach(next, bottom),
                None => node.next_layer = Some(Box::new(bottom)),
            }
        }
        attach(&mut top, self);
        top
    }

    /// Layer several sets into one; earlier sets take precedence at ties.
    pub fn join(sets: Vec<RangeSet<V>>) -> RangeSet<V> {
        let mut result: Option<RangeSet<V>> = None;
        for set in sets.into_iter().rev() {
            if set.is_empty() {
                continue;
            }
            result = Some(match result {
                None => set,
                Some(below) => below.with_layer(set),
            });
        }
        result.unwrap_or_else(RangeSet::empty)
    }

    /// Map the set through a document edit. Chunks the edit does not touch
    /// are reused whole (sharing their range and value storage).
    pub fn map(&self, changes: &ChangeDesc) -> RangeSet<V> {
        if changes.is_empty() || self.is_empty() {
            return self.clone();
        }
        let mut chunk_pos = Vec::with_capacity(self.chunks.len());
        let mut chunks = Vec::with_capacity(self.chunks.len());
        let mut spilled: Vec<Range<V>> = Vec::new();
        for (i, chunk) in self.chunks.iter().enumerate() {
            let start = self.chunk_pos[i];
            match changes.touches_range(start, start + chunk.length()) {
                Touched::No => {
                    chunk_pos.push(changes.map_pos(start, -1));
                    chunks.push(chunk.clone());
                }
                _ => spilled.extend(chunk.map(start, changes)),
            }
        }
        let mapped_next = self
            .next_layer
            .as_ref()
            .map(|l| l.map(changes))
            .filter(|l| !l.is_empty());
        let kept = RangeSet {
            max_point: chunks.iter().map(|c| c.max_point).max().unwrap_or(-1),
            chunk_pos,
            chunks,
            next_layer: mapped_next.map(Box::new),
        };
        if spilled.is_empty() {
            kept
        } else {
            // Mapping can reorder ranges around replaced spans, so re-sort.
            let spill_set = RangeSet::of(spilled, false).expect("mapped ranges are valid");
            kept.with_layer(spill_set)
        }
    }

    /// Iterate all ranges in `(from, start_side)` order across layers.
    pub fn iter(&self) -> RangeIter<'_, V> {
        self.iter_from(0)
    }

    /// Iterate ranges whose `to` is at or after `from`.
    pub fn iter_from(&self, from: usize) -> RangeIter<'_, V> {
        let mut layers = Vec::new();
        let mut cur = Some(self);
        while let Some(set) = cur {
            layers.push(LayerIter::new(set, from));
            cur = set.next_layer.as_deref();
        }
        RangeIter { layers }
    }

    /// Call `f` for every range overlapping `[from, to]`; return `false` from
    /// `f` to stop early.
    pub fn between(&self, from: usize, to: usize, mut f: impl FnMut(usize, usize, &V) -> bool) {
        for (rf, rt, value) in self.iter_from(from) {
            if rf > to {
                break;
            }
            if rt >= from && !f(rf, rt, value) {
                break;
            }
        }
    }
}

/// Incremental builder; ranges must arrive in `(from, start_side)` order.
pub struct RangeSetBuilder<V: RangeValue> {
    chunk_pos: Vec<usize>,
    chunks: Vec<Arc<Chunk<V>>>,
    cur_base: usize,
    cur_from: Vec<usize>,
    cur_to: Vec<usize>,
    cur_value: Vec<V>,
    last_from: usize,
    last_side: i32,
    any: bool,
}

impl<V: RangeValue> Default for RangeSetBuilder<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: RangeValue> RangeSetBuilder<V> {
    pub fn new() -> RangeSetBuilder<V> {
        RangeSetBuilder {
            chunk_pos: Vec::new(),
            chunks: Vec::new(),
            cur_base: 0,
            cur_from: Vec::new(),
            cur_to: Vec::new(),
            cur_value: Vec::new(),
            last_from: 0,
            last_side: i32::MIN,
            any: false,
        }
    }

    pub fn add(&mut self, from: usize, to: usize, value: V) -> Result<(), RangeError> {
        if from > to {
            return Err(RangeError::Invalid { from, to });
        }
        let side = value.start_side();
        if self.any && (from, side) < (self.last_from, self.last_side) {
            return Err(RangeError::OutOfOrder {
                from,
                to,
                at: self.last_from,
            });
        }
        self.any = true;
        self.last_from = from;
        self.last_side = side;
        if self.cur_value.len() == CHUNK_SIZE {
            self.flush_chunk();
        }
        if self.cur_value.is_empty() {
            self.cur_base = from;
        }
        self.cur_from.push(from - self.cur_base);
        self.cur_to.push(to - self.cur_base);
        self.cur_value.push(value);
        Ok(())
    }

    fn flush_chunk(&mut self) {
        if self.cur_value.is_empty() {
            return;
        }
        self.chunk_pos.push(self.cur_base);
        self.chunks.push(Arc::new(Chunk::new(
            std::mem::take(&mut self.cur_from),
            std::mem::take(&mut self.cur_to),
            std::mem::take(&mut self.cur_value),
        )));
    }

    pub fn finish(mut self) -> RangeSet<V> {
        self.flush_chunk();
        RangeSet {
            max_point: self.chunks.iter().map(|c| c.max_point).max().unwrap_or(-1),
            chunk_pos: self.chunk_pos,
            chunks: self.chunks,
            next_layer: None,
        }
    }
}

/// Cursor over one layer's chunks.
struct LayerIter<'a, V: RangeValue> {
    set: &'a RangeSet<V>,
    chunk: usize,
    index: usize,
}

impl<'a, V: RangeValue> LayerIter<'a, V> {
    fn new(set: &'a RangeSet<V>, from: usize) -> LayerIter<'a, V> {
        let mut it = LayerIter {
            set,
            chunk: 0,
            index: 0,
        };
        // Skip chunks that end before `from`, then ranges within the chunk.
        while it.chunk < set.chunks.len()
            && set.chunk_pos[it.chunk] + set.chunks[it.chunk].length() < from
        {
            it.chunk += 1;
        }
        if let Some(chunk) = set.chunks.get(it.chunk) {
            let base = set.chunk_pos[it.chunk];
            while it.index < chunk.len() && base + chunk.to[it.index] < from {
                it.index += 1;
            }
        }
        it
    }

    fn current(&self) -> Option<(usize, usize, &'a V)> {
        let chunk = self.set.chunks.get(self.chunk)?;
        if self.index >= chunk.len() {
            return None;
        }
        let base = self.set.chunk_pos[self.chunk];
        Some((
            base + chunk.from[self.index],
            base + chunk.to[self.index],
            &chunk.value[self.index],
        ))
    }

    fn advance(&mut self) {
        self.index += 1;
        if self
            .set
            .chunks
            .get(self.chunk)
            .is_some_and(|c| self.index >= c.len())
        {
            self.chunk += 1;
            self.index = 0;
        }
    }
}

/// Merged iterator over a set's layers, ordered by `(from, start_side)` with
/// earlier layers winning ties.
pub struct RangeIter<'a, V: RangeValue> {
    layers: Vec<LayerIter<'a, V>>,
}

impl<'a, V: RangeValue> Iterator for RangeIter<'a, V> {
    type Item = (usize, usize, &'a V);

    fn next(&mut self) -> Option<(usize, usize, &'a V)> {
        let mut best: Option<(usize, (usize, i32))> = None;
        for (rank, layer) in self.layers.iter().enumerate() {
            if let Some((from, _, value)) = layer.current() {
                let key = (from, value.start_side());
                if best.is_none_or(|(_, k)| key < k) {
                    best = Some((rank, key));
                }
            }
        }
        let (rank, _) = best?;
        let item = self.layers[rank].current()?;
        self.layers[rank].advance();
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_state::{Change, ChangeSet};

    /// Test value mirroring an inline mark: positive start side, negative end
    /// side, not a point.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Mark(&'static str);

    impl RangeValue for Mark {
        fn start_side(&self) -> i32 {
            1
        }

        fn end_side(&self) -> i32 {
            -1
        }
    }

    /// Zero-width point marker.
    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Pin(i32, MapMode);

    impl RangeValue for Pin {
        fn start_side(&self) -> i32 {
            self.0
        }

        fn end_side(&self) -> i32 {
            self.0
        }

        fn point(&self) -> bool {
            true
        }

        fn map_mode(&self) -> MapMode {
            self.1
        }
    }

    fn changes(list: Vec<Change>, len: usize) -> ChangeSet {
        ChangeSet::of(list, len).unwrap()
    }

    #[test]
    fn of_sorts_and_iterates_in_order() {
        let set = RangeSet::of(
            vec![
                Range::new(9, 12, Mark("b")),
                Range::new(2, 5, Mark("a")),
                Range::new(9, 9, Mark("c")),
            ],
            false,
        )
        .unwrap();
        let got: Vec<_> = set.iter().map(|(f, t, v)| (f, t, v.0)).collect();
        assert_eq!(got, vec![(2, 5, "a"), (9, 12, "b"), (9, 9, "c")]);
        assert_eq!(set.size(), 3);
    }

    #[test]
    fn sorted_flag_rejects_disorder() {
        let mut b = RangeSetBuilder::new();
        b.add(5, 6, Mark("a")).unwrap();
        assert!(matches!(
            b.add(2, 3, Mark("b")),
            Err(RangeError::OutOfOrder { .. })
        ));
    }

    #[test]
    fn start_side_orders_ties() {
        let set = RangeSet::of(
            vec![
                Range::new(4, 4, Pin(1, MapMode::TrackDel)),
                Range::new(4, 4, Pin(-1, MapMode::TrackDel)),
            ],
            false,
        )
        .unwrap();
        let sides: Vec<i32> = set.iter().map(|(_, _, v)| v.0).collect();
        assert_eq!(sides, vec![-1, 1]);
    }

    #[test]
    fn map_through_inner_deletion_shrinks_range() {
        // A mark over [4..8) with a deletion of [5..7) inside collapses to [4..6).
        let set = RangeSet::of(vec![Range::new(4, 8, Mark("m"))], false).unwrap();
        let cs = changes(vec![Change::delete(5, 7)], 12);
        let mapped = set.map(cs.desc());
        let got: Vec<_> = mapped.iter().map(|(f, t, _)| (f, t)).collect();
        assert_eq!(got, vec![(4, 6)]);
    }

    #[test]
    fn map_drops_fully_deleted_range() {
        let set = RangeSet::of(vec![Range::new(5, 7, Mark("m"))], false).unwrap();
        let cs = changes(vec![Change::delete(5, 7)], 12);
        assert_eq!(set.map(cs.desc()).size(), 0);
        let cs_wider = changes(vec![Change::delete(4, 8)], 12);
        assert_eq!(set.map(cs_wider.desc()).size(), 0);
    }

    #[test]
    fn map_is_identity_under_empty_changes() {
        let set = RangeSet::of(
            vec![Range::new(1, 3, Mark("a")), Range::new(6, 6, Mark("p"))],
            false,
        )
        .unwrap();
        let mapped = set.map(ChangeSet::empty(10).desc());
        let a: Vec<_> = set.iter().map(|(f, t, v)| (f, t, v.clone())).collect();
        let b: Vec<_> = mapped.iter().map(|(f, t, v)| (f, t, v.clone())).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn points_survive_per_map_mode() {
        let survivors = RangeSet::of(
            vec![Range::new(5, 5, Pin(0, MapMode::Simple))],
            false,
        )
        .unwrap();
        let tracked = RangeSet::of(
            vec![Range::new(5, 5, Pin(0, MapMode::TrackDel))],
            false,
        )
        .unwrap();
        let cs = changes(vec![Change::delete(4, 7)], 10);
        assert_eq!(survivors.map(cs.desc()).size(), 1);
        assert_eq!(tracked.map(cs.desc()).size(), 0);
    }

    #[test]
    fn untouched_chunks_are_shared_after_map() {
        let ranges: Vec<Range<Mark>> = (0..600)
            .map(|i| Range::new(i * 10, i * 10 + 4, Mark("x")))
            .collect();
        let set = RangeSet::of(ranges, true).unwrap();
        assert!(set.chunks.len() >= 3);
        // Edit inside the very last chunk only.
        let cs = changes(vec![Change::insert(5990, "zz")], 6010);
        let mapped = set.map(cs.desc());
        assert!(Arc::ptr_eq(&set.chunks[0], &mapped.chunks[0]));
        assert_eq!(mapped.size(), set.size());
    }

    #[test]
    fn update_filters_and_adds() {
        let set = RangeSet::of(
            vec![
                Range::new(1, 2, Mark("a")),
                Range::new(4, 6, Mark("b")),
                Range::new(8, 9, Mark("c")),
            ],
            false,
        )
        .unwrap();
        let mut filter = |_f: usize, _t: usize, v: &Mark| v.0 != "b";
        let updated = set
            .update(RangeSetUpdate {
                add: vec![Range::new(3, 3, Mark("new"))],
                sort: false,
                filter: Some(&mut filter),
                ..Default::default()
            })
            .unwrap();
        let got: Vec<_> = updated.iter().map(|(f, _, v)| (f, v.0)).collect();
        assert_eq!(got, vec![(1, "a"), (3, "new"), (8, "c")]);
    }

    #[test]
    fn filter_range_limits_filtering() {
        let set = RangeSet::of(
            vec![Range::new(1, 2, Mark("a")), Range::new(8, 9, Mark("a"))],
            false,
        )
        .unwrap();
        let mut filter = |_f: usize, _t: usize, _v: &Mark| false;
        let updated = set
            .update(RangeSetUpdate {
                filter: Some(&mut filter),
                filter_from: 0,
                filter_to: 4,
                ..Default::default()
            })
            .unwrap();
        let got: Vec<_> = updated.iter().map(|(f, _, _)| f).collect();
        assert_eq!(got, vec![8]);
    }

    #[test]
    fn join_interleaves_sets_with_layer_precedence() {
        let a = RangeSet::of(vec![Range::new(2, 3, Mark("a"))], false).unwrap();
        let b = RangeSet::of(
            vec![Range::new(0, 1, Mark("b")), Range::new(2, 4, Mark("B"))],
            false,
        )
        .unwrap();
        let joined = RangeSet::join(vec![a, b]);
        let got: Vec<_> = joined.iter().map(|(f, _, v)| (f, v.0)).collect();
        // Equal (from, side) keys fall back to layer order: earlier set first.
        assert_eq!(got, vec![(0, "b"), (2, "a"), (2, "B")]);
        assert_eq!(joined.size(), 3);
    }

    #[test]
    fn between_visits_overlapping_ranges_and_stops() {
        let set = RangeSet::of(
            vec![
                Range::new(0, 2, Mark("a")),
                Range::new(3, 6, Mark("b")),
                Range::new(7, 9, Mark("c")),
            ],
            false,
        )
        .unwrap();
        let mut seen = Vec::new();
        set.between(2, 7, |f, _, v| {
            seen.push((f, v.0));
            true
        });
        assert_eq!(seen, vec![(0, "a"), (3, "b"), (7, "c")]);
        let mut count = 0;
        set.between(0, 9, |_, _, _| {
            count += 1;
            false
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn iter_from_skips_earlier_ranges() {
        let ranges: Vec<Range<Mark>> = (0..400)
            .map(|i| Range::new(i * 5, i * 5 + 2, Mark("x")))
            .collect();
        let set = RangeSet::of(ranges, true).unwrap();
        let first = set.iter_from(1000).next().unwrap();
        assert_eq!(first.0, 1000);
    }
}
