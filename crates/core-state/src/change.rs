//! The edit algebra: change descriptions, change sets, and position mapping.
//!
//! A [`ChangeSet`] describes an edit from a document of length `len` to one of
//! length `new_len` as a normalized run of sections: untouched spans, deleted
//! spans, and insertions (a deletion directly after an insertion forms a
//! replacement). [`ChangeDesc`] is the same run without the inserted text,
//! cheap to store and sufficient for position mapping.
//!
//! Normal form invariants, maintained by the internal builder:
//! - no zero-length sections;
//! - adjacent sections of the same kind are merged;
//! - within a changed region the insertion precedes the deletion.

use core_text::{Text, TextError};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChangeError>;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ChangeError {
    #[error("invalid change range: start {from} is after end {to}")]
    InvalidRange { from: usize, to: usize },
    #[error("change range {from}..{to} is out of bounds for document length {len}")]
    RangeOutOfBounds { from: usize, to: usize, len: usize },
    #[error("changeset length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("cannot compose: left output length {left}, right input length {right}")]
    ComposeMismatch { left: usize, right: usize },
    #[error("position {pos} is out of range for changeset length {len}")]
    PositionOutOfRange { pos: usize, len: usize },
    #[error("malformed change JSON: {0}")]
    InvalidJson(String),
    #[error(transparent)]
    Text(#[from] TextError),
}

/// How [`ChangeDesc::map_pos_tracked`] treats positions next to edits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MapMode {
    /// Always map to a position.
    #[default]
    Simple,
    /// Report `None` when the position itself was deleted.
    TrackDel,
    /// Report `None` when the content before the position was deleted.
    TrackBefore,
    /// Report `None` when the content after the position was deleted.
    TrackAfter,
}

/// One section of a change run. `Insert` carries only the inserted length in a
/// [`ChangeDesc`]; the owning [`ChangeSet`] keeps the texts in a parallel list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Section {
    Keep(usize),
    Delete(usize),
    Insert(usize),
}

/// A single edit against a document: replace `[from, to)` with `insert`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub from: usize,
    pub to: usize,
    pub insert: Text,
}

impl Change {
    pub fn insert(from: usize, text: impl Into<Text>) -> Change {
        Change {
            from,
            to: from,
            insert: text.into(),
        }
    }

    pub fn delete(from: usize, to: usize) -> Change {
        Change {
            from,
            to,
            insert: Text::empty(),
        }
    }

    pub fn replace(from: usize, to: usize, text: impl Into<Text>) -> Change {
        Change {
            from,
            to,
            insert: text.into(),
        }
    }
}

/// Result of [`ChangeDesc::touches_range`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Touched {
    No,
    Yes,
    /// The range is strictly inside a replaced span.
    Covered,
}

/// A changed region reported by [`ChangeSet::iter_changes`], with endpoints in
/// both the old (`a`) and new (`b`) coordinate spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedRegion {
    pub from_a: usize,
    pub to_a: usize,
    pub from_b: usize,
    pub to_b: usize,
    pub inserted: Text,
}

/// Length-only view of an edit; supports mapping but not application.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeDesc {
    pub(crate) sections: Vec<Section>,
    len: usize,
    new_len: usize,
}

impl ChangeDesc {
    /// Length of the document the edit applies to.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Length of the document the edit produces.
    pub fn new_len(&self) -> usize {
        self.new_len
    }

    /// True when the edit changes nothing.
    pub fn is_empty(&self) -> bool {
        self.sections
            .iter()
            .all(|s| matches!(s, Section::Keep(_)))
    }

    /// The mirror description undoing this one (insertions become deletions of
    /// the same length and vice versa).
    pub fn inverted(&self) -> ChangeDesc {
        let sections = self
            .sections
            .iter()
            .map(|s| match *s {
                Section::Keep(n) => Section::Keep(n),
                Section::Delete(n) => Section::Insert(n),
                Section::Insert(n) => Section::Delete(n),
            })
            .collect();
        ChangeDesc {
            sections,
            len: self.new_len,
            new_len: self.len,
        }
    }

    /// Map a position through the edit. `assoc < 0` keeps the position before
    /// content inserted at its location, `assoc >= 0` moves it after.
    /// Positions beyond the edit's length clamp to the end.
    pub fn map_pos(&self, pos: usize, assoc: i32) -> usize {
        self.map_pos_tracked(pos, assoc, MapMode::Simple)
            .expect("simple mapping is total")
    }

    /// Map a position, reporting `None` when the side tracked by `mode` was
    /// deleted.
    pub fn map_pos_tracked(&self, pos: usize, assoc: i32, mode: MapMode) -> Option<usize> {
        let pos = pos.min(self.len);
        let mut pos_a = 0;
        let mut pos_b = 0;
        let mut regions = RegionIter::new(&self.sections);
        while let Some(region) = regions.next_region() {
            match region {
                Region::Keep(n) => {
                    if pos_a + n > pos {
                        return Some(pos_b + (pos - pos_a));
                    }
                    pos_a += n;
                    pos_b += n;
                }
                Region::Changed { del, ins } => {
                    let end_a = pos_a + del;
                    let deleted = match mode {
                        MapMode::Simple => false,
                        MapMode::TrackDel => del > 0 && pos >= pos_a && pos < end_a,
                        MapMode::TrackBefore => pos > pos_a && pos <= end_a,
                        MapMode::TrackAfter => pos >= pos_a && pos < end_a,
                    };
                    if deleted {
                        return None;
                    }
                    if end_a > pos || (end_a == pos && assoc < 0) {
                        return Some(if assoc < 0 { pos_b } else { pos_b + ins });
                    }
                    pos_a = end_a;
                    pos_b += ins;
                }
            }
        }
        Some(pos_b + pos.saturating_sub(pos_a))
    }

    /// Express this edit against the document produced by `other` (which
    /// starts from the same document). When both insert at the same position,
    /// `before` puts this edit's insertion first.
    pub fn map_desc(&self, other: &ChangeDesc, before: bool) -> Result<ChangeDesc> {
        let raw = transform(self, other, before)?;
        let mut b = DescBuilder::default();
        for section in raw {
            match section {
                Section::Keep(n) => b.keep(n),
                Section::Delete(n) => b.delete(n),
                Section::Insert(n) => b.insert(n),
            }
        }
        Ok(b.finish())
    }

    /// Iterate changed regions as `(from_a, to_a, from_b, to_b)`.
    pub fn iter_changed_ranges(&self) -> impl Iterator<Item = (usize, usize, usize, usize)> + '_ {
        let mut regions = RegionIter::new(&self.sections);
        let mut pos_a = 0;
        let mut pos_b = 0;
        std::iter::from_fn(move || {
            while let Some(region) = regions.next_region() {
                match region {
                    Region::Keep(n) => {
                        pos_a += n;
                        pos_b += n;
                    }
                    Region::Changed { del, ins } => {
                        let item = (pos_a, pos_a + del, pos_b, pos_b + ins);
                        pos_a += del;
                        pos_b += ins;
                        return Some(item);
                    }
                }
            }
            None
        })
    }

    /// Iterate untouched spans as `(pos_a, pos_b, len)`.
    pub fn iter_gaps(&self) -> impl Iterator<Item = (usize, usize, usize)> + '_ {
        let mut regions = RegionIter::new(&self.sections);
        let mut pos_a = 0;
        let mut pos_b = 0;
        std::iter::from_fn(move || {
            while let Some(region) = regions.next_region() {
                match region {
                    Region::Keep(n) => {
                        let item = (pos_a, pos_b, n);
                        pos_a += n;
                        pos_b += n;
                        return Some(item);
                    }
                    Region::Changed { del, ins } => {
                        pos_a += del;
                        pos_b += ins;
                    }
                }
            }
            None
        })
    }

    /// Whether the edit touches `[from, to]` (old coordinates).
    pub fn touches_range(&self, from: usize, to: usize) -> Touched {
        let mut pos = 0;
        let mut regions = RegionIter::new(&self.sections);
        while let Some(region) = regions.next_region() {
            if pos > to {
                break;
            }
            match region {
                Region::Keep(n) => pos += n,
                Region::Changed { del, .. } => {
                    let end = pos + del;
                    if pos <= to && end >= from {
                        return if pos < from && end > to {
                            Touched::Covered
                        } else {
                            Touched::Yes
                        };
                    }
                    pos = end;
                }
            }
        }
        Touched::No
    }
}

/// A complete, applicable edit: sections plus the inserted texts.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChangeSet {
    desc: ChangeDesc,
    /// Texts of the `Insert` sections, in section order.
    inserted: Vec<Text>,
}

impl ChangeSet {
    /// The identity edit over a document of length `len`.
    pub fn empty(len: usize) -> ChangeSet {
        let mut b = Builder::default();
        b.keep(len);
        b.finish()
    }

    /// Build a set from edits expressed against a document of length `len`.
    ///
    /// Edits may arrive in any order; out-of-order batches are combined by
    /// composition, so each edit's coordinates always refer to the original
    /// document.
    pub fn of(changes: impl IntoIterator<Item = Change>, len: usize) -> Result<ChangeSet> {
        let mut total: Option<ChangeSet> = None;
        let mut builder = Builder::default();
        let mut pos = 0;

        fn flush(
            total: &mut Option<ChangeSet>,
            builder: &mut Builder,
            pos: &mut usize,
            len: usize,
        ) -> Result<()> {
            if *pos < len {
                builder.keep(len - *pos);
            }
            let set = std::mem::take(builder).finish();
            *total = Some(match total.take() {
                None => set,
                Some(t) => t.compose(&set.map(t.desc(), false)?)?,
            });
            *pos = 0;
            Ok(())
        }

        for change in changes {
            let Change { from, to, insert } = change;
            if from > to {
                return Err(ChangeError::InvalidRange { from, to });
            }
            if to > len {
                return Err(ChangeError::RangeOutOfBounds { from, to, len });
            }
            if from == to && insert.len() == 0 {
                continue;
            }
            if from < pos {
                flush(&mut total, &mut builder, &mut pos, len)?;
            }
            if from > pos {
                builder.keep(from - pos);
            }
            if insert.len() > 0 {
                builder.insert(insert);
            }
            builder.delete(to - from);
            pos = to;
        }
        if total.is_none() || !builder.is_empty() || pos > 0 {
            flush(&mut total, &mut builder, &mut pos, len)?;
        }
        Ok(total.expect("flush always produces a set"))
    }

    pub fn len(&self) -> usize {
        self.desc.len()
    }

    pub fn new_len(&self) -> usize {
        self.desc.new_len()
    }

    pub fn is_empty(&self) -> bool {
        self.desc.is_empty()
    }

    /// The length-only description of this edit.
    pub fn desc(&self) -> &ChangeDesc {
        &self.desc
    }

    pub fn map_pos(&self, pos: usize, assoc: i32) -> usize {
        self.desc.map_pos(pos, assoc)
    }

    pub fn map_pos_tracked(&self, pos: usize, assoc: i32, mode: MapMode) -> Option<usize> {
        self.desc.map_pos_tracked(pos, assoc, mode)
    }

    pub fn touches_range(&self, from: usize, to: usize) -> Touched {
        self.desc.touches_range(from, to)
    }

    /// Apply the edit to a document of the required length.
    pub fn apply(&self, doc: &Text) -> Result<Text> {
        if doc.len() != self.len() {
            return Err(ChangeError::LengthMismatch {
                expected: self.len(),
                actual: doc.len(),
            });
        }
        let mut result = doc.clone();
        for region in self.iter_changes() {
            result = result.replace(
                region.from_b,
                region.from_b + (region.to_a - region.from_a),
                &region.inserted,
            )?;
        }
        Ok(result)
    }

    /// The edit undoing this one, given the document it applied to.
    pub fn invert(&self, doc: &Text) -> Result<ChangeSet> {
        if doc.len() != self.len() {
            return Err(ChangeError::LengthMismatch {
                expected: self.len(),
                actual: doc.len(),
            });
        }
        let mut b = Builder::default();
        let mut pos_a = 0;
        for section in &self.desc.sections {
            match *section {
                Section::Keep(n) => {
                    b.keep(n);
                    pos_a += n;
                }
                Section::Delete(n) => {
                    b.insert(doc.slice(pos_a, pos_a + n)?);
                    pos_a += n;
                }
                Section::Insert(n) => b.delete(n),
            }
        }
        Ok(b.finish())
    }

    /// Combine with an edit on this edit's output document, producing the
    /// single equivalent edit on the original document.
    pub fn compose(&self, other: &ChangeSet) -> Result<ChangeSet> {
        if self.new_len() != other.len() {
            return Err(ChangeError::ComposeMismatch {
                left: self.new_len(),
                right: other.len(),
            });
        }
        let mut iter_a = self.heads();
        let mut iter_b = other.heads();
        let mut head_a = iter_a.next();
        let mut head_b = iter_b.next();
        let mut out = Builder::default();
        loop {
            match (head_a.take(), head_b.take()) {
                (None, None) => break,
                // A deletion happens before anything B does at this point.
                (Some(Head::Delete(n)), b) => {
                    out.delete(n);
                    head_a = iter_a.next();
                    head_b = b;
                }
                // B inserts into A's output; its text lands before any text A
                // inserted at the same point.
                (a, Some(Head::Insert(text))) => {
                    out.insert(text);
                    head_a = a;
                    head_b = iter_b.next();
                }
                (None, Some(_)) | (Some(_), None) => {
                    return Err(ChangeError::ComposeMismatch {
                        left: self.new_len(),
                        right: other.len(),
                    });
                }
                (Some(Head::Keep(i)), Some(Head::Keep(j))) => {
                    let n = i.min(j);
                    out.keep(n);
                    head_a = shrink_keep(i, n, &mut iter_a);
                    head_b = shrink_keep(j, n, &mut iter_b);
                }
                (Some(Head::Keep(i)), Some(Head::Delete(j))) => {
                    let n = i.min(j);
                    out.delete(n);
                    head_a = shrink_keep(i, n, &mut iter_a);
                    head_b = shrink_delete(j, n, &mut iter_b);
                }
                (Some(Head::Insert(text)), Some(Head::Delete(j))) => {
                    // B deletes the front of A's insertion.
                    let len = text.len();
                    if len <= j {
                        head_a = iter_a.next();
                        head_b = shrink_delete(j, len, &mut iter_b);
                    } else {
                        head_a = Some(Head::Insert(text.slice(j, len)?));
                        head_b = iter_b.next();
                    }
                }
                (Some(Head::Insert(text)), Some(Head::Keep(j))) => {
                    let len = text.len();
                    if len <= j {
                        out.insert(text);
                        head_a = iter_a.next();
                        head_b = shrink_keep(j, len, &mut iter_b);
                    } else {
                        out.insert(text.slice(0, j)?);
                        head_a = Some(Head::Insert(text.slice(j, len)?));
                        head_b = iter_b.next();
                    }
                }
            }
        }
        Ok(out.finish())
    }

    /// Express this edit against the document produced by `other`, carrying
    /// the inserted texts along. See [`ChangeDesc::map_desc`] for the tie
    /// rule controlled by `before`.
    pub fn map(&self, other: &ChangeDesc, before: bool) -> Result<ChangeSet> {
        let raw = transform(&self.desc, other, before)?;
        let mut texts = self.inserted.iter();
        let mut b = Builder::default();
        for section in raw {
            match section {
                Section::Keep(n) => b.keep(n),
                Section::Delete(n) => b.delete(n),
                Section::Insert(_) => b.insert(
                    texts
                        .next()
                        .expect("transform preserves insertion count")
                        .clone(),
                ),
            }
        }
        Ok(b.finish())
    }

    /// Iterate the changed regions front to back.
    pub fn iter_changes(&self) -> impl Iterator<Item = ChangedRegion> + '_ {
        let mut idx = 0;
        let mut text_idx = 0;
        let mut pos_a = 0;
        let mut pos_b = 0;
        std::iter::from_fn(move || {
            while idx < self.desc.sections.len() {
                match self.desc.sections[idx] {
                    Section::Keep(n) => {
                        pos_a += n;
                        pos_b += n;
                        idx += 1;
                    }
                    _ => {
                        let mut del = 0;
                        let mut inserted = Text::empty();
                        while idx < self.desc.sections.len() {
                            match self.desc.sections[idx] {
                                Section::Keep(_) => break,
                                Section::Delete(n) => del += n,
                                Section::Insert(_) => {
                                    inserted = inserted.append(&self.inserted[text_idx]);
                                    text_idx += 1;
                                }
                            }
                            idx += 1;
                        }
                        let region = ChangedRegion {
                            from_a: pos_a,
                            to_a: pos_a + del,
                            from_b: pos_b,
                            to_b: pos_b + inserted.len(),
                            inserted,
                        };
                        pos_a = region.to_a;
                        pos_b = region.to_b;
                        return Some(region);
                    }
                }
            }
            None
        })
    }

    /// Keep only the changed regions lying entirely inside one of the given
    /// (sorted, old-coordinate) ranges; returns the kept and dropped parts as
    /// separate sets over the original document.
    pub fn split_by_ranges(&self, ranges: &[(usize, usize)]) -> Result<(ChangeSet, ChangeSet)> {
        let mut kept = Vec::new();
        let mut dropped = Vec::new();
        for region in self.iter_changes() {
            let inside = ranges
                .iter()
                .any(|&(from, to)| region.from_a >= from && region.to_a <= to);
            let change = Change {
                from: region.from_a,
                to: region.to_a,
                insert: region.inserted,
            };
            if inside {
                kept.push(change);
            } else {
                dropped.push(change);
            }
        }
        Ok((
            ChangeSet::of(kept, self.len())?,
            ChangeSet::of(dropped, self.len())?,
        ))
    }

    /// JSON form: untouched spans as integers, changed regions as
    /// `[deleted, line, line, …]` arrays.
    pub fn to_json(&self) -> serde_json::Value {
        let mut out = Vec::new();
        let mut pos_a = 0;
        for region in self.iter_changes() {
            if region.from_a > pos_a {
                out.push(serde_json::json!(region.from_a - pos_a));
            }
            let mut entry = vec![serde_json::json!(region.to_a - region.from_a)];
            if region.inserted.len() > 0 {
                entry.extend(
                    region
                        .inserted
                        .to_lines()
                        .into_iter()
                        .map(serde_json::Value::String),
                );
            }
            out.push(serde_json::Value::Array(entry));
            pos_a = region.to_a;
        }
        if pos_a < self.len() {
            out.push(serde_json::json!(self.len() - pos_a));
        }
        serde_json::Value::Array(out)
    }

    pub fn from_json(value: &serde_json::Value) -> Result<ChangeSet> {
        let arr = value
            .as_array()
            .ok_or_else(|| ChangeError::InvalidJson("expected an array".into()))?;
        let mut b = Builder::default();
        for entry in arr {
            match entry {
                serde_json::Value::Number(n) => {
                    let n = n
                        .as_u64()
                        .ok_or_else(|| ChangeError::InvalidJson("negative span".into()))?;
                    b.keep(n as usize);
                }
                serde_json::Value::Array(parts) => {
                    let Some(del) = parts.first().and_then(|v| v.as_u64()) else {
                        return Err(ChangeError::InvalidJson(
                            "region must start with a deletion length".into(),
                        ));
                    };
                    if parts.len() > 1 {
                        let mut lines = Vec::with_capacity(parts.len() - 1);
                        for part in &parts[1..] {
                            let s = part.as_str().ok_or_else(|| {
                                ChangeError::InvalidJson("expected a string line".into())
                            })?;
                            lines.push(s.to_owned());
                        }
                        b.insert(Text::of(lines)?);
                    }
                    b.delete(del as usize);
                }
                _ => return Err(ChangeError::InvalidJson("unexpected entry".into())),
            }
        }
        Ok(b.finish())
    }

    fn heads(&self) -> HeadIter<'_> {
        HeadIter {
            sections: self.desc.sections.iter(),
            texts: self.inserted.iter(),
        }
    }
}

enum Head {
    Keep(usize),
    Delete(usize),
    Insert(Text),
}

struct HeadIter<'a> {
    sections: std::slice::Iter<'a, Section>,
    texts: std::slice::Iter<'a, Text>,
}

impl Iterator for HeadIter<'_> {
    type Item = Head;

    fn next(&mut self) -> Option<Head> {
        Some(match self.sections.next()? {
            Section::Keep(n) => Head::Keep(*n),
            Section::Delete(n) => Head::Delete(*n),
            Section::Insert(_) => Head::Insert(
                self.texts
                    .next()
                    .expect("texts parallel to insert sections")
                    .clone(),
            ),
        })
    }
}

fn shrink_keep(have: usize, used: usize, iter: &mut HeadIter<'_>) -> Option<Head> {
    if have == used {
        iter.next()
    } else {
        Some(Head::Keep(have - used))
    }
}

fn shrink_delete(have: usize, used: usize, iter: &mut HeadIter<'_>) -> Option<Head> {
    if have == used {
        iter.next()
    } else {
        Some(Head::Delete(have - used))
    }
}

/// Groups raw sections into keeps and changed regions.
struct RegionIter<'a> {
    sections: &'a [Section],
    idx: usize,
}

enum Region {
    Keep(usize),
    Changed { del: usize, ins: usize },
}

impl<'a> RegionIter<'a> {
    fn new(sections: &'a [Section]) -> Self {
        RegionIter { sections, idx: 0 }
    }

    fn next_region(&mut self) -> Option<Region> {
        match *self.sections.get(self.idx)? {
            Section::Keep(n) => {
                self.idx += 1;
                Some(Region::Keep(n))
            }
            _ => {
                let mut del = 0;
                let mut ins = 0;
                while let Some(section) = self.sections.get(self.idx) {
                    match *section {
                        Section::Keep(_) => break,
                        Section::Delete(n) => del += n,
                        Section::Insert(n) => ins += n,
                    }
                    self.idx += 1;
                }
                Some(Region::Changed { del, ins })
            }
        }
    }
}

/// Map `a` over `b` (same start document), producing raw unnormalized
/// sections of `a` expressed in `b`-output coordinates. `a`'s insertions are
/// emitted whole and in order.
fn transform(a: &ChangeDesc, b: &ChangeDesc, before: bool) -> Result<Vec<Section>> {
    if a.len() != b.len() {
        return Err(ChangeError::LengthMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    let mut out = Vec::new();
    let mut iter_a = a.sections.iter().copied();
    let mut iter_b = b.sections.iter().copied();
    let mut head_a = iter_a.next();
    let mut head_b = iter_b.next();
    loop {
        match (head_a.take(), head_b.take()) {
            (None, None) => break,
            (Some(Section::Insert(n)), Some(Section::Insert(m))) => {
                if before {
                    out.push(Section::Insert(n));
                    head_a = iter_a.next();
                    head_b = Some(Section::Insert(m));
                } else {
                    out.push(Section::Keep(m));
                    head_a = Some(Section::Insert(n));
                    head_b = iter_b.next();
                }
            }
            (Some(Section::Insert(n)), b_head) => {
                out.push(Section::Insert(n));
                head_a = iter_a.next();
                head_b = b_head;
            }
            (a_head, Some(Section::Insert(m))) => {
                out.push(Section::Keep(m));
                head_a = a_head;
                head_b = iter_b.next();
            }
            (None, Some(_)) | (Some(_), None) => {
                return Err(ChangeError::LengthMismatch {
                    expected: a.len(),
                    actual: b.len(),
                });
            }
            (Some(sa), Some(sb)) => {
                let (i, a_del) = match sa {
                    Section::Keep(i) => (i, false),
                    Section::Delete(i) => (i, true),
                    Section::Insert(_) => unreachable!("handled above"),
                };
                let (j, b_del) = match sb {
                    Section::Keep(j) => (j, false),
                    Section::Delete(j) => (j, true),
                    Section::Insert(_) => unreachable!("handled above"),
                };
                let n = i.min(j);
                if !b_del {
                    out.push(if a_del {
                        Section::Delete(n)
                    } else {
                        Section::Keep(n)
                    });
                }
                head_a = if i == n {
                    iter_a.next()
                } else {
                    Some(if a_del {
                        Section::Delete(i - n)
                    } else {
                        Section::Keep(i - n)
                    })
                };
                head_b = if j == n {
                    iter_b.next()
                } else {
                    Some(if b_del {
                        Section::Delete(j - n)
                    } else {
                        Section::Keep(j - n)
                    })
                };
            }
        }
    }
    Ok(out)
}

/// Normalizing builder for change sets.
#[derive(Default)]
pub(crate) struct Builder {
    sections: Vec<Section>,
    inserted: Vec<Text>,
    len: usize,
    new_len: usize,
}

impl Builder {
    pub(crate) fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    pub(crate) fn keep(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.len += n;
        self.new_len += n;
        if let Some(Section::Keep(m)) = self.sections.last_mut() {
            *m += n;
        } else {
            self.sections.push(Section::Keep(n));
        }
    }

    pub(crate) fn delete(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.len += n;
        if let Some(Section::Delete(m)) = self.sections.last_mut() {
            *m += n;
        } else {
            self.sections.push(Section::Delete(n));
        }
    }

    pub(crate) fn insert(&mut self, text: Text) {
        let ins = text.len();
        if ins == 0 {
            return;
        }
        self.new_len += ins;
        match self.sections.as_mut_slice() {
            // Merge into the insertion of the current region.
            [.., Section::Insert(m)] | [.., Section::Insert(m), Section::Delete(_)] => {
                *m += ins;
                let last = self
                    .inserted
                    .last_mut()
                    .expect("texts parallel to insert sections");
                *last = last.append(&text);
            }
            // Keep the insertion before the deletion within a region.
            [.., last @ Section::Delete(_)] => {
                let del = std::mem::replace(last, Section::Insert(ins));
                self.sections.push(del);
                self.inserted.push(text);
            }
            _ => {
                self.sections.push(Section::Insert(ins));
                self.inserted.push(text);
            }
        }
    }

    pub(crate) fn finish(self) -> ChangeSet {
        ChangeSet {
            desc: ChangeDesc {
                sections: self.sections,
                len: self.len,
                new_len: self.new_len,
            },
            inserted: self.inserted,
        }
    }
}

/// Normalizing builder for bare descriptions.
#[derive(Default)]
struct DescBuilder {
    sections: Vec<Section>,
    len: usize,
    new_len: usize,
}

impl DescBuilder {
    fn keep(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.len += n;
        self.new_len += n;
        if let Some(Section::Keep(m)) = self.sections.last_mut() {
            *m += n;
        } else {
            self.sections.push(Section::Keep(n));
        }
    }

    fn delete(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.len += n;
        if let Some(Section::Delete(m)) = self.sections.last_mut() {
            *m += n;
        } else {
            self.sections.push(Section::Delete(n));
        }
    }

    fn insert(&mut self, n: usize) {
        if n == 0 {
            return;
        }
        self.new_len += n;
        match self.sections.as_mut_slice() {
            [.., Section::Insert(m)] | [.., Section::Insert(m), Section::Delete(_)] => *m += n,
            [.., last @ Section::Delete(_)] => {
                let del = std::mem::replace(last, Section::Insert(n));
                self.sections.push(del);
            }
            _ => self.sections.push(Section::Insert(n)),
        }
    }

    fn finish(self) -> ChangeDesc {
        ChangeDesc {
            sections: self.sections,
            len: self.len,
            new_len: self.new_len,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(s: &str) -> Text {
        Text::from(s)
    }

    fn set(changes: Vec<Change>, len: usize) -> ChangeSet {
        ChangeSet::of(changes, len).unwrap()
    }

    #[test]
    fn build_and_apply_single_change() {
        let d = doc("hello world");
        let cs = set(vec![Change::replace(6, 11, doc("rust"))], d.len());
        assert_eq!(cs.len(), 11);
        assert_eq!(cs.new_len(), 10);
        assert_eq!(cs.apply(&d).unwrap().to_string(), "hello rust");
    }

    #[test]
    fn of_validates_ranges() {
        assert_eq!(
            ChangeSet::of(vec![Change::delete(5, 3)], 10),
            Err(ChangeError::InvalidRange { from: 5, to: 3 })
        );
        assert_eq!(
            ChangeSet::of(vec![Change::delete(8, 12)], 10),
            Err(ChangeError::RangeOutOfBounds {
                from: 8,
                to: 12,
                len: 10
            })
        );
    }

    #[test]
    fn of_accepts_out_of_order_changes() {
        let d = doc("abcdef");
        let cs = set(
            vec![Change::insert(4, doc("Y")), Change::insert(1, doc("X"))],
            d.len(),
        );
        assert_eq!(cs.apply(&d).unwrap().to_string(), "aXbcdYef");
    }

    #[test]
    fn multiple_insertions_at_one_point_apply_in_spec_order() {
        let d = doc("ab");
        let cs = set(
            vec![Change::insert(1, doc("1")), Change::insert(1, doc("2"))],
            d.len(),
        );
        assert_eq!(cs.apply(&d).unwrap().to_string(), "a12b");
    }

    #[test]
    fn apply_rejects_wrong_length() {
        let cs = ChangeSet::empty(4);
        assert!(matches!(
            cs.apply(&doc("hello")),
            Err(ChangeError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn compose_combines_edits() {
        // Scenario: insert then delete across the insertion boundary.
        let d = doc("0123456789");
        let cs1 = set(vec![Change::insert(3, doc("abc"))], 10);
        let cs2 = set(vec![Change::delete(5, 7)], 13);
        let composed = cs1.compose(&cs2).unwrap();
        assert_eq!(composed.len(), 10);
        assert_eq!(composed.new_len(), 11);
        assert_eq!(
            composed.apply(&d).unwrap().to_string(),
            cs2.apply(&cs1.apply(&d).unwrap()).unwrap().to_string()
        );
        // A caret after the insertion point lands past the inserted text; a
        // position at the deletion start is gone under deletion tracking.
        assert_eq!(cs1.map_pos(3, 1), 6);
        assert_eq!(cs2.map_pos_tracked(5, -1, MapMode::TrackDel), None);
    }

    #[test]
    fn compose_rejects_length_mismatch() {
        let cs1 = ChangeSet::empty(5);
        let cs2 = ChangeSet::empty(6);
        assert!(matches!(
            cs1.compose(&cs2),
            Err(ChangeError::ComposeMismatch { left: 5, right: 6 })
        ));
    }

    #[test]
    fn compose_is_associative() {
        let d = doc("abcdefgh");
        let a = set(vec![Change::replace(2, 4, doc("XY"))], 8);
        let b = set(vec![Change::delete(0, 3)], 8);
        let c = set(vec![Change::insert(5, doc("!"))], 5);
        let left = a.compose(&b).unwrap().compose(&c).unwrap();
        let right = a.compose(&b.compose(&c).unwrap()).unwrap();
        assert_eq!(left, right);
        assert_eq!(left.apply(&d).unwrap().to_string(), "deXY!fgh");
    }

    #[test]
    fn invert_round_trips() {
        let d = doc("one\ntwo\nthree");
        let cs = set(
            vec![
                Change::replace(0, 3, doc("ONE")),
                Change::delete(4, 7),
                Change::insert(10, doc("!")),
            ],
            d.len(),
        );
        let applied = cs.apply(&d).unwrap();
        let inverted = cs.invert(&d).unwrap();
        assert_eq!(inverted.apply(&applied).unwrap().to_string(), d.to_string());
    }

    #[test]
    fn map_pos_boundary_rules() {
        // del(2..5) ins("xy") over "abcdefgh"
        let cs = set(vec![Change::replace(2, 5, doc("xy"))], 8);
        assert_eq!(cs.map_pos(2, -1), 2);
        assert_eq!(cs.map_pos(2, 1), 4);
        assert_eq!(cs.map_pos(5, -1), 2);
        assert_eq!(cs.map_pos(5, 1), 4);
        assert_eq!(cs.map_pos(0, 1), 0);
        assert_eq!(cs.map_pos(8, -1), 7);
        // Positions strictly inside the deletion report None under TrackDel.
        for pos in 3..5 {
            assert_eq!(cs.map_pos_tracked(pos, -1, MapMode::TrackDel), None);
        }
        // The deletion start itself counts as deleted content.
        assert_eq!(cs.map_pos_tracked(2, -1, MapMode::TrackDel), None);
        assert_eq!(cs.map_pos_tracked(5, -1, MapMode::TrackDel), Some(2));
        assert_eq!(cs.map_pos_tracked(5, -1, MapMode::TrackBefore), None);
        assert_eq!(cs.map_pos_tracked(2, -1, MapMode::TrackBefore), Some(2));
        assert_eq!(cs.map_pos_tracked(2, 1, MapMode::TrackAfter), None);
        assert_eq!(cs.map_pos_tracked(5, 1, MapMode::TrackAfter), Some(4));
    }

    #[test]
    fn map_pos_around_pure_insertion() {
        let cs = set(vec![Change::insert(3, doc("ab"))], 6);
        assert_eq!(cs.map_pos(3, -1), 3);
        assert_eq!(cs.map_pos(3, 1), 5);
        assert_eq!(cs.map_pos(2, 1), 2);
        assert_eq!(cs.map_pos(4, -1), 6);
        // Nothing was deleted, so tracking modes still map.
        assert_eq!(cs.map_pos_tracked(3, -1, MapMode::TrackDel), Some(3));
        assert_eq!(cs.map_pos_tracked(3, 1, MapMode::TrackAfter), Some(5));
    }

    #[test]
    fn map_expresses_changes_against_other_edit() {
        let d = doc("abcdef");
        let a = set(vec![Change::insert(2, doc("X"))], 6);
        let b = set(vec![Change::delete(4, 6)], 6);
        // a mapped over b applies to b's output.
        let a_over_b = a.map(b.desc(), false).unwrap();
        assert_eq!(a_over_b.len(), b.new_len());
        let via_b = a_over_b.apply(&b.apply(&d).unwrap()).unwrap();
        assert_eq!(via_b.to_string(), "abXcd");
    }

    #[test]
    fn map_satisfies_rebase_identity() {
        let d = doc("hello world");
        let a = set(vec![Change::replace(0, 5, doc("goodbye"))], 11);
        let b = set(vec![Change::insert(5, doc("!"))], 11);
        let left = a.compose(&b.map(a.desc(), false).unwrap()).unwrap();
        let right = b.compose(&a.map(b.desc(), true).unwrap()).unwrap();
        assert_eq!(
            left.apply(&d).unwrap().to_string(),
            right.apply(&d).unwrap().to_string()
        );
    }

    #[test]
    fn insertion_ties_respect_before_flag() {
        let d = doc("abc");
        let a = set(vec![Change::insert(1, doc("A"))], 3);
        let b = set(vec![Change::insert(1, doc("B"))], 3);
        let a_first = a.compose(&b.map(a.desc(), false).unwrap()).unwrap();
        assert_eq!(a_first.apply(&d).unwrap().to_string(), "aABbc");
        let b_first = b.compose(&a.map(b.desc(), false).unwrap()).unwrap();
        assert_eq!(b_first.apply(&d).unwrap().to_string(), "aBAbc");
    }

    #[test]
    fn iter_changes_reports_regions_in_both_coordinate_spaces() {
        let cs = set(
            vec![Change::replace(1, 3, doc("XYZ")), Change::delete(5, 6)],
            8,
        );
        let regions: Vec<_> = cs.iter_changes().collect();
        assert_eq!(regions.len(), 2);
        assert_eq!(
            (regions[0].from_a, regions[0].to_a, regions[0].from_b, regions[0].to_b),
            (1, 3, 1, 4)
        );
        assert_eq!(regions[0].inserted.to_string(), "XYZ");
        assert_eq!(
            (regions[1].from_a, regions[1].to_a, regions[1].from_b, regions[1].to_b),
            (5, 6, 6, 6)
        );
    }

    #[test]
    fn touches_range_reports_coverage() {
        let cs = set(vec![Change::replace(2, 6, doc("x"))], 8);
        assert_eq!(cs.touches_range(0, 1), Touched::No);
        assert_eq!(cs.touches_range(0, 2), Touched::Yes);
        assert_eq!(cs.touches_range(3, 4), Touched::Covered);
        assert_eq!(cs.touches_range(6, 8), Touched::Yes);
        assert_eq!(cs.touches_range(7, 8), Touched::No);
    }

    #[test]
    fn json_round_trips() {
        let cs = set(
            vec![
                Change::replace(1, 3, doc("two\nlines")),
                Change::delete(5, 7),
                Change::insert(8, doc("end")),
            ],
            10,
        );
        let back = ChangeSet::from_json(&cs.to_json()).unwrap();
        assert_eq!(cs, back);
        assert!(ChangeSet::from_json(&serde_json::json!("nope")).is_err());
    }

    #[test]
    fn split_by_ranges_partitions_changes() {
        let cs = set(
            vec![Change::insert(1, doc("a")), Change::insert(5, doc("b"))],
            8,
        );
        let (kept, dropped) = cs.split_by_ranges(&[(0, 3)]).unwrap();
        let d = doc("01234567");
        assert_eq!(kept.apply(&d).unwrap().to_string(), "0a1234567");
        assert_eq!(dropped.apply(&d).unwrap().to_string(), "01234b567");
    }

    #[test]
    fn inverted_desc_swaps_roles() {
        let cs = set(vec![Change::replace(2, 5, doc("xy"))], 8);
        let inv = cs.desc().inverted();
        assert_eq!(inv.len(), cs.new_len());
        assert_eq!(inv.new_len(), cs.len());
        // Mapping a position through the edit and back is identity outside
        // the changed region.
        for pos in [0, 1, 6, 7] {
            let mapped = cs.map_pos(pos, 1);
            assert_eq!(inv.map_pos(mapped, 1), pos);
        }
    }
}
