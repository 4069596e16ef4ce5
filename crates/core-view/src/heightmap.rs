//! Vertical layout bookkeeping: estimated and measured block heights.
//!
//! The height map partitions the document into entries — text lines, gaps of
//! not-yet-measured lines, and widget blocks — held in a balanced tree whose
//! nodes cache exact length and height sums, so queries by document position
//! or by vertical pixel both run in `O(log N)`. Entries carry a `measured`
//! flag separating renderer-reported pixel heights from oracle estimates.
//!
//! Edits rebuild the affected entries from the decoration sets covering the
//! changed range (a block widget straddling a change boundary is always
//! rebuilt whole, never partially spliced); everything outside the extended
//! region is kept as-is.

use std::sync::Arc;

use core_text::Text;

use crate::decoration::{BlockType, Decoration, DecorationSet};
use crate::update::ChangedRange;

/// Estimates for unmeasured content, refreshed from renderer measurements.
#[derive(Debug, Clone, PartialEq)]
pub struct HeightOracle {
    pub line_height: f64,
    pub char_width: f64,
    /// Estimated characters per line, used when wrapping.
    pub line_length: f64,
    pub line_wrapping: bool,
}

impl Default for HeightOracle {
    fn default() -> Self {
        HeightOracle {
            line_height: 14.0,
            char_width: 7.0,
            line_length: 30.0,
            line_wrapping: false,
        }
    }
}

impl HeightOracle {
    pub fn new(line_height: f64) -> HeightOracle {
        HeightOracle {
            line_height,
            ..Default::default()
        }
    }

    /// Estimated height of a line of `length` code units.
    pub fn height_for_line(&self, length: usize) -> f64 {
        if !self.line_wrapping {
            self.line_height
        } else {
            let rows = (length as f64 / self.line_length).ceil().max(1.0);
            rows * self.line_height
        }
    }

    /// Adopt new measurements; reports whether estimates changed enough that
    /// existing estimated heights should be rebuilt.
    pub fn refresh(
        &mut self,
        line_height: f64,
        char_width: f64,
        line_length: f64,
        line_wrapping: bool,
    ) -> bool {
        let changed = (self.line_height - line_height).abs() > 0.1
            || (self.char_width - char_width).abs() > 0.1
            || (self.line_length - line_length).abs() > 1.0
            || self.line_wrapping != line_wrapping;
        self.line_height = line_height;
        self.char_width = char_width;
        self.line_length = line_length;
        self.line_wrapping = line_wrapping;
        changed
    }
}

/// Pixel heights reported by a renderer for consecutive blocks starting at a
/// document position.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasuredHeights {
    pub from: usize,
    pub heights: Vec<f64>,
}

/// One block of vertical layout.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockInfo {
    pub from: usize,
    pub length: usize,
    pub top: f64,
    pub height: f64,
    pub block_type: BlockType,
}

impl BlockInfo {
    pub fn to(&self) -> usize {
        self.from + self.length
    }

    pub fn bottom(&self) -> f64 {
        self.top + self.height
    }
}

/// Height or position query selector.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QueryType {
    ByPos(usize),
    ByHeight(f64),
}

#[derive(Debug, Clone, PartialEq)]
enum EntryKind {
    /// One line of text (or the tail of a line split by a range widget);
    /// covers its trailing newline when one follows.
    Line,
    /// A run of whole unmeasured lines sharing one estimate.
    Gap { lines: usize },
    /// A widget block.
    Widget(BlockType),
}

#[derive(Debug, Clone, PartialEq)]
struct Entry {
    kind: EntryKind,
    length: usize,
    height: f64,
    measured: bool,
}

impl Entry {
    fn line(length: usize, height: f64) -> Entry {
        Entry {
            kind: EntryKind::Line,
            length,
            height,
            measured: false,
        }
    }
}

#[derive(Debug)]
enum HNode {
    Leaf {
        entries: Vec<Entry>,
        length: usize,
        height: f64,
    },
    Branch {
        children: Vec<HeightMap>,
        length: usize,
        height: f64,
    },
}

/// The height tree. Immutable; edits and measurements return new maps.
#[derive(Debug, Clone)]
pub struct HeightMap(Arc<HNode>);

const LEAF_ENTRIES: usize = 16;

impl HeightMap {
    /// A map for the empty document: one zero-length unmeasured line.
    pub fn empty(oracle: &HeightOracle) -> HeightMap {
        Self::from_entries(vec![Entry::line(0, oracle.height_for_line(0))])
    }

    /// Build estimates for a whole document.
    pub fn for_doc(
        oracle: &HeightOracle,
        doc: &Text,
        decorations: &[&DecorationSet],
    ) -> HeightMap {
        let mut entries = build_entries(oracle, doc, decorations, 0, doc.len());
        if entries.is_empty() {
            entries.push(Entry::line(0, oracle.height_for_line(0)));
        }
        Self::from_entries(entries)
    }

    pub fn length(&self) -> usize {
        match &*self.0 {
            HNode::Leaf { length, .. } | HNode::Branch { length, .. } => *length,
        }
    }

    pub fn height(&self) -> f64 {
        match &*self.0 {
            HNode::Leaf { height, .. } | HNode::Branch { height, .. } => *height,
        }
    }

    /// Whether any block still carries an estimated (unmeasured) height.
    pub fn must_measure(&self) -> bool {
        match &*self.0 {
            HNode::Leaf { entries, .. } => entries.iter().any(|e| !e.measured),
            HNode::Branch { children, .. } => children.iter().any(HeightMap::must_measure),
        }
    }

    /// The line (or covering widget block) at a position or height.
    ///
    /// Height queries at an exact block boundary resolve to the later block;
    /// out-of-range values clamp to the first or last block.
    pub fn line_at(&self, query: QueryType, doc: &Text) -> BlockInfo {
        let (entry, start, top) = match query {
            QueryType::ByPos(pos) => self.entry_at_pos(pos.min(self.length()), 0, 0.0),
            QueryType::ByHeight(h) => self.entry_at_height(h.max(0.0), 0, 0.0),
        };
        entry_block(&entry, start, top, query, doc)
    }

    /// Like [`Self::line_at`] by height, returning widget blocks as such.
    pub fn block_at(&self, height: f64, doc: &Text) -> BlockInfo {
        self.line_at(QueryType::ByHeight(height), doc)
    }

    /// Visit every line block intersecting `[from, to]` in order.
    pub fn for_each_line(&self, from: usize, to: usize, doc: &Text, f: &mut dyn FnMut(BlockInfo)) {
        let mut block = self.line_at(QueryType::ByPos(from), doc);
        loop {
            f(block.clone());
            if block.to() >= to || block.to() >= self.length() {
                break;
            }
            let next_pos = block.to() + 1;
            block = self.line_at(QueryType::ByPos(next_pos), doc);
        }
    }

    /// Record measured block heights, replacing estimates. Gaps covering the
    /// measured region are split into measured lines.
    pub fn update_height(&self, doc: &Text, measured: &MeasuredHeights) -> HeightMap {
        if measured.heights.is_empty() {
            return self.clone();
        }
        let entries = self.flatten();
        let mut out: Vec<Entry> = Vec::with_capacity(entries.len());
        let mut pos = 0usize;
        let mut heights = measured.heights.iter().copied().peekable();
        let mut cursor = measured.from;
        for entry in entries {
            let end = pos + entry.length;
            let touches = heights.peek().is_some() && cursor < end.max(pos + 1) && cursor >= pos;
            if !touches || heights.peek().is_none() {
                out.push(entry);
                pos = end;
                continue;
            }
            match entry.kind {
                EntryKind::Widget(_) => {
                    let mut e = entry;
                    if let Some(h) = heights.next() {
                        e.height = h;
                        e.measured = true;
                    }
                    cursor = end;
                    out.push(e);
                }
                EntryKind::Line => {
                    let mut e = entry;
                    if let Some(h) = heights.next() {
                        e.height = h;
                        e.measured = true;
                    }
                    cursor = end;
                    out.push(e);
                }
                EntryKind::Gap { lines } => {
                    // Split the gap: estimated prefix, measured lines, and an
                    // estimated suffix for whatever the measurements did not
                    // reach.
                    let per_line = entry.height / lines as f64;
                    let first_line = doc.line_at(pos).expect("entry within doc");
                    let cursor_line = doc.line_at(cursor).expect("cursor within doc");
                    let prefix_lines = cursor_line.number - first_line.number;
                    if prefix_lines > 0 {
                        out.push(Entry {
                            kind: EntryKind::Gap { lines: prefix_lines },
                            length: cursor_line.from - pos,
                            height: per_line * prefix_lines as f64,
                            measured: false,
                        });
                    }
                    let mut line = cursor_line;
                    let mut consumed = prefix_lines;
                    while consumed < lines {
                        let Some(h) = heights.next() else { break };
                        let entry_end = (line.to + 1).min(end);
                        out.push(Entry {
                            kind: EntryKind::Line,
                            length: entry_end - line.from,
                            height: h,
                            measured: true,
                        });
                        consumed += 1;
                        cursor = entry_end;
                        if entry_end >= end || cursor >= doc.len() {
                            break;
                        }
                        line = doc.line_at(cursor).expect("cursor within doc");
                    }
                    if consumed < lines {
                        let rest = lines - consumed;
                        out.push(Entry {
                            kind: EntryKind::Gap { lines: rest },
                            length: end - cursor,
                            height: per_line * rest as f64,
                            measured: false,
                        });
                        cursor = end;
                    }
                }
            }
            pos = end;
        }
        Self::from_entries(out)
    }

    /// Rebuild the regions affected by an edit from the decoration sets and
    /// the new document, keeping all untouched entries.
    pub fn apply_changes(
        &self,
        decorations: &[&DecorationSet],
        oracle: &HeightOracle,
        new_doc: &Text,
        changes: &[ChangedRange],
    ) -> HeightMap {
        if changes.is_empty() {
            return self.clone();
        }
        let mut entries = self.flatten();
        for change in changes.iter().rev() {
            // Extend the replaced region to whole entries on the A side and
            // carry the extension over to the B side. Zero-length widget
            // entries sitting exactly on a boundary are absorbed so the
            // rebuild (which re-emits them from the decoration sets) does not
            // duplicate them.
            let (mut start_idx, start_pos) = entry_index_at(&entries, change.from_a);
            let (mut end_idx, mut end_pos) = entry_index_at(&entries, change.to_a);
            if end_idx < entries.len() {
                end_pos += entries[end_idx].length;
                end_idx += 1;
            }
            while start_idx > 0 && entries[start_idx - 1].length == 0 {
                start_idx -= 1;
            }
            while end_idx < entries.len() && entries[end_idx].length == 0 {
                end_idx += 1;
            }
            let from_b = change.from_b - (change.from_a - start_pos);
            let to_b = change.to_b + (end_pos - change.to_a);
            let mut new_entries = build_entries(oracle, new_doc, decorations, from_b, to_b);
            if new_entries.is_empty() && entries.is_empty() {
                new_entries.push(Entry::line(0, oracle.height_for_line(0)));
            }
            entries.splice(start_idx..end_idx, new_entries);
            tracing::trace!(
                from_a = change.from_a,
                to_a = change.to_a,
                "rebuilt height entries for changed range"
            );
        }
        if entries.is_empty() {
            entries.push(Entry::line(0, oracle.height_for_line(0)));
        }
        Self::from_entries(entries)
    }

    fn from_entries(entries: Vec<Entry>) -> HeightMap {
        if entries.len() <= LEAF_ENTRIES {
            let length = entries.iter().map(|e| e.length).sum();
            let height = entries.iter().map(|e| e.height).sum();
            return HeightMap(Arc::new(HNode::Leaf {
                entries,
                length,
                height,
            }));
        }
        let mid = entries.len() / 2;
        let mut left = entries;
        let right = left.split_off(mid);
        let children = vec![Self::from_entries(left), Self::from_entries(right)];
        let length = children.iter().map(HeightMap::length).sum();
        let height = children.iter().map(HeightMap::height).sum();
        HeightMap(Arc::new(HNode::Branch {
            children,
            length,
            height,
        }))
    }

    fn flatten(&self) -> Vec<Entry> {
        let mut out = Vec::new();
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into(&self, out: &mut Vec<Entry>) {
        match &*self.0 {
            HNode::Leaf { entries, .. } => out.extend(entries.iter().cloned()),
            HNode::Branch { children, .. } => {
                for child in children {
                    child.flatten_into(out);
                }
            }
        }
    }

    /// The entry containing `pos`; a position at a boundary belongs to the
    /// later entry (skipping zero-length widgets unless `pos` is exactly at
    /// the end of the document).
    fn entry_at_pos(&self, pos: usize, offset: usize, top: f64) -> (Entry, usize, f64) {
        match &*self.0 {
            HNode::Leaf { entries, .. } => {
                let mut start = offset;
                let mut t = top;
                for (i, entry) in entries.iter().enumerate() {
                    let end = start + entry.length;
                    let last = i == entries.len() - 1;
                    if pos < end || (last && pos <= end) {
                        return (entry.clone(), start, t);
                    }
                    start = end;
                    t += entry.height;
                }
                let entry = entries.last().expect("leaf never empty").clone();
                let len = entry.length;
                (entry, start - len, t - entries.last().expect("leaf").height)
            }
            HNode::Branch { children, .. } => {
                let mut start = offset;
                let mut t = top;
                for (i, child) in children.iter().enumerate() {
                    let end = start + child.length();
                    let last = i == children.len() - 1;
                    if pos < end || (last && pos <= end) {
                        return child.entry_at_pos(pos, start, t);
                    }
                    start = end;
                    t += child.height();
                }
                unreachable!("position clamped to map length")
            }
        }
    }

    /// The entry containing vertical offset `h`; exact boundaries resolve to
    /// the later entry, and heights past the end clamp to the last entry.
    fn entry_at_height(&self, h: f64, offset: usize, top: f64) -> (Entry, usize, f64) {
        match &*self.0 {
            HNode::Leaf { entries, .. } => {
                let mut start = offset;
                let mut t = top;
                for (i, entry) in entries.iter().enumerate() {
                    let bottom = t + entry.height;
                    let last = i == entries.len() - 1;
                    if h < bottom || last {
                        return (entry.clone(), start, t);
                    }
                    start += entry.length;
                    t = bottom;
                }
                unreachable!("leaf never empty")
            }
            HNode::Branch { children, .. } => {
                let mut start = offset;
                let mut t = top;
                for (i, child) in children.iter().enumerate() {
                    let bottom = t + child.height();
                    let last = i == children.len() - 1;
                    if h < bottom || last {
                        return child.entry_at_height(h, start, t);
                    }
                    start += child.length();
                    t = bottom;
                }
                unreachable!("branch never empty")
            }
        }
    }
}

/// Resolve an entry hit into a [`BlockInfo`], expanding gaps to the line the
/// query addressed.
fn entry_block(
    entry: &Entry,
    start: usize,
    top: f64,
    query: QueryType,
    doc: &Text,
) -> BlockInfo {
    match entry.kind {
        EntryKind::Widget(block_type) => BlockInfo {
            from: start,
            length: entry.length,
            top,
            height: entry.height,
            block_type,
        },
        EntryKind::Line => {
            let line = doc
                .line_at(start.min(doc.len()))
                .expect("entry start within doc");
            let from = start.max(line.from);
            let to = line.to.min(start + entry.length);
            BlockInfo {
                from,
                length: to.saturating_sub(from),
                top,
                height: entry.height,
                block_type: BlockType::Text,
            }
        }
        EntryKind::Gap { lines } => {
            let per_line = entry.height / lines as f64;
            let first = doc.line_at(start).expect("entry start within doc");
            let line = match query {
                QueryType::ByPos(pos) => doc
                    .line_at(pos.min(doc.len()))
                    .expect("query position within doc"),
                QueryType::ByHeight(h) => {
                    let idx = (((h - top) / per_line).floor() as isize)
                        .clamp(0, lines as isize - 1) as usize;
                    doc.line(first.number + idx).expect("line within gap")
                }
            };
            let idx = line.number - first.number;
            BlockInfo {
                from: line.from,
                length: line.to - line.from,
                top: top + per_line * idx as f64,
                height: per_line,
                block_type: BlockType::Text,
            }
        }
    }
}

/// Index and start offset of the entry containing `pos`.
fn entry_index_at(entries: &[Entry], pos: usize) -> (usize, usize) {
    let mut start = 0;
    for (i, entry) in entries.iter().enumerate() {
        let end = start + entry.length;
        if pos < end || (pos == end && i == entries.len() - 1) {
            return (i, start);
        }
        start = end;
    }
    (entries.len().saturating_sub(1), start.saturating_sub(
        entries.last().map(|e| e.length).unwrap_or(0),
    ))
}

/// Build fresh estimated entries for `[from, to)` of `doc`, honoring the
/// block decorations in `decorations`.
fn build_entries(
    oracle: &HeightOracle,
    doc: &Text,
    decorations: &[&DecorationSet],
    from: usize,
    to: usize,
) -> Vec<Entry> {
    let mut blocks: Vec<(usize, usize, Decoration)> = Vec::new();
    for set in decorations {
        set.between(from, to, |bf, bt, deco| {
            // A non-empty block starting exactly at the region end belongs to
            // the entries outside it; a zero-width one on the boundary is ours.
            if deco.is_block() && (bf < to || (bf == to && bt == bf)) {
                blocks.push((bf, bt, deco.clone()));
            }
            true
        });
    }
    blocks.sort_by_key(|(bf, bt, _)| (*bf, *bt));

    let mut out = Vec::new();
    let mut pos = from;
    for (bf, bt, deco) in blocks {
        let bf = bf.clamp(from, to);
        let bt = bt.clamp(from, to);
        if bf < pos {
            continue; // nested inside an already-emitted block
        }
        if bf > pos {
            text_entries(oracle, doc, pos, bf, &mut out);
        }
        let block_type = deco.block_type().expect("is_block implies a block type");
        out.push(Entry {
            kind: EntryKind::Widget(block_type),
            length: bt - bf,
            height: deco
                .estimated_height()
                .unwrap_or(oracle.line_height),
            measured: false,
        });
        pos = bt;
    }
    if pos < to {
        text_entries(oracle, doc, pos, to, &mut out);
    }
    out
}

/// Per-line entries covering `[from, to)`. A tail piece holding only a line's
/// terminating newline (the text being covered by a preceding range widget)
/// contributes no height of its own.
fn text_entries(oracle: &HeightOracle, doc: &Text, from: usize, to: usize, out: &mut Vec<Entry>) {
    let mut pos = from;
    while pos < to {
        let line = doc.line_at(pos).expect("position within doc");
        let entry_end = (line.to + 1).min(to);
        let visible = line.to.min(entry_end).saturating_sub(pos);
        let height = if visible == 0 && pos > line.from {
            0.0
        } else {
            oracle.height_for_line(line.to - line.from)
        };
        out.push(Entry::line(entry_end - pos, height));
        pos = entry_end;
    }
}
