//! Persistent document rope.
//!
//! A document is a balanced tree over whole lines. Leaves hold up to
//! [`BRANCH`] line strings totalling at most [`MAX_LEAF_LEN`] UTF-16 units
//! (single lines longer than the cap still occupy one leaf, since lines are
//! atomic); branches hold 2..=[`BRANCH`] children with cached totals. Children
//! never share a line: every child boundary is an implicit newline, so a
//! branch's length is the sum of its children's lengths plus `children - 1`
//! seam newlines, while its line count is the plain sum of child line counts.
//!
//! Nodes are immutable. `replace` decomposes the untouched prefix and suffix
//! into parts (reusing whole subtrees wherever the cut does not intersect
//! them), splices the replacement's parts in between, and re-packs the result,
//! keeping depth logarithmic in the line count for any edit sequence.

use std::cmp::max;
use std::sync::{Arc, OnceLock};

use crate::cursor::{Direction, LinesCursor, RangeCursor, RawCursor};
use crate::{TextError, utf16};

/// Maximum lines per leaf and children per branch.
pub(crate) const BRANCH: usize = 32;
/// Soft cap on the UTF-16 length of a leaf assembled from short lines.
pub(crate) const MAX_LEAF_LEN: usize = 512;

const OPEN_FROM: u8 = 1;
const OPEN_TO: u8 = 2;

#[derive(Debug)]
pub(crate) enum Node {
    Leaf { lines: Vec<String>, len: usize },
    Branch { children: Vec<Text>, len: usize, lines: usize },
}

/// An immutable document: a sequence of UTF-16 code units with line structure.
///
/// Cloning is cheap (a reference-count bump); edits return new documents that
/// share all untouched subtrees with their source.
#[derive(Clone)]
pub struct Text(pub(crate) Arc<Node>);

/// One document line, with its absolute extent and 1-based number.
///
/// `to - from` is the line's length; the terminating newline (if any) sits at
/// `to` and belongs to no line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Line {
    pub from: usize,
    pub to: usize,
    pub number: usize,
    pub text: String,
}

impl Line {
    /// Length of the line in UTF-16 code units, excluding the newline.
    pub fn len(&self) -> usize {
        self.to - self.from
    }

    pub fn is_empty(&self) -> bool {
        self.from == self.to
    }
}

#[derive(Clone, Copy)]
enum LineQuery {
    ByPos(usize),
    ByNumber(usize),
}

impl Text {
    /// The empty document: a single empty line, length zero.
    pub fn empty() -> Text {
        static EMPTY: OnceLock<Text> = OnceLock::new();
        EMPTY
            .get_or_init(|| Text::leaf(vec![String::new()], 0))
            .clone()
    }

    /// Build a document from a non-empty list of line strings.
    ///
    /// The strings must not contain newlines (the line structure is the list
    /// itself). An empty list is rejected with [`TextError::EmptyInput`];
    /// a document always has at least one (possibly empty) line.
    pub fn of<I, S>(lines: I) -> Result<Text, TextError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        if lines.is_empty() {
            return Err(TextError::EmptyInput);
        }
        let mut parts = Vec::new();
        split_lines(lines, &mut parts);
        let len = parts.iter().map(Text::len).sum::<usize>() + parts.len() - 1;
        Ok(from_parts(parts, len))
    }

    /// Length of the document in UTF-16 code units.
    pub fn len(&self) -> usize {
        match &*self.0 {
            Node::Leaf { len, .. } => *len,
            Node::Branch { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of lines in the document (always at least 1).
    pub fn lines(&self) -> usize {
        match &*self.0 {
            Node::Leaf { lines, .. } => lines.len(),
            Node::Branch { lines, .. } => *lines,
        }
    }

    /// Look up a line by 1-based number.
    pub fn line(&self, n: usize) -> Result<Line, TextError> {
        if n < 1 || n > self.lines() {
            return Err(TextError::OutOfRange {
                what: "line number",
                value: n,
                max: self.lines(),
            });
        }
        Ok(self.line_inner(LineQuery::ByNumber(n), 0, 1))
    }

    /// Look up the line containing a document position.
    ///
    /// A position sitting on a newline belongs to the line the newline
    /// terminates.
    pub fn line_at(&self, pos: usize) -> Result<Line, TextError> {
        if pos > self.len() {
            return Err(TextError::OutOfRange {
                what: "position",
                value: pos,
                max: self.len(),
            });
        }
        Ok(self.line_inner(LineQuery::ByPos(pos), 0, 1))
    }

    fn line_inner(&self, query: LineQuery, offset: usize, first_number: usize) -> Line {
        match &*self.0 {
            Node::Leaf { lines, .. } => {
                let mut pos = offset;
                let mut number = first_number;
                for line in lines {
                    let end = pos + utf16::len(line);
                    let hit = match query {
                        LineQuery::ByPos(p) => p <= end,
                        LineQuery::ByNumber(n) => n == number,
                    };
                    if hit {
                        return Line {
                            from: pos,
                            to: end,
                            number,
                            text: line.clone(),
                        };
                    }
                    pos = end + 1;
                    number += 1;
                }
                unreachable!("line query validated against document bounds")
            }
            Node::Branch { children, .. } => {
                let mut pos = offset;
                let mut number = first_number;
                for child in children {
                    let end = pos + child.len();
                    let hit = match query {
                        LineQuery::ByPos(p) => p <= end,
                        LineQuery::ByNumber(n) => n < number + child.lines(),
                    };
                    if hit {
                        return child.line_inner(query, pos, number);
                    }
                    pos = end + 1;
                    number += child.lines();
                }
                unreachable!("line query validated against document bounds")
            }
        }
    }

    /// Replace the range `[from, to)` with another document.
    pub fn replace(&self, from: usize, to: usize, replacement: &Text) -> Result<Text, TextError> {
        if from > to {
            return Err(TextError::OutOfRange {
                what: "range start",
                value: from,
                max: to,
            });
        }
        if to > self.len() {
            return Err(TextError::OutOfRange {
                what: "range end",
                value: to,
                max: self.len(),
            });
        }
        let mut parts = Vec::new();
        self.decompose(0, from as isize, &mut parts, OPEN_TO);
        if replacement.len() > 0 {
            replacement.decompose(
                0,
                replacement.len() as isize,
                &mut parts,
                OPEN_FROM | OPEN_TO,
            );
        }
        self.decompose(to as isize, self.len() as isize, &mut parts, OPEN_FROM);
        Ok(from_parts(parts, self.len() - (to - from) + replacement.len()))
    }

    /// Append another document to this one.
    pub fn append(&self, other: &Text) -> Text {
        self.replace(self.len(), self.len(), other)
            .expect("append range is the document end")
    }

    /// Extract the sub-document covering `[from, to)`.
    pub fn slice(&self, from: usize, to: usize) -> Result<Text, TextError> {
        if from > to {
            return Err(TextError::OutOfRange {
                what: "range start",
                value: from,
                max: to,
            });
        }
        if to > self.len() {
            return Err(TextError::OutOfRange {
                what: "range end",
                value: to,
                max: self.len(),
            });
        }
        let mut parts = Vec::new();
        self.decompose(from as isize, to as isize, &mut parts, 0);
        Ok(from_parts(parts, to - from))
    }

    /// Extract `[from, to)` as a string, rendering line breaks as `line_sep`.
    pub fn slice_string(
        &self,
        from: usize,
        to: usize,
        line_sep: &str,
    ) -> Result<String, TextError> {
        if from > to || to > self.len() {
            return Err(TextError::OutOfRange {
                what: "range",
                value: from.max(to),
                max: self.len(),
            });
        }
        let mut out = String::new();
        for chunk in self.iter_range(from, to) {
            match chunk {
                crate::cursor::Chunk::Text(s) => out.push_str(s),
                crate::cursor::Chunk::LineBreak => out.push_str(line_sep),
            }
        }
        Ok(out)
    }

    /// Iterate the document's chunks front to back.
    pub fn iter(&self) -> RawCursor<'_> {
        RawCursor::new(self, Direction::Forward)
    }

    /// Iterate the document's chunks in the given direction.
    pub fn iter_dir(&self, dir: Direction) -> RawCursor<'_> {
        RawCursor::new(self, dir)
    }

    /// Iterate the chunks covering `[from, to)`. When `from > to`, iteration
    /// runs backward over `[to, from)`. Positions are clamped to the document.
    pub fn iter_range(&self, from: usize, to: usize) -> RangeCursor<'_> {
        RangeCursor::new(self, from.min(self.len()), to.min(self.len()))
    }

    /// Iterate whole lines in `[from_line, to_line)` (1-based, clamped).
    /// Defaults cover the entire document when called as `iter_lines(1, lines + 1)`.
    pub fn iter_lines(&self, from_line: usize, to_line: usize) -> LinesCursor<'_> {
        LinesCursor::new(self, from_line, to_line)
    }

    /// Structural equality: true when both documents hold the same character
    /// sequence, regardless of tree shape.
    pub fn eq_text(&self, other: &Text) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        if self.len() != other.len() || self.lines() != other.lines() {
            return false;
        }
        let mut a = RawCursor::new(self, Direction::Forward);
        let mut b = RawCursor::new(other, Direction::Forward);
        loop {
            match (a.advance_line(), b.advance_line()) {
                (None, None) => return true,
                (Some(x), Some(y)) if x == y => {}
                _ => return false,
            }
        }
    }

    /// The document's lines as owned strings.
    pub fn to_lines(&self) -> Vec<String> {
        let mut out = Vec::with_capacity(self.lines());
        self.flatten_into(&mut out);
        out
    }

    /// Canonical JSON form: an array of line strings.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Array(
            self.to_lines()
                .into_iter()
                .map(serde_json::Value::String)
                .collect(),
        )
    }

    /// Rebuild a document from its JSON form.
    pub fn from_json(value: &serde_json::Value) -> Result<Text, TextError> {
        let arr = value
            .as_array()
            .ok_or_else(|| TextError::InvalidJson("expected an array of lines".into()))?;
        let mut lines = Vec::with_capacity(arr.len());
        for entry in arr {
            let s = entry
                .as_str()
                .ok_or_else(|| TextError::InvalidJson("expected a string line".into()))?;
            lines.push(s.to_owned());
        }
        Text::of(lines)
    }

    pub(crate) fn flatten_into(&self, out: &mut Vec<String>) {
        match &*self.0 {
            Node::Leaf { lines, .. } => out.extend(lines.iter().cloned()),
            Node::Branch { children, .. } => {
                for child in children {
                    child.flatten_into(out);
                }
            }
        }
    }

    /// Depth of the tree; used by the balance tests.
    #[doc(hidden)]
    pub fn depth(&self) -> usize {
        match &*self.0 {
            Node::Leaf { .. } => 0,
            Node::Branch { children, .. } => {
                1 + children.iter().map(Text::depth).max().unwrap_or(0)
            }
        }
    }

    fn leaf(lines: Vec<String>, len: usize) -> Text {
        debug_assert_eq!(
            len,
            lines.iter().map(|l| utf16::len(l)).sum::<usize>() + lines.len() - 1
        );
        Text(Arc::new(Node::Leaf { lines, len }))
    }

    fn leaf_measured(lines: Vec<String>) -> Text {
        let len = lines.iter().map(|l| utf16::len(l)).sum::<usize>() + lines.len() - 1;
        Text(Arc::new(Node::Leaf { lines, len }))
    }

    fn branch(children: Vec<Text>, len: usize) -> Text {
        let lines = children.iter().map(Text::lines).sum();
        Text(Arc::new(Node::Branch {
            children,
            len,
            lines,
        }))
    }

    /// Split `[from, to)` out of this subtree into `target`, reusing whole
    /// subtrees where possible. An `OPEN_FROM` part is glued line-wise onto the
    /// part before it (the cut falls mid-line); `OPEN_TO` marks a part whose
    /// end is similarly open. Offsets may run negative in recursion.
    fn decompose(&self, from: isize, to: isize, target: &mut Vec<Text>, open: u8) {
        match &*self.0 {
            Node::Leaf { lines, len } => {
                let piece = if from <= 0 && to >= *len as isize {
                    self.clone()
                } else {
                    let clip_from = max(0, from) as usize;
                    let clip_to = max(0, to.min(*len as isize)) as usize;
                    let mut out = vec![String::new()];
                    append_lines(lines, &mut out, clip_from, clip_to);
                    Text::leaf(out, clip_to.saturating_sub(clip_from))
                };
                if open & OPEN_FROM != 0 {
                    // The preceding part always ends in a leaf: branch children
                    // cut at `from`/`to` recurse down to leaf level before
                    // being pushed (see the branch arm below).
                    let prev = target.pop().expect("open part follows a pushed part");
                    let Node::Leaf {
                        lines: prev_lines,
                        len: prev_len,
                    } = &*prev.0
                    else {
                        unreachable!("open part must follow a leaf")
                    };
                    let Node::Leaf {
                        lines: piece_lines,
                        len: piece_len,
                    } = &*piece.0
                    else {
                        unreachable!("clipped leaf piece")
                    };
                    let mut joined = prev_lines.clone();
                    append_lines(piece_lines, &mut joined, 0, *piece_len);
                    if joined.len() <= BRANCH {
                        target.push(Text::leaf(joined, *prev_len + *piece_len));
                    } else {
                        let right = joined.split_off(joined.len() / 2);
                        target.push(Text::leaf_measured(joined));
                        target.push(Text::leaf_measured(right));
                    }
                } else {
                    target.push(piece);
                }
            }
            Node::Branch { children, .. } => {
                let mut pos: isize = 0;
                for child in children {
                    if pos > to {
                        break;
                    }
                    let end = pos + child.len() as isize;
                    if to >= pos && from <= end {
                        let mut child_open = 0;
                        if pos <= from {
                            child_open |= OPEN_FROM;
                        }
                        if end >= to {
                            child_open |= OPEN_TO;
                        }
                        child_open &= open;
                        if pos >= from && end <= to && child_open == 0 {
                            target.push(child.clone());
                        } else {
                            child.decompose(from - pos, to - pos, target, child_open);
                        }
                    }
                    pos = end + 1;
                }
            }
        }
    }
}

impl std::fmt::Display for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, line) in self.to_lines().iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            f.write_str(line)?;
        }
        Ok(())
    }
}

impl std::fmt::Debug for Text {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Text({} units, {} lines)", self.len(), self.lines())
    }
}

impl PartialEq for Text {
    fn eq(&self, other: &Self) -> bool {
        self.eq_text(other)
    }
}

impl Eq for Text {}

impl From<&str> for Text {
    /// Split on `\n` and build a document; a string always yields at least one
    /// line, so this cannot fail.
    fn from(s: &str) -> Text {
        Text::of(s.split('\n')).expect("split produces at least one line")
    }
}

/// Append the lines of `src` clipped to the UTF-16 range `[from, to)` onto
/// `target`, gluing the first clipped line onto `target`'s last line.
/// `target` must be non-empty.
fn append_lines(src: &[String], target: &mut Vec<String>, from: usize, to: usize) {
    let mut pos = 0usize;
    let mut first = true;
    for line in src {
        if pos > to {
            break;
        }
        let end = pos + utf16::len(line);
        if end >= from {
            let piece = utf16::slice(line, from.saturating_sub(pos), to - pos);
            if first {
                target
                    .last_mut()
                    .expect("append target is seeded with one line")
                    .push_str(piece);
                first = false;
            } else {
                target.push(piece.to_owned());
            }
        }
        pos = end + 1;
    }
}

/// Pack whole lines into leaves, flushing at the line and length caps.
fn split_lines(lines: Vec<String>, target: &mut Vec<Text>) {
    let mut part: Vec<String> = Vec::new();
    let mut len: isize = -1;
    for line in lines {
        let line_len = utf16::len(&line) as isize;
        if !part.is_empty() && (part.len() == BRANCH || len + 1 + line_len > MAX_LEAF_LEN as isize)
        {
            target.push(Text::leaf(std::mem::take(&mut part), len as usize));
            len = -1;
        }
        len += 1 + line_len;
        part.push(line);
    }
    if !part.is_empty() {
        target.push(Text::leaf(part, len as usize));
    }
}

/// Assemble a tree from parts (each a well-formed subtree, adjacent parts
/// separated by implicit newlines). Small results collapse into a single leaf;
/// larger ones are grouped into chunks of roughly equal line counts so depth
/// stays logarithmic.
pub(crate) fn from_parts(parts: Vec<Text>, len: usize) -> Text {
    if len == 0 {
        return Text::empty();
    }
    if parts.len() == 1 {
        return parts.into_iter().next().expect("one part");
    }
    let lines: usize = parts.iter().map(Text::lines).sum();
    if lines < BRANCH {
        let mut flat = Vec::with_capacity(lines);
        for part in &parts {
            part.flatten_into(&mut flat);
        }
        return Text::leaf(flat, len);
    }
    let chunk = max(BRANCH, lines >> 5);
    let mut chunker = Chunker {
        chunk,
        max_chunk: chunk << 1,
        min_chunk: chunk >> 1,
        chunked: Vec::new(),
        current: Vec::new(),
        current_lines: 0,
        current_len: -1,
    };
    for part in parts {
        chunker.add(part);
    }
    chunker.flush();
    if chunker.chunked.len() == 1 {
        chunker.chunked.pop().expect("one chunk")
    } else {
        Text::branch(chunker.chunked, len)
    }
}

struct Chunker {
    chunk: usize,
    max_chunk: usize,
    min_chunk: usize,
    chunked: Vec<Text>,
    current: Vec<Text>,
    current_lines: usize,
    current_len: isize,
}

impl Chunker {
    fn add(&mut self, child: Text) {
        let child_lines = child.lines();
        if child_lines > self.max_chunk && matches!(&*child.0, Node::Branch { .. }) {
            let Node::Branch { children, .. } = &*child.0 else {
                unreachable!()
            };
            for sub in children.clone() {
                self.add(sub);
            }
        } else if child_lines > self.min_chunk
            && (self.current_lines > self.min_chunk || self.current_lines == 0)
        {
            self.flush();
            self.chunked.push(child);
        } else if let Some(merged) = self.merged_tail_leaf(&child) {
            self.current_lines += child_lines;
            self.current_len += child.len() as isize + 1;
            *self.current.last_mut().expect("merge requires a tail") = merged;
        } else {
            if self.current_lines + child_lines > self.chunk {
                self.flush();
            }
            self.current_lines += child_lines;
            self.current_len += child.len() as isize + 1;
            self.current.push(child);
        }
    }

    /// Merge a small leaf onto a small leaf at the tail of the current chunk,
    /// if both caps allow it.
    fn merged_tail_leaf(&self, child: &Text) -> Option<Text> {
        let Node::Leaf { lines, len } = &*child.0 else {
            return None;
        };
        let last = self.current.last()?;
        let Node::Leaf {
            lines: last_lines,
            len: last_len,
        } = &*last.0
        else {
            return None;
        };
        if last_lines.len() + lines.len() > BRANCH || *last_len + 1 + *len > MAX_LEAF_LEN {
            return None;
        }
        let mut merged = last_lines.clone();
        merged.extend(lines.iter().cloned());
        Some(Text::leaf(merged, *last_len + 1 + *len))
    }

    fn flush(&mut self) {
        if self.current_lines == 0 {
            return;
        }
        let text = if self.current.len() == 1 {
            self.current.pop().expect("one part")
        } else {
            from_parts(std::mem::take(&mut self.current), self.current_len as usize)
        };
        self.chunked.push(text);
        self.current.clear();
        self.current_lines = 0;
        self.current_len = -1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document() {
        let t = Text::empty();
        assert_eq!(t.len(), 0);
        assert_eq!(t.lines(), 1);
        assert_eq!(t.to_string(), "");
    }

    #[test]
    fn of_rejects_empty_list() {
        assert_eq!(Text::of(Vec::<String>::new()), Err(TextError::EmptyInput));
    }

    #[test]
    fn build_and_read_back() {
        let t = Text::of(["one", "two", "three"]).unwrap();
        assert_eq!(t.len(), 13);
        assert_eq!(t.lines(), 3);
        assert_eq!(t.to_string(), "one\ntwo\nthree");
        assert_eq!(t.to_lines(), vec!["one", "two", "three"]);
    }

    #[test]
    fn line_lookup_by_number_and_position() {
        let t = Text::from("one\ntwo\nthree");
        let l2 = t.line(2).unwrap();
        assert_eq!((l2.from, l2.to, l2.number, l2.text.as_str()), (4, 7, 2, "two"));
        // Position on the newline terminating line 1 belongs to line 1.
        assert_eq!(t.line_at(3).unwrap().number, 1);
        assert_eq!(t.line_at(4).unwrap().number, 2);
        assert_eq!(t.line_at(13).unwrap().number, 3);
        assert!(t.line(0).is_err());
        assert!(t.line(4).is_err());
        assert!(t.line_at(14).is_err());
    }

    #[test]
    fn replace_mid_document() {
        // Scenario: splice a two-line replacement into the middle.
        let doc = Text::of(["one", "two", "three"]).unwrap();
        let repl = Text::of(["foo", "bar"]).unwrap();
        let out = doc.replace(2, 5, &repl).unwrap();
        assert_eq!(out.to_string(), "onfoo\nbarwo\nthree");
        assert_eq!(out.lines(), 3);
        assert_eq!(out.len(), 17);
    }

    #[test]
    fn replace_at_edges() {
        let doc = Text::from("abc");
        assert_eq!(doc.replace(0, 0, &Text::from("x")).unwrap().to_string(), "xabc");
        assert_eq!(doc.replace(3, 3, &Text::from("x")).unwrap().to_string(), "abcx");
        assert_eq!(doc.replace(0, 3, &Text::empty()).unwrap().to_string(), "");
        assert!(doc.replace(2, 1, &Text::empty()).is_err());
        assert!(doc.replace(0, 4, &Text::empty()).is_err());
    }

    #[test]
    fn replace_joins_and_splits_lines() {
        let doc = Text::from("one\ntwo");
        // Deleting the newline joins the lines.
        let joined = doc.replace(3, 4, &Text::empty()).unwrap();
        assert_eq!(joined.to_string(), "onetwo");
        assert_eq!(joined.lines(), 1);
        // Inserting a newline splits a line.
        let split = doc.replace(1, 1, &Text::of(["", ""]).unwrap()).unwrap();
        assert_eq!(split.to_string(), "o\nne\ntwo");
        assert_eq!(split.lines(), 3);
    }

    #[test]
    fn append_glues_at_the_seam() {
        let a = Text::from("one");
        let b = Text::from("two");
        assert_eq!(a.append(&b).to_string(), "onetwo");
        let c = Text::of(["one", ""]).unwrap();
        assert_eq!(c.append(&b).to_string(), "one\ntwo");
    }

    #[test]
    fn slice_and_slice_string() {
        let doc = Text::from("one\ntwo\nthree");
        assert_eq!(doc.slice(2, 6).unwrap().to_string(), "e\ntw");
        assert_eq!(doc.slice_string(2, 6, "\n").unwrap(), "e\ntw");
        assert_eq!(doc.slice_string(0, 13, "|").unwrap(), "one|two|three");
        assert_eq!(doc.slice(4, 4).unwrap().to_string(), "");
        assert!(doc.slice(4, 14).is_err());
    }

    #[test]
    fn structural_equality_ignores_shape() {
        let lines: Vec<String> = (0..200).map(|i| format!("line {i}")).collect();
        let big = Text::of(lines.clone()).unwrap();
        // Build the same content through a different edit path.
        let mut other = Text::of(lines[..1].to_vec()).unwrap();
        for line in &lines[1..] {
            let sep = Text::of(["", line.as_str()]).unwrap();
            other = other.append(&sep);
        }
        assert_eq!(big.to_string(), other.to_string());
        assert!(big.eq_text(&other));
        assert_eq!(big, other);
    }

    #[test]
    fn json_round_trip() {
        let doc = Text::of(["one", "", "three"]).unwrap();
        let json = doc.to_json();
        let back = Text::from_json(&json).unwrap();
        assert_eq!(doc, back);
        assert!(Text::from_json(&serde_json::json!({"not": "lines"})).is_err());
        assert!(Text::from_json(&serde_json::json!([1, 2])).is_err());
    }

    #[test]
    fn large_document_stays_balanced() {
        let lines: Vec<String> = (0..5000).map(|i| format!("line number {i}")).collect();
        let mut doc = Text::of(lines).unwrap();
        assert!(doc.depth() <= 4, "depth {} too deep", doc.depth());
        // Many point edits at scattered positions keep the depth bounded.
        for i in 0..300 {
            let pos = (i * 997) % doc.len();
            doc = doc.replace(pos, pos, &Text::from("x")).unwrap();
        }
        let max_depth = ((doc.lines() as f64).log2().ceil() as usize) + 2;
        assert!(
            doc.depth() <= max_depth,
            "depth {} exceeds {}",
            doc.depth(),
            max_depth
        );
        assert_eq!(doc.lines(), 5000);
    }

    #[test]
    fn utf16_positions_count_surrogate_pairs() {
        let doc = Text::from("a\u{1f600}b");
        assert_eq!(doc.len(), 4);
        let out = doc.replace(3, 4, &Text::from("c")).unwrap();
        assert_eq!(out.to_string(), "a\u{1f600}c");
    }
}
