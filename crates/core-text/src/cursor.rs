//! Lazy cursors over document content.
//!
//! Iteration alternates text chunks with a distinct line-break token rather
//! than embedding `\n` in the chunks; an exhausted cursor yields `None`.
//! Chunks borrow from the document, so walking a range never allocates.

use crate::text::{Node, Text};
use crate::utf16;

/// One iteration token: a run of line text, or the break between two lines.
///
/// A `Text("")` chunk is an empty line, which is distinct from `LineBreak`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Chunk<'a> {
    Text(&'a str),
    LineBreak,
}

impl<'a> Chunk<'a> {
    pub fn is_break(&self) -> bool {
        matches!(self, Chunk::LineBreak)
    }

    /// The chunk's text; a line break renders as `"\n"`.
    pub fn as_str(&self) -> &'a str {
        match self {
            Chunk::Text(s) => s,
            Chunk::LineBreak => "\n",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// Depth-first cursor over a whole document.
///
/// Yields every line (including empty ones) with a [`Chunk::LineBreak`]
/// between consecutive lines, front to back or back to front.
pub struct RawCursor<'a> {
    stack: Vec<(&'a Node, usize)>,
    dir: Direction,
    pending: Option<&'a str>,
    started: bool,
}

impl<'a> RawCursor<'a> {
    pub(crate) fn new(text: &'a Text, dir: Direction) -> Self {
        let pos = match dir {
            Direction::Forward => 0,
            Direction::Backward => text.len(),
        };
        Self::at(text, pos, dir).0
    }

    /// Build a cursor whose first [`Self::advance_line`] yields the line
    /// containing `pos` (a position on a line's terminating newline counts as
    /// that line). Returns the cursor and `pos`'s offset within that line.
    pub(crate) fn at(text: &'a Text, pos: usize, dir: Direction) -> (Self, usize) {
        let mut stack: Vec<(&'a Node, usize)> = Vec::new();
        let mut node: &'a Node = &text.0;
        let mut offset = pos;
        loop {
            match node {
                Node::Leaf { lines, .. } => {
                    let mut idx = 0;
                    for line in lines.iter().take(lines.len() - 1) {
                        let len = utf16::len(line);
                        if offset <= len {
                            break;
                        }
                        offset -= len + 1;
                        idx += 1;
                    }
                    let entry = match dir {
                        Direction::Forward => idx,
                        Direction::Backward => idx + 1,
                    };
                    stack.push((node, entry));
                    let cursor = RawCursor {
                        stack,
                        dir,
                        pending: None,
                        started: false,
                    };
                    return (cursor, offset);
                }
                Node::Branch { children, .. } => {
                    let mut ci = 0;
                    for child in children.iter().take(children.len() - 1) {
                        let len = child.len();
                        if offset <= len {
                            break;
                        }
                        offset -= len + 1;
                        ci += 1;
                    }
                    let entry = match dir {
                        Direction::Forward => ci + 1,
                        Direction::Backward => ci,
                    };
                    stack.push((node, entry));
                    node = children[ci].0.as_ref();
                }
            }
        }
    }

    /// Advance to the next whole line in the cursor's direction.
    pub(crate) fn advance_line(&mut self) -> Option<&'a str> {
        enum Step<'a> {
            Pop,
            Line(&'a str),
            Descend(&'a Node),
        }
        loop {
            let step = {
                let (node, idx) = self.stack.last_mut()?;
                match (*node, self.dir) {
                    (Node::Leaf { lines, .. }, Direction::Forward) => {
                        if *idx < lines.len() {
                            *idx += 1;
                            Step::Line(lines[*idx - 1].as_str())
                        } else {
                            Step::Pop
                        }
                    }
                    (Node::Leaf { lines, .. }, Direction::Backward) => {
                        if *idx > 0 {
                            *idx -= 1;
                            Step::Line(lines[*idx].as_str())
                        } else {
                            Step::Pop
                        }
                    }
                    (Node::Branch { children, .. }, Direction::Forward) => {
                        if *idx < children.len() {
                            *idx += 1;
                            Step::Descend(children[*idx - 1].0.as_ref())
                        } else {
                            Step::Pop
                        }
                    }
                    (Node::Branch { children, .. }, Direction::Backward) => {
                        if *idx > 0 {
                            *idx -= 1;
                            Step::Descend(children[*idx].0.as_ref())
                        } else {
                            Step::Pop
                        }
                    }
                }
            };
            match step {
                Step::Pop => {
                    self.stack.pop();
                }
                Step::Line(line) => return Some(line),
                Step::Descend(node) => {
                    let entry = match (node, self.dir) {
                        (_, Direction::Forward) => 0,
                        (Node::Leaf { lines, .. }, Direction::Backward) => lines.len(),
                        (Node::Branch { children, .. }, Direction::Backward) => children.len(),
                    };
                    self.stack.push((node, entry));
                }
            }
        }
    }
}

impl<'a> Iterator for RawCursor<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        if let Some(line) = self.pending.take() {
            return Some(Chunk::Text(line));
        }
        let line = self.advance_line()?;
        if !self.started {
            self.started = true;
            Some(Chunk::Text(line))
        } else {
            self.pending = Some(line);
            Some(Chunk::LineBreak)
        }
    }
}

/// Cursor over the chunks of a sub-range, forward or backward.
///
/// Line pieces are clipped to the range; line breaks are emitted exactly when
/// the newline position falls inside the range. Empty clipped pieces are
/// suppressed except for whole empty lines strictly inside the range.
pub struct RangeCursor<'a> {
    raw: RawCursor<'a>,
    lo: usize,
    hi: usize,
    dir: Direction,
    /// Forward: start offset of the next line to pull.
    next_start: usize,
    /// Backward: start offset of the line pulled most recently.
    prev_start: usize,
    first_start: Option<usize>,
    pending: Option<Chunk<'a>>,
    done: bool,
}

impl<'a> RangeCursor<'a> {
    /// `from > to` iterates backward over `[to, from)`.
    pub(crate) fn new(text: &'a Text, from: usize, to: usize) -> Self {
        let (lo, hi, dir) = if from <= to {
            (from, to, Direction::Forward)
        } else {
            (to, from, Direction::Backward)
        };
        let seek = match dir {
            Direction::Forward => lo,
            Direction::Backward => hi,
        };
        let (raw, offset) = RawCursor::at(text, seek, dir);
        RangeCursor {
            raw,
            lo,
            hi,
            dir,
            next_start: seek - offset,
            prev_start: 0,
            first_start: Some(seek - offset),
            pending: None,
            done: false,
        }
    }

    fn next_forward(&mut self) -> Option<Chunk<'a>> {
        loop {
            if self.done {
                return None;
            }
            let Some(line) = self.raw.advance_line() else {
                self.done = true;
                return None;
            };
            let len = utf16::len(line);
            let start = self.next_start;
            let end = start + len;
            self.next_start = end + 1;
            if end >= self.hi {
                self.done = true;
            }
            let brk = start > self.lo && start <= self.hi;
            let piece = self.clip(line, start, end, len);
            match (brk, piece) {
                (true, Some(p)) => {
                    self.pending = Some(p);
                    return Some(Chunk::LineBreak);
                }
                (true, None) => return Some(Chunk::LineBreak),
                (false, Some(p)) => return Some(p),
                (false, None) => continue,
            }
        }
    }

    fn next_backward(&mut self) -> Option<Chunk<'a>> {
        loop {
            if self.done {
                return None;
            }
            let Some(line) = self.raw.advance_line() else {
                self.done = true;
                return None;
            };
            let len = utf16::len(line);
            let (start, end) = match self.first_start.take() {
                Some(s) => (s, s + len),
                None => {
                    let end = self.prev_start - 1;
                    (end - len, end)
                }
            };
            self.prev_start = start;
            if start <= self.lo {
                self.done = true;
            }
            let brk = start > self.lo && start <= self.hi;
            let piece = self.clip(line, start, end, len);
            match (piece, brk) {
                (Some(p), true) => {
                    self.pending = Some(Chunk::LineBreak);
                    return Some(p);
                }
                (Some(p), false) => return Some(p),
                (None, true) => return Some(Chunk::LineBreak),
                (None, false) => continue,
            }
        }
    }

    fn clip(&self, line: &'a str, start: usize, end: usize, len: usize) -> Option<Chunk<'a>> {
        let piece_from = self.lo.max(start);
        let piece_to = self.hi.min(end);
        if piece_from < piece_to {
            Some(Chunk::Text(utf16::slice(
                line,
                piece_from - start,
                piece_to - start,
            )))
        } else if len == 0 && start >= self.lo && end >= self.lo && start <= self.hi {
            // A whole empty line; keep it only when strictly inside the range
            // so edge positions do not produce phantom chunks.
            let inside = match self.dir {
                Direction::Forward => end < self.hi,
                Direction::Backward => start > self.lo,
            };
            inside.then_some(Chunk::Text(""))
        } else {
            None
        }
    }
}

impl<'a> Iterator for RangeCursor<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Chunk<'a>> {
        if let Some(chunk) = self.pending.take() {
            return Some(chunk);
        }
        match self.dir {
            Direction::Forward => self.next_forward(),
            Direction::Backward => self.next_backward(),
        }
    }
}

/// Whole-line iterator over a 1-based line number range.
pub struct LinesCursor<'a> {
    raw: Option<RawCursor<'a>>,
    remaining: usize,
}

impl<'a> LinesCursor<'a> {
    pub(crate) fn new(text: &'a Text, from_line: usize, to_line: usize) -> Self {
        let from_line = from_line.max(1);
        let to_line = to_line.min(text.lines() + 1);
        if from_line >= to_line {
            return LinesCursor {
                raw: None,
                remaining: 0,
            };
        }
        let start = text
            .line(from_line)
            .expect("line number clamped to the document")
            .from;
        let (raw, offset) = RawCursor::at(text, start, Direction::Forward);
        debug_assert_eq!(offset, 0, "line starts seek to a line boundary");
        LinesCursor {
            raw: Some(raw),
            remaining: to_line - from_line,
        }
    }
}

impl<'a> Iterator for LinesCursor<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.remaining == 0 {
            return None;
        }
        let line = self.raw.as_mut()?.advance_line()?;
        self.remaining -= 1;
        Some(line)
    }
}
