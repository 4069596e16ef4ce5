//! Bidirectional text ordering.
//!
//! Implements the subset of the Unicode Bidirectional Algorithm needed for
//! correct caret motion: character classification over the BMP strong-RTL
//! blocks, the weak rules W1–W7, the neutral rules N1–N2, level assignment
//! with a single embedding step per direction flip, and isolate sub-ranges
//! processed independently. For identical inputs the produced span partition
//! and caret-crossing decisions are identical.
//!
//! All offsets are UTF-16 code units within the line.

use core_text::{find_cluster_break, utf16};

/// Base or resolved text direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ltr,
    Rtl,
}

impl Direction {
    fn base_level(self) -> u8 {
        match self {
            Direction::Ltr => 0,
            Direction::Rtl => 1,
        }
    }
}

/// A directionally isolated sub-range with its own base direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Isolate {
    pub from: usize,
    pub to: usize,
    pub direction: Direction,
}

/// One run of the line at a single embedding level. Spans partition the line;
/// the span list is ordered by the base direction's reading order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BidiSpan {
    pub from: usize,
    pub to: usize,
    pub level: u8,
}

impl BidiSpan {
    pub fn dir(&self) -> Direction {
        if self.level % 2 == 1 {
            Direction::Rtl
        } else {
            Direction::Ltr
        }
    }
}

/// Character classes used by the algorithm. `AL` folds into `R` after the
/// weak rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum T {
    /// Strong left-to-right.
    L,
    /// Strong right-to-left.
    R,
    /// Arabic letter.
    Al,
    /// European number.
    En,
    /// Arabic number.
    An,
    /// European number terminator.
    Et,
    /// Common number separator.
    Cs,
    /// Neutral or isolate placeholder.
    Ni,
    /// Non-spacing mark.
    Nsm,
}

fn char_type(c: char) -> T {
    let u = c as u32;
    match u {
        0x30..=0x39 => T::En,
        0x2B | 0x2D => T::Et,                         // plus, minus
        0x23..=0x25 => T::Et,                         // #, $, %
        0x2C | 0x2E | 0x2F | 0x3A => T::Cs,           // , . / :
        0x41..=0x5A | 0x61..=0x7A => T::L,
        0x300..=0x36F => T::Nsm,                      // combining diacritics
        0x591..=0x5BD | 0x5BF | 0x5C1 | 0x5C2 | 0x5C4 | 0x5C5 | 0x5C7 => T::Nsm,
        0x5BE | 0x5C0 | 0x5C3 | 0x5C6 | 0x5D0..=0x5FF => T::R, // Hebrew
        0x608 | 0x60B | 0x60D => T::Al,
        0x600..=0x605 | 0x660..=0x669 | 0x66B | 0x66C => T::An, // Arabic-Indic digits
        0x610..=0x61A | 0x64B..=0x65F | 0x670 => T::Nsm,
        0x6D6..=0x6DC | 0x6DF..=0x6E4 | 0x6E7 | 0x6E8 | 0x6EA..=0x6ED => T::Nsm,
        0x6F0..=0x6F9 => T::En,                       // extended Arabic-Indic digits
        0x61C => T::Al,                               // Arabic letter mark
        0x606..=0x6FF => T::Al,                       // remaining Arabic block
        0x700..=0x70D | 0x70F..=0x74F => T::Al,       // Syriac
        0x711 => T::Nsm,
        0x730..=0x74A => T::Nsm,
        0x780..=0x7A5 | 0x7B1 => T::Al,               // Thaana
        0x7A6..=0x7B0 => T::Nsm,
        0x8A0..=0x8FF => T::Al,                       // Arabic Extended-A
        0x200E => T::L,
        0x200F => T::R,
        0xFB1D..=0xFB4F => T::R,                      // Hebrew presentation forms
        0xFB50..=0xFDFF | 0xFE70..=0xFEFF => T::Al,   // Arabic presentation forms
        _ => {
            if c.is_alphabetic() {
                T::L
            } else {
                T::Ni
            }
        }
    }
}

/// Whether the line can contain right-to-left material at all.
fn maybe_rtl(text: &str) -> bool {
    text.chars().any(|c| {
        matches!(
            c as u32,
            0x590..=0x8FF | 0xFB1D..=0xFDFF | 0xFE70..=0xFEFF | 0x200F | 0x061C
        )
    })
}

/// Compute the ordered span partition for one line.
///
/// `isolates` must be sorted, non-overlapping sub-ranges of the line; each is
/// ordered independently with its own base direction and spliced into the
/// surrounding order as an atomic unit.
pub fn compute_order(text: &str, base: Direction, isolates: &[Isolate]) -> Vec<BidiSpan> {
    let len = utf16::len(text);
    if len == 0 {
        return vec![BidiSpan {
            from: 0,
            to: 0,
            level: base.base_level(),
        }];
    }
    if base == Direction::Ltr && isolates.is_empty() && !maybe_rtl(text) {
        return vec![BidiSpan {
            from: 0,
            to: len,
            level: 0,
        }];
    }

    // Classify per UTF-16 unit; a surrogate pair repeats its type so runs
    // stay contiguous.
    let mut types: Vec<T> = Vec::with_capacity(len);
    for c in text.chars() {
        let t = char_type(c);
        for _ in 0..c.len_utf16() {
            types.push(t);
        }
    }
    // Isolate content is opaque to the outer ordering.
    for iso in isolates {
        for t in types
            .iter_mut()
            .take(iso.to.min(len))
            .skip(iso.from.min(len))
        {
            *t = T::Ni;
        }
    }

    resolve_weak(&mut types, base);
    resolve_neutral(&mut types, base);
    let mut spans = emit_spans(&types, base);

    if !isolates.is_empty() {
        spans = splice_isolates(text, spans, base, isolates);
    }
    spans
}

/// W1–W7, applied in order over the whole line.
fn resolve_weak(types: &mut [T], base: Direction) {
    // W1: NSM takes the type of the previous character.
    let mut prev = T::Ni;
    for t in types.iter_mut() {
        if *t == T::Nsm {
            *t = prev;
        }
        prev = *t;
    }
    // W2: EN becomes AN after an Arabic-letter strong context.
    let base_strong = match base {
        Direction::Ltr => T::L,
        Direction::Rtl => T::R,
    };
    let mut strong = base_strong;
    for t in types.iter_mut() {
        match *t {
            T::L | T::R | T::Al => strong = *t,
            T::En if strong == T::Al => *t = T::An,
            _ => {}
        }
    }
    // W3: AL folds into R.
    for t in types.iter_mut() {
        if *t == T::Al {
            *t = T::R;
        }
    }
    // W4: a single CS between equal numeric types takes that type.
    for i in 1..types.len().saturating_sub(1) {
        if types[i] == T::Cs
            && matches!(types[i - 1], T::En | T::An)
            && types[i + 1] == types[i - 1]
        {
            types[i] = types[i - 1];
        }
    }
    // W5: ET runs adjacent to EN become EN.
    let n = types.len();
    let mut i = 0;
    while i < n {
        if types[i] == T::Et {
            let mut j = i;
            while j < n && types[j] == T::Et {
                j += 1;
            }
            let before_en = i > 0 && types[i - 1] == T::En;
            let after_en = j < n && types[j] == T::En;
            if before_en || after_en {
                for t in &mut types[i..j] {
                    *t = T::En;
                }
            }
            i = j;
        } else {
            i += 1;
        }
    }
    // W6: leftover separators and terminators are neutral.
    for t in types.iter_mut() {
        if matches!(*t, T::Et | T::Cs) {
            *t = T::Ni;
        }
    }
    // W7: EN takes the direction of a preceding L context.
    let mut strong = base_strong;
    for t in types.iter_mut() {
        match *t {
            T::L | T::R => strong = *t,
            T::En if strong == T::L => *t = T::L,
            _ => {}
        }
    }
}

/// N1–N2: neutral runs take the surrounding direction when both sides agree,
/// the base direction otherwise. Numbers count as R for this rule.
fn resolve_neutral(types: &mut [T], base: Direction) {
    let base_t = match base {
        Direction::Ltr => T::L,
        Direction::Rtl => T::R,
    };
    let as_strong = |t: T| match t {
        T::L => Some(T::L),
        T::R | T::En | T::An => Some(T::R),
        _ => None,
    };
    let n = types.len();
    let mut i = 0;
    let mut before = base_t;
    while i < n {
        if types[i] == T::Ni {
            let mut j = i;
            while j < n && types[j] == T::Ni {
                j += 1;
            }
            let after = if j < n {
                as_strong(types[j]).unwrap_or(base_t)
            } else {
                base_t
            };
            let fill = if before == after { before } else { base_t };
            for t in &mut types[i..j] {
                *t = fill;
            }
            i = j;
        } else {
            if let Some(s) = as_strong(types[i]) {
                before = s;
            }
            i += 1;
        }
    }
}

/// Assign levels (I1/I2) and produce spans in the base's reading order (L2).
fn emit_spans(types: &[T], base: Direction) -> Vec<BidiSpan> {
    let base_level = base.base_level();
    let level_of = |t: T| -> u8 {
        match base {
            Direction::Ltr => match t {
                T::L => 0,
                T::R => 1,
                T::En | T::An => 2,
                _ => 0,
            },
            Direction::Rtl => match t {
                T::R => 1,
                T::L | T::En | T::An => 2,
                _ => 1,
            },
        }
    };
    let mut logical: Vec<BidiSpan> = Vec::new();
    let mut start = 0;
    let mut cur = level_of(types[0]);
    for (i, &t) in types.iter().enumerate().skip(1) {
        let level = level_of(t);
        if level != cur {
            logical.push(BidiSpan {
                from: start,
                to: i,
                level: cur,
            });
            start = i;
            cur = level;
        }
    }
    logical.push(BidiSpan {
        from: start,
        to: types.len(),
        level: cur,
    });

    // L2, expressed in the base's reading order: runs above the base level
    // reverse once per level step. (The visual left-to-right order is this
    // list read forward for an LTR base and backward for an RTL base.)
    let max_level = logical.iter().map(|s| s.level).max().unwrap_or(base_level);
    let mut ordered = logical;
    let mut l = max_level;
    while l > base_level {
        let mut i = 0;
        while i < ordered.len() {
            if ordered[i].level >= l {
                let mut j = i;
                while j < ordered.len() && ordered[j].level >= l {
                    j += 1;
                }
                ordered[i..j].reverse();
                i = j;
            } else {
                i += 1;
            }
        }
        l -= 1;
    }
    ordered
}

/// Split the outer spans at isolate boundaries and replace isolate interiors
/// with their own recursively computed order.
fn splice_isolates(
    text: &str,
    spans: Vec<BidiSpan>,
    _base: Direction,
    isolates: &[Isolate],
) -> Vec<BidiSpan> {
    enum Group {
        Seg(BidiSpan),
        Iso(Vec<BidiSpan>),
    }
    let mut out = Vec::with_capacity(spans.len() + isolates.len());
    for span in spans {
        let mut cursor = span.from;
        let mut groups: Vec<Group> = Vec::new();
        let mut covering: Vec<&Isolate> = isolates
            .iter()
            .filter(|iso| iso.from < span.to && iso.to > span.from)
            .collect();
        covering.sort_by_key(|iso| iso.from);
        for iso in covering {
            let from = iso.from.max(span.from);
            let to = iso.to.min(span.to);
            if from > cursor {
                groups.push(Group::Seg(BidiSpan {
                    from: cursor,
                    to: from,
                    level: span.level,
                }));
            }
            let inner_text = utf16::slice(text, from, to);
            let inner = compute_order(inner_text, iso.direction, &[]);
            let adjust = isolate_level_adjust(span.level, iso.direction);
            let mut placed = Vec::new();
            for inner_span in inner {
                if inner_span.from == inner_span.to && (to - from) > 0 {
                    continue;
                }
                placed.push(BidiSpan {
                    from: from + inner_span.from,
                    to: from + inner_span.to,
                    level: inner_span.level + adjust,
                });
            }
            groups.push(Group::Iso(placed));
            cursor = to;
        }
        if cursor < span.to || groups.is_empty() {
            groups.push(Group::Seg(BidiSpan {
                from: cursor,
                to: span.to,
                level: span.level,
            }));
        }
        // An RTL outer span reads its pieces back to front; each isolate stays
        // an atomic unit with its internal order intact.
        if span.level % 2 == 1 {
            groups.reverse();
        }
        for group in groups {
            match group {
                Group::Seg(s) => out.push(s),
                Group::Iso(inner) => out.extend(inner),
            }
        }
    }
    out
}

/// The level delta applied to an isolate's inner spans so their direction
/// parity nests correctly under the containing span's level.
fn isolate_level_adjust(outer_level: u8, inner_base: Direction) -> u8 {
    let inner_bit = inner_base.base_level();
    if outer_level % 2 == inner_bit % 2 {
        outer_level - inner_bit
    } else {
        outer_level + 1 - inner_bit
    }
}

/// A caret position produced by visual motion, with the level of the span it
/// landed in (recorded for stable subsequent motion).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualCursor {
    pub pos: usize,
    pub level: u8,
}

/// Move one grapheme cluster through the line in visual order.
///
/// `forward` moves in the base direction's reading order. Within a span the
/// caret follows the span's own reading order (logically ascending); at span
/// edges it jumps to the entry side of the next span in the order list.
/// Returns `None` when the caret would leave the line. `level_hint`
/// disambiguates boundary positions shared by two spans.
pub fn move_visually(
    text: &str,
    order: &[BidiSpan],
    pos: usize,
    level_hint: Option<u8>,
    forward: bool,
) -> Option<VisualCursor> {
    let index = find_span(order, pos, level_hint, forward)?;
    let span = order[index];
    if forward {
        if pos < span.to {
            let next = find_cluster_break(text, pos, true);
            if next <= span.to {
                return Some(VisualCursor {
                    pos: next,
                    level: span.level,
                });
            }
        }
        order.get(index + 1).map(|next_span| VisualCursor {
            pos: find_cluster_break(text, next_span.from, true).min(next_span.to),
            level: next_span.level,
        })
    } else {
        if pos > span.from {
            let prev = find_cluster_break(text, pos, false);
            if prev >= span.from {
                return Some(VisualCursor {
                    pos: prev,
                    level: span.level,
                });
            }
        }
        if index == 0 {
            return None;
        }
        let prev_span = order[index - 1];
        Some(VisualCursor {
            pos: find_cluster_break(text, prev_span.to, false).max(prev_span.from),
            level: prev_span.level,
        })
    }
}

/// The span containing `pos`, honoring the level hint at shared boundaries
/// and otherwise preferring a span the caret can still move through.
fn find_span(order: &[BidiSpan], pos: usize, level_hint: Option<u8>, forward: bool) -> Option<usize> {
    let candidates: Vec<usize> = order
        .iter()
        .enumerate()
        .filter(|(_, s)| s.from <= pos && pos <= s.to)
        .map(|(i, _)| i)
        .collect();
    match candidates.len() {
        0 => None,
        1 => Some(candidates[0]),
        _ => {
            if let Some(hint) = level_hint
                && let Some(&i) = candidates.iter().find(|&&i| order[i].level == hint)
            {
                return Some(i);
            }
            // Prefer the span we can keep moving inside.
            candidates
                .iter()
                .copied()
                .find(|&i| {
                    let s = order[i];
                    if forward { pos < s.to } else { pos > s.from }
                })
                .or(Some(candidates[0]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEB: &str = "\u{5e9}\u{5dc}\u{5d5}\u{5dd}"; // שלום

    #[test]
    fn pure_ltr_takes_the_fast_path() {
        let spans = compute_order("hello world", Direction::Ltr, &[]);
        assert_eq!(spans, vec![BidiSpan { from: 0, to: 11, level: 0 }]);
    }

    #[test]
    fn mixed_line_partitions_into_three_spans() {
        // Scenario: "Hello שלום World" with an LTR base.
        let line = format!("Hello {HEB} World");
        let spans = compute_order(&line, Direction::Ltr, &[]);
        assert_eq!(
            spans,
            vec![
                BidiSpan { from: 0, to: 6, level: 0 },
                BidiSpan { from: 6, to: 10, level: 1 },
                BidiSpan { from: 10, to: 16, level: 0 },
            ]
        );
    }

    #[test]
    fn spans_partition_exactly_once() {
        let line = format!("a{HEB}1{HEB}z");
        let spans = compute_order(&line, Direction::Ltr, &[]);
        let mut covered = vec![false; utf16::len(&line)];
        for span in &spans {
            for unit in span.from..span.to {
                assert!(!covered[unit], "unit {unit} covered twice");
                covered[unit] = true;
            }
        }
        assert!(covered.iter().all(|&c| c), "gap in coverage: {spans:?}");
    }

    #[test]
    fn rtl_base_places_numbers_at_level_two() {
        let line = format!("{HEB} 123 {HEB}");
        let spans = compute_order(&line, Direction::Rtl, &[]);
        assert!(spans.iter().any(|s| s.level == 2));
        for s in &spans {
            assert!(s.level >= 1 && s.level <= 2);
        }
        // Reading order starts at the logical start for an RTL line of RTL text.
        assert_eq!(spans[0].from, 0);
    }

    #[test]
    fn neutrals_between_equal_strong_sides_join_them() {
        let line = format!("{HEB} - {HEB}");
        let spans = compute_order(&line, Direction::Ltr, &[]);
        // One RTL span covering everything: the neutrals take R from both sides.
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].level, 1);
    }

    #[test]
    fn number_after_arabic_letter_becomes_arabic_number() {
        // Arabic letter then European digits: W2 turns EN into AN, level 2.
        let line = "\u{627}\u{628} 12";
        let spans = compute_order(line, Direction::Rtl, &[]);
        let num_span = spans.iter().find(|s| s.level == 2).expect("number span");
        assert_eq!((num_span.from, num_span.to), (3, 5));
    }

    #[test]
    fn isolates_recurse_with_inner_base() {
        let line = format!("ab {HEB} cd");
        let iso = Isolate {
            from: 3,
            to: 7,
            direction: Direction::Rtl,
        };
        let spans = compute_order(&line, Direction::Ltr, &[iso]);
        // The isolate interior keeps RTL level 1; outside stays level 0.
        assert!(spans.contains(&BidiSpan { from: 3, to: 7, level: 1 }));
        for s in &spans {
            if s.to <= 3 || s.from >= 7 {
                assert_eq!(s.level, 0);
            }
        }
    }

    #[test]
    fn deterministic_for_identical_input() {
        let line = format!("x{HEB}12 {HEB}.y");
        let a = compute_order(&line, Direction::Ltr, &[]);
        let b = compute_order(&line, Direction::Ltr, &[]);
        assert_eq!(a, b);
    }

    #[test]
    fn visual_motion_walks_rtl_spans_in_logical_order() {
        let line = format!("Hello {HEB} World");
        let order = compute_order(&line, Direction::Ltr, &[]);
        // Forward through the RTL span visits logical positions ascending.
        let mut pos = 5;
        let mut level = None;
        let mut visited = Vec::new();
        for _ in 0..6 {
            let cur = move_visually(&line, &order, pos, level, true).unwrap();
            visited.push(cur.pos);
            pos = cur.pos;
            level = Some(cur.level);
        }
        assert_eq!(visited, vec![6, 7, 8, 9, 10, 11]);
    }

    #[test]
    fn visual_motion_stops_at_line_edges() {
        let line = "abc";
        let order = compute_order(line, Direction::Ltr, &[]);
        assert_eq!(move_visually(line, &order, 3, None, true), None);
        assert_eq!(move_visually(line, &order, 0, None, false), None);
        assert_eq!(
            move_visually(line, &order, 0, None, true),
            Some(VisualCursor { pos: 1, level: 0 })
        );
    }

    #[test]
    fn cluster_steps_skip_combining_marks() {
        let line = "ae\u{301}z";
        let order = compute_order(line, Direction::Ltr, &[]);
        let step = move_visually(line, &order, 1, None, true).unwrap();
        assert_eq!(step.pos, 3);
    }
}
