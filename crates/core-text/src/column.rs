//! Tab-aware column arithmetic for a single line.
//!
//! Columns count grapheme clusters, with tabs advancing to the next tab stop.
//! Offsets are UTF-16 code units, like everywhere else in the core.

use unicode_segmentation::UnicodeSegmentation;

use crate::utf16;

/// The column at UTF-16 offset `to` within `line`.
pub fn count_column(line: &str, to: usize, tab_size: usize) -> usize {
    let mut col = 0;
    let mut pos = 0;
    for cluster in line.graphemes(true) {
        if pos >= to {
            break;
        }
        if cluster == "\t" {
            col += tab_size - (col % tab_size);
        } else {
            col += 1;
        }
        pos += utf16::len(cluster);
    }
    col
}

/// The UTF-16 offset reaching column `col` in `line`, clamped to the line end.
///
/// A column landing inside a tab's span resolves to the tab's own offset.
pub fn find_column(line: &str, col: usize, tab_size: usize) -> usize {
    let mut cur = 0;
    let mut pos = 0;
    for cluster in line.graphemes(true) {
        if cur >= col {
            return pos;
        }
        if cluster == "\t" {
            cur += tab_size - (cur % tab_size);
        } else {
            cur += 1;
        }
        pos += utf16::len(cluster);
    }
    pos
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_columns_match_cluster_counts() {
        assert_eq!(count_column("hello", 3, 4), 3);
        assert_eq!(find_column("hello", 3, 4), 3);
        // The surrogate-pair emoji is one column but two units.
        let s = "a\u{1f600}b";
        assert_eq!(count_column(s, 3, 4), 2);
        assert_eq!(find_column(s, 2, 4), 3);
    }

    #[test]
    fn tabs_advance_to_the_next_stop() {
        assert_eq!(count_column("\tx", 1, 4), 4);
        assert_eq!(count_column("a\tx", 2, 4), 4);
        assert_eq!(count_column("a\tx", 3, 4), 5);
        assert_eq!(find_column("a\tx", 4, 4), 2);
        // A column inside the tab's span resolves to the tab itself.
        assert_eq!(find_column("a\tx", 2, 4), 1);
    }

    #[test]
    fn unreachable_columns_clamp_to_line_end() {
        assert_eq!(find_column("ab", 10, 4), 2);
        assert_eq!(count_column("ab", 10, 4), 2);
    }
}
