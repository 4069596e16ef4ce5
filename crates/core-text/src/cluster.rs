//! Grapheme cluster walking and character classification.
//!
//! Cluster boundaries come from `unicode-segmentation`'s extended grapheme
//! clusters (surrogate pairs, combining marks, ZWJ pictographic sequences and
//! regional-indicator pairs are all handled there); this module converts them
//! to the UTF-16 code-unit offsets the rest of the core speaks.

use unicode_segmentation::UnicodeSegmentation;

use crate::utf16;

/// Find the cluster boundary adjacent to `pos` (a UTF-16 offset into `text`).
///
/// Forward returns the smallest boundary greater than `pos` (the text length
/// when none is left); backward returns the largest boundary smaller than
/// `pos` (zero at the front). A `pos` inside a cluster snaps to the cluster's
/// far edge in the travel direction.
pub fn find_cluster_break(text: &str, pos: usize, forward: bool) -> usize {
    let total = utf16::len(text);
    if forward {
        if pos >= total {
            return total;
        }
        let mut boundary = 0;
        for cluster in text.graphemes(true) {
            boundary += utf16::len(cluster);
            if boundary > pos {
                return boundary;
            }
        }
        total
    } else {
        if pos == 0 {
            return 0;
        }
        let mut last = 0;
        let mut boundary = 0;
        for cluster in text.graphemes(true) {
            boundary += utf16::len(cluster);
            if boundary < pos {
                last = boundary;
            } else {
                break;
            }
        }
        last
    }
}

/// The cluster starting at or containing `pos`, with its UTF-16 extent.
pub fn cluster_at(text: &str, pos: usize) -> Option<(&str, usize, usize)> {
    let mut start = 0;
    for cluster in text.graphemes(true) {
        let end = start + utf16::len(cluster);
        if pos < end {
            return Some((cluster, start, end));
        }
        start = end;
    }
    None
}

/// Word-motion character classes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CharCategory {
    Word,
    Space,
    Other,
}

/// Classifies grapheme clusters for word motion.
///
/// Alphanumerics and `_` are words by default; the state layer extends the
/// word set through its `word_chars` facet.
#[derive(Debug, Clone, Default)]
pub struct CharCategorizer {
    extra_word_chars: Vec<char>,
}

impl CharCategorizer {
    pub fn new(word_chars: &str) -> Self {
        Self {
            extra_word_chars: word_chars.chars().collect(),
        }
    }

    pub fn categorize(&self, cluster: &str) -> CharCategory {
        let Some(first) = cluster.chars().next() else {
            return CharCategory::Other;
        };
        if first.is_whitespace() {
            CharCategory::Space
        } else if first == '_'
            || first.is_alphanumeric()
            || self.extra_word_chars.contains(&first)
        {
            CharCategory::Word
        } else {
            CharCategory::Other
        }
    }

    /// Start a group predicate for word motion: the first cluster fixes the
    /// group, and leading whitespace flows into whatever category follows it.
    pub fn group_matcher(&self) -> GroupMatcher<'_> {
        GroupMatcher {
            categorizer: self,
            category: None,
        }
    }
}

/// Stateful predicate telling whether successive clusters belong to the same
/// motion group.
pub struct GroupMatcher<'a> {
    categorizer: &'a CharCategorizer,
    category: Option<CharCategory>,
}

impl GroupMatcher<'_> {
    pub fn matches(&mut self, cluster: &str) -> bool {
        let next = self.categorizer.categorize(cluster);
        match self.category {
            None | Some(CharCategory::Space) => {
                self.category = Some(next);
                true
            }
            Some(current) => current == next,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ascii_boundaries() {
        assert_eq!(find_cluster_break("abc", 0, true), 1);
        assert_eq!(find_cluster_break("abc", 1, true), 2);
        assert_eq!(find_cluster_break("abc", 3, true), 3);
        assert_eq!(find_cluster_break("abc", 3, false), 2);
        assert_eq!(find_cluster_break("abc", 1, false), 0);
        assert_eq!(find_cluster_break("abc", 0, false), 0);
    }

    #[test]
    fn surrogate_pair_is_one_cluster() {
        let s = "a\u{1f600}b";
        assert_eq!(find_cluster_break(s, 1, true), 3);
        assert_eq!(find_cluster_break(s, 3, false), 1);
        // A position inside the pair snaps to the far edge.
        assert_eq!(find_cluster_break(s, 2, true), 3);
        assert_eq!(find_cluster_break(s, 2, false), 1);
    }

    #[test]
    fn combining_mark_extends_cluster() {
        let s = "e\u{301}x"; // e + combining acute
        assert_eq!(find_cluster_break(s, 0, true), 2);
        assert_eq!(find_cluster_break(s, 2, false), 0);
    }

    #[test]
    fn zwj_sequence_is_one_cluster() {
        // Family emoji: four people joined by ZWJ, 11 UTF-16 units.
        let s = "\u{1f468}\u{200d}\u{1f469}\u{200d}\u{1f467}\u{200d}\u{1f466}X";
        assert_eq!(find_cluster_break(s, 0, true), 11);
        assert_eq!(find_cluster_break(s, 11, false), 0);
    }

    #[test]
    fn regional_indicators_pair_up() {
        // Two flags back to back; each flag is a pair of regional indicators.
        let s = "\u{1f1e9}\u{1f1ea}\u{1f1eb}\u{1f1f7}";
        assert_eq!(find_cluster_break(s, 0, true), 4);
        assert_eq!(find_cluster_break(s, 4, true), 8);
        assert_eq!(find_cluster_break(s, 8, false), 4);
    }

    #[test]
    fn forward_backward_partitions_agree() {
        let s = "a\u{1f600}e\u{301}\u{1f1e9}\u{1f1ea} x";
        let total = crate::utf16::len(s);
        let mut forward = vec![0];
        let mut pos = 0;
        while pos < total {
            pos = find_cluster_break(s, pos, true);
            forward.push(pos);
        }
        let mut backward = vec![total];
        let mut pos = total;
        while pos > 0 {
            pos = find_cluster_break(s, pos, false);
            backward.push(pos);
        }
        backward.reverse();
        assert_eq!(forward, backward);
    }

    #[test]
    fn categorizer_classifies_clusters() {
        let cat = CharCategorizer::default();
        assert_eq!(cat.categorize("a"), CharCategory::Word);
        assert_eq!(cat.categorize("_"), CharCategory::Word);
        assert_eq!(cat.categorize("9"), CharCategory::Word);
        assert_eq!(cat.categorize(" "), CharCategory::Space);
        assert_eq!(cat.categorize("\t"), CharCategory::Space);
        assert_eq!(cat.categorize("+"), CharCategory::Other);
        let extended = CharCategorizer::new("-");
        assert_eq!(extended.categorize("-"), CharCategory::Word);
    }

    #[test]
    fn group_matcher_lets_space_flow_into_next_group() {
        let cat = CharCategorizer::default();
        let mut m = cat.group_matcher();
        assert!(m.matches(" "));
        assert!(m.matches(" "));
        assert!(m.matches("w"));
        assert!(m.matches("x"));
        assert!(!m.matches("+"));

        let mut m = cat.group_matcher();
        assert!(m.matches("w"));
        assert!(!m.matches(" "));
    }
}
