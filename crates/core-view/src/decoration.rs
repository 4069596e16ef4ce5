//! The decoration vocabulary the layout layer understands.
//!
//! Only the height-relevant subset lives in the core: inline marks, widgets
//! with an estimated height, replacements that hide content, and line
//! attributes. Side constants form a fixed ladder so that coincident
//! boundaries order deterministically: block widgets, then line attributes,
//! then replacement bounds, then inline widgets, then marks.

use core_ranges::{RangeSet, RangeValue};
use core_state::MapMode;

pub const SIDE_BLOCK_BEFORE: i32 = -500_000_000;
pub const SIDE_LINE: i32 = -400_000_000;
pub const SIDE_REPLACE_START: i32 = -300_000_000;
pub const SIDE_WIDGET_BEFORE: i32 = -100_000_000;
pub const SIDE_WIDGET_AFTER: i32 = 100_000_000;
pub const SIDE_MARK_START: i32 = 200_000_000;
pub const SIDE_REPLACE_END: i32 = 300_000_000;
pub const SIDE_BLOCK_AFTER: i32 = 500_000_000;

/// Vertical layout role of a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockType {
    /// A line of text.
    Text,
    /// A widget placed before a block of text.
    WidgetBefore,
    /// A widget placed after a block of text.
    WidgetAfter,
    /// A widget replacing a stretch of document text.
    WidgetRange,
}

#[derive(Debug, Clone, PartialEq)]
enum DecoKind {
    Mark {
        class: String,
        inclusive: bool,
    },
    Widget {
        estimated_height: f64,
        block: bool,
        /// Negative draws before the position, positive after.
        side: i32,
    },
    Replace {
        estimated_height: f64,
        block: bool,
    },
    Line {
        class: String,
    },
}

/// A value describing how a document region displays; stored in range sets
/// and consumed by the height map and by rendering outside the core.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoration {
    kind: DecoKind,
}

/// A set of decorated ranges.
pub type DecorationSet = RangeSet<Decoration>;

impl Decoration {
    /// Style a stretch of text.
    pub fn mark(class: impl Into<String>) -> Decoration {
        Decoration {
            kind: DecoKind::Mark {
                class: class.into(),
                inclusive: false,
            },
        }
    }

    /// Style a stretch of text, growing with insertions at its edges.
    pub fn mark_inclusive(class: impl Into<String>) -> Decoration {
        Decoration {
            kind: DecoKind::Mark {
                class: class.into(),
                inclusive: true,
            },
        }
    }

    /// Insert a widget at a position. `side < 0` draws before the position,
    /// `side > 0` after; `block` gives the widget its own vertical block.
    pub fn widget(estimated_height: f64, block: bool, side: i32) -> Decoration {
        Decoration {
            kind: DecoKind::Widget {
                estimated_height,
                block,
                side,
            },
        }
    }

    /// Hide a stretch of content, optionally replacing it with a block.
    pub fn replace(estimated_height: f64, block: bool) -> Decoration {
        Decoration {
            kind: DecoKind::Replace {
                estimated_height,
                block,
            },
        }
    }

    /// Attach attributes to the line at the range's position.
    pub fn line(class: impl Into<String>) -> Decoration {
        Decoration {
            kind: DecoKind::Line {
                class: class.into(),
            },
        }
    }

    /// Estimated pixel height contributed by this decoration; `None` for
    /// decorations that do not affect vertical layout.
    pub fn estimated_height(&self) -> Option<f64> {
        match &self.kind {
            DecoKind::Widget {
                estimated_height, ..
            }
            | DecoKind::Replace {
                estimated_height, ..
            } => Some(*estimated_height),
            _ => None,
        }
    }

    /// Whether this decoration occupies its own vertical block.
    pub fn is_block(&self) -> bool {
        match &self.kind {
            DecoKind::Widget { block, .. } | DecoKind::Replace { block, .. } => *block,
            _ => false,
        }
    }

    /// The block role, for decorations that create blocks.
    pub fn block_type(&self) -> Option<BlockType> {
        match &self.kind {
            DecoKind::Widget { block: true, side, .. } => Some(if *side < 0 {
                BlockType::WidgetBefore
            } else {
                BlockType::WidgetAfter
            }),
            DecoKind::Replace { block: true, .. } => Some(BlockType::WidgetRange),
            _ => None,
        }
    }

    pub fn class(&self) -> Option<&str> {
        match &self.kind {
            DecoKind::Mark { class, .. } | DecoKind::Line { class } => Some(class),
            _ => None,
        }
    }
}

impl RangeValue for Decoration {
    fn start_side(&self) -> i32 {
        match &self.kind {
            DecoKind::Mark { inclusive, .. } => {
                if *inclusive {
                    -SIDE_MARK_START
                } else {
                    SIDE_MARK_START
                }
            }
            DecoKind::Widget { block, side, .. } => {
                let base = if *block {
                    if *side < 0 {
                        SIDE_BLOCK_BEFORE
                    } else {
                        SIDE_BLOCK_AFTER
                    }
                } else if *side < 0 {
                    SIDE_WIDGET_BEFORE
                } else {
                    SIDE_WIDGET_AFTER
                };
                // Closer-to-zero sides draw closer to the position.
                base + (*side).clamp(-1_000_000, 1_000_000)
            }
            DecoKind::Replace { .. } => SIDE_REPLACE_START,
            DecoKind::Line { .. } => SIDE_LINE,
        }
    }

    fn end_side(&self) -> i32 {
        match &self.kind {
            DecoKind::Mark { inclusive, .. } => {
                if *inclusive {
                    SIDE_MARK_START
                } else {
                    -SIDE_MARK_START
                }
            }
            DecoKind::Widget { .. } => self.start_side(),
            DecoKind::Replace { .. } => SIDE_REPLACE_END,
            DecoKind::Line { .. } => SIDE_LINE,
        }
    }

    fn point(&self) -> bool {
        matches!(
            &self.kind,
            DecoKind::Widget { .. } | DecoKind::Replace { .. }
        )
    }

    fn map_mode(&self) -> MapMode {
        match &self.kind {
            DecoKind::Widget { side, .. } => {
                if *side < 0 {
                    MapMode::TrackBefore
                } else {
                    MapMode::TrackAfter
                }
            }
            DecoKind::Replace { .. } => MapMode::TrackDel,
            DecoKind::Line { .. } => MapMode::TrackBefore,
            DecoKind::Mark { .. } => MapMode::TrackDel,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_ranges::{Range, RangeSet};
    use core_state::{Change, ChangeSet};

    #[test]
    fn side_ladder_orders_coincident_decorations() {
        let line = Decoration::line("l");
        let replace = Decoration::replace(0.0, false);
        let mark = Decoration::mark("m");
        let widget = Decoration::widget(10.0, false, -1);
        assert!(line.start_side() < replace.start_side());
        assert!(replace.start_side() < widget.start_side());
        assert!(widget.start_side() < mark.start_side());
        let block_before = Decoration::widget(10.0, true, -1);
        assert!(block_before.start_side() < line.start_side());
    }

    #[test]
    fn coincident_decorations_iterate_in_ladder_order() {
        let set = RangeSet::of(
            vec![
                Range::new(4, 4, Decoration::mark("m")),
                Range::new(4, 4, Decoration::widget(5.0, true, -1)),
                Range::new(4, 4, Decoration::line("l")),
            ],
            false,
        )
        .unwrap();
        let kinds: Vec<Option<BlockType>> =
            set.iter().map(|(_, _, d)| d.block_type()).collect();
        assert_eq!(
            kinds,
            vec![Some(BlockType::WidgetBefore), None, None]
        );
        let classes: Vec<Option<&str>> = set.iter().map(|(_, _, d)| d.class()).collect();
        assert_eq!(classes[1], Some("l"));
        assert_eq!(classes[2], Some("m"));
    }

    #[test]
    fn widgets_track_their_side_through_deletions() {
        let before = Decoration::widget(8.0, false, -1);
        let after = Decoration::widget(8.0, false, 1);
        let set = RangeSet::of(
            vec![Range::new(5, 5, before), Range::new(5, 5, after)],
            false,
        )
        .unwrap();
        // Deleting the content before position 5 drops the before-widget.
        let cs = ChangeSet::of(vec![Change::delete(3, 5)], 10).unwrap();
        let mapped = set.map(cs.desc());
        assert_eq!(mapped.size(), 1);
        let survivor = mapped.iter().next().unwrap();
        assert_eq!(survivor.0, 3);
    }

    #[test]
    fn inclusive_marks_grow_at_edges() {
        let inclusive = Decoration::mark_inclusive("m");
        assert!(inclusive.start_side() < 0);
        assert!(inclusive.end_side() > 0);
        let set = RangeSet::of(vec![Range::new(2, 4, inclusive)], false).unwrap();
        let cs = ChangeSet::of(vec![Change::insert(4, "xy")], 8).unwrap();
        let mapped = set.map(cs.desc());
        let (f, t, _) = mapped.iter().next().unwrap();
        assert_eq!((f, t), (2, 6));
    }
}
