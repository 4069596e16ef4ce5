//! View-side state: bidirectional text ordering, vertical layout, and the
//! decoration vocabulary both are driven by.
//!
//! Everything here consumes the transaction pipeline of `core-state` and the
//! range containers of `core-ranges`; nothing renders. The height map answers
//! "what is at pixel y" and "how tall is this line" for virtualized display
//! over large documents, the bidi module produces the visual span order and
//! caret motion for mixed-direction lines, and [`ViewUpdate`] is the summary
//! observers receive after each state update.

mod bidi;
mod decoration;
mod heightmap;
mod update;

pub use bidi::{BidiSpan, Direction, Isolate, VisualCursor, compute_order, move_visually};
pub use decoration::{BlockType, Decoration, DecorationSet};
pub use heightmap::{BlockInfo, HeightMap, HeightOracle, MeasuredHeights, QueryType};
pub use update::{ChangedRange, UpdateFlags, ViewUpdate};
