//! Segment store
//!
//! Ordered transcript segments with their speaker or state assignment. Every
//! other component reads and writes segments through [`SegmentStore`].

mod segment;
mod store;

pub use segment::{Assignment, Segment, SegmentId, SegmentState};
pub use store::{Deletion, SegmentStore, TILING_EPSILON};
