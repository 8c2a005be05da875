//! Tag hierarchy: sections and subsections over the block sequence, and
//! master/primary/secondary tags attached to text selections.

mod color;
mod engine;
mod highlight;
mod model;
mod offsets;
mod structure;

pub use color::color_for;
pub use engine::{CommitReceipt, HoverTarget, ImpressionUpdate, TagEngine};
pub use highlight::{highlighted_text, merge_ranges, phrase_ranges, render, HighlightSpan, SpanKind};
pub use model::{
    MasterTag, MasterTagId, PendingEntry, PendingEntryId, PendingPrimary, PrimaryTag,
    PrimaryTagId, SecondaryTag, SectionId, SelectionRange, StructureContext, SubsectionId,
    TagGroup, TagGroupId, TagScope,
};
pub use offsets::{resolve_selection, NodePoint, ResolvedSelection, SelectionInput};
pub use structure::{Section, SectionTree, StructureItem, Subsection};
