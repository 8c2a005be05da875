//! Tag hierarchy data types

use crate::ids::opaque_id;
use crate::segments::SegmentId;
use crate::sync::SyncState;
use serde::{Deserialize, Serialize};

opaque_id!(SectionId, "sec");
opaque_id!(SubsectionId, "sub");
opaque_id!(MasterTagId, "mtag");
opaque_id!(TagGroupId, "grp");
opaque_id!(
    /// Impression id: one instance of a primary tag
    PrimaryTagId,
    "imp"
);
opaque_id!(PendingEntryId, "pend");

/// Comparison key for master and primary names
pub(crate) fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// Exact highlighted substring of a block, in character offsets
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectionRange {
    pub block_id: SegmentId,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl SelectionRange {
    pub fn new(block_id: SegmentId, start_offset: usize, end_offset: usize) -> Self {
        Self {
            block_id,
            start_offset: start_offset.min(end_offset),
            end_offset: start_offset.max(end_offset),
        }
    }

    pub fn bounds(&self) -> (usize, usize) {
        (self.start_offset, self.end_offset)
    }

    pub fn is_empty(&self) -> bool {
        self.start_offset == self.end_offset
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecondaryTag {
    pub value: String,
}

/// A tagged instance (impression) under a master tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryTag {
    pub id: PrimaryTagId,
    pub value: String,
    /// "Name (k)" when the same name occurs more than once under the master
    pub display_name: Option<String>,
    pub instance_index: Option<u32>,
    pub comment: Option<String>,
    #[serde(default)]
    pub secondary_tags: Vec<SecondaryTag>,
    pub block_id: SegmentId,
    pub selected_text: String,
    #[serde(default)]
    pub ranges: Vec<SelectionRange>,
}

impl PrimaryTag {
    pub fn label(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.value)
    }
}

/// Structural position a tag was committed in
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructureContext {
    pub section_id: Option<SectionId>,
    pub subsection_id: Option<SubsectionId>,
}

impl StructureContext {
    pub fn scope(&self) -> TagScope {
        match &self.section_id {
            Some(id) => TagScope::Section(id.clone()),
            None => TagScope::Untagged,
        }
    }
}

/// Uniqueness scope for master tag names. Subsections share their section's scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TagScope {
    Section(SectionId),
    Untagged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterTag {
    pub id: MasterTagId,
    pub name: String,
    pub description: Option<String>,
    pub color: String,
    pub is_closed: bool,
    pub scope: TagScope,
    /// Id assigned by the backend once saved
    pub remote_id: Option<String>,
}

impl MasterTag {
    pub fn has_name(&self, name: &str) -> bool {
        name_key(&self.name) == name_key(name)
    }
}

/// One committed selection under a master tag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagGroup {
    pub id: TagGroupId,
    pub master_id: MasterTagId,
    pub context: StructureContext,
    pub block_ids: Vec<SegmentId>,
    pub selected_text: String,
    pub selection_ranges: Vec<SelectionRange>,
    pub primary_tags: Vec<PrimaryTag>,
    #[serde(default)]
    pub sync: SyncState,
}

impl TagGroup {
    /// Rebuild `block_ids` from the remaining primary tags, keeping first-seen order.
    pub fn recompute_block_ids(&mut self) {
        let mut block_ids: Vec<SegmentId> = Vec::new();
        let referenced = self.primary_tags.iter().flat_map(|p| {
            std::iter::once(&p.block_id).chain(p.ranges.iter().map(|r| &r.block_id))
        });
        for id in referenced {
            if !block_ids.contains(id) {
                block_ids.push(id.clone());
            }
        }
        self.block_ids = block_ids;
    }

    pub fn references_block(&self, block_id: &SegmentId) -> bool {
        self.block_ids.contains(block_id)
    }

    pub fn primary(&self, id: &PrimaryTagId) -> Option<&PrimaryTag> {
        self.primary_tags.iter().find(|p| &p.id == id)
    }
}

/// Primary tag being assembled for a pending selection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingPrimary {
    /// Reuse an existing impression instead of creating a new one
    pub existing_id: Option<PrimaryTagId>,
    pub value: String,
    pub comment: Option<String>,
    pub secondary_tags: Vec<SecondaryTag>,
}

impl PendingPrimary {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            existing_id: None,
            value: value.into(),
            comment: None,
            secondary_tags: Vec::new(),
        }
    }

    pub fn reusing(existing: &PrimaryTag) -> Self {
        Self {
            existing_id: Some(existing.id.clone()),
            value: existing.value.clone(),
            comment: existing.comment.clone(),
            secondary_tags: Vec::new(),
        }
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = Some(comment.into());
        self
    }
}

/// Selection not yet committed under a master tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub id: PendingEntryId,
    pub block_id: SegmentId,
    pub selected_text: String,
    /// Exact offsets when they could be resolved
    pub range: Option<SelectionRange>,
    pub primaries: Vec<PendingPrimary>,
}
