//! Master → Primary → Secondary tag attachment
//!
//! Selections accumulate as pending entries until a master name is chosen for
//! all of them at once. Committing validates the name against its scope, then
//! turns every entry that has primary tags into its own tag group so each
//! selection keeps independent positions under the shared master.

use super::color::color_for;
use super::highlight::{phrase_ranges, render, HighlightSpan};
use super::model::{
    name_key, MasterTag, MasterTagId, PendingEntry, PendingEntryId, PendingPrimary, PrimaryTag,
    PrimaryTagId, SecondaryTag, SelectionRange, StructureContext, TagGroup, TagGroupId, TagScope,
};
use super::offsets::{resolve_selection, SelectionInput};
use crate::error::ValidationError;
use crate::segments::{SegmentId, SegmentStore};
use crate::sync::SyncState;
use std::collections::HashMap;
use tracing::{debug, info};

/// What a successful commit produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitReceipt {
    /// Master of the first committed entry's scope
    pub master_id: MasterTagId,
    pub created_master: bool,
    /// One master per scope the committed entries fall in
    pub master_ids: Vec<MasterTagId>,
    pub group_ids: Vec<TagGroupId>,
}

/// Tag under the pointer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HoverTarget {
    Group(TagGroupId),
    Primary(PrimaryTagId),
    Pending(PendingEntryId),
}

/// Server-assigned values for a saved impression
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImpressionUpdate {
    pub id: PrimaryTagId,
    pub display_name: Option<String>,
    pub instance_index: Option<u32>,
}

#[derive(Debug, Clone, Default)]
pub struct TagEngine {
    masters: Vec<MasterTag>,
    groups: Vec<TagGroup>,
    pending: Vec<PendingEntry>,
    editing: Option<MasterTagId>,
}

impl TagEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_parts(masters: Vec<MasterTag>, groups: Vec<TagGroup>) -> Self {
        Self {
            masters,
            groups,
            ..Self::default()
        }
    }

    pub fn masters(&self) -> &[MasterTag] {
        &self.masters
    }

    pub fn groups(&self) -> &[TagGroup] {
        &self.groups
    }

    pub fn pending(&self) -> &[PendingEntry] {
        &self.pending
    }

    pub fn master(&self, id: &MasterTagId) -> Option<&MasterTag> {
        self.masters.iter().find(|m| &m.id == id)
    }

    pub fn group(&self, id: &TagGroupId) -> Option<&TagGroup> {
        self.groups.iter().find(|g| &g.id == id)
    }

    pub fn groups_of<'a>(&'a self, master: &'a MasterTagId) -> impl Iterator<Item = &'a TagGroup> {
        self.groups.iter().filter(move |g| &g.master_id == master)
    }

    pub fn find_master(&self, scope: &TagScope, name: &str) -> Option<&MasterTag> {
        self.masters
            .iter()
            .find(|m| &m.scope == scope && m.has_name(name))
    }

    pub(crate) fn master_mut(&mut self, id: &MasterTagId) -> Option<&mut MasterTag> {
        self.masters.iter_mut().find(|m| &m.id == id)
    }

    pub(crate) fn group_mut(&mut self, id: &TagGroupId) -> Option<&mut TagGroup> {
        self.groups.iter_mut().find(|g| &g.id == id)
    }

    fn find_primary(&self, id: &PrimaryTagId) -> Option<&PrimaryTag> {
        self.groups.iter().find_map(|g| g.primary(id))
    }

    // ---- edit mode ----

    /// Enter edit mode for a master tag. Only one master is edited at a time.
    pub fn begin_edit(&mut self, master: &MasterTagId) -> Result<(), ValidationError> {
        if self.master(master).is_none() {
            return Err(ValidationError::UnknownTag(master.to_string()));
        }
        if let Some(previous) = self.editing.replace(master.clone()) {
            if &previous != master {
                debug!(previous = %previous, "Leaving edit mode for previous master tag");
            }
        }
        info!(master = %master, "Entered edit mode");
        Ok(())
    }

    pub fn end_edit(&mut self) {
        self.editing = None;
    }

    pub fn editing(&self) -> Option<&MasterTagId> {
        self.editing.as_ref()
    }

    pub fn is_editing(&self, master: &MasterTagId) -> bool {
        self.editing.as_ref() == Some(master)
    }

    // ---- pending selections ----

    /// Record a selection inside a block as a pending entry.
    pub fn select(
        &mut self,
        store: &SegmentStore,
        block_id: &SegmentId,
        input: &SelectionInput,
    ) -> Result<PendingEntryId, ValidationError> {
        let segment = store
            .get(block_id)
            .ok_or_else(|| ValidationError::UnknownBlock(block_id.to_string()))?;
        let resolved =
            resolve_selection(&segment.content, input).ok_or(ValidationError::InvalidSelection)?;
        let range = resolved
            .range
            .map(|(start, end)| SelectionRange::new(block_id.clone(), start, end));

        if let Some(existing) = self.pending.iter().find(|p| {
            &p.block_id == block_id && p.selected_text == resolved.text && p.range == range
        }) {
            return Ok(existing.id.clone());
        }

        let entry = PendingEntry {
            id: PendingEntryId::generate(),
            block_id: block_id.clone(),
            selected_text: resolved.text,
            range,
            primaries: Vec::new(),
        };
        debug!(entry = %entry.id, block = %block_id, text = %entry.selected_text, "Pending selection");
        let id = entry.id.clone();
        self.pending.push(entry);
        Ok(id)
    }

    fn pending_mut(&mut self, id: &PendingEntryId) -> Result<&mut PendingEntry, ValidationError> {
        self.pending
            .iter_mut()
            .find(|p| &p.id == id)
            .ok_or_else(|| ValidationError::UnknownPendingEntry(id.to_string()))
    }

    /// Add a primary tag to a pending entry. Returns its index within the entry.
    pub fn add_pending_primary(
        &mut self,
        entry: &PendingEntryId,
        primary: PendingPrimary,
    ) -> Result<usize, ValidationError> {
        if primary.value.trim().is_empty() {
            return Err(ValidationError::EmptyTagValue);
        }
        if let Some(existing) = &primary.existing_id {
            if self.find_primary(existing).is_none() {
                return Err(ValidationError::UnknownTag(existing.to_string()));
            }
        }
        let entry = self.pending_mut(entry)?;
        entry.primaries.push(primary);
        Ok(entry.primaries.len() - 1)
    }

    pub fn add_pending_secondary(
        &mut self,
        entry: &PendingEntryId,
        primary_index: usize,
        value: impl Into<String>,
    ) -> Result<(), ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::EmptyTagValue);
        }
        let missing = ValidationError::UnknownTag(format!("{entry}#{primary_index}"));
        let primary = self
            .pending_mut(entry)?
            .primaries
            .get_mut(primary_index)
            .ok_or(missing)?;
        primary.secondary_tags.push(SecondaryTag {
            value: value.trim().to_string(),
        });
        Ok(())
    }

    pub fn remove_pending_primary(
        &mut self,
        entry: &PendingEntryId,
        primary_index: usize,
    ) -> Result<PendingPrimary, ValidationError> {
        let missing = ValidationError::UnknownTag(format!("{entry}#{primary_index}"));
        let entry = self.pending_mut(entry)?;
        if primary_index >= entry.primaries.len() {
            return Err(missing);
        }
        Ok(entry.primaries.remove(primary_index))
    }

    pub fn discard_pending(&mut self, entry: &PendingEntryId) -> Result<PendingEntry, ValidationError> {
        let index = self
            .pending
            .iter()
            .position(|p| &p.id == entry)
            .ok_or_else(|| ValidationError::UnknownPendingEntry(entry.to_string()))?;
        Ok(self.pending.remove(index))
    }

    fn is_committed_highlight(&self, block_id: &SegmentId, text: &str) -> bool {
        let key = name_key(text);
        self.groups.iter().any(|g| {
            g.references_block(block_id)
                && g.primary_tags
                    .iter()
                    .any(|p| &p.block_id == block_id && name_key(&p.selected_text) == key)
        })
    }

    /// Discard every pending entry. Returns the blocks whose provisional highlights
    /// were rolled back, i.e. those not also highlighted by a committed tag.
    pub fn cancel(&mut self) -> Vec<SegmentId> {
        let pending = std::mem::take(&mut self.pending);
        let mut rolled_back: Vec<SegmentId> = Vec::new();
        for entry in &pending {
            if !self.is_committed_highlight(&entry.block_id, &entry.selected_text)
                && !rolled_back.contains(&entry.block_id)
            {
                rolled_back.push(entry.block_id.clone());
            }
        }
        info!(
            discarded = pending.len(),
            rolled_back = rolled_back.len(),
            "Cancelled pending tags"
        );
        rolled_back
    }

    // ---- commit ----

    /// Commit every pending entry under the master tag `name` ("Close Master").
    ///
    /// `context_of` resolves the structure context of a block. Each entry is
    /// checked against the masters of its own scope, and entries in different
    /// sections get one master per section. Validation happens before any
    /// mutation, so a rejected commit leaves the pending entries untouched.
    pub fn commit<F>(
        &mut self,
        name: &str,
        description: Option<&str>,
        context_of: F,
    ) -> Result<CommitReceipt, ValidationError>
    where
        F: Fn(&SegmentId) -> StructureContext,
    {
        let name = name.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyMasterName);
        }

        let mut scopes: Vec<TagScope> = Vec::new();
        for entry in self.pending.iter().filter(|e| !e.primaries.is_empty()) {
            let scope = context_of(&entry.block_id).scope();
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        if scopes.is_empty() {
            return Err(ValidationError::NothingToCommit);
        }

        let mut resolved: Vec<(TagScope, MasterTagId, bool)> = Vec::with_capacity(scopes.len());
        for scope in scopes {
            let (id, created) = match self.find_master(&scope, name) {
                Some(existing) if self.is_editing(&existing.id) => (existing.id.clone(), false),
                Some(existing) => {
                    return Err(ValidationError::MasterNameInUse {
                        name: existing.name.clone(),
                    })
                }
                None => (MasterTagId::generate(), true),
            };
            resolved.push((scope, id, created));
        }

        for (scope, id, created) in &resolved {
            if *created {
                self.masters.push(MasterTag {
                    id: id.clone(),
                    name: name.to_string(),
                    description: None,
                    color: color_for(name).to_string(),
                    is_closed: false,
                    scope: scope.clone(),
                    remote_id: None,
                });
            }
        }
        let master_for = |scope: &TagScope| {
            resolved
                .iter()
                .find(|(s, _, _)| s == scope)
                .map(|(_, id, _)| id.clone())
        };

        let pending = std::mem::take(&mut self.pending);
        let mut group_ids = Vec::new();
        for entry in pending.into_iter().filter(|e| !e.primaries.is_empty()) {
            let ranges: Vec<SelectionRange> = entry.range.iter().cloned().collect();
            let primary_tags = entry
                .primaries
                .into_iter()
                .map(|p| PrimaryTag {
                    id: p.existing_id.unwrap_or_else(PrimaryTagId::generate),
                    value: p.value.trim().to_string(),
                    display_name: None,
                    instance_index: None,
                    comment: p.comment.filter(|c| !c.trim().is_empty()),
                    secondary_tags: p.secondary_tags,
                    block_id: entry.block_id.clone(),
                    selected_text: entry.selected_text.clone(),
                    ranges: ranges.clone(),
                })
                .collect();

            let context = context_of(&entry.block_id);
            let Some(master_id) = master_for(&context.scope()) else {
                continue;
            };
            let mut group = TagGroup {
                id: TagGroupId::generate(),
                master_id,
                context,
                block_ids: Vec::new(),
                selected_text: entry.selected_text,
                selection_ranges: ranges,
                primary_tags,
                sync: SyncState::Pending,
            };
            group.recompute_block_ids();
            group_ids.push(group.id.clone());
            self.groups.push(group);
        }

        let description = description
            .map(str::trim)
            .filter(|d| !d.is_empty());
        for (_, id, _) in &resolved {
            if let Some(master) = self.master_mut(id) {
                master.is_closed = true;
                if let Some(description) = description {
                    master.description = Some(description.to_string());
                }
            }
            self.renumber(id);
        }
        self.editing = None;

        let (_, master_id, created_master) = resolved[0].clone();
        let master_ids: Vec<MasterTagId> = resolved.into_iter().map(|(_, id, _)| id).collect();
        info!(
            master = %master_id,
            name,
            created_master,
            scopes = master_ids.len(),
            groups = group_ids.len(),
            "Committed master tag"
        );
        Ok(CommitReceipt {
            master_id,
            created_master,
            master_ids,
            group_ids,
        })
    }

    /// Attach a primary tag to an already committed group. Closed masters only
    /// accept new primaries in edit mode.
    pub fn attach_primary(
        &mut self,
        group_id: &TagGroupId,
        primary: PendingPrimary,
    ) -> Result<PrimaryTagId, ValidationError> {
        if primary.value.trim().is_empty() {
            return Err(ValidationError::EmptyTagValue);
        }
        let group = self
            .group(group_id)
            .ok_or_else(|| ValidationError::UnknownTag(group_id.to_string()))?;
        let master = self
            .master(&group.master_id)
            .ok_or_else(|| ValidationError::UnknownTag(group.master_id.to_string()))?;
        if master.is_closed && !self.is_editing(&master.id) {
            return Err(ValidationError::MasterClosed {
                name: master.name.clone(),
            });
        }
        let master_id = master.id.clone();

        let block_id = group
            .selection_ranges
            .first()
            .map(|r| r.block_id.clone())
            .or_else(|| group.block_ids.first().cloned())
            .ok_or_else(|| ValidationError::UnknownTag(group_id.to_string()))?;
        let tag = PrimaryTag {
            id: primary.existing_id.unwrap_or_else(PrimaryTagId::generate),
            value: primary.value.trim().to_string(),
            display_name: None,
            instance_index: None,
            comment: primary.comment,
            secondary_tags: primary.secondary_tags,
            block_id,
            selected_text: group.selected_text.clone(),
            ranges: group.selection_ranges.clone(),
        };
        let id = tag.id.clone();

        if let Some(group) = self.group_mut(group_id) {
            group.primary_tags.push(tag);
            group.recompute_block_ids();
            group.sync = SyncState::Pending;
        }
        self.renumber(&master_id);
        Ok(id)
    }

    // ---- deletion ----

    /// Remove a primary tag from its group. Requires edit mode on the group's master.
    pub fn delete_primary(
        &mut self,
        group_id: &TagGroupId,
        primary: &PrimaryTagId,
    ) -> Result<(), ValidationError> {
        let group = self
            .group(group_id)
            .ok_or_else(|| ValidationError::UnknownTag(group_id.to_string()))?;
        let master_id = group.master_id.clone();
        if !self.is_editing(&master_id) {
            return Err(ValidationError::EditModeRequired);
        }

        let mut emptied = false;
        if let Some(group) = self.group_mut(group_id) {
            let before = group.primary_tags.len();
            group.primary_tags.retain(|p| &p.id != primary);
            if group.primary_tags.len() == before {
                return Err(ValidationError::UnknownTag(primary.to_string()));
            }
            group.recompute_block_ids();
            emptied = group.primary_tags.is_empty();
        }
        if emptied {
            self.groups.retain(|g| &g.id != group_id);
        }
        self.renumber(&master_id);
        Ok(())
    }

    /// Remove a master tag and every group under it. Requires edit mode on it.
    pub fn delete_master(&mut self, master: &MasterTagId) -> Result<Vec<TagGroupId>, ValidationError> {
        if self.master(master).is_none() {
            return Err(ValidationError::UnknownTag(master.to_string()));
        }
        if !self.is_editing(master) {
            return Err(ValidationError::EditModeRequired);
        }
        self.masters.retain(|m| &m.id != master);
        let mut removed = Vec::new();
        self.groups.retain(|g| {
            if &g.master_id == master {
                removed.push(g.id.clone());
                false
            } else {
                true
            }
        });
        self.editing = None;
        info!(master = %master, groups = removed.len(), "Deleted master tag");
        Ok(removed)
    }

    /// Number repeated primary names under a master: "Brother (1)", "Brother (2)".
    /// A reused impression counts once.
    fn renumber(&mut self, master: &MasterTagId) {
        let mut instances: HashMap<String, Vec<PrimaryTagId>> = HashMap::new();
        for primary in self
            .groups
            .iter()
            .filter(|g| &g.master_id == master)
            .flat_map(|g| g.primary_tags.iter())
        {
            let ids = instances.entry(name_key(&primary.value)).or_default();
            if !ids.contains(&primary.id) {
                ids.push(primary.id.clone());
            }
        }

        for primary in self
            .groups
            .iter_mut()
            .filter(|g| &g.master_id == master)
            .flat_map(|g| g.primary_tags.iter_mut())
        {
            let ids = &instances[&name_key(&primary.value)];
            if ids.len() > 1 {
                let index = ids.iter().position(|id| id == &primary.id).unwrap_or(0) + 1;
                primary.instance_index = Some(index as u32);
                primary.display_name = Some(format!("{} ({index})", primary.value));
            } else {
                primary.instance_index = None;
                primary.display_name = None;
            }
        }
    }

    // ---- remote reconciliation ----

    /// Apply ids and display names returned by the backend for a saved group.
    /// Updates are matched to the group's primary tags by position.
    pub(crate) fn apply_saved(
        &mut self,
        group_id: &TagGroupId,
        master_remote_id: Option<String>,
        updates: Vec<ImpressionUpdate>,
    ) {
        let Some(group) = self.group_mut(group_id) else {
            return;
        };
        let master_id = group.master_id.clone();
        for (primary, update) in group.primary_tags.iter_mut().zip(updates) {
            primary.id = update.id;
            if update.display_name.is_some() {
                primary.display_name = update.display_name;
                primary.instance_index = update.instance_index;
            }
        }
        group.sync.commit();

        if let (Some(remote), Some(master)) = (master_remote_id, self.master_mut(&master_id)) {
            master.remote_id = Some(remote);
        }
    }

    pub(crate) fn mark_failed(&mut self, group_id: &TagGroupId, reason: &str) {
        if let Some(group) = self.group_mut(group_id) {
            group.sync.fail(reason);
        }
    }

    // ---- highlights ----

    fn target_marks(&self, target: &HoverTarget, block_id: &SegmentId) -> Marks {
        let mut marks = Marks::default();
        match target {
            HoverTarget::Pending(id) => {
                for entry in self.pending.iter().filter(|e| &e.id == id) {
                    marks.add_pending(entry, block_id);
                }
            }
            HoverTarget::Group(id) => {
                for group in self.groups.iter().filter(|g| &g.id == id) {
                    marks.add_group(group, block_id, None);
                }
            }
            HoverTarget::Primary(id) => {
                for group in &self.groups {
                    marks.add_group(group, block_id, Some(id));
                }
            }
        }
        marks
    }

    /// Render a block's text with the highlights of pending and committed tags.
    pub fn highlights_for_block(
        &self,
        block_id: &SegmentId,
        text: &str,
        hover: Option<&HoverTarget>,
    ) -> Vec<HighlightSpan> {
        let mut marks = Marks::default();
        for entry in &self.pending {
            marks.add_pending(entry, block_id);
        }
        for group in &self.groups {
            marks.add_group(group, block_id, None);
        }
        let hovered = hover
            .map(|target| self.target_marks(target, block_id))
            .unwrap_or_default();

        if !marks.ranges.is_empty() {
            render(text, &marks.ranges, &hovered.ranges)
        } else {
            render(
                text,
                &phrase_ranges(text, &marks.phrases),
                &phrase_ranges(text, &hovered.phrases),
            )
        }
    }
}

/// Offset ranges and fallback phrases collected for one block
#[derive(Debug, Default)]
struct Marks {
    ranges: Vec<(usize, usize)>,
    phrases: Vec<String>,
}

impl Marks {
    fn add_pending(&mut self, entry: &PendingEntry, block_id: &SegmentId) {
        if &entry.block_id != block_id {
            return;
        }
        if let Some(range) = &entry.range {
            self.ranges.push(range.bounds());
        }
        self.phrases.push(entry.selected_text.clone());
    }

    fn add_group(&mut self, group: &TagGroup, block_id: &SegmentId, only: Option<&PrimaryTagId>) {
        if !group.references_block(block_id) {
            return;
        }
        for primary in &group.primary_tags {
            if only.is_some_and(|id| id != &primary.id) {
                continue;
            }
            self.ranges.extend(
                primary
                    .ranges
                    .iter()
                    .filter(|r| &r.block_id == block_id)
                    .map(SelectionRange::bounds),
            );
            if &primary.block_id == block_id {
                self.phrases.push(primary.selected_text.clone());
            }
        }
        if only.is_none() {
            self.ranges.extend(
                group
                    .selection_ranges
                    .iter()
                    .filter(|r| &r.block_id == block_id)
                    .map(SelectionRange::bounds),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segments::Segment;
    use crate::tags::highlight::{highlighted_text, SpanKind};
    use crate::tags::model::SectionId;
    use crate::tags::offsets::NodePoint;
    use chrono::Utc;

    fn store(blocks: &[(&str, &str)]) -> SegmentStore {
        let now = Utc::now();
        SegmentStore::from_segments(blocks.iter().enumerate().map(|(i, (id, text))| {
            let mut segment = Segment::new(i as f64, now);
            segment.id = SegmentId::from(*id);
            segment.content = text.to_string();
            segment.end_time_seconds = Some(i as f64 + 1.0);
            segment
        }))
    }

    fn untagged(_: &SegmentId) -> StructureContext {
        StructureContext::default()
    }

    fn in_section(id: &'static str) -> impl Fn(&SegmentId) -> StructureContext {
        move |_: &SegmentId| StructureContext {
            section_id: Some(SectionId::from(id)),
            subsection_id: None,
        }
    }

    fn select_text(engine: &mut TagEngine, store: &SegmentStore, block: &str, text: &str) -> PendingEntryId {
        engine
            .select(store, &SegmentId::from(block), &SelectionInput::Text(text.to_string()))
            .unwrap()
    }

    #[test]
    fn test_commit_selection_with_exact_offsets() {
        let store = store(&[("b1", "Always check the tire before driving")]);
        let mut engine = TagEngine::new();
        let input = SelectionInput::Nodes {
            nodes: vec!["Always check ".into(), "the tire".into(), " before driving".into()],
            anchor: NodePoint { node: 1, offset: 0 },
            focus: NodePoint { node: 1, offset: 8 },
        };
        let entry = engine.select(&store, &SegmentId::from("b1"), &input).unwrap();
        engine
            .add_pending_primary(&entry, PendingPrimary::new("tread-wear"))
            .unwrap();

        let receipt = engine.commit("Safety", None, untagged).unwrap();
        assert!(receipt.created_master);
        assert_eq!(receipt.group_ids.len(), 1);
        assert!(engine.pending().is_empty());

        let group = engine.group(&receipt.group_ids[0]).unwrap();
        assert_eq!(group.primary_tags.len(), 1);
        let primary = &group.primary_tags[0];
        assert_eq!(primary.value, "tread-wear");
        assert_eq!(primary.selected_text, "the tire");
        assert_eq!(
            primary.ranges,
            vec![SelectionRange::new(SegmentId::from("b1"), 13, 21)]
        );
        assert_eq!(group.block_ids, vec![SegmentId::from("b1")]);

        let master = engine.master(&receipt.master_id).unwrap();
        assert_eq!(master.name, "Safety");
        assert!(master.is_closed);
        assert_eq!(master.color, color_for("safety"));
    }

    #[test]
    fn test_each_selection_becomes_its_own_group() {
        let store = store(&[("b1", "my brother called"), ("b2", "brother again")]);
        let mut engine = TagEngine::new();
        let first = select_text(&mut engine, &store, "b1", "brother");
        let second = select_text(&mut engine, &store, "b2", "brother");
        let empty = select_text(&mut engine, &store, "b2", "again");
        engine.add_pending_primary(&first, PendingPrimary::new("Brother")).unwrap();
        engine.add_pending_primary(&second, PendingPrimary::new("Brother")).unwrap();
        assert!(engine.pending().iter().any(|e| e.id == empty));

        let receipt = engine.commit("Family", None, untagged).unwrap();
        assert_eq!(receipt.group_ids.len(), 2);

        let labels: Vec<String> = engine
            .groups_of(&receipt.master_id)
            .flat_map(|g| g.primary_tags.iter().map(|p| p.label().to_string()))
            .collect();
        assert_eq!(labels, vec!["Brother (1)", "Brother (2)"]);
    }

    #[test]
    fn test_reused_impression_is_numbered_once() {
        let store = store(&[("b1", "my brother called"), ("b2", "brother again")]);
        let mut engine = TagEngine::new();
        let first = select_text(&mut engine, &store, "b1", "brother");
        engine.add_pending_primary(&first, PendingPrimary::new("Brother")).unwrap();
        let receipt = engine.commit("Family", None, untagged).unwrap();
        let existing = engine.group(&receipt.group_ids[0]).unwrap().primary_tags[0].clone();

        engine.begin_edit(&receipt.master_id).unwrap();
        let second = select_text(&mut engine, &store, "b2", "brother");
        engine
            .add_pending_primary(&second, PendingPrimary::reusing(&existing))
            .unwrap();
        engine.commit("Family", None, untagged).unwrap();

        assert!(engine
            .groups()
            .iter()
            .flat_map(|g| g.primary_tags.iter())
            .all(|p| p.id == existing.id && p.display_name.is_none()));
    }

    #[test]
    fn test_master_name_unique_within_scope() {
        let store = store(&[("b1", "alpha beta"), ("b2", "gamma delta")]);
        let mut engine = TagEngine::new();

        let entry = select_text(&mut engine, &store, "b1", "alpha");
        engine.add_pending_primary(&entry, PendingPrimary::new("a")).unwrap();
        engine.commit("Safety", None, in_section("s1")).unwrap();

        let entry = select_text(&mut engine, &store, "b2", "gamma");
        engine.add_pending_primary(&entry, PendingPrimary::new("g")).unwrap();
        assert_eq!(
            engine.commit("SAFETY", None, in_section("s1")),
            Err(ValidationError::MasterNameInUse {
                name: "Safety".to_string()
            })
        );
        // Rejected commits keep the pending work
        assert_eq!(engine.pending().len(), 1);

        let receipt = engine.commit("safety", None, in_section("s2")).unwrap();
        assert!(receipt.created_master);
        assert_eq!(engine.masters().len(), 2);
    }

    fn by_block(map: &'static [(&'static str, &'static str)]) -> impl Fn(&SegmentId) -> StructureContext {
        move |block: &SegmentId| StructureContext {
            section_id: map
                .iter()
                .find(|(b, _)| *b == block.as_str())
                .map(|(_, section)| SectionId::from(*section)),
            subsection_id: None,
        }
    }

    #[test]
    fn test_commit_across_sections_creates_master_per_section() {
        const SECTIONS: &[(&str, &str)] = &[("b1", "s1"), ("b2", "s2"), ("b3", "s2")];
        let store = store(&[("b1", "worn tread"), ("b2", "flat tire"), ("b3", "bald tire")]);
        let mut engine = TagEngine::new();

        let first = select_text(&mut engine, &store, "b1", "tread");
        let second = select_text(&mut engine, &store, "b2", "tire");
        engine.add_pending_primary(&first, PendingPrimary::new("wear")).unwrap();
        engine.add_pending_primary(&second, PendingPrimary::new("puncture")).unwrap();

        let receipt = engine.commit("Safety", None, by_block(SECTIONS)).unwrap();
        assert_eq!(receipt.master_ids.len(), 2);
        assert_eq!(receipt.master_id, receipt.master_ids[0]);
        for (group_id, section) in receipt.group_ids.iter().zip(["s1", "s2"]) {
            let group = engine.group(group_id).unwrap();
            let master = engine.master(&group.master_id).unwrap();
            assert_eq!(master.scope, TagScope::Section(SectionId::from(section)));
            assert!(master.is_closed);
        }

        // The name is now taken in the second section too
        let third = select_text(&mut engine, &store, "b3", "tire");
        engine.add_pending_primary(&third, PendingPrimary::new("bald")).unwrap();
        assert_eq!(
            engine.commit("safety", None, by_block(SECTIONS)),
            Err(ValidationError::MasterNameInUse {
                name: "Safety".to_string()
            })
        );
        let in_s2 = engine
            .masters()
            .iter()
            .filter(|m| m.scope == TagScope::Section(SectionId::from("s2")))
            .count();
        assert_eq!(in_s2, 1);
    }

    #[test]
    fn test_commit_rejected_when_any_section_has_the_name() {
        const SECTIONS: &[(&str, &str)] = &[("b1", "s1"), ("b2", "s2")];
        let store = store(&[("b1", "worn tread"), ("b2", "flat tire")]);
        let mut engine = TagEngine::new();

        let entry = select_text(&mut engine, &store, "b2", "tire");
        engine.add_pending_primary(&entry, PendingPrimary::new("puncture")).unwrap();
        engine.commit("Safety", None, by_block(SECTIONS)).unwrap();

        let first = select_text(&mut engine, &store, "b1", "tread");
        let second = select_text(&mut engine, &store, "b2", "flat");
        engine.add_pending_primary(&first, PendingPrimary::new("wear")).unwrap();
        engine.add_pending_primary(&second, PendingPrimary::new("flat")).unwrap();

        assert!(matches!(
            engine.commit("SAFETY", None, by_block(SECTIONS)),
            Err(ValidationError::MasterNameInUse { .. })
        ));
        // Nothing was created for the first section either
        assert_eq!(engine.masters().len(), 1);
        assert_eq!(engine.pending().len(), 2);
    }

    #[test]
    fn test_untagged_area_is_its_own_scope() {
        let store = store(&[("b1", "alpha beta")]);
        let mut engine = TagEngine::new();
        let entry = select_text(&mut engine, &store, "b1", "alpha");
        engine.add_pending_primary(&entry, PendingPrimary::new("a")).unwrap();
        engine.commit("Mood", None, untagged).unwrap();

        let entry = select_text(&mut engine, &store, "b1", "beta");
        engine.add_pending_primary(&entry, PendingPrimary::new("b")).unwrap();
        assert!(matches!(
            engine.commit("mood", None, untagged),
            Err(ValidationError::MasterNameInUse { .. })
        ));
    }

    #[test]
    fn test_edit_mode_allows_reusing_name() {
        let store = store(&[("b1", "alpha beta")]);
        let mut engine = TagEngine::new();
        let entry = select_text(&mut engine, &store, "b1", "alpha");
        engine.add_pending_primary(&entry, PendingPrimary::new("a")).unwrap();
        let receipt = engine.commit("Mood", Some("how people feel"), untagged).unwrap();

        engine.begin_edit(&receipt.master_id).unwrap();
        let entry = select_text(&mut engine, &store, "b1", "beta");
        engine.add_pending_primary(&entry, PendingPrimary::new("b")).unwrap();
        let second = engine.commit("mood", None, untagged).unwrap();

        assert_eq!(second.master_id, receipt.master_id);
        assert!(!second.created_master);
        assert_eq!(engine.groups_of(&receipt.master_id).count(), 2);
        assert_eq!(
            engine.master(&receipt.master_id).unwrap().description.as_deref(),
            Some("how people feel")
        );
        assert!(engine.editing().is_none());
    }

    #[test]
    fn test_commit_validation() {
        let store = store(&[("b1", "alpha beta")]);
        let mut engine = TagEngine::new();
        assert_eq!(
            engine.commit("Mood", None, untagged),
            Err(ValidationError::NothingToCommit)
        );
        select_text(&mut engine, &store, "b1", "alpha");
        assert_eq!(
            engine.commit("Mood", None, untagged),
            Err(ValidationError::NothingToCommit)
        );
        assert_eq!(
            engine.commit("   ", None, untagged),
            Err(ValidationError::EmptyMasterName)
        );
    }

    #[test]
    fn test_closed_master_requires_edit_mode_to_attach() {
        let store = store(&[("b1", "alpha beta")]);
        let mut engine = TagEngine::new();
        let entry = select_text(&mut engine, &store, "b1", "alpha");
        engine.add_pending_primary(&entry, PendingPrimary::new("a")).unwrap();
        let receipt = engine.commit("Mood", None, untagged).unwrap();
        let group_id = receipt.group_ids[0].clone();

        assert_eq!(
            engine.attach_primary(&group_id, PendingPrimary::new("calm")),
            Err(ValidationError::MasterClosed {
                name: "Mood".to_string()
            })
        );

        engine.begin_edit(&receipt.master_id).unwrap();
        let id = engine
            .attach_primary(&group_id, PendingPrimary::new("calm").with_comment("tone"))
            .unwrap();
        let group = engine.group(&group_id).unwrap();
        assert_eq!(group.primary_tags.len(), 2);
        let attached = group.primary(&id).unwrap();
        assert_eq!(attached.selected_text, "alpha");
        assert_eq!(attached.comment.as_deref(), Some("tone"));
    }

    #[test]
    fn test_delete_primary_recomputes_blocks() {
        let store = store(&[("b1", "alpha beta")]);
        let mut engine = TagEngine::new();
        let entry = select_text(&mut engine, &store, "b1", "alpha");
        engine.add_pending_primary(&entry, PendingPrimary::new("a")).unwrap();
        engine.add_pending_primary(&entry, PendingPrimary::new("b")).unwrap();
        engine.add_pending_secondary(&entry, 0, "sub").unwrap();
        let receipt = engine.commit("Mood", None, untagged).unwrap();
        let group_id = receipt.group_ids[0].clone();
        let first = engine.group(&group_id).unwrap().primary_tags[0].clone();
        assert_eq!(first.secondary_tags, vec![SecondaryTag { value: "sub".into() }]);

        assert_eq!(
            engine.delete_primary(&group_id, &first.id),
            Err(ValidationError::EditModeRequired)
        );

        engine.begin_edit(&receipt.master_id).unwrap();
        engine.delete_primary(&group_id, &first.id).unwrap();
        let group = engine.group(&group_id).unwrap();
        assert_eq!(group.primary_tags.len(), 1);
        assert!(group.references_block(&SegmentId::from("b1")));

        let last = group.primary_tags[0].id.clone();
        engine.delete_primary(&group_id, &last).unwrap();
        assert!(engine.group(&group_id).is_none());
    }

    #[test]
    fn test_delete_master_removes_groups() {
        let store = store(&[("b1", "alpha beta")]);
        let mut engine = TagEngine::new();
        let entry = select_text(&mut engine, &store, "b1", "alpha");
        engine.add_pending_primary(&entry, PendingPrimary::new("a")).unwrap();
        let receipt = engine.commit("Mood", None, untagged).unwrap();

        assert_eq!(
            engine.delete_master(&receipt.master_id),
            Err(ValidationError::EditModeRequired)
        );
        engine.begin_edit(&receipt.master_id).unwrap();
        let removed = engine.delete_master(&receipt.master_id).unwrap();
        assert_eq!(removed, receipt.group_ids);
        assert!(engine.masters().is_empty());
        assert!(engine.groups().is_empty());

        let spans = engine.highlights_for_block(&SegmentId::from("b1"), "alpha beta", None);
        assert!(spans.iter().all(|s| s.kind == SpanKind::Plain));
    }

    #[test]
    fn test_cancel_rolls_back_uncommitted_highlights() {
        let store = store(&[("b1", "alpha beta"), ("b2", "gamma")]);
        let mut engine = TagEngine::new();
        let entry = select_text(&mut engine, &store, "b1", "alpha");
        engine.add_pending_primary(&entry, PendingPrimary::new("a")).unwrap();
        engine.commit("Mood", None, untagged).unwrap();

        select_text(&mut engine, &store, "b1", "alpha");
        select_text(&mut engine, &store, "b2", "gamma");
        let rolled_back = engine.cancel();

        assert_eq!(rolled_back, vec![SegmentId::from("b2")]);
        assert!(engine.pending().is_empty());
        assert_eq!(engine.groups().len(), 1);
    }

    #[test]
    fn test_duplicate_selection_reuses_entry() {
        let store = store(&[("b1", "alpha beta")]);
        let mut engine = TagEngine::new();
        let a = select_text(&mut engine, &store, "b1", "alpha");
        let b = select_text(&mut engine, &store, "b1", "alpha");
        assert_eq!(a, b);
        assert_eq!(engine.pending().len(), 1);

        assert_eq!(
            engine.select(&store, &SegmentId::from("b9"), &SelectionInput::Text("x".into())),
            Err(ValidationError::UnknownBlock("b9".to_string()))
        );
        assert_eq!(
            engine.select(&store, &SegmentId::from("b1"), &SelectionInput::Text("zeta".into())),
            Err(ValidationError::InvalidSelection)
        );
    }

    #[test]
    fn test_highlights_combine_pending_and_committed() {
        let text = "alpha beta gamma";
        let store = store(&[("b1", text)]);
        let mut engine = TagEngine::new();
        let entry = select_text(&mut engine, &store, "b1", "alpha");
        engine.add_pending_primary(&entry, PendingPrimary::new("a")).unwrap();
        let receipt = engine.commit("Mood", None, untagged).unwrap();
        let pending = select_text(&mut engine, &store, "b1", "gamma");

        let spans = engine.highlights_for_block(&SegmentId::from("b1"), text, None);
        assert_eq!(highlighted_text(&spans), vec!["alpha", "gamma"]);

        let hover = HoverTarget::Group(receipt.group_ids[0].clone());
        let spans = engine.highlights_for_block(&SegmentId::from("b1"), text, Some(&hover));
        let hovered: Vec<&str> = spans
            .iter()
            .filter(|s| s.kind == SpanKind::Hovered)
            .map(|s| s.text.as_str())
            .collect();
        assert_eq!(hovered, vec!["alpha"]);

        let hover = HoverTarget::Pending(pending);
        let spans = engine.highlights_for_block(&SegmentId::from("b1"), text, Some(&hover));
        assert!(spans
            .iter()
            .any(|s| s.kind == SpanKind::Hovered && s.text == "gamma"));
    }

    #[test]
    fn test_highlights_fall_back_to_phrases() {
        let mut engine = TagEngine::from_parts(
            vec![MasterTag {
                id: MasterTagId::from("m"),
                name: "Mood".into(),
                description: None,
                color: color_for("Mood").into(),
                is_closed: true,
                scope: TagScope::Untagged,
                remote_id: Some("42".into()),
            }],
            vec![TagGroup {
                id: TagGroupId::from("g"),
                master_id: MasterTagId::from("m"),
                context: StructureContext::default(),
                block_ids: vec![SegmentId::from("b1")],
                selected_text: "Happy".into(),
                selection_ranges: Vec::new(),
                primary_tags: vec![PrimaryTag {
                    id: PrimaryTagId::from("p"),
                    value: "joy".into(),
                    display_name: None,
                    instance_index: None,
                    comment: None,
                    secondary_tags: Vec::new(),
                    block_id: SegmentId::from("b1"),
                    selected_text: "Happy".into(),
                    ranges: Vec::new(),
                }],
                sync: SyncState::Committed,
            }],
        );

        let spans = engine.highlights_for_block(&SegmentId::from("b1"), "so happy today, happy", None);
        assert_eq!(highlighted_text(&spans), vec!["happy", "happy"]);

        engine.apply_saved(
            &TagGroupId::from("g"),
            None,
            vec![ImpressionUpdate {
                id: PrimaryTagId::from("srv-1"),
                display_name: None,
                instance_index: None,
            }],
        );
        assert_eq!(
            engine.group(&TagGroupId::from("g")).unwrap().primary_tags[0].id,
            PrimaryTagId::from("srv-1")
        );
    }
}
