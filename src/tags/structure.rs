//! Section and subsection boundaries over the block sequence
//!
//! Positions are block boundaries: boundary `i` sits before block `i`, so a
//! section opened at `start` and closed at `end` covers blocks `start..end`.
//! Open items are tracked on a stack so the "is anything open" checks and the
//! innermost-first closing order need no rescans.

use super::model::{SectionId, StructureContext, SubsectionId};
use crate::error::ValidationError;
use crate::sync::SyncState;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub id: SectionId,
    pub name: String,
    pub start_block_index: usize,
    /// Exclusive end boundary, `None` while open
    pub end_block_index: Option<usize>,
    #[serde(default)]
    pub sync: SyncState,
}

impl Section {
    pub fn is_open(&self) -> bool {
        self.end_block_index.is_none()
    }

    /// Whether boundary (or block index) `position` lies inside the section
    pub fn contains(&self, position: usize) -> bool {
        position >= self.start_block_index && self.end_block_index.map_or(true, |end| position < end)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subsection {
    pub id: SubsectionId,
    pub section_id: SectionId,
    pub name: String,
    pub start_block_index: usize,
    pub end_block_index: Option<usize>,
    #[serde(default)]
    pub sync: SyncState,
}

impl Subsection {
    pub fn is_open(&self) -> bool {
        self.end_block_index.is_none()
    }

    pub fn contains(&self, position: usize) -> bool {
        position >= self.start_block_index && self.end_block_index.map_or(true, |end| position < end)
    }
}

/// Reference to a section or subsection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StructureItem {
    Section(SectionId),
    Subsection(SubsectionId),
}

#[derive(Debug, Clone, Default)]
pub struct SectionTree {
    sections: Vec<Section>,
    subsections: Vec<Subsection>,
    open_stack: Vec<StructureItem>,
    block_count: usize,
}

impl SectionTree {
    pub fn new(block_count: usize) -> Self {
        Self {
            block_count,
            ..Self::default()
        }
    }

    /// Rebuild from loaded records
    pub fn from_parts(
        sections: Vec<Section>,
        subsections: Vec<Subsection>,
        block_count: usize,
    ) -> Self {
        let mut tree = Self {
            sections,
            subsections,
            open_stack: Vec::new(),
            block_count,
        };
        tree.sections.sort_by_key(|s| s.start_block_index);
        tree.subsections.sort_by_key(|s| s.start_block_index);

        tree.open_stack.extend(
            tree.sections
                .iter()
                .filter(|s| s.is_open())
                .map(|s| StructureItem::Section(s.id.clone())),
        );
        tree.open_stack.extend(
            tree.subsections
                .iter()
                .filter(|s| s.is_open())
                .map(|s| StructureItem::Subsection(s.id.clone())),
        );
        if tree.open_stack.len() > 2 {
            warn!(
                open = tree.open_stack.len(),
                "Loaded structure has more open items than allowed"
            );
        }
        tree
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn set_block_count(&mut self, block_count: usize) {
        self.block_count = block_count;
    }

    /// Block `index` was deleted: shift every boundary after it down by one.
    /// Closed items left covering no block are dropped and returned. Shifted
    /// items go back to `Pending` until they are saved again.
    pub fn remove_block(&mut self, index: usize) -> Vec<StructureItem> {
        fn shift(position: &mut usize, index: usize) -> bool {
            if *position > index {
                *position -= 1;
                true
            } else {
                false
            }
        }

        for section in &mut self.sections {
            let mut moved = shift(&mut section.start_block_index, index);
            if let Some(end) = section.end_block_index.as_mut() {
                moved |= shift(end, index);
            }
            if moved {
                section.sync = SyncState::Pending;
            }
        }
        for sub in &mut self.subsections {
            let mut moved = shift(&mut sub.start_block_index, index);
            if let Some(end) = sub.end_block_index.as_mut() {
                moved |= shift(end, index);
            }
            if moved {
                sub.sync = SyncState::Pending;
            }
        }
        self.block_count = self.block_count.saturating_sub(1);

        let mut dropped = Vec::new();
        let empty_sections: Vec<SectionId> = self
            .sections
            .iter()
            .filter(|s| s.end_block_index == Some(s.start_block_index))
            .map(|s| s.id.clone())
            .collect();
        for id in &empty_sections {
            self.sections.retain(|s| &s.id != id);
            dropped.push(StructureItem::Section(id.clone()));
        }
        self.subsections.retain(|sub| {
            let empty = sub.end_block_index == Some(sub.start_block_index);
            if empty || empty_sections.contains(&sub.section_id) {
                dropped.push(StructureItem::Subsection(sub.id.clone()));
                false
            } else {
                true
            }
        });
        self.open_stack.retain(|open| !dropped.contains(open));
        if !dropped.is_empty() {
            info!(index, dropped = dropped.len(), "Dropped structure items left empty by block removal");
        }
        dropped
    }

    pub fn sections(&self) -> &[Section] {
        &self.sections
    }

    pub fn subsections(&self) -> &[Subsection] {
        &self.subsections
    }

    pub fn section(&self, id: &SectionId) -> Option<&Section> {
        self.sections.iter().find(|s| &s.id == id)
    }

    pub fn subsection(&self, id: &SubsectionId) -> Option<&Subsection> {
        self.subsections.iter().find(|s| &s.id == id)
    }

    pub fn subsections_of<'a>(&'a self, section: &'a SectionId) -> impl Iterator<Item = &'a Subsection> {
        self.subsections.iter().filter(move |s| &s.section_id == section)
    }

    pub(crate) fn section_mut(&mut self, id: &SectionId) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| &s.id == id)
    }

    pub(crate) fn subsection_mut(&mut self, id: &SubsectionId) -> Option<&mut Subsection> {
        self.subsections.iter_mut().find(|s| &s.id == id)
    }

    /// Open items, innermost last
    pub fn open_items(&self) -> &[StructureItem] {
        &self.open_stack
    }

    pub fn open_section(&self) -> Option<&Section> {
        self.open_stack.iter().find_map(|item| match item {
            StructureItem::Section(id) => self.section(id),
            StructureItem::Subsection(_) => None,
        })
    }

    pub fn open_subsection(&self) -> Option<&Subsection> {
        self.open_stack.iter().find_map(|item| match item {
            StructureItem::Subsection(id) => self.subsection(id),
            StructureItem::Section(_) => None,
        })
    }

    /// Section and subsection enclosing a boundary or block index
    pub fn context_at(&self, position: usize) -> StructureContext {
        let section = self.sections.iter().find(|s| s.contains(position));
        let subsection = section.and_then(|section| {
            self.subsections_of(&section.id)
                .find(|sub| sub.contains(position))
        });
        StructureContext {
            section_id: section.map(|s| s.id.clone()),
            subsection_id: subsection.map(|s| s.id.clone()),
        }
    }

    fn check_position(&self, position: usize) -> Result<(), ValidationError> {
        if position > self.block_count {
            return Err(ValidationError::PositionOutOfRange {
                position,
                len: self.block_count,
            });
        }
        Ok(())
    }

    /// Open a section at `position`.
    pub fn add_section(
        &mut self,
        name: impl Into<String>,
        position: usize,
    ) -> Result<SectionId, ValidationError> {
        self.check_position(position)?;
        if self.context_at(position).section_id.is_some() {
            return Err(ValidationError::SectionNesting);
        }
        if let Some(open) = self.open_section() {
            return Err(ValidationError::SectionAlreadyOpen {
                name: open.name.clone(),
            });
        }

        let section = Section {
            id: SectionId::generate(),
            name: name.into(),
            start_block_index: position,
            end_block_index: None,
            sync: SyncState::Pending,
        };
        let id = section.id.clone();
        info!(section = %id, name = %section.name, position, "Opened section");

        let index = self
            .sections
            .partition_point(|s| s.start_block_index <= position);
        self.sections.insert(index, section);
        self.open_stack.push(StructureItem::Section(id.clone()));
        Ok(id)
    }

    /// Open a subsection at `position` inside the enclosing section.
    pub fn add_subsection(
        &mut self,
        name: impl Into<String>,
        position: usize,
    ) -> Result<SubsectionId, ValidationError> {
        self.check_position(position)?;
        let context = self.context_at(position);
        let Some(section_id) = context.section_id else {
            return Err(ValidationError::SubsectionOutsideSection);
        };
        if context.subsection_id.is_some() {
            return Err(ValidationError::SubsectionNesting);
        }
        if let Some(open) = self.open_subsection() {
            return Err(ValidationError::SubsectionAlreadyOpen {
                name: open.name.clone(),
            });
        }

        let subsection = Subsection {
            id: SubsectionId::generate(),
            section_id,
            name: name.into(),
            start_block_index: position,
            end_block_index: None,
            sync: SyncState::Pending,
        };
        let id = subsection.id.clone();
        info!(subsection = %id, name = %subsection.name, position, "Opened subsection");

        let index = self
            .subsections
            .partition_point(|s| s.start_block_index <= position);
        self.subsections.insert(index, subsection);
        self.open_stack.push(StructureItem::Subsection(id.clone()));
        Ok(id)
    }

    /// Close the innermost open item at `position`.
    pub fn close_innermost(&mut self, position: usize) -> Result<StructureItem, ValidationError> {
        self.check_position(position)?;
        let item = self
            .open_stack
            .last()
            .cloned()
            .ok_or(ValidationError::NothingToClose)?;

        match &item {
            StructureItem::Section(id) => self.validate_section_end(id, position)?,
            StructureItem::Subsection(id) => self.validate_subsection_end(id, position)?,
        }

        match &item {
            StructureItem::Section(id) => {
                if let Some(section) = self.section_mut(id) {
                    section.end_block_index = Some(position);
                    section.sync = SyncState::Pending;
                }
            }
            StructureItem::Subsection(id) => {
                if let Some(subsection) = self.subsection_mut(id) {
                    subsection.end_block_index = Some(position);
                    subsection.sync = SyncState::Pending;
                }
            }
        }
        self.open_stack.pop();
        info!(?item, position, "Closed structure item");
        Ok(item)
    }

    fn validate_section_end(&self, id: &SectionId, end: usize) -> Result<(), ValidationError> {
        let section = self
            .section(id)
            .ok_or_else(|| ValidationError::UnknownStructure(id.to_string()))?;
        let start = section.start_block_index;
        if end <= start {
            return Err(ValidationError::CloseBeforeStart {
                start,
                position: end,
            });
        }
        if let Some(other) = self
            .sections
            .iter()
            .find(|s| &s.id != id && s.start_block_index > start && s.start_block_index < end)
        {
            return Err(ValidationError::WouldEnclose {
                name: other.name.clone(),
            });
        }
        if let Some(sub) = self
            .subsections_of(id)
            .find(|sub| sub.start_block_index >= end || sub.end_block_index.is_some_and(|e| e > end))
        {
            return Err(ValidationError::WouldEnclose {
                name: sub.name.clone(),
            });
        }
        Ok(())
    }

    fn validate_subsection_end(&self, id: &SubsectionId, end: usize) -> Result<(), ValidationError> {
        let subsection = self
            .subsection(id)
            .ok_or_else(|| ValidationError::UnknownStructure(id.to_string()))?;
        let start = subsection.start_block_index;
        if end <= start {
            return Err(ValidationError::CloseBeforeStart {
                start,
                position: end,
            });
        }
        if let Some(section_end) = self
            .section(&subsection.section_id)
            .and_then(|s| s.end_block_index)
        {
            if end > section_end {
                return Err(ValidationError::CloseOutsideParent { section_end });
            }
        }
        if let Some(other) = self.subsections_of(&subsection.section_id).find(|s| {
            &s.id != id && s.start_block_index > start && s.start_block_index < end
        }) {
            return Err(ValidationError::WouldEnclose {
                name: other.name.clone(),
            });
        }
        Ok(())
    }

    /// Remove an item's close marker, reopening it.
    pub fn delete_close_marker(&mut self, item: &StructureItem) -> Result<(), ValidationError> {
        match item {
            StructureItem::Section(id) => {
                let section = self
                    .section(id)
                    .ok_or_else(|| ValidationError::UnknownStructure(id.to_string()))?;
                if section.is_open() {
                    return Ok(());
                }
                if self.open_section().is_some() {
                    return Err(ValidationError::CannotReopen { kind: "section" });
                }
                let start = section.start_block_index;
                if let Some(later) = self.sections.iter().find(|s| s.start_block_index > start) {
                    return Err(ValidationError::WouldEnclose {
                        name: later.name.clone(),
                    });
                }
                if let Some(section) = self.section_mut(id) {
                    section.end_block_index = None;
                    section.sync = SyncState::Pending;
                }
            }
            StructureItem::Subsection(id) => {
                let subsection = self
                    .subsection(id)
                    .ok_or_else(|| ValidationError::UnknownStructure(id.to_string()))?;
                if subsection.is_open() {
                    return Ok(());
                }
                if self.open_subsection().is_some() {
                    return Err(ValidationError::CannotReopen { kind: "subsection" });
                }
                let start = subsection.start_block_index;
                if let Some(later) = self
                    .subsections_of(&subsection.section_id)
                    .find(|s| s.start_block_index > start)
                {
                    return Err(ValidationError::WouldEnclose {
                        name: later.name.clone(),
                    });
                }
                if let Some(subsection) = self.subsection_mut(id) {
                    subsection.end_block_index = None;
                    subsection.sync = SyncState::Pending;
                }
            }
        }
        self.open_stack.push(item.clone());
        info!(?item, "Reopened structure item");
        Ok(())
    }

    /// Remove an item entirely. Removing a section also removes its subsections.
    /// Returns every removed item.
    pub fn delete_open_marker(
        &mut self,
        item: &StructureItem,
    ) -> Result<Vec<StructureItem>, ValidationError> {
        let mut removed = Vec::new();
        match item {
            StructureItem::Section(id) => {
                let index = self
                    .sections
                    .iter()
                    .position(|s| &s.id == id)
                    .ok_or_else(|| ValidationError::UnknownStructure(id.to_string()))?;
                self.sections.remove(index);
                removed.push(item.clone());
                self.subsections.retain(|sub| {
                    if &sub.section_id == id {
                        removed.push(StructureItem::Subsection(sub.id.clone()));
                        false
                    } else {
                        true
                    }
                });
            }
            StructureItem::Subsection(id) => {
                let index = self
                    .subsections
                    .iter()
                    .position(|s| &s.id == id)
                    .ok_or_else(|| ValidationError::UnknownStructure(id.to_string()))?;
                self.subsections.remove(index);
                removed.push(item.clone());
            }
        }
        self.open_stack.retain(|open| !removed.contains(open));
        info!(removed = removed.len(), "Deleted structure item");
        Ok(removed)
    }
}
