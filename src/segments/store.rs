//! Ordered, id-keyed segment store
//!
//! Segments are held in a map keyed by id plus an order vector sorted by start
//! time. Every mutation keeps the order and tiling invariants.

use super::segment::{Assignment, Segment, SegmentId, SegmentState};
use crate::error::ValidationError;
use crate::speakers::SpeakerId;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Maximum gap or overlap between consecutive segments that still counts as tiled
pub const TILING_EPSILON: f64 = 0.05;

/// Result of deleting a segment
#[derive(Debug, Clone, PartialEq)]
pub enum Deletion {
    Removed(SegmentId),
    /// The last segment was deleted and replaced by an empty placeholder
    ReplacedWithPlaceholder { removed: SegmentId, placeholder: SegmentId },
}

#[derive(Debug, Clone, Default)]
pub struct SegmentStore {
    order: Vec<SegmentId>,
    segments: HashMap<SegmentId, Segment>,
}

impl SegmentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from segments in any order. Later duplicates of an id are dropped.
    pub fn from_segments(segments: impl IntoIterator<Item = Segment>) -> Self {
        let mut sorted: Vec<Segment> = Vec::new();
        for segment in segments {
            if !sorted.iter().any(|s| s.id == segment.id) {
                sorted.push(segment);
            }
        }
        sorted.sort_by(|a, b| a.start_time_seconds.total_cmp(&b.start_time_seconds));

        let mut store = Self::new();
        for segment in sorted {
            store.order.push(segment.id.clone());
            store.segments.insert(segment.id.clone(), segment);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &SegmentId) -> Option<&Segment> {
        self.segments.get(id)
    }

    /// Segments in timeline order
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.order.iter().filter_map(|id| self.segments.get(id))
    }

    pub fn ids(&self) -> &[SegmentId] {
        &self.order
    }

    pub fn index_of(&self, id: &SegmentId) -> Option<usize> {
        self.order.iter().position(|s| s == id)
    }

    pub fn at_index(&self, index: usize) -> Option<&Segment> {
        self.order.get(index).and_then(|id| self.segments.get(id))
    }

    pub fn first(&self) -> Option<&Segment> {
        self.at_index(0)
    }

    pub fn last(&self) -> Option<&Segment> {
        self.order.last().and_then(|id| self.segments.get(id))
    }

    pub fn is_last(&self, id: &SegmentId) -> bool {
        self.order.last() == Some(id)
    }

    pub fn next_after(&self, id: &SegmentId) -> Option<&Segment> {
        let index = self.index_of(id)?;
        self.at_index(index + 1)
    }

    /// Segment whose interval contains `position`.
    ///
    /// Positions before the first segment map to the first segment and positions
    /// past every interval map to the last one.
    pub fn segment_at(&self, position: f64) -> Option<&Segment> {
        let first = self.first()?;
        if position < first.start_time_seconds {
            return Some(first);
        }
        self.iter()
            .find(|s| s.contains(position))
            .or_else(|| self.last())
    }

    fn segment_mut(&mut self, id: &SegmentId) -> Result<&mut Segment, ValidationError> {
        self.segments
            .get_mut(id)
            .ok_or_else(|| ValidationError::UnknownSegment(id.to_string()))
    }

    /// Assign a speaker, clearing any state. Selecting the current speaker again
    /// clears the assignment.
    pub fn assign_speaker(
        &mut self,
        id: &SegmentId,
        speaker: SpeakerId,
    ) -> Result<&Assignment, ValidationError> {
        let segment = self.segment_mut(id)?;
        segment.assignment = match &segment.assignment {
            Assignment::Speaker(current) if *current == speaker => Assignment::Unassigned,
            _ => Assignment::Speaker(speaker),
        };
        Ok(&segment.assignment)
    }

    /// Assign a state, clearing any speaker. Selecting the current state again
    /// clears the assignment.
    pub fn assign_state(
        &mut self,
        id: &SegmentId,
        state: SegmentState,
    ) -> Result<&Assignment, ValidationError> {
        let segment = self.segment_mut(id)?;
        segment.assignment = match segment.assignment {
            Assignment::State(current) if current == state => Assignment::Unassigned,
            _ => Assignment::State(state),
        };
        Ok(&segment.assignment)
    }

    /// Clear every assignment pointing at `speaker`. Returns how many were cleared.
    pub fn clear_speaker(&mut self, speaker: &SpeakerId) -> usize {
        let mut cleared = 0;
        for segment in self.segments.values_mut() {
            if segment.assignment.speaker() == Some(speaker) {
                segment.assignment = Assignment::Unassigned;
                cleared += 1;
            }
        }
        cleared
    }

    pub fn set_content(
        &mut self,
        id: &SegmentId,
        content: impl Into<String>,
    ) -> Result<(), ValidationError> {
        self.segment_mut(id)?.content = content.into();
        Ok(())
    }

    /// Stamp the end time of a segment and return the boundary actually used.
    /// The end is kept between the segment start and the next segment's end.
    pub fn close_segment(&mut self, id: &SegmentId, end: f64) -> Result<f64, ValidationError> {
        let index = self
            .index_of(id)
            .ok_or_else(|| ValidationError::UnknownSegment(id.to_string()))?;
        let next_end = self
            .order
            .get(index + 1)
            .and_then(|next| self.segments.get(next))
            .and_then(|next| next.end_time_seconds);
        let segment = self.segment_mut(id)?;
        let mut end = end;
        if let Some(limit) = next_end {
            end = end.min(limit);
        }
        let end = end.max(segment.start_time_seconds);
        segment.end_time_seconds = Some(end);

        // Keep the following segment tiled against the new boundary
        if let Some(next_id) = self.order.get(index + 1).cloned() {
            if let Some(next) = self.segments.get_mut(&next_id) {
                if (next.start_time_seconds - end).abs() > TILING_EPSILON {
                    next.start_time_seconds = end;
                }
            }
        }
        Ok(end)
    }

    /// Append an open segment starting at `start` with a fresh deadline anchor.
    pub fn append_segment(&mut self, start: f64, now: DateTime<Utc>) -> SegmentId {
        let segment = Segment::new(start, now);
        let id = segment.id.clone();
        self.order.push(id.clone());
        self.segments.insert(id.clone(), segment);
        id
    }

    /// Delete a segment, keeping the timeline tiled. Deleting the only segment
    /// leaves an empty placeholder behind.
    pub fn delete(&mut self, id: &SegmentId, now: DateTime<Utc>) -> Result<Deletion, ValidationError> {
        let index = self
            .index_of(id)
            .ok_or_else(|| ValidationError::UnknownSegment(id.to_string()))?;

        let Some(removed) = self.segments.remove(id) else {
            return Err(ValidationError::UnknownSegment(id.to_string()));
        };
        self.order.remove(index);

        if self.order.is_empty() {
            let placeholder = self.append_segment(0.0, now);
            return Ok(Deletion::ReplacedWithPlaceholder {
                removed: removed.id,
                placeholder,
            });
        }

        if index > 0 {
            let previous = self.order[index - 1].clone();
            if let Some(prev) = self.segments.get_mut(&previous) {
                prev.end_time_seconds = removed.end_time_seconds;
            }
        } else if let Some(next) = self.segments.get_mut(&self.order[0]) {
            next.start_time_seconds = removed.start_time_seconds;
        }

        Ok(Deletion::Removed(removed.id))
    }

    /// Check ordering and tiling. Only the last segment may be open.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.order.len() != self.segments.len() {
            return Err("order and segment map disagree".to_string());
        }
        let segments: Vec<&Segment> = self.iter().collect();
        for (i, pair) in segments.windows(2).enumerate() {
            let (a, b) = (pair[0], pair[1]);
            if b.start_time_seconds < a.start_time_seconds {
                return Err(format!("segment {} starts before segment {}", i + 1, i));
            }
            match a.end_time_seconds {
                None => return Err(format!("segment {i} is open but not last")),
                Some(end) if (end - b.start_time_seconds).abs() > TILING_EPSILON => {
                    return Err(format!(
                        "segments {i} and {} do not tile ({end} vs {})",
                        i + 1,
                        b.start_time_seconds
                    ));
                }
                Some(_) => {}
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tiled(bounds: &[(f64, Option<f64>)]) -> SegmentStore {
        let now = Utc::now();
        SegmentStore::from_segments(bounds.iter().enumerate().map(|(i, (start, end))| Segment {
            id: SegmentId(format!("b{i}")),
            start_time_seconds: *start,
            end_time_seconds: *end,
            content: format!("block {i}"),
            assignment: Assignment::Unassigned,
            created_at: now,
        }))
    }

    #[test]
    fn test_from_segments_sorts_by_start() {
        let now = Utc::now();
        let mut late = Segment::new(10.0, now);
        late.id = SegmentId::from("late");
        let mut early = Segment::new(0.0, now);
        early.id = SegmentId::from("early");
        early.end_time_seconds = Some(10.0);

        let store = SegmentStore::from_segments(vec![late, early]);
        let ids: Vec<&str> = store.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["early", "late"]);
        assert!(store.check_invariants().is_ok());
    }

    #[test]
    fn test_speaker_and_state_are_mutually_exclusive() {
        let mut store = tiled(&[(0.0, None)]);
        let id = SegmentId::from("b0");
        let speaker = SpeakerId::from("alice");

        store.assign_state(&id, SegmentState::Inaudible).unwrap();
        let assignment = store.assign_speaker(&id, speaker.clone()).unwrap();
        assert_eq!(assignment, &Assignment::Speaker(speaker));
        assert_eq!(assignment.state(), None);

        let assignment = store.assign_state(&id, SegmentState::Unknown).unwrap();
        assert_eq!(assignment.speaker(), None);
        assert_eq!(assignment.state(), Some(SegmentState::Unknown));
    }

    #[test]
    fn test_selecting_same_value_toggles_off() {
        let mut store = tiled(&[(0.0, None)]);
        let id = SegmentId::from("b0");
        let speaker = SpeakerId::from("alice");

        store.assign_speaker(&id, speaker.clone()).unwrap();
        assert!(!store.assign_speaker(&id, speaker).unwrap().is_assigned());

        store.assign_state(&id, SegmentState::Overlapping).unwrap();
        assert!(!store
            .assign_state(&id, SegmentState::Overlapping)
            .unwrap()
            .is_assigned());
    }

    #[test]
    fn test_segment_at() {
        let store = tiled(&[(2.0, Some(5.0)), (5.0, Some(9.0)), (9.0, Some(12.0))]);
        assert_eq!(store.segment_at(0.0).unwrap().id.as_str(), "b0");
        assert_eq!(store.segment_at(5.0).unwrap().id.as_str(), "b1");
        assert_eq!(store.segment_at(11.9).unwrap().id.as_str(), "b2");
        assert_eq!(store.segment_at(40.0).unwrap().id.as_str(), "b2");
        assert!(SegmentStore::new().segment_at(1.0).is_none());
    }

    #[test]
    fn test_delete_middle_extends_previous() {
        let mut store = tiled(&[(0.0, Some(4.0)), (4.0, Some(8.0)), (8.0, None)]);
        let result = store.delete(&SegmentId::from("b1"), Utc::now()).unwrap();

        assert_eq!(result, Deletion::Removed(SegmentId::from("b1")));
        assert_eq!(store.get(&SegmentId::from("b0")).unwrap().end_time_seconds, Some(8.0));
        assert!(store.check_invariants().is_ok());
    }

    #[test]
    fn test_delete_first_pulls_next_back() {
        let mut store = tiled(&[(0.0, Some(4.0)), (4.0, None)]);
        store.delete(&SegmentId::from("b0"), Utc::now()).unwrap();

        let only = store.first().unwrap();
        assert_eq!(only.id.as_str(), "b1");
        assert_eq!(only.start_time_seconds, 0.0);
    }

    #[test]
    fn test_delete_last_remaining_leaves_placeholder() {
        let mut store = tiled(&[(3.0, None)]);
        let result = store.delete(&SegmentId::from("b0"), Utc::now()).unwrap();

        assert!(matches!(result, Deletion::ReplacedWithPlaceholder { .. }));
        assert_eq!(store.len(), 1);
        let placeholder = store.first().unwrap();
        assert!(placeholder.content.is_empty());
        assert!(!placeholder.is_assigned());
        assert_eq!(placeholder.start_time_seconds, 0.0);
    }

    #[test]
    fn test_close_and_append_keep_tiling() {
        let now = Utc::now();
        let mut store = tiled(&[(0.0, None)]);
        store.close_segment(&SegmentId::from("b0"), 6.5).unwrap();
        store.append_segment(6.5, now);

        assert_eq!(store.len(), 2);
        assert!(store.check_invariants().is_ok());
        assert!(store.last().unwrap().is_open());
    }

    #[test]
    fn test_close_never_precedes_start() {
        let mut store = tiled(&[(5.0, None)]);
        store.close_segment(&SegmentId::from("b0"), 3.0).unwrap();
        assert_eq!(store.first().unwrap().end_time_seconds, Some(5.0));
    }

    #[test]
    fn test_close_is_limited_by_next_segment_end() {
        let mut store = tiled(&[(0.0, Some(5.0)), (5.0, Some(8.0)), (8.0, None)]);
        let end = store.close_segment(&SegmentId::from("b0"), 12.0).unwrap();

        assert_eq!(end, 8.0);
        assert_eq!(store.get(&SegmentId::from("b1")).unwrap().start_time_seconds, 8.0);
        assert!(store.check_invariants().is_ok());
    }

    #[test]
    fn test_clear_speaker() {
        let mut store = tiled(&[(0.0, Some(1.0)), (1.0, None)]);
        let alice = SpeakerId::from("alice");
        store.assign_speaker(&SegmentId::from("b0"), alice.clone()).unwrap();
        store.assign_speaker(&SegmentId::from("b1"), alice.clone()).unwrap();

        assert_eq!(store.clear_speaker(&alice), 2);
        assert!(store.iter().all(|s| !s.is_assigned()));
    }

    #[test]
    fn test_unknown_segment() {
        let mut store = tiled(&[(0.0, None)]);
        let err = store.set_content(&SegmentId::from("missing"), "x").unwrap_err();
        assert_eq!(err, ValidationError::UnknownSegment("missing".to_string()));
    }
}
