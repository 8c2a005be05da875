//! Transcript segment and its speaker/state assignment

use crate::ids::opaque_id;
use crate::speakers::SpeakerId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

opaque_id!(
    /// Stable segment identifier (the block id for loaded transcripts)
    SegmentId,
    "seg"
);

/// Non-speaker attribution for a segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentState {
    Inaudible,
    Overlapping,
    NoConversation,
    Unknown,
}

impl SegmentState {
    pub const ALL: [SegmentState; 4] = [
        SegmentState::Inaudible,
        SegmentState::Overlapping,
        SegmentState::NoConversation,
        SegmentState::Unknown,
    ];

    /// Wire label, also used as the `speaker_label` of state segments
    pub fn as_str(self) -> &'static str {
        match self {
            SegmentState::Inaudible => "inaudible",
            SegmentState::Overlapping => "overlapping",
            SegmentState::NoConversation => "no_conversation",
            SegmentState::Unknown => "unknown",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        let normalized = label.trim().to_lowercase().replace([' ', '-'], "_");
        Self::ALL.into_iter().find(|s| s.as_str() == normalized)
    }
}

impl fmt::Display for SegmentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SegmentState::Inaudible => write!(f, "Inaudible"),
            SegmentState::Overlapping => write!(f, "Overlapping"),
            SegmentState::NoConversation => write!(f, "No conversation"),
            SegmentState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Who or what a segment is attributed to. Speaker and state exclude each other.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Assignment {
    #[default]
    Unassigned,
    Speaker(SpeakerId),
    State(SegmentState),
}

impl Assignment {
    pub fn is_assigned(&self) -> bool {
        !matches!(self, Assignment::Unassigned)
    }

    pub fn speaker(&self) -> Option<&SpeakerId> {
        match self {
            Assignment::Speaker(id) => Some(id),
            _ => None,
        }
    }

    pub fn state(&self) -> Option<SegmentState> {
        match self {
            Assignment::State(state) => Some(*state),
            _ => None,
        }
    }
}

/// One transcript utterance window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Segment {
    pub id: SegmentId,
    pub start_time_seconds: f64,
    /// `None` until the segment is closed
    pub end_time_seconds: Option<f64>,
    pub content: String,
    #[serde(default)]
    pub assignment: Assignment,
    /// Anchor for the assignment deadline
    pub created_at: DateTime<Utc>,
}

impl Segment {
    pub fn new(start_time_seconds: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: SegmentId::generate(),
            start_time_seconds,
            end_time_seconds: None,
            content: String::new(),
            assignment: Assignment::Unassigned,
            created_at: now,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.assignment.is_assigned()
    }

    pub fn is_open(&self) -> bool {
        self.end_time_seconds.is_none()
    }

    /// Whether `position` falls in `[start, end)`; open segments extend forever
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start_time_seconds
            && self.end_time_seconds.map_or(true, |end| position < end)
    }

    /// Seconds elapsed since the segment was created
    pub fn age_secs(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds() as f64 / 1000.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_labels() {
        assert_eq!(SegmentState::from_label("no_conversation"), Some(SegmentState::NoConversation));
        assert_eq!(SegmentState::from_label("No Conversation"), Some(SegmentState::NoConversation));
        assert_eq!(SegmentState::from_label("INAUDIBLE"), Some(SegmentState::Inaudible));
        assert_eq!(SegmentState::from_label("Speaker 1"), None);
    }

    #[test]
    fn test_contains_is_half_open() {
        let mut seg = Segment::new(5.0, Utc::now());
        seg.end_time_seconds = Some(8.0);
        assert!(seg.contains(5.0));
        assert!(seg.contains(7.99));
        assert!(!seg.contains(8.0));
        assert!(!seg.contains(4.99));

        seg.end_time_seconds = None;
        assert!(seg.contains(1000.0));
    }

    #[test]
    fn test_assignment_serialization() {
        let json = serde_json::to_string(&Assignment::State(SegmentState::Overlapping)).unwrap();
        assert_eq!(json, r#"{"kind":"state","value":"overlapping"}"#);
        let back: Assignment = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state(), Some(SegmentState::Overlapping));
    }
}
