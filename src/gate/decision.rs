//! Pure gate evaluation
//!
//! `evaluate` classifies the active segment and reports any position correction.
//! It owns no timers: the host calls it on every clock tick or media event, so the
//! deadline and windows are always recomputed from `created_at` and the segment
//! start.

use crate::config::GateConfig;
use crate::segments::{Segment, SegmentId, SegmentStore};
use chrono::{DateTime, Utc};

/// Time limits enforced on unassigned segments
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateRules {
    pub assignment_deadline_secs: f64,
    pub forward_window_secs: f64,
}

impl Default for GateRules {
    fn default() -> Self {
        Self {
            assignment_deadline_secs: 10.0,
            forward_window_secs: 10.0,
        }
    }
}

impl From<&GateConfig> for GateRules {
    fn from(config: &GateConfig) -> Self {
        Self {
            assignment_deadline_secs: config.assignment_deadline_secs,
            forward_window_secs: config.forward_window_secs,
        }
    }
}

/// Assignment state of the active segment
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GateState {
    Assigned,
    UnassignedFresh { remaining_secs: f64 },
    UnassignedExpired,
}

impl GateState {
    pub fn is_unassigned(&self) -> bool {
        !matches!(self, GateState::Assigned)
    }

    pub fn is_expired(&self) -> bool {
        matches!(self, GateState::UnassignedExpired)
    }
}

/// Position correction required by the gate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Clamp {
    /// Position passed `start + forward_window`
    Forward { bound: f64 },
    /// Position went before the segment start
    Rewind { bound: f64 },
}

impl Clamp {
    pub fn bound(&self) -> f64 {
        match self {
            Clamp::Forward { bound } | Clamp::Rewind { bound } => *bound,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GateDecision {
    /// `None` only for an empty store
    pub segment_id: Option<SegmentId>,
    pub state: GateState,
    pub clamp: Option<Clamp>,
    /// Position the media should be at after applying the decision
    pub position: f64,
}

impl GateDecision {
    fn open(position: f64) -> Self {
        Self {
            segment_id: None,
            state: GateState::Assigned,
            clamp: None,
            position,
        }
    }
}

/// Resolve the segment the gate applies to: the pinned segment if it still
/// exists, otherwise the one under the playback position.
pub fn active_segment<'a>(
    store: &'a SegmentStore,
    active_segment_id: Option<&SegmentId>,
    position: f64,
) -> Option<&'a Segment> {
    active_segment_id
        .and_then(|id| store.get(id))
        .or_else(|| store.segment_at(position))
}

/// Classify the active segment at `now` and check `position` against its windows.
pub fn evaluate(
    store: &SegmentStore,
    active_segment_id: Option<&SegmentId>,
    now: DateTime<Utc>,
    position: f64,
    rules: &GateRules,
) -> GateDecision {
    let Some(segment) = active_segment(store, active_segment_id, position) else {
        return GateDecision::open(position);
    };

    if segment.is_assigned() {
        return GateDecision {
            segment_id: Some(segment.id.clone()),
            state: GateState::Assigned,
            clamp: None,
            position,
        };
    }

    let age = segment.age_secs(now);
    let state = if age >= rules.assignment_deadline_secs {
        GateState::UnassignedExpired
    } else {
        GateState::UnassignedFresh {
            remaining_secs: rules.assignment_deadline_secs - age,
        }
    };

    let lower = segment.start_time_seconds;
    let upper = lower + rules.forward_window_secs;
    let clamp = if position > upper {
        Some(Clamp::Forward { bound: upper })
    } else if position < lower {
        Some(Clamp::Rewind { bound: lower })
    } else {
        None
    };

    GateDecision {
        segment_id: Some(segment.id.clone()),
        state,
        clamp,
        position: clamp.map_or(position, |c| c.bound()),
    }
}
