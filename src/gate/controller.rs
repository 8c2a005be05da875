//! Applies gate decisions to a playback clock

use super::clock::PlaybackClock;
use super::decision::{active_segment, evaluate, Clamp, GateDecision, GateRules, GateState};
use crate::error::ValidationError;
use crate::notice::{NoticeBoard, NoticeKind};
use crate::segments::{SegmentId, SegmentStore};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

/// Why a play request was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayRefusal {
    /// No speaker exists yet
    NoSpeakers,
    /// The active segment ran out of time without an assignment
    AssignmentExpired,
}

/// Result of the manual advance action (Enter while editing)
#[derive(Debug, Clone, PartialEq)]
pub enum AdvanceOutcome {
    /// The active segment is unassigned; nothing changed
    Rejected,
    /// The last segment was closed and a new trailing segment created
    Created { closed: SegmentId, created: SegmentId },
    /// A middle segment was closed and focus moved to the next one
    MovedTo { closed: SegmentId, next: SegmentId },
}

/// Playback gate bound to a clock.
///
/// In view mode every check is skipped and playback is unrestricted.
#[derive(Debug)]
pub struct PlaybackGate<C> {
    clock: C,
    rules: GateRules,
    edit_mode: bool,
    pinned: Option<SegmentId>,
    focus: Option<SegmentId>,
}

impl<C: PlaybackClock> PlaybackGate<C> {
    pub fn new(clock: C, rules: GateRules) -> Self {
        Self {
            clock,
            rules,
            edit_mode: false,
            pinned: None,
            focus: None,
        }
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn clock_mut(&mut self) -> &mut C {
        &mut self.clock
    }

    pub fn rules(&self) -> &GateRules {
        &self.rules
    }

    pub fn is_edit_mode(&self) -> bool {
        self.edit_mode
    }

    pub fn set_edit_mode(&mut self, edit_mode: bool) {
        if self.edit_mode != edit_mode {
            info!(edit_mode, "Playback gate mode changed");
        }
        self.edit_mode = edit_mode;
    }

    /// Pin the gate to the segment being edited
    pub fn pin_segment(&mut self, id: Option<SegmentId>) {
        self.pinned = id;
    }

    pub fn pinned_segment(&self) -> Option<&SegmentId> {
        self.pinned.as_ref()
    }

    /// Segment the host should scroll to and focus
    pub fn focus(&self) -> Option<&SegmentId> {
        self.focus.as_ref()
    }

    pub fn take_focus(&mut self) -> Option<SegmentId> {
        self.focus.take()
    }

    /// Evaluate without side effects
    pub fn peek(&self, store: &SegmentStore, now: DateTime<Utc>) -> GateDecision {
        evaluate(
            store,
            self.pinned.as_ref(),
            now,
            self.clock.current_time(),
            &self.rules,
        )
    }

    /// Periodic check while media plays. Returns `None` when nothing was checked.
    pub fn tick(
        &mut self,
        store: &SegmentStore,
        now: DateTime<Utc>,
        notices: &mut NoticeBoard,
    ) -> Option<GateDecision> {
        if !self.clock.is_playing() {
            return None;
        }
        self.check(store, now, notices)
    }

    /// Media `timeupdate` event
    pub fn on_time_update(
        &mut self,
        store: &SegmentStore,
        now: DateTime<Utc>,
        notices: &mut NoticeBoard,
    ) -> Option<GateDecision> {
        self.check(store, now, notices)
    }

    /// User seek. Returns the position the media ends up at.
    ///
    /// The target is checked against the segment playback was in before the
    /// seek, so leaving an unassigned segment cannot skip its forward window.
    pub fn on_seek(
        &mut self,
        store: &SegmentStore,
        target: f64,
        now: DateTime<Utc>,
        notices: &mut NoticeBoard,
    ) -> f64 {
        let origin = self.clock.current_time();
        self.clock.seek(target);
        if !self.edit_mode {
            return self.clock.current_time();
        }
        let anchor = active_segment(store, self.pinned.as_ref(), origin).map(|s| s.id.clone());
        let mut decision = evaluate(store, anchor.as_ref(), now, target, &self.rules);
        if decision.clamp.is_none() && self.pinned.is_none() {
            decision = evaluate(store, None, now, target, &self.rules);
        }
        if let Some(clamp) = decision.clamp {
            self.apply_clamp(clamp, now, notices);
        }
        self.clock.current_time()
    }

    fn check(
        &mut self,
        store: &SegmentStore,
        now: DateTime<Utc>,
        notices: &mut NoticeBoard,
    ) -> Option<GateDecision> {
        if !self.edit_mode {
            return None;
        }
        let decision = self.peek(store, now);

        if decision.state.is_expired() && self.clock.is_playing() {
            info!(segment = ?decision.segment_id, "Assignment deadline passed, pausing playback");
            self.clock.pause();
            notices.raise(NoticeKind::AssignmentExpired, now);
            self.focus = decision.segment_id.clone();
        }

        if let Some(clamp) = decision.clamp {
            self.apply_clamp(clamp, now, notices);
        }
        Some(decision)
    }

    fn apply_clamp(&mut self, clamp: Clamp, now: DateTime<Utc>, notices: &mut NoticeBoard) {
        debug!(?clamp, position = self.clock.current_time(), "Clamping playback position");
        self.clock.seek(clamp.bound());
        match clamp {
            Clamp::Forward { .. } => {
                if self.clock.is_playing() {
                    self.clock.pause();
                }
                notices.raise(NoticeKind::ForwardRestricted, now);
            }
            Clamp::Rewind { .. } => notices.raise(NoticeKind::RewindRestricted, now),
        }
    }

    /// Space-bar play request.
    pub fn request_play(
        &mut self,
        store: &SegmentStore,
        has_speakers: bool,
        now: DateTime<Utc>,
        notices: &mut NoticeBoard,
    ) -> Result<(), PlayRefusal> {
        if self.edit_mode {
            if !has_speakers {
                notices.raise(NoticeKind::SpeakersRequired, now);
                return Err(PlayRefusal::NoSpeakers);
            }
            let decision = self.peek(store, now);
            if decision.state.is_expired() {
                notices.raise(NoticeKind::AssignmentExpired, now);
                self.focus = decision.segment_id;
                return Err(PlayRefusal::AssignmentExpired);
            }
        }
        self.clock.play();
        Ok(())
    }

    /// Space-bar shortcut: pause when playing, otherwise a gated play request.
    pub fn toggle_play(
        &mut self,
        store: &SegmentStore,
        has_speakers: bool,
        now: DateTime<Utc>,
        notices: &mut NoticeBoard,
    ) -> Result<(), PlayRefusal> {
        if self.clock.is_playing() {
            self.clock.pause();
            return Ok(());
        }
        self.request_play(store, has_speakers, now, notices)
    }

    /// Enter on the active segment: stamp its end at the current playback time and
    /// move on, creating a new trailing segment when it was the last one.
    pub fn advance(
        &mut self,
        store: &mut SegmentStore,
        now: DateTime<Utc>,
        notices: &mut NoticeBoard,
    ) -> Result<AdvanceOutcome, ValidationError> {
        let position = self.clock.current_time();
        let segment = active_segment(store, self.pinned.as_ref(), position)
            .ok_or_else(|| ValidationError::UnknownSegment("<empty transcript>".to_string()))?;
        let current = segment.id.clone();

        if self.edit_mode && !segment.is_assigned() {
            notices.raise(NoticeKind::MandatorySelection, now);
            if self.clock.is_playing() {
                self.clock.pause();
            }
            self.focus = Some(current);
            return Ok(AdvanceOutcome::Rejected);
        }

        let boundary = store.close_segment(&current, position)?;

        let outcome = if store.is_last(&current) {
            let created = store.append_segment(boundary, now);
            info!(closed = %current, created = %created, boundary, "Created trailing segment");
            AdvanceOutcome::Created {
                closed: current,
                created,
            }
        } else {
            let next = store
                .next_after(&current)
                .map(|s| s.id.clone())
                .ok_or_else(|| ValidationError::UnknownSegment(current.to_string()))?;
            AdvanceOutcome::MovedTo {
                closed: current,
                next,
            }
        };

        let target = match &outcome {
            AdvanceOutcome::Created { created, .. } => Some(created.clone()),
            AdvanceOutcome::MovedTo { next, .. } => Some(next.clone()),
            AdvanceOutcome::Rejected => None,
        };
        self.pinned = target.clone();
        self.focus = target;
        Ok(outcome)
    }

    /// Current gate state for display
    pub fn state(&self, store: &SegmentStore, now: DateTime<Utc>) -> GateState {
        self.peek(store, now).state
    }
}
