//! Playback gate
//!
//! Enforces speaker/state assignment while media plays: an unassigned segment may
//! play for a limited time, may not be played or seeked past a forward window,
//! and may not be rewound before its start. The manual advance action and the
//! play shortcut are refused while the rules are not met.

mod clock;
mod controller;
mod decision;
mod ticker;

pub use clock::{ManualClock, PlaybackClock};
pub use controller::{AdvanceOutcome, PlayRefusal, PlaybackGate};
pub use decision::{active_segment, evaluate, Clamp, GateDecision, GateRules, GateState};
pub use ticker::GateTicker;
