//! Ephemeral user notices
//!
//! Every rule violation in the editor is surfaced as a short-lived notice rather
//! than an error dialog. Notices expire on their own after a fixed duration.

use chrono::{DateTime, Duration, Utc};

/// Message shown when Enter is pressed on an unassigned segment
pub const MANDATORY_SELECTION_MESSAGE: &str =
    "Mandatory: Select a speaker or state before continuing";

/// What a notice is about
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NoticeKind {
    /// The 10 second assignment budget ran out while playing
    AssignmentExpired,
    /// Playback or a seek tried to pass the forward window of an unassigned segment
    ForwardRestricted,
    /// Playback or a seek tried to go before the start of the active segment
    RewindRestricted,
    /// Advance was requested on an unassigned segment
    MandatorySelection,
    /// Play was requested before any speaker exists
    SpeakersRequired,
    /// A hierarchy, uniqueness or closed-lock rule was violated
    Validation(String),
    /// A remote save failed; the local draft is retained
    SaveFailed(String),
    /// An upload failed and the optimistic change was rolled back
    UploadFailed(String),
}

impl NoticeKind {
    pub fn message(&self) -> String {
        match self {
            NoticeKind::AssignmentExpired => {
                "Please select a speaker or state for this segment to continue".to_string()
            }
            NoticeKind::ForwardRestricted => {
                "Restriction: assign a speaker or state before moving further ahead".to_string()
            }
            NoticeKind::RewindRestricted => {
                "Restriction: you cannot go back before the start of the current segment"
                    .to_string()
            }
            NoticeKind::MandatorySelection => MANDATORY_SELECTION_MESSAGE.to_string(),
            NoticeKind::SpeakersRequired => {
                "Add at least one speaker before starting playback".to_string()
            }
            NoticeKind::Validation(message) => message.clone(),
            NoticeKind::SaveFailed(reason) => format!("Save failed: {reason}"),
            NoticeKind::UploadFailed(reason) => format!("Upload failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub kind: NoticeKind,
    pub raised_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Notice {
    pub fn message(&self) -> String {
        self.kind.message()
    }
}

/// Auto-dismissing notice queue
#[derive(Debug, Clone)]
pub struct NoticeBoard {
    lifetime: Duration,
    notices: Vec<Notice>,
}

impl NoticeBoard {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            notices: Vec::new(),
        }
    }

    /// Raise a notice. An identical notice that is still visible is refreshed
    /// instead of duplicated.
    pub fn raise(&mut self, kind: NoticeKind, now: DateTime<Utc>) {
        self.prune(now);
        let expires_at = now + self.lifetime;
        if let Some(existing) = self.notices.iter_mut().find(|n| n.kind == kind) {
            existing.raised_at = now;
            existing.expires_at = expires_at;
            return;
        }
        self.notices.push(Notice {
            kind,
            raised_at: now,
            expires_at,
        });
    }

    /// Notices still visible at `now`
    pub fn active(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Notice> {
        self.notices.iter().filter(move |n| n.expires_at > now)
    }

    pub fn is_showing(&self, kind: &NoticeKind, now: DateTime<Utc>) -> bool {
        self.active(now).any(|n| &n.kind == kind)
    }

    pub fn dismiss(&mut self, kind: &NoticeKind) {
        self.notices.retain(|n| &n.kind != kind);
    }

    /// Drop expired notices
    pub fn prune(&mut self, now: DateTime<Utc>) {
        self.notices.retain(|n| n.expires_at > now);
    }
}

impl Default for NoticeBoard {
    fn default() -> Self {
        Self::new(Duration::seconds(4))
    }
}
