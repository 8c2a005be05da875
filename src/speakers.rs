//! Speakers and the session roster

use crate::error::ValidationError;
use crate::ids::opaque_id;
use crate::sync::SyncState;
use serde::{Deserialize, Serialize};
use tracing::info;

opaque_id!(
    /// Speaker identifier (the speaker label for loaded transcripts)
    SpeakerId,
    "spk"
);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerRole {
    /// Moderator of the session
    Coordinator,
    #[default]
    Speaker,
}

/// Uploaded avatar reference
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvatarRef {
    pub url: String,
    /// Object storage key
    pub key: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Speaker {
    pub id: SpeakerId,
    pub name: String,
    pub role: SpeakerRole,
    pub avatar: Option<AvatarRef>,
    #[serde(default = "committed")]
    pub sync: SyncState,
}

fn committed() -> SyncState {
    SyncState::Committed
}

impl Speaker {
    pub fn new(id: SpeakerId, name: impl Into<String>, role: SpeakerRole) -> Self {
        Self {
            id,
            name: name.into(),
            role,
            avatar: None,
            sync: SyncState::Committed,
        }
    }

    pub fn is_coordinator(&self) -> bool {
        self.role == SpeakerRole::Coordinator
    }
}

/// Speakers available for assignment, in display order.
///
/// At most one speaker holds the coordinator role: promoting a speaker demotes
/// the previous coordinator.
#[derive(Debug, Clone, Default)]
pub struct SpeakerRoster {
    speakers: Vec<Speaker>,
}

impl SpeakerRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_speakers(speakers: impl IntoIterator<Item = Speaker>) -> Self {
        let mut roster = Self::new();
        for speaker in speakers {
            roster.insert(speaker);
        }
        roster
    }

    pub fn len(&self) -> usize {
        self.speakers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.speakers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Speaker> {
        self.speakers.iter()
    }

    pub fn get(&self, id: &SpeakerId) -> Option<&Speaker> {
        self.speakers.iter().find(|s| &s.id == id)
    }

    pub fn get_mut(&mut self, id: &SpeakerId) -> Option<&mut Speaker> {
        self.speakers.iter_mut().find(|s| &s.id == id)
    }

    pub fn contains(&self, id: &SpeakerId) -> bool {
        self.get(id).is_some()
    }

    /// Find a speaker by id or, failing that, by case-insensitive name
    pub fn find_by_label(&self, label: &str) -> Option<&Speaker> {
        let label = label.trim();
        self.speakers
            .iter()
            .find(|s| s.id.as_str() == label)
            .or_else(|| self.speakers.iter().find(|s| s.name.eq_ignore_ascii_case(label)))
    }

    pub fn coordinator(&self) -> Option<&Speaker> {
        self.speakers.iter().find(|s| s.is_coordinator())
    }

    /// Insert or replace a speaker
    pub fn insert(&mut self, speaker: Speaker) {
        if speaker.is_coordinator() {
            self.demote_coordinators();
        }
        match self.speakers.iter_mut().find(|s| s.id == speaker.id) {
            Some(existing) => *existing = speaker,
            None => self.speakers.push(speaker),
        }
    }

    pub fn remove(&mut self, id: &SpeakerId) -> Option<Speaker> {
        let index = self.speakers.iter().position(|s| &s.id == id)?;
        Some(self.speakers.remove(index))
    }

    pub fn rename(&mut self, id: &SpeakerId, name: impl Into<String>) -> Result<(), ValidationError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ValidationError::EmptySpeakerName);
        }
        let speaker = self
            .get_mut(id)
            .ok_or_else(|| ValidationError::UnknownSpeaker(id.to_string()))?;
        speaker.name = name.trim().to_string();
        Ok(())
    }

    pub fn set_role(&mut self, id: &SpeakerId, role: SpeakerRole) -> Result<(), ValidationError> {
        if !self.contains(id) {
            return Err(ValidationError::UnknownSpeaker(id.to_string()));
        }
        if role == SpeakerRole::Coordinator {
            self.demote_coordinators();
        }
        if let Some(speaker) = self.get_mut(id) {
            speaker.role = role;
        }
        Ok(())
    }

    fn demote_coordinators(&mut self) {
        for speaker in self.speakers.iter_mut().filter(|s| s.is_coordinator()) {
            info!(speaker = %speaker.id, "Demoting previous coordinator");
            speaker.role = SpeakerRole::Speaker;
        }
    }
}
