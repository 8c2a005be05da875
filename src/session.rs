//! Editor session
//!
//! Owns the live transcript state for one video and routes every user action
//! through the rules: segment edits go through the store, playback through the
//! gate, structure and tags through their engines. Remote calls are made after
//! the local change is applied; their failures become notices.

use crate::config::Config;
use crate::error::{ApiError, AppError, DraftError, ValidationError};
use crate::gate::{
    AdvanceOutcome, GateDecision, GateRules, GateTicker, PlayRefusal, PlaybackClock, PlaybackGate,
};
use crate::notice::{NoticeBoard, NoticeKind};
use crate::persistence::wire::{
    AvatarUpload, ImpressionsRequest, SaveTranscriptRequest, SectionPayload, SubsectionPayload,
};
use crate::persistence::{Debouncer, Draft, DraftCache, TranscriptBackend};
use crate::segments::{Assignment, Deletion, SegmentId, SegmentState, SegmentStore};
use crate::speakers::{Speaker, SpeakerId, SpeakerRole, SpeakerRoster};
use crate::sync::SyncState;
use crate::tags::{
    CommitReceipt, ImpressionUpdate, MasterTagId, PrimaryTagId, SectionId, SectionTree,
    StructureContext, StructureItem, SubsectionId, TagEngine, TagGroupId,
};
use chrono::{DateTime, Utc};
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const DEFAULT_TRANSCRIPTION_TYPE: &str = "manual";

/// Where the loaded segments came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadSource {
    Server,
    Draft,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadSummary {
    pub source: LoadSource,
    pub segments: usize,
    pub speakers: usize,
    pub sections: usize,
    pub tag_groups: usize,
}

pub struct EditorSession<B, C> {
    backend: B,
    drafts: DraftCache,
    video_id: String,
    transcript_id: Option<String>,
    transcription_type: String,
    video: serde_json::Value,
    store: SegmentStore,
    roster: SpeakerRoster,
    gate: PlaybackGate<C>,
    structure: SectionTree,
    tags: TagEngine,
    notices: NoticeBoard,
    debouncer: Debouncer,
}

impl<B: TranscriptBackend, C: PlaybackClock> EditorSession<B, C> {
    pub fn new(
        backend: B,
        drafts: DraftCache,
        clock: C,
        config: &Config,
        video_id: impl Into<String>,
    ) -> Self {
        Self {
            backend,
            drafts,
            video_id: video_id.into(),
            transcript_id: None,
            transcription_type: DEFAULT_TRANSCRIPTION_TYPE.to_string(),
            video: serde_json::Value::Null,
            store: SegmentStore::new(),
            roster: SpeakerRoster::new(),
            gate: PlaybackGate::new(clock, GateRules::from(&config.gate)),
            structure: SectionTree::new(0),
            tags: TagEngine::new(),
            notices: NoticeBoard::new(config.gate.notice_duration()),
            debouncer: Debouncer::new(config.drafts.debounce()),
        }
    }

    pub fn video_id(&self) -> &str {
        &self.video_id
    }

    pub fn transcript_id(&self) -> Option<&str> {
        self.transcript_id.as_deref()
    }

    pub fn store(&self) -> &SegmentStore {
        &self.store
    }

    pub fn roster(&self) -> &SpeakerRoster {
        &self.roster
    }

    pub fn gate(&self) -> &PlaybackGate<C> {
        &self.gate
    }

    pub fn gate_mut(&mut self) -> &mut PlaybackGate<C> {
        &mut self.gate
    }

    pub fn structure(&self) -> &SectionTree {
        &self.structure
    }

    pub fn tags(&self) -> &TagEngine {
        &self.tags
    }

    /// Pending selections and edit mode are managed directly on the engine;
    /// committing goes through [`EditorSession::commit_tags`].
    pub fn tags_mut(&mut self) -> &mut TagEngine {
        &mut self.tags
    }

    pub fn notices(&self) -> &NoticeBoard {
        &self.notices
    }

    pub fn notices_mut(&mut self) -> &mut NoticeBoard {
        &mut self.notices
    }

    fn reject(&mut self, error: ValidationError, now: DateTime<Utc>) -> AppError {
        self.notices
            .raise(NoticeKind::Validation(error.to_string()), now);
        AppError::Validation(error)
    }

    // ---- load / save ----

    /// Load the transcript, preferring a local draft over the server's segments.
    /// Tags and structure are loaded best-effort.
    pub async fn load(&mut self, now: DateTime<Utc>) -> Result<LoadSummary, AppError> {
        let loaded = match self.backend.load_transcript(&self.video_id).await {
            Ok(loaded) => loaded,
            Err(ApiError::NotFound) => {
                if let Err(e) = self.drafts.invalidate(&self.video_id) {
                    warn!(error = %e, "Failed to invalidate draft for missing transcript");
                }
                return Err(AppError::NotFound {
                    video_id: self.video_id.clone(),
                });
            }
            Err(e) => return Err(AppError::Load(e)),
        };

        let mut roster = loaded.roster();
        let mut segments = loaded.segments(&roster, now);
        let mut source = LoadSource::Server;
        match self.drafts.load(&self.video_id) {
            Ok(Some(draft)) => {
                info!(last_saved = %draft.last_saved, "Restoring local draft");
                roster = SpeakerRoster::from_speakers(draft.speakers);
                segments = draft.segments;
                // Deadlines restart on reload
                for segment in &mut segments {
                    segment.created_at = now;
                }
                source = LoadSource::Draft;
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring unreadable draft"),
        }

        self.transcript_id = Some(loaded.transcription.id.clone());
        self.transcription_type = loaded
            .transcription
            .transcription_type
            .clone()
            .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_TYPE.to_string());
        self.video = loaded.video;
        self.roster = roster;
        self.store = SegmentStore::from_segments(segments);
        if self.store.is_empty() {
            self.store.append_segment(0.0, now);
        }
        self.gate.pin_segment(None);
        self.debouncer.clear();

        self.structure = SectionTree::new(self.store.len());
        self.tags = TagEngine::new();
        match self.backend.load_tags(&loaded.transcription.id).await {
            Ok(tags) => {
                let (sections, subsections) = tags.structure();
                self.structure = SectionTree::from_parts(sections, subsections, self.store.len());
                let (masters, groups) = tags.tags();
                self.tags = TagEngine::from_parts(masters, groups);
            }
            Err(e) => warn!(error = %e, "Failed to load tags, continuing without them"),
        }

        let summary = LoadSummary {
            source,
            segments: self.store.len(),
            speakers: self.roster.len(),
            sections: self.structure.sections().len(),
            tag_groups: self.tags.groups().len(),
        };
        info!(video_id = %self.video_id, ?summary, "Session loaded");
        Ok(summary)
    }

    /// Save the transcript remotely. A failure raises a notice and leaves the
    /// local state and draft untouched.
    pub async fn save(&mut self, now: DateTime<Utc>) -> Result<(), AppError> {
        if let Err(e) = self.write_draft(now) {
            warn!(error = %e, "Failed to write draft before saving");
        }

        let request = SaveTranscriptRequest::build(
            &self.video_id,
            &self.store,
            &self.roster,
            &self.transcription_type,
            Some(self.video.clone()),
        );
        match self.backend.save_transcript(&request).await {
            Ok(()) => {
                info!(segments = self.store.len(), "Transcript saved");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Transcript save failed");
                self.notices
                    .raise(NoticeKind::SaveFailed(e.to_string()), now);
                Err(AppError::Save(e))
            }
        }
    }

    fn mark_dirty(&mut self, now: DateTime<Utc>) {
        self.debouncer.note_change(now);
    }

    /// Mirror the live segments and speakers into the draft cache.
    pub fn write_draft(&mut self, now: DateTime<Utc>) -> Result<(), DraftError> {
        let draft = Draft {
            segments: self.store.iter().cloned().collect(),
            speakers: self.roster.iter().cloned().collect(),
            last_saved: now,
        };
        self.drafts.store(&self.video_id, &draft)?;
        self.debouncer.clear();
        Ok(())
    }

    /// Write the draft once the debounce period after the last change has passed.
    /// Returns whether a draft was written.
    pub fn flush_draft_if_due(&mut self, now: DateTime<Utc>) -> Result<bool, AppError> {
        if !self.debouncer.due(now) {
            return Ok(false);
        }
        self.write_draft(now)?;
        Ok(true)
    }

    // ---- segments ----

    pub fn set_content(
        &mut self,
        id: &SegmentId,
        content: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.store.set_content(id, content)?;
        self.mark_dirty(now);
        Ok(())
    }

    /// Toggle a speaker on a segment
    pub fn assign_speaker(
        &mut self,
        id: &SegmentId,
        speaker: &SpeakerId,
        now: DateTime<Utc>,
    ) -> Result<Assignment, AppError> {
        if !self.roster.contains(speaker) {
            return Err(ValidationError::UnknownSpeaker(speaker.to_string()).into());
        }
        let assignment = self.store.assign_speaker(id, speaker.clone())?.clone();
        self.mark_dirty(now);
        Ok(assignment)
    }

    /// Toggle a state on a segment
    pub fn assign_state(
        &mut self,
        id: &SegmentId,
        state: SegmentState,
        now: DateTime<Utc>,
    ) -> Result<Assignment, AppError> {
        let assignment = self.store.assign_state(id, state)?.clone();
        self.mark_dirty(now);
        Ok(assignment)
    }

    pub fn delete_segment(&mut self, id: &SegmentId, now: DateTime<Utc>) -> Result<Deletion, AppError> {
        let index = self.store.index_of(id);
        let deletion = self.store.delete(id, now)?;
        if self.gate.pinned_segment() == Some(id) {
            self.gate.pin_segment(None);
        }
        if let Some(index) = index {
            let dropped = self.structure.remove_block(index);
            if !dropped.is_empty() {
                warn!(?dropped, "Structure items removed with their last block");
            }
        }
        self.structure.set_block_count(self.store.len());
        self.mark_dirty(now);
        Ok(deletion)
    }

    // ---- playback ----

    pub fn set_edit_mode(&mut self, edit_mode: bool) {
        self.gate.set_edit_mode(edit_mode);
    }

    /// Periodic gate check; also expires old notices.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<GateDecision> {
        self.notices.prune(now);
        self.gate.tick(&self.store, now, &mut self.notices)
    }

    pub fn on_time_update(&mut self, now: DateTime<Utc>) -> Option<GateDecision> {
        self.gate.on_time_update(&self.store, now, &mut self.notices)
    }

    pub fn on_seek(&mut self, target: f64, now: DateTime<Utc>) -> f64 {
        self.gate.on_seek(&self.store, target, now, &mut self.notices)
    }

    pub fn request_play(&mut self, now: DateTime<Utc>) -> Result<(), PlayRefusal> {
        let has_speakers = !self.roster.is_empty();
        self.gate
            .request_play(&self.store, has_speakers, now, &mut self.notices)
    }

    pub fn toggle_play(&mut self, now: DateTime<Utc>) -> Result<(), PlayRefusal> {
        let has_speakers = !self.roster.is_empty();
        self.gate
            .toggle_play(&self.store, has_speakers, now, &mut self.notices)
    }

    /// Enter on the active segment
    pub fn advance(&mut self, now: DateTime<Utc>) -> Result<AdvanceOutcome, AppError> {
        let outcome = self.gate.advance(&mut self.store, now, &mut self.notices)?;
        if outcome != AdvanceOutcome::Rejected {
            self.structure.set_block_count(self.store.len());
            self.mark_dirty(now);
        }
        Ok(outcome)
    }

    // ---- speakers ----

    /// Add a speaker, uploading its avatar first if one is given. The speaker is
    /// visible immediately and removed again if the upload fails.
    pub async fn add_speaker(
        &mut self,
        name: &str,
        role: SpeakerRole,
        avatar: Option<AvatarUpload>,
        now: DateTime<Utc>,
    ) -> Result<SpeakerId, AppError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(self.reject(ValidationError::EmptySpeakerName, now));
        }

        let mut speaker = Speaker::new(SpeakerId::generate(), name, role);
        speaker.sync = SyncState::Pending;
        let id = speaker.id.clone();
        self.roster.insert(speaker);

        if let Some(upload) = avatar {
            match self.backend.upload_avatar(&self.video_id, &upload).await {
                Ok(avatar) => {
                    if let Some(speaker) = self.roster.get_mut(&id) {
                        speaker.avatar = Some(avatar);
                    }
                }
                Err(e) => {
                    warn!(speaker = %id, error = %e, "Avatar upload failed, removing speaker");
                    self.roster.remove(&id);
                    self.notices
                        .raise(NoticeKind::UploadFailed(e.to_string()), now);
                    return Err(AppError::Upload(e));
                }
            }
        }

        if let Some(speaker) = self.roster.get_mut(&id) {
            speaker.sync.commit();
        }
        info!(speaker = %id, name, ?role, "Added speaker");
        self.mark_dirty(now);
        Ok(id)
    }

    /// Remove a speaker and clear every segment assigned to it.
    pub fn remove_speaker(&mut self, id: &SpeakerId, now: DateTime<Utc>) -> Result<usize, AppError> {
        if self.roster.remove(id).is_none() {
            return Err(ValidationError::UnknownSpeaker(id.to_string()).into());
        }
        let cleared = self.store.clear_speaker(id);
        info!(speaker = %id, cleared, "Removed speaker");
        self.mark_dirty(now);
        Ok(cleared)
    }

    pub fn rename_speaker(
        &mut self,
        id: &SpeakerId,
        name: &str,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.roster.rename(id, name)?;
        self.mark_dirty(now);
        Ok(())
    }

    pub fn set_speaker_role(
        &mut self,
        id: &SpeakerId,
        role: SpeakerRole,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.roster.set_role(id, role)?;
        self.mark_dirty(now);
        Ok(())
    }

    // ---- structure ----

    /// Structure context of a block, used to scope master tag names
    pub fn scope_for_block(&self, block_id: &SegmentId) -> StructureContext {
        self.store
            .index_of(block_id)
            .map(|index| self.structure.context_at(index))
            .unwrap_or_default()
    }

    pub async fn add_section(
        &mut self,
        name: &str,
        position: usize,
        now: DateTime<Utc>,
    ) -> Result<SectionId, AppError> {
        let id = match self.structure.add_section(name, position) {
            Ok(id) => id,
            Err(e) => return Err(self.reject(e, now)),
        };
        self.sync_item(&StructureItem::Section(id.clone()), true, now).await;
        Ok(id)
    }

    pub async fn add_subsection(
        &mut self,
        name: &str,
        position: usize,
        now: DateTime<Utc>,
    ) -> Result<SubsectionId, AppError> {
        let id = match self.structure.add_subsection(name, position) {
            Ok(id) => id,
            Err(e) => return Err(self.reject(e, now)),
        };
        self.sync_item(&StructureItem::Subsection(id.clone()), true, now).await;
        Ok(id)
    }

    pub async fn close_innermost(
        &mut self,
        position: usize,
        now: DateTime<Utc>,
    ) -> Result<StructureItem, AppError> {
        let item = match self.structure.close_innermost(position) {
            Ok(item) => item,
            Err(e) => return Err(self.reject(e, now)),
        };
        self.sync_item(&item, false, now).await;
        Ok(item)
    }

    /// Reopen an item by removing its close marker
    pub async fn delete_close_marker(
        &mut self,
        item: &StructureItem,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        if let Err(e) = self.structure.delete_close_marker(item) {
            return Err(self.reject(e, now));
        }
        self.sync_item(item, false, now).await;
        Ok(())
    }

    /// Remove an item and, for sections, its subsections
    pub async fn delete_open_marker(
        &mut self,
        item: &StructureItem,
        now: DateTime<Utc>,
    ) -> Result<Vec<StructureItem>, AppError> {
        let removed = match self.structure.delete_open_marker(item) {
            Ok(removed) => removed,
            Err(e) => return Err(self.reject(e, now)),
        };
        if self.transcript_id.is_some() {
            for item in &removed {
                let result = match item {
                    StructureItem::Section(id) => self.backend.delete_section(id.as_str()).await,
                    StructureItem::Subsection(id) => {
                        self.backend.delete_subsection(id.as_str()).await
                    }
                };
                if let Err(e) = result {
                    warn!(?item, error = %e, "Failed to delete structure item remotely");
                    self.notices
                        .raise(NoticeKind::SaveFailed(e.to_string()), now);
                }
            }
        }
        Ok(removed)
    }

    /// Push a structure item to the backend and record the outcome on it.
    async fn sync_item(&mut self, item: &StructureItem, create: bool, now: DateTime<Utc>) {
        let Some(transcript_id) = self.transcript_id.clone() else {
            return;
        };
        match item {
            StructureItem::Section(id) => {
                let Some(section) = self.structure.section(id) else {
                    return;
                };
                let payload = SectionPayload::new(&transcript_id, section);
                let result = self.backend.upsert_section(&payload, create).await;
                if let Some(section) = self.structure.section_mut(id) {
                    record_sync(&mut section.sync, result, item, &mut self.notices, now);
                }
            }
            StructureItem::Subsection(id) => {
                let Some(subsection) = self.structure.subsection(id) else {
                    return;
                };
                let payload = SubsectionPayload::new(&transcript_id, subsection);
                let result = self.backend.upsert_subsection(&payload, create).await;
                if let Some(subsection) = self.structure.subsection_mut(id) {
                    record_sync(&mut subsection.sync, result, item, &mut self.notices, now);
                }
            }
        }
    }

    // ---- tags ----

    /// Commit the pending selections under a master tag and save each resulting
    /// group. Validation failures make no remote call.
    pub async fn commit_tags(
        &mut self,
        name: &str,
        description: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<CommitReceipt, AppError> {
        let store = &self.store;
        let structure = &self.structure;
        let committed = self.tags.commit(name, description, |block| {
            store
                .index_of(block)
                .map(|index| structure.context_at(index))
                .unwrap_or_default()
        });
        let receipt = match committed {
            Ok(receipt) => receipt,
            Err(e) => return Err(self.reject(e, now)),
        };

        let Some(transcript_id) = self.transcript_id.clone() else {
            return Ok(receipt);
        };
        for group_id in &receipt.group_ids {
            let Some(request) = self.impressions_request(&transcript_id, group_id) else {
                continue;
            };
            match self.backend.save_tag_impressions(&request).await {
                Ok(response) => {
                    let updates = response
                        .impressions
                        .into_iter()
                        .map(|record| ImpressionUpdate {
                            id: PrimaryTagId::from(record.id),
                            display_name: record.display_name,
                            instance_index: record.instance_index,
                        })
                        .collect();
                    self.tags
                        .apply_saved(group_id, Some(response.master_tag.id), updates);
                }
                Err(e) => {
                    warn!(group = %group_id, error = %e, "Failed to save tag impressions");
                    self.tags.mark_failed(group_id, &e.to_string());
                    self.notices
                        .raise(NoticeKind::SaveFailed(e.to_string()), now);
                }
            }
        }
        Ok(receipt)
    }

    fn impressions_request(&self, transcript_id: &str, group_id: &TagGroupId) -> Option<ImpressionsRequest> {
        let group = self.tags.group(group_id)?;
        let master = self.tags.master(&group.master_id)?;
        let groups = self.tags.groups();
        Some(ImpressionsRequest::for_group(
            transcript_id,
            master,
            group,
            |primary| {
                groups
                    .iter()
                    .any(|other| other.id != group.id && other.primary(primary).is_some())
            },
        ))
    }

    pub fn begin_tag_edit(&mut self, master: &MasterTagId, now: DateTime<Utc>) -> Result<(), AppError> {
        self.tags.begin_edit(master).map_err(|e| self.reject(e, now))
    }

    pub fn delete_primary_tag(
        &mut self,
        group: &TagGroupId,
        primary: &PrimaryTagId,
        now: DateTime<Utc>,
    ) -> Result<(), AppError> {
        self.tags
            .delete_primary(group, primary)
            .map_err(|e| self.reject(e, now))
    }

    pub fn delete_master_tag(
        &mut self,
        master: &MasterTagId,
        now: DateTime<Utc>,
    ) -> Result<Vec<TagGroupId>, AppError> {
        self.tags
            .delete_master(master)
            .map_err(|e| self.reject(e, now))
    }
}

fn record_sync(
    sync: &mut SyncState,
    result: Result<(), ApiError>,
    item: &StructureItem,
    notices: &mut NoticeBoard,
    now: DateTime<Utc>,
) {
    match result {
        Ok(()) => sync.commit(),
        Err(e) => {
            warn!(?item, error = %e, "Failed to save structure item");
            notices.raise(NoticeKind::SaveFailed(e.to_string()), now);
            sync.fail(e.to_string());
        }
    }
}

/// Drive the session's gate checks from a tokio interval until the returned
/// ticker is dropped.
///
/// The session sits behind a tokio mutex so `save` and `commit_tags` can hold
/// it across their awaits. A tick that finds the session locked is skipped; the
/// next one recomputes everything from the clock.
pub fn spawn_gate_ticker<B, C>(session: Arc<Mutex<EditorSession<B, C>>>, config: &Config) -> GateTicker
where
    B: TranscriptBackend + 'static,
    C: PlaybackClock + Send + 'static,
{
    GateTicker::start(config.gate.tick_interval(), move || {
        match session.try_lock() {
            Ok(mut session) => {
                session.tick(Utc::now());
            }
            Err(_) => debug!("Session busy, skipping gate tick"),
        }
        ControlFlow::Continue(())
    })
}
