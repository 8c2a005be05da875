//! JSON payloads exchanged with the transcript backend
//!
//! Field names follow the server exactly: transcript blocks and speakers are
//! snake_case, the save and tag endpoints are camelCase. Ids may arrive as
//! strings or numbers and are normalized to strings.

use crate::segments::{Assignment, Segment, SegmentId, SegmentState, SegmentStore};
use crate::speakers::{AvatarRef, Speaker, SpeakerId, SpeakerRole, SpeakerRoster};
use crate::sync::SyncState;
use crate::tags::{
    color_for, MasterTag, MasterTagId, PrimaryTag, PrimaryTagId, SecondaryTag, Section, SectionId,
    SelectionRange, StructureContext, Subsection, SubsectionId, TagGroup, TagGroupId, TagScope,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(text) => text,
            RawId::Number(number) => number.to_string(),
        }
    }
}

fn id_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    RawId::deserialize(deserializer).map(String::from)
}

fn optional_id_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<RawId>::deserialize(deserializer)?.map(String::from))
}

fn id_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Vec::<RawId>::deserialize(deserializer)?
        .into_iter()
        .map(String::from)
        .collect())
}

// ---- GET /transcriptions/load/{videoId} ----

#[derive(Debug, Clone, Deserialize)]
pub struct LoadResponse {
    pub transcription: TranscriptionRecord,
    #[serde(default)]
    pub speakers: Vec<SpeakerRecord>,
    #[serde(default)]
    pub video: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub version: Option<i64>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub transcription_type: Option<String>,
    #[serde(default)]
    pub blocks: Vec<BlockRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BlockRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub speaker_label: Option<String>,
    pub start_time_seconds: f64,
    #[serde(default)]
    pub end_time_seconds: Option<f64>,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub order_index: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpeakerRecord {
    #[serde(default)]
    pub speaker_label: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
    #[serde(default)]
    pub avatar_key: Option<String>,
    #[serde(default)]
    pub is_moderator: bool,
}

impl SpeakerRecord {
    /// Label used by blocks to reference this speaker
    pub fn label(&self) -> Option<&str> {
        self.speaker_label
            .as_deref()
            .or(self.name.as_deref())
            .map(str::trim)
            .filter(|label| !label.is_empty())
    }

    pub fn into_speaker(self) -> Option<Speaker> {
        let label = self.label()?.to_string();
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(&label)
            .to_string();
        let role = if self.is_moderator {
            SpeakerRole::Coordinator
        } else {
            SpeakerRole::Speaker
        };
        let mut speaker = Speaker::new(SpeakerId::from(label), name, role);
        speaker.avatar = self.avatar_url.map(|url| AvatarRef {
            url,
            key: self.avatar_key,
        });
        Some(speaker)
    }
}

/// Map a block's `speaker_label` to an assignment: state labels first, then the roster.
pub fn assignment_for_label(label: Option<&str>, roster: &SpeakerRoster) -> Assignment {
    let Some(label) = label.map(str::trim).filter(|l| !l.is_empty()) else {
        return Assignment::Unassigned;
    };
    if let Some(state) = SegmentState::from_label(label) {
        return Assignment::State(state);
    }
    match roster.find_by_label(label) {
        Some(speaker) => Assignment::Speaker(speaker.id.clone()),
        None => Assignment::Speaker(SpeakerId::from(label)),
    }
}

impl LoadResponse {
    pub fn roster(&self) -> SpeakerRoster {
        SpeakerRoster::from_speakers(
            self.speakers
                .iter()
                .cloned()
                .filter_map(SpeakerRecord::into_speaker),
        )
    }

    /// Blocks as segments, ordered by `order_index`. Loaded segments start their
    /// assignment deadline at `now`.
    pub fn segments(&self, roster: &SpeakerRoster, now: DateTime<Utc>) -> Vec<Segment> {
        let mut blocks: Vec<&BlockRecord> = self.transcription.blocks.iter().collect();
        blocks.sort_by_key(|b| b.order_index);
        blocks
            .into_iter()
            .map(|block| Segment {
                id: SegmentId::from(block.id.as_str()),
                start_time_seconds: block.start_time_seconds,
                end_time_seconds: block.end_time_seconds,
                content: block.text.clone(),
                assignment: assignment_for_label(block.speaker_label.as_deref(), roster),
                created_at: now,
            })
            .collect()
    }
}

// ---- POST /transcriptions/save ----

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveTranscriptRequest {
    pub video_id: String,
    pub transcript_data: Vec<TranscriptEntry>,
    pub transcription_type: String,
    pub speaker_data: Vec<SpeakerData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_metadata: Option<serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub id: String,
    /// Speaker name, state label, or empty when unassigned
    pub name: String,
    /// Start time as `MM:SS`
    pub time: String,
    pub text: String,
    pub start_time: f64,
    pub end_time: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeakerData {
    pub name: String,
    pub speaker_label: String,
    pub avatar_url: Option<String>,
    pub avatar_key: Option<String>,
    pub is_moderator: bool,
}

/// `MM:SS`, minutes not wrapped at the hour
pub fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0).floor() as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

impl SaveTranscriptRequest {
    pub fn build(
        video_id: &str,
        store: &SegmentStore,
        roster: &SpeakerRoster,
        transcription_type: &str,
        video_metadata: Option<serde_json::Value>,
    ) -> Self {
        let transcript_data = store
            .iter()
            .map(|segment| {
                let name = match &segment.assignment {
                    Assignment::Speaker(id) => roster
                        .get(id)
                        .map_or_else(|| id.to_string(), |s| s.name.clone()),
                    Assignment::State(state) => state.as_str().to_string(),
                    Assignment::Unassigned => String::new(),
                };
                TranscriptEntry {
                    id: segment.id.to_string(),
                    name,
                    time: format_timestamp(segment.start_time_seconds),
                    text: segment.content.clone(),
                    start_time: segment.start_time_seconds,
                    end_time: segment.end_time_seconds,
                }
            })
            .collect();

        let speaker_data = roster
            .iter()
            .map(|speaker| SpeakerData {
                name: speaker.name.clone(),
                speaker_label: speaker.id.to_string(),
                avatar_url: speaker.avatar.as_ref().map(|a| a.url.clone()),
                avatar_key: speaker.avatar.as_ref().and_then(|a| a.key.clone()),
                is_moderator: speaker.is_coordinator(),
            })
            .collect();

        Self {
            video_id: video_id.to_string(),
            transcript_data,
            transcription_type: transcription_type.to_string(),
            speaker_data,
            video_metadata: video_metadata.filter(|v| !v.is_null()),
        }
    }
}

// ---- POST /tags/impressions ----

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionsRequest {
    pub transcript_id: String,
    pub block_ids: Vec<String>,
    pub master_tag_name: String,
    pub master_tag_description: Option<String>,
    pub primary_tags: Vec<PrimaryTagPayload>,
    pub selected_text: String,
    pub selection_ranges: Vec<SelectionRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsection_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryTagPayload {
    /// Present only when reusing an existing impression
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub comment: Option<String>,
    pub secondary_tags: Vec<String>,
    pub selected_text: String,
    pub selection_range: Option<SelectionRange>,
    pub block_id: String,
}

impl ImpressionsRequest {
    /// Payload for one committed group. `is_reused` tells whether a primary id
    /// already exists outside this group.
    pub fn for_group(
        transcript_id: &str,
        master: &MasterTag,
        group: &TagGroup,
        is_reused: impl Fn(&PrimaryTagId) -> bool,
    ) -> Self {
        let primary_tags = group
            .primary_tags
            .iter()
            .map(|primary| PrimaryTagPayload {
                id: is_reused(&primary.id).then(|| primary.id.to_string()),
                name: primary.value.clone(),
                comment: primary.comment.clone(),
                secondary_tags: primary.secondary_tags.iter().map(|s| s.value.clone()).collect(),
                selected_text: primary.selected_text.clone(),
                selection_range: primary.ranges.first().cloned(),
                block_id: primary.block_id.to_string(),
            })
            .collect();

        Self {
            transcript_id: transcript_id.to_string(),
            block_ids: group.block_ids.iter().map(ToString::to_string).collect(),
            master_tag_name: master.name.clone(),
            master_tag_description: master.description.clone(),
            primary_tags,
            selected_text: group.selected_text.clone(),
            selection_ranges: group.selection_ranges.clone(),
            section_id: group.context.section_id.as_ref().map(ToString::to_string),
            subsection_id: group.context.subsection_id.as_ref().map(ToString::to_string),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionsResponse {
    pub master_tag: MasterTagRef,
    #[serde(default)]
    pub impressions: Vec<ImpressionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MasterTagRef {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpressionRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub primary_tag_name: String,
    #[serde(default)]
    pub instance_index: Option<u32>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default, deserialize_with = "id_strings")]
    pub block_ids: Vec<String>,
}

// ---- GET /tags/load/{transcriptId} ----

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagsResponse {
    #[serde(default)]
    pub tag_groups: Vec<TagGroupRecord>,
    #[serde(default)]
    pub sections: Vec<SectionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagGroupRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub master_tag: MasterTagRecord,
    #[serde(default, deserialize_with = "id_strings")]
    pub block_ids: Vec<String>,
    #[serde(default)]
    pub selected_text: String,
    #[serde(default)]
    pub selection_ranges: Vec<SelectionRange>,
    #[serde(default)]
    pub primary_tags: Vec<PrimaryTagRecord>,
    #[serde(default, deserialize_with = "optional_id_string")]
    pub section_id: Option<String>,
    #[serde(default, deserialize_with = "optional_id_string")]
    pub subsection_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MasterTagRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrimaryTagRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub instance_index: Option<u32>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub secondary_tags: Vec<String>,
    #[serde(default)]
    pub selected_text: String,
    #[serde(default)]
    pub selection_range: Option<SelectionRange>,
    #[serde(default, deserialize_with = "optional_id_string")]
    pub block_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    pub start_block_index: usize,
    #[serde(default)]
    pub end_block_index: Option<usize>,
    #[serde(default)]
    pub subsections: Vec<SubsectionRecord>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsectionRecord {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    pub start_block_index: usize,
    #[serde(default)]
    pub end_block_index: Option<usize>,
}

impl TagsResponse {
    /// Masters (one per remote master id) and their committed groups
    pub fn tags(&self) -> (Vec<MasterTag>, Vec<TagGroup>) {
        let mut masters: Vec<MasterTag> = Vec::new();
        let mut groups = Vec::with_capacity(self.tag_groups.len());

        for record in &self.tag_groups {
            let context = StructureContext {
                section_id: record.section_id.as_deref().map(SectionId::from),
                subsection_id: record.subsection_id.as_deref().map(SubsectionId::from),
            };
            let master_id = MasterTagId::from(record.master_tag.id.as_str());
            if !masters.iter().any(|m| m.id == master_id) {
                masters.push(MasterTag {
                    id: master_id.clone(),
                    name: record.master_tag.name.clone(),
                    description: record.master_tag.description.clone(),
                    color: record
                        .master_tag
                        .color
                        .clone()
                        .unwrap_or_else(|| color_for(&record.master_tag.name).to_string()),
                    is_closed: true,
                    scope: context.scope(),
                    remote_id: Some(record.master_tag.id.clone()),
                });
            }

            let fallback_block = record.block_ids.first().cloned().unwrap_or_default();
            let primary_tags = record
                .primary_tags
                .iter()
                .map(|p| PrimaryTag {
                    id: PrimaryTagId::from(p.id.as_str()),
                    value: p.name.clone(),
                    display_name: p.display_name.clone(),
                    instance_index: p.instance_index,
                    comment: p.comment.clone(),
                    secondary_tags: p
                        .secondary_tags
                        .iter()
                        .map(|value| SecondaryTag {
                            value: value.clone(),
                        })
                        .collect(),
                    block_id: SegmentId::from(
                        p.block_id.clone().unwrap_or_else(|| fallback_block.clone()),
                    ),
                    selected_text: if p.selected_text.is_empty() {
                        record.selected_text.clone()
                    } else {
                        p.selected_text.clone()
                    },
                    ranges: p.selection_range.iter().cloned().collect(),
                })
                .collect();

            let mut group = TagGroup {
                id: TagGroupId::from(record.id.as_str()),
                master_id,
                context,
                block_ids: Vec::new(),
                selected_text: record.selected_text.clone(),
                selection_ranges: record.selection_ranges.clone(),
                primary_tags,
                sync: SyncState::Committed,
            };
            group.recompute_block_ids();
            for id in &record.block_ids {
                let id = SegmentId::from(id.as_str());
                if !group.block_ids.contains(&id) {
                    group.block_ids.push(id);
                }
            }
            groups.push(group);
        }

        (masters, groups)
    }

    pub fn structure(&self) -> (Vec<Section>, Vec<Subsection>) {
        let mut sections = Vec::with_capacity(self.sections.len());
        let mut subsections = Vec::new();
        for record in &self.sections {
            let section_id = SectionId::from(record.id.as_str());
            subsections.extend(record.subsections.iter().map(|sub| Subsection {
                id: SubsectionId::from(sub.id.as_str()),
                section_id: section_id.clone(),
                name: sub.name.clone(),
                start_block_index: sub.start_block_index,
                end_block_index: sub.end_block_index,
                sync: SyncState::Committed,
            }));
            sections.push(Section {
                id: section_id,
                name: record.name.clone(),
                start_block_index: record.start_block_index,
                end_block_index: record.end_block_index,
                sync: SyncState::Committed,
            });
        }
        (sections, subsections)
    }
}

// ---- /sections and /subsections ----

/// Boundary record. `endBlockIndex` is always sent; `null` reopens the item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SectionPayload {
    pub id: String,
    pub transcript_id: String,
    pub name: String,
    pub start_block_index: usize,
    pub end_block_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubsectionPayload {
    pub id: String,
    pub transcript_id: String,
    pub section_id: String,
    pub name: String,
    pub start_block_index: usize,
    pub end_block_index: Option<usize>,
}

impl SectionPayload {
    pub fn new(transcript_id: &str, section: &Section) -> Self {
        Self {
            id: section.id.to_string(),
            transcript_id: transcript_id.to_string(),
            name: section.name.clone(),
            start_block_index: section.start_block_index,
            end_block_index: section.end_block_index,
        }
    }
}

impl SubsectionPayload {
    pub fn new(transcript_id: &str, subsection: &Subsection) -> Self {
        Self {
            id: subsection.id.to_string(),
            transcript_id: transcript_id.to_string(),
            section_id: subsection.section_id.to_string(),
            name: subsection.name.clone(),
            start_block_index: subsection.start_block_index,
            end_block_index: subsection.end_block_index,
        }
    }
}

// ---- avatar upload ----

/// Image bytes for a speaker avatar
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvatarUploadResponse {
    pub url: String,
    #[serde(default)]
    pub key: Option<String>,
}

impl From<AvatarUploadResponse> for AvatarRef {
    fn from(response: AvatarUploadResponse) -> Self {
        AvatarRef {
            url: response.url,
            key: response.key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn load_fixture() -> LoadResponse {
        serde_json::from_value(json!({
            "transcription": {
                "id": 17,
                "version": 3,
                "language": "en",
                "transcription_type": "manual",
                "blocks": [
                    {"id": "b2", "speaker_label": "Ana", "start_time_seconds": 5.0,
                     "end_time_seconds": 9.5, "text": "second", "order_index": 1},
                    {"id": "b1", "speaker_label": "inaudible", "start_time_seconds": 0.0,
                     "end_time_seconds": 5.0, "text": "first", "order_index": 0},
                    {"id": 3, "speaker_label": null, "start_time_seconds": 9.5,
                     "end_time_seconds": null, "text": "", "order_index": 2}
                ]
            },
            "speakers": [
                {"speaker_label": "Ana", "avatar_url": "https://cdn/a.png", "is_moderator": true},
                {"name": "Ben", "avatar_url": null, "is_moderator": false},
                {"avatar_url": null}
            ],
            "video": {"title": "Interview"}
        }))
        .unwrap()
    }

    #[test]
    fn test_load_response_to_segments() {
        let response = load_fixture();
        assert_eq!(response.transcription.id, "17");

        let roster = response.roster();
        assert_eq!(roster.len(), 2);
        assert!(roster.find_by_label("ana").unwrap().is_coordinator());

        let segments = response.segments(&roster, Utc::now());
        let ids: Vec<&str> = segments.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["b1", "b2", "3"]);
        assert_eq!(
            segments[0].assignment,
            Assignment::State(SegmentState::Inaudible)
        );
        assert_eq!(
            segments[1].assignment,
            Assignment::Speaker(SpeakerId::from("Ana"))
        );
        assert_eq!(segments[2].assignment, Assignment::Unassigned);
        assert!(segments[2].is_open());
    }

    #[test]
    fn test_save_request_shape() {
        let response = load_fixture();
        let roster = response.roster();
        let store = SegmentStore::from_segments(response.segments(&roster, Utc::now()));
        let request = SaveTranscriptRequest::build(
            "vid-1",
            &store,
            &roster,
            "manual",
            Some(response.video.clone()),
        );
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["videoId"], "vid-1");
        assert_eq!(value["transcriptionType"], "manual");
        assert_eq!(value["videoMetadata"]["title"], "Interview");
        assert_eq!(value["transcriptData"][0]["name"], "inaudible");
        assert_eq!(value["transcriptData"][1]["name"], "Ana");
        assert_eq!(value["transcriptData"][1]["time"], "00:05");
        assert_eq!(value["transcriptData"][1]["startTime"], 5.0);
        assert_eq!(value["transcriptData"][2]["endTime"], serde_json::Value::Null);
        assert_eq!(value["speakerData"][0]["speaker_label"], "Ana");
        assert_eq!(value["speakerData"][0]["is_moderator"], true);
        assert_eq!(value["speakerData"][0]["avatar_url"], "https://cdn/a.png");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.9), "01:05");
        assert_eq!(format_timestamp(3725.0), "62:05");
        assert_eq!(format_timestamp(-3.0), "00:00");
    }

    #[test]
    fn test_impressions_response_accepts_numeric_ids() {
        let response: ImpressionsResponse = serde_json::from_value(json!({
            "masterTag": {"id": 9, "name": "Safety"},
            "impressions": [
                {"id": 101, "primaryTagName": "Brother", "instanceIndex": 2,
                 "displayName": "Brother (2)", "blockIds": [4, "b5"]}
            ]
        }))
        .unwrap();
        assert_eq!(response.master_tag.id, "9");
        assert_eq!(response.impressions[0].id, "101");
        assert_eq!(response.impressions[0].block_ids, vec!["4", "b5"]);
        assert_eq!(
            response.impressions[0].display_name.as_deref(),
            Some("Brother (2)")
        );
    }

    #[test]
    fn test_tags_response_rebuilds_groups_and_structure() {
        let response: TagsResponse = serde_json::from_value(json!({
            "tagGroups": [{
                "id": "g1",
                "masterTag": {"id": 5, "name": "Safety"},
                "blockIds": ["b1"],
                "selectedText": "the tire",
                "selectionRanges": [{"blockId": "b1", "startOffset": 13, "endOffset": 21}],
                "primaryTags": [{"id": "p1", "name": "tread-wear", "secondaryTags": ["front"],
                                 "selectionRange": {"blockId": "b1", "startOffset": 13, "endOffset": 21}}],
                "sectionId": 2
            }],
            "sections": [{
                "id": 2, "name": "Vehicle", "startBlockIndex": 0, "endBlockIndex": 4,
                "subsections": [{"id": 3, "name": "Tires", "startBlockIndex": 1, "endBlockIndex": null}]
            }]
        }))
        .unwrap();

        let (masters, groups) = response.tags();
        assert_eq!(masters.len(), 1);
        assert_eq!(masters[0].scope, TagScope::Section(SectionId::from("2")));
        assert_eq!(masters[0].remote_id.as_deref(), Some("5"));
        assert!(masters[0].is_closed);

        let primary = &groups[0].primary_tags[0];
        assert_eq!(primary.block_id, SegmentId::from("b1"));
        assert_eq!(primary.selected_text, "the tire");
        assert_eq!(primary.secondary_tags[0].value, "front");
        assert_eq!(primary.ranges[0].bounds(), (13, 21));

        let (sections, subsections) = response.structure();
        assert_eq!(sections[0].end_block_index, Some(4));
        assert_eq!(subsections[0].section_id, SectionId::from("2"));
        assert!(subsections[0].is_open());
    }

    #[test]
    fn test_section_payload_sends_null_end() {
        let section = Section {
            id: SectionId::from("s1"),
            name: "Intro".to_string(),
            start_block_index: 0,
            end_block_index: None,
            sync: SyncState::Pending,
        };
        let value = serde_json::to_value(SectionPayload::new("t1", &section)).unwrap();
        assert_eq!(
            value,
            json!({"id": "s1", "transcriptId": "t1", "name": "Intro",
                   "startBlockIndex": 0, "endBlockIndex": null})
        );
    }
}
