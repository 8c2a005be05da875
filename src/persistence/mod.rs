//! Persistence bridge: the backend contract, its REST client, and the local
//! draft cache.

mod debounce;
mod drafts;
mod rest;
pub mod wire;

pub use debounce::Debouncer;
pub use drafts::{draft_key, Draft, DraftCache};
pub use rest::RestBackend;

use crate::error::ApiError;
use crate::speakers::AvatarRef;
use std::future::Future;
use wire::{
    AvatarUpload, ImpressionsRequest, ImpressionsResponse, LoadResponse, SaveTranscriptRequest,
    SectionPayload, SubsectionPayload, TagsResponse,
};

/// Remote operations the editor depends on
pub trait TranscriptBackend: Send + Sync {
    /// Fails with [`ApiError::NotFound`] when the video has no transcript.
    fn load_transcript(
        &self,
        video_id: &str,
    ) -> impl Future<Output = Result<LoadResponse, ApiError>> + Send;

    fn save_transcript(
        &self,
        request: &SaveTranscriptRequest,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn load_tags(
        &self,
        transcript_id: &str,
    ) -> impl Future<Output = Result<TagsResponse, ApiError>> + Send;

    fn save_tag_impressions(
        &self,
        request: &ImpressionsRequest,
    ) -> impl Future<Output = Result<ImpressionsResponse, ApiError>> + Send;

    /// Create (`create`) or update a section boundary record
    fn upsert_section(
        &self,
        payload: &SectionPayload,
        create: bool,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn delete_section(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn upsert_subsection(
        &self,
        payload: &SubsectionPayload,
        create: bool,
    ) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn delete_subsection(&self, id: &str) -> impl Future<Output = Result<(), ApiError>> + Send;

    fn upload_avatar(
        &self,
        video_id: &str,
        upload: &AvatarUpload,
    ) -> impl Future<Output = Result<AvatarRef, ApiError>> + Send;
}
