//! REST client for the transcript backend.

use super::wire::{
    AvatarUpload, AvatarUploadResponse, ImpressionsRequest, ImpressionsResponse, LoadResponse,
    SaveTranscriptRequest, SectionPayload, SubsectionPayload, TagsResponse,
};
use super::TranscriptBackend;
use crate::config::ApiConfig;
use crate::error::ApiError;
use crate::speakers::AvatarRef;
use anyhow::Context;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};
use url::Url;
use zeroize::Zeroize;

/// Initial delay between retries (doubles with each attempt).
const INITIAL_RETRY_DELAY_MS: u64 = 1000;

pub struct RestBackend {
    base_url: Url,
    token: Option<String>,
    max_retries: u32,
    retry_delay: Duration,
    client: reqwest::Client,
}

impl RestBackend {
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let base_url = Url::parse(&config.base_url)
            .with_context(|| format!("Invalid API base URL {}", config.base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL {} cannot carry a path", config.base_url);
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .context("Failed to create HTTP client for RestBackend")?;

        Ok(Self {
            base_url,
            token: config.token.clone().filter(|t| !t.is_empty()),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(INITIAL_RETRY_DELAY_MS),
            client,
        })
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Send a request built by `build`, retrying transient failures when `retry`
    /// is set. Non-success statuses become errors.
    async fn send<F>(&self, retry: bool, build: F) -> Result<Response, ApiError>
    where
        F: Fn() -> RequestBuilder,
    {
        let max_retries = if retry { self.max_retries } else { 0 };
        let mut last_error: Option<ApiError> = None;
        let mut retry_delay = self.retry_delay;

        for attempt in 0..=max_retries {
            if attempt > 0 {
                warn!(
                    attempt = attempt,
                    max_retries = max_retries,
                    delay_ms = retry_delay.as_millis(),
                    "Retrying backend request after transient failure"
                );
                tokio::time::sleep(retry_delay).await;
                retry_delay *= 2;
            }

            match build().send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        if attempt > 0 {
                            info!(attempt = attempt, "Backend request succeeded after retry");
                        }
                        return Ok(response);
                    }
                    if status == StatusCode::NOT_FOUND {
                        return Err(ApiError::NotFound);
                    }

                    let status = status.as_u16();
                    let message = response.text().await.unwrap_or_default();
                    let error = ApiError::Server { status, message };

                    if (500..600).contains(&status) && attempt < max_retries {
                        warn!(status = status, attempt = attempt, "Server error, will retry");
                        last_error = Some(error);
                        continue;
                    }
                    return Err(error);
                }
                Err(e) => {
                    if Self::is_retryable_error(&e) && attempt < max_retries {
                        warn!(error = %e, attempt = attempt, "Network error, will retry");
                        last_error = Some(ApiError::Network(e));
                        continue;
                    }
                    return Err(ApiError::Network(e));
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ApiError::InvalidResponse("Unexpected retry loop exit".into())))
    }

    async fn json<T: DeserializeOwned>(response: Response) -> Result<T, ApiError> {
        response
            .json()
            .await
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {e}")))
    }

    fn is_retryable_error(error: &reqwest::Error) -> bool {
        error.is_timeout() || error.is_connect() || error.is_request()
    }
}

impl TranscriptBackend for RestBackend {
    #[instrument(skip(self))]
    async fn load_transcript(&self, video_id: &str) -> Result<LoadResponse, ApiError> {
        let url = self.endpoint(&["transcriptions", "load", video_id])?;
        let response = self.send(true, || self.request(Method::GET, url.clone())).await?;
        let loaded: LoadResponse = Self::json(response).await?;
        info!(
            transcript_id = %loaded.transcription.id,
            blocks = loaded.transcription.blocks.len(),
            speakers = loaded.speakers.len(),
            "Loaded transcript"
        );
        Ok(loaded)
    }

    #[instrument(skip(self, request), fields(video_id = %request.video_id, segments = request.transcript_data.len()))]
    async fn save_transcript(&self, request: &SaveTranscriptRequest) -> Result<(), ApiError> {
        let url = self.endpoint(&["transcriptions", "save"])?;
        self.send(false, || self.request(Method::POST, url.clone()).json(request))
            .await?;
        info!("Saved transcript");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load_tags(&self, transcript_id: &str) -> Result<TagsResponse, ApiError> {
        let url = self.endpoint(&["tags", "load", transcript_id])?;
        let response = self.send(true, || self.request(Method::GET, url.clone())).await?;
        let tags: TagsResponse = Self::json(response).await?;
        debug!(
            groups = tags.tag_groups.len(),
            sections = tags.sections.len(),
            "Loaded tags"
        );
        Ok(tags)
    }

    #[instrument(skip(self, request), fields(master = %request.master_tag_name, primaries = request.primary_tags.len()))]
    async fn save_tag_impressions(
        &self,
        request: &ImpressionsRequest,
    ) -> Result<ImpressionsResponse, ApiError> {
        let url = self.endpoint(&["tags", "impressions"])?;
        let response = self
            .send(false, || self.request(Method::POST, url.clone()).json(request))
            .await?;
        Self::json(response).await
    }

    #[instrument(skip(self, payload), fields(id = %payload.id, end = ?payload.end_block_index))]
    async fn upsert_section(&self, payload: &SectionPayload, create: bool) -> Result<(), ApiError> {
        let url = self.endpoint(&["sections"])?;
        let (method, retry) = if create {
            (Method::POST, false)
        } else {
            (Method::PUT, true)
        };
        self.send(retry, || self.request(method.clone(), url.clone()).json(payload))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_section(&self, id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["sections", id])?;
        self.send(false, || self.request(Method::DELETE, url.clone()))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, payload), fields(id = %payload.id, end = ?payload.end_block_index))]
    async fn upsert_subsection(
        &self,
        payload: &SubsectionPayload,
        create: bool,
    ) -> Result<(), ApiError> {
        let url = self.endpoint(&["subsections"])?;
        let (method, retry) = if create {
            (Method::POST, false)
        } else {
            (Method::PUT, true)
        };
        self.send(retry, || self.request(method.clone(), url.clone()).json(payload))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn delete_subsection(&self, id: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["subsections", id])?;
        self.send(false, || self.request(Method::DELETE, url.clone()))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, upload), fields(file = %upload.file_name, bytes = upload.bytes.len()))]
    async fn upload_avatar(
        &self,
        video_id: &str,
        upload: &AvatarUpload,
    ) -> Result<AvatarRef, ApiError> {
        let mut url = self.endpoint(&["avatars", video_id])?;
        url.query_pairs_mut()
            .append_pair("fileName", &upload.file_name);
        let response = self
            .send(false, || {
                self.request(Method::POST, url.clone())
                    .header(reqwest::header::CONTENT_TYPE, &upload.content_type)
                    .body(upload.bytes.clone())
            })
            .await?;
        let uploaded: AvatarUploadResponse = Self::json(response).await?;
        Ok(uploaded.into())
    }
}

impl Drop for RestBackend {
    fn drop(&mut self) {
        // Clear the bearer token from memory
        if let Some(token) = self.token.as_mut() {
            token.zeroize();
        }
    }
}
