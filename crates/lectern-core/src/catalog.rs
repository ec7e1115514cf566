//! Lecture catalog collaborators.
//!
//! The controller does not fetch anything itself. Hosts implement
//! [`LectureCatalog`] on top of their HTTP client; [`ApiConfig`] builds the
//! endpoint URLs and [`CatalogLoader`] adds request de-duplication and caption
//! parsing on top.

use std::cell::Cell;
use std::future::Future;

use url::Url;

use crate::subtitles::{self, SubtitleTrack};
use crate::video::VideoError;

/// Default lecture API location.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Search results requested when the caller does not say.
pub const DEFAULT_SEARCH_TOP_K: usize = 3;

/// Lecture API endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
    base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
        }
    }
}

impl ApiConfig {
    /// Creates a config for the API at `base_url`.
    pub fn new(base_url: &str) -> Result<Self, VideoError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| VideoError::OpenFailed(format!("invalid API URL {base_url:?}: {e}")))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(VideoError::OpenFailed(format!(
                "API URL must be http or https, got {}",
                parsed.scheme()
            )));
        }
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Reads `LECTERN_API_URL`, falling back to [`DEFAULT_API_URL`].
    pub fn from_env() -> Self {
        match std::env::var("LECTERN_API_URL") {
            Ok(raw) => Self::new(raw.trim()).unwrap_or_else(|e| {
                tracing::warn!("Ignoring LECTERN_API_URL: {e}");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn health_url(&self) -> String {
        self.endpoint("/health")
    }

    pub fn stats_url(&self) -> String {
        self.endpoint("/stats")
    }

    pub fn videos_url(&self) -> String {
        self.endpoint("/videos")
    }

    pub fn search_url(&self) -> String {
        self.endpoint("/search")
    }

    /// Playable file for a lecture. Also accepts full video URLs.
    pub fn video_file_url(&self, video_id: &str) -> String {
        self.endpoint(&format!("/video/{}", clean_video_id(video_id)))
    }

    pub fn subtitles_url(&self, video_id: &str) -> String {
        self.endpoint(&format!("/video/{}/subtitles", clean_video_id(video_id)))
    }

    pub fn thumbnail_url(&self, video_id: &str) -> String {
        self.endpoint(&format!("/video/{}/thumbnail", clean_video_id(video_id)))
    }

    pub fn summary_url(&self, video_id: &str) -> String {
        self.endpoint(&format!("/video/{}/summary", clean_video_id(video_id)))
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// Extracts the bare id from a value that may be a full or partial
/// `/video/{ID}` URL.
pub fn clean_video_id(raw: &str) -> String {
    if !raw.contains(['/', '?', ':']) {
        return raw.to_string();
    }

    let Some((_, rest)) = raw.split_once("/video/") else {
        return raw.to_string();
    };
    if raw.contains("://") {
        let id: String = rest.chars().take_while(char::is_ascii_alphanumeric).collect();
        if !id.is_empty() {
            return id;
        }
    }
    rest.split(['/', '?']).next().unwrap_or_default().to_string()
}

/// Lecture listed by the API.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LectureVideo {
    pub id: String,
    pub title: String,
    pub source_file: String,
    pub source: String,
    pub location: String,
    pub duration: String,
}

/// Transcript passage matching a search query.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchHit {
    pub id: String,
    pub text: String,
    pub start_sec: f64,
    pub end_sec: Option<f64>,
    pub score: f64,
    pub title: Option<String>,
    pub video_id: Option<String>,
}

impl SearchHit {
    /// Start offset to mount the lecture at.
    pub fn start_offset(&self) -> f64 {
        if self.start_sec.is_finite() && self.start_sec > 0.0 {
            self.start_sec
        } else {
            0.0
        }
    }

    /// Lecture the passage belongs to.
    pub fn lecture_id(&self) -> String {
        clean_video_id(self.video_id.as_deref().unwrap_or(&self.id))
    }
}

/// Search response.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SearchResults {
    pub hits: Vec<SearchHit>,
    /// Answer generated from the matching passages, if the API produced one
    pub answer: Option<String>,
}

/// Lecture API client.
///
/// Failures of any kind are reported as `None`.
pub trait LectureCatalog {
    fn videos(&self) -> impl Future<Output = Option<Vec<LectureVideo>>>;

    /// Raw caption file for a lecture.
    fn subtitles(&self, video_id: &str) -> impl Future<Output = Option<String>>;

    fn summary(&self, video_id: &str) -> impl Future<Output = Option<String>>;

    fn search(&self, query: &str, top_k: usize) -> impl Future<Output = Option<SearchResults>>;
}

/// Catalog wrapper used by the UI.
pub struct CatalogLoader<C> {
    catalog: C,
    videos_in_flight: Cell<bool>,
}

struct InFlight<'a>(&'a Cell<bool>);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<C: LectureCatalog> CatalogLoader<C> {
    pub fn new(catalog: C) -> Self {
        Self {
            catalog,
            videos_in_flight: Cell::new(false),
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    /// Whether a video list request is outstanding.
    pub fn is_loading_videos(&self) -> bool {
        self.videos_in_flight.get()
    }

    /// Fetches the lecture list.
    ///
    /// Returns `None` without contacting the catalog if a request is already
    /// in flight. A failed request yields an empty list.
    pub async fn load_videos(&self) -> Option<Vec<LectureVideo>> {
        if self.videos_in_flight.replace(true) {
            tracing::debug!("Video list request already in flight");
            return None;
        }
        let _in_flight = InFlight(&self.videos_in_flight);

        match self.catalog.videos().await {
            Some(videos) => {
                tracing::info!("Loaded {} lectures", videos.len());
                Some(videos)
            }
            None => {
                tracing::warn!("Failed to load lecture list");
                Some(Vec::new())
            }
        }
    }

    /// Fetches and parses the caption track of a lecture.
    ///
    /// Missing captions yield an empty track.
    pub async fn load_subtitles(&self, video_id: &str) -> SubtitleTrack {
        let video_id = clean_video_id(video_id);
        match self.catalog.subtitles(&video_id).await {
            Some(text) if !text.trim().is_empty() => {
                let track = subtitles::parse(&text);
                tracing::debug!("Lecture {video_id}: {} caption cues", track.len());
                track
            }
            _ => {
                tracing::debug!("Lecture {video_id}: no captions");
                SubtitleTrack::new()
            }
        }
    }

    pub async fn load_summary(&self, video_id: &str) -> Option<String> {
        let summary = self.catalog.summary(&clean_video_id(video_id)).await?;
        let summary = summary.trim();
        (!summary.is_empty()).then(|| summary.to_string())
    }

    /// Searches transcripts. Blank queries are not sent.
    pub async fn search(&self, query: &str, top_k: usize) -> Option<SearchResults> {
        let query = query.trim();
        if query.is_empty() {
            return None;
        }
        self.catalog.search(query, top_k).await
    }
}
