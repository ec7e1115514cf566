//! Media source model and playback session states.
//!
//! These are the value types shared by every other module: what is being
//! played ([`MediaSource`]), how far along the session is ([`LoadingState`],
//! [`ErrorState`]) and the error type returned by fallible operations
//! ([`VideoError`]).

use crate::embed;
use crate::recovery::ErrorClass;

/// MIME type advertised by HLS manifests.
pub const HLS_MIME_TYPE: &str = "application/vnd.apple.mpegurl";

/// How a locator has to be played.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    /// A single file the surface can fetch and decode by itself (MP4, WebM).
    ProgressiveFile,
    /// A segmented playlist that needs an adaptive-streaming path (HLS).
    AdaptiveManifest,
    /// A third-party hosted player page (YouTube embed).
    HostedEmbed,
}

impl MediaKind {
    /// Returns true if this kind goes through adaptive streaming.
    pub fn is_adaptive(self) -> bool {
        matches!(self, MediaKind::AdaptiveManifest)
    }
}

/// Opaque locator plus the kind discriminant.
///
/// Immutable once a session has been mounted with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaSource {
    locator: String,
    kind: MediaKind,
}

impl MediaSource {
    /// Creates a source with an explicit kind.
    pub fn new(locator: impl Into<String>, kind: MediaKind) -> Self {
        Self {
            locator: locator.into(),
            kind,
        }
    }

    /// Creates a source, inferring the kind from the locator.
    ///
    /// Hosted-player URLs win over manifest detection, manifest detection wins
    /// over the progressive default.
    pub fn from_locator(locator: impl Into<String>) -> Self {
        let locator = locator.into();
        let kind = if embed::is_hosted_embed(&locator) {
            MediaKind::HostedEmbed
        } else if is_manifest_locator(&locator) {
            MediaKind::AdaptiveManifest
        } else {
            MediaKind::ProgressiveFile
        };
        Self { locator, kind }
    }

    /// The locator string as given.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// The kind discriminant.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }
}

/// Returns true if the locator points at an HLS manifest.
fn is_manifest_locator(locator: &str) -> bool {
    let path = locator.split(['?', '#']).next().unwrap_or(locator);
    path.to_ascii_lowercase().ends_with(".m3u8") || locator.contains(HLS_MIME_TYPE)
}

/// Whether the session is still waiting to show the first frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingState {
    /// Attach or start-offset correction still in progress
    #[default]
    Loading,
    /// Nothing in progress
    Ready,
}

/// Error state of the current session.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ErrorState {
    /// No outstanding fault
    #[default]
    None,
    /// A fault is being recovered locally
    Recoverable(ErrorClass),
    /// Recovery is exhausted or impossible; shown to the user
    Terminal {
        /// Class of the fault that ended the session
        class: ErrorClass,
        /// Short user-facing description
        message: String,
    },
}

impl ErrorState {
    /// Returns true if no fault is outstanding.
    pub fn is_none(&self) -> bool {
        matches!(self, ErrorState::None)
    }

    /// Returns true if the session cannot continue without a new mount.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ErrorState::Terminal { .. })
    }

    /// User-facing message, if any.
    pub fn message(&self) -> Option<&str> {
        match self {
            ErrorState::Terminal { message, .. } => Some(message),
            _ => None,
        }
    }
}

/// Errors returned by fallible playback operations.
#[derive(Debug, Clone, PartialEq)]
pub enum VideoError {
    /// Failed to open the media source
    OpenFailed(String),
    /// Adaptive-streaming client could not be created or attached
    DecoderInit(String),
    /// Decode pipeline failure
    DecodeFailed(String),
    /// No playback path for this source on this surface
    UnsupportedFormat(String),
    /// Network error (for streaming)
    Network(String),
    /// Ephemeral resource allocation failed
    Resource(String),
    /// Generic error
    Generic(String),
}

impl std::fmt::Display for VideoError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VideoError::OpenFailed(msg) => write!(f, "Failed to open video: {msg}"),
            VideoError::DecoderInit(msg) => {
                write!(f, "Streaming client initialization failed: {msg}")
            }
            VideoError::DecodeFailed(msg) => write!(f, "Decode failed: {msg}"),
            VideoError::UnsupportedFormat(msg) => write!(f, "Unsupported format: {msg}"),
            VideoError::Network(msg) => write!(f, "Network error: {msg}"),
            VideoError::Resource(msg) => write!(f, "Resource error: {msg}"),
            VideoError::Generic(msg) => write!(f, "Video error: {msg}"),
        }
    }
}

impl std::error::Error for VideoError {}
