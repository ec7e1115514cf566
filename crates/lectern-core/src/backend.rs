//! Backend selection and lifecycle.
//!
//! Two ways to get a source onto a [`MediaSurface`]:
//!
//! - **Native**: assign the locator to the surface directly. Used for
//!   progressive files, hosted embeds, and adaptive manifests on surfaces that
//!   decode them natively.
//! - **Library**: an adaptive-streaming client ([`StreamingClient`]) fetches
//!   the manifest and feeds the surface buffers. Used for adaptive manifests
//!   on surfaces that only expose a buffer-feed API.
//!
//! A [`BackendHandle`] owns whatever the chosen variant allocated. It must be
//! released before a new one is created for the same surface.

use std::fmt;

use crate::player::SessionId;
use crate::resource::ResourceUrl;
use crate::video::{MediaKind, VideoError};

/// What the media surface can play by itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SurfaceCapabilities {
    /// Adaptive manifests play by direct source assignment
    pub native_adaptive: bool,
    /// Surface accepts buffers pushed by a streaming client
    pub buffer_feed: bool,
}

/// Platform media element.
///
/// Completion of asynchronous operations (readiness, seeks, faults) is
/// reported back to the controller as `PlaybackEvent`s.
pub trait MediaSurface {
    fn capabilities(&self) -> SurfaceCapabilities;

    /// Assigns a locator and starts loading it.
    fn set_source(&mut self, locator: &str);

    /// Detaches the current source.
    fn clear_source(&mut self);

    /// Reinitializes the decode pipeline for the current source.
    fn reload(&mut self);

    fn play(&mut self);

    fn pause(&mut self);

    /// Whether the surface is currently playing.
    fn is_playing(&self) -> bool;

    /// Requests a seek. Completion is reported by a `Seeked` event.
    fn seek(&mut self, position: f64);

    /// Current playback position in seconds.
    fn position(&self) -> f64;

    /// Attaches a caption track locator and shows it by default.
    fn attach_captions(&mut self, url: &ResourceUrl, language: &str);

    fn detach_captions(&mut self);
}

/// Adaptive-streaming client driving a surface through buffer feeding.
pub trait StreamingClient {
    /// Loads the manifest at `locator` and binds to `surface`.
    fn attach(&mut self, locator: &str, surface: &mut dyn MediaSurface) -> Result<(), VideoError>;

    /// Restarts fragment loading at `position`.
    fn start_load(&mut self, position: f64);

    /// Asks the client to recover from a media error without re-fetching.
    fn recover_media_error(&mut self);

    /// Stops loading and unbinds from the surface.
    fn destroy(&mut self);
}

/// Creates streaming clients, one per session.
pub trait StreamingClientFactory {
    fn create(&mut self, session: SessionId) -> Result<Box<dyn StreamingClient>, VideoError>;
}

/// Playback path chosen for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendVariant {
    /// Direct source assignment
    Native,
    /// Adaptive-streaming client
    Library,
}

impl fmt::Display for BackendVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendVariant::Native => f.write_str("native"),
            BackendVariant::Library => f.write_str("streaming library"),
        }
    }
}

/// Picks the playback path for `kind` on a surface with `capabilities`.
///
/// Native playback of adaptive manifests is preferred over the library path.
pub fn select(
    capabilities: SurfaceCapabilities,
    kind: MediaKind,
) -> Result<BackendVariant, VideoError> {
    match kind {
        MediaKind::ProgressiveFile | MediaKind::HostedEmbed => Ok(BackendVariant::Native),
        MediaKind::AdaptiveManifest if capabilities.native_adaptive => Ok(BackendVariant::Native),
        MediaKind::AdaptiveManifest if capabilities.buffer_feed => Ok(BackendVariant::Library),
        MediaKind::AdaptiveManifest => Err(VideoError::UnsupportedFormat(
            "surface supports neither native adaptive playback nor buffer feeding".to_string(),
        )),
    }
}

enum Attachment {
    Native { locator: String },
    Library { client: Box<dyn StreamingClient> },
    Released,
}

/// Backend attached to a surface for one session.
pub struct BackendHandle {
    session: SessionId,
    variant: BackendVariant,
    attachment: Attachment,
}

impl BackendHandle {
    /// Attaches `locator` to `surface` through `variant`.
    ///
    /// The library variant needs a `factory`. If the client fails to attach it
    /// is destroyed before the error is returned.
    pub fn attach(
        session: SessionId,
        variant: BackendVariant,
        locator: &str,
        surface: &mut dyn MediaSurface,
        factory: Option<&mut dyn StreamingClientFactory>,
    ) -> Result<Self, VideoError> {
        let attachment = match variant {
            BackendVariant::Native => {
                surface.set_source(locator);
                Attachment::Native {
                    locator: locator.to_string(),
                }
            }
            BackendVariant::Library => {
                let factory = factory.ok_or_else(|| {
                    VideoError::UnsupportedFormat(
                        "no adaptive-streaming client available".to_string(),
                    )
                })?;
                let mut client = factory.create(session)?;
                if let Err(err) = client.attach(locator, surface) {
                    client.destroy();
                    return Err(err);
                }
                Attachment::Library { client }
            }
        };
        tracing::info!("Session {session}: attached {locator} via {variant} backend");
        Ok(Self {
            session,
            variant,
            attachment,
        })
    }

    pub fn variant(&self) -> BackendVariant {
        self.variant
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn is_released(&self) -> bool {
        matches!(self.attachment, Attachment::Released)
    }

    /// Reloads the stream and resumes loading at `position`.
    ///
    /// A native surface is left paused by the new source assignment; the
    /// caller restarts playback once the surface reports readiness.
    pub fn reload(&mut self, surface: &mut dyn MediaSurface, position: f64) {
        match &mut self.attachment {
            Attachment::Native { locator } => {
                surface.set_source(locator);
                surface.seek(position);
            }
            Attachment::Library { client } => client.start_load(position),
            Attachment::Released => {
                tracing::warn!("Session {}: reload on released backend", self.session)
            }
        }
    }

    /// Reinitializes decoding without re-fetching the source.
    pub fn recover_decode(&mut self, surface: &mut dyn MediaSurface) {
        match &mut self.attachment {
            Attachment::Native { .. } => surface.reload(),
            Attachment::Library { client } => client.recover_media_error(),
            Attachment::Released => {
                tracing::warn!("Session {}: decode recovery on released backend", self.session)
            }
        }
    }

    /// Releases everything the backend allocated. Idempotent.
    pub fn release(&mut self, surface: &mut dyn MediaSurface) {
        match std::mem::replace(&mut self.attachment, Attachment::Released) {
            Attachment::Native { .. } => surface.clear_source(),
            Attachment::Library { mut client } => {
                client.destroy();
                surface.clear_source();
            }
            Attachment::Released => return,
        }
        tracing::debug!("Session {}: released {} backend", self.session, self.variant);
    }
}

impl fmt::Debug for BackendHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendHandle")
            .field("session", &self.session)
            .field("variant", &self.variant)
            .field("released", &self.is_released())
            .finish()
    }
}

impl Drop for BackendHandle {
    fn drop(&mut self) {
        // The surface is gone by now; only the client can still be stopped.
        if let Attachment::Library { client } = &mut self.attachment {
            tracing::warn!("Session {}: backend dropped without release", self.session);
            client.destroy();
        }
    }
}
