//! # lectern-core
//!
//! Playback controller for recorded lectures.
//!
//! Given a media source, an optional caption track and a requested start
//! offset, [`PlaybackController`] attaches the source to a platform
//! [`MediaSurface`] through the best available backend, makes sure playback
//! actually begins at the requested offset, publishes captions as an
//! ephemeral resource and recovers locally from transient faults.
//!
//! The platform side is abstracted behind a few traits:
//!
//! - [`MediaSurface`]: the media element
//! - [`StreamingClientFactory`]: adaptive-streaming client for surfaces that
//!   cannot play manifests natively
//! - [`ResourceStore`]: turns caption text into a loadable locator
//! - [`Scheduler`]: delivers delayed re-checks
//!
//! The controller is single-threaded and event-driven: the host forwards
//! surface events through [`PlaybackController::handle_event`] and timer
//! expiry through [`PlaybackController::on_timer`].

pub mod backend;
pub mod catalog;
pub mod config;
pub mod embed;
pub mod player;
pub mod recovery;
pub mod resource;
pub mod seek;
pub mod subtitles;
pub mod video;

pub use backend::{
    BackendHandle, BackendVariant, MediaSurface, StreamingClient, StreamingClientFactory,
    SurfaceCapabilities,
};
pub use catalog::{ApiConfig, CatalogLoader, LectureCatalog, LectureVideo, SearchHit, SearchResults};
pub use config::PlayerConfig;
pub use player::{
    PlaybackController, PlaybackEvent, PlaybackStatus, PlaybackStatusHandle, Scheduler, SessionId,
    TimerToken,
};
pub use recovery::{BackendFault, ErrorClass, ErrorRecovery, RecoveryAction};
pub use resource::{
    CaptionResource, InMemoryResourceStore, ResourceStore, ResourceUrl, SharedResourceStore,
};
pub use seek::{SeekConfig, SeekOrchestrator, SeekPhase};
pub use subtitles::{SubtitleCue, SubtitleError, SubtitleTrack};
pub use video::{ErrorState, LoadingState, MediaKind, MediaSource, VideoError};
