//! Playback controller.
//!
//! [`PlaybackController`] owns the media surface and at most one live
//! session. Mounting a source tears down the previous session, selects and
//! attaches a backend, publishes the caption track and hands the start offset
//! to the [`SeekOrchestrator`]. Surface events and timers are routed back in
//! through [`PlaybackController::handle_event`] and
//! [`PlaybackController::on_timer`], tagged with the session they belong to.
//! Anything tagged with a superseded session is dropped.
//!
//! # Example
//!
//! ```ignore
//! let mut controller = PlaybackController::new(surface, store, Box::new(scheduler), PlayerConfig::from_env());
//! let session = controller.mount(MediaSource::from_locator(url), 42.0, Some(track));
//! // later, from the surface's event loop:
//! controller.handle_event(session, PlaybackEvent::Ready);
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::backend::{self, BackendHandle, BackendVariant, MediaSurface, StreamingClientFactory};
use crate::config::PlayerConfig;
use crate::embed;
use crate::recovery::{BackendFault, ErrorClass, ErrorRecovery, RecoveryAction};
use crate::resource::{CaptionResource, SharedResourceStore};
use crate::seek::{PlayGate, SeekCommand, SeekOrchestrator, SeekPhase};
use crate::subtitles::SubtitleTrack;
use crate::video::{ErrorState, LoadingState, MediaKind, MediaSource};

/// Identity of one mount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies a scheduled re-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken {
    pub session: SessionId,
    pub generation: u64,
}

/// Host timer facility.
///
/// When `delay` elapses the host calls [`PlaybackController::on_timer`] with
/// the token. Tokens that outlive their session are ignored, so hosts need not
/// cancel them.
pub trait Scheduler {
    fn schedule(&mut self, delay: Duration, token: TimerToken);
}

/// Event reported by the surface or the backend.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// Enough data is buffered to seek and play
    Ready,
    /// A seek completed
    Seeked,
    /// The surface started, or tried to start, playing
    PlayRequested,
    /// Playback position advanced
    TimeUpdate,
    /// Backend error
    Fault(BackendFault),
}

/// Snapshot of the controller observed by the UI.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PlaybackStatus {
    pub session: Option<SessionId>,
    pub loading: LoadingState,
    pub error: ErrorState,
    pub backend: Option<BackendVariant>,
    pub seek_phase: SeekPhase,
    /// Requested start offset in seconds
    pub start_offset: f64,
    /// Whether the start offset was reached
    pub start_applied: bool,
    /// Last known position in seconds
    pub position: f64,
    /// Text of the caption cue at `position`
    pub active_cue: Option<String>,
}

/// Thread-safe handle to the latest [`PlaybackStatus`].
#[derive(Debug, Clone, Default)]
pub struct PlaybackStatusHandle {
    inner: Arc<Mutex<PlaybackStatus>>,
}

impl PlaybackStatusHandle {
    /// Returns a copy of the latest status.
    pub fn get(&self) -> PlaybackStatus {
        self.inner.lock().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.inner.lock().loading == LoadingState::Loading
    }

    pub fn error(&self) -> ErrorState {
        self.inner.lock().error.clone()
    }

    fn set(&self, status: PlaybackStatus) {
        *self.inner.lock() = status;
    }
}

type StatusListener = Box<dyn FnMut(&PlaybackStatus)>;

struct PlaybackSession {
    id: SessionId,
    source: MediaSource,
    start_offset: f64,
    loading: LoadingState,
    position: f64,
    backend: Option<BackendHandle>,
    track: Option<SubtitleTrack>,
    captions: Option<CaptionResource>,
    seek: SeekOrchestrator,
    recovery: ErrorRecovery,
    /// Playback was interrupted by a source reload
    resume_on_ready: bool,
}

/// Controller for one media surface.
pub struct PlaybackController<S: MediaSurface> {
    surface: S,
    resources: SharedResourceStore,
    streaming: Option<Box<dyn StreamingClientFactory>>,
    scheduler: Box<dyn Scheduler>,
    config: PlayerConfig,
    session: Option<PlaybackSession>,
    next_session: u64,
    status: PlaybackStatusHandle,
    published: PlaybackStatus,
    listener: Option<StatusListener>,
}

impl<S: MediaSurface> PlaybackController<S> {
    pub fn new(
        surface: S,
        resources: SharedResourceStore,
        scheduler: Box<dyn Scheduler>,
        config: PlayerConfig,
    ) -> Self {
        Self {
            surface,
            resources,
            streaming: None,
            scheduler,
            config,
            session: None,
            next_session: 1,
            status: PlaybackStatusHandle::default(),
            published: PlaybackStatus::default(),
            listener: None,
        }
    }

    /// Enables the library backend for adaptive manifests.
    pub fn with_streaming_client(mut self, factory: Box<dyn StreamingClientFactory>) -> Self {
        self.streaming = Some(factory);
        self
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Identity of the live session, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|session| session.id)
    }

    /// Latest status snapshot.
    pub fn status(&self) -> PlaybackStatus {
        self.published.clone()
    }

    /// Handle other threads can poll for status.
    pub fn status_handle(&self) -> PlaybackStatusHandle {
        self.status.clone()
    }

    /// Registers a callback invoked on every status change.
    pub fn set_listener(&mut self, listener: impl FnMut(&PlaybackStatus) + 'static) {
        self.listener = Some(Box::new(listener));
    }

    /// Starts a new session for `source`, superseding the current one.
    ///
    /// Attachment failures do not fail the mount: the session enters a
    /// terminal error state and is reported through the status.
    pub fn mount(
        &mut self,
        source: MediaSource,
        start_offset: f64,
        track: Option<SubtitleTrack>,
    ) -> SessionId {
        self.teardown("superseded by a new mount");

        let id = SessionId(self.next_session);
        self.next_session += 1;

        let (locator, seek_target) = match source.kind() {
            MediaKind::HostedEmbed => (embed::embed_url(source.locator(), start_offset), 0.0),
            _ => (source.locator().to_string(), start_offset),
        };
        tracing::info!(
            "Mounting session {id}: {:?} {} at {start_offset:.1}s",
            source.kind(),
            source.locator()
        );

        let mut session = PlaybackSession {
            id,
            source,
            start_offset,
            loading: LoadingState::Loading,
            position: 0.0,
            backend: None,
            track,
            captions: None,
            seek: SeekOrchestrator::new(self.config.seek_config()),
            recovery: ErrorRecovery::new(),
            resume_on_ready: false,
        };
        session.seek.begin(seek_target);

        let attached = backend::select(self.surface.capabilities(), session.source.kind()).and_then(
            |variant| {
                let factory = self
                    .streaming
                    .as_mut()
                    .map(|factory| &mut **factory as &mut dyn StreamingClientFactory);
                BackendHandle::attach(id, variant, &locator, &mut self.surface, factory)
            },
        );
        match attached {
            Ok(handle) => {
                session.backend = Some(handle);
                attach_captions(&mut self.surface, &self.resources, &self.config, &mut session);
            }
            Err(err) => {
                tracing::error!("Session {id}: {err}");
                session.seek.reset();
                session
                    .recovery
                    .fail(ErrorClass::from(&err), Some(&err.to_string()));
            }
        }
        refresh_loading(&mut session);

        self.session = Some(session);
        self.publish();
        id
    }

    /// Tears down the live session. Idempotent.
    pub fn unmount(&mut self) {
        if self.teardown("unmounted") {
            self.publish();
        }
    }

    /// Replaces the caption track of the live session.
    ///
    /// The previously published resource is revoked.
    pub fn set_subtitles(&mut self, track: Option<SubtitleTrack>) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("No session, dropping caption track");
            return;
        };
        if session.captions.take().is_some() {
            self.surface.detach_captions();
        }
        session.track = track;
        if session.backend.is_some() {
            attach_captions(&mut self.surface, &self.resources, &self.config, session);
        }
        self.publish();
    }

    /// Changes the start offset of the live session.
    pub fn set_start_offset(&mut self, start_offset: f64) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.start_offset == start_offset {
            return;
        }

        if session.source.kind() == MediaKind::HostedEmbed {
            // The offset lives in the embed URL, so the player page is rebuilt.
            let source = session.source.clone();
            let track = session.track.take();
            self.mount(source, start_offset, track);
            return;
        }

        session.start_offset = start_offset;
        if session.recovery.state().is_terminal() {
            self.publish();
            return;
        }
        let commands = session.seek.set_target(start_offset);
        execute(&mut self.surface, self.scheduler.as_mut(), session.id, &commands);
        refresh_loading(session);
        self.publish();
    }

    /// Asks to start playback. Blocked until the start offset is settled.
    pub fn request_play(&mut self) {
        let Some(session) = self.session.as_mut() else {
            tracing::debug!("Play requested without a session");
            return;
        };
        if session.recovery.state().is_terminal() {
            tracing::debug!("Session {}: play requested after failure", session.id);
            return;
        }
        match session.seek.on_play_attempt() {
            PlayGate::Allow => self.surface.play(),
            PlayGate::Intercept(commands) => {
                execute(&mut self.surface, self.scheduler.as_mut(), session.id, &commands)
            }
        }
        refresh_loading(session);
        self.publish();
    }

    /// Routes a surface or backend event to the session it belongs to.
    pub fn handle_event(&mut self, session_id: SessionId, event: PlaybackEvent) {
        let Some(session) = self.session.as_mut() else {
            tracing::trace!("Dropping {event:?}: no session");
            return;
        };
        if session.id != session_id {
            tracing::debug!("Dropping {event:?} from stale session {session_id}");
            return;
        }

        session.position = self.surface.position();
        let terminal = session.recovery.state().is_terminal();
        if terminal && event != PlaybackEvent::TimeUpdate {
            tracing::trace!("Session {session_id} failed, ignoring {event:?}");
            self.publish();
            return;
        }

        let position = session.position;
        let commands = match event {
            PlaybackEvent::Ready => {
                session.recovery.on_healthy();
                let mut commands = session.seek.on_ready();
                if std::mem::take(&mut session.resume_on_ready)
                    && session.seek.is_playback_allowed()
                    && !commands.contains(&SeekCommand::Play)
                {
                    tracing::debug!("Session {session_id}: resuming after reload");
                    commands.push(SeekCommand::Play);
                }
                commands
            }
            PlaybackEvent::Seeked => session.seek.on_seeked(position),
            PlaybackEvent::PlayRequested => match session.seek.on_play_attempt() {
                PlayGate::Allow => Vec::new(),
                PlayGate::Intercept(commands) => commands,
            },
            PlaybackEvent::TimeUpdate => {
                if !terminal && session.seek.is_playback_allowed() {
                    session.recovery.on_healthy();
                }
                Vec::new()
            }
            PlaybackEvent::Fault(fault) => {
                let action = session.recovery.on_fault(&fault);
                apply_recovery(&mut self.surface, session, action);
                Vec::new()
            }
        };

        execute(&mut self.surface, self.scheduler.as_mut(), session.id, &commands);
        refresh_loading(session);
        self.publish();
    }

    /// Delivers a re-check scheduled through the [`Scheduler`].
    pub fn on_timer(&mut self, token: TimerToken) {
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if session.id != token.session {
            tracing::debug!("Dropping timer from stale session {}", token.session);
            return;
        }
        if session.recovery.state().is_terminal() {
            return;
        }

        session.position = self.surface.position();
        let commands = session.seek.on_recheck(token.generation, session.position);
        execute(&mut self.surface, self.scheduler.as_mut(), session.id, &commands);
        refresh_loading(session);
        self.publish();
    }

    /// Releases the session's captions and backend. Returns false if there
    /// was no session.
    fn teardown(&mut self, reason: &str) -> bool {
        let Some(mut session) = self.session.take() else {
            return false;
        };
        tracing::info!("Tearing down session {} ({reason})", session.id);

        if let Some(captions) = session.captions.take() {
            self.surface.detach_captions();
            captions.release();
        }
        if let Some(mut handle) = session.backend.take() {
            handle.release(&mut self.surface);
        }
        session.seek.reset();
        true
    }

    fn publish(&mut self) {
        let status = match &self.session {
            Some(session) => PlaybackStatus {
                session: Some(session.id),
                loading: session.loading,
                error: session.recovery.state().clone(),
                backend: session.backend.as_ref().map(BackendHandle::variant),
                seek_phase: session.seek.phase(),
                start_offset: session.start_offset,
                start_applied: session.seek.applied(),
                position: session.position,
                active_cue: session
                    .track
                    .as_ref()
                    .and_then(|track| track.cue_at(session.position))
                    .map(|cue| cue.text.clone()),
            },
            None => PlaybackStatus::default(),
        };

        if status == self.published {
            return;
        }
        tracing::trace!("Status changed: {status:?}");
        self.status.set(status.clone());
        if let Some(listener) = self.listener.as_mut() {
            listener(&status);
        }
        self.published = status;
    }
}

impl<S: MediaSurface> Drop for PlaybackController<S> {
    fn drop(&mut self) {
        self.teardown("controller dropped");
    }
}

fn attach_captions(
    surface: &mut dyn MediaSurface,
    resources: &SharedResourceStore,
    config: &PlayerConfig,
    session: &mut PlaybackSession,
) {
    let Some(track) = session.track.as_ref() else {
        return;
    };
    match CaptionResource::publish(resources, track) {
        Ok(Some(captions)) => {
            let language = captions
                .language()
                .unwrap_or(&config.caption_language)
                .to_string();
            surface.attach_captions(captions.url(), &language);
            session.captions = Some(captions);
        }
        Ok(None) => tracing::debug!("Session {}: caption track is empty", session.id),
        // Captions are optional; playback continues without them.
        Err(err) => tracing::warn!("Session {}: failed to publish captions: {err}", session.id),
    }
}

fn apply_recovery(
    surface: &mut dyn MediaSurface,
    session: &mut PlaybackSession,
    action: RecoveryAction,
) {
    let Some(handle) = session.backend.as_mut() else {
        return;
    };
    match action {
        RecoveryAction::Ignore => {}
        RecoveryAction::ReloadFromPosition => {
            if handle.variant() == BackendVariant::Native {
                session.resume_on_ready = surface.is_playing();
            }
            handle.reload(surface, session.position);
        }
        RecoveryAction::RecoverDecoder => handle.recover_decode(surface),
        RecoveryAction::Escalate => surface.pause(),
    }
}

fn execute(
    surface: &mut dyn MediaSurface,
    scheduler: &mut dyn Scheduler,
    session: SessionId,
    commands: &[SeekCommand],
) {
    for command in commands {
        match *command {
            SeekCommand::Pause => surface.pause(),
            SeekCommand::SeekTo(position) => surface.seek(position),
            SeekCommand::Play => surface.play(),
            SeekCommand::ScheduleRecheck { generation, delay } => {
                scheduler.schedule(delay, TimerToken { session, generation })
            }
        }
    }
}

/// A failed session is not loading anything.
fn refresh_loading(session: &mut PlaybackSession) {
    let settled = session.seek.is_playback_allowed() || session.recovery.state().is_terminal();
    session.loading = if settled {
        LoadingState::Ready
    } else {
        LoadingState::Loading
    };
}
