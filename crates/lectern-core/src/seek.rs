//! Start-offset enforcement.
//!
//! Surfaces frequently reset to the beginning while buffering, so a single
//! seek issued on readiness is not enough. [`SeekOrchestrator`] pauses the
//! surface, seeks to the requested offset, waits for the seek to land within
//! tolerance, re-checks after a short delay, and only then lets playback
//! start. Each correction counts as a retry; once the budget is spent it gives
//! up on the offset and allows playback from wherever the surface is. A seek
//! that never reports completion times out and counts as a missed landing.
//!
//! ```text
//! Idle -> AwaitingReady -> SeekRequested -> SeekConfirmed -> PlaybackAllowed
//!                              ^                 |
//!                              +---- drift ------+
//! ```
//!
//! The orchestrator never touches the surface. It returns [`SeekCommand`]s
//! for the controller to execute.

use std::time::Duration;

/// Tuning for start-offset correction.
#[derive(Debug, Clone, PartialEq)]
pub struct SeekConfig {
    /// An offset counts as reached within this many seconds
    pub tolerance: f64,
    /// Corrections allowed before giving up on the offset
    pub max_retries: u32,
    /// Delay before re-checking a confirmed seek
    pub recheck_delay: Duration,
    /// How long to wait for a seek to complete before retrying it
    pub seek_timeout: Duration,
    /// Start playing once the offset is reached
    pub autoplay: bool,
}

impl Default for SeekConfig {
    fn default() -> Self {
        Self {
            tolerance: 1.0,
            max_retries: 3,
            recheck_delay: Duration::from_millis(50),
            seek_timeout: Duration::from_secs(2),
            autoplay: true,
        }
    }
}

/// Where the orchestrator is in the start-offset sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SeekPhase {
    /// No session
    #[default]
    Idle,
    /// Source attached, surface not ready yet
    AwaitingReady,
    /// Seek to the target issued, waiting for completion
    SeekRequested,
    /// Seek landed within tolerance, waiting for the re-check
    SeekConfirmed,
    /// Playback may start
    PlaybackAllowed,
}

/// Surface operation requested by the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeekCommand {
    Pause,
    SeekTo(f64),
    Play,
    /// Deliver a re-check for `generation` after `delay`. Also used as the
    /// timeout of an outstanding seek.
    ScheduleRecheck { generation: u64, delay: Duration },
}

/// Outcome of a playback attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayGate {
    /// Playback may proceed
    Allow,
    /// Playback was blocked; execute these commands instead
    Intercept(Vec<SeekCommand>),
}

/// Start-offset state machine for one session.
#[derive(Debug)]
pub struct SeekOrchestrator {
    config: SeekConfig,
    phase: SeekPhase,
    target: f64,
    applied: bool,
    retries: u32,
    generation: u64,
    surface_ready: bool,
    play_pending: bool,
}

impl SeekOrchestrator {
    pub fn new(config: SeekConfig) -> Self {
        Self {
            config,
            phase: SeekPhase::Idle,
            target: 0.0,
            applied: false,
            retries: 0,
            generation: 0,
            surface_ready: false,
            play_pending: false,
        }
    }

    pub fn phase(&self) -> SeekPhase {
        self.phase
    }

    /// Requested start offset in seconds.
    pub fn target(&self) -> f64 {
        self.target
    }

    /// Whether the current target was reached and confirmed.
    pub fn applied(&self) -> bool {
        self.applied
    }

    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Generation of the most recently scheduled re-check or seek timeout.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_playback_allowed(&self) -> bool {
        self.phase == SeekPhase::PlaybackAllowed
    }

    /// Starts a new session targeting `target` seconds.
    pub fn begin(&mut self, target: f64) {
        self.reset();
        self.target = sanitize(target);
        self.phase = SeekPhase::AwaitingReady;
        tracing::debug!("Seek orchestrator awaiting ready, target {:.2}s", self.target);
    }

    /// Returns to idle. Any scheduled re-check becomes stale.
    pub fn reset(&mut self) {
        let generation = self.generation + 1;
        *self = Self::new(self.config.clone());
        self.generation = generation;
    }

    /// The surface has enough data to seek.
    pub fn on_ready(&mut self) -> Vec<SeekCommand> {
        self.surface_ready = true;
        if self.phase != SeekPhase::AwaitingReady {
            return Vec::new();
        }
        if self.target <= 0.0 {
            return self.allow();
        }
        tracing::debug!("Surface ready, seeking to {:.2}s", self.target);
        self.request_seek()
    }

    /// A seek completed with the surface at `position`.
    pub fn on_seeked(&mut self, position: f64) -> Vec<SeekCommand> {
        if self.phase != SeekPhase::SeekRequested {
            tracing::trace!("Seek completion at {position:.2}s ignored in {:?}", self.phase);
            return Vec::new();
        }
        if !self.within_tolerance(position) {
            tracing::debug!(
                "Seek landed at {position:.2}s, expected {:.2}s",
                self.target
            );
            return self.retry();
        }
        self.phase = SeekPhase::SeekConfirmed;
        self.generation += 1;
        vec![SeekCommand::ScheduleRecheck {
            generation: self.generation,
            delay: self.config.recheck_delay,
        }]
    }

    /// A re-check scheduled for `generation` fired with the surface at
    /// `position`.
    ///
    /// Firing while the seek is still outstanding means it timed out.
    pub fn on_recheck(&mut self, generation: u64, position: f64) -> Vec<SeekCommand> {
        if generation != self.generation {
            tracing::trace!("Stale re-check (generation {generation})");
            return Vec::new();
        }
        match self.phase {
            SeekPhase::SeekConfirmed if self.within_tolerance(position) => self.allow(),
            SeekPhase::SeekConfirmed => {
                tracing::debug!(
                    "Position drifted to {position:.2}s after seek confirmation, correcting"
                );
                self.retry()
            }
            SeekPhase::SeekRequested => {
                tracing::debug!(
                    "Seek to {:.2}s did not complete within {:?}",
                    self.target,
                    self.config.seek_timeout
                );
                self.retry()
            }
            _ => Vec::new(),
        }
    }

    /// Something tried to start playback.
    pub fn on_play_attempt(&mut self) -> PlayGate {
        if self.phase == SeekPhase::PlaybackAllowed || self.target <= 0.0 {
            return PlayGate::Allow;
        }
        self.play_pending = true;
        match self.phase {
            SeekPhase::Idle | SeekPhase::AwaitingReady => {
                tracing::debug!("Play attempt before ready, deferring");
                PlayGate::Intercept(vec![SeekCommand::Pause])
            }
            SeekPhase::SeekRequested | SeekPhase::SeekConfirmed => {
                tracing::debug!("Play attempt before start offset confirmed, re-seeking");
                let commands = self.retry();
                if self.phase == SeekPhase::PlaybackAllowed {
                    PlayGate::Allow
                } else {
                    PlayGate::Intercept(commands)
                }
            }
            SeekPhase::PlaybackAllowed => PlayGate::Allow,
        }
    }

    /// Changes the target of the live session.
    ///
    /// The same target is a no-op; a different one restarts correction.
    pub fn set_target(&mut self, target: f64) -> Vec<SeekCommand> {
        let target = sanitize(target);
        if self.phase == SeekPhase::Idle {
            self.target = target;
            return Vec::new();
        }
        if target == self.target {
            return Vec::new();
        }

        tracing::debug!("Start offset changed {:.2}s -> {target:.2}s", self.target);
        self.target = target;
        self.applied = false;
        self.retries = 0;
        self.generation += 1;

        if !self.surface_ready {
            self.phase = SeekPhase::AwaitingReady;
            return Vec::new();
        }
        if target <= 0.0 {
            let mut commands = vec![SeekCommand::SeekTo(0.0)];
            commands.extend(self.allow());
            return commands;
        }
        self.request_seek()
    }

    fn within_tolerance(&self, position: f64) -> bool {
        (position - self.target).abs() < self.config.tolerance
    }

    fn retry(&mut self) -> Vec<SeekCommand> {
        self.retries += 1;
        if self.retries > self.config.max_retries {
            tracing::warn!(
                "Start offset {:.2}s not reached after {} retries, playing from current position",
                self.target,
                self.config.max_retries
            );
            return self.abandon();
        }
        self.request_seek()
    }

    /// Pauses, seeks to the target and arms the completion timeout.
    fn request_seek(&mut self) -> Vec<SeekCommand> {
        self.phase = SeekPhase::SeekRequested;
        self.generation += 1;
        vec![
            SeekCommand::Pause,
            SeekCommand::SeekTo(self.target),
            SeekCommand::ScheduleRecheck {
                generation: self.generation,
                delay: self.config.seek_timeout,
            },
        ]
    }

    fn allow(&mut self) -> Vec<SeekCommand> {
        self.applied = true;
        self.open_gate()
    }

    fn abandon(&mut self) -> Vec<SeekCommand> {
        self.generation += 1;
        self.open_gate()
    }

    fn open_gate(&mut self) -> Vec<SeekCommand> {
        self.phase = SeekPhase::PlaybackAllowed;
        let play = std::mem::take(&mut self.play_pending) || self.config.autoplay;
        if play {
            vec![SeekCommand::Play]
        } else {
            Vec::new()
        }
    }
}

/// Clamps a requested offset to a finite, non-negative number of seconds.
fn sanitize(target: f64) -> f64 {
    if target.is_finite() && target > 0.0 {
        target
    } else {
        0.0
    }
}
