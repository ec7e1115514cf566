//! Fault classification and bounded local recovery.
//!
//! Backends report faults as [`BackendFault`]s. [`ErrorRecovery`] maps them
//! onto the four-class taxonomy and decides what to do:
//!
//! | Class | Action |
//! |-------|--------|
//! | `Network` | reload the stream from the current position, once |
//! | `MediaDecode` | reinitialize the decode pipeline, once |
//! | `Unsupported` / `Unknown` | terminal |
//!
//! A recurrence of a class whose attempt is still outstanding escalates to
//! terminal. A healthy signal from the backend ends the attempt and clears
//! the error state.

use std::fmt;

use crate::video::{ErrorState, VideoError};

/// Playback fault taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Manifest or segment fetch failed
    Network,
    /// Decoder rejected the media
    MediaDecode,
    /// No playback path exists for the source on this surface
    Unsupported,
    /// Unclassified fatal fault
    Unknown,
}

impl ErrorClass {
    /// Returns true if a local recovery attempt exists for this class.
    pub fn is_recoverable(self) -> bool {
        matches!(self, ErrorClass::Network | ErrorClass::MediaDecode)
    }

    /// Short user-facing description.
    pub fn user_message(self) -> &'static str {
        match self {
            ErrorClass::Network => {
                "The video could not be loaded. Check your connection and retry."
            }
            ErrorClass::MediaDecode => "The video could not be decoded.",
            ErrorClass::Unsupported => "This video format is not supported on this device.",
            ErrorClass::Unknown => "Playback failed unexpectedly.",
        }
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorClass::Network => "network",
            ErrorClass::MediaDecode => "media decode",
            ErrorClass::Unsupported => "unsupported",
            ErrorClass::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

impl From<&VideoError> for ErrorClass {
    fn from(err: &VideoError) -> Self {
        match err {
            VideoError::Network(_) => ErrorClass::Network,
            VideoError::DecodeFailed(_) => ErrorClass::MediaDecode,
            VideoError::UnsupportedFormat(_) => ErrorClass::Unsupported,
            VideoError::OpenFailed(_)
            | VideoError::DecoderInit(_)
            | VideoError::Resource(_)
            | VideoError::Generic(_) => ErrorClass::Unknown,
        }
    }
}

/// Fault reported by the attached backend.
///
/// The diagnostic code is backend-specific and only carried into logs and
/// the terminal message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendFault {
    /// Fatal network error
    FatalNetwork { code: Option<String> },
    /// Fatal media/decode error
    FatalDecode { code: Option<String> },
    /// Fatal error the backend did not classify
    Fatal { code: Option<String> },
    /// Non-fatal error; the backend keeps playing
    NonFatal { code: Option<String> },
}

impl BackendFault {
    /// Backend diagnostic code, if any.
    pub fn code(&self) -> Option<&str> {
        match self {
            BackendFault::FatalNetwork { code }
            | BackendFault::FatalDecode { code }
            | BackendFault::Fatal { code }
            | BackendFault::NonFatal { code } => code.as_deref(),
        }
    }

    /// Returns true if the fault halts playback.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, BackendFault::NonFatal { .. })
    }
}

/// Maps a fault to its class. Non-fatal faults have none.
pub fn classify(fault: &BackendFault) -> Option<ErrorClass> {
    match fault {
        BackendFault::FatalNetwork { .. } => Some(ErrorClass::Network),
        BackendFault::FatalDecode { .. } => Some(ErrorClass::MediaDecode),
        BackendFault::Fatal { .. } => Some(ErrorClass::Unknown),
        BackendFault::NonFatal { .. } => None,
    }
}

/// What the controller must do after a fault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Nothing; playback continues
    Ignore,
    /// Reload the stream from the current position
    ReloadFromPosition,
    /// Reinitialize the decode pipeline without re-fetching
    RecoverDecoder,
    /// Stop; the session is in a terminal state
    Escalate,
}

/// Per-session recovery bookkeeping.
#[derive(Debug, Default)]
pub struct ErrorRecovery {
    state: ErrorState,
    network_attempted: bool,
    decode_attempted: bool,
}

impl ErrorRecovery {
    /// Creates recovery state with no outstanding fault.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current error state.
    pub fn state(&self) -> &ErrorState {
        &self.state
    }

    /// Handles a backend fault and returns the action to take.
    pub fn on_fault(&mut self, fault: &BackendFault) -> RecoveryAction {
        if self.state.is_terminal() {
            tracing::debug!("Ignoring {fault:?}: session already failed");
            return RecoveryAction::Ignore;
        }

        let Some(class) = classify(fault) else {
            tracing::debug!("Non-fatal backend error (code {:?})", fault.code());
            return RecoveryAction::Ignore;
        };

        let attempted = match class {
            ErrorClass::Network => &mut self.network_attempted,
            ErrorClass::MediaDecode => &mut self.decode_attempted,
            ErrorClass::Unsupported | ErrorClass::Unknown => {
                self.escalate(class, fault.code());
                return RecoveryAction::Escalate;
            }
        };

        if *attempted {
            tracing::warn!("{class} fault recurred after recovery attempt, escalating");
            self.escalate(class, fault.code());
            return RecoveryAction::Escalate;
        }

        *attempted = true;
        self.state = ErrorState::Recoverable(class);
        tracing::warn!(
            "Fatal {class} fault (code {:?}), attempting local recovery",
            fault.code()
        );
        match class {
            ErrorClass::Network => RecoveryAction::ReloadFromPosition,
            _ => RecoveryAction::RecoverDecoder,
        }
    }

    /// Records that the backend is healthy again.
    ///
    /// Returns true if this cleared an outstanding recoverable fault.
    pub fn on_healthy(&mut self) -> bool {
        let ErrorState::Recoverable(class) = self.state else {
            return false;
        };
        tracing::info!("Recovered from {class} fault");
        self.state = ErrorState::None;
        self.network_attempted = false;
        self.decode_attempted = false;
        true
    }

    /// Moves straight to terminal, e.g. when no backend could be attached.
    pub fn fail(&mut self, class: ErrorClass, detail: Option<&str>) {
        self.escalate(class, detail);
    }

    fn escalate(&mut self, class: ErrorClass, detail: Option<&str>) {
        let message = match detail {
            Some(detail) => format!("{} ({detail})", class.user_message()),
            None => class.user_message().to_string(),
        };
        tracing::error!("Playback failed: {class}: {message}");
        self.state = ErrorState::Terminal { class, message };
    }
}
