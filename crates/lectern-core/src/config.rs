//! Player configuration.
//!
//! Defaults suit lecture playback. Hosts can override them through the
//! environment:
//!
//! - `LECTERN_SEEK_TOLERANCE_SECS`: start-offset tolerance in seconds
//! - `LECTERN_MAX_SEEK_RETRIES`: corrections before giving up on the offset
//! - `LECTERN_RECHECK_DELAY_MS`: delay before re-checking a confirmed seek
//! - `LECTERN_SEEK_TIMEOUT_MS`: how long a seek may stay unanswered
//! - `LECTERN_NO_AUTOPLAY`: set to any value to disable autoplay
//! - `LECTERN_CAPTION_LANG`: language label for caption tracks

use std::str::FromStr;
use std::time::Duration;

use crate::seek::SeekConfig;

/// Default caption language label.
pub const DEFAULT_CAPTION_LANGUAGE: &str = "es";

/// Playback controller configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerConfig {
    /// Start offset counts as reached within this many seconds
    pub seek_tolerance_secs: f64,
    /// Bounded number of start-offset corrections
    pub max_seek_retries: u32,
    /// Delay before re-checking a confirmed seek
    pub recheck_delay: Duration,
    /// Unanswered seeks are retried after this long
    pub seek_timeout: Duration,
    /// Start playing as soon as playback is allowed
    pub autoplay: bool,
    /// Language label used when a track does not declare one
    pub caption_language: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let seek = SeekConfig::default();
        Self {
            seek_tolerance_secs: seek.tolerance,
            max_seek_retries: seek.max_retries,
            recheck_delay: seek.recheck_delay,
            seek_timeout: seek.seek_timeout,
            autoplay: seek.autoplay,
            caption_language: DEFAULT_CAPTION_LANGUAGE.to_string(),
        }
    }
}

impl PlayerConfig {
    /// Builds a config from defaults overridden by `LECTERN_*` variables.
    ///
    /// Invalid values are logged and ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(tolerance) = parse_var::<f64>(&lookup, "LECTERN_SEEK_TOLERANCE_SECS") {
            if tolerance.is_finite() && tolerance > 0.0 {
                config.seek_tolerance_secs = tolerance;
            } else {
                tracing::warn!("LECTERN_SEEK_TOLERANCE_SECS must be positive, got {tolerance}");
            }
        }
        if let Some(retries) = parse_var::<u32>(&lookup, "LECTERN_MAX_SEEK_RETRIES") {
            config.max_seek_retries = retries;
        }
        if let Some(delay_ms) = parse_var::<u64>(&lookup, "LECTERN_RECHECK_DELAY_MS") {
            config.recheck_delay = Duration::from_millis(delay_ms);
        }
        if let Some(timeout_ms) = parse_var::<u64>(&lookup, "LECTERN_SEEK_TIMEOUT_MS") {
            if timeout_ms > 0 {
                config.seek_timeout = Duration::from_millis(timeout_ms);
            } else {
                tracing::warn!("LECTERN_SEEK_TIMEOUT_MS must be positive");
            }
        }
        if lookup("LECTERN_NO_AUTOPLAY").is_some() {
            config.autoplay = false;
        }
        if let Some(language) = lookup("LECTERN_CAPTION_LANG") {
            let language = language.trim();
            if !language.is_empty() {
                config.caption_language = language.to_string();
            }
        }

        tracing::debug!("Player config: {config:?}");
        config
    }

    /// Seek orchestrator settings derived from this config.
    pub fn seek_config(&self) -> SeekConfig {
        SeekConfig {
            tolerance: self.seek_tolerance_secs,
            max_retries: self.max_seek_retries,
            recheck_delay: self.recheck_delay,
            seek_timeout: self.seek_timeout,
            autoplay: self.autoplay,
        }
    }
}

fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str) -> Option<T> {
    let raw = lookup(name)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!("Ignoring invalid {name}={raw:?}");
            None
        }
    }
}
