//! WebVTT caption parsing and generation.
//!
//! [`parse`] turns caption text into a [`SubtitleTrack`] and never fails:
//! malformed cues are skipped, and input that does not parse into any cue
//! degrades to a single synthetic cue covering the whole video (or to an
//! empty track when there is nothing worth showing). [`encode`] writes a
//! track back out in the syntax [`parse`] accepts.
//!
//! Times are seconds as `f64`, matching the positions reported by media
//! surfaces.

use std::fmt::Write as _;

/// First line of every caption file.
pub const FORMAT_MARKER: &str = "WEBVTT";

/// Separator between the start and end timestamps of a cue.
pub const TIMING_SEPARATOR: &str = "-->";

/// Inputs shorter than this (in characters) skip structured parsing.
pub const MIN_STRUCTURED_LEN: usize = 50;

/// Minimum length of the leftover text for a fallback cue to be emitted.
pub const MIN_FALLBACK_TEXT_LEN: usize = 10;

/// End time of the synthetic fallback cue.
pub const FALLBACK_CUE_END: f64 = 999_999.0;

/// Error type for subtitle operations
#[derive(Debug, Clone, PartialEq)]
pub enum SubtitleError {
    /// Failed to parse timestamp
    InvalidTimestamp(String),
    /// Structured parsing produced no cues
    EmptyFile,
}

impl std::fmt::Display for SubtitleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubtitleError::InvalidTimestamp(s) => write!(f, "Invalid timestamp: {s}"),
            SubtitleError::EmptyFile => write!(f, "No cues found"),
        }
    }
}

impl std::error::Error for SubtitleError {}

/// A single subtitle cue with timing and text.
///
/// Parser output always satisfies `0 <= start <= end`.
#[derive(Debug, Clone, PartialEq)]
pub struct SubtitleCue {
    /// Start time in seconds
    pub start: f64,
    /// End time in seconds
    pub end: f64,
    /// Text content
    pub text: String,
}

impl SubtitleCue {
    /// Creates a cue.
    pub fn new(start: f64, end: f64, text: impl Into<String>) -> Self {
        Self {
            start,
            end,
            text: text.into(),
        }
    }

    /// Returns true if `position` falls inside `[start, end)`.
    pub fn contains(&self, position: f64) -> bool {
        position >= self.start && position < self.end
    }
}

/// A loaded subtitle track
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SubtitleTrack {
    /// All cues in the track, in the order the source listed them
    pub cues: Vec<SubtitleCue>,
    /// Optional language identifier (e.g., "en", "es")
    pub language: Option<String>,
}

impl SubtitleTrack {
    /// Create an empty subtitle track
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a track from cues that are already in start order.
    pub fn from_cues(cues: Vec<SubtitleCue>) -> Self {
        Self {
            cues,
            language: None,
        }
    }

    /// Sets the language tag.
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Get the active cue at the given position, if any.
    ///
    /// Linear search: cues may overlap and the first match wins.
    pub fn cue_at(&self, position: f64) -> Option<&SubtitleCue> {
        self.cues.iter().find(|cue| cue.contains(position))
    }

    /// Get all cues that overlap with the given time range
    pub fn cues_in_range(&self, start: f64, end: f64) -> Vec<&SubtitleCue> {
        self.cues
            .iter()
            .filter(|cue| cue.start < end && cue.end > start)
            .collect()
    }

    /// Total number of cues in the track
    pub fn len(&self) -> usize {
        self.cues.len()
    }

    /// Check if the track has no cues
    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }
}

/// Parses caption text into a track. Never fails.
///
/// Structured parsing runs only when the text contains a timing separator and
/// is at least [`MIN_STRUCTURED_LEN`] characters long. Otherwise, or when
/// structured parsing finds no cue, the text is reduced to a single fallback
/// cue spanning `[0, FALLBACK_CUE_END)`.
pub fn parse(text: &str) -> SubtitleTrack {
    let text = text.strip_prefix('\u{FEFF}').unwrap_or(text);

    if !text.contains(TIMING_SEPARATOR) || text.chars().count() < MIN_STRUCTURED_LEN {
        return fallback_track(text);
    }

    match parse_structured(text) {
        Ok(track) => track,
        Err(err) => {
            tracing::debug!("Caption text did not yield cues ({err}), using fallback cue");
            fallback_track(text)
        }
    }
}

/// Serializes a track into caption text.
///
/// The output starts with the format marker and a `Kind: captions` header
/// (plus `Language:` when the track has one), followed by one-based,
/// blank-line separated cue blocks. An empty track encodes to the bare
/// marker.
pub fn encode(track: &SubtitleTrack) -> String {
    if track.is_empty() {
        return format!("{FORMAT_MARKER}\n\n");
    }

    let mut out = format!("{FORMAT_MARKER}\nKind: captions\n");
    if let Some(language) = &track.language {
        let _ = writeln!(out, "Language: {language}");
    }
    out.push('\n');

    for (index, cue) in track.cues.iter().enumerate() {
        let _ = write!(
            out,
            "{}\n{} {TIMING_SEPARATOR} {}\n{}\n\n",
            index + 1,
            format_timestamp(cue.start),
            format_timestamp(cue.end),
            cue_payload(&cue.text),
        );
    }
    out
}

/// Cue being accumulated by the structured parser.
struct OpenCue {
    start: f64,
    end: f64,
    text: String,
}

fn parse_structured(text: &str) -> Result<SubtitleTrack, SubtitleError> {
    let mut cues = Vec::new();
    let mut language = None;
    let mut open: Option<OpenCue> = None;
    let mut seen_timing = false;

    let lines: Vec<&str> = text.lines().map(str::trim).collect();

    for (index, &line) in lines.iter().enumerate() {

        if index == 0 && is_format_marker(line) {
            continue;
        }

        if line.is_empty() {
            emit_if_complete(&mut open, &mut cues);
            continue;
        }

        // Comment blocks only start outside a cue
        if open.is_none() && line.starts_with("NOTE") {
            continue;
        }

        if line.contains(TIMING_SEPARATOR) {
            emit_if_complete(&mut open, &mut cues);
            seen_timing = true;
            open = match parse_timing(line) {
                Ok((start, end)) => Some(OpenCue {
                    start,
                    end,
                    text: String::new(),
                }),
                Err(err) => {
                    tracing::trace!("Skipping cue: {err}");
                    None
                }
            };
            continue;
        }

        if is_cue_index(line) && precedes_timing(&lines[index + 1..]) {
            emit_if_complete(&mut open, &mut cues);
            continue;
        }

        match open.as_mut() {
            Some(cue) => {
                if !cue.text.is_empty() {
                    cue.text.push(' ');
                }
                cue.text.push_str(line);
            }
            None if !seen_timing => {
                if let Some(tag) = line.strip_prefix("Language:") {
                    let tag = tag.trim();
                    if !tag.is_empty() {
                        language = Some(tag.to_string());
                    }
                }
            }
            None => {}
        }
    }

    emit_if_complete(&mut open, &mut cues);

    if cues.is_empty() {
        return Err(SubtitleError::EmptyFile);
    }

    Ok(SubtitleTrack { cues, language })
}

/// Emits the open cue if it has text. A cue without text stays open.
fn emit_if_complete(open: &mut Option<OpenCue>, cues: &mut Vec<SubtitleCue>) {
    if open.as_ref().is_some_and(|cue| !cue.text.is_empty()) {
        if let Some(cue) = open.take() {
            cues.push(SubtitleCue {
                start: cue.start,
                end: cue.end,
                text: cue.text,
            });
        }
    }
}

fn fallback_track(text: &str) -> SubtitleTrack {
    let body = text.trim_start();
    let body = body.strip_prefix(FORMAT_MARKER).unwrap_or(body);
    let remainder = body
        .split_whitespace()
        .filter(|token| !is_cue_index(token))
        .collect::<Vec<_>>()
        .join(" ");

    if remainder.chars().count() < MIN_FALLBACK_TEXT_LEN {
        return SubtitleTrack::new();
    }

    SubtitleTrack::from_cues(vec![SubtitleCue {
        start: 0.0,
        end: FALLBACK_CUE_END,
        text: remainder,
    }])
}

fn is_format_marker(line: &str) -> bool {
    line.strip_prefix(FORMAT_MARKER)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with(char::is_whitespace))
}

/// Whether the next non-blank line is a timing line.
fn precedes_timing(rest: &[&str]) -> bool {
    rest.iter()
        .find(|line| !line.is_empty())
        .is_some_and(|line| line.contains(TIMING_SEPARATOR))
}

fn is_cue_index(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Parse timing line: "00:00:01.000 --> 00:00:04.000 align:start"
fn parse_timing(line: &str) -> Result<(f64, f64), SubtitleError> {
    let (start_str, rest) = line
        .split_once(TIMING_SEPARATOR)
        .ok_or_else(|| SubtitleError::InvalidTimestamp(line.to_string()))?;

    // End timestamp is the first token after the separator; cue settings follow it
    let end_str = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| SubtitleError::InvalidTimestamp(line.to_string()))?;

    let start = parse_timestamp(start_str.trim())?;
    let end = parse_timestamp(end_str)?;
    if end < start {
        return Err(SubtitleError::InvalidTimestamp(line.to_string()));
    }
    Ok((start, end))
}

/// Timestamp parsing: "HH:MM:SS.mmm" or "MM:SS.mmm" into seconds.
///
/// A comma is accepted as the decimal separator.
fn parse_timestamp(s: &str) -> Result<f64, SubtitleError> {
    let invalid = || SubtitleError::InvalidTimestamp(s.to_string());
    let parts: Vec<&str> = s.split(':').collect();

    let (hours, minutes, seconds) = match parts.as_slice() {
        [m, sec] => (0u64, *m, *sec),
        [h, m, sec] => (parse_digits(h).ok_or_else(invalid)?, *m, *sec),
        _ => return Err(invalid()),
    };

    let minutes = parse_digits(minutes).ok_or_else(invalid)?;

    let seconds = seconds.replace(',', ".");
    if seconds.is_empty() || !seconds.bytes().all(|b| b.is_ascii_digit() || b == b'.') {
        return Err(invalid());
    }
    let seconds: f64 = seconds.parse().map_err(|_| invalid())?;

    Ok(hours as f64 * 3600.0 + minutes as f64 * 60.0 + seconds)
}

fn parse_digits(s: &str) -> Option<u64> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

/// Formats seconds as "HH:MM:SS.mmm", rounding to the nearest millisecond.
fn format_timestamp(seconds: f64) -> String {
    let total_ms = if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1000.0).round() as u64
    } else {
        0
    };
    let hours = total_ms / 3_600_000;
    let minutes = (total_ms / 60_000) % 60;
    let secs = (total_ms / 1000) % 60;
    let millis = total_ms % 1000;
    format!("{hours:02}:{minutes:02}:{secs:02}.{millis:03}")
}

/// Cue text with blank lines dropped so it cannot split its own block.
fn cue_payload(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.replace(TIMING_SEPARATOR, "->"))
        .collect::<Vec<_>>()
        .join("\n")
}
