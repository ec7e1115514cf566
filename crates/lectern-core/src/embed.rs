//! Hosted-player (YouTube) locators.
//!
//! A hosted embed cannot be sought through the surface, so the start offset is
//! baked into the embed URL instead.

use url::Url;

const EMBED_BASE: &str = "https://www.youtube.com/embed/";

/// Returns true if `locator` points at a hosted YouTube player.
pub fn is_hosted_embed(locator: &str) -> bool {
    match Url::parse(locator) {
        Ok(url) => url.host_str().is_some_and(is_youtube_host),
        Err(_) => locator.contains("youtube.com") || locator.contains("youtu.be"),
    }
}

fn is_youtube_host(host: &str) -> bool {
    host == "youtu.be" || host == "youtube.com" || host.ends_with(".youtube.com")
}

/// Extracts the video id from a watch, short-link or embed URL.
pub fn video_id(locator: &str) -> Option<String> {
    let url = Url::parse(locator).ok()?;
    let host = url.host_str()?;
    if !is_youtube_host(host) {
        return None;
    }
    let mut segments = url.path_segments()?;
    let id = if host == "youtu.be" {
        segments.next().map(str::to_string)
    } else {
        match segments.next() {
            Some("embed") => segments.next().map(str::to_string),
            _ => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
        }
    };
    id.filter(|id| !id.is_empty())
}

/// Builds the embed URL for `locator` starting at `start_offset` seconds.
///
/// Existing embed URLs keep their parameters and get `start` replaced. Watch
/// and short links are rewritten to a fresh embed URL with captions enabled.
/// Anything else is returned unchanged.
pub fn embed_url(locator: &str, start_offset: f64) -> String {
    let start = whole_seconds(start_offset);

    if let Ok(mut url) = Url::parse(locator) {
        let is_embed = url.host_str().is_some_and(is_youtube_host)
            && url.path().starts_with("/embed/");
        if is_embed {
            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(key, _)| key != "start")
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(kept)
                .append_pair("start", &start.to_string());
            return url.to_string();
        }
    }

    match video_id(locator) {
        Some(id) => format!(
            "{EMBED_BASE}{id}?autoplay=1&rel=0&modestbranding=1&start={start}&cc_load_policy=1"
        ),
        None => {
            tracing::debug!("No video id in {locator}, using it as is");
            locator.to_string()
        }
    }
}

fn whole_seconds(offset: f64) -> u64 {
    if offset.is_finite() && offset > 0.0 {
        offset.floor() as u64
    } else {
        0
    }
}
