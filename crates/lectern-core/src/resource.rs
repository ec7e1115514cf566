//! Ephemeral resources for encoded caption tracks.
//!
//! The surface can only load captions from a locator, so an encoded track is
//! published into a [`ResourceStore`] and the returned [`ResourceUrl`] handed
//! to the surface. [`CaptionResource`] owns that allocation and revokes it
//! when dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::subtitles::{self, SubtitleTrack};
use crate::video::VideoError;

/// MIME type of published caption tracks.
pub const CAPTION_MIME_TYPE: &str = "text/vtt";

/// Locator of a published in-memory resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceUrl(String);

impl ResourceUrl {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Host facility that turns in-memory content into a loadable locator.
pub trait ResourceStore {
    /// Publishes `content` and returns a locator for it.
    fn allocate(&mut self, content: &str, mime_type: &str) -> Result<ResourceUrl, VideoError>;

    /// Revokes a locator. Unknown locators are ignored.
    fn revoke(&mut self, url: &ResourceUrl);
}

/// Shared handle to the host's resource store.
pub type SharedResourceStore = Rc<RefCell<dyn ResourceStore>>;

#[derive(Debug)]
struct StoredResource {
    content: String,
    mime_type: String,
}

/// Resource store that keeps everything in a map.
///
/// Used by headless hosts and tests.
#[derive(Debug, Default)]
pub struct InMemoryResourceStore {
    next_id: u64,
    entries: HashMap<ResourceUrl, StoredResource>,
    revoked: usize,
}

impl InMemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a new store in the shared handle the controller expects.
    pub fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Content behind a live locator.
    pub fn content(&self, url: &ResourceUrl) -> Option<&str> {
        self.entries.get(url).map(|entry| entry.content.as_str())
    }

    /// MIME type behind a live locator.
    pub fn mime_type(&self, url: &ResourceUrl) -> Option<&str> {
        self.entries.get(url).map(|entry| entry.mime_type.as_str())
    }

    /// Number of locators not yet revoked.
    pub fn live_count(&self) -> usize {
        self.entries.len()
    }

    /// Number of revocations so far.
    pub fn revoked_count(&self) -> usize {
        self.revoked
    }
}

impl ResourceStore for InMemoryResourceStore {
    fn allocate(&mut self, content: &str, mime_type: &str) -> Result<ResourceUrl, VideoError> {
        self.next_id += 1;
        let url = ResourceUrl(format!("blob:lectern/{}", self.next_id));
        self.entries.insert(
            url.clone(),
            StoredResource {
                content: content.to_string(),
                mime_type: mime_type.to_string(),
            },
        );
        Ok(url)
    }

    fn revoke(&mut self, url: &ResourceUrl) {
        if self.entries.remove(url).is_some() {
            self.revoked += 1;
        }
    }
}

/// A caption track published as an ephemeral resource.
///
/// The locator stays valid exactly as long as this value lives.
pub struct CaptionResource {
    url: ResourceUrl,
    language: Option<String>,
    store: SharedResourceStore,
}

impl CaptionResource {
    /// Encodes `track` and publishes it.
    ///
    /// Returns `Ok(None)` for an empty track: there is nothing to attach.
    pub fn publish(
        store: &SharedResourceStore,
        track: &SubtitleTrack,
    ) -> Result<Option<Self>, VideoError> {
        if track.is_empty() {
            return Ok(None);
        }
        let encoded = subtitles::encode(track);
        let url = store
            .try_borrow_mut()
            .map_err(|_| VideoError::Resource("resource store is busy".to_string()))?
            .allocate(&encoded, CAPTION_MIME_TYPE)?;
        tracing::debug!("Published {} caption cues at {url}", track.len());
        Ok(Some(Self {
            url,
            language: track.language.clone(),
            store: Rc::clone(store),
        }))
    }

    pub fn url(&self) -> &ResourceUrl {
        &self.url
    }

    /// Language declared by the published track.
    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    /// Revokes the resource now.
    pub fn release(self) {
        drop(self);
    }
}

impl fmt::Debug for CaptionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptionResource")
            .field("url", &self.url)
            .field("language", &self.language)
            .finish_non_exhaustive()
    }
}

impl Drop for CaptionResource {
    fn drop(&mut self) {
        match self.store.try_borrow_mut() {
            Ok(mut store) => {
                store.revoke(&self.url);
                tracing::trace!("Revoked caption resource {}", self.url);
            }
            Err(_) => tracing::error!("Resource store busy, leaking {}", self.url),
        }
    }
}
