//! Scripted surface, streaming client and scheduler shared by the
//! integration tests.

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use lectern_core::{
    InMemoryResourceStore, MediaSurface, PlaybackController, PlaybackEvent, PlayerConfig,
    ResourceUrl, Scheduler, SessionId, SharedResourceStore, StreamingClient,
    StreamingClientFactory, SurfaceCapabilities, TimerToken, VideoError,
};

/// Upper bound on delivered events and timers per pump.
pub const MAX_STEPS: usize = 100;

/// Operation the controller performed on the surface.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    SetSource(String),
    ClearSource,
    Reload,
    Play,
    Pause,
    Seek(f64),
    AttachCaptions(String),
    DetachCaptions,
}

pub type EventQueue = Rc<RefCell<VecDeque<PlaybackEvent>>>;

/// Media surface that completes seeks immediately by queueing `Seeked`.
pub struct ScriptedSurface {
    pub capabilities: SurfaceCapabilities,
    pub position: f64,
    pub playing: bool,
    pub source: Option<String>,
    pub captions: Option<(ResourceUrl, String)>,
    /// Seeks that land at 0 instead of the requested position
    pub snap_back_seeks: usize,
    /// Seeks that never report completion
    pub lost_seeks: usize,
    pub ops: Vec<Op>,
    events: EventQueue,
}

impl ScriptedSurface {
    pub fn seeks(&self) -> Vec<f64> {
        self.ops
            .iter()
            .filter_map(|op| match op {
                Op::Seek(position) => Some(*position),
                _ => None,
            })
            .collect()
    }

    pub fn count(&self, wanted: &Op) -> usize {
        self.ops.iter().filter(|op| *op == wanted).count()
    }

    /// Operations performed since the last source assignment, inclusive.
    pub fn ops_since_last_source(&self) -> &[Op] {
        let start = self
            .ops
            .iter()
            .rposition(|op| matches!(op, Op::SetSource(_)))
            .unwrap_or(0);
        &self.ops[start..]
    }

    /// True if playback only started after the last seek was issued.
    pub fn played_after_last_seek(&self) -> bool {
        let Some(first_play) = self.ops.iter().position(|op| *op == Op::Play) else {
            return false;
        };
        match self.ops.iter().rposition(|op| matches!(op, Op::Seek(_))) {
            Some(last_seek) => first_play > last_seek,
            None => true,
        }
    }
}

impl MediaSurface for ScriptedSurface {
    fn capabilities(&self) -> SurfaceCapabilities {
        self.capabilities
    }

    fn set_source(&mut self, locator: &str) {
        self.ops.push(Op::SetSource(locator.to_string()));
        self.source = Some(locator.to_string());
        self.position = 0.0;
        self.playing = false;
    }

    fn clear_source(&mut self) {
        self.ops.push(Op::ClearSource);
        self.source = None;
        self.playing = false;
    }

    fn reload(&mut self) {
        self.ops.push(Op::Reload);
    }

    fn play(&mut self) {
        self.ops.push(Op::Play);
        self.playing = true;
    }

    fn pause(&mut self) {
        self.ops.push(Op::Pause);
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn seek(&mut self, position: f64) {
        self.ops.push(Op::Seek(position));
        if self.lost_seeks > 0 {
            self.lost_seeks -= 1;
            return;
        }
        if self.snap_back_seeks > 0 {
            self.snap_back_seeks -= 1;
            self.position = 0.0;
        } else {
            self.position = position;
        }
        self.events.borrow_mut().push_back(PlaybackEvent::Seeked);
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn attach_captions(&mut self, url: &ResourceUrl, language: &str) {
        self.ops.push(Op::AttachCaptions(url.to_string()));
        self.captions = Some((url.clone(), language.to_string()));
    }

    fn detach_captions(&mut self) {
        self.ops.push(Op::DetachCaptions);
        self.captions = None;
    }
}

/// Scheduler that queues tokens until the test delivers them.
pub struct ManualScheduler {
    pending: Rc<RefCell<VecDeque<TimerToken>>>,
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, delay: Duration, token: TimerToken) {
        assert!(delay > Duration::ZERO);
        self.pending.borrow_mut().push_back(token);
    }
}

/// What the fake streaming clients saw.
#[derive(Debug, Default)]
pub struct ClientStats {
    pub created: usize,
    pub destroyed: usize,
    pub attached: Vec<String>,
    pub start_loads: Vec<f64>,
    pub media_recoveries: usize,
}

impl ClientStats {
    pub fn live(&self) -> usize {
        self.created - self.destroyed
    }
}

struct FakeClient {
    stats: Rc<RefCell<ClientStats>>,
    fail_attach: bool,
    destroyed: bool,
}

impl StreamingClient for FakeClient {
    fn attach(&mut self, locator: &str, _surface: &mut dyn MediaSurface) -> Result<(), VideoError> {
        if self.fail_attach {
            return Err(VideoError::DecoderInit("manifest parse failed".to_string()));
        }
        self.stats.borrow_mut().attached.push(locator.to_string());
        Ok(())
    }

    fn start_load(&mut self, position: f64) {
        self.stats.borrow_mut().start_loads.push(position);
    }

    fn recover_media_error(&mut self) {
        self.stats.borrow_mut().media_recoveries += 1;
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.stats.borrow_mut().destroyed += 1;
        }
    }
}

pub struct FakeClientFactory {
    pub stats: Rc<RefCell<ClientStats>>,
    pub fail_attach: bool,
}

impl StreamingClientFactory for FakeClientFactory {
    fn create(&mut self, _session: SessionId) -> Result<Box<dyn StreamingClient>, VideoError> {
        self.stats.borrow_mut().created += 1;
        Ok(Box::new(FakeClient {
            stats: Rc::clone(&self.stats),
            fail_attach: self.fail_attach,
            destroyed: false,
        }))
    }
}

pub fn native_surface() -> SurfaceCapabilities {
    SurfaceCapabilities::default()
}

pub fn buffer_feed_surface() -> SurfaceCapabilities {
    SurfaceCapabilities {
        native_adaptive: false,
        buffer_feed: true,
    }
}

/// Controller wired to scripted collaborators.
pub struct Harness {
    pub controller: PlaybackController<ScriptedSurface>,
    pub events: EventQueue,
    pub timers: Rc<RefCell<VecDeque<TimerToken>>>,
    pub store: Rc<RefCell<InMemoryResourceStore>>,
    pub clients: Rc<RefCell<ClientStats>>,
}

impl Harness {
    pub fn new(capabilities: SurfaceCapabilities) -> Self {
        Self::build(capabilities, PlayerConfig::default(), false, false)
    }

    pub fn with_config(capabilities: SurfaceCapabilities, config: PlayerConfig) -> Self {
        Self::build(capabilities, config, false, false)
    }

    pub fn with_streaming(capabilities: SurfaceCapabilities) -> Self {
        Self::build(capabilities, PlayerConfig::default(), true, false)
    }

    pub fn with_failing_streaming(capabilities: SurfaceCapabilities) -> Self {
        Self::build(capabilities, PlayerConfig::default(), true, true)
    }

    fn build(
        capabilities: SurfaceCapabilities,
        config: PlayerConfig,
        streaming: bool,
        fail_attach: bool,
    ) -> Self {
        let events: EventQueue = Rc::default();
        let timers: Rc<RefCell<VecDeque<TimerToken>>> = Rc::default();
        let store = InMemoryResourceStore::shared();
        let clients: Rc<RefCell<ClientStats>> = Rc::default();

        let surface = ScriptedSurface {
            capabilities,
            position: 0.0,
            playing: false,
            source: None,
            captions: None,
            snap_back_seeks: 0,
            lost_seeks: 0,
            ops: Vec::new(),
            events: Rc::clone(&events),
        };
        let scheduler = ManualScheduler {
            pending: Rc::clone(&timers),
        };
        let resources: SharedResourceStore = store.clone();

        let mut controller =
            PlaybackController::new(surface, resources, Box::new(scheduler), config);
        if streaming {
            controller = controller.with_streaming_client(Box::new(FakeClientFactory {
                stats: Rc::clone(&clients),
                fail_attach,
            }));
        }

        Self {
            controller,
            events,
            timers,
            store,
            clients,
        }
    }

    pub fn surface(&self) -> &ScriptedSurface {
        self.controller.surface()
    }

    /// Queues an event as if the surface had raised it.
    pub fn push(&self, event: PlaybackEvent) {
        self.events.borrow_mut().push_back(event);
    }

    /// Delivers queued events, but no timers. Returns the number delivered.
    pub fn drain_events(&mut self, session: SessionId) -> usize {
        let mut delivered = 0;
        loop {
            let next = self.events.borrow_mut().pop_front();
            let Some(event) = next else {
                return delivered;
            };
            self.controller.handle_event(session, event);
            delivered += 1;
            assert!(delivered <= MAX_STEPS, "event loop did not settle");
        }
    }

    /// Delivers events and timers until both queues are empty.
    ///
    /// Returns the number of steps taken.
    pub fn pump(&mut self, session: SessionId) -> usize {
        let mut steps = 0;
        loop {
            steps += self.drain_events(session);
            let next = self.timers.borrow_mut().pop_front();
            let Some(token) = next else {
                return steps;
            };
            self.controller.on_timer(token);
            steps += 1;
            assert!(steps <= MAX_STEPS, "event loop did not settle");
        }
    }
}
