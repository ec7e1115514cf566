//! lectern demo
//!
//! Runs one playback session headless against a simulated media surface that
//! resets to the beginning after the first seek, and logs every transition.
//!
//! ```bash
//! cargo run -p lectern-demo -- [locator] [start-offset] [captions.vtt]
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use lectern_core::subtitles::{self, SubtitleCue, SubtitleTrack};
use lectern_core::{
    InMemoryResourceStore, MediaSource, MediaSurface, PlaybackController, PlaybackEvent,
    PlayerConfig, ResourceUrl, Scheduler, SessionId, SharedResourceStore, StreamingClient,
    StreamingClientFactory, SurfaceCapabilities, TimerToken, VideoError,
};

const DEFAULT_LOCATOR: &str = "http://localhost:8000/video/DEMO01";
const DEFAULT_START_OFFSET: f64 = 42.0;
const PLAYBACK_TICKS: usize = 5;
const MAX_STEPS: usize = 200;

type Events = Rc<RefCell<VecDeque<PlaybackEvent>>>;

/// Media element stand-in. The first seek lands at 0, as a buffering
/// surface would.
struct SimulatedSurface {
    events: Events,
    position: f64,
    playing: bool,
    snapped_back: bool,
}

impl MediaSurface for SimulatedSurface {
    fn capabilities(&self) -> SurfaceCapabilities {
        SurfaceCapabilities {
            native_adaptive: false,
            buffer_feed: true,
        }
    }

    fn set_source(&mut self, locator: &str) {
        tracing::info!("surface: source = {locator}");
        self.position = 0.0;
        self.playing = false;
        self.events.borrow_mut().push_back(PlaybackEvent::Ready);
    }

    fn clear_source(&mut self) {
        tracing::info!("surface: source cleared");
        self.playing = false;
    }

    fn reload(&mut self) {
        tracing::info!("surface: reload");
    }

    fn play(&mut self) {
        tracing::info!("surface: play at {:.2}s", self.position);
        self.playing = true;
    }

    fn pause(&mut self) {
        tracing::debug!("surface: pause");
        self.playing = false;
    }

    fn is_playing(&self) -> bool {
        self.playing
    }

    fn seek(&mut self, position: f64) {
        if self.snapped_back {
            self.position = position;
        } else {
            self.snapped_back = true;
            self.position = 0.0;
            tracing::info!("surface: seek to {position:.2}s snapped back to 0");
        }
        self.events.borrow_mut().push_back(PlaybackEvent::Seeked);
    }

    fn position(&self) -> f64 {
        self.position
    }

    fn attach_captions(&mut self, url: &ResourceUrl, language: &str) {
        tracing::info!("surface: captions {url} ({language})");
    }

    fn detach_captions(&mut self) {
        tracing::info!("surface: captions detached");
    }
}

/// Streaming client stand-in for manifests.
struct SimulatedClient {
    events: Events,
}

impl StreamingClient for SimulatedClient {
    fn attach(&mut self, locator: &str, _surface: &mut dyn MediaSurface) -> Result<(), VideoError> {
        tracing::info!("client: manifest {locator} parsed");
        self.events.borrow_mut().push_back(PlaybackEvent::Ready);
        Ok(())
    }

    fn start_load(&mut self, position: f64) {
        tracing::info!("client: start load at {position:.2}s");
    }

    fn recover_media_error(&mut self) {
        tracing::info!("client: recover media error");
    }

    fn destroy(&mut self) {
        tracing::info!("client: destroyed");
    }
}

struct SimulatedClientFactory {
    events: Events,
}

impl StreamingClientFactory for SimulatedClientFactory {
    fn create(&mut self, session: SessionId) -> Result<Box<dyn StreamingClient>, VideoError> {
        tracing::debug!("client: created for session {session}");
        Ok(Box::new(SimulatedClient {
            events: Rc::clone(&self.events),
        }))
    }
}

struct QueuedScheduler {
    timers: Rc<RefCell<VecDeque<TimerToken>>>,
}

impl Scheduler for QueuedScheduler {
    fn schedule(&mut self, delay: Duration, token: TimerToken) {
        tracing::trace!("timer: {token:?} in {delay:?}");
        self.timers.borrow_mut().push_back(token);
    }
}

fn load_track(path: Option<&str>) -> SubtitleTrack {
    let Some(path) = path else {
        return SubtitleTrack::from_cues(vec![
            SubtitleCue::new(40.0, 44.0, "Bienvenidos a la clase de redes"),
            SubtitleCue::new(44.0, 48.0, "Hoy veremos direccionamiento IP"),
        ]);
    };
    match std::fs::read_to_string(path) {
        Ok(text) => subtitles::parse(&text),
        Err(e) => {
            tracing::warn!("Could not read {path}: {e}");
            SubtitleTrack::new()
        }
    }
}

fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        tracing_subscriber::EnvFilter::new("lectern_core=debug,lectern_demo=debug")
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let locator = args.first().map(String::as_str).unwrap_or(DEFAULT_LOCATOR);
    let start_offset = match args.get(1) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(offset) => offset,
            Err(e) => {
                eprintln!("invalid start offset {raw:?}: {e}");
                return ExitCode::FAILURE;
            }
        },
        None => DEFAULT_START_OFFSET,
    };
    let track = load_track(args.get(2).map(String::as_str));

    println!("Caption track: {} cues", track.len());
    for cue in &track.cues {
        println!("  [{:>8.3} - {:>8.3}] {}", cue.start, cue.end, cue.text);
    }

    let events: Events = Rc::default();
    let timers: Rc<RefCell<VecDeque<TimerToken>>> = Rc::default();
    let surface = SimulatedSurface {
        events: Rc::clone(&events),
        position: 0.0,
        playing: false,
        snapped_back: false,
    };
    let resources: SharedResourceStore = InMemoryResourceStore::shared();
    let scheduler = QueuedScheduler {
        timers: Rc::clone(&timers),
    };

    let mut controller = PlaybackController::new(
        surface,
        resources,
        Box::new(scheduler),
        PlayerConfig::from_env(),
    )
    .with_streaming_client(Box::new(SimulatedClientFactory {
        events: Rc::clone(&events),
    }));
    controller.set_listener(|status| {
        tracing::info!(
            "status: {:?} {:?} phase={:?} position={:.2}s cue={:?}",
            status.loading,
            status.error,
            status.seek_phase,
            status.position,
            status.active_cue
        );
    });

    let source = MediaSource::from_locator(locator);
    let session = controller.mount(source, start_offset, Some(track));

    let mut ticks = 0;
    for _ in 0..MAX_STEPS {
        let next_event = events.borrow_mut().pop_front();
        if let Some(event) = next_event {
            controller.handle_event(session, event);
            continue;
        }
        let next_timer = timers.borrow_mut().pop_front();
        if let Some(token) = next_timer {
            controller.on_timer(token);
            continue;
        }
        if controller.surface().playing && ticks < PLAYBACK_TICKS {
            ticks += 1;
            controller.surface_mut().position += 1.0;
            events.borrow_mut().push_back(PlaybackEvent::TimeUpdate);
            continue;
        }
        break;
    }

    let status = controller.status();
    controller.unmount();

    println!(
        "Session {session}: {:?}, start offset {:.1}s {}, final position {:.2}s",
        status.loading,
        status.start_offset,
        if status.start_applied { "applied" } else { "not applied" },
        status.position
    );
    match status.error.message() {
        Some(message) => {
            println!("Error: {message}");
            ExitCode::FAILURE
        }
        None => ExitCode::SUCCESS,
    }
}
