//! Playback session integration tests.
//!
//! These drive a [`PlaybackController`] against a scripted surface that
//! completes seeks synchronously, and check the start-offset, recovery and
//! session-lifecycle guarantees end to end.
//!
//! ```bash
//! RUST_LOG=lectern_core=debug cargo test --package lectern-core --test playback_session_test -- --nocapture
//! ```

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{buffer_feed_surface, native_surface, Harness, Op};
use lectern_core::{
    BackendFault, BackendVariant, ErrorClass, ErrorState, LoadingState, MediaKind, MediaSource,
    PlaybackEvent, PlaybackStatus, PlayerConfig, SeekPhase,
};

const LECTURE_MP4: &str = "http://localhost:8000/video/ABC123";
const LECTURE_HLS: &str = "https://cdn.example.com/lectures/ABC123/master.m3u8";

fn network_fault() -> PlaybackEvent {
    PlaybackEvent::Fault(BackendFault::FatalNetwork {
        code: Some("fragLoadError".to_string()),
    })
}

fn decode_fault() -> PlaybackEvent {
    PlaybackEvent::Fault(BackendFault::FatalDecode {
        code: Some("bufferAppendError".to_string()),
    })
}

mod start_offset {
    use super::*;

    /// The surface resets to 0 after the first seek; playback must still
    /// begin near the requested offset, and only after it is confirmed.
    #[test]
    fn test_offset_survives_snap_back() {
        let mut h = Harness::new(native_surface());
        h.controller.surface_mut().snap_back_seeks = 1;

        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);
        assert_eq!(h.controller.status().loading, LoadingState::Loading);
        assert_eq!(h.surface().source.as_deref(), Some(LECTURE_MP4));

        h.push(PlaybackEvent::Ready);
        let steps = h.pump(session);
        assert!(steps < 10, "took {steps} steps");

        let status = h.controller.status();
        assert_eq!(status.seek_phase, SeekPhase::PlaybackAllowed);
        assert_eq!(status.loading, LoadingState::Ready);
        assert!(status.start_applied);
        assert!((41.0..=43.0).contains(&h.surface().position));

        assert_eq!(h.surface().seeks(), vec![42.0, 42.0]);
        assert!(h.surface().playing);
        assert!(h.surface().played_after_last_seek());
    }

    #[test]
    fn test_drift_after_confirmation_is_corrected() {
        let mut h = Harness::new(native_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);

        h.push(PlaybackEvent::Ready);
        h.drain_events(session);
        assert_eq!(h.controller.status().seek_phase, SeekPhase::SeekConfirmed);
        // Seek timeout plus the re-check
        assert_eq!(h.timers.borrow().len(), 2);

        // Buffering reset the position before the re-check fired
        h.controller.surface_mut().position = 0.0;
        h.pump(session);

        let status = h.controller.status();
        assert_eq!(status.seek_phase, SeekPhase::PlaybackAllowed);
        assert!(status.start_applied);
        assert_eq!(h.surface().seeks().len(), 2);
        assert!(h.surface().played_after_last_seek());
    }

    #[test]
    fn test_play_before_confirmation_is_intercepted() {
        let mut h = Harness::new(native_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);

        // The user presses play while the surface is still buffering
        h.controller.request_play();
        assert!(!h.surface().playing);
        assert_eq!(h.surface().count(&Op::Play), 0);

        // The surface autoplays on its own right after becoming ready
        h.push(PlaybackEvent::Ready);
        h.push(PlaybackEvent::PlayRequested);
        h.pump(session);

        let status = h.controller.status();
        assert_eq!(status.seek_phase, SeekPhase::PlaybackAllowed);
        assert!(status.start_applied);
        assert!(h.surface().playing);
        assert!(h.surface().played_after_last_seek());
        assert!((41.0..=43.0).contains(&h.surface().position));
    }

    #[test]
    fn test_unreachable_offset_gives_up_after_retries() {
        let mut h = Harness::new(native_surface());
        h.controller.surface_mut().snap_back_seeks = usize::MAX;
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);

        h.push(PlaybackEvent::Ready);
        h.pump(session);

        let status = h.controller.status();
        assert_eq!(status.seek_phase, SeekPhase::PlaybackAllowed);
        assert_eq!(status.loading, LoadingState::Ready);
        assert!(!status.start_applied);
        // Initial seek plus the retry budget
        assert_eq!(h.surface().seeks().len(), 4);
        assert!(h.surface().playing);
    }

    #[test]
    fn test_lost_seek_completion_is_retried() {
        let mut h = Harness::new(native_surface());
        h.controller.surface_mut().lost_seeks = 1;
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);

        h.push(PlaybackEvent::Ready);
        h.drain_events(session);
        assert_eq!(h.controller.status().seek_phase, SeekPhase::SeekRequested);
        assert_eq!(h.timers.borrow().len(), 1);

        h.pump(session);
        let status = h.controller.status();
        assert_eq!(status.seek_phase, SeekPhase::PlaybackAllowed);
        assert_eq!(status.loading, LoadingState::Ready);
        assert!(status.start_applied);
        assert_eq!(h.surface().seeks(), vec![42.0, 42.0]);
        assert!(h.surface().played_after_last_seek());
    }

    #[test]
    fn test_unanswered_seeks_end_in_playback() {
        let mut h = Harness::new(native_surface());
        h.controller.surface_mut().lost_seeks = usize::MAX;
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);

        h.push(PlaybackEvent::Ready);
        h.pump(session);

        let status = h.controller.status();
        assert_eq!(status.seek_phase, SeekPhase::PlaybackAllowed);
        assert_eq!(status.loading, LoadingState::Ready);
        assert!(!status.start_applied);
        assert_eq!(h.surface().seeks().len(), 4);
        assert!(h.surface().playing);
        assert!(h.timers.borrow().is_empty());
    }

    #[test]
    fn test_zero_offset_plays_on_ready() {
        let mut h = Harness::new(native_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 0.0, None);

        h.push(PlaybackEvent::Ready);
        h.pump(session);

        assert!(h.surface().seeks().is_empty());
        assert_eq!(h.surface().count(&Op::Play), 1);
        assert_eq!(h.controller.status().loading, LoadingState::Ready);
    }

    #[test]
    fn test_no_autoplay_waits_for_request() {
        let config = PlayerConfig {
            autoplay: false,
            ..PlayerConfig::default()
        };
        let mut h = Harness::with_config(native_surface(), config);
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);

        h.push(PlaybackEvent::Ready);
        h.pump(session);
        assert_eq!(h.controller.status().loading, LoadingState::Ready);
        assert!(!h.surface().playing);

        h.controller.request_play();
        assert!(h.surface().playing);
    }

    #[test]
    fn test_set_start_offset_reseeks() {
        let mut h = Harness::new(native_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);
        h.push(PlaybackEvent::Ready);
        h.pump(session);

        // Same offset: nothing happens
        h.controller.set_start_offset(42.0);
        assert_eq!(h.surface().seeks().len(), 1);

        h.controller.set_start_offset(600.0);
        let status = h.controller.status();
        assert_eq!(status.loading, LoadingState::Loading);
        assert!(!status.start_applied);
        assert_eq!(status.start_offset, 600.0);

        h.pump(session);
        let status = h.controller.status();
        assert!(status.start_applied);
        assert_eq!(h.surface().seeks(), vec![42.0, 600.0]);
        assert_eq!(h.surface().position, 600.0);
    }

    #[test]
    fn test_hosted_embed_carries_offset_in_url() {
        let mut h = Harness::new(native_surface());
        let source = MediaSource::from_locator("https://www.youtube.com/watch?v=abc123");
        assert_eq!(source.kind(), MediaKind::HostedEmbed);

        let session = h.controller.mount(source, 90.0, None);
        let embedded = h.surface().source.clone().unwrap_or_default();
        assert!(embedded.starts_with("https://www.youtube.com/embed/abc123?"));
        assert!(embedded.contains("start=90"));

        h.push(PlaybackEvent::Ready);
        h.pump(session);
        assert!(h.surface().seeks().is_empty());
        assert!(h.controller.status().start_applied);
        assert!(h.surface().playing);
    }

    #[test]
    fn test_hosted_embed_offset_change_remounts() {
        let mut h = Harness::new(native_surface());
        let source = MediaSource::from_locator("https://youtu.be/abc123");
        let first = h.controller.mount(source, 10.0, None);

        h.controller.set_start_offset(75.0);
        let second = h.controller.session_id().unwrap();
        assert_ne!(first, second);
        assert!(h.surface().source.as_deref().unwrap_or_default().contains("start=75"));
    }
}

mod recovery {
    use super::*;

    #[test]
    fn test_network_fault_reloads_once_then_fails() {
        let mut h = Harness::with_streaming(buffer_feed_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_HLS), 0.0, None);
        assert_eq!(h.controller.status().backend, Some(BackendVariant::Library));
        assert_eq!(h.clients.borrow().attached, vec![LECTURE_HLS.to_string()]);

        h.push(PlaybackEvent::Ready);
        h.pump(session);
        h.controller.surface_mut().position = 30.0;

        h.push(network_fault());
        h.pump(session);
        assert_eq!(h.clients.borrow().start_loads, vec![30.0]);
        assert_eq!(
            h.controller.status().error,
            ErrorState::Recoverable(ErrorClass::Network)
        );

        h.push(network_fault());
        h.pump(session);
        assert_eq!(h.clients.borrow().start_loads.len(), 1);
        let status = h.controller.status();
        assert!(matches!(
            status.error,
            ErrorState::Terminal {
                class: ErrorClass::Network,
                ..
            }
        ));
        assert!(!h.surface().playing);

        // Nothing restarts a failed session
        h.controller.request_play();
        assert!(!h.surface().playing);
    }

    #[test]
    fn test_network_recovery_clears_error() {
        let mut h = Harness::with_streaming(buffer_feed_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_HLS), 0.0, None);
        h.push(PlaybackEvent::Ready);
        h.pump(session);

        h.push(network_fault());
        h.push(PlaybackEvent::TimeUpdate);
        h.pump(session);
        assert_eq!(h.controller.status().error, ErrorState::None);

        // A later, unrelated fault gets a fresh attempt
        h.push(network_fault());
        h.pump(session);
        assert_eq!(h.clients.borrow().start_loads.len(), 2);
        assert!(!h.controller.status().error.is_terminal());
    }

    #[test]
    fn test_native_network_recovery_resumes_playback() {
        let mut h = Harness::new(native_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 0.0, None);
        h.push(PlaybackEvent::Ready);
        h.pump(session);
        assert!(h.surface().playing);
        h.controller.surface_mut().position = 30.0;

        h.push(network_fault());
        h.pump(session);
        assert_eq!(
            h.surface().ops_since_last_source(),
            &[Op::SetSource(LECTURE_MP4.to_string()), Op::Seek(30.0)]
        );
        assert!(!h.surface().playing);

        h.push(PlaybackEvent::Ready);
        h.pump(session);
        assert_eq!(
            h.surface().ops_since_last_source(),
            &[
                Op::SetSource(LECTURE_MP4.to_string()),
                Op::Seek(30.0),
                Op::Play
            ]
        );
        assert!(h.surface().playing);
        assert_eq!(h.controller.status().error, ErrorState::None);
    }

    #[test]
    fn test_native_network_recovery_keeps_paused_surface_paused() {
        let config = PlayerConfig {
            autoplay: false,
            ..PlayerConfig::default()
        };
        let mut h = Harness::with_config(native_surface(), config);
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 0.0, None);
        h.push(PlaybackEvent::Ready);
        h.pump(session);
        assert!(!h.surface().playing);

        h.push(network_fault());
        h.push(PlaybackEvent::Ready);
        h.pump(session);
        assert_eq!(h.surface().count(&Op::Play), 0);
        assert_eq!(
            h.surface().count(&Op::SetSource(LECTURE_MP4.to_string())),
            2
        );
    }

    #[test]
    fn test_decode_fault_on_library_backend() {
        let mut h = Harness::with_streaming(buffer_feed_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_HLS), 0.0, None);
        h.push(PlaybackEvent::Ready);
        h.push(decode_fault());
        h.pump(session);

        assert_eq!(h.clients.borrow().media_recoveries, 1);
        assert_eq!(
            h.controller.status().error,
            ErrorState::Recoverable(ErrorClass::MediaDecode)
        );
    }

    #[test]
    fn test_decode_fault_on_native_backend() {
        let mut h = Harness::new(native_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 0.0, None);
        h.push(PlaybackEvent::Ready);
        h.push(decode_fault());
        h.pump(session);
        assert_eq!(h.surface().count(&Op::Reload), 1);

        h.push(decode_fault());
        h.pump(session);
        assert_eq!(h.surface().count(&Op::Reload), 1);
        assert!(h.controller.status().error.is_terminal());
    }

    #[test]
    fn test_non_fatal_fault_is_ignored() {
        let mut h = Harness::new(native_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 0.0, None);
        h.push(PlaybackEvent::Ready);
        h.push(PlaybackEvent::Fault(BackendFault::NonFatal {
            code: Some("bufferStalledError".to_string()),
        }));
        h.pump(session);

        assert_eq!(h.controller.status().error, ErrorState::None);
        assert!(h.surface().playing);
    }

    #[test]
    fn test_unclassified_fault_is_terminal() {
        let mut h = Harness::new(native_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 0.0, None);
        h.push(PlaybackEvent::Ready);
        h.push(PlaybackEvent::Fault(BackendFault::Fatal { code: None }));
        h.pump(session);

        assert_eq!(h.surface().count(&Op::Reload), 0);
        assert!(matches!(
            h.controller.status().error,
            ErrorState::Terminal {
                class: ErrorClass::Unknown,
                ..
            }
        ));
    }
}

mod lifecycle {
    use super::*;

    #[test]
    fn test_unsupported_source() {
        let mut h = Harness::new(native_surface());
        let session = h.controller.mount(MediaSource::from_locator(LECTURE_HLS), 0.0, None);

        let status = h.controller.status();
        assert_eq!(status.loading, LoadingState::Ready);
        assert!(!h.controller.status_handle().is_loading());
        assert_eq!(status.backend, None);
        assert!(matches!(
            status.error,
            ErrorState::Terminal {
                class: ErrorClass::Unsupported,
                ..
            }
        ));
        assert!(h.surface().source.is_none());

        h.push(PlaybackEvent::TimeUpdate);
        h.pump(session);
        assert_eq!(h.controller.status().loading, LoadingState::Ready);
    }

    #[test]
    fn test_buffer_feed_without_client_is_unsupported() {
        let mut h = Harness::new(buffer_feed_surface());
        h.controller.mount(MediaSource::from_locator(LECTURE_HLS), 0.0, None);
        assert!(matches!(
            h.controller.status().error,
            ErrorState::Terminal {
                class: ErrorClass::Unsupported,
                ..
            }
        ));
    }

    #[test]
    fn test_native_adaptive_preferred() {
        let mut h = Harness::with_streaming(lectern_core::SurfaceCapabilities {
            native_adaptive: true,
            buffer_feed: true,
        });
        h.controller.mount(MediaSource::from_locator(LECTURE_HLS), 0.0, None);
        assert_eq!(h.controller.status().backend, Some(BackendVariant::Native));
        assert_eq!(h.clients.borrow().created, 0);
        assert_eq!(h.surface().source.as_deref(), Some(LECTURE_HLS));
    }

    #[test]
    fn test_client_attach_failure_releases_client() {
        let mut h = Harness::with_failing_streaming(buffer_feed_surface());
        h.controller.mount(MediaSource::from_locator(LECTURE_HLS), 0.0, None);

        assert!(h.controller.status().error.is_terminal());
        assert_eq!(h.clients.borrow().created, 1);
        assert_eq!(h.clients.borrow().live(), 0);
    }

    #[test]
    fn test_remount_keeps_one_live_client() {
        let mut h = Harness::with_streaming(buffer_feed_surface());
        let first = h.controller.mount(MediaSource::from_locator(LECTURE_HLS), 0.0, None);
        let second = h.controller.mount(MediaSource::from_locator(LECTURE_HLS), 30.0, None);
        assert_ne!(first, second);
        assert_eq!(h.clients.borrow().created, 2);
        assert_eq!(h.clients.borrow().live(), 1);

        // Late readiness from the first session must not drive the second
        h.controller.handle_event(first, PlaybackEvent::Ready);
        assert_eq!(h.controller.status().seek_phase, SeekPhase::AwaitingReady);
        assert!(h.surface().seeks().is_empty());

        h.controller.handle_event(second, PlaybackEvent::Ready);
        assert_eq!(h.surface().seeks(), vec![30.0]);

        h.controller.unmount();
        assert_eq!(h.clients.borrow().live(), 0);
    }

    #[test]
    fn test_stale_timer_is_ignored() {
        let mut h = Harness::new(native_surface());
        let first = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);
        h.push(PlaybackEvent::Ready);
        h.drain_events(first);
        let stale = h.timers.borrow_mut().pop_back().unwrap();

        let second = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);
        h.push(PlaybackEvent::Ready);
        h.drain_events(second);
        assert_eq!(h.controller.status().seek_phase, SeekPhase::SeekConfirmed);

        h.controller.on_timer(stale);
        assert_eq!(h.controller.status().seek_phase, SeekPhase::SeekConfirmed);
        assert!(!h.surface().playing);

        h.pump(second);
        assert_eq!(h.controller.status().seek_phase, SeekPhase::PlaybackAllowed);
    }

    #[test]
    fn test_unmount_is_idempotent() {
        let mut h = Harness::new(native_surface());
        h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 0.0, None);

        h.controller.unmount();
        h.controller.unmount();
        assert_eq!(h.controller.status(), PlaybackStatus::default());
        assert_eq!(h.controller.session_id(), None);
        assert_eq!(h.surface().count(&Op::ClearSource), 1);
        assert!(h.surface().source.is_none());
    }

    #[test]
    fn test_status_listener_and_handle() {
        let mut h = Harness::new(native_surface());
        let seen: Rc<RefCell<Vec<PlaybackStatus>>> = Rc::default();
        let sink = Rc::clone(&seen);
        h.controller
            .set_listener(move |status| sink.borrow_mut().push(status.clone()));
        let handle = h.controller.status_handle();

        let session = h.controller.mount(MediaSource::from_locator(LECTURE_MP4), 42.0, None);
        assert_eq!(handle.get().session, Some(session));
        assert!(handle.is_loading());

        h.push(PlaybackEvent::Ready);
        h.pump(session);
        assert!(!handle.is_loading());
        assert_eq!(handle.get(), h.controller.status());

        let seen = seen.borrow();
        assert!(seen.len() >= 3);
        assert_eq!(seen.first().map(|s| s.seek_phase), Some(SeekPhase::AwaitingReady));
        assert_eq!(
            seen.last().map(|s| s.seek_phase),
            Some(SeekPhase::PlaybackAllowed)
        );
        // Only changes are reported
        assert!(seen.windows(2).all(|pair| pair[0] != pair[1]));
    }
}
