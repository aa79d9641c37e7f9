//! Integration tests for voice-tap.
//!
//! Everything here runs against `MockHost`. Tests that require actual audio
//! hardware live next to the cpal code and are marked with `#[ignore]`.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use voice_tap::graph::NodeKind;
use voice_tap::host::{MockHost, TrackKind};
use voice_tap::{
    AudioBlock, CaptureError, CaptureEvent, CaptureManager, CaptureStatus, ChannelSink,
    StopReason, VoiceEffect,
};

/// Collects every event the manager emits.
#[derive(Clone, Default)]
struct EventLog(Arc<Mutex<Vec<CaptureEvent>>>);

impl EventLog {
    fn count(&self, predicate: impl Fn(&CaptureEvent) -> bool) -> usize {
        self.0.lock().iter().filter(|e| predicate(e)).count()
    }
}

fn manager_with_log(host: MockHost) -> (CaptureManager, EventLog) {
    let log = EventLog::default();
    let sink = log.clone();
    let manager = CaptureManager::builder()
        .host(host)
        .on_event(move |e| sink.0.lock().push(e))
        .build()
        .unwrap();
    (manager, log)
}

#[tokio::test]
async fn test_stop_when_idle_is_noop() {
    let (manager, log) = manager_with_log(MockHost::new());

    manager.stop();
    manager.stop();

    assert_eq!(manager.status(), CaptureStatus::Idle);
    assert_eq!(manager.volume(), 0.0);
    assert!(!manager.is_live());
    assert_eq!(log.count(|_| true), 0);
}

#[tokio::test]
async fn test_start_goes_live() {
    let host = MockHost::new();
    let (manager, log) = manager_with_log(host.clone());
    let rx = manager.subscribe();

    manager.start().await.unwrap();

    assert_eq!(manager.status(), CaptureStatus::Live);
    assert!(rx.borrow().is_live);
    assert_eq!(manager.error(), None);
    assert_eq!(host.last_stream().unwrap().live_track_count(), 2);
    assert_eq!(
        log.count(|e| matches!(
            e,
            CaptureEvent::SessionStarted {
                effect: VoiceEffect::Natural,
                sample_rate: 48000,
                channels: 2
            }
        )),
        1
    );
}

#[tokio::test]
async fn test_start_then_stop_releases_everything() {
    let host = MockHost::new();
    let (manager, log) = manager_with_log(host.clone());
    manager.start().await.unwrap();
    let stream = host.last_stream().unwrap();

    stream.push_noise(0.3, 200);
    tokio::time::sleep(Duration::from_millis(80)).await;
    manager.stop();

    assert_eq!(stream.live_track_count(), 0);
    assert_eq!(manager.status(), CaptureStatus::Idle);
    assert_eq!(manager.volume(), 0.0);
    assert_eq!(manager.active_effect(), None);

    // No publication once stop() has returned, even with audio still arriving
    let mut rx = manager.subscribe();
    rx.borrow_and_update();
    stream.push_noise(0.3, 200);
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert!(!rx.has_changed().unwrap());
    assert_eq!(manager.volume(), 0.0);

    manager.stop();
    assert_eq!(
        log.count(|e| matches!(
            e,
            CaptureEvent::SessionStopped {
                reason: StopReason::Requested
            }
        )),
        1
    );
}

#[tokio::test]
async fn test_no_audio_track_fails_and_stops_tracks() {
    let host = MockHost::new().without_audio();
    let (manager, log) = manager_with_log(host.clone());

    let result = manager.start().await;

    assert!(matches!(result, Err(CaptureError::NoAudioTrack)));
    assert!(!manager.is_live());
    assert!(matches!(manager.status(), CaptureStatus::Failed(_)));
    let error = manager.error().unwrap();
    assert!(!error.is_empty());
    assert!(error.contains("Share audio"));
    assert_eq!(host.last_stream().unwrap().live_track_count(), 0);
    assert_eq!(log.count(|e| matches!(e, CaptureEvent::CaptureFailed { .. })), 1);
}

#[tokio::test]
async fn test_permission_denied() {
    let (manager, _log) = manager_with_log(MockHost::new().deny_permission());

    let result = manager.start().await;

    assert!(matches!(result, Err(CaptureError::PermissionDenied)));
    assert!(result.unwrap_err().is_user_actionable());
    assert!(matches!(manager.status(), CaptureStatus::Failed(_)));
}

#[tokio::test]
async fn test_stop_keeps_last_error() {
    let host = MockHost::new().deny_permission();
    let (manager, _log) = manager_with_log(host);
    assert!(manager.start().await.is_err());
    assert!(manager.error().is_some());

    // stop() keeps the error, so the status stays Failed
    manager.stop();
    assert!(manager.error().is_some());
    assert!(matches!(manager.status(), CaptureStatus::Failed(_)));
    assert!(!manager.is_live());
}

#[tokio::test]
async fn test_monitor_failure_is_graph_error() {
    let host = MockHost::new().fail_monitor();
    let (manager, _log) = manager_with_log(host.clone());

    let result = manager.start().await;

    assert!(matches!(result, Err(CaptureError::GraphConstruction { .. })));
    assert!(!manager.is_live());
    assert_eq!(host.last_stream().unwrap().live_track_count(), 0);
}

#[tokio::test]
async fn test_concurrent_start_is_rejected() {
    let host = MockHost::new().with_acquire_delay(Duration::from_millis(100));
    let (manager, _log) = manager_with_log(host.clone());

    let first = tokio::spawn({
        let manager = manager.clone();
        async move { manager.start().await }
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    let second = manager.start().await;

    assert!(matches!(second, Err(CaptureError::AcquisitionInProgress)));
    // The rejected call leaves the snapshot alone
    assert_eq!(manager.error(), None);

    first.await.unwrap().unwrap();
    assert!(manager.is_live());
    assert_eq!(host.request_count(), 1);
}

#[tokio::test]
async fn test_track_end_tears_down_exactly_once() {
    let host = MockHost::new();
    let (manager, log) = manager_with_log(host.clone());
    manager.start().await.unwrap();
    let stream = host.last_stream().unwrap();

    // Revoking sharing ends the video track first, then the audio track
    assert!(stream.end_track(TrackKind::Video));
    stream.end_track(TrackKind::Audio);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert!(!manager.is_live());
    assert_eq!(manager.status(), CaptureStatus::Idle);
    assert_eq!(stream.live_track_count(), 0);
    assert_eq!(
        log.count(|e| matches!(
            e,
            CaptureEvent::SessionStopped {
                reason: StopReason::TrackEnded
            }
        )),
        1
    );

    manager.stop();
    assert_eq!(log.count(|e| matches!(e, CaptureEvent::SessionStopped { .. })), 1);
}

#[tokio::test]
async fn test_volume_follows_audio() {
    let host = MockHost::new();
    let (manager, _log) = manager_with_log(host.clone());
    manager.start().await.unwrap();
    let stream = host.last_stream().unwrap();

    stream.push_silence(100);
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(manager.volume(), 0.0);

    stream.push_sine(440.0, 0.5, 300);
    tokio::time::sleep(Duration::from_millis(80)).await;
    let volume = manager.volume();
    assert!(volume > 0.0, "volume was {volume}");
    assert!(volume <= 1.0);
}

#[tokio::test]
async fn test_voice_effect_change_is_deferred_while_live() {
    let host = MockHost::new();
    let (manager, log) = manager_with_log(host);
    manager.start().await.unwrap();

    manager.set_voice_effect(VoiceEffect::Radio);

    assert_eq!(manager.voice_effect(), VoiceEffect::Radio);
    assert_eq!(manager.active_effect(), Some(VoiceEffect::Natural));
    assert_eq!(
        log.count(|e| matches!(
            e,
            CaptureEvent::VoiceEffectDeferred {
                active: VoiceEffect::Natural,
                requested: VoiceEffect::Radio
            }
        )),
        1
    );

    manager.stop();
    manager.start().await.unwrap();
    assert_eq!(manager.active_effect(), Some(VoiceEffect::Radio));
}

#[tokio::test]
async fn test_live_chain_is_linear_for_every_effect() {
    for effect in VoiceEffect::ALL {
        let manager = CaptureManager::builder()
            .host(MockHost::new())
            .voice_effect(effect)
            .build()
            .unwrap();
        manager.start().await.unwrap();

        let chain = manager.signal_chain().unwrap();
        assert_eq!(chain.first(), Some(&NodeKind::Source));
        assert_eq!(
            &chain[chain.len() - 3..],
            &[NodeKind::Analyser, NodeKind::Gain, NodeKind::Destination]
        );
        assert_eq!(chain.len(), effect.stages().len() + 4, "{effect}");

        manager.stop();
        assert_eq!(manager.signal_chain(), None);
    }
}

#[tokio::test]
async fn test_toggle() {
    let host = MockHost::new();
    let (manager, _log) = manager_with_log(host.clone());

    manager.toggle().await.unwrap();
    assert!(manager.is_live());

    manager.toggle().await.unwrap();
    assert!(!manager.is_live());
    assert_eq!(host.last_stream().unwrap().live_track_count(), 0);
}

#[tokio::test]
async fn test_monitor_hears_processed_audio() {
    let (tx, mut rx) = mpsc::channel::<AudioBlock>(4096);
    let host = MockHost::new().with_monitor(ChannelSink::new(tx));
    let manager = CaptureManager::builder()
        .host(host.clone())
        .voice_effect(VoiceEffect::Deep)
        .build()
        .unwrap();
    manager.start().await.unwrap();

    host.last_stream().unwrap().push_sine(220.0, 0.5, 100);
    let block = tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(block.sample_rate, 48000);
    assert_eq!(block.channel_count(), 2);
    assert_eq!(block.frames(), 128);
}

#[tokio::test]
async fn test_drop_stops_live_session() {
    let host = MockHost::new();
    let (manager, log) = manager_with_log(host.clone());
    manager.start().await.unwrap();
    let stream = host.last_stream().unwrap();

    drop(manager);

    assert_eq!(stream.live_track_count(), 0);
    assert_eq!(
        log.count(|e| matches!(
            e,
            CaptureEvent::SessionStopped {
                reason: StopReason::Dropped
            }
        )),
        1
    );
}
