//! Runtime events for monitoring capture sessions.
//!
//! Events are notifications about session lifecycle and pipeline health.
//! They're for logging/metrics and UI hints, not error handling: fatal
//! problems are returned from [`CaptureManager::start()`].
//!
//! [`CaptureManager::start()`]: crate::CaptureManager::start

use std::sync::Arc;

use crate::VoiceEffect;

/// Why a capture session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `stop()` or `toggle()` was called.
    Requested,
    /// A track of the captured stream ended out of band (sharing revoked,
    /// device unplugged).
    TrackEnded,
    /// The owning manager was dropped while the session was live.
    Dropped,
}

/// Runtime events emitted by a [`CaptureManager`](crate::CaptureManager).
///
/// # Example
///
/// ```
/// use voice_tap::{CaptureEvent, StopReason};
///
/// fn handle_event(event: CaptureEvent) {
///     match event {
///         CaptureEvent::SessionStarted { effect, sample_rate, channels } => {
///             eprintln!("live: {effect} at {sample_rate}Hz/{channels}ch");
///         }
///         CaptureEvent::SessionStopped { reason: StopReason::TrackEnded } => {
///             eprintln!("sharing was stopped from outside");
///         }
///         CaptureEvent::SessionStopped { .. } => {}
///         CaptureEvent::CaptureFailed { error } => eprintln!("failed: {error}"),
///         CaptureEvent::VoiceEffectDeferred { requested, .. } => {
///             eprintln!("restart capture to hear {requested}");
///         }
///         CaptureEvent::BufferOverflow { dropped_frames } => {
///             eprintln!("dropped {dropped_frames} frames");
///         }
///         CaptureEvent::MonitorError { sink_name, error } => {
///             eprintln!("monitor '{sink_name}' error: {error}");
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    /// A session went live.
    SessionStarted {
        /// Effect wired into this session.
        effect: VoiceEffect,
        /// Sample rate of the processing context.
        sample_rate: u32,
        /// Channel count of the captured stream.
        channels: u16,
    },

    /// A session was torn down.
    SessionStopped {
        /// What triggered the teardown.
        reason: StopReason,
    },

    /// `start()` failed. The same message is published as the snapshot error.
    CaptureFailed {
        /// Human readable reason.
        error: String,
    },

    /// The voice effect changed while live; it applies to the next session.
    VoiceEffectDeferred {
        /// Effect still wired into the live graph.
        active: VoiceEffect,
        /// Effect that will be used after a restart.
        requested: VoiceEffect,
    },

    /// The render loop fell behind and the capture ring buffer dropped audio.
    BufferOverflow {
        /// Approximate number of frames that were lost.
        dropped_frames: u64,
    },

    /// The monitor sink failed to accept a block. Rendering continues.
    MonitorError {
        /// Name of the sink that errored.
        sink_name: String,
        /// Description of the error.
        error: String,
    },
}

/// Callback type for receiving runtime events.
///
/// Register one via [`CaptureManagerBuilder::on_event()`].
///
/// [`CaptureManagerBuilder::on_event()`]: crate::CaptureManagerBuilder::on_event
pub type EventCallback = Arc<dyn Fn(CaptureEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use voice_tap::{event_callback, CaptureEvent};
///
/// let callback = event_callback(|event: CaptureEvent| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(CaptureEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Invokes the callback if one is registered.
pub(crate) fn emit(callback: Option<&EventCallback>, event: CaptureEvent) {
    if let Some(callback) = callback {
        callback(event);
    }
}
