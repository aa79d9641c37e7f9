//! Capture hosts: where media streams come from.
//!
//! A [`CaptureHost`] hands out [`MediaStream`]s on request, the way a
//! browser's display-capture picker would. The stream's audio track carries
//! a [`CaptureBuffer`] the graph reads from; every track can end out of band
//! and reports it through its [`TrackState`].
//!
//! - [`CpalHost`]: real devices through CPAL
//! - [`MockHost`]: synthetic streams for tests and CI

mod device;
mod mock;

pub use device::{CpalHost, DeviceSelection};
pub(crate) use device::DeviceWorker;
pub use mock::{MockHost, MockStreamHandle};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait};
use tokio::sync::watch;

use crate::pipeline::CaptureBuffer;
use crate::sink::{DiscardSink, Sink};
use crate::CaptureError;

/// Sample rate and channel count of a captured stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Interleaved channel count.
    pub channels: u16,
}

impl std::fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}Hz/{}ch", self.sample_rate, self.channels)
    }
}

/// Smallest ring buffer a host allocates, in frames.
const MIN_BUFFER_FRAMES: usize = 1024;

/// What a capture request asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamRequest {
    /// Ask for an audio track.
    pub audio: bool,
    /// Ask for a video track.
    pub video: bool,
    /// How much audio the capture ring buffer should hold.
    pub buffer_duration: Duration,
}

impl StreamRequest {
    /// Audio plus video, as a display-capture picker requires.
    ///
    /// Hosts are free to return a stream without audio if the user did not
    /// opt into sharing it.
    pub fn display_capture() -> Self {
        Self {
            audio: true,
            video: true,
            buffer_duration: Duration::from_secs(2),
        }
    }

    /// Ring buffer capacity in samples for a stream of `format`.
    pub fn buffer_capacity(&self, format: StreamFormat) -> usize {
        let frames =
            (f64::from(format.sample_rate) * self.buffer_duration.as_secs_f64()) as usize;
        frames.max(MIN_BUFFER_FRAMES) * usize::from(format.channels.max(1))
    }
}

impl Default for StreamRequest {
    fn default() -> Self {
        Self::display_capture()
    }
}

/// Kind of media a track carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    /// Audio samples.
    Audio,
    /// Video frames. Never processed here, only stopped.
    Video,
}

/// Shared "has this track ended" flag.
///
/// Cloned into device callbacks and watcher tasks; ending is one-way.
#[derive(Debug, Clone)]
pub struct TrackState {
    ended: Arc<watch::Sender<bool>>,
}

impl TrackState {
    /// Creates a live track state.
    pub fn new() -> Self {
        let (ended, _) = watch::channel(false);
        Self {
            ended: Arc::new(ended),
        }
    }

    /// Returns `true` until the track ends.
    pub fn is_live(&self) -> bool {
        !*self.ended.borrow()
    }

    /// Marks the track ended. Returns `true` only for the call that ended it.
    pub fn end(&self) -> bool {
        self.ended.send_if_modified(|ended| !std::mem::replace(ended, true))
    }

    /// Resolves once the track has ended.
    pub async fn ended(&self) {
        let mut rx = self.ended.subscribe();
        while !*rx.borrow_and_update() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }
}

impl Default for TrackState {
    fn default() -> Self {
        Self::new()
    }
}

/// Releases whatever produces a track's media.
pub trait TrackDriver: Send {
    /// Stops producing. Called at most once.
    fn stop(&mut self);
}

/// One track of a [`MediaStream`].
///
/// Dropping a track stops it.
pub struct MediaTrack {
    kind: TrackKind,
    label: String,
    state: TrackState,
    input: Option<CaptureBuffer>,
    format: Option<StreamFormat>,
    driver: Option<Box<dyn TrackDriver>>,
}

impl std::fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaTrack")
            .field("kind", &self.kind)
            .field("label", &self.label)
            .field("live", &self.is_live())
            .field("format", &self.format)
            .finish_non_exhaustive()
    }
}

impl MediaTrack {
    /// Creates an audio track reading from `input`.
    pub fn audio(label: impl Into<String>, input: CaptureBuffer) -> Self {
        let format = input.format();
        Self {
            kind: TrackKind::Audio,
            label: label.into(),
            state: TrackState::new(),
            input: Some(input),
            format: Some(format),
            driver: None,
        }
    }

    /// Creates a video track. Video is never processed, only stopped.
    pub fn video(label: impl Into<String>) -> Self {
        Self {
            kind: TrackKind::Video,
            label: label.into(),
            state: TrackState::new(),
            input: None,
            format: None,
            driver: None,
        }
    }

    /// Shares `state` with whoever may end the track out of band.
    #[must_use]
    pub fn with_state(mut self, state: TrackState) -> Self {
        self.state = state;
        self
    }

    /// Attaches the driver stopped together with the track.
    #[must_use]
    pub fn with_driver(mut self, driver: Box<dyn TrackDriver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Media kind.
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    /// Device or source label.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Sample format, for audio tracks.
    pub fn format(&self) -> Option<StreamFormat> {
        self.format
    }

    /// Returns `true` until the track is stopped or ends on its own.
    pub fn is_live(&self) -> bool {
        self.state.is_live()
    }

    /// A handle for waiting on the track's end.
    pub fn state(&self) -> TrackState {
        self.state.clone()
    }

    /// Stops the track and releases its driver. Idempotent.
    pub fn stop(&mut self) {
        self.state.end();
        if let Some(mut driver) = self.driver.take() {
            driver.stop();
            tracing::debug!(kind = ?self.kind, label = %self.label, "track stopped");
        }
    }

    fn take_input(&mut self) -> Option<CaptureBuffer> {
        self.input.take()
    }
}

impl Drop for MediaTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A set of tracks acquired together.
///
/// Dropping the stream stops every track.
#[derive(Debug, Default)]
pub struct MediaStream {
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    /// Creates a stream from its tracks.
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self { tracks }
    }

    /// All tracks.
    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    /// Returns `true` if any track carries audio.
    pub fn has_audio(&self) -> bool {
        self.tracks.iter().any(|t| t.kind == TrackKind::Audio)
    }

    /// Format of the first audio track.
    pub fn audio_format(&self) -> Option<StreamFormat> {
        self.tracks.iter().find_map(MediaTrack::format)
    }

    /// Number of tracks still live.
    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.is_live()).count()
    }

    /// End-of-track handles for every track.
    pub fn track_states(&self) -> Vec<TrackState> {
        self.tracks.iter().map(MediaTrack::state).collect()
    }

    /// Stops every track. Idempotent.
    pub fn stop_all(&mut self) {
        for track in &mut self.tracks {
            track.stop();
        }
    }

    /// Takes the sample buffer of the first audio track.
    pub(crate) fn take_audio_input(&mut self) -> Option<CaptureBuffer> {
        self.tracks
            .iter_mut()
            .filter(|t| t.kind == TrackKind::Audio)
            .find_map(MediaTrack::take_input)
    }
}

/// Source of capture streams and monitor outputs.
///
/// # Example
///
/// ```
/// use voice_tap::host::{CaptureHost, MockHost, StreamRequest};
///
/// # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
/// # rt.block_on(async {
/// let host = MockHost::new();
/// let stream = host.request_stream(StreamRequest::display_capture()).await.unwrap();
/// assert!(stream.has_audio());
/// # });
/// ```
#[async_trait]
pub trait CaptureHost: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Acquires a stream. May wait on the user.
    ///
    /// A stream without an audio track is a success here; the manager turns
    /// it into [`CaptureError::NoAudioTrack`].
    async fn request_stream(&self, request: StreamRequest) -> Result<MediaStream, CaptureError>;

    /// Opens the output the rendered graph is played through.
    ///
    /// Default implementation discards the audio.
    async fn open_monitor(&self, format: StreamFormat) -> Result<Arc<dyn Sink>, CaptureError> {
        let _ = format;
        Ok(Arc::new(DiscardSink))
    }
}

/// Lists all available input devices.
///
/// # Errors
///
/// Returns an error if the audio host cannot be accessed.
pub fn list_input_devices() -> Result<Vec<String>, CaptureError> {
    let host = cpal::default_host();
    let devices = host
        .input_devices()
        .map_err(|e| CaptureError::BackendError(e.to_string()))?;

    Ok(devices.filter_map(|d| d.name().ok()).collect())
}

/// Gets the name of the default input device, if any.
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|d| d.name().ok())
}
