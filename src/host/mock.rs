//! Mock capture host for testing without hardware or user interaction.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;

use super::{
    CaptureHost, MediaStream, MediaTrack, StreamFormat, StreamRequest, TrackDriver, TrackKind,
    TrackState,
};
use crate::pipeline::CaptureBuffer;
use crate::sink::Sink;
use crate::CaptureError;

/// Default mock format, matching what display capture usually delivers.
const DEFAULT_SAMPLE_RATE: u32 = 48000;
const DEFAULT_CHANNELS: u16 = 2;

#[derive(Debug, Clone)]
enum Outcome {
    Grant,
    Fail(CaptureError),
}

#[derive(Default)]
struct MockState {
    requests: usize,
    last_stream: Option<MockStreamHandle>,
}

/// A capture host handing out synthetic streams.
///
/// Clones share state, so a test can keep one clone and inspect the streams
/// a manager acquired through another.
///
/// # Example
///
/// ```
/// use voice_tap::host::{CaptureHost, MockHost, StreamRequest};
///
/// # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
/// # rt.block_on(async {
/// let host = MockHost::new().with_format(16000, 1);
/// let stream = host.request_stream(StreamRequest::display_capture()).await.unwrap();
///
/// let handle = host.last_stream().unwrap();
/// handle.push_sine(440.0, 0.5, 100);
/// assert_eq!(handle.live_track_count(), 2);
///
/// drop(stream);
/// assert_eq!(handle.live_track_count(), 0);
/// # });
/// ```
#[derive(Clone)]
pub struct MockHost {
    format: StreamFormat,
    audio: bool,
    outcome: Outcome,
    acquire_delay: Duration,
    prefill: Vec<i16>,
    monitor: Option<Arc<dyn Sink>>,
    monitor_fails: bool,
    state: Arc<Mutex<MockState>>,
}

impl std::fmt::Debug for MockHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockHost")
            .field("format", &self.format)
            .field("audio", &self.audio)
            .field("outcome", &self.outcome)
            .field("acquire_delay", &self.acquire_delay)
            .finish_non_exhaustive()
    }
}

impl MockHost {
    /// Creates a host granting 48kHz stereo audio plus video.
    pub fn new() -> Self {
        Self {
            format: StreamFormat {
                sample_rate: DEFAULT_SAMPLE_RATE,
                channels: DEFAULT_CHANNELS,
            },
            audio: true,
            outcome: Outcome::Grant,
            acquire_delay: Duration::ZERO,
            prefill: Vec::new(),
            monitor: None,
            monitor_fails: false,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Sets the format of the audio track.
    #[must_use]
    pub fn with_format(mut self, sample_rate: u32, channels: u16) -> Self {
        self.format = StreamFormat {
            sample_rate,
            channels,
        };
        self
    }

    /// Grants streams with a video track only, as when the user leaves
    /// "share audio" unticked.
    #[must_use]
    pub fn without_audio(mut self) -> Self {
        self.audio = false;
        self
    }

    /// Rejects every request as if the user cancelled the picker.
    #[must_use]
    pub fn deny_permission(self) -> Self {
        self.fail_with(CaptureError::PermissionDenied)
    }

    /// Rejects every request with `error`.
    #[must_use]
    pub fn fail_with(mut self, error: CaptureError) -> Self {
        self.outcome = Outcome::Fail(error);
        self
    }

    /// Waits this long before answering a request, like a user looking at
    /// the picker.
    #[must_use]
    pub fn with_acquire_delay(mut self, delay: Duration) -> Self {
        self.acquire_delay = delay;
        self
    }

    /// Queues interleaved samples into every new audio track.
    #[must_use]
    pub fn with_prefill(mut self, samples: Vec<i16>) -> Self {
        self.prefill = samples;
        self
    }

    /// Plays rendered audio into `sink` instead of discarding it.
    #[must_use]
    pub fn with_monitor<S: Sink + 'static>(mut self, sink: S) -> Self {
        self.monitor = Some(Arc::new(sink));
        self
    }

    /// Makes opening the monitor output fail.
    #[must_use]
    pub fn fail_monitor(mut self) -> Self {
        self.monitor_fails = true;
        self
    }

    /// Number of streams requested so far.
    pub fn request_count(&self) -> usize {
        self.state.lock().requests
    }

    /// Handle to the most recently granted stream.
    pub fn last_stream(&self) -> Option<MockStreamHandle> {
        self.state.lock().last_stream.clone()
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CaptureHost for MockHost {
    fn name(&self) -> &str {
        "mock"
    }

    async fn request_stream(&self, request: StreamRequest) -> Result<MediaStream, CaptureError> {
        self.state.lock().requests += 1;
        if !self.acquire_delay.is_zero() {
            tokio::time::sleep(self.acquire_delay).await;
        }
        if let Outcome::Fail(error) = &self.outcome {
            return Err(error.clone());
        }

        let mut tracks = Vec::new();
        let mut states = Vec::new();
        let mut feed = None;
        let released_on = Arc::new(Mutex::new(None));

        if request.video {
            let track = MediaTrack::video("mock screen");
            states.push((TrackKind::Video, track.state()));
            tracks.push(track);
        }
        if request.audio && self.audio {
            let capacity = request.buffer_capacity(self.format);
            let (mut producer, consumer) = HeapRb::<i16>::new(capacity).split();
            producer.push_slice(&self.prefill);
            let dropped = Arc::new(AtomicU64::new(0));

            let buffer = CaptureBuffer::new(consumer, self.format, dropped.clone());
            let track = MediaTrack::audio("mock audio", buffer).with_driver(Box::new(MockDriver {
                released_on: Arc::clone(&released_on),
            }));
            states.push((TrackKind::Audio, track.state()));
            tracks.push(track);
            feed = Some(Arc::new(Mutex::new(MockFeed {
                producer,
                dropped,
                phase: 0.0,
                seed: 12345,
            })));
        }

        self.state.lock().last_stream = Some(MockStreamHandle {
            format: self.format,
            feed,
            tracks: states,
            released_on,
        });
        Ok(MediaStream::new(tracks))
    }

    async fn open_monitor(&self, _format: StreamFormat) -> Result<Arc<dyn Sink>, CaptureError> {
        if self.monitor_fails {
            return Err(CaptureError::BackendError(
                "mock monitor unavailable".to_string(),
            ));
        }
        match &self.monitor {
            Some(sink) => Ok(Arc::clone(sink)),
            None => Ok(Arc::new(crate::sink::DiscardSink)),
        }
    }
}

/// Records which thread released the audio track.
struct MockDriver {
    released_on: Arc<Mutex<Option<String>>>,
}

impl TrackDriver for MockDriver {
    fn stop(&mut self) {
        let thread = std::thread::current();
        *self.released_on.lock() = Some(thread.name().unwrap_or("<unnamed>").to_string());
    }
}

struct MockFeed {
    producer: ringbuf::HeapProd<i16>,
    dropped: Arc<AtomicU64>,
    /// Sine phase carried across calls so consecutive tones join cleanly.
    phase: f64,
    seed: u32,
}

impl MockFeed {
    fn push(&mut self, samples: &[i16]) -> usize {
        let pushed = self.producer.push_slice(samples);
        if pushed < samples.len() {
            self.dropped
                .fetch_add((samples.len() - pushed) as u64, Ordering::Relaxed);
        }
        pushed
    }
}

/// Test-side handle to a stream granted by [`MockHost`].
///
/// Feeds the audio track and ends tracks out of band.
#[derive(Clone)]
pub struct MockStreamHandle {
    format: StreamFormat,
    feed: Option<Arc<Mutex<MockFeed>>>,
    tracks: Vec<(TrackKind, TrackState)>,
    released_on: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for MockStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockStreamHandle")
            .field("format", &self.format)
            .field("has_audio", &self.feed.is_some())
            .field("live_tracks", &self.live_track_count())
            .finish()
    }
}

impl MockStreamHandle {
    /// Format of the audio track.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Returns `true` if the stream has an audio track.
    pub fn has_audio(&self) -> bool {
        self.feed.is_some()
    }

    /// Pushes interleaved samples. Returns how many fit in the buffer.
    pub fn push_samples(&self, samples: &[i16]) -> usize {
        match &self.feed {
            Some(feed) => feed.lock().push(samples),
            None => 0,
        }
    }

    /// Pushes silence for the given duration in milliseconds.
    pub fn push_silence(&self, duration_ms: u64) -> usize {
        let samples = vec![0i16; self.samples_for_duration(duration_ms)];
        self.push_samples(&samples)
    }

    /// Pushes a sine wave, the same on every channel.
    ///
    /// `amplitude` is relative to full scale.
    pub fn push_sine(&self, frequency: f64, amplitude: f64, duration_ms: u64) -> usize {
        let Some(feed) = &self.feed else {
            return 0;
        };
        let channels = usize::from(self.format.channels.max(1));
        let frames = self.samples_for_duration(duration_ms) / channels;
        let step = std::f64::consts::TAU * frequency / f64::from(self.format.sample_rate);

        let mut feed = feed.lock();
        let mut samples = Vec::with_capacity(frames * channels);
        for _ in 0..frames {
            let sample = (feed.phase.sin() * amplitude * 32767.0) as i16;
            feed.phase = (feed.phase + step) % std::f64::consts::TAU;
            samples.extend(std::iter::repeat(sample).take(channels));
        }
        feed.push(&samples)
    }

    /// Pushes deterministic white noise.
    pub fn push_noise(&self, amplitude: f64, duration_ms: u64) -> usize {
        let Some(feed) = &self.feed else {
            return 0;
        };
        let num_samples = self.samples_for_duration(duration_ms);
        let amplitude = (amplitude * 32767.0) as i16;

        let mut feed = feed.lock();
        let mut samples = Vec::with_capacity(num_samples);
        // Simple LCG for deterministic "random" noise
        for _ in 0..num_samples {
            feed.seed = feed.seed.wrapping_mul(1_103_515_245).wrapping_add(12345);
            let random = ((feed.seed >> 16) as i32 - 32768) as i16;
            samples.push((i32::from(random) * i32::from(amplitude) / 32767) as i16);
        }
        feed.push(&samples)
    }

    /// Ends the first live track of `kind`, as when sharing is revoked.
    ///
    /// Returns `true` if a track was ended.
    pub fn end_track(&self, kind: TrackKind) -> bool {
        self.tracks
            .iter()
            .filter(|(k, _)| *k == kind)
            .any(|(_, state)| state.end())
    }

    /// Ends every track.
    pub fn end_all(&self) {
        for (_, state) in &self.tracks {
            state.end();
        }
    }

    /// Name of the thread that released the audio track, once it has been.
    pub fn released_on_thread(&self) -> Option<String> {
        self.released_on.lock().clone()
    }

    /// Number of tracks still live.
    pub fn live_track_count(&self) -> usize {
        self.tracks.iter().filter(|(_, s)| s.is_live()).count()
    }

    fn samples_for_duration(&self, duration_ms: u64) -> usize {
        let frames = (u64::from(self.format.sample_rate) * duration_ms / 1000) as usize;
        frames * usize::from(self.format.channels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_grants_audio_and_video() {
        let host = MockHost::new();
        let stream = host
            .request_stream(StreamRequest::display_capture())
            .await
            .unwrap();
        assert!(stream.has_audio());
        assert_eq!(stream.tracks().len(), 2);
        assert_eq!(stream.audio_format().unwrap().sample_rate, 48000);
        assert_eq!(host.request_count(), 1);
    }

    #[tokio::test]
    async fn test_without_audio() {
        let host = MockHost::new().without_audio();
        let stream = host
            .request_stream(StreamRequest::display_capture())
            .await
            .unwrap();
        assert!(!stream.has_audio());
        assert!(!host.last_stream().unwrap().has_audio());
    }

    #[tokio::test]
    async fn test_deny_permission() {
        let host = MockHost::new().deny_permission();
        let result = host.request_stream(StreamRequest::display_capture()).await;
        assert_eq!(result.unwrap_err(), CaptureError::PermissionDenied);
        assert!(host.last_stream().is_none());
    }

    #[tokio::test]
    async fn test_pushed_audio_reaches_buffer() {
        let host = MockHost::new().with_format(16000, 1);
        let mut stream = host
            .request_stream(StreamRequest::display_capture())
            .await
            .unwrap();
        let handle = host.last_stream().unwrap();

        assert_eq!(handle.push_silence(100), 1600);
        assert_eq!(handle.push_sine(440.0, 1.0, 100), 1600);

        let input = stream.take_audio_input().unwrap();
        assert_eq!(input.available_frames(), 3200);
    }

    #[tokio::test]
    async fn test_sine_has_both_polarities() {
        let host = MockHost::new().with_format(16000, 1);
        let mut stream = host
            .request_stream(StreamRequest::display_capture())
            .await
            .unwrap();
        host.last_stream().unwrap().push_sine(440.0, 1.0, 10);

        let mut input = stream.take_audio_input().unwrap();
        let block = input.try_read_block(160, Duration::ZERO).unwrap();
        assert!(block.channels[0].iter().any(|&s| s > 0.5));
        assert!(block.channels[0].iter().any(|&s| s < -0.5));
    }

    #[tokio::test]
    async fn test_end_track_is_seen_by_stream() {
        let host = MockHost::new();
        let stream = host
            .request_stream(StreamRequest::display_capture())
            .await
            .unwrap();
        let handle = host.last_stream().unwrap();

        assert!(handle.end_track(TrackKind::Video));
        assert!(!handle.end_track(TrackKind::Video));
        assert_eq!(stream.live_track_count(), 1);
        assert_eq!(handle.live_track_count(), 1);
    }

    #[tokio::test]
    async fn test_overflow_is_counted() {
        let host = MockHost::new().with_format(8000, 1);
        let request = StreamRequest {
            buffer_duration: Duration::ZERO,
            ..StreamRequest::display_capture()
        };
        let mut stream = host.request_stream(request).await.unwrap();
        let handle = host.last_stream().unwrap();

        // Capacity is the 1024 frame minimum
        assert_eq!(handle.push_silence(1000), 1024);
        let input = stream.take_audio_input().unwrap();
        assert_eq!(input.take_dropped_frames(), 8000 - 1024);
    }

    #[tokio::test]
    async fn test_failing_monitor() {
        let host = MockHost::new().fail_monitor();
        let format = StreamFormat {
            sample_rate: 48000,
            channels: 2,
        };
        assert!(host.open_monitor(format).await.is_err());
    }
}
