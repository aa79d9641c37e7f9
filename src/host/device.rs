//! CPAL-backed capture host.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig as CpalStreamConfig, SupportedStreamConfig};
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;
use tokio::sync::oneshot;

use super::{CaptureHost, MediaStream, MediaTrack, StreamFormat, StreamRequest, TrackDriver, TrackState};
use crate::format::f32_to_i16;
use crate::pipeline::CaptureBuffer;
use crate::sink::{DiscardSink, PlaybackMonitor, Sink};
use crate::CaptureError;

/// Which device a [`CpalHost`] captures from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DeviceSelection {
    /// The system's default input device.
    #[default]
    DefaultInput,
    /// An input device by exact name.
    ByName(String),
    /// Whatever is playing on the default output device.
    ///
    /// Needs a CPAL backend with loopback support (WASAPI, Core Audio taps).
    OutputLoopback,
}

/// Capture host over CPAL devices.
///
/// Each device stream is owned by a dedicated thread for its whole life, so
/// nothing on the async side ever holds a platform stream handle.
///
/// # Example
///
/// ```no_run
/// use voice_tap::host::{CpalHost, DeviceSelection};
///
/// let host = CpalHost::new(DeviceSelection::ByName("USB Microphone".into()));
/// ```
#[derive(Debug, Clone)]
pub struct CpalHost {
    selection: DeviceSelection,
    monitor: bool,
}

impl CpalHost {
    /// Creates a host capturing from `selection`.
    ///
    /// Loopback capture is not monitored by default: the user already hears it.
    pub fn new(selection: DeviceSelection) -> Self {
        let monitor = selection != DeviceSelection::OutputLoopback;
        Self { selection, monitor }
    }

    /// Enables or disables playback of the processed audio.
    #[must_use]
    pub fn with_monitor(mut self, monitor: bool) -> Self {
        self.monitor = monitor;
        self
    }

    /// The configured device selection.
    pub fn selection(&self) -> &DeviceSelection {
        &self.selection
    }
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new(DeviceSelection::DefaultInput)
    }
}

#[async_trait]
impl CaptureHost for CpalHost {
    fn name(&self) -> &str {
        "cpal"
    }

    async fn request_stream(&self, request: StreamRequest) -> Result<MediaStream, CaptureError> {
        if !request.audio {
            return Ok(MediaStream::default());
        }

        let state = TrackState::new();
        let selection = self.selection.clone();
        let callback_state = state.clone();
        let (worker, ready) = DeviceWorker::spawn("voice-tap-capture", move || {
            open_input(&selection, &request, callback_state)
        })?;

        let (buffer, label) = ready
            .await
            .map_err(|_| CaptureError::BackendError("capture thread exited".to_string()))??;

        let track = MediaTrack::audio(label, buffer)
            .with_state(state)
            .with_driver(Box::new(worker));
        Ok(MediaStream::new(vec![track]))
    }

    async fn open_monitor(&self, format: StreamFormat) -> Result<Arc<dyn Sink>, CaptureError> {
        if !self.monitor {
            return Ok(Arc::new(DiscardSink));
        }
        Ok(Arc::new(PlaybackMonitor::open(format).await?))
    }
}

/// A thread owning one CPAL stream until stopped.
pub(crate) struct DeviceWorker {
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<thread::JoinHandle<()>>,
}

impl DeviceWorker {
    /// Spawns a thread that runs `open` and then parks until stopped.
    ///
    /// The value produced next to the stream is delivered through the
    /// returned receiver; the stream itself never leaves the thread.
    pub(crate) fn spawn<T, F>(
        name: &str,
        open: F,
    ) -> Result<(Self, oneshot::Receiver<Result<T, CaptureError>>), CaptureError>
    where
        T: Send + 'static,
        F: FnOnce() -> Result<(Stream, T), CaptureError> + Send + 'static,
    {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let stream = match open() {
                    Ok((stream, value)) => {
                        if ready_tx.send(Ok(value)).is_err() {
                            return;
                        }
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Returns on an explicit stop or when the worker is dropped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("device stream released");
            })
            .map_err(|e| CaptureError::BackendError(format!("failed to spawn {name}: {e}")))?;

        Ok((
            Self {
                stop_tx: Some(stop_tx),
                thread: Some(thread),
            },
            ready_rx,
        ))
    }

    /// Releases the stream and joins the thread. Idempotent.
    pub(crate) fn shutdown(&mut self) {
        drop(self.stop_tx.take());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("device thread panicked");
            }
        }
    }
}

impl TrackDriver for DeviceWorker {
    fn stop(&mut self) {
        self.shutdown();
    }
}

impl Drop for DeviceWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn backend(e: impl std::fmt::Display) -> CaptureError {
    CaptureError::BackendError(e.to_string())
}

/// Resolves the selected device and its default capture config.
fn resolve_device(
    selection: &DeviceSelection,
) -> Result<(Device, SupportedStreamConfig), CaptureError> {
    let host = cpal::default_host();
    match selection {
        DeviceSelection::DefaultInput => {
            let device = host
                .default_input_device()
                .ok_or(CaptureError::NoDefaultDevice { direction: "input" })?;
            let config = device.default_input_config().map_err(backend)?;
            Ok((device, config))
        }
        DeviceSelection::ByName(name) => {
            let devices = host.input_devices().map_err(backend)?;
            for device in devices {
                if device.name().is_ok_and(|n| n == *name) {
                    let config = device.default_input_config().map_err(backend)?;
                    return Ok((device, config));
                }
            }
            Err(CaptureError::DeviceNotFound { name: name.clone() })
        }
        DeviceSelection::OutputLoopback => {
            let device = host
                .default_output_device()
                .ok_or(CaptureError::NoDefaultDevice { direction: "output" })?;
            let config = device.default_output_config().map_err(backend)?;
            Ok((device, config))
        }
    }
}

/// Opens and starts the input stream. Runs on the device thread.
fn open_input(
    selection: &DeviceSelection,
    request: &StreamRequest,
    state: TrackState,
) -> Result<(Stream, (CaptureBuffer, String)), CaptureError> {
    let (device, supported) = resolve_device(selection)?;
    let label = device.name().unwrap_or_else(|_| "unknown".to_string());
    let format = StreamFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };

    let (producer, consumer) = HeapRb::<i16>::new(request.buffer_capacity(format)).split();
    let dropped = Arc::new(AtomicU64::new(0));

    let sample_format = supported.sample_format();
    let config: CpalStreamConfig = supported.into();
    let stream = match sample_format {
        SampleFormat::I16 => build_i16_stream(&device, &config, producer, dropped.clone(), state)?,
        SampleFormat::F32 => build_f32_stream(&device, &config, producer, dropped.clone(), state)?,
        format => {
            return Err(CaptureError::UnsupportedFormat {
                format: format!("{format:?}"),
            });
        }
    };
    stream.play().map_err(backend)?;

    tracing::info!(device = %label, %format, "capture stream started");
    Ok((stream, (CaptureBuffer::new(consumer, format, dropped), label)))
}

/// Error callback shared by the input streams.
fn stream_error_handler(state: TrackState) -> impl FnMut(cpal::StreamError) + Send + 'static {
    move |err| match err {
        cpal::StreamError::DeviceNotAvailable => {
            if state.end() {
                tracing::warn!("capture device disappeared; track ended");
            }
        }
        err => tracing::error!("Audio stream error: {}", err),
    }
}

fn build_i16_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: ringbuf::HeapProd<i16>,
    dropped: Arc<AtomicU64>,
    state: TrackState,
) -> Result<Stream, CaptureError> {
    device
        .build_input_stream(
            config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                // Non-blocking push - drops samples if buffer is full
                let pushed = producer.push_slice(data);
                if pushed < data.len() {
                    dropped.fetch_add((data.len() - pushed) as u64, Ordering::Relaxed);
                }
            },
            stream_error_handler(state),
            None,
        )
        .map_err(backend)
}

fn build_f32_stream(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: ringbuf::HeapProd<i16>,
    dropped: Arc<AtomicU64>,
    state: TrackState,
) -> Result<Stream, CaptureError> {
    device
        .build_input_stream(
            config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let mut lost = 0u64;
                for &sample in data {
                    if producer.try_push(f32_to_i16(sample)).is_err() {
                        lost += 1;
                    }
                }
                if lost > 0 {
                    dropped.fetch_add(lost, Ordering::Relaxed);
                }
            },
            stream_error_handler(state),
            None,
        )
        .map_err(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loopback_is_not_monitored_by_default() {
        assert!(!CpalHost::new(DeviceSelection::OutputLoopback).monitor);
        assert!(CpalHost::default().monitor);
        assert!(!CpalHost::default().with_monitor(false).monitor);
    }

    #[tokio::test]
    async fn test_audio_not_requested_gives_empty_stream() {
        let host = CpalHost::default();
        let request = StreamRequest {
            audio: false,
            ..StreamRequest::display_capture()
        };
        let stream = host.request_stream(request).await.unwrap();
        assert!(!stream.has_audio());
    }

    #[tokio::test]
    async fn test_worker_reports_open_failure() {
        let (mut worker, ready) = DeviceWorker::spawn("test-worker", || {
            Err::<(Stream, ()), _>(CaptureError::DeviceNotFound {
                name: "nope".to_string(),
            })
        })
        .unwrap();
        let result = ready.await.unwrap();
        assert!(matches!(result, Err(CaptureError::DeviceNotFound { .. })));
        worker.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_device_name_fails() {
        let host = CpalHost::new(DeviceSelection::ByName(
            "definitely-not-a-real-device-name".to_string(),
        ));
        let result = host.request_stream(StreamRequest::display_capture()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    #[ignore = "requires audio hardware"]
    async fn test_default_input_stream() {
        let host = CpalHost::default();
        let stream = host
            .request_stream(StreamRequest::display_capture())
            .await
            .unwrap();
        assert!(stream.has_audio());
        assert_eq!(stream.live_track_count(), 1);
    }
}
