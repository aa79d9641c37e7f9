//! Playback of the processed signal on the default output device.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, Stream, StreamConfig as CpalStreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

use crate::format::{f32_to_i16, interleave, StreamResampler};
use crate::host::{DeviceWorker, StreamFormat};
use crate::sink::Sink;
use crate::{AudioBlock, CaptureError, SinkError};

/// Output buffering, in milliseconds of audio.
const OUTPUT_BUFFER_MS: u64 = 250;

/// Plays rendered blocks so the captured audio stays audible.
///
/// Blocks are resampled and remixed to the output device's format, then
/// queued in a ring buffer the device callback drains. When the queue is
/// full the newest audio is dropped and counted; when it runs dry the
/// device plays silence.
pub struct PlaybackMonitor {
    name: String,
    producer: Mutex<ringbuf::HeapProd<f32>>,
    converter: Mutex<OutputConverter>,
    output: StreamFormat,
    dropped_samples: AtomicU64,
    _worker: DeviceWorker,
}

impl std::fmt::Debug for PlaybackMonitor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackMonitor")
            .field("name", &self.name)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl PlaybackMonitor {
    /// Opens the default output device.
    ///
    /// `input` is the format blocks will arrive in; it is only logged, since
    /// every block carries its own rate and channel count.
    ///
    /// # Errors
    ///
    /// Returns an error if there is no output device or its stream cannot
    /// be started.
    pub async fn open(input: StreamFormat) -> Result<Self, CaptureError> {
        let (worker, ready) = DeviceWorker::spawn("voice-tap-monitor", open_output)?;
        let (producer, output, name) = ready
            .await
            .map_err(|_| CaptureError::BackendError("monitor thread exited".to_string()))??;

        tracing::info!(device = %name, %input, %output, "monitor output started");
        Ok(Self {
            name,
            producer: Mutex::new(producer),
            converter: Mutex::new(OutputConverter::new(output)),
            output,
            dropped_samples: AtomicU64::new(0),
            _worker: worker,
        })
    }

    /// Output device format.
    pub fn output_format(&self) -> StreamFormat {
        self.output
    }

    /// Samples dropped because the output queue was full.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped_samples.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sink for PlaybackMonitor {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, block: &AudioBlock) -> Result<(), SinkError> {
        let interleaved = self.converter.lock().convert(block)?;

        let pushed = self.producer.lock().push_slice(&interleaved);
        if pushed < interleaved.len() {
            self.dropped_samples
                .fetch_add((interleaved.len() - pushed) as u64, Ordering::Relaxed);
        }
        Ok(())
    }
}

/// Turns planar blocks into interleaved samples in the output format.
///
/// The resampler is kept across blocks and rebuilt only when the block shape
/// changes.
#[derive(Debug)]
struct OutputConverter {
    output: StreamFormat,
    resampler: Option<StreamResampler>,
}

impl OutputConverter {
    fn new(output: StreamFormat) -> Self {
        Self {
            output,
            resampler: None,
        }
    }

    fn convert(&mut self, block: &AudioBlock) -> Result<Vec<f32>, SinkError> {
        if block.sample_rate == self.output.sample_rate || block.frames() == 0 {
            return Ok(interleave(&block.channels, self.output.channels));
        }

        let channels = usize::from(block.channel_count());
        let frames = block.frames();
        let resampler = match self.resampler.take() {
            Some(r) if r.accepts(block.sample_rate, channels, frames) => r,
            _ => {
                tracing::debug!(
                    from = block.sample_rate,
                    to = self.output.sample_rate,
                    channels,
                    frames,
                    "monitor resampler rebuilt"
                );
                StreamResampler::new(block.sample_rate, self.output.sample_rate, channels, frames)?
            }
        };
        let resampler = self.resampler.insert(resampler);
        let resampled = resampler.process(&block.channels)?;
        Ok(interleave(&resampled, self.output.channels))
    }
}

type OutputReady = (ringbuf::HeapProd<f32>, StreamFormat, String);

/// Opens and starts the output stream. Runs on the device thread.
fn open_output() -> Result<(Stream, OutputReady), CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or(CaptureError::NoDefaultDevice { direction: "output" })?;
    let supported = device
        .default_output_config()
        .map_err(|e| CaptureError::BackendError(e.to_string()))?;
    let name = device.name().unwrap_or_else(|_| "unknown".to_string());

    let output = StreamFormat {
        sample_rate: supported.sample_rate().0,
        channels: supported.channels(),
    };
    let capacity = (u64::from(output.sample_rate) * OUTPUT_BUFFER_MS / 1000) as usize
        * usize::from(output.channels);
    let (producer, consumer) = HeapRb::<f32>::new(capacity.max(1)).split();

    let sample_format = supported.sample_format();
    let config: CpalStreamConfig = supported.into();
    let stream = match sample_format {
        SampleFormat::F32 => build_f32_output(&device, &config, consumer)?,
        SampleFormat::I16 => build_i16_output(&device, &config, consumer)?,
        format => {
            return Err(CaptureError::UnsupportedFormat {
                format: format!("{format:?}"),
            });
        }
    };
    stream
        .play()
        .map_err(|e| CaptureError::BackendError(e.to_string()))?;

    Ok((stream, (producer, output, name)))
}

fn build_f32_output(
    device: &Device,
    config: &CpalStreamConfig,
    mut consumer: ringbuf::HeapCons<f32>,
) -> Result<Stream, CaptureError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let filled = consumer.pop_slice(data);
                data[filled..].fill(0.0);
            },
            |err| {
                tracing::error!("Monitor stream error: {}", err);
            },
            None,
        )
        .map_err(|e| CaptureError::BackendError(e.to_string()))
}

fn build_i16_output(
    device: &Device,
    config: &CpalStreamConfig,
    mut consumer: ringbuf::HeapCons<f32>,
) -> Result<Stream, CaptureError> {
    device
        .build_output_stream(
            config,
            move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                for sample in data.iter_mut() {
                    *sample = consumer.try_pop().map_or(0, f32_to_i16);
                }
            },
            |err| {
                tracing::error!("Monitor stream error: {}", err);
            },
            None,
        )
        .map_err(|e| CaptureError::BackendError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn stereo_48k() -> StreamFormat {
        StreamFormat {
            sample_rate: 48000,
            channels: 2,
        }
    }

    #[test]
    fn test_converter_passes_matching_rate_through() {
        let mut converter = OutputConverter::new(stereo_48k());
        let block = AudioBlock::new(vec![vec![0.1; 128], vec![0.2; 128]], 48000, Duration::ZERO);

        let out = converter.convert(&block).unwrap();

        assert_eq!(out.len(), 256);
        assert!(converter.resampler.is_none());
    }

    #[test]
    fn test_converter_output_tracks_device_rate() {
        let mut converter = OutputConverter::new(stereo_48k());
        let block = AudioBlock::new(vec![vec![0.0; 128]; 2], 44100, Duration::ZERO);

        // Warm up past the filter delay, then count one second of output
        for _ in 0..16 {
            converter.convert(&block).unwrap();
        }
        let produced: usize = (0..344)
            .map(|_| converter.convert(&block).unwrap().len() / 2)
            .sum();

        let expected = 344.0 * 128.0 * 48000.0 / 44100.0;
        assert!(
            (produced as f64 - expected).abs() < 2.0,
            "produced {produced}, expected {expected:.1}"
        );
    }

    #[test]
    fn test_converter_rebuilds_on_shape_change() {
        let mut converter = OutputConverter::new(stereo_48k());
        let mono = AudioBlock::new(vec![vec![0.0; 128]], 44100, Duration::ZERO);
        let stereo = AudioBlock::new(vec![vec![0.0; 128]; 2], 44100, Duration::ZERO);

        converter.convert(&mono).unwrap();
        assert!(converter.resampler.as_ref().unwrap().accepts(44100, 1, 128));
        converter.convert(&stereo).unwrap();
        assert!(converter.resampler.as_ref().unwrap().accepts(44100, 2, 128));
    }

    #[tokio::test]
    #[ignore = "requires audio hardware"]
    async fn test_monitor_accepts_blocks() {
        let input = StreamFormat {
            sample_rate: 44100,
            channels: 1,
        };
        let monitor = PlaybackMonitor::open(input).await.unwrap();
        let block = AudioBlock::silent(1, 441, 44100, Duration::ZERO);
        monitor.write(&block).await.unwrap();
        assert!(monitor.output_format().sample_rate > 0);
    }
}
