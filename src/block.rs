//! Planar audio block flowing through the processing graph.

use std::time::Duration;

/// One render quantum of audio, stored planar (one `Vec` per channel).
///
/// Blocks are produced by the source node, transformed in place by each
/// stage, and handed to the monitor [`Sink`](crate::Sink) once they reach the
/// destination.
///
/// # Example
///
/// ```
/// use voice_tap::AudioBlock;
/// use std::time::Duration;
///
/// let block = AudioBlock::silent(2, 480, 48000, Duration::ZERO);
/// assert_eq!(block.frames(), 480);
/// assert_eq!(block.duration(), Duration::from_millis(10));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBlock {
    /// Samples per channel in `[-1.0, 1.0]`.
    pub channels: Vec<Vec<f32>>,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Offset of the first frame from the start of the session.
    pub timestamp: Duration,
}

impl AudioBlock {
    /// Creates a block from planar channel data.
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32, timestamp: Duration) -> Self {
        Self {
            channels,
            sample_rate,
            timestamp,
        }
    }

    /// Creates a block of silence.
    pub fn silent(channels: u16, frames: usize, sample_rate: u32, timestamp: Duration) -> Self {
        Self::new(
            vec![vec![0.0; frames]; usize::from(channels)],
            sample_rate,
            timestamp,
        )
    }

    /// Number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Frames per channel.
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Duration covered by this block.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Averages all channels into one, the way the analyser sees the signal.
    pub fn mixdown(&self) -> Vec<f32> {
        let frames = self.frames();
        let count = self.channels.len();
        if count <= 1 {
            return self.channels.first().cloned().unwrap_or_default();
        }
        let scale = 1.0 / count as f32;
        (0..frames)
            .map(|i| self.channels.iter().map(|ch| ch[i]).sum::<f32>() * scale)
            .collect()
    }

    /// Multiplies every sample by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        if (gain - 1.0).abs() < f32::EPSILON {
            return;
        }
        for channel in &mut self.channels {
            for sample in channel.iter_mut() {
                *sample *= gain;
            }
        }
    }
}
