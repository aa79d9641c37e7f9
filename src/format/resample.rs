//! Sample rate conversion.
//!
//! [`resample`] converts a whole buffer in one go with linear interpolation.
//! [`StreamResampler`] is for the monitor output, where audio arrives one
//! render quantum at a time and the filter state and fractional position
//! have to carry over from block to block.

use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use crate::SinkError;

/// Resamples one channel from `from_rate` to `to_rate`.
///
/// Stateless: every call starts fresh, so feeding a stream through it block by
/// block rounds each block up and drifts. Use [`StreamResampler`] for that.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }

    let ratio = f64::from(to_rate) / f64::from(from_rate);
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;
    let last = samples.len() - 1;

    (0..output_len)
        .map(|i| {
            let src_pos = i as f64 / ratio;
            let src_idx = src_pos.floor() as usize;
            if src_idx >= last {
                return samples[last];
            }
            let frac = (src_pos - src_idx as f64) as f32;
            let s1 = samples[src_idx];
            let s2 = samples[src_idx + 1];
            s1 + (s2 - s1) * frac
        })
        .collect()
}

/// Sinc resampler that keeps its state between fixed-size planar blocks.
///
/// Over time the output length tracks `frames * to_rate / from_rate` exactly;
/// individual blocks come out one frame longer or shorter as the fractional
/// position wraps.
pub struct StreamResampler {
    inner: SincFixedIn<f32>,
    from_rate: u32,
    to_rate: u32,
    channels: usize,
    chunk_frames: usize,
}

impl std::fmt::Debug for StreamResampler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamResampler")
            .field("from_rate", &self.from_rate)
            .field("to_rate", &self.to_rate)
            .field("channels", &self.channels)
            .field("chunk_frames", &self.chunk_frames)
            .finish_non_exhaustive()
    }
}

impl StreamResampler {
    /// Creates a resampler for blocks of `chunk_frames` frames per channel.
    ///
    /// # Errors
    ///
    /// Returns an error if a rate is zero or rubato rejects the parameters.
    pub fn new(
        from_rate: u32,
        to_rate: u32,
        channels: usize,
        chunk_frames: usize,
    ) -> Result<Self, SinkError> {
        if from_rate == 0 || to_rate == 0 {
            return Err(SinkError::write_failed("sample rate must be non-zero"));
        }
        let params = SincInterpolationParameters {
            sinc_len: 64,
            f_cutoff: 0.95,
            interpolation: SincInterpolationType::Linear,
            oversampling_factor: 64,
            window: WindowFunction::BlackmanHarris2,
        };
        let ratio = f64::from(to_rate) / f64::from(from_rate);
        let inner = SincFixedIn::<f32>::new(ratio, 1.0, params, chunk_frames, channels)
            .map_err(|e| SinkError::write_failed(format!("resampler setup: {e}")))?;

        Ok(Self {
            inner,
            from_rate,
            to_rate,
            channels,
            chunk_frames,
        })
    }

    /// True if this resampler was built for blocks of this shape.
    pub fn accepts(&self, from_rate: u32, channels: usize, frames: usize) -> bool {
        self.from_rate == from_rate && self.channels == channels && self.chunk_frames == frames
    }

    /// Output rate.
    pub fn to_rate(&self) -> u32 {
        self.to_rate
    }

    /// Resamples one planar block of exactly `chunk_frames` frames.
    ///
    /// # Errors
    ///
    /// Returns an error if the block has the wrong shape.
    pub fn process(&mut self, planar: &[Vec<f32>]) -> Result<Vec<Vec<f32>>, SinkError> {
        self.inner
            .process(planar, None)
            .map_err(|e| SinkError::write_failed(format!("resample: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 48000, 48000), samples);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], 44100, 48000).is_empty());
    }

    #[test]
    fn test_resample_downsample_length() {
        let samples: Vec<f32> = (0..480).map(|i| i as f32 / 480.0).collect();
        assert_eq!(resample(&samples, 48000, 16000).len(), 160);
    }

    #[test]
    fn test_resample_upsample_interpolates() {
        let resampled = resample(&[0.0, 1.0], 16000, 32000);
        assert_eq!(resampled.len(), 4);
        assert!((resampled[1] - 0.5).abs() < 1e-6);
        assert!((resampled[3] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_stream_resampler_does_not_drift() {
        // One second of 128-frame quanta at 44.1 kHz, played at 48 kHz
        let mut resampler = StreamResampler::new(44100, 48000, 2, 128).unwrap();
        let block = vec![vec![0.25_f32; 128]; 2];

        let blocks = 344;
        let expected = (blocks * 128) as f64 * 48000.0 / 44100.0;
        let mut run_second = || {
            let mut produced = 0;
            for _ in 0..blocks {
                let out = resampler.process(&block).unwrap();
                assert_eq!(out.len(), 2);
                produced += out[0].len();
            }
            produced as f64
        };

        // The first second is short by the filter delay only
        let first = run_second();
        assert!((first - expected).abs() < 64.0, "first second {first}, expected {expected:.1}");

        // After that the output rate matches the device rate
        let second = run_second();
        assert!((second - expected).abs() < 2.0, "second second {second}, expected {expected:.1}");
    }

    #[test]
    fn test_stream_resampler_is_continuous_across_blocks() {
        let mut resampler = StreamResampler::new(44100, 48000, 1, 128).unwrap();
        let block = vec![vec![0.5_f32; 128]];

        // Past the filter delay a constant input stays constant, block edges included
        let mut tail = Vec::new();
        for i in 0..20 {
            let out = resampler.process(&block).unwrap();
            if i >= 4 {
                tail.extend_from_slice(&out[0]);
            }
        }
        assert!(!tail.is_empty());
        assert!(tail.iter().all(|s| (s - 0.5).abs() < 0.01));
    }

    #[test]
    fn test_stream_resampler_rejects_wrong_block_size() {
        let mut resampler = StreamResampler::new(44100, 48000, 1, 128).unwrap();
        assert!(resampler.accepts(44100, 1, 128));
        assert!(!resampler.accepts(44100, 1, 64));
        assert!(resampler.process(&[vec![0.0; 64]]).is_err());
    }

    #[test]
    fn test_stream_resampler_zero_rate() {
        assert!(StreamResampler::new(0, 48000, 1, 128).is_err());
    }
}
