//! Nonlinear wave shaping with optional oversampling.

use std::sync::Arc;

use super::biquad::{BiquadFilter, FilterType};

/// Q (in dB) giving a Butterworth response for the anti-aliasing filters.
const BUTTERWORTH_Q_DB: f32 = -3.0103;

/// Anti-aliasing cutoff as a fraction of the base-rate Nyquist frequency.
const ANTI_ALIAS_FRACTION: f32 = 0.9;

/// Oversampling applied around the shaping curve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Oversample {
    /// Shape at the base rate.
    #[default]
    None,
    /// Shape at twice the base rate.
    X2,
    /// Shape at four times the base rate.
    X4,
}

impl Oversample {
    /// Rate multiplier.
    pub fn factor(self) -> usize {
        match self {
            Self::None => 1,
            Self::X2 => 2,
            Self::X4 => 4,
        }
    }
}

/// Builds the symmetric soft-clipping curve used by the radio effect.
///
/// `curve[i] = ((3 + k) * x * 20°) / (π + k * |x|)` with `x` spanning
/// `[-1, 1)` over `points` entries and `k` the drive.
pub fn distortion_curve(drive: f32, points: usize) -> Vec<f32> {
    let k = f64::from(drive);
    let deg = std::f64::consts::PI / 180.0;
    (0..points)
        .map(|i| {
            let x = (i as f64 * 2.0) / points as f64 - 1.0;
            (((3.0 + k) * x * 20.0 * deg) / (std::f64::consts::PI + k * x.abs())) as f32
        })
        .collect()
}

/// Maps one sample through `curve` with linear interpolation between entries.
///
/// Inputs outside `[-1, 1]` take the first or last entry. An empty curve
/// passes the input through.
pub fn shape_sample(curve: &[f32], x: f32) -> f32 {
    match curve.len() {
        0 => x,
        1 => curve[0],
        n => {
            let last = n - 1;
            let v = last as f32 * 0.5 * (x + 1.0);
            if v <= 0.0 {
                curve[0]
            } else if v >= last as f32 {
                curve[last]
            } else {
                let k = v.floor() as usize;
                let f = v - k as f32;
                (1.0 - f) * curve[k] + f * curve[k + 1]
            }
        }
    }
}

/// A wave shaping stage.
///
/// When oversampling, each channel is zero-stuffed to the higher rate,
/// low-passed, shaped, low-passed again and decimated, which keeps the
/// harmonics generated by the curve from folding back into the audible band.
#[derive(Debug, Clone)]
pub struct WaveShaper {
    curve: Arc<[f32]>,
    oversample: Oversample,
    upsample_filters: [BiquadFilter; 2],
    downsample_filters: [BiquadFilter; 2],
    scratch: Vec<f32>,
}

impl WaveShaper {
    /// Creates a shaper running at `sample_rate`.
    pub fn new(curve: impl Into<Arc<[f32]>>, oversample: Oversample, sample_rate: u32) -> Self {
        let factor = oversample.factor() as u32;
        let cutoff = sample_rate as f32 / 2.0 * ANTI_ALIAS_FRACTION;
        let anti_alias = || {
            BiquadFilter::new(
                FilterType::LowPass,
                cutoff,
                BUTTERWORTH_Q_DB,
                0.0,
                sample_rate * factor,
            )
        };

        Self {
            curve: curve.into(),
            oversample,
            upsample_filters: [anti_alias(), anti_alias()],
            downsample_filters: [anti_alias(), anti_alias()],
            scratch: Vec::new(),
        }
    }

    /// The transfer curve.
    pub fn curve(&self) -> &[f32] {
        &self.curve
    }

    /// Oversampling mode.
    pub fn oversample(&self) -> Oversample {
        self.oversample
    }

    /// Shapes every channel in place.
    pub fn process(&mut self, channels: &mut [Vec<f32>]) {
        for (index, channel) in channels.iter_mut().enumerate() {
            self.process_channel(index, channel);
        }
    }

    fn process_channel(&mut self, index: usize, samples: &mut [f32]) {
        let factor = self.oversample.factor();
        if factor == 1 {
            for sample in samples.iter_mut() {
                *sample = shape_sample(&self.curve, *sample);
            }
            return;
        }

        self.scratch.clear();
        self.scratch.resize(samples.len() * factor, 0.0);
        for (i, &sample) in samples.iter().enumerate() {
            // Zero stuffing divides the energy by the factor
            self.scratch[i * factor] = sample * factor as f32;
        }

        for filter in &mut self.upsample_filters {
            filter.process_channel(index, &mut self.scratch);
        }
        for sample in &mut self.scratch {
            *sample = shape_sample(&self.curve, *sample);
        }
        for filter in &mut self.downsample_filters {
            filter.process_channel(index, &mut self.scratch);
        }

        for (i, sample) in samples.iter_mut().enumerate() {
            *sample = self.scratch[i * factor];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distortion_curve_shape() {
        let curve = distortion_curve(50.0, 44100);
        assert_eq!(curve.len(), 44100);
        assert!((curve[22050]).abs() < 1e-6);
        // Odd symmetry: x(n - i) == -x(i)
        for i in [1usize, 100, 5000, 22000] {
            assert!((curve[i] + curve[44100 - i]).abs() < 1e-5);
        }
        assert!(curve.windows(2).all(|w| w[1] >= w[0]));
    }

    #[test]
    fn test_shape_sample_interpolates_and_clamps() {
        let curve = [-1.0, 0.0, 1.0];
        assert!((shape_sample(&curve, 0.5) - 0.5).abs() < 1e-6);
        assert_eq!(shape_sample(&curve, -3.0), -1.0);
        assert_eq!(shape_sample(&curve, 3.0), 1.0);
        assert_eq!(shape_sample(&[], 0.3), 0.3);
        assert_eq!(shape_sample(&[0.7], -0.3), 0.7);
    }

    #[test]
    fn test_waveshaper_without_oversampling_is_pointwise() {
        let mut shaper = WaveShaper::new(vec![-0.5, 0.0, 0.5], Oversample::None, 48000);
        let mut channels = vec![vec![-1.0, 0.0, 1.0, 0.5]];
        shaper.process(&mut channels);
        assert_eq!(channels[0], vec![-0.5, 0.0, 0.5, 0.25]);
    }

    #[test]
    fn test_oversampled_waveshaper_keeps_block_length_and_bounds() {
        let curve = distortion_curve(50.0, 44100);
        let peak = curve.iter().fold(0.0f32, |m, &v| m.max(v.abs()));
        let mut shaper = WaveShaper::new(curve, Oversample::X4, 48000);

        let tone: Vec<f32> = (0..1024)
            .map(|i| (std::f32::consts::TAU * 440.0 * i as f32 / 48000.0).sin())
            .collect();
        let mut channels = vec![tone];
        shaper.process(&mut channels);

        assert_eq!(channels[0].len(), 1024);
        // Filter ringing may overshoot a little, never by much
        assert!(channels[0].iter().all(|s| s.abs() < peak * 1.5));
        assert!(channels[0][512..].iter().any(|s| s.abs() > peak * 0.5));
    }
}
