//! Second-order IIR filter stages.
//!
//! Coefficients follow the Audio EQ Cookbook with the same conventions as a
//! browser `BiquadFilterNode`: shelves use slope S = 1, low/high pass take Q
//! in dB, band pass takes a linear Q.

use rustfft::num_complex::Complex;

/// Response shape of a [`BiquadFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterType {
    /// Attenuates above the cutoff.
    LowPass,
    /// Attenuates below the cutoff.
    HighPass,
    /// Passes a band around the center frequency.
    BandPass,
    /// Boosts or cuts below the corner frequency.
    LowShelf,
    /// Boosts or cuts above the corner frequency.
    HighShelf,
}

/// Filter coefficients normalized so that `a0 == 1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Coefficients {
    /// Computes coefficients for the given filter at `sample_rate`.
    ///
    /// `frequency` is clamped inside `(0, nyquist)`.
    pub fn new(kind: FilterType, frequency: f32, q: f32, gain_db: f32, sample_rate: u32) -> Self {
        let nyquist = f64::from(sample_rate) / 2.0;
        let f0 = f64::from(frequency).clamp(1.0, nyquist * 0.999);
        let w0 = std::f64::consts::TAU * f0 / f64::from(sample_rate);
        let (sin_w0, cos_w0) = w0.sin_cos();
        let a = 10f64.powf(f64::from(gain_db) / 40.0);
        let q = f64::from(q);

        let (b0, b1, b2, a0, a1, a2) = match kind {
            FilterType::LowPass => {
                let alpha = sin_w0 / (2.0 * 10f64.powf(q / 20.0));
                let b1 = 1.0 - cos_w0;
                (b1 / 2.0, b1, b1 / 2.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::HighPass => {
                let alpha = sin_w0 / (2.0 * 10f64.powf(q / 20.0));
                let b1 = -(1.0 + cos_w0);
                (-b1 / 2.0, b1, -b1 / 2.0, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::BandPass => {
                let alpha = sin_w0 / (2.0 * q.max(1e-4));
                (alpha, 0.0, -alpha, 1.0 + alpha, -2.0 * cos_w0, 1.0 - alpha)
            }
            FilterType::LowShelf => {
                let two_sqrt_a_alpha = sin_w0 * std::f64::consts::SQRT_2 * a.sqrt();
                (
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    2.0 * a * ((a - 1.0) - (a + 1.0) * cos_w0),
                    a * ((a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    -2.0 * ((a - 1.0) + (a + 1.0) * cos_w0),
                    (a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
            FilterType::HighShelf => {
                let two_sqrt_a_alpha = sin_w0 * std::f64::consts::SQRT_2 * a.sqrt();
                (
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha),
                    -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0),
                    a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha),
                    (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha,
                    2.0 * ((a - 1.0) - (a + 1.0) * cos_w0),
                    (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha,
                )
            }
        };

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Linear magnitude response at `frequency`.
    pub fn magnitude_at(&self, frequency: f32, sample_rate: u32) -> f32 {
        let w = std::f64::consts::TAU * f64::from(frequency) / f64::from(sample_rate);
        let z1 = Complex::from_polar(1.0, -w);
        let z2 = z1 * z1;
        let num = Complex::new(self.b0, 0.0) + z1 * self.b1 + z2 * self.b2;
        let den = Complex::new(1.0, 0.0) + z1 * self.a1 + z2 * self.a2;
        (num / den).norm() as f32
    }
}

/// Per-channel delay line (Direct Form I).
#[derive(Debug, Clone, Copy, Default)]
struct History {
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,
}

/// A biquad filter stage with independent state per channel.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    kind: FilterType,
    frequency: f32,
    q: f32,
    gain_db: f32,
    coefficients: Coefficients,
    history: Vec<History>,
}

impl BiquadFilter {
    /// Creates a filter stage.
    pub fn new(kind: FilterType, frequency: f32, q: f32, gain_db: f32, sample_rate: u32) -> Self {
        Self {
            kind,
            frequency,
            q,
            gain_db,
            coefficients: Coefficients::new(kind, frequency, q, gain_db, sample_rate),
            history: Vec::new(),
        }
    }

    /// Filter shape.
    pub fn kind(&self) -> FilterType {
        self.kind
    }

    /// Corner or center frequency in Hz.
    pub fn frequency(&self) -> f32 {
        self.frequency
    }

    /// Quality factor as passed to [`new`](Self::new).
    pub fn q(&self) -> f32 {
        self.q
    }

    /// Shelf gain in dB (ignored by pass filters).
    pub fn gain_db(&self) -> f32 {
        self.gain_db
    }

    /// Coefficients currently in use.
    pub fn coefficients(&self) -> &Coefficients {
        &self.coefficients
    }

    /// Filters one channel in place.
    pub fn process_channel(&mut self, channel: usize, samples: &mut [f32]) {
        if self.history.len() <= channel {
            self.history.resize(channel + 1, History::default());
        }
        let c = self.coefficients;
        let h = &mut self.history[channel];

        for sample in samples.iter_mut() {
            let x0 = f64::from(*sample);
            let y0 = c.b0 * x0 + c.b1 * h.x1 + c.b2 * h.x2 - c.a1 * h.y1 - c.a2 * h.y2;
            h.x2 = h.x1;
            h.x1 = x0;
            h.y2 = h.y1;
            h.y1 = y0;
            *sample = y0 as f32;
        }
    }

    /// Filters every channel in place.
    pub fn process(&mut self, channels: &mut [Vec<f32>]) {
        for (index, channel) in channels.iter_mut().enumerate() {
            self.process_channel(index, channel);
        }
    }

    /// Clears the delay lines.
    pub fn reset(&mut self) {
        self.history.clear();
    }
}
