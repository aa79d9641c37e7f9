//! Frequency analysis node feeding the level meter.

use std::sync::Arc;

use parking_lot::Mutex;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::CaptureConfig;

/// Short-time spectrum analyser.
///
/// Keeps the most recent `fft_size` mono samples. Each frequency read
/// applies a Blackman window, takes the FFT magnitude scaled by `1 / N`,
/// blends it with the previous read using the smoothing constant, and maps
/// the result to decibels.
pub struct Analyser {
    fft_size: usize,
    smoothing: f32,
    min_decibels: f32,
    max_decibels: f32,
    window: Vec<f32>,
    /// Circular time-domain buffer; `write_pos` is the oldest sample.
    time_domain: Vec<f32>,
    write_pos: usize,
    smoothed: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
}

impl std::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyser")
            .field("fft_size", &self.fft_size)
            .field("smoothing", &self.smoothing)
            .field("min_decibels", &self.min_decibels)
            .field("max_decibels", &self.max_decibels)
            .finish_non_exhaustive()
    }
}

impl Analyser {
    /// Creates an analyser from the transform settings in `config`.
    pub fn new(config: &CaptureConfig) -> Self {
        let n = config.fft_size;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        Self {
            fft_size: n,
            smoothing: config.smoothing,
            min_decibels: config.min_decibels,
            max_decibels: config.max_decibels,
            window: blackman_window(n),
            time_domain: vec![0.0; n],
            write_pos: 0,
            smoothed: vec![0.0; n / 2],
            fft,
            spectrum: vec![Complex::default(); n],
            scratch,
        }
    }

    /// Transform size.
    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Number of bins returned by the frequency reads.
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Appends mono samples to the time-domain window.
    pub fn ingest(&mut self, samples: &[f32]) {
        // Only the newest fft_size samples can matter
        let start = samples.len().saturating_sub(self.fft_size);
        for &sample in &samples[start..] {
            self.time_domain[self.write_pos] = sample;
            self.write_pos = (self.write_pos + 1) % self.fft_size;
        }
    }

    /// Runs the transform and updates the smoothed magnitudes.
    fn update_spectrum(&mut self) {
        let n = self.fft_size;
        for i in 0..n {
            let sample = self.time_domain[(self.write_pos + i) % n];
            self.spectrum[i] = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let scale = 1.0 / n as f32;
        let tau = self.smoothing;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(&self.spectrum) {
            let magnitude = bin.norm() * scale;
            let value = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if value.is_finite() { value } else { 0.0 };
        }
    }

    /// Current spectrum in dB, one value per bin.
    pub fn float_frequency_data(&mut self, out: &mut Vec<f32>) {
        self.update_spectrum();
        out.clear();
        out.extend(self.smoothed.iter().map(|&m| 20.0 * m.log10()));
    }

    /// Current spectrum mapped onto `0..=255`.
    ///
    /// `min_decibels` maps to 0 and `max_decibels` to 255; values outside
    /// the range clamp.
    pub fn byte_frequency_data(&mut self, out: &mut Vec<u8>) {
        self.update_spectrum();
        let range = self.max_decibels - self.min_decibels;
        out.clear();
        out.extend(self.smoothed.iter().map(|&m| {
            let db = 20.0 * m.log10();
            let scaled = (255.0 / range) * (db - self.min_decibels);
            // -inf for silent bins lands on 0 here
            scaled.floor().clamp(0.0, 255.0) as u8
        }));
    }
}

/// Blackman window of length `n`.
fn blackman_window(n: usize) -> Vec<f32> {
    let a0 = 0.42;
    let a1 = 0.5;
    let a2 = 0.08;
    (0..n)
        .map(|i| {
            let phase = std::f32::consts::TAU * i as f32 / n as f32;
            a0 - a1 * phase.cos() + a2 * (2.0 * phase).cos()
        })
        .collect()
}

/// Shared handle to an [`Analyser`].
///
/// The render loop writes samples through it and the level loop reads the
/// spectrum; neither ever holds the lock across an await.
#[derive(Debug, Clone)]
pub struct AnalyserHandle {
    inner: Arc<Mutex<Analyser>>,
}

impl AnalyserHandle {
    /// Wraps an analyser for sharing.
    pub fn new(analyser: Analyser) -> Self {
        Self {
            inner: Arc::new(Mutex::new(analyser)),
        }
    }

    /// Number of bins returned by [`byte_frequency_data`](Self::byte_frequency_data).
    pub fn frequency_bin_count(&self) -> usize {
        self.inner.lock().frequency_bin_count()
    }

    /// Fills `out` with the current byte spectrum.
    pub fn byte_frequency_data(&self, out: &mut Vec<u8>) {
        self.inner.lock().byte_frequency_data(out);
    }

    /// Fills `out` with the current dB spectrum.
    pub fn float_frequency_data(&self, out: &mut Vec<f32>) {
        self.inner.lock().float_frequency_data(out);
    }

    pub(crate) fn ingest(&self, samples: &[f32]) {
        self.inner.lock().ingest(samples);
    }
}
