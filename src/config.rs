//! Configuration types for capture sessions.

use std::time::Duration;

use crate::host::StreamRequest;
use crate::CaptureError;

/// Smallest transform size accepted for the analyser.
const MIN_FFT_SIZE: usize = 32;
/// Largest transform size accepted for the analyser.
const MAX_FFT_SIZE: usize = 32768;

/// Configuration for the capture pipeline.
///
/// Use [`CaptureConfig::default()`] for the values the level meter was tuned
/// with, or customize as needed.
///
/// # Example
///
/// ```
/// use voice_tap::CaptureConfig;
/// use std::time::Duration;
///
/// let config = CaptureConfig {
///     tick_interval: Duration::from_millis(33),
///     ..Default::default()
/// };
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Transform size of the analyser. Produces `fft_size / 2` frequency bins.
    ///
    /// Default: 512
    pub fft_size: usize,

    /// Temporal smoothing of the analyser's magnitudes, in `[0, 1]`.
    ///
    /// Higher values suppress jitter at the cost of responsiveness.
    /// Default: 0.4
    pub smoothing: f32,

    /// Magnitude (dB) mapped to byte value 0.
    ///
    /// Default: -100
    pub min_decibels: f32,

    /// Magnitude (dB) mapped to byte value 255.
    ///
    /// Default: -30
    pub max_decibels: f32,

    /// Divisor applied to the RMS of the byte bins before clamping to 1.
    ///
    /// Default: 100
    pub sensitivity: f32,

    /// Cadence of the level loop, tied to the display refresh.
    ///
    /// Default: ~16.7ms (60Hz)
    pub tick_interval: Duration,

    /// How often the render loop drains captured audio through the graph.
    ///
    /// Default: 10ms
    pub render_interval: Duration,

    /// Frames processed per graph pass.
    ///
    /// Default: 128
    pub render_quantum: usize,

    /// Capacity of the capture ring buffer, expressed as audio duration.
    ///
    /// Default: 2 seconds
    pub ring_buffer_duration: Duration,

    /// Linear gain of the monitor node in front of the output.
    ///
    /// Default: 1.0
    pub monitor_gain: f32,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            smoothing: 0.4,
            min_decibels: -100.0,
            max_decibels: -30.0,
            sensitivity: 100.0,
            tick_interval: Duration::from_micros(16_667),
            render_interval: Duration::from_millis(10),
            render_quantum: 128,
            ring_buffer_duration: Duration::from_secs(2),
            monitor_gain: 1.0,
        }
    }
}

impl CaptureConfig {
    /// Number of frequency bins the analyser produces.
    #[must_use]
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }

    /// Checks every value is in range.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::InvalidConfig`] naming the first bad value.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(CaptureError::invalid_config(format!(
                "fft_size must be a power of two in {MIN_FFT_SIZE}..={MAX_FFT_SIZE}, got {}",
                self.fft_size
            )));
        }
        if !(0.0..=1.0).contains(&self.smoothing) {
            return Err(CaptureError::invalid_config(format!(
                "smoothing must be in [0, 1], got {}",
                self.smoothing
            )));
        }
        if self.min_decibels >= self.max_decibels {
            return Err(CaptureError::invalid_config(format!(
                "min_decibels ({}) must be below max_decibels ({})",
                self.min_decibels, self.max_decibels
            )));
        }
        if self.sensitivity.is_nan() || self.sensitivity <= 0.0 {
            return Err(CaptureError::invalid_config(format!(
                "sensitivity must be positive, got {}",
                self.sensitivity
            )));
        }
        if self.tick_interval.is_zero() || self.render_interval.is_zero() {
            return Err(CaptureError::invalid_config(
                "tick_interval and render_interval must be non-zero",
            ));
        }
        if self.render_quantum == 0 {
            return Err(CaptureError::invalid_config("render_quantum must be non-zero"));
        }
        if self.monitor_gain.is_nan() || self.monitor_gain < 0.0 {
            return Err(CaptureError::invalid_config(format!(
                "monitor_gain must be >= 0, got {}",
                self.monitor_gain
            )));
        }
        Ok(())
    }

    /// The display-capture request sessions make with this configuration.
    pub fn stream_request(&self) -> StreamRequest {
        StreamRequest {
            buffer_duration: self.ring_buffer_duration,
            ..StreamRequest::display_capture()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capture_config_defaults() {
        let config = CaptureConfig::default();
        assert_eq!(config.fft_size, 512);
        assert_eq!(config.frequency_bin_count(), 256);
        assert!((config.smoothing - 0.4).abs() < f32::EPSILON);
        assert!((config.sensitivity - 100.0).abs() < f32::EPSILON);
        assert_eq!(config.render_quantum, 128);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_non_power_of_two_fft() {
        let config = CaptureConfig {
            fft_size: 500,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(CaptureError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_rejects_smoothing_out_of_range() {
        let config = CaptureConfig {
            smoothing: 1.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_decibel_range() {
        let config = CaptureConfig {
            min_decibels: -20.0,
            max_decibels: -30.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_zero_sensitivity() {
        let config = CaptureConfig {
            sensitivity: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_stream_request_carries_buffer_duration() {
        let config = CaptureConfig {
            ring_buffer_duration: Duration::from_millis(500),
            ..Default::default()
        };
        let request = config.stream_request();
        assert!(request.audio);
        assert!(request.video);
        assert_eq!(request.buffer_duration, Duration::from_millis(500));
    }
}
