//! Signal processing stages used by the graph.
//!
//! - [`biquad`]: shelf, pass and band filters
//! - [`waveshaper`]: curve-based distortion with oversampling
//! - [`analyser`]: windowed FFT magnitude analysis

pub mod analyser;
pub mod biquad;
pub mod waveshaper;

pub use analyser::{Analyser, AnalyserHandle};
pub use biquad::{BiquadFilter, Coefficients, FilterType};
pub use waveshaper::{distortion_curve, shape_sample, Oversample, WaveShaper};
