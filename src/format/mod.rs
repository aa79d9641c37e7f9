//! Audio format conversion utilities.
//!
//! - Sample format conversion (i16 ↔ f32)
//! - Channel layout conversion (interleaved ↔ planar)
//! - Sample rate conversion for the monitor output

mod convert;
mod resample;

pub use convert::{deinterleave, f32_to_i16, i16_to_f32, interleave};
pub use resample::{resample, StreamResampler};
