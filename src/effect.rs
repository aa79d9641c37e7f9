//! Voice effects and the filter stages that implement them.

use std::fmt;
use std::str::FromStr;

use crate::dsp::Oversample;

/// Boost applied by the shelf stages of the deep and high effects.
const SHELF_BOOST_DB: f32 = 10.0;

/// Drive of the radio distortion curve.
pub const RADIO_DRIVE: f32 = 50.0;

/// Resolution of the radio distortion curve.
pub const RADIO_CURVE_POINTS: usize = 44100;

/// Timbre coloration applied in front of the analyser.
///
/// None of these shift pitch; they only reshape the spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VoiceEffect {
    /// Passthrough.
    #[default]
    Natural,
    /// Low shelf boost then low pass: darker, "bigger" voice.
    Deep,
    /// High shelf boost then high pass: brighter, "smaller" voice.
    High,
    /// Soft clipping then band pass: narrow, distorted radio voice.
    Radio,
}

impl VoiceEffect {
    /// All effects, in display order.
    pub const ALL: [VoiceEffect; 4] = [Self::Natural, Self::Deep, Self::High, Self::Radio];

    /// Display name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Natural => "Natural",
            Self::Deep => "Deep",
            Self::High => "High",
            Self::Radio => "Radio",
        }
    }

    /// The ordered stages implementing this effect.
    ///
    /// `Natural` has none: the source feeds the analyser directly.
    pub fn stages(self) -> Vec<StageSpec> {
        match self {
            Self::Natural => Vec::new(),
            Self::Deep => vec![
                StageSpec::LowShelf {
                    frequency: 200.0,
                    gain_db: SHELF_BOOST_DB,
                },
                StageSpec::LowPass {
                    frequency: 2000.0,
                    q: 1.0,
                },
            ],
            Self::High => vec![
                StageSpec::HighShelf {
                    frequency: 2000.0,
                    gain_db: SHELF_BOOST_DB,
                },
                StageSpec::HighPass {
                    frequency: 500.0,
                    q: 1.0,
                },
            ],
            Self::Radio => vec![
                StageSpec::WaveShaper {
                    drive: RADIO_DRIVE,
                    points: RADIO_CURVE_POINTS,
                    oversample: Oversample::X4,
                },
                StageSpec::BandPass {
                    frequency: 1000.0,
                    q: 1.0,
                },
            ],
        }
    }
}

impl fmt::Display for VoiceEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown effect name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown voice effect '{0}' (expected natural, deep, high or radio)")]
pub struct ParseVoiceEffectError(String);

impl FromStr for VoiceEffect {
    type Err = ParseVoiceEffectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|effect| effect.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| ParseVoiceEffectError(s.to_string()))
    }
}

/// Description of one stage of an effect chain.
///
/// Stages are plain data; [`AudioContext`](crate::graph::AudioContext)
/// turns them into nodes at the context's sample rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageSpec {
    /// Shelf boost/cut below `frequency`.
    LowShelf {
        /// Corner frequency in Hz.
        frequency: f32,
        /// Shelf gain in dB.
        gain_db: f32,
    },
    /// Shelf boost/cut above `frequency`.
    HighShelf {
        /// Corner frequency in Hz.
        frequency: f32,
        /// Shelf gain in dB.
        gain_db: f32,
    },
    /// Second-order low pass.
    LowPass {
        /// Cutoff in Hz.
        frequency: f32,
        /// Resonance in dB.
        q: f32,
    },
    /// Second-order high pass.
    HighPass {
        /// Cutoff in Hz.
        frequency: f32,
        /// Resonance in dB.
        q: f32,
    },
    /// Constant-peak band pass.
    BandPass {
        /// Center frequency in Hz.
        frequency: f32,
        /// Linear quality factor.
        q: f32,
    },
    /// Soft clipping through [`distortion_curve`](crate::dsp::distortion_curve).
    WaveShaper {
        /// Curve drive.
        drive: f32,
        /// Curve resolution.
        points: usize,
        /// Oversampling around the curve.
        oversample: Oversample,
    },
}
