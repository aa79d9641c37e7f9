//! Processing nodes.

use crate::dsp::{AnalyserHandle, BiquadFilter, WaveShaper};
use crate::pipeline::CaptureBuffer;
use crate::AudioBlock;

/// Identifies a node within one [`AudioContext`](super::AudioContext).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What a node does, without its state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Reads captured audio. Has no input.
    Source,
    /// Biquad filter.
    Filter,
    /// Wave shaper.
    WaveShaper,
    /// Linear gain.
    Gain,
    /// Spectrum analyser; passes audio through unchanged.
    Analyser,
    /// Hands rendered blocks to the monitor. Has no output.
    Destination,
}

pub(crate) enum Processor {
    Source(CaptureBuffer),
    Filter(BiquadFilter),
    WaveShaper(WaveShaper),
    Gain(f32),
    Analyser(AnalyserHandle),
    Destination,
}

impl Processor {
    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Self::Source(_) => NodeKind::Source,
            Self::Filter(_) => NodeKind::Filter,
            Self::WaveShaper(_) => NodeKind::WaveShaper,
            Self::Gain(_) => NodeKind::Gain,
            Self::Analyser(_) => NodeKind::Analyser,
            Self::Destination => NodeKind::Destination,
        }
    }

    /// Transforms `block` in place. Sources and destinations pass it through.
    pub(crate) fn process(&mut self, block: &mut AudioBlock) {
        match self {
            Self::Filter(filter) => filter.process(&mut block.channels),
            Self::WaveShaper(shaper) => shaper.process(&mut block.channels),
            Self::Gain(gain) => block.apply_gain(*gain),
            Self::Analyser(analyser) => analyser.ingest(&block.mixdown()),
            Self::Source(_) | Self::Destination => {}
        }
    }
}

pub(crate) struct Node {
    pub(crate) processor: Processor,
    pub(crate) input: Option<NodeId>,
    pub(crate) output: Option<NodeId>,
}

impl Node {
    pub(crate) fn new(processor: Processor) -> Self {
        Self {
            processor,
            input: None,
            output: None,
        }
    }
}
