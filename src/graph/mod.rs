//! The audio processing graph.
//!
//! An [`AudioContext`] owns a set of nodes joined by edges. Every node has
//! at most one input and one output, so the graph is always a set of
//! disjoint chains; [`connect`](AudioContext::connect) rejects anything that
//! would fan out, fan in, or loop.
//!
//! ```text
//! Source → [effect stages] → Analyser → Gain → Destination → monitor sink
//! ```
//!
//! Rendering pulls whole quanta from each source's ring buffer and pushes
//! them down the source's chain. Blocks that reach the destination are
//! returned to the caller for playback.

mod chain;
mod node;

pub use chain::ChainBuilder;
pub use node::{NodeId, NodeKind};

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::dsp::{distortion_curve, AnalyserHandle, BiquadFilter, FilterType, WaveShaper};
use crate::effect::StageSpec;
use crate::pipeline::CaptureBuffer;
use crate::{AudioBlock, CaptureError};
use node::{Node, Processor};

/// Q passed to the shelf stages, which ignore it.
const DEFAULT_Q: f32 = 1.0;

/// What one render pass produced.
#[derive(Debug, Default)]
pub struct RenderOutput {
    /// Blocks that reached the destination, in order.
    pub blocks: Vec<AudioBlock>,
    /// Frames the capture side dropped since the previous pass.
    pub dropped_frames: u64,
}

struct Graph {
    nodes: Vec<Option<Node>>,
    destination: NodeId,
    closed: bool,
    frames_rendered: u64,
}

impl Graph {
    fn node(&self, id: NodeId) -> Result<&Node, CaptureError> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| CaptureError::graph(format!("unknown node {id}")))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, CaptureError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or_else(|| CaptureError::graph(format!("unknown node {id}")))
    }

    fn ensure_open(&self) -> Result<(), CaptureError> {
        if self.closed {
            Err(CaptureError::ContextClosed)
        } else {
            Ok(())
        }
    }

    fn insert(&mut self, processor: Processor) -> Result<NodeId, CaptureError> {
        self.ensure_open()?;
        let node = Node::new(processor);
        if let Some(index) = self.nodes.iter().position(Option::is_none) {
            self.nodes[index] = Some(node);
            Ok(NodeId(index))
        } else {
            self.nodes.push(Some(node));
            Ok(NodeId(self.nodes.len() - 1))
        }
    }

    fn path_from(&self, start: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = Some(start);
        while let Some(id) = current {
            let Ok(node) = self.node(id) else { break };
            // Edges are validated on connect; the bound only guards the walk
            if path.len() > self.nodes.len() {
                break;
            }
            path.push(id);
            current = node.output;
        }
        path
    }

    fn connect(&mut self, from: NodeId, to: NodeId) -> Result<(), CaptureError> {
        self.ensure_open()?;
        if from == to {
            return Err(CaptureError::graph(format!("cannot connect {from} to itself")));
        }

        let source = self.node(from)?;
        let target = self.node(to)?;
        if matches!(source.processor, Processor::Destination) {
            return Err(CaptureError::graph("the destination has no output"));
        }
        if matches!(target.processor, Processor::Source(_)) {
            return Err(CaptureError::graph("a source node has no input"));
        }
        if let Some(existing) = source.output {
            return Err(CaptureError::graph(format!(
                "{from} already feeds {existing}; chains must stay linear"
            )));
        }
        if let Some(existing) = target.input {
            return Err(CaptureError::graph(format!(
                "{to} is already fed by {existing}; chains must stay linear"
            )));
        }
        if self.path_from(to).contains(&from) {
            return Err(CaptureError::graph(format!(
                "connecting {from} to {to} would create a cycle"
            )));
        }

        self.node_mut(from)?.output = Some(to);
        self.node_mut(to)?.input = Some(from);
        Ok(())
    }

    fn disconnect(&mut self, from: NodeId) -> Result<(), CaptureError> {
        self.ensure_open()?;
        if let Some(to) = self.node_mut(from)?.output.take() {
            if let Ok(target) = self.node_mut(to) {
                target.input = None;
            }
        }
        Ok(())
    }

    fn release(&mut self, id: NodeId) -> Result<(), CaptureError> {
        self.ensure_open()?;
        if id == self.destination {
            return Err(CaptureError::graph("the destination cannot be released"));
        }
        if let Some(input) = self.node(id)?.input {
            self.disconnect(input)?;
        }
        self.disconnect(id)?;
        self.nodes[id.0] = None;
        Ok(())
    }

    fn render(&mut self, quantum: usize, sample_rate: u32) -> RenderOutput {
        let mut out = RenderOutput::default();
        if self.closed {
            return out;
        }

        let sources: Vec<NodeId> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| matches!(n, Some(Node { processor: Processor::Source(_), .. })))
            .map(|(i, _)| NodeId(i))
            .collect();

        for source in sources {
            let path = self.path_from(source);
            let audible = path.last() == Some(&self.destination);

            loop {
                let timestamp = Duration::from_secs_f64(
                    self.frames_rendered as f64 / f64::from(sample_rate.max(1)),
                );
                let Ok(Node {
                    processor: Processor::Source(input),
                    ..
                }) = self.node_mut(source)
                else {
                    break;
                };
                out.dropped_frames += input.take_dropped_frames();
                let Some(mut block) = input.try_read_block(quantum, timestamp) else {
                    break;
                };
                self.frames_rendered += quantum as u64;

                for &id in path.iter().skip(1) {
                    if let Ok(node) = self.node_mut(id) {
                        node.processor.process(&mut block);
                    }
                }
                if audible {
                    out.blocks.push(block);
                }
            }
        }
        out
    }
}

/// A processing context at a fixed sample rate.
///
/// Cheap to clone; clones share the same graph. Closing the context drops
/// every node, including the source and the ring buffer it reads from.
///
/// # Example
///
/// ```
/// use voice_tap::graph::{AudioContext, ChainBuilder, NodeKind};
/// use voice_tap::dsp::{Analyser, AnalyserHandle};
/// use voice_tap::{CaptureConfig, VoiceEffect};
///
/// let ctx = AudioContext::new(48000, 128);
/// let analyser = ctx
///     .create_analyser(AnalyserHandle::new(Analyser::new(&CaptureConfig::default())))
///     .unwrap();
/// let gain = ctx.create_gain(1.0).unwrap();
///
/// let mut chain = ChainBuilder::new();
/// let first = ctx.create_gain(1.0).unwrap();
/// let terminal = chain.build(&ctx, first, VoiceEffect::Deep).unwrap();
/// ctx.connect(terminal, analyser).unwrap();
/// ctx.connect(analyser, gain).unwrap();
/// ctx.connect(gain, ctx.destination()).unwrap();
///
/// assert_eq!(ctx.path_from(first).len(), 6);
/// assert_eq!(ctx.kind_of(terminal), Some(NodeKind::Filter));
/// ```
#[derive(Clone)]
pub struct AudioContext {
    graph: Arc<Mutex<Graph>>,
    sample_rate: u32,
    render_quantum: usize,
}

impl std::fmt::Debug for AudioContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioContext")
            .field("sample_rate", &self.sample_rate)
            .field("render_quantum", &self.render_quantum)
            .field("nodes", &self.node_count())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl AudioContext {
    /// Creates an open context with only its destination node.
    pub fn new(sample_rate: u32, render_quantum: usize) -> Self {
        let graph = Graph {
            nodes: vec![Some(Node::new(Processor::Destination))],
            destination: NodeId(0),
            closed: false,
            frames_rendered: 0,
        };
        Self {
            graph: Arc::new(Mutex::new(graph)),
            sample_rate,
            render_quantum: render_quantum.max(1),
        }
    }

    /// Sample rate every node runs at.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Frames per render quantum.
    pub fn render_quantum(&self) -> usize {
        self.render_quantum
    }

    /// The node whose input is handed to the monitor.
    pub fn destination(&self) -> NodeId {
        self.graph.lock().destination
    }

    /// Returns `true` once [`close`](Self::close) has run.
    pub fn is_closed(&self) -> bool {
        self.graph.lock().closed
    }

    /// Number of live nodes, the destination included.
    pub fn node_count(&self) -> usize {
        self.graph.lock().nodes.iter().flatten().count()
    }

    /// Creates a source node reading `input`.
    ///
    /// # Errors
    ///
    /// Fails if the context is closed or `input` runs at another rate.
    pub fn create_source(&self, input: CaptureBuffer) -> Result<NodeId, CaptureError> {
        let rate = input.format().sample_rate;
        if rate != self.sample_rate {
            return Err(CaptureError::graph(format!(
                "source runs at {rate}Hz but the context runs at {}Hz",
                self.sample_rate
            )));
        }
        self.graph.lock().insert(Processor::Source(input))
    }

    /// Creates the node for one effect stage.
    pub fn create_stage(&self, stage: &StageSpec) -> Result<NodeId, CaptureError> {
        let sr = self.sample_rate;
        let processor = match *stage {
            StageSpec::LowShelf { frequency, gain_db } => Processor::Filter(BiquadFilter::new(
                FilterType::LowShelf,
                frequency,
                DEFAULT_Q,
                gain_db,
                sr,
            )),
            StageSpec::HighShelf { frequency, gain_db } => Processor::Filter(BiquadFilter::new(
                FilterType::HighShelf,
                frequency,
                DEFAULT_Q,
                gain_db,
                sr,
            )),
            StageSpec::LowPass { frequency, q } => {
                Processor::Filter(BiquadFilter::new(FilterType::LowPass, frequency, q, 0.0, sr))
            }
            StageSpec::HighPass { frequency, q } => {
                Processor::Filter(BiquadFilter::new(FilterType::HighPass, frequency, q, 0.0, sr))
            }
            StageSpec::BandPass { frequency, q } => {
                Processor::Filter(BiquadFilter::new(FilterType::BandPass, frequency, q, 0.0, sr))
            }
            StageSpec::WaveShaper {
                drive,
                points,
                oversample,
            } => Processor::WaveShaper(WaveShaper::new(
                distortion_curve(drive, points),
                oversample,
                sr,
            )),
        };
        self.graph.lock().insert(processor)
    }

    /// Creates a linear gain node.
    pub fn create_gain(&self, gain: f32) -> Result<NodeId, CaptureError> {
        self.graph.lock().insert(Processor::Gain(gain))
    }

    /// Creates an analyser node feeding `analyser`.
    pub fn create_analyser(&self, analyser: AnalyserHandle) -> Result<NodeId, CaptureError> {
        self.graph.lock().insert(Processor::Analyser(analyser))
    }

    /// Connects `from`'s output to `to`'s input.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::GraphConstruction`] if either node is unknown,
    /// either end is already connected, or the edge would close a loop.
    /// Returns [`CaptureError::ContextClosed`] after [`close`](Self::close).
    pub fn connect(&self, from: NodeId, to: NodeId) -> Result<(), CaptureError> {
        self.graph.lock().connect(from, to)
    }

    /// Removes `from`'s output edge, if any.
    pub fn disconnect(&self, from: NodeId) -> Result<(), CaptureError> {
        self.graph.lock().disconnect(from)
    }

    /// Disconnects both sides of `node` and frees it.
    pub fn release(&self, node: NodeId) -> Result<(), CaptureError> {
        self.graph.lock().release(node)
    }

    /// The node `node` feeds, if any.
    pub fn output_of(&self, node: NodeId) -> Option<NodeId> {
        self.graph.lock().node(node).ok().and_then(|n| n.output)
    }

    /// The node feeding `node`, if any.
    pub fn input_of(&self, node: NodeId) -> Option<NodeId> {
        self.graph.lock().node(node).ok().and_then(|n| n.input)
    }

    /// Kind of `node`, or `None` if it doesn't exist.
    pub fn kind_of(&self, node: NodeId) -> Option<NodeKind> {
        self.graph
            .lock()
            .node(node)
            .ok()
            .map(|n| n.processor.kind())
    }

    /// `start` followed by every node downstream of it.
    pub fn path_from(&self, start: NodeId) -> Vec<NodeId> {
        self.graph.lock().path_from(start)
    }

    /// Drops every node and refuses further changes. Idempotent.
    pub fn close(&self) {
        let mut graph = self.graph.lock();
        if graph.closed {
            return;
        }
        graph.closed = true;
        graph.nodes.clear();
        tracing::debug!(sample_rate = self.sample_rate, "audio context closed");
    }

    /// Pushes every whole quantum currently buffered through the graph.
    ///
    /// Runs inline on the calling task with the graph lock held. Each pass
    /// is bounded by what the capture buffer holds, and every stage costs a
    /// fixed amount per sample (the distortion curve is a table lookup), so
    /// at the render interval a pass stays in the tens of microseconds.
    pub(crate) fn render(&self) -> RenderOutput {
        self.graph
            .lock()
            .render(self.render_quantum, self.sample_rate)
    }
}
