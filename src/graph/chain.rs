//! Effect chain construction.

use super::{AudioContext, NodeId};
use crate::{CaptureError, VoiceEffect};

/// Builds the filter stages of a [`VoiceEffect`] behind a source node.
///
/// The builder remembers the nodes it created, so building again first
/// releases the previous chain instead of leaving it connected to the
/// source.
///
/// # Example
///
/// ```
/// use voice_tap::graph::{AudioContext, ChainBuilder};
/// use voice_tap::VoiceEffect;
///
/// let ctx = AudioContext::new(48000, 128);
/// let input = ctx.create_gain(1.0).unwrap();
/// let mut chain = ChainBuilder::new();
///
/// // Natural adds nothing: the input is the terminal
/// assert_eq!(chain.build(&ctx, input, VoiceEffect::Natural).unwrap(), input);
///
/// let terminal = chain.build(&ctx, input, VoiceEffect::Radio).unwrap();
/// assert_eq!(ctx.path_from(input).last(), Some(&terminal));
/// assert_eq!(chain.nodes().len(), 2);
/// ```
#[derive(Debug, Default)]
pub struct ChainBuilder {
    input: Option<NodeId>,
    nodes: Vec<NodeId>,
}

impl ChainBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Nodes of the current chain, in signal order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// Wires `effect`'s stages after `input` and returns the last node.
    ///
    /// Any chain built earlier is released first. `input` must not have an
    /// output yet (or only the previous chain).
    ///
    /// # Errors
    ///
    /// Returns the context's error if a node cannot be created or connected.
    /// Nodes created before the failure stay tracked and go away with the
    /// next [`release`](Self::release) or when the context closes.
    pub fn build(
        &mut self,
        ctx: &AudioContext,
        input: NodeId,
        effect: VoiceEffect,
    ) -> Result<NodeId, CaptureError> {
        self.release(ctx);
        self.input = Some(input);

        let mut terminal = input;
        for stage in effect.stages() {
            let node = ctx.create_stage(&stage)?;
            self.nodes.push(node);
            ctx.connect(terminal, node)?;
            terminal = node;
        }

        tracing::debug!(%effect, stages = self.nodes.len(), "effect chain built");
        Ok(terminal)
    }

    /// Detaches the chain from its input and frees its nodes.
    pub fn release(&mut self, ctx: &AudioContext) {
        if let Some(input) = self.input.take() {
            let _ = ctx.disconnect(input);
        }
        for node in self.nodes.drain(..) {
            let _ = ctx.release(node);
        }
    }
}
