//! Sink that drops everything.

use crate::sink::Sink;
use crate::{AudioBlock, SinkError};
use async_trait::async_trait;

/// Discards every block.
///
/// Used when there is nothing to play back to, such as a loopback tap of
/// audio the user is already hearing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardSink;

#[async_trait]
impl Sink for DiscardSink {
    fn name(&self) -> &str {
        "discard"
    }

    async fn write(&self, _block: &AudioBlock) -> Result<(), SinkError> {
        Ok(())
    }
}
