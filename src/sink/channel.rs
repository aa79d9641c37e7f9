//! Monitor sink forwarding rendered blocks over a tokio mpsc channel.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::sink::Sink;
use crate::{AudioBlock, SinkError};

/// Forwards every rendered block to a bounded channel without waiting.
///
/// The render loop must keep pace with the capture clock, so a full channel
/// never holds it up: the block is dropped and counted instead, the same way
/// [`PlaybackMonitor`](crate::PlaybackMonitor) drops audio its output queue
/// cannot hold. A closed channel is a write error.
///
/// # Example
///
/// ```
/// use voice_tap::host::MockHost;
/// use voice_tap::{AudioBlock, ChannelSink};
/// use tokio::sync::mpsc;
///
/// let (tx, _rx) = mpsc::channel::<AudioBlock>(64);
/// let host = MockHost::new().with_monitor(ChannelSink::new(tx));
/// ```
#[derive(Debug)]
pub struct ChannelSink {
    name: String,
    sender: mpsc::Sender<AudioBlock>,
    dropped_blocks: AtomicU64,
}

impl ChannelSink {
    /// Wraps `sender`.
    pub fn new(sender: mpsc::Sender<AudioBlock>) -> Self {
        Self::with_name("channel", sender)
    }

    /// Wraps `sender` under a custom name, used in logs and events.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<AudioBlock>) -> Self {
        Self {
            name: name.into(),
            sender,
            dropped_blocks: AtomicU64::new(0),
        }
    }

    /// Blocks dropped because the receiver was behind.
    pub fn dropped_blocks(&self) -> u64 {
        self.dropped_blocks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Sink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn write(&self, block: &AudioBlock) -> Result<(), SinkError> {
        match self.sender.try_send(block.clone()) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                let dropped = self.dropped_blocks.fetch_add(1, Ordering::Relaxed) + 1;
                if dropped.is_power_of_two() {
                    tracing::debug!(sink = %self.name, dropped, "receiver behind; dropping blocks");
                }
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SinkError::ChannelClosed),
        }
    }
}
