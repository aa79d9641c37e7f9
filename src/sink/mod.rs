//! Sink trait and implementations for the graph's monitor output.
//!
//! Blocks that reach the destination node are written to a [`Sink`]. The
//! crate provides three:
//!
//! - [`PlaybackMonitor`]: Plays blocks on the default output device
//! - [`ChannelSink`]: Sends blocks to a tokio mpsc channel, dropping when it is full
//! - [`DiscardSink`]: Drops everything
//!
//! You can implement the [`Sink`] trait for custom destinations like
//! recorders or network endpoints.

mod channel;
mod discard;
mod playback;

pub use channel::ChannelSink;
pub use discard::DiscardSink;
pub use playback::PlaybackMonitor;

use crate::{AudioBlock, SinkError};
use async_trait::async_trait;

/// A destination for rendered audio.
///
/// # Implementation Notes
///
/// - Methods take `&self` - use interior mutability (`Mutex`, `RwLock`) if needed
/// - All methods are async and run on the tokio runtime
/// - `on_start` is called before the first block is written
/// - `write` is called from the render loop once per rendered block and
///   should not wait on a consumer; drop and count instead, as the bundled
///   sinks do
///
/// # Example
///
/// ```
/// use voice_tap::{Sink, AudioBlock, SinkError};
/// use async_trait::async_trait;
///
/// struct PrintSink {
///     name: String,
/// }
///
/// #[async_trait]
/// impl Sink for PrintSink {
///     fn name(&self) -> &str {
///         &self.name
///     }
///
///     async fn write(&self, block: &AudioBlock) -> Result<(), SinkError> {
///         println!("Received {} frames", block.frames());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Sink: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Called once before the first block.
    ///
    /// Default implementation does nothing.
    async fn on_start(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Write one rendered block.
    ///
    /// Errors are recoverable: the render loop reports them as
    /// [`CaptureEvent::MonitorError`] and keeps rendering.
    ///
    /// [`CaptureEvent::MonitorError`]: crate::CaptureEvent::MonitorError
    async fn write(&self, block: &AudioBlock) -> Result<(), SinkError>;

    /// Called when the render loop ends on its own.
    ///
    /// Sessions that are stopped drop their sink instead, so release
    /// resources in `Drop` as well.
    ///
    /// Default implementation does nothing.
    async fn on_stop(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
