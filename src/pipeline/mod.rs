//! Audio pipeline components.
//!
//! The pipeline moves captured audio through the graph to the monitor:
//!
//! ```text
//! CPAL Thread → Ring Buffer → Render Loop → AudioContext → Monitor Sink
//!                                               ↓
//!                                           Analyser → Level Loop
//! ```
//!
//! - **Ring Buffer**: Lock-free SPSC queue written by the device callback
//! - **Render Loop**: Periodically drains whole quanta through the graph
//!
//! The ring buffer ensures the CPAL callback never blocks.

mod render;
mod ring_buffer;

pub(crate) use render::spawn_render_loop;
pub use ring_buffer::CaptureBuffer;
