//! # voice-tap
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Live voice capture with a selectable voice effect and a mouth-opening level.
//!
//! `voice-tap` acquires an audio stream, runs it through a small processing
//! graph (source → voice effect → analyser → monitor), keeps the processed
//! audio audible, and publishes a normalized loudness value once per display
//! tick for driving an avatar's mouth.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use voice_tap::{CaptureManager, VoiceEffect};
//!
//! # async fn run() -> Result<(), voice_tap::CaptureError> {
//! let manager = CaptureManager::builder()
//!     .voice_effect(VoiceEffect::Radio)
//!     .on_event(|e| tracing::info!(?e, "capture event"))
//!     .build()?;
//!
//! manager.start().await?;
//!
//! let mut snapshots = manager.subscribe();
//! while snapshots.changed().await.is_ok() {
//!     let snapshot = snapshots.borrow_and_update().clone();
//!     if !snapshot.is_live {
//!         break;
//!     }
//!     println!("mouth open: {:.2}", snapshot.volume);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! The crate maintains a strict thread boundary:
//!
//! - **CPAL Thread**: High-priority audio callback that never blocks
//! - **Ring Buffer**: Lock-free SPSC queue between the callback and the graph
//! - **Tokio Runtime**: The render loop drives the graph, the level loop
//!   samples the analyser and publishes through a `watch` channel
//!
//! Streams come from a [`CaptureHost`](host::CaptureHost): [`CpalHost`](host::CpalHost)
//! for real devices, [`MockHost`](host::MockHost) for tests.

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod block;
mod builder;
mod config;
pub mod dsp;
mod effect;
mod error;
mod event;
pub mod format;
pub mod graph;
pub mod host;
pub mod level;
mod manager;
mod pipeline;
mod session;
mod sink;
mod status;

pub use block::AudioBlock;
pub use builder::CaptureManagerBuilder;
pub use config::CaptureConfig;
pub use effect::{ParseVoiceEffectError, StageSpec, VoiceEffect};
pub use error::{CaptureError, SinkError};
pub use event::{event_callback, CaptureEvent, EventCallback, StopReason};
pub use host::{default_input_device_name, list_input_devices};
pub use level::compute_level;
pub use manager::CaptureManager;
pub use pipeline::CaptureBuffer;
pub use sink::{ChannelSink, DiscardSink, PlaybackMonitor, Sink};
pub use status::{CaptureSnapshot, CaptureStatus};
