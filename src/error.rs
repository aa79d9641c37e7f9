//! Error types for voice-tap.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`CaptureError`]): Prevent a capture session from starting
//! - **Recoverable errors** ([`SinkError`]): Runtime monitor failures surfaced via
//!   [`EventCallback`](crate::EventCallback)

/// Fatal errors that prevent a capture session from starting.
///
/// These are returned from [`CaptureManager::start()`] and are also published
/// as the `error` string of the [`CaptureSnapshot`]. Runtime issues (slow
/// monitor, buffer overflow) are reported via the event callback instead.
///
/// [`CaptureManager::start()`]: crate::CaptureManager::start
/// [`CaptureSnapshot`]: crate::CaptureSnapshot
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The user declined or cancelled the capture-source picker.
    #[error("failed to capture audio: permission denied or selection cancelled")]
    PermissionDenied,

    /// A stream was acquired but it carries no audio track.
    ///
    /// Almost always the user forgot to opt into audio sharing.
    #[error("no audio track selected. Please check 'Share audio' when choosing what to capture")]
    NoAudioTrack,

    /// Wiring the effect, analysis or monitor nodes failed.
    #[error("failed to build audio graph: {reason}")]
    GraphConstruction {
        /// What went wrong while wiring the graph.
        reason: String,
    },

    /// Another `start()` is still waiting for the host to hand over a stream.
    #[error("audio capture is already being started")]
    AcquisitionInProgress,

    /// The processing context was closed before the operation ran.
    #[error("audio context is closed")]
    ContextClosed,

    /// The requested audio device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// No default device of the requested direction is configured.
    #[error("no default {direction} device configured")]
    NoDefaultDevice {
        /// `"input"` or `"output"`.
        direction: &'static str,
    },

    /// The device's sample format is not supported.
    #[error("unsupported sample format: {format}")]
    UnsupportedFormat {
        /// The format that wasn't supported.
        format: String,
    },

    /// A configuration value is out of range.
    #[error("invalid capture config: {reason}")]
    InvalidConfig {
        /// Which value is wrong and why.
        reason: String,
    },

    /// An error from the underlying audio library (CPAL).
    #[error("audio backend error: {0}")]
    BackendError(String),
}

impl CaptureError {
    /// Creates a graph construction error with the given reason.
    pub fn graph(reason: impl Into<String>) -> Self {
        Self::GraphConstruction {
            reason: reason.into(),
        }
    }

    /// Creates an invalid config error with the given reason.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if recovering requires the user to do something
    /// (grant permission, tick "share audio", pick another device) before
    /// calling `start()` again.
    pub fn is_user_actionable(&self) -> bool {
        matches!(
            self,
            Self::PermissionDenied
                | Self::NoAudioTrack
                | Self::DeviceNotFound { .. }
                | Self::NoDefaultDevice { .. }
        )
    }
}

/// Errors that can occur within a [`Sink`](crate::Sink) implementation.
///
/// Sink errors are recoverable: the render loop emits a
/// [`CaptureEvent::MonitorError`] and keeps running.
///
/// [`CaptureEvent::MonitorError`]: crate::CaptureEvent::MonitorError
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// A write operation failed.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// The receiving channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// Custom error for user-implemented sinks.
    #[error("{0}")]
    Custom(String),
}

impl SinkError {
    /// Creates a custom sink error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a write failed error with the given reason.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_audio_track_message_is_actionable() {
        let err = CaptureError::NoAudioTrack;
        assert!(err.to_string().contains("Share audio"));
        assert!(err.is_user_actionable());
    }

    #[test]
    fn test_graph_error_display() {
        let err = CaptureError::graph("node 3 already has an output");
        assert_eq!(
            err.to_string(),
            "failed to build audio graph: node 3 already has an output"
        );
        assert!(!err.is_user_actionable());
    }

    #[test]
    fn test_no_default_device_display() {
        let err = CaptureError::NoDefaultDevice { direction: "input" };
        assert_eq!(err.to_string(), "no default input device configured");
    }

    #[test]
    fn test_sink_error_custom() {
        let err = SinkError::custom("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
    }

    #[test]
    fn test_sink_error_write_failed() {
        let err = SinkError::write_failed("buffer full");
        assert_eq!(err.to_string(), "write failed: buffer full");
    }
}
