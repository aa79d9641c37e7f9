//! Builder pattern for `CaptureManager`.

use std::sync::Arc;

use crate::host::{CaptureHost, CpalHost};
use crate::{
    event_callback, CaptureConfig, CaptureError, CaptureEvent, CaptureManager, EventCallback,
    VoiceEffect,
};

/// Builder for configuring a [`CaptureManager`].
///
/// Use [`CaptureManager::builder()`] to create one.
///
/// # Example
///
/// ```
/// use voice_tap::host::MockHost;
/// use voice_tap::{CaptureConfig, CaptureManager, VoiceEffect};
/// use std::time::Duration;
///
/// let manager = CaptureManager::builder()
///     .host(MockHost::new())
///     .voice_effect(VoiceEffect::Deep)
///     .with_config(CaptureConfig {
///         tick_interval: Duration::from_millis(33),
///         ..Default::default()
///     })
///     .on_event(|e| tracing::debug!(?e, "capture event"))
///     .build()
///     .unwrap();
///
/// assert_eq!(manager.voice_effect(), VoiceEffect::Deep);
/// ```
#[must_use]
pub struct CaptureManagerBuilder {
    host: Option<Arc<dyn CaptureHost>>,
    effect: VoiceEffect,
    config: CaptureConfig,
    event_callback: Option<EventCallback>,
}

impl Default for CaptureManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureManagerBuilder {
    /// Creates a builder with default settings.
    pub fn new() -> Self {
        Self {
            host: None,
            effect: VoiceEffect::default(),
            config: CaptureConfig::default(),
            event_callback: None,
        }
    }

    /// Set where streams and the monitor output come from.
    ///
    /// Default: [`CpalHost::default()`] (default input device, monitor on)
    pub fn host<H: CaptureHost + 'static>(mut self, host: H) -> Self {
        self.host = Some(Arc::new(host));
        self
    }

    /// Set an already shared host.
    pub fn host_arc(mut self, host: Arc<dyn CaptureHost>) -> Self {
        self.host = Some(host);
        self
    }

    /// Set the effect of the first session.
    ///
    /// Default: [`VoiceEffect::Natural`]
    pub fn voice_effect(mut self, effect: VoiceEffect) -> Self {
        self.effect = effect;
        self
    }

    /// Set custom capture configuration.
    pub fn with_config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    /// Set a callback to receive runtime events.
    ///
    /// Events include session start/stop, deferred effect changes, buffer
    /// overflow warnings and monitor errors.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(CaptureEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Builds the manager. Nothing is acquired until [`CaptureManager::start()`].
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::InvalidConfig`] if the configuration is out of
    /// range.
    pub fn build(self) -> Result<CaptureManager, CaptureError> {
        self.config.validate()?;
        let host = self.host.unwrap_or_else(|| Arc::new(CpalHost::default()));
        tracing::debug!(host = host.name(), effect = %self.effect, "capture manager built");

        Ok(CaptureManager::from_parts(
            host,
            self.config,
            self.effect,
            self.event_callback,
        ))
    }
}
