//! The capture session manager.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::builder::CaptureManagerBuilder;
use crate::event::{emit, EventCallback};
use crate::graph::NodeKind;
use crate::host::CaptureHost;
use crate::session::CaptureSession;
use crate::{
    CaptureConfig, CaptureError, CaptureEvent, CaptureSnapshot, CaptureStatus, StopReason,
    VoiceEffect,
};

/// Clears the in-flight flag when acquisition ends, however it ends.
struct AcquisitionGuard<'a>(&'a AtomicBool);

impl<'a> AcquisitionGuard<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for AcquisitionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub(crate) struct Inner {
    host: Arc<dyn CaptureHost>,
    config: CaptureConfig,
    event_callback: Option<EventCallback>,
    effect: Mutex<VoiceEffect>,
    session: Mutex<Option<CaptureSession>>,
    acquiring: AtomicBool,
    next_session_id: AtomicU64,
    publisher: Arc<watch::Sender<CaptureSnapshot>>,
}

impl Inner {
    fn emit(&self, event: CaptureEvent) {
        emit(self.event_callback.as_ref(), event);
    }

    /// Tears down the live session, if it is `expected_id` (or any, for `None`).
    ///
    /// Returns `true` if a session was torn down. The snapshot goes idle
    /// under the session lock; the resources are freed after it is released.
    fn teardown(&self, expected_id: Option<u64>, reason: StopReason) -> bool {
        let session = {
            let mut slot = self.session.lock();
            let matches = match (slot.as_ref(), expected_id) {
                (Some(session), Some(id)) => session.id() == id,
                (Some(_), None) => true,
                (None, _) => false,
            };
            if !matches {
                return false;
            }
            let Some(mut session) = slot.take() else {
                return false;
            };
            session.cancel_loops();
            self.publisher.send_modify(|snapshot| {
                snapshot.is_live = false;
                snapshot.volume = 0.0;
            });
            session
        };

        let id = session.id();
        drop(session);
        tracing::info!(session = id, ?reason, "capture stopped");
        self.emit(CaptureEvent::SessionStopped { reason });
        true
    }

    fn publish_failure(&self, error: &CaptureError) {
        let message = error.to_string();
        self.publisher.send_modify(|snapshot| {
            snapshot.is_live = false;
            snapshot.volume = 0.0;
            snapshot.error = Some(message.clone());
        });
        tracing::warn!(
            error = %error,
            actionable = error.is_user_actionable(),
            "capture failed to start"
        );
        self.emit(CaptureEvent::CaptureFailed { error: message });
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.teardown(None, StopReason::Dropped);
    }
}

/// Owns at most one live capture session and publishes its state.
///
/// Cheap to clone; clones control the same session. The session is torn
/// down when the last clone is dropped.
///
/// # Example
///
/// ```
/// use voice_tap::host::MockHost;
/// use voice_tap::{CaptureManager, CaptureStatus, VoiceEffect};
///
/// # let rt = tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap();
/// # rt.block_on(async {
/// let manager = CaptureManager::builder()
///     .host(MockHost::new())
///     .voice_effect(VoiceEffect::Radio)
///     .build()
///     .unwrap();
///
/// manager.start().await.unwrap();
/// assert_eq!(manager.status(), CaptureStatus::Live);
///
/// manager.stop();
/// assert_eq!(manager.status(), CaptureStatus::Idle);
/// assert_eq!(manager.volume(), 0.0);
/// # });
/// ```
#[derive(Clone)]
pub struct CaptureManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for CaptureManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureManager")
            .field("host", &self.inner.host.name())
            .field("effect", &self.voice_effect())
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl CaptureManager {
    /// Creates a builder.
    pub fn builder() -> CaptureManagerBuilder {
        CaptureManagerBuilder::new()
    }

    pub(crate) fn from_parts(
        host: Arc<dyn CaptureHost>,
        config: CaptureConfig,
        effect: VoiceEffect,
        event_callback: Option<EventCallback>,
    ) -> Self {
        let (publisher, _) = watch::channel(CaptureSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                host,
                config,
                event_callback,
                effect: Mutex::new(effect),
                session: Mutex::new(None),
                acquiring: AtomicBool::new(false),
                next_session_id: AtomicU64::new(1),
                publisher: Arc::new(publisher),
            }),
        }
    }

    /// Acquires a stream and goes live with the selected voice effect.
    ///
    /// Returns `Ok(())` without doing anything if a session is already
    /// live. On failure the error is also published in the snapshot and no
    /// resource survives.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::AcquisitionInProgress`] if another `start()` is
    ///   still waiting on the host; the snapshot is left alone
    /// - [`CaptureError::PermissionDenied`] if the user declined
    /// - [`CaptureError::NoAudioTrack`] if the stream carries no audio
    /// - [`CaptureError::GraphConstruction`] if the graph or monitor could
    ///   not be set up
    /// - Any host error from device lookup or stream creation
    pub async fn start(&self) -> Result<(), CaptureError> {
        let inner = &self.inner;
        let Some(_guard) = AcquisitionGuard::try_acquire(&inner.acquiring) else {
            tracing::debug!("start() ignored: acquisition already in flight");
            return Err(CaptureError::AcquisitionInProgress);
        };
        if inner.session.lock().is_some() {
            return Ok(());
        }

        inner
            .publisher
            .send_if_modified(|snapshot| snapshot.error.take().is_some());

        match self.acquire().await {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.publish_failure(&e);
                Err(e)
            }
        }
    }

    async fn acquire(&self) -> Result<(), CaptureError> {
        let inner = &self.inner;
        let effect = *inner.effect.lock();

        let stream = inner.host.request_stream(inner.config.stream_request()).await?;
        // Dropping the stream on any early return stops its tracks
        let format = stream.audio_format().ok_or(CaptureError::NoAudioTrack)?;
        let monitor = inner
            .host
            .open_monitor(format)
            .await
            .map_err(|e| CaptureError::graph(format!("monitor output unavailable: {e}")))?;

        let id = inner.next_session_id.fetch_add(1, Ordering::SeqCst);
        let session = CaptureSession::assemble(
            id,
            stream,
            monitor,
            effect,
            &inner.config,
            Arc::clone(&inner.publisher),
            inner.event_callback.clone(),
        )?;
        let states = session.track_states();
        let format = session.format();

        {
            let mut slot = inner.session.lock();
            *slot = Some(session);
            inner.publisher.send_modify(|snapshot| {
                snapshot.is_live = true;
                snapshot.volume = 0.0;
                snapshot.error = None;
            });
        }

        let watchers = states
            .into_iter()
            .map(|state| {
                let weak: Weak<Inner> = Arc::downgrade(inner);
                tokio::spawn(async move {
                    state.ended().await;
                    // Teardown joins the device thread; keep it off the runtime workers.
                    // The blocking task runs to completion even after this watcher is aborted.
                    let _ = tokio::task::spawn_blocking(move || {
                        if let Some(inner) = weak.upgrade() {
                            if inner.teardown(Some(id), StopReason::TrackEnded) {
                                tracing::info!(session = id, "track ended; capture torn down");
                            }
                        }
                    })
                    .await;
                })
            })
            .collect::<Vec<_>>();
        match inner.session.lock().as_mut() {
            Some(session) if session.id() == id => session.attach_watchers(watchers),
            _ => watchers.iter().for_each(tokio::task::JoinHandle::abort),
        }

        tracing::info!(
            session = id,
            host = inner.host.name(),
            %effect,
            format = %format,
            "capture live"
        );
        inner.emit(CaptureEvent::SessionStarted {
            effect,
            sample_rate: format.sample_rate,
            channels: format.channels,
        });
        Ok(())
    }

    /// Tears down the live session. A no-op when idle; never suspends.
    ///
    /// Once this returns no further volume is published. The last error is
    /// kept, so after a failed [`start()`](Self::start) the status stays
    /// [`CaptureStatus::Failed`] rather than `Idle` until the next successful
    /// start.
    ///
    /// Releasing a cpal stream joins its device thread, which only has to
    /// drop the stream; the wait is short but it does block the caller.
    pub fn stop(&self) {
        if !self.inner.teardown(None, StopReason::Requested) {
            self.inner.publisher.send_if_modified(|snapshot| {
                let changed = snapshot.is_live || snapshot.volume > 0.0;
                snapshot.is_live = false;
                snapshot.volume = 0.0;
                changed
            });
        }
    }

    /// Stops when live, starts otherwise.
    ///
    /// # Errors
    ///
    /// Whatever [`start()`](Self::start) returns.
    pub async fn toggle(&self) -> Result<(), CaptureError> {
        if self.is_live() {
            self.stop();
            Ok(())
        } else {
            self.start().await
        }
    }

    /// Selects the effect for the next session.
    ///
    /// A live session keeps the effect it was built with; changing it
    /// emits [`CaptureEvent::VoiceEffectDeferred`] and takes effect after a
    /// restart.
    pub fn set_voice_effect(&self, effect: VoiceEffect) {
        let previous = std::mem::replace(&mut *self.inner.effect.lock(), effect);
        let active = self.inner.session.lock().as_ref().map(CaptureSession::effect);

        match active {
            Some(active) if active != effect => {
                tracing::info!(%active, requested = %effect, "voice effect applies after restart");
                self.inner.emit(CaptureEvent::VoiceEffectDeferred {
                    active,
                    requested: effect,
                });
            }
            _ if previous != effect => tracing::debug!(%effect, "voice effect selected"),
            _ => {}
        }
    }

    /// Effect the next session will use.
    pub fn voice_effect(&self) -> VoiceEffect {
        *self.inner.effect.lock()
    }

    /// Effect wired into the live session, if any.
    pub fn active_effect(&self) -> Option<VoiceEffect> {
        self.inner.session.lock().as_ref().map(CaptureSession::effect)
    }

    /// A receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<CaptureSnapshot> {
        self.inner.publisher.subscribe()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> CaptureSnapshot {
        self.inner.publisher.borrow().clone()
    }

    /// The current status.
    pub fn status(&self) -> CaptureStatus {
        self.inner.publisher.borrow().status()
    }

    /// Current level in `[0, 1]`.
    pub fn volume(&self) -> f32 {
        self.inner.publisher.borrow().volume
    }

    /// Returns `true` while a session is live.
    pub fn is_live(&self) -> bool {
        self.inner.publisher.borrow().is_live
    }

    /// Message of the last failed `start()`.
    pub fn error(&self) -> Option<String> {
        self.inner.publisher.borrow().error.clone()
    }

    /// Node kinds along the live signal path, source first.
    ///
    /// `None` when idle.
    pub fn signal_chain(&self) -> Option<Vec<NodeKind>> {
        self.inner
            .session
            .lock()
            .as_ref()
            .map(CaptureSession::signal_kinds)
    }

    /// Configuration sessions are built with.
    pub fn config(&self) -> &CaptureConfig {
        &self.inner.config
    }
}
