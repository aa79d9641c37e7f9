//! Level analysis: turns the analyser's spectrum into a mouth-opening value.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::dsp::AnalyserHandle;
use crate::{CaptureConfig, CaptureSnapshot};

/// Normalized loudness of a byte spectrum.
///
/// Takes the root mean square of the bins, divides it by `sensitivity` and
/// clamps the result to 1. Empty input and non-positive sensitivity give 0.
///
/// ```
/// use voice_tap::level::compute_level;
///
/// assert_eq!(compute_level(&[0; 256], 100.0), 0.0);
/// assert_eq!(compute_level(&[50; 256], 100.0), 0.5);
/// assert_eq!(compute_level(&[255; 256], 100.0), 1.0);
/// ```
pub fn compute_level(bins: &[u8], sensitivity: f32) -> f32 {
    if bins.is_empty() || sensitivity.is_nan() || sensitivity <= 0.0 {
        return 0.0;
    }
    let sum: f64 = bins.iter().map(|&b| f64::from(b) * f64::from(b)).sum();
    let rms = (sum / bins.len() as f64).sqrt();
    ((rms / f64::from(sensitivity)) as f32).min(1.0)
}

/// Validity flag shared between a loop task and its owner.
#[derive(Debug, Clone)]
pub(crate) struct LoopToken(Arc<AtomicBool>);

impl LoopToken {
    pub(crate) fn new() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn is_valid(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn invalidate(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Owner side of a periodic task.
///
/// Cancelling invalidates the token before aborting the task, so a tick
/// already in flight sees the flag and publishes nothing.
#[derive(Debug)]
pub struct LoopHandle {
    token: LoopToken,
    task: Option<JoinHandle<()>>,
}

impl LoopHandle {
    pub(crate) fn new(token: LoopToken, task: JoinHandle<()>) -> Self {
        Self {
            token,
            task: Some(task),
        }
    }

    /// Returns `true` until cancelled.
    pub fn is_active(&self) -> bool {
        self.token.is_valid()
    }

    /// Stops the task. Idempotent.
    pub fn cancel(&mut self) {
        self.token.invalidate();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LoopHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Samples the analyser once per tick and publishes the level.
///
/// Each tick reads the byte spectrum, computes [`compute_level`] and writes
/// it into the snapshot, notifying subscribers only when the value changed.
/// Nothing is written unless the snapshot says the session is live and the
/// loop is still valid; both are checked under the channel's lock.
pub(crate) fn spawn_level_loop(
    analyser: AnalyserHandle,
    publisher: Arc<watch::Sender<CaptureSnapshot>>,
    config: &CaptureConfig,
) -> LoopHandle {
    let token = LoopToken::new();
    let task_token = token.clone();
    let sensitivity = config.sensitivity;
    let interval = config.tick_interval;

    let task = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut bins = Vec::with_capacity(analyser.frequency_bin_count());

        loop {
            ticker.tick().await;
            if !task_token.is_valid() {
                break;
            }

            analyser.byte_frequency_data(&mut bins);
            let volume = compute_level(&bins, sensitivity);

            publisher.send_if_modified(|snapshot| {
                if !task_token.is_valid() || !snapshot.is_live {
                    return false;
                }
                let changed = (snapshot.volume - volume).abs() > f32::EPSILON;
                snapshot.volume = volume;
                changed
            });
        }
        tracing::trace!("level loop finished");
    });

    LoopHandle::new(token, task)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dsp::Analyser;
    use std::time::Duration;

    #[test]
    fn test_silence_is_zero() {
        assert_eq!(compute_level(&[0; 256], 100.0), 0.0);
    }

    #[test]
    fn test_saturates_at_one() {
        assert_eq!(compute_level(&[255; 256], 100.0), 1.0);
        assert_eq!(compute_level(&[101; 8], 100.0), 1.0);
    }

    #[test]
    fn test_constant_bins() {
        assert!((compute_level(&[50; 256], 100.0) - 0.5).abs() < 1e-6);
        assert!((compute_level(&[25; 4], 50.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_rms_not_mean() {
        // Mean is 50 but RMS is sqrt(5000) ~ 70.7
        let level = compute_level(&[0, 100], 100.0);
        assert!((level - 0.7071).abs() < 1e-3, "level was {level}");
    }

    #[test]
    fn test_degenerate_inputs() {
        assert_eq!(compute_level(&[], 100.0), 0.0);
        assert_eq!(compute_level(&[200; 4], 0.0), 0.0);
        assert_eq!(compute_level(&[200; 4], f32::NAN), 0.0);
    }

    #[test]
    fn test_bounded_and_monotonic() {
        let mut previous = 0.0;
        for value in 0..=255u8 {
            let level = compute_level(&[value; 64], 100.0);
            assert!((0.0..=1.0).contains(&level));
            assert!(level >= previous);
            previous = level;
        }
    }

    fn loud_analyser() -> AnalyserHandle {
        let handle = AnalyserHandle::new(Analyser::new(&CaptureConfig::default()));
        let tone: Vec<f32> = (0..512)
            .map(|i| (std::f32::consts::TAU * 1875.0 * i as f32 / 48000.0).sin())
            .collect();
        handle.ingest(&tone);
        handle
    }

    #[tokio::test]
    async fn test_loop_publishes_while_live() {
        let (tx, rx) = watch::channel(CaptureSnapshot {
            is_live: true,
            ..Default::default()
        });
        let config = CaptureConfig {
            tick_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let handle = spawn_level_loop(loud_analyser(), Arc::new(tx), &config);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.borrow().volume > 0.0);
        assert!(handle.is_active());
    }

    #[tokio::test]
    async fn test_loop_is_silent_when_not_live() {
        let (tx, rx) = watch::channel(CaptureSnapshot::default());
        let config = CaptureConfig {
            tick_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let _handle = spawn_level_loop(loud_analyser(), Arc::new(tx), &config);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(rx.borrow().volume, 0.0);
    }

    #[tokio::test]
    async fn test_cancel_stops_publishing() {
        let (tx, mut rx) = watch::channel(CaptureSnapshot {
            is_live: true,
            ..Default::default()
        });
        let tx = Arc::new(tx);
        let config = CaptureConfig {
            tick_interval: Duration::from_millis(5),
            ..Default::default()
        };
        let mut handle = spawn_level_loop(loud_analyser(), tx.clone(), &config);
        tokio::time::sleep(Duration::from_millis(30)).await;

        handle.cancel();
        handle.cancel();
        assert!(!handle.is_active());
        tx.send_modify(|s| s.volume = 0.0);
        rx.borrow_and_update();

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!rx.has_changed().unwrap());
        assert_eq!(rx.borrow().volume, 0.0);
    }
}
