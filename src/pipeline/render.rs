//! Render loop: drains the capture buffer through the graph into the monitor.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::event::{emit, EventCallback};
use crate::graph::{AudioContext, RenderOutput};
use crate::level::{LoopHandle, LoopToken};
use crate::sink::Sink;
use crate::{CaptureConfig, CaptureEvent};

/// Reports monitor failures once per failing stretch instead of per block.
struct MonitorHealth {
    failing: bool,
}

impl MonitorHealth {
    fn new() -> Self {
        Self { failing: false }
    }

    /// Returns `true` when the sink just went from healthy to failing.
    fn record(&mut self, ok: bool) -> bool {
        let entered = !ok && !self.failing;
        if ok && self.failing {
            tracing::info!("monitor output recovered");
        }
        self.failing = !ok;
        entered
    }
}

struct RenderLoop {
    ctx: AudioContext,
    monitor: Arc<dyn Sink>,
    token: LoopToken,
    interval: Duration,
    health: MonitorHealth,
    event_callback: Option<EventCallback>,
    passes: u64,
}

impl RenderLoop {
    async fn run(mut self) {
        if let Err(e) = self.monitor.on_start().await {
            tracing::warn!(sink = self.monitor.name(), error = %e, "monitor failed to start");
            self.report(e.to_string());
        }

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.token.is_valid() && !self.ctx.is_closed() {
            ticker.tick().await;
            let output = self.ctx.render();
            self.deliver(output).await;
        }

        if let Err(e) = self.monitor.on_stop().await {
            tracing::debug!(sink = self.monitor.name(), error = %e, "monitor on_stop failed");
        }
        tracing::debug!(passes = self.passes, "render loop finished");
    }

    async fn deliver(&mut self, output: RenderOutput) {
        self.passes += 1;
        if output.dropped_frames > 0 {
            tracing::warn!(
                dropped_frames = output.dropped_frames,
                "capture buffer overflowed; render loop fell behind"
            );
            emit(
                self.event_callback.as_ref(),
                CaptureEvent::BufferOverflow {
                    dropped_frames: output.dropped_frames,
                },
            );
        }

        for block in &output.blocks {
            if !self.token.is_valid() {
                return;
            }
            match self.monitor.write(block).await {
                Ok(()) => {
                    self.health.record(true);
                }
                Err(e) => {
                    if self.health.record(false) {
                        tracing::warn!(sink = self.monitor.name(), error = %e, "monitor write failed");
                        self.report(e.to_string());
                    } else {
                        tracing::trace!(error = %e, "monitor write failed");
                    }
                }
            }
        }

        if self.passes % 500 == 0 {
            tracing::trace!(passes = self.passes, "render loop alive");
        }
    }

    fn report(&self, error: String) {
        emit(
            self.event_callback.as_ref(),
            CaptureEvent::MonitorError {
                sink_name: self.monitor.name().to_string(),
                error,
            },
        );
    }
}

/// Spawns the loop that renders `ctx` every `config.render_interval`.
///
/// The loop ends when its handle is cancelled or the context closes.
pub(crate) fn spawn_render_loop(
    ctx: AudioContext,
    monitor: Arc<dyn Sink>,
    config: &CaptureConfig,
    event_callback: Option<EventCallback>,
) -> LoopHandle {
    let token = LoopToken::new();
    let render = RenderLoop {
        ctx,
        monitor,
        token: token.clone(),
        interval: config.render_interval,
        health: MonitorHealth::new(),
        event_callback,
        passes: 0,
    };
    LoopHandle::new(token, tokio::spawn(render.run()))
}
