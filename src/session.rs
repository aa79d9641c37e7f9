//! The live resource bundle of one capture.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::dsp::{Analyser, AnalyserHandle};
use crate::event::EventCallback;
use crate::graph::{AudioContext, ChainBuilder, NodeId, NodeKind};
use crate::host::{MediaStream, StreamFormat, TrackState};
use crate::level::{spawn_level_loop, LoopHandle};
use crate::pipeline::{spawn_render_loop, CaptureBuffer};
use crate::sink::Sink;
use crate::{CaptureConfig, CaptureError, CaptureSnapshot, VoiceEffect};

/// Nodes wired for one session, in signal order.
#[derive(Debug, Clone)]
pub(crate) struct SessionNodes {
    pub(crate) source: NodeId,
    pub(crate) analyser: NodeId,
    pub(crate) gain: NodeId,
}

/// Everything a live capture holds.
///
/// Exists only between a successful acquisition and a teardown. Dropping it
/// cancels both loops, frees the graph and stops every track, in that order.
pub(crate) struct CaptureSession {
    id: u64,
    effect: VoiceEffect,
    format: StreamFormat,
    stream: MediaStream,
    ctx: AudioContext,
    chain: ChainBuilder,
    nodes: SessionNodes,
    level_loop: LoopHandle,
    render_loop: LoopHandle,
    watchers: Vec<JoinHandle<()>>,
}

impl CaptureSession {
    /// Wires `stream` through the graph and starts the loops.
    ///
    /// On error nothing survives: the context is closed and dropping the
    /// stream stops its tracks.
    pub(crate) fn assemble(
        id: u64,
        mut stream: MediaStream,
        monitor: Arc<dyn Sink>,
        effect: VoiceEffect,
        config: &CaptureConfig,
        publisher: Arc<watch::Sender<CaptureSnapshot>>,
        event_callback: Option<EventCallback>,
    ) -> Result<Self, CaptureError> {
        let format = stream.audio_format().ok_or(CaptureError::NoAudioTrack)?;
        let input = stream
            .take_audio_input()
            .ok_or(CaptureError::NoAudioTrack)?;

        let ctx = AudioContext::new(format.sample_rate, config.render_quantum);
        let analyser = AnalyserHandle::new(Analyser::new(config));
        let mut chain = ChainBuilder::new();

        let nodes = match wire(&ctx, &mut chain, input, analyser.clone(), effect, config) {
            Ok(nodes) => nodes,
            Err(e) => {
                ctx.close();
                return Err(e);
            }
        };
        tracing::debug!(
            session = id,
            %effect,
            format = %format,
            path = ?ctx.path_from(nodes.source),
            "capture graph wired"
        );

        let level_loop = spawn_level_loop(analyser, publisher, config);
        let render_loop = spawn_render_loop(ctx.clone(), monitor, config, event_callback);

        Ok(Self {
            id,
            effect,
            format,
            stream,
            ctx,
            chain,
            nodes,
            level_loop,
            render_loop,
            watchers: Vec::new(),
        })
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn effect(&self) -> VoiceEffect {
        self.effect
    }

    pub(crate) fn format(&self) -> StreamFormat {
        self.format
    }

    /// End-of-track handles of every track in the stream.
    pub(crate) fn track_states(&self) -> Vec<TrackState> {
        self.stream.track_states()
    }

    pub(crate) fn attach_watchers(&mut self, watchers: Vec<JoinHandle<()>>) {
        self.watchers.extend(watchers);
    }

    /// Source to destination, every node on the way.
    pub(crate) fn signal_path(&self) -> Vec<NodeId> {
        self.ctx.path_from(self.nodes.source)
    }

    pub(crate) fn signal_kinds(&self) -> Vec<NodeKind> {
        self.signal_path()
            .into_iter()
            .filter_map(|node| self.ctx.kind_of(node))
            .collect()
    }

    /// Stops everything that can publish or call back into the manager.
    ///
    /// The level loop goes first so no volume lands after this returns.
    pub(crate) fn cancel_loops(&mut self) {
        self.level_loop.cancel();
        self.render_loop.cancel();
        for watcher in self.watchers.drain(..) {
            watcher.abort();
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.cancel_loops();
        self.chain.release(&self.ctx);
        for node in [self.nodes.gain, self.nodes.analyser, self.nodes.source] {
            let _ = self.ctx.release(node);
        }
        self.ctx.close();
        self.stream.stop_all();
        tracing::debug!(session = self.id, "capture session released");
    }
}

/// Source → effect chain → analyser → monitor gain → destination.
fn wire(
    ctx: &AudioContext,
    chain: &mut ChainBuilder,
    input: CaptureBuffer,
    analyser: AnalyserHandle,
    effect: VoiceEffect,
    config: &CaptureConfig,
) -> Result<SessionNodes, CaptureError> {
    let source = ctx.create_source(input)?;
    let terminal = chain.build(ctx, source, effect)?;
    let analyser = ctx.create_analyser(analyser)?;
    let gain = ctx.create_gain(config.monitor_gain)?;

    ctx.connect(terminal, analyser)?;
    ctx.connect(analyser, gain)?;
    ctx.connect(gain, ctx.destination())?;

    Ok(SessionNodes {
        source,
        analyser,
        gain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{CaptureHost, MockHost, StreamRequest};
    use crate::DiscardSink;

    async fn assemble(host: &MockHost, effect: VoiceEffect) -> Result<CaptureSession, CaptureError> {
        let stream = host
            .request_stream(StreamRequest::display_capture())
            .await
            .unwrap();
        let (tx, _rx) = watch::channel(CaptureSnapshot::default());
        CaptureSession::assemble(
            1,
            stream,
            Arc::new(DiscardSink),
            effect,
            &CaptureConfig::default(),
            Arc::new(tx),
            None,
        )
    }

    #[tokio::test]
    async fn test_every_effect_wires_one_linear_path() {
        for effect in VoiceEffect::ALL {
            let host = MockHost::new();
            let session = assemble(&host, effect).await.unwrap();
            let path = session.signal_path();

            // source + stages + analyser + gain + destination
            assert_eq!(path.len(), effect.stages().len() + 4, "{effect}");
            assert_eq!(path.first(), Some(&session.nodes.source));
            assert_eq!(path.last(), Some(&session.ctx.destination()));
            let n = path.len();
            assert_eq!(path[n - 3], session.nodes.analyser);
            assert_eq!(path[n - 2], session.nodes.gain);
            assert_eq!(session.ctx.kind_of(path[n - 3]), Some(NodeKind::Analyser));
            // Nothing else lives in the context
            assert_eq!(session.ctx.node_count(), n);
        }
    }

    #[tokio::test]
    async fn test_assemble_without_audio_stops_tracks() {
        let host = MockHost::new().without_audio();
        let result = assemble(&host, VoiceEffect::Natural).await;
        assert!(matches!(result, Err(CaptureError::NoAudioTrack)));
        assert_eq!(host.last_stream().unwrap().live_track_count(), 0);
    }

    #[tokio::test]
    async fn test_context_runs_at_stream_rate() {
        let host = MockHost::new().with_format(44100, 1);
        let session = assemble(&host, VoiceEffect::Radio).await.unwrap();
        assert_eq!(session.format().sample_rate, 44100);
        assert_eq!(session.ctx.sample_rate(), 44100);
    }

    #[tokio::test]
    async fn test_drop_releases_graph_and_tracks() {
        let host = MockHost::new();
        let session = assemble(&host, VoiceEffect::Deep).await.unwrap();
        let ctx = session.ctx.clone();
        let handle = host.last_stream().unwrap();
        assert_eq!(handle.live_track_count(), 2);

        drop(session);
        assert!(ctx.is_closed());
        assert_eq!(ctx.node_count(), 0);
        assert_eq!(handle.live_track_count(), 0);
    }

    #[tokio::test]
    async fn test_cancel_loops_is_idempotent() {
        let host = MockHost::new();
        let mut session = assemble(&host, VoiceEffect::High).await.unwrap();
        session.cancel_loops();
        session.cancel_loops();
        assert!(!session.level_loop.is_active());
        assert!(!session.render_loop.is_active());
        assert_eq!(session.effect(), VoiceEffect::High);
        assert_eq!(session.id(), 1);
    }
}
