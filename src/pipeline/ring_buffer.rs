//! Ring buffer wrapper feeding the graph's source node.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ringbuf::traits::{Consumer, Observer};

use crate::format::deinterleave;
use crate::host::StreamFormat;
use crate::AudioBlock;

/// Consumer side of a capture ring buffer, read one render quantum at a time.
///
/// The producer lives in the host's audio callback and pushes interleaved
/// i16 samples without ever blocking. Samples it could not push are counted
/// in the shared overflow counter.
pub struct CaptureBuffer {
    consumer: ringbuf::HeapCons<i16>,
    format: StreamFormat,
    dropped_samples: Arc<AtomicU64>,
    scratch: Vec<i16>,
}

impl std::fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBuffer")
            .field("format", &self.format)
            .field("available_frames", &self.available_frames())
            .finish_non_exhaustive()
    }
}

impl CaptureBuffer {
    /// Wraps a ring buffer consumer carrying samples in `format`.
    ///
    /// `dropped_samples` is incremented by the producer whenever the buffer
    /// is full.
    pub fn new(
        consumer: ringbuf::HeapCons<i16>,
        format: StreamFormat,
        dropped_samples: Arc<AtomicU64>,
    ) -> Self {
        Self {
            consumer,
            format,
            dropped_samples,
            scratch: Vec::new(),
        }
    }

    /// Format of the buffered samples.
    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Whole frames currently buffered.
    pub fn available_frames(&self) -> usize {
        self.consumer.occupied_len() / usize::from(self.format.channels.max(1))
    }

    /// Reads exactly `frames` frames, or returns `None` if not enough are
    /// buffered yet.
    pub fn try_read_block(&mut self, frames: usize, timestamp: Duration) -> Option<AudioBlock> {
        if frames == 0 || self.available_frames() < frames {
            return None;
        }

        let len = frames * usize::from(self.format.channels.max(1));
        self.scratch.clear();
        self.scratch.resize(len, 0);
        let read = self.consumer.pop_slice(&mut self.scratch);
        self.scratch.truncate(read);

        Some(AudioBlock::new(
            deinterleave(&self.scratch, self.format.channels),
            self.format.sample_rate,
            timestamp,
        ))
    }

    /// Frames dropped by the producer since the last call.
    pub fn take_dropped_frames(&self) -> u64 {
        self.dropped_samples.swap(0, Ordering::Relaxed) / u64::from(self.format.channels.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringbuf::traits::{Producer, Split};
    use ringbuf::HeapRb;

    fn buffer(capacity: usize, channels: u16) -> (ringbuf::HeapProd<i16>, CaptureBuffer) {
        let (producer, consumer) = HeapRb::<i16>::new(capacity).split();
        let format = StreamFormat {
            sample_rate: 48000,
            channels,
        };
        (
            producer,
            CaptureBuffer::new(consumer, format, Arc::new(AtomicU64::new(0))),
        )
    }

    #[test]
    fn test_reads_only_complete_blocks() {
        let (mut producer, mut buffer) = buffer(1024, 2);
        producer.push_slice(&[0i16; 200]);

        assert_eq!(buffer.available_frames(), 100);
        assert!(buffer.try_read_block(128, Duration::ZERO).is_none());

        producer.push_slice(&[0i16; 56]);
        let block = buffer.try_read_block(128, Duration::ZERO).unwrap();
        assert_eq!(block.frames(), 128);
        assert_eq!(block.channel_count(), 2);
        assert_eq!(buffer.available_frames(), 0);
    }

    #[test]
    fn test_block_is_deinterleaved() {
        let (mut producer, mut buffer) = buffer(64, 2);
        producer.push_slice(&[16384, -16384, 16384, -16384]);
        let block = buffer.try_read_block(2, Duration::ZERO).unwrap();
        assert_eq!(block.channels[0], vec![0.5, 0.5]);
        assert_eq!(block.channels[1], vec![-0.5, -0.5]);
    }

    #[test]
    fn test_take_dropped_frames_resets() {
        let (_producer, buffer) = buffer(64, 2);
        buffer.dropped_samples.store(20, Ordering::Relaxed);
        assert_eq!(buffer.take_dropped_frames(), 10);
        assert_eq!(buffer.take_dropped_frames(), 0);
    }
}
