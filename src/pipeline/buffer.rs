//! Ordered frame accumulation for the active session.

use tracing::debug;

use crate::capture::Frame;

/// In-memory frame sequence; insertion order is capture order.
///
/// Unbounded: the only practical cap is available memory. Mutated solely
/// from the single capture/control flow, so there is no internal locking.
#[derive(Default)]
pub struct FrameBuffer {
    frames: Vec<Frame>,
    appended: u64,
    dropped: u64,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, frame: Frame) {
        self.frames.push(frame);
        self.appended += 1;
        metrics::counter!("frames_captured").increment(1);
        debug!(total = self.frames.len(), "frame appended");
    }

    /// Record a capture instant where the camera was not ready.
    pub fn note_dropped(&mut self) {
        self.dropped += 1;
        metrics::counter!("frames_dropped").increment(1);
    }

    pub fn count(&self) -> usize {
        self.frames.len()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    /// Hand the frames to the assembler, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<Frame> {
        std::mem::take(&mut self.frames)
    }

    /// (appended, dropped) counters for the buffer's lifetime.
    pub fn stats(&self) -> (u64, u64) {
        (self.appended, self.dropped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::test_frame;

    #[test]
    fn preserves_capture_order() {
        let mut buffer = FrameBuffer::new();
        for seq in 1..=5 {
            buffer.append(test_frame(seq, 4, 4, 0));
        }
        assert_eq!(buffer.count(), 5);

        let frames = buffer.take();
        let sequences: Vec<u64> = frames.iter().map(|f| f.meta.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3, 4, 5]);
        assert_eq!(buffer.count(), 0);
    }

    #[test]
    fn clear_empties_but_keeps_counters() {
        let mut buffer = FrameBuffer::new();
        buffer.append(test_frame(1, 4, 4, 0));
        buffer.note_dropped();
        buffer.clear();

        assert_eq!(buffer.count(), 0);
        assert_eq!(buffer.stats(), (1, 1));
    }
}
