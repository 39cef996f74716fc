//! Replay captured stills onto a canvas and encode them as one video.

use std::time::{Duration, Instant};

use bytes::Bytes;
use tracing::{info, instrument};

use crate::capture::decoder::{decode_still, Still};
use crate::capture::Frame;
use crate::error::{AssemblyError, EncoderError};

/// Encoded video produced from one completed session.
#[derive(Debug, Clone)]
pub struct AssembledVideo {
    pub data: Bytes,
    pub mime: &'static str,
    pub width: u32,
    pub height: u32,
    pub frame_count: usize,
    /// Always `frame_count / target_fps`, regardless of capture interval.
    pub duration: Duration,
}

/// Streaming encoder consuming canvas snapshots.
///
/// Injected into the assembler so the platform pipeline can be swapped
/// out and faked in tests.
pub trait VideoEncoder: Send {
    fn begin(&mut self, width: u32, height: u32, fps: u32) -> Result<(), EncoderError>;

    /// Push one canvas snapshot: tightly packed RGB24, `width * height * 3` bytes.
    fn push(&mut self, rgb: &[u8]) -> Result<(), EncoderError>;

    fn finish(&mut self) -> Result<Bytes, EncoderError>;

    /// Discard any partial encoder state after a failed replay.
    fn abort(&mut self);

    fn mime_type(&self) -> &'static str;
}

/// Turns an ordered frame sequence into a single playable video.
pub struct Assembler {
    encoder: Box<dyn VideoEncoder>,
    target_fps: u32,
}

impl Assembler {
    pub fn new(encoder: Box<dyn VideoEncoder>, target_fps: u32) -> Self {
        Self {
            encoder,
            target_fps: target_fps.max(1),
        }
    }

    /// Replay `frames` at the target rate and mux them into one video.
    ///
    /// Linear in frame count with a real-time hold of `1/target_fps` per
    /// frame: the encoder consumes the canvas as a live stream, so this
    /// is the one long-latency step of the pipeline. Decode and encode
    /// failures abort the whole replay; no partial video is produced.
    #[instrument(skip_all, fields(frames = frames.len(), fps = self.target_fps))]
    pub async fn assemble(&mut self, frames: &[Frame]) -> Result<AssembledVideo, AssemblyError> {
        if frames.is_empty() {
            return Err(AssemblyError::NoFrames);
        }
        let started = Instant::now();

        // Canvas dimensions come from the first frame. Later frames are
        // drawn unscaled at the origin and clipped; regions a smaller
        // frame does not cover keep the previous canvas contents.
        let first = decode_still(&frames[0].data)
            .map_err(|source| AssemblyError::FrameDecode { index: 0, source })?;
        let (width, height) = (first.width, first.height);
        let mut canvas = vec![0u8; width as usize * height as usize * 3];

        if let Err(e) = self.encoder.begin(width, height, self.target_fps) {
            self.encoder.abort();
            return Err(e.into());
        }

        let hold = Duration::from_secs_f64(1.0 / f64::from(self.target_fps));
        for (index, frame) in frames.iter().enumerate() {
            let still = match decode_still(&frame.data) {
                Ok(still) => still,
                Err(source) => {
                    self.encoder.abort();
                    return Err(AssemblyError::FrameDecode { index, source });
                }
            };
            blit(&mut canvas, width, height, &still);
            if let Err(e) = self.encoder.push(&canvas) {
                self.encoder.abort();
                return Err(e.into());
            }
            tokio::time::sleep(hold).await;
        }

        let data = match self.encoder.finish() {
            Ok(data) => data,
            Err(e) => {
                self.encoder.abort();
                return Err(e.into());
            }
        };

        let duration = Duration::from_secs_f64(frames.len() as f64 / f64::from(self.target_fps));
        metrics::histogram!("assembly_time_ms").record(started.elapsed().as_millis() as f64);
        info!(bytes = data.len(), ?duration, "assembled video");

        Ok(AssembledVideo {
            data,
            mime: self.encoder.mime_type(),
            width,
            height,
            frame_count: frames.len(),
            duration,
        })
    }
}

/// Draw a decoded still at (0,0), clipped to the canvas.
fn blit(canvas: &mut [u8], canvas_w: u32, canvas_h: u32, still: &Still) {
    let rows = still.height.min(canvas_h) as usize;
    let cols = still.width.min(canvas_w) as usize;
    let src_stride = still.width as usize * 3;
    let dst_stride = canvas_w as usize * 3;
    for row in 0..rows {
        let src = &still.pixels[row * src_stride..row * src_stride + cols * 3];
        canvas[row * dst_stride..row * dst_stride + cols * 3].copy_from_slice(src);
    }
}

#[cfg(test)]
pub(crate) mod testenc {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub(crate) struct EncState {
        pub begun: Option<(u32, u32, u32)>,
        pub pushes: Vec<usize>,
        pub finished: bool,
        pub aborted: bool,
    }

    /// In-memory encoder recording what the assembler fed it.
    #[derive(Clone, Default)]
    pub(crate) struct FakeEncoder {
        pub state: Arc<Mutex<EncState>>,
        pub fail_begin: bool,
        pub fail_push_at: Option<usize>,
    }

    impl VideoEncoder for FakeEncoder {
        fn begin(&mut self, width: u32, height: u32, fps: u32) -> Result<(), EncoderError> {
            if self.fail_begin {
                return Err(EncoderError::Init("begin refused".into()));
            }
            self.state.lock().unwrap().begun = Some((width, height, fps));
            Ok(())
        }

        fn push(&mut self, rgb: &[u8]) -> Result<(), EncoderError> {
            let mut state = self.state.lock().unwrap();
            if self.fail_push_at == Some(state.pushes.len()) {
                return Err(EncoderError::Push("push refused".into()));
            }
            state.pushes.push(rgb.len());
            Ok(())
        }

        fn finish(&mut self) -> Result<Bytes, EncoderError> {
            self.state.lock().unwrap().finished = true;
            Ok(Bytes::from_static(b"muxed"))
        }

        fn abort(&mut self) {
            self.state.lock().unwrap().aborted = true;
        }

        fn mime_type(&self) -> &'static str {
            "video/webm"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testenc::FakeEncoder;
    use super::*;
    use crate::capture::frame::test_frame;
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn empty_input_is_rejected() {
        let mut assembler = Assembler::new(Box::new(FakeEncoder::default()), 30);
        let err = assembler.assemble(&[]).await.unwrap_err();
        assert!(matches!(err, AssemblyError::NoFrames));
    }

    #[tokio::test(start_paused = true)]
    async fn replay_is_deterministic_in_duration() {
        let encoder = FakeEncoder::default();
        let state = Arc::clone(&encoder.state);
        let mut assembler = Assembler::new(Box::new(encoder), 30);

        let frames: Vec<_> = (1..=5).map(|seq| test_frame(seq, 6, 4, 64)).collect();
        let video = assembler.assemble(&frames).await.unwrap();

        assert_eq!(video.frame_count, 5);
        assert_eq!(video.duration, Duration::from_secs_f64(5.0 / 30.0));
        assert_eq!((video.width, video.height), (6, 4));
        assert_eq!(video.mime, "video/webm");
        assert_eq!(&video.data[..], b"muxed");

        let state = state.lock().unwrap();
        assert_eq!(state.begun, Some((6, 4, 30)));
        assert_eq!(state.pushes, vec![6 * 4 * 3; 5]);
        assert!(state.finished);
        assert!(!state.aborted);
    }

    #[tokio::test(start_paused = true)]
    async fn smaller_frames_keep_the_first_frames_canvas() {
        let encoder = FakeEncoder::default();
        let state = Arc::clone(&encoder.state);
        let mut assembler = Assembler::new(Box::new(encoder), 30);

        // First frame sets an 8x8 canvas; the second is smaller and is
        // drawn unscaled, so every push stays canvas-sized.
        let frames = vec![test_frame(1, 8, 8, 200), test_frame(2, 2, 2, 10)];
        let video = assembler.assemble(&frames).await.unwrap();

        assert_eq!((video.width, video.height), (8, 8));
        assert_eq!(state.lock().unwrap().pushes, vec![8 * 8 * 3; 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn decode_failure_aborts_without_output() {
        let encoder = FakeEncoder::default();
        let state = Arc::clone(&encoder.state);
        let mut assembler = Assembler::new(Box::new(encoder), 30);

        let mut frames = vec![test_frame(1, 4, 4, 0), test_frame(2, 4, 4, 0)];
        frames[1].data = Bytes::from_static(b"corrupt");

        let err = assembler.assemble(&frames).await.unwrap_err();
        assert!(matches!(err, AssemblyError::FrameDecode { index: 1, .. }));

        let state = state.lock().unwrap();
        assert!(state.aborted);
        assert!(!state.finished);
    }

    #[tokio::test(start_paused = true)]
    async fn encoder_failure_aborts_without_output() {
        let encoder = FakeEncoder {
            fail_push_at: Some(2),
            ..FakeEncoder::default()
        };
        let state = Arc::clone(&encoder.state);
        let mut assembler = Assembler::new(Box::new(encoder), 30);

        let frames: Vec<_> = (1..=4).map(|seq| test_frame(seq, 4, 4, 0)).collect();
        let err = assembler.assemble(&frames).await.unwrap_err();
        assert!(matches!(err, AssemblyError::Encoder(_)));

        let state = state.lock().unwrap();
        assert!(state.aborted);
        assert!(!state.finished);
    }
}
