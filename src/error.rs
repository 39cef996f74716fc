//! Error taxonomy for the capture-to-video pipeline.
//!
//! Every error here is terminal for the current session; nothing is
//! retried automatically. The caller surfaces the message and may start
//! a new session afterwards.

use thiserror::Error;

use crate::capture::frame::PixelFormat;

/// Camera device failures.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera device error: {0}")]
    Io(#[from] std::io::Error),
    #[error("device does not support video capture")]
    NotACaptureDevice,
    #[error("unsupported pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("no suitable capture device found")]
    NoDevice,
    #[error("device produced no decodable frame")]
    NoFrame,
    #[error("failed to encode still image: {0}")]
    StillEncode(#[from] image::ImageError),
}

/// Failures while decoding a captured still back into pixels.
#[derive(Debug, Error)]
pub enum StillDecodeError {
    #[error("invalid JPEG data: {0}")]
    Jpeg(#[from] jpeg_decoder::Error),
    #[error("unsupported decoded pixel layout {0:?}")]
    UnsupportedLayout(jpeg_decoder::PixelFormat),
    #[error("decoder produced no image info")]
    MissingInfo,
}

/// Failures inside the underlying video encode pipeline.
#[derive(Debug, Error)]
pub enum EncoderError {
    #[error("encoder initialization failed: {0}")]
    Init(String),
    #[error("encoder rejected frame: {0}")]
    Push(String),
    #[error("encoder finalization failed: {0}")]
    Finalize(String),
}

/// Failures while assembling frames into a video. Both decode and
/// encode failures abort the replay; no partial output survives.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("no frames to assemble")]
    NoFrames,
    #[error("frame {index} could not be decoded")]
    FrameDecode {
        index: usize,
        #[source]
        source: StillDecodeError,
    },
    #[error(transparent)]
    Encoder(#[from] EncoderError),
}

/// Session-level failures surfaced to the caller.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no camera attached to the session")]
    DeviceUnavailable,
    #[error("camera has not delivered a frame yet")]
    DeviceNotReady,
    #[error("not enough frames captured: got {got}, need {need}")]
    InsufficientFrames { got: usize, need: usize },
    #[error("interval must be at least 1 second, got {0}")]
    InvalidInterval(u32),
    #[error("session is not idle")]
    NotIdle,
    #[error(transparent)]
    Assembly(#[from] AssemblyError),
}

/// Failures while publishing a finished recording.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upload rejected ({status}): {error}")]
    Rejected {
        status: reqwest::StatusCode,
        error: String,
        details: Option<String>,
    },
}
