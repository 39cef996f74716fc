pub mod assemble;
pub mod buffer;
pub mod clock;

#[cfg(feature = "gstreamer-pipeline")]
pub mod encoder;

pub use assemble::{AssembledVideo, Assembler, VideoEncoder};
pub use buffer::FrameBuffer;
pub use clock::CaptureClock;

#[cfg(feature = "gstreamer-pipeline")]
pub use encoder::GstEncoder;
