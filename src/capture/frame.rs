use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// One captured still image. The JPEG payload is immutable and can be
/// shared without copying.
#[derive(Clone)]
pub struct Frame {
    /// Encoded still (JPEG) bytes
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    /// Capture instant, for inter-capture gap diagnostics
    pub captured_at: Instant,
}

/// Pixel formats the camera can deliver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    Mjpeg,
    Yuyv4,
    Rgb24,
}

#[cfg(test)]
pub(crate) fn test_frame(sequence: u64, width: u32, height: u32, shade: u8) -> Frame {
    use image::codecs::jpeg::JpegEncoder;
    use image::ExtendedColorType;

    let rgb = vec![shade; (width * height * 3) as usize];
    let mut jpeg = Vec::new();
    JpegEncoder::new_with_quality(&mut jpeg, 90)
        .encode(&rgb, width, height, ExtendedColorType::Rgb8)
        .unwrap();
    Frame {
        data: Bytes::from(jpeg),
        meta: Arc::new(FrameMetadata {
            sequence,
            width,
            height,
            captured_at: Instant::now(),
        }),
    }
}
