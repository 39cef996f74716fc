//! Camera sources feeding the capture pipeline.

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use tracing::{debug, info};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::error::CameraError;
use crate::CaptureConfig;

/// How many frames to pull before giving up on a device that never
/// produces a decodable still.
const WARM_UP_ATTEMPTS: u32 = 30;

/// A live camera owned exclusively by the active session.
///
/// `snapshot` returning `Ok(None)` means the device was momentarily not
/// ready; callers treat that as a dropped frame, not a failure.
pub trait CameraSource: Send + 'static {
    /// True once the device has delivered a first decodable frame.
    fn is_ready(&self) -> bool;

    /// Grab the current live frame and encode it as a JPEG still.
    fn snapshot(&mut self) -> Result<Option<Frame>, CameraError>;

    /// Stop all underlying hardware tracks.
    fn release(&mut self);
}

/// V4L2-backed camera with memory-mapped streaming.
pub struct V4l2Camera {
    device: Device,
    stream: Option<MmapStream<'static>>,
    config: CaptureConfig,
    sequence: u64,
    delivered_first: bool,
}

impl V4l2Camera {
    pub fn new(config: CaptureConfig) -> Result<Self, CameraError> {
        info!("opening camera: {:?}", config.device);

        let device = Device::with_path(&config.device.path)?;

        let caps = device.query_caps()?;
        info!("device: {} ({})", caps.card, caps.driver);

        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CameraError::NotACaptureDevice);
        }

        let mut fmt = device.format()?;
        fmt.width = config.width;
        fmt.height = config.height;
        fmt.fourcc = match config.device.format {
            PixelFormat::Mjpeg => FourCC::new(b"MJPG"),
            PixelFormat::Yuyv4 => FourCC::new(b"YUYV"),
            other => return Err(CameraError::UnsupportedFormat(other)),
        };
        device.set_format(&fmt)?;

        Ok(Self {
            device,
            stream: None,
            config,
            sequence: 0,
            delivered_first: false,
        })
    }

    /// Start streaming with memory-mapped buffers.
    pub fn start_stream(&mut self) -> Result<(), CameraError> {
        let stream =
            MmapStream::with_buffers(&self.device, Type::VideoCapture, self.config.buffer_count)?;
        self.stream = Some(stream);
        info!(
            "capture stream started with {} buffers",
            self.config.buffer_count
        );
        Ok(())
    }

    /// Pull frames until the device produces a decodable one, so the
    /// session's readiness gate reflects reality.
    pub fn warm_up(&mut self) -> Result<(), CameraError> {
        if self.stream.is_none() {
            self.start_stream()?;
        }
        for _ in 0..WARM_UP_ATTEMPTS {
            if self.delivered_first {
                return Ok(());
            }
            self.snapshot()?;
        }
        if self.delivered_first {
            Ok(())
        } else {
            Err(CameraError::NoFrame)
        }
    }
}

impl CameraSource for V4l2Camera {
    fn is_ready(&self) -> bool {
        self.stream.is_some() && self.delivered_first
    }

    fn snapshot(&mut self) -> Result<Option<Frame>, CameraError> {
        let captured_at = Instant::now();

        let stream = match self.stream.as_mut() {
            Some(stream) => stream,
            None => return Ok(None), // not streaming yet
        };

        let (buf, _meta) = match stream.next() {
            Ok(pair) => pair,
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let data = match encode_still(&self.config, buf)? {
            Some(data) => data,
            None => return Ok(None),
        };

        self.sequence += 1;
        self.delivered_first = true;

        let frame = Frame {
            data,
            meta: Arc::new(FrameMetadata {
                sequence: self.sequence,
                width: self.config.width,
                height: self.config.height,
                captured_at,
            }),
        };
        debug!(
            sequence = frame.meta.sequence,
            bytes = frame.data.len(),
            "captured still"
        );
        Ok(Some(frame))
    }

    fn release(&mut self) {
        if self.stream.take().is_some() {
            info!("camera stream released");
        }
        self.delivered_first = false;
    }
}

/// Turn one raw camera buffer into a JPEG still.
///
/// MJPEG buffers already are JPEG; anything else is converted to RGB
/// and re-encoded. A truncated buffer counts as a transient gap.
fn encode_still(config: &CaptureConfig, buf: &[u8]) -> Result<Option<Bytes>, CameraError> {
    match config.device.format {
        PixelFormat::Mjpeg => {
            if buf.len() < 2 || buf[..2] != [0xFF, 0xD8] {
                return Ok(None);
            }
            Ok(Some(Bytes::copy_from_slice(buf)))
        }
        PixelFormat::Yuyv4 => {
            let expected = (config.width * config.height * 2) as usize;
            if buf.len() < expected {
                return Ok(None);
            }
            let rgb = yuyv_to_rgb(buf, config.width, config.height);
            let mut jpeg = Vec::new();
            JpegEncoder::new_with_quality(&mut jpeg, config.jpeg_quality).encode(
                &rgb,
                config.width,
                config.height,
                ExtendedColorType::Rgb8,
            )?;
            Ok(Some(Bytes::from(jpeg)))
        }
        PixelFormat::Rgb24 => {
            let expected = (config.width * config.height * 3) as usize;
            if buf.len() < expected {
                return Ok(None);
            }
            let mut jpeg = Vec::new();
            JpegEncoder::new_with_quality(&mut jpeg, config.jpeg_quality).encode(
                &buf[..expected],
                config.width,
                config.height,
                ExtendedColorType::Rgb8,
            )?;
            Ok(Some(Bytes::from(jpeg)))
        }
    }
}

/// YUYV 4:2:2 to packed RGB24 (BT.601).
fn yuyv_to_rgb(buf: &[u8], width: u32, height: u32) -> Vec<u8> {
    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in buf.chunks_exact(4) {
        let y0 = f32::from(chunk[0]);
        let u = f32::from(chunk[1]) - 128.0;
        let y1 = f32::from(chunk[2]);
        let v = f32::from(chunk[3]) - 128.0;
        for y in [y0, y1] {
            let r = y + 1.402 * v;
            let g = y - 0.344_136 * u - 0.714_136 * v;
            let b = y + 1.772 * u;
            rgb.push(r.clamp(0.0, 255.0) as u8);
            rgb.push(g.clamp(0.0, 255.0) as u8);
            rgb.push(b.clamp(0.0, 255.0) as u8);
        }
    }
    rgb.truncate((width * height * 3) as usize);
    rgb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::FoundDevice;

    fn config(format: PixelFormat, width: u32, height: u32) -> CaptureConfig {
        CaptureConfig {
            device: FoundDevice::new("/dev/video0".into(), format),
            width,
            height,
            buffer_count: 4,
            jpeg_quality: 85,
        }
    }

    #[test]
    fn yuyv_gray_converts_to_gray_rgb() {
        // Y=128, U=V=128 is mid gray with no chroma
        let buf = vec![128u8; 4 * 2 * 2];
        let rgb = yuyv_to_rgb(&buf, 4, 2);
        assert_eq!(rgb.len(), 4 * 2 * 3);
        assert!(rgb.iter().all(|&c| c == 128));
    }

    #[test]
    fn mjpeg_buffers_pass_through() {
        let frame = crate::capture::frame::test_frame(1, 4, 4, 10);
        let cfg = config(PixelFormat::Mjpeg, 4, 4);
        let out = encode_still(&cfg, &frame.data).unwrap().unwrap();
        assert_eq!(out, frame.data);
    }

    #[test]
    fn truncated_mjpeg_buffer_is_a_gap() {
        let cfg = config(PixelFormat::Mjpeg, 4, 4);
        assert!(encode_still(&cfg, &[0x00]).unwrap().is_none());
    }

    #[test]
    fn yuyv_buffer_is_reencoded_as_jpeg() {
        let cfg = config(PixelFormat::Yuyv4, 4, 2);
        let buf = vec![128u8; 4 * 2 * 2];
        let out = encode_still(&cfg, &buf).unwrap().unwrap();
        assert_eq!(&out[..2], &[0xFF, 0xD8]);
        let still = crate::capture::decoder::decode_still(&out).unwrap();
        assert_eq!((still.width, still.height), (4, 2));
    }
}
