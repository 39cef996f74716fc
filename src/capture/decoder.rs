use jpeg_decoder::Decoder;

use crate::error::StillDecodeError;

/// Decoded still: tightly packed RGB24 pixels.
#[derive(Debug)]
pub struct Still {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Decode a captured JPEG still back into RGB pixels for the replay canvas.
pub fn decode_still(data: &[u8]) -> Result<Still, StillDecodeError> {
    let mut decoder = Decoder::new(data);
    let pixels = decoder.decode()?;
    let info = decoder.info().ok_or(StillDecodeError::MissingInfo)?;
    match info.pixel_format {
        jpeg_decoder::PixelFormat::RGB24 => Ok(Still {
            pixels,
            width: u32::from(info.width),
            height: u32::from(info.height),
        }),
        other => Err(StillDecodeError::UnsupportedLayout(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::test_frame;

    #[test]
    fn decodes_a_captured_still() {
        let frame = test_frame(1, 6, 4, 128);
        let still = decode_still(&frame.data).unwrap();
        assert_eq!(still.width, 6);
        assert_eq!(still.height, 4);
        assert_eq!(still.pixels.len(), 6 * 4 * 3);
    }

    #[test]
    fn rejects_garbage_bytes() {
        let err = decode_still(b"definitely not a jpeg").unwrap_err();
        assert!(matches!(err, StillDecodeError::Jpeg(_)));
    }
}
