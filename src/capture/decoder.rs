use crate::{Error, Result};

#[cfg(not(any(feature = "fast-jpeg", feature = "baseline-jpeg")))]
compile_error!("enable the `fast-jpeg` or `baseline-jpeg` feature");

/// Packed RGB888 pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedImage {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl DecodedImage {
    pub const CHANNELS: usize = 3;

    pub fn byte_len(&self) -> usize {
        self.pixels.len()
    }
}

/// Decode a JPEG into RGB888.
pub fn decode_jpeg(data: &[u8]) -> Result<DecodedImage> {
    if data.is_empty() {
        return Err(Error::Decode("empty input".into()));
    }
    let image = decode_rgb(data)?;
    let expected = image.width as usize * image.height as usize * DecodedImage::CHANNELS;
    if image.width == 0 || image.height == 0 || image.pixels.is_empty() {
        return Err(Error::Decode("decoder produced no pixels".into()));
    }
    if image.pixels.len() != expected {
        return Err(Error::Decode(format!(
            "decoded {} bytes for {}x{} RGB, expected {expected}",
            image.pixels.len(),
            image.width,
            image.height
        )));
    }
    Ok(image)
}

#[cfg(feature = "fast-jpeg")]
fn decode_rgb(data: &[u8]) -> Result<DecodedImage> {
    let mut decoder = zune_jpeg::JpegDecoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| Error::Decode(format!("{e:?}")))?;
    let (width, height) = decoder
        .dimensions()
        .ok_or_else(|| Error::Decode("missing image dimensions".into()))?;
    // Grayscale sensors: expand luma to RGB
    let pixels = if pixels.len() == width * height {
        pixels.iter().flat_map(|&l| [l, l, l]).collect()
    } else {
        pixels
    };
    Ok(DecodedImage {
        pixels,
        width: width as u32,
        height: height as u32,
    })
}

#[cfg(all(feature = "baseline-jpeg", not(feature = "fast-jpeg")))]
fn decode_rgb(data: &[u8]) -> Result<DecodedImage> {
    use jpeg_decoder::{Decoder, PixelFormat};

    let mut decoder = Decoder::new(data);
    let pixels = decoder
        .decode()
        .map_err(|e| Error::Decode(e.to_string()))?;
    let info = decoder
        .info()
        .ok_or_else(|| Error::Decode("missing image info".into()))?;
    let pixels = match info.pixel_format {
        PixelFormat::RGB24 => pixels,
        // Grayscale sensors: expand luma to RGB
        PixelFormat::L8 => pixels.iter().flat_map(|&l| [l, l, l]).collect(),
        other => {
            return Err(Error::Decode(format!("unsupported pixel format {other:?}")));
        }
    };
    Ok(DecodedImage {
        pixels,
        width: u32::from(info.width),
        height: u32::from(info.height),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::synthetic::test_pattern;

    #[test]
    fn decodes_test_pattern() {
        let jpeg = test_pattern(64, 48, 90, 0).unwrap();
        let image = decode_jpeg(&jpeg).unwrap();
        assert_eq!((image.width, image.height), (64, 48));
        assert_eq!(image.byte_len(), 64 * 48 * 3);
    }

    #[test]
    fn rejects_empty_input() {
        assert!(matches!(decode_jpeg(&[]), Err(Error::Decode(_))));
    }

    #[test]
    fn rejects_garbage() {
        let garbage = vec![0x42u8; 512];
        assert!(matches!(decode_jpeg(&garbage), Err(Error::Decode(_))));
    }

    #[test]
    fn rejects_truncated_header() {
        let jpeg = test_pattern(32, 32, 90, 0).unwrap();
        assert!(decode_jpeg(&jpeg[..20]).is_err());
    }
}
