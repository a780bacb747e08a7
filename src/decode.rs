use std::fs::OpenOptions;
use std::path::Path;

use atlasfeed_codec::CodecKind;

use crate::error::DecodeError;

/// RGBA8 pixels with tightly packed rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPixels {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Turns a file on disk into pixels. Called from worker threads.
pub trait ResourceDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<DecodedPixels, DecodeError>;
}

/// Any format the `image` crate was built with.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageDecoder;

impl ResourceDecoder for ImageDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedPixels, DecodeError> {
        let image = image::open(path)?.into_rgba8();
        let (width, height) = image.dimensions();
        Ok(DecodedPixels {
            pixels: image.into_raw(),
            width,
            height,
        })
    }
}

/// Compressed raw pixel files.
///
/// Layout: `[u32 compressed_len][u32 raw_len][payload]`, little endian. When
/// both lengths agree the payload is stored as is. The raw bytes are
/// `[u32 width][u32 height]` followed by RGBA8 rows.
#[derive(Debug, Clone, Copy)]
pub struct PackedPixelDecoder {
    codec: CodecKind,
}

impl PackedPixelDecoder {
    const HEADER_LEN: usize = 8;
    /// Largest raw payload accepted: the header plus a 16384x16384 page.
    const MAX_RAW_LEN: usize = Self::HEADER_LEN + (16384 * 16384 * 4);

    pub fn new(codec: CodecKind) -> Self {
        Self { codec }
    }

    pub fn decode_bytes(&self, data: &[u8]) -> Result<DecodedPixels, DecodeError> {
        let compressed_len = read_u32(data, 0)? as usize;
        let raw_len = read_u32(data, 4)? as usize;
        let payload = data
            .get(Self::HEADER_LEN..Self::HEADER_LEN + compressed_len)
            .ok_or_else(|| {
                DecodeError::Malformed(format!(
                    "payload of {compressed_len} bytes, file has {}",
                    data.len().saturating_sub(Self::HEADER_LEN)
                ))
            })?;

        if raw_len > Self::MAX_RAW_LEN {
            return Err(DecodeError::Malformed(format!(
                "raw length {raw_len} exceeds {}",
                Self::MAX_RAW_LEN
            )));
        }

        let raw = if compressed_len == raw_len {
            payload.to_vec()
        } else {
            self.codec.codec().decompress(payload, raw_len)?
        };

        let width = read_u32(&raw, 0)?;
        let height = read_u32(&raw, 4)?;
        let pixels = &raw[Self::HEADER_LEN..];
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|area| area.checked_mul(4))
            .ok_or_else(|| DecodeError::Malformed(format!("{width}x{height} is too large")))?;
        if pixels.len() != expected {
            return Err(DecodeError::Malformed(format!(
                "{width}x{height} needs {expected} pixel bytes, found {}",
                pixels.len()
            )));
        }

        Ok(DecodedPixels {
            pixels: pixels.to_vec(),
            width,
            height,
        })
    }
}

impl ResourceDecoder for PackedPixelDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedPixels, DecodeError> {
        let file = OpenOptions::new().read(true).write(false).open(path)?;
        // The mapping only lives for this call and is never written through.
        let mapping = unsafe { memmap2::Mmap::map(&file)? };
        self.decode_bytes(&mapping[..])
    }
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, DecodeError> {
    data.get(offset..offset + 4)
        .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
        .map(u32::from_le_bytes)
        .ok_or_else(|| DecodeError::Malformed(format!("truncated at byte {offset}")))
}

/// Picks a decoder from the file extension: known compression extensions go
/// through [`PackedPixelDecoder`], everything else through [`ImageDecoder`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtensionDecoder;

impl ResourceDecoder for ExtensionDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedPixels, DecodeError> {
        match path
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(CodecKind::from_extension)
        {
            Some(codec) => PackedPixelDecoder::new(codec).decode(path),
            None => ImageDecoder.decode(path),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A 2x1 image: red then green.
    fn raw_image() -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&2u32.to_le_bytes());
        raw.extend_from_slice(&1u32.to_le_bytes());
        raw.extend_from_slice(&[255, 0, 0, 255, 0, 255, 0, 255]);
        raw
    }

    fn framed(compressed: &[u8], raw_len: usize) -> Vec<u8> {
        let mut data = Vec::new();
        data.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        data.extend_from_slice(&(raw_len as u32).to_le_bytes());
        data.extend_from_slice(compressed);
        data
    }

    #[test]
    fn fastlz_file_decodes() {
        let raw = raw_image();
        // One level 1 literal run covering all 16 bytes.
        let mut compressed = vec![raw.len() as u8 - 1];
        compressed.extend_from_slice(&raw);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("world_0_0.flz");
        std::fs::write(&path, framed(&compressed, raw.len())).unwrap();

        let decoded = ExtensionDecoder.decode(&path).unwrap();
        assert_eq!((decoded.width, decoded.height), (2, 1));
        assert_eq!(decoded.pixels, raw[8..].to_vec());
    }

    #[test]
    fn equal_lengths_mean_stored() {
        let raw = raw_image();
        let decoded = PackedPixelDecoder::new(CodecKind::Lz4)
            .decode_bytes(&framed(&raw, raw.len()))
            .unwrap();
        assert_eq!(decoded.pixels, raw[8..].to_vec());
    }

    #[test]
    fn inconsistent_files_are_malformed() {
        let decoder = PackedPixelDecoder::new(CodecKind::FastLz);
        assert!(matches!(
            decoder.decode_bytes(&[1, 0, 0]),
            Err(DecodeError::Malformed(_))
        ));

        let mut raw = raw_image();
        raw[0] = 3;
        assert!(matches!(
            decoder.decode_bytes(&framed(&raw, raw.len())),
            Err(DecodeError::Malformed(_))
        ));

        let mut truncated = framed(&raw_image(), 16);
        truncated.truncate(12);
        assert!(matches!(
            decoder.decode_bytes(&truncated),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn huge_dimensions_are_malformed() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&u32::MAX.to_le_bytes());
        raw.extend_from_slice(&u32::MAX.to_le_bytes());
        let decoder = PackedPixelDecoder::new(CodecKind::FastLz);
        assert!(matches!(
            decoder.decode_bytes(&framed(&raw, raw.len())),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn huge_raw_length_is_rejected_before_decompressing() {
        let decoder = PackedPixelDecoder::new(CodecKind::Lz4);
        let data = framed(&[0x00, 0x00], u32::MAX as usize);
        assert!(matches!(
            decoder.decode_bytes(&data),
            Err(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn corrupt_payload_is_a_codec_error() {
        let decoder = PackedPixelDecoder::new(CodecKind::FastLz);
        // Back reference reaching before the first decoded byte.
        assert!(matches!(
            decoder.decode_bytes(&framed(&[0x00, b'a', 0xA0, 0x05], 16)),
            Err(DecodeError::Codec(_))
        ));
    }

    #[test]
    fn png_decodes_to_rgba() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sprite.png");
        image::RgbImage::from_pixel(3, 2, image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let decoded = ExtensionDecoder.decode(&path).unwrap();
        assert_eq!((decoded.width, decoded.height), (3, 2));
        assert_eq!(decoded.pixels.len(), 24);
        assert_eq!(&decoded.pixels[..4], &[10, 20, 30, 255]);
    }

    #[test]
    fn missing_file_is_io() {
        assert!(matches!(
            ImageDecoder.decode(Path::new("/nonexistent/atlasfeed.png")),
            Err(DecodeError::Image(_)) | Err(DecodeError::Io(_))
        ));
        assert!(matches!(
            PackedPixelDecoder::new(CodecKind::Lzo).decode(Path::new("/nonexistent/a.chunk")),
            Err(DecodeError::Io(_))
        ));
    }
}
