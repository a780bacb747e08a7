//! Block decompression behind one narrow interface.
//!
//! Callers know how large the decompressed data must be, so every codec is
//! given the expected length and fails rather than returning a short or
//! oversized buffer.

pub mod error;
pub mod fastlz;

use minilzo_rs::LZO;
use once_cell::sync::OnceCell;

pub use error::CodecError;

pub trait Codec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Decompress `input` into exactly `expected_len` bytes.
    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FastLz;

impl Codec for FastLz {
    fn name(&self) -> &'static str {
        "fastlz"
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        fastlz::decompress(input, expected_len)
    }
}

/// LZ4 block format (no frame header).
#[derive(Debug, Clone, Copy, Default)]
pub struct Lz4;

impl Codec for Lz4 {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        let data = lz4_flex::block::decompress(input, expected_len)?;
        check_len(data, expected_len)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Lzo;

impl Codec for Lzo {
    fn name(&self) -> &'static str {
        "lzo"
    }

    fn decompress(&self, input: &[u8], expected_len: usize) -> Result<Vec<u8>, CodecError> {
        static LZO_INSTANCE: OnceCell<LZO> = OnceCell::new();
        let lzo = LZO_INSTANCE.get_or_try_init(LZO::init)?;
        let data = lzo.decompress_safe(input, expected_len)?;
        check_len(data, expected_len)
    }
}

fn check_len(data: Vec<u8>, expected_len: usize) -> Result<Vec<u8>, CodecError> {
    if data.len() == expected_len {
        Ok(data)
    } else {
        Err(CodecError::LengthMismatch {
            expected: expected_len,
            actual: data.len(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecKind {
    FastLz,
    Lz4,
    Lzo,
}

impl CodecKind {
    /// Pick a codec from a file extension, ignoring case.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "flz" | "fastlz" => Some(Self::FastLz),
            "lz4" => Some(Self::Lz4),
            "lzo" | "chunk" => Some(Self::Lzo),
            _ => None,
        }
    }

    pub fn codec(self) -> &'static dyn Codec {
        match self {
            Self::FastLz => &FastLz,
            Self::Lz4 => &Lz4,
            Self::Lzo => &Lzo,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        (0..4096u32).map(|i| (i % 7 + i / 512) as u8).collect()
    }

    #[test]
    fn lz4_block_decompresses() {
        let data = sample();
        let compressed = lz4_flex::block::compress(&data);
        assert_eq!(Lz4.decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn lzo_decompresses() {
        let data = sample();
        let mut lzo = LZO::init().unwrap();
        let compressed = lzo.compress(&data).unwrap();
        assert_eq!(Lzo.decompress(&compressed, data.len()).unwrap(), data);
    }

    #[test]
    fn lz4_rejects_wrong_length() {
        let data = sample();
        let compressed = lz4_flex::block::compress(&data);
        assert!(Lz4.decompress(&compressed, data.len() - 1).is_err());
    }

    #[test]
    fn extension_selects_codec() {
        assert_eq!(CodecKind::from_extension("LZ4"), Some(CodecKind::Lz4));
        assert_eq!(CodecKind::from_extension("chunk"), Some(CodecKind::Lzo));
        assert_eq!(CodecKind::from_extension("flz"), Some(CodecKind::FastLz));
        assert_eq!(CodecKind::from_extension("png"), None);
        assert_eq!(CodecKind::FastLz.codec().name(), "fastlz");
    }
}
