use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("LZO error: {0}")]
    LzoError(#[from] minilzo_rs::Error),
    #[error("LZ4 error: {0}")]
    Lz4Error(#[from] lz4_flex::block::DecompressError),
    #[error("Unsupported FastLZ level {0}")]
    UnsupportedLevel(u8),
    #[error("Compressed stream ends early at byte {0}")]
    Truncated(usize),
    #[error("Back reference of {distance} bytes with only {available} decoded")]
    BadOffset { distance: usize, available: usize },
    #[error("Decompressed data exceeds {expected} bytes")]
    OutputOverrun { expected: usize },
    #[error("Decompressed {actual} bytes, expected {expected}")]
    LengthMismatch { expected: usize, actual: usize },
}
