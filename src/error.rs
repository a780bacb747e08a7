use std::path::PathBuf;

use atlasfeed_codec::CodecError;
use atlasfeed_gpu::DeviceError;
use thiserror::Error;

/// Why a rectangle could not be placed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PackError {
    #[error("{width}x{height} does not fit a {page_width}x{page_height} page")]
    TooLarge {
        width: u32,
        height: u32,
        page_width: u32,
        page_height: u32,
    },
    #[error("Empty {width}x{height} rectangle")]
    Empty { width: u32, height: u32 },
    #[error("Pixel buffer holds {actual} bytes, expected {expected}")]
    PixelMismatch { expected: usize, actual: usize },
    #[error("No atlas page could be allocated: {0}")]
    Capacity(#[source] DeviceError),
}

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("Malformed pixel file: {0}")]
    Malformed(String),
}

/// Per-resource failures. These never leave the tick they happen in.
#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Source data missing for {0}")]
    Missing(String),
    #[error("Resource is {width}x{height}, pages are {page_width}x{page_height}")]
    Oversized {
        width: u32,
        height: u32,
        page_width: u32,
        page_height: u32,
    },
    #[error("Decoding {path} failed: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: DecodeError,
    },
    #[error("Unusable pixel data: {0}")]
    Malformed(PackError),
    #[error("No atlas space left: {0}")]
    Unplaced(#[source] DeviceError),
}

/// Failures that stop the coordinator from making progress.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Atlas capacity exhausted: {0}")]
    CapacityExhaustion(#[source] DeviceError),
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),
    #[error("Worker pool error: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Invalid value for {key}: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}
