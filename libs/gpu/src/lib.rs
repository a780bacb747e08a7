pub mod buffer;
pub mod dev;
pub mod device;
pub mod error;
pub mod tex;

#[cfg(any(test, feature = "test-helpers"))]
pub mod recording;

pub use device::UploadDevice;
pub use error::DeviceError;
