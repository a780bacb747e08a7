use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("No compatible graphics adapter")]
    NoAdapter,
    #[error("Device request failed: {0}")]
    RequestDevice(String),
    #[error("Out of GPU memory allocating {label}")]
    OutOfMemory { label: String },
    #[error("Invalid allocation of {label}: {reason}")]
    Validation { label: String, reason: String },
    #[error("Allocation limit of {limit} {kind} reached")]
    LimitReached { kind: &'static str, limit: usize },
}
