// ============================================================================
// error.rs — flockd
// Unified error type for the flocking engine.
// ============================================================================

use thiserror::Error;

/// Main error type for flock operations.
#[derive(Error, Debug)]
pub enum FlockError {
    /// Caller passed an out-of-range index or an unusable value.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No GPU adapter could be acquired for the compute substrate.
    #[error("No compatible GPU adapter found")]
    NoAdapter,

    /// The adapter lacks something the kernels need (e.g. compute shaders).
    #[error("GPU adapter unsupported: {0}")]
    UnsupportedAdapter(String),

    /// The GPU device could not be created.
    #[error("Failed to create GPU device: {0}")]
    DeviceCreation(#[from] wgpu::RequestDeviceError),

    /// A GPU -> host transfer failed or returned malformed data.
    #[error("Readback failed: {0}")]
    Readback(String),

    /// The viewer pose needed for analytics is not available.
    #[error("Viewer pose unavailable: {0}")]
    PoseUnavailable(String),

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result alias used across the crate.
pub type FlockResult<T> = Result<T, FlockError>;

impl FlockError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        FlockError::InvalidArgument(msg.into())
    }
}
