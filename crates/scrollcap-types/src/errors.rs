use thiserror::Error;

pub type Result<T, E = ScrollCapError> = std::result::Result<T, E>;

/// Unified error type covering common failure scenarios across subsystems.
#[derive(Debug, Error)]
pub enum ScrollCapError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    #[error("viewport capture failed: {0}")]
    CaptureFailed(String),
    #[error("capture session contains no frames")]
    EmptySession,
    #[error("jpeg quality {0} outside the supported range 0.0..=1.0")]
    UnsupportedQuality(f32),
    #[error("encoding failed: {0}")]
    EncodingFailed(String),
    #[error("a capture session is already in flight")]
    SessionAlreadyActive,
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
