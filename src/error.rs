use thiserror::Error;

/// Errors that can occur when tracking VAST playback events
#[derive(Error, Debug)]
pub enum VastError {
    #[error("No adVerifications provided")]
    NoAdVerifications,

    #[error("No vendor provided, unable to find associated verificationNotExecuted")]
    MissingVendor,

    #[error("No associated verification element found for vendor: {0}")]
    VendorNotFound(String),

    #[error("Unknown tracking event: {0}")]
    UnknownEvent(String),

    #[error("Failed to read file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to decode ad: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, VastError>;
