//! Error types for the capillary duty-cycle core

use thiserror::Error;

/// Main error type for capillary-core operations
#[derive(Error, Debug)]
pub enum CapillaryError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Node is not running")]
    NotRunning,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for capillary-core operations
pub type Result<T> = std::result::Result<T, CapillaryError>;
