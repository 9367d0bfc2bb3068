//! Error types for cullflow

use thiserror::Error;

/// Main error type for the crate
#[derive(Debug, Error)]
pub enum Error {
    /// An object's pose or bounding box could not be resolved at
    /// registration time. The object is not registered.
    #[error("object cannot be added: {0}")]
    NotAddable(String),

    /// A configuration setter was called with an out-of-range value.
    #[error("invalid configuration: {0}")]
    Config(String),
}
