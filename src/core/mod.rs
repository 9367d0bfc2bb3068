//! Core types and utilities

pub mod camera;
pub mod clock;
pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::Config;
pub use error::Error;
pub use types::*;
