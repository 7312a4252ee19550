//! pducraft Core Library
//!
//! This crate provides the error taxonomy, decode/encode configuration and
//! wire constants shared by the pducraft codec crates.

pub mod config;
pub mod error;
pub mod types;

// Re-export commonly used types
pub use config::{DecodeConfig, EncodeConfig};
pub use error::{Error, Result};
pub use types::*;
