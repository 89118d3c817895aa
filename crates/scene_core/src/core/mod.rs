//! # Core Module
//!
//! Shared configuration and error types used by every subsystem of the
//! scene core.
//!
//! ## Organization
//!
//! - **Config**: map and camera settings loaded from TOML or RON
//! - **Error**: the crate-wide error type and its taxonomy

pub mod config;
pub mod error;

pub use config::{
    SceneCoreConfig,
    MapConfig,
    CameraConfig,
    Config,
    ConfigError,
};
pub use error::{CoreError, CoreResult, ErrorKind};
