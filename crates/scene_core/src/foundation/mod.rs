//! Foundation module - Core utilities and types
//!
//! This module provides fundamental utilities used throughout the crate:
//! - Math types and operations
//! - Binary scene codec
//! - Frame counting
//! - Logging utilities

pub mod math;
pub mod codec;
pub mod time;
pub mod logging;
