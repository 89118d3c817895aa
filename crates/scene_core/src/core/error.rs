//! Crate-wide error type
//!
//! Not-found conditions are not errors here: lookups return `Option` and
//! deallocating an unknown component is a no-op. What remains are
//! configuration mistakes, call-order violations and broken invariants.

use crate::foundation::codec::CodecError;

/// Broad classification of a [`CoreError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad parameters or call order, e.g. allocating a map twice
    Configuration,
    /// A handle that no longer refers to a live object
    NotFound,
    /// A structural invariant would be broken by the request
    InvariantViolation,
    /// Persisted data could not be read or written
    Codec,
}

/// Errors reported by the map, the managers and the world
#[derive(thiserror::Error, Debug)]
pub enum CoreError {
    /// A map is already allocated
    #[error("Map already allocated; free it before allocating a new one")]
    MapAlreadyAllocated,

    /// Requested map dimensions are zero or exceed the hard maximum
    #[error("Invalid map size {regions_x}x{regions_y} (maximum {max_x}x{max_y})")]
    InvalidMapSize {
        /// Requested regions along X
        regions_x: usize,
        /// Requested regions along Y
        regions_y: usize,
        /// Maximum regions along X
        max_x: usize,
        /// Maximum regions along Y
        max_y: usize,
    },

    /// Region storage could not be reserved
    #[error("Map allocation failed: {0}")]
    MapAllocationFailed(String),

    /// The operation needs an allocated map
    #[error("No map allocated")]
    NoMap,

    /// An entity key that is stale or was never issued
    #[error("Unknown entity")]
    UnknownEntity,

    /// A structural invariant would be broken
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Codec failure while reading or writing a scene
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),
}

impl CoreError {
    /// Shorthand for [`CoreError::InvariantViolation`]
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }

    /// Classify the error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MapAlreadyAllocated
            | Self::InvalidMapSize { .. }
            | Self::MapAllocationFailed(_)
            | Self::NoMap => ErrorKind::Configuration,
            Self::UnknownEntity => ErrorKind::NotFound,
            Self::InvariantViolation(_) => ErrorKind::InvariantViolation,
            Self::Codec(_) => ErrorKind::Codec,
        }
    }
}

/// Result alias used throughout the crate
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(CoreError::MapAlreadyAllocated.kind(), ErrorKind::Configuration);
        assert_eq!(CoreError::UnknownEntity.kind(), ErrorKind::NotFound);
        assert_eq!(CoreError::invariant("x").kind(), ErrorKind::InvariantViolation);
        assert_eq!(
            CoreError::from(CodecError::InvalidUtf8).kind(),
            ErrorKind::Codec
        );
    }

    #[test]
    fn test_messages() {
        let error = CoreError::InvalidMapSize { regions_x: 200, regions_y: 1, max_x: 128, max_y: 128 };
        assert_eq!(error.to_string(), "Invalid map size 200x1 (maximum 128x128)");
    }
}
