//! Unified error handling for the bikeability-engine library.
//!
//! This module provides a consistent error type for all engine operations.
//! Configuration and input errors are reported through these variants;
//! data-quality conditions (a degenerate nearest-edge lookup, an edge with
//! no assigned points) are deliberately *not* errors and surface as
//! fallback values instead.

use std::fmt;

/// Unified error type for bikeability-engine operations.
#[derive(Debug, Clone)]
pub enum ScoringError {
    /// No valid edge geometry remained after filtering the street network
    EmptyNetwork { rejected: usize },
    /// A geometry input could not be used
    InvalidGeometry { message: String },
    /// A sensor series contained no usable observations
    EmptySeries { sensor: String },
    /// Configuration error (empty weight map, malformed config document, ...)
    ConfigError { message: String },
    /// Snap cache storage error
    CacheError { message: String },
    /// Generic internal error
    Internal { message: String },
}

impl fmt::Display for ScoringError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoringError::EmptyNetwork { rejected } => {
                write!(
                    f,
                    "Street network has no valid edges ({} rejected during filtering)",
                    rejected
                )
            }
            ScoringError::InvalidGeometry { message } => {
                write!(f, "Invalid geometry: {}", message)
            }
            ScoringError::EmptySeries { sensor } => {
                write!(f, "Sensor series '{}' has no usable observations", sensor)
            }
            ScoringError::ConfigError { message } => {
                write!(f, "Configuration error: {}", message)
            }
            ScoringError::CacheError { message } => {
                write!(f, "Snap cache error: {}", message)
            }
            ScoringError::Internal { message } => {
                write!(f, "Internal error: {}", message)
            }
        }
    }
}

impl std::error::Error for ScoringError {}

#[cfg(feature = "persistence")]
impl From<rusqlite::Error> for ScoringError {
    fn from(err: rusqlite::Error) -> Self {
        ScoringError::CacheError {
            message: err.to_string(),
        }
    }
}

/// Result type alias for bikeability-engine operations.
pub type Result<T> = std::result::Result<T, ScoringError>;

/// Extension trait for converting Option to ScoringError.
pub trait OptionExt<T> {
    /// Convert Option to Result with a configuration error.
    fn ok_or_config(self, message: &str) -> Result<T>;

    /// Convert Option to Result with a generic internal error.
    fn ok_or_internal(self, message: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_config(self, message: &str) -> Result<T> {
        self.ok_or_else(|| ScoringError::ConfigError {
            message: message.to_string(),
        })
    }

    fn ok_or_internal(self, message: &str) -> Result<T> {
        self.ok_or_else(|| ScoringError::Internal {
            message: message.to_string(),
        })
    }
}
