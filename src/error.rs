//! Configuration errors raised while building routes, riders and races.
//!
//! Everything past construction is a numeric clamp, so this is the only
//! error type the library exposes.

/// A construction-time invariant was violated.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("route must contain at least one segment")]
    EmptyRoute,

    #[error("segment {index} has invalid length {length} (must be finite and > 0)")]
    InvalidSegmentLength { index: usize, length: f64 },

    #[error("segment {index} has non-finite gradient {gradient}")]
    InvalidGradient { index: usize, gradient: f64 },

    #[error("timestep must be finite and > 0, got {0}")]
    InvalidTimestep(f64),

    #[error("max race time must be finite and >= 0, got {0}")]
    InvalidMaxTime(f64),

    #[error("rider {name}: {reason}")]
    InvalidRider { name: String, reason: String },

    #[error("invalid physiology: {0}")]
    InvalidPhysiology(String),

    #[error("duplicate rider name {0:?}")]
    DuplicateRider(String),

    #[error("simulation needs at least one {0}")]
    EmptySimulation(&'static str),

    #[error("trait range {name} is invalid: [{min}, {max}]")]
    InvalidTraitRange { name: &'static str, min: f64, max: f64 },
}

impl ConfigError {
    pub(crate) fn rider(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRider {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
