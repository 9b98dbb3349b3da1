//! Error types for physics operations.

use thiserror::Error;

/// Errors that can occur while constructing or mutating physics objects.
///
/// Hot-path algorithms (collision, solving, time of impact) never return
/// errors; they recover from numeric degeneracies in place and report
/// through state enums. `PhysicsError` covers the construction and API
/// surface where the caller violated a precondition.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// A polygon could not be built from the given points.
    #[error("invalid polygon: {reason}")]
    InvalidPolygon {
        /// Description of what's wrong with the input points.
        reason: String,
    },

    /// A joint ratio that must be non-zero was zero (pulley, gear).
    #[error("invalid joint ratio: {0} (must be non-zero)")]
    InvalidRatio(f64),

    /// A mutating call was made while the world is mid-step.
    #[error("world is locked: mutation is not allowed during a step")]
    WorldLocked,

    /// Invalid body ID referenced.
    #[error("invalid body ID: {0}")]
    InvalidBodyId(u32),

    /// Invalid fixture ID referenced.
    #[error("invalid fixture ID: {0}")]
    InvalidFixtureId(u32),

    /// Invalid joint ID referenced.
    #[error("invalid joint ID: {0}")]
    InvalidJointId(u32),

    /// Invalid configuration.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// Invalid mass properties.
    #[error("invalid mass properties: {reason}")]
    InvalidMass {
        /// Description of what's wrong.
        reason: String,
    },
}

impl PhysicsError {
    /// Create an invalid polygon error.
    #[must_use]
    pub fn invalid_polygon(reason: impl Into<String>) -> Self {
        Self::InvalidPolygon {
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Create an invalid mass properties error.
    #[must_use]
    pub fn invalid_mass(reason: impl Into<String>) -> Self {
        Self::InvalidMass {
            reason: reason.into(),
        }
    }

    /// Check if this is a locked-world error.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        matches!(self, Self::WorldLocked)
    }

    /// Check if this error refers to a stale or unknown ID.
    #[must_use]
    pub fn is_invalid_id(&self) -> bool {
        matches!(
            self,
            Self::InvalidBodyId(_) | Self::InvalidFixtureId(_) | Self::InvalidJointId(_)
        )
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PhysicsError::InvalidBodyId(42);
        assert!(err.to_string().contains("42"));

        let err = PhysicsError::invalid_polygon("fewer than 3 unique points");
        assert!(err.to_string().contains("3 unique"));

        let err = PhysicsError::InvalidRatio(0.0);
        assert!(err.to_string().contains("non-zero"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(PhysicsError::WorldLocked.is_locked());
        assert!(!PhysicsError::WorldLocked.is_invalid_id());

        assert!(PhysicsError::InvalidFixtureId(7).is_invalid_id());
        assert!(!PhysicsError::InvalidRatio(0.0).is_invalid_id());
    }
}
