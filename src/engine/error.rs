// ABOUTME: Error and warning types for the wind model pipeline
// ABOUTME: Fatal configuration errors abort; everything else degrades to recorded warnings

use thiserror::Error;

/// Fatal configuration problems detected before any computation starts
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("mesh size must be positive, got {0} m")]
    InvalidMeshSize(f64),

    #[error("vertical resolution must be positive, got {0} m")]
    InvalidVerticalResolution(f64),

    #[error("reference height must be positive, got {0} m")]
    InvalidReferenceHeight(f64),

    #[error("no buildings, no vegetation and no explicit domain: nothing to grid")]
    EmptyDomain,

    #[error("user profile selected but no profile table supplied")]
    MissingUserProfile,

    #[error("domain of {nx}x{ny}x{nz} cells is too small for the solver stencil")]
    DomainTooSmall { nx: usize, ny: usize, nz: usize },
}

/// Recoverable conditions recorded on the result
///
/// The simulation continues past all of these; the affected zone or cell is
/// skipped or marked solid instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Non-simple or zero-area geometry, or an infeasible zone construction
    DegenerateGeometry,
    /// A cell where a coefficient would divide by zero; treated as solid
    NumericOverflow,
    /// Two upstream candidates tied on wall position and obstacle height and
    /// the fixed zone-priority table had to break the tie ("rule D")
    AmbiguousUpstream,
    /// The solver hit its iteration cap or stagnated
    SolverIncomplete,
}

/// A recorded warning with enough context to locate the cause
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    pub fn new(kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_messages() {
        let err = ConfigError::InvalidMeshSize(-2.0);
        assert!(err.to_string().contains("-2"));

        let err = ConfigError::DomainTooSmall {
            nx: 2,
            ny: 2,
            nz: 2,
        };
        assert!(err.to_string().contains("2x2x2"));
    }

    #[test]
    fn test_warning_construction() {
        let w = Warning::new(WarningKind::DegenerateGeometry, "zero-area block 3");
        assert_eq!(w.kind, WarningKind::DegenerateGeometry);
        assert!(w.message.contains("block 3"));
    }
}
