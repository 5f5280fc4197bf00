//! Error types for the reinitialization workflow.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the external capability interfaces.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// The addressed object does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// The service could not be reached or timed out.
    #[error("service unavailable: {0}")]
    Unavailable(String),
    /// The service refused the operation.
    #[error("operation rejected: {0}")]
    Rejected(String),
}

/// Fatal errors of a reinitialization run.
#[derive(Debug, Error)]
pub enum ReinitError {
    /// The target entity does not resolve by name.
    #[error("entity not found: {0}")]
    NotFound(String),

    /// A hard precondition failed; nothing was mutated.
    #[error("precondition '{check}' failed: {message}")]
    PreconditionFailed {
        /// Name of the failing check.
        check: String,
        /// What the check observed.
        message: String,
    },

    /// An overridable precondition failed and the operator did not override it.
    #[error("precondition '{check}' not overridden: {message}")]
    PreconditionDeclined {
        /// Name of the failing check.
        check: String,
        /// What the check observed.
        message: String,
    },

    /// Replica copies could not be enumerated.
    #[error("replica topology unavailable: {0}")]
    TopologyUnavailable(String),

    /// A remote read never reflected a write within the poll timeout.
    #[error("timed out waiting for {what}")]
    ConvergenceTimeout {
        /// The state that was being waited for.
        what: String,
    },

    /// A destructive phase failed; later phases were not attempted.
    #[error("phase '{phase}' failed: {message}")]
    DestructivePhase {
        /// The phase that failed.
        phase: String,
        /// Underlying failure.
        message: String,
    },

    /// The operator declined the destructive confirmation.
    #[error("operator declined; no changes were made")]
    Declined,

    /// Another run holds the lease for this entity.
    #[error("another run holds the lease for {entity} ({holder})")]
    LeaseHeld {
        /// Entity name.
        entity: String,
        /// Contents of the existing lease file.
        holder: String,
    },

    /// Invalid configuration.
    #[error("invalid config: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error")]
    Io(#[from] std::io::Error),
}

/// Result type for reinitialization operations.
pub type Result<T> = std::result::Result<T, ReinitError>;

/// A non-fatal failure collected during restoration.
///
/// These never abort a run; they end up in the run summary so the
/// operator can fix the affected copy or setting by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestorationStepFailure {
    /// Copy name, or the entity name for entity-level settings.
    pub target: String,
    /// Step that failed (`add`, `suspend`, `seed`, `circular_logging`, ...).
    pub step: String,
    /// Failure detail.
    pub message: String,
}

impl RestorationStepFailure {
    /// Record for `step` failing on `target`.
    pub fn new(target: &str, step: &str, message: impl Into<String>) -> Self {
        Self {
            target: target.to_string(),
            step: step.to_string(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precondition_display_names_check() {
        let err = ReinitError::PreconditionFailed {
            check: "recovery_flag".to_string(),
            message: "entity is a recovery database".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "precondition 'recovery_flag' failed: entity is a recovery database"
        );
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::Unavailable("directory".to_string());
        assert_eq!(err.to_string(), "service unavailable: directory");
    }

    #[test]
    fn test_restoration_failure_new() {
        let f = RestorationStepFailure::new("DB1\\MBX2", "seed", "copy busy");
        assert_eq!(f.target, "DB1\\MBX2");
        assert_eq!(f.step, "seed");
        assert_eq!(f.message, "copy busy");
    }
}
