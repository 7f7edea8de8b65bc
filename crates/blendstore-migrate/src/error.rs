//! Crate-level error types.

use thiserror::Error;

/// Phase of a migration step in which a failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub enum StepPhase {
    /// Evaluating the step's precondition.
    Precondition,
    /// Executing the step's schema action.
    Action,
    /// Recreating index directives.
    Index,
    /// Running the step's backfill rule.
    Backfill,
    /// Committing the step's transaction.
    Commit,
}

impl std::fmt::Display for StepPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepPhase::Precondition => write!(f, "precondition"),
            StepPhase::Action => write!(f, "action"),
            StepPhase::Index => write!(f, "index"),
            StepPhase::Backfill => write!(f, "backfill"),
            StepPhase::Commit => write!(f, "commit"),
        }
    }
}

/// Migration engine errors.
#[derive(Debug, Error)]
pub enum Error {
    /// A table expected by a step does not exist.
    #[error("table not found: {table}")]
    TableNotFound {
        /// Name of the missing table.
        table: String,
    },

    /// A column expected by a step does not exist.
    #[error("column not found: {table}.{column}")]
    ColumnNotFound {
        /// Table the column was expected on.
        table: String,
        /// Name of the missing column.
        column: String,
    },

    /// The store cannot perform a requested direct alteration.
    #[error("unsupported alteration on {table}.{column}: {reason}")]
    UnsupportedAlter {
        /// Table the alteration targets.
        table: String,
        /// Column the alteration targets.
        column: String,
        /// Why the store refuses the direct path.
        reason: String,
    },

    /// A rebuild recipe failed static validation before any DDL ran.
    #[error("invalid rebuild recipe for {table}: {message}")]
    RecipeValidation {
        /// Table the recipe rebuilds.
        table: String,
        /// Description of the validation failure.
        message: String,
    },

    /// A migration step failed while applying; the transaction was rolled back.
    #[error("step '{step}' failed during {phase}: {source}")]
    StepFailed {
        /// Name of the failed step.
        step: String,
        /// Phase in which the failure occurred.
        phase: StepPhase,
        /// The underlying error.
        #[source]
        source: Box<Error>,
    },

    /// Store error.
    #[error("store error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

impl Error {
    /// Wrap an error with the identity of the step it failed in.
    pub fn in_step(self, step: impl Into<String>, phase: StepPhase) -> Self {
        Error::StepFailed {
            step: step.into(),
            phase,
            source: Box::new(self),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnsupportedAlter {
            table: "blending_work".to_string(),
            column: "work_order".to_string(),
            reason: "NOT NULL without constant default".to_string(),
        };
        assert!(err.to_string().contains("blending_work.work_order"));
    }

    #[test]
    fn test_step_failed_carries_context() {
        let err = Error::TableNotFound {
            table: "recipe".to_string(),
        }
        .in_step("mark primary ingredients", StepPhase::Backfill);

        let text = err.to_string();
        assert!(text.contains("mark primary ingredients"));
        assert!(text.contains("backfill"));
        assert!(text.contains("recipe"));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(StepPhase::Precondition.to_string(), "precondition");
        assert_eq!(StepPhase::Commit.to_string(), "commit");
    }
}
