// Error taxonomy for the satiety pipeline.
//
// Fatal conditions are `PipelineError`s and propagate with `?` (converting
// into anyhow at the application boundary). Non-fatal conditions are
// `Warning`s: they are logged where they happen and collected into the
// final report so the caller can decide what to trust.

use serde::Serialize;
use thiserror::Error;

/// Fatal pipeline errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// A diary record could not be parsed. `line` is 1-based.
    #[error("parse error on line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// A stage received a matrix or vector whose shape breaks the dataflow
    /// invariants. Always a wiring bug, never a data problem.
    #[error("dimension mismatch in {stage}: expected {expected}, got {actual}")]
    DimensionMismatch {
        stage: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Sparse storage could not be allocated for the requested shape.
    #[error("sparse matrix allocation failed for {rows}x{cols} with {nnz} nonzeros")]
    SparseAllocation { rows: usize, cols: usize, nnz: usize },
}

impl PipelineError {
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        Self::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// Return `Ok(())` when `actual == expected`, otherwise a mismatch error.
    pub fn check_dims(stage: &'static str, expected: usize, actual: usize) -> Result<(), Self> {
        if expected == actual {
            Ok(())
        } else {
            Err(Self::DimensionMismatch {
                stage,
                expected,
                actual,
            })
        }
    }
}

/// Why a single nutrition value could not be read as a number.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    #[error("calorie value {0} out of range")]
    OutOfRange(i64),
    #[error("calorie value {0} is not a non-negative integer")]
    NotWholeCalories(f64),
    #[error("non-finite value {0}")]
    NonFinite(f64),
    #[error("empty value '{0}'")]
    Empty(String),
    #[error("non-numeric value '{0}'")]
    NonNumeric(String),
}

/// Why one diary record's payloads could not be extracted. Converted into
/// `PipelineError::Parse` once the line number is known.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("malformed {payload} payload: {detail}")]
    Malformed { payload: &'static str, detail: String },
    #[error("dish '{0}' has no nutrition facts")]
    NoNutrition(String),
    #[error("dish '{dish}': {source}")]
    Dish {
        dish: String,
        #[source]
        source: ValueError,
    },
    #[error("calorie overflow summing '{0}'")]
    CalorieOverflow(String),
    #[error("goals payload has no Calories entry")]
    NoCalorieGoal,
    #[error("calorie goal: {0}")]
    Goal(#[source] ValueError),
}

impl RecordError {
    pub fn at_line(self, line: usize) -> PipelineError {
        PipelineError::parse(line, self.to_string())
    }
}

/// Non-fatal diagnostics attached to the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Warning {
    /// A solver stopped without meeting its tolerance.
    Convergence {
        stage: String,
        iterations: usize,
        reason: String,
    },
    /// Degenerate input handled by a guard rule.
    DegenerateInput { stage: String, detail: String },
    /// Two or more clusters ended up with the same label.
    LabelCollision { label: String, clusters: Vec<usize> },
    /// A diary record was skipped under the skip-and-continue policy.
    SkippedRecord { line: usize, reason: String },
}

impl Warning {
    pub fn degenerate(stage: &str, detail: impl Into<String>) -> Self {
        Self::DegenerateInput {
            stage: stage.to_string(),
            detail: detail.into(),
        }
    }
}
