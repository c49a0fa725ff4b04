//! Error Types
//!
//! Error taxonomy for the workflow engine, layered by where in the
//! lifecycle a failure can occur:
//!
//! - [`ParseError`]: malformed workflow text, fatal before any job starts
//! - [`ValidationError`]: structurally invalid workflow definition
//! - [`MatrixError`]: invalid build matrix, fatal to the owning job
//! - [`EvalError`]: unresolvable interpolation, fatal to the owning instance
//! - [`StepError`]: a step failed during execution

use thiserror::Error;

/// Errors raised while loading a workflow file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("failed to read workflow file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse workflow YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// Structural validation failures in a workflow definition.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    #[error("workflow has no jobs")]
    EmptyWorkflow,

    #[error("duplicate job name: '{0}'")]
    DuplicateJob(String),

    #[error("job '{0}' has no steps")]
    NoSteps(String),

    #[error("job '{job}' step {index}: specifies both 'run' and 'uses'")]
    AmbiguousStep { job: String, index: usize },

    #[error("job '{job}' step {index}: specifies neither 'run' nor 'uses'")]
    MissingAction { job: String, index: usize },

    #[error("job '{job}': duplicate matrix axis '{axis}'")]
    DuplicateAxis { job: String, axis: String },

    #[error("value for '{key}' is not a scalar")]
    NonScalarValue { key: String },
}

/// Errors raised while expanding a job's build matrix.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MatrixError {
    #[error("matrix declares no axes (a vacuous product is never valid)")]
    EmptyMatrix,

    #[error("matrix axis '{axis}' has no values")]
    EmptyAxis { axis: String },
}

/// Errors raised while resolving interpolation tokens against a run
/// instance's bound context.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EvalError {
    #[error("token references unknown matrix axis '{0}'")]
    UnknownAxis(String),

    #[error("token references unknown job field '{0}'")]
    UnknownJobField(String),

    #[error("unterminated interpolation token in '{0}'")]
    UnterminatedToken(String),

    #[error("invalid expression '{0}'")]
    InvalidExpression(String),
}

/// Errors raised while executing a single step of a run instance.
#[derive(Debug, Error)]
pub enum StepError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("action exited with code {exit_code}")]
    ActionFailed { exit_code: i32 },

    #[error("output gate triggered by line: {line}")]
    GateTriggered { line: String },

    #[error("action exceeded timeout of {limit_secs}s and was killed")]
    Timeout { limit_secs: u64 },
}
