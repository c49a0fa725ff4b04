//! Workflow Definition Module
//!
//! Provides data structures and utilities for defining, parsing, and
//! expanding declarative workflows.
//!
//! # Structure
//!
//! - [`model`]: Core data structures (Workflow, Job, Strategy, Step)
//! - [`parser`]: YAML parsing and loading
//! - [`validator`]: Structural validation rules
//! - [`matrix`]: Build matrix expansion into run instances
//! - [`context`]: Interpolation and condition evaluation

pub mod context;
pub mod matrix;
pub mod model;
pub mod parser;
pub mod validator;

pub use context::EvalContext;
pub use matrix::{expand, RunInstance};
pub use model::{Axis, Job, Step, StepKind, Strategy, Workflow};
pub use parser::{load_workflow, parse_workflow};
pub use validator::validate_workflow;
