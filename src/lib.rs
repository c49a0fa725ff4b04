//! GridRunner - Matrix-Driven Workflow Execution Engine
//!
//! A CI-style orchestration core: declarative workflows whose jobs expand
//! a build matrix into concrete run instances, each executing an ordered
//! step sequence through opaque external actions. The engine owns matrix
//! expansion, token interpolation, scheduling, fail-fast cancellation,
//! and output gating; it never interprets what a step actually does.
//!
//! # Architecture
//!
//! The library is organized into two main modules:
//!
//! - [`workflow`]: Data structures, parsing, matrix expansion, and
//!   interpolation for workflow definitions
//! - [`execution`]: The engine, action adapters, output gate, and reports
//!
//! # Example
//!
//! ```rust,no_run
//! use gridrunner::execution::Engine;
//! use gridrunner::load_workflow;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Load a workflow from YAML
//!     let workflow = load_workflow("ci.yaml")?;
//!
//!     // Create execution engine
//!     let mut engine = Engine::new(workflow);
//!     engine.set_max_parallel_jobs(2);
//!
//!     // Execute the workflow
//!     let report = engine.run();
//!     report.print_summary();
//!     std::process::exit(if report.succeeded() { 0 } else { 1 });
//! }
//! ```

pub mod error;
pub mod execution;
pub mod workflow;

// Re-export commonly used types
pub use execution::engine::Engine;
pub use execution::report::WorkflowReport;
pub use workflow::model::{Job, Step, Workflow};
pub use workflow::parser::load_workflow;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "GridRunner";
