//! Workflow Execution Module
//!
//! Provides the execution half of the engine: dispatching resolved steps
//! to action adapters, gating their output, and scheduling run instances
//! and jobs in parallel.
//!
//! # Architecture
//!
//! - [`engine`]: Top-level orchestration of jobs and run instances
//! - [`step`]: Resolution and sequential execution of one instance
//! - [`action`]: Adapters for `run` commands and `uses` references
//! - [`gate`]: Output scanning that can override a clean exit status
//! - [`report`]: Status aggregation for steps, instances, jobs, workflows

pub mod action;
pub mod engine;
pub mod gate;
pub mod report;
pub mod step;

pub use action::{ActionOutcome, ExternalAction, ExternalRefAction, ResolvedStep, ShellAction};
pub use engine::Engine;
pub use gate::OutputGate;
pub use report::{
    InstanceReport, InstanceStatus, JobReport, StepReport, StepStatus, WorkflowReport,
};
pub use step::StepRunner;
