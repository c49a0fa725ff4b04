//! Workflow Data Model
//!
//! Core data structures representing a workflow definition: jobs, their
//! build-matrix strategies, and the steps each run instance executes.
//!
//! # Example YAML Format
//!
//! ```yaml
//! jobs:
//!   test:
//!     runs-on: ubuntu-latest
//!     strategy:
//!       fail-fast: false
//!       matrix:
//!         rust: [nightly, stable]
//!         target: [x86_64-unknown-linux-gnu, armv7-unknown-linux-gnueabihf]
//!     steps:
//!       - uses: checkout
//!       - run: cargo test --target ${{ matrix.target }}
//!         with:
//!           use-cross: ${{ matrix.target != 'x86_64-unknown-linux-gnu' }}
//!
//!   docs:
//!     runs-on: ubuntu-latest
//!     steps:
//!       - run: cargo doc --no-deps
//!         gate-output: true
//! ```

use std::collections::HashMap;

use crate::error::ValidationError;

/// The kind of work a step delegates to.
///
/// Both variants are opaque to the engine: a `run` command is handed to a
/// shell adapter, a `uses` reference to an external-action adapter.
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    /// Command template executed through the shell adapter.
    Run(String),
    /// Reference to a pre-built external action.
    Uses(String),
}

/// A single unit of work within a run instance.
///
/// Fields may contain `${{ matrix.<axis> }}` and `${{ job.name }}`
/// interpolation tokens; these are resolved against the owning run
/// instance before the step is dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    /// Optional display name
    pub name: Option<String>,

    /// What this step delegates to
    pub kind: StepKind,

    /// String-to-string parameter map passed to the adapter
    pub with: HashMap<String, String>,

    /// Whether the output gate scans this step's combined output
    pub gate_output: bool,
}

impl Step {
    /// Creates a `run` step from a command template.
    pub fn run(command: impl Into<String>) -> Self {
        Self {
            name: None,
            kind: StepKind::Run(command.into().trim().to_string()),
            with: HashMap::new(),
            gate_output: false,
        }
    }

    /// Creates a `uses` step from an external action reference.
    pub fn uses(reference: impl Into<String>) -> Self {
        Self {
            name: None,
            kind: StepKind::Uses(reference.into().trim().to_string()),
            with: HashMap::new(),
            gate_output: false,
        }
    }

    /// Sets the display name for this step.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds a parameter to the step's `with` map.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.with.insert(key.into(), value.into());
        self
    }

    /// Enables the output gate for this step.
    pub fn gated(mut self) -> Self {
        self.gate_output = true;
        self
    }

    /// Returns the name shown in logs and reports.
    ///
    /// Falls back to the command template or action reference when no
    /// explicit name was given.
    pub fn display_name(&self) -> &str {
        if let Some(ref name) = self.name {
            return name;
        }
        match &self.kind {
            StepKind::Run(command) => command,
            StepKind::Uses(reference) => reference,
        }
    }
}

/// One named dimension of a build matrix with its ordered values.
#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    /// Axis name, referenced as `${{ matrix.<name> }}`
    pub name: String,

    /// Ordered values; order is significant for product ordering
    pub values: Vec<String>,
}

impl Axis {
    /// Creates an axis from a name and its values.
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }
}

/// Execution strategy for a job: fail-fast policy plus build matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Strategy {
    /// Stop launching further instances after the first failure
    pub fail_fast: bool,

    /// Matrix axes in declared order. `None` means no matrix was declared
    /// (one instance with empty bindings); `Some(vec![])` is a declared but
    /// vacuous matrix, which expansion rejects.
    pub matrix: Option<Vec<Axis>>,
}

impl Strategy {
    /// Creates a strategy with the provider-default fail-fast policy.
    pub fn new() -> Self {
        Self {
            fail_fast: true,
            matrix: None,
        }
    }

    /// Sets the fail-fast policy.
    pub fn fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = fail_fast;
        self
    }

    /// Appends a matrix axis. Declaration order is preserved.
    pub fn with_axis(mut self, name: impl Into<String>, values: &[&str]) -> Self {
        self.matrix.get_or_insert_with(Vec::new).push(Axis::new(
            name,
            values.iter().map(|v| v.to_string()).collect(),
        ));
        self
    }
}

impl Default for Strategy {
    fn default() -> Self {
        Self::new()
    }
}

/// A named job: an execution-environment label, an optional strategy, and
/// an ordered sequence of steps executed by each run instance.
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    /// Unique job name
    pub name: String,

    /// Execution-environment label (opaque to the engine)
    pub runs_on: String,

    /// Optional fail-fast policy and build matrix
    pub strategy: Option<Strategy>,

    /// Ordered steps executed by every run instance of this job
    pub steps: Vec<Step>,
}

impl Job {
    /// Creates a job with no strategy and no steps.
    pub fn new(name: impl Into<String>, runs_on: impl Into<String>) -> Self {
        Self {
            name: name.into().trim().to_string(),
            runs_on: runs_on.into().trim().to_string(),
            strategy: None,
            steps: Vec::new(),
        }
    }

    /// Sets the job's strategy.
    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Appends a step to the job.
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Returns the fail-fast policy, defaulting to true when no strategy
    /// is declared.
    pub fn fail_fast(&self) -> bool {
        self.strategy.as_ref().map_or(true, |s| s.fail_fast)
    }
}

/// A complete workflow: an ordered set of uniquely named jobs.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    /// Jobs in declared order
    pub jobs: Vec<Job>,
}

impl Workflow {
    /// Creates an empty workflow.
    pub fn new() -> Self {
        Self { jobs: Vec::new() }
    }

    /// Creates a workflow from a list of jobs.
    pub fn from_jobs(jobs: Vec<Job>) -> Self {
        Self { jobs }
    }

    /// Adds a job, rejecting duplicate names.
    pub fn add_job(&mut self, job: Job) -> Result<(), ValidationError> {
        if self.jobs.iter().any(|j| j.name == job.name) {
            return Err(ValidationError::DuplicateJob(job.name));
        }
        self.jobs.push(job);
        Ok(())
    }

    /// Gets a job by name.
    pub fn get_job(&self, name: &str) -> Option<&Job> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Returns the number of jobs in the workflow.
    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    /// Returns true if the workflow has no jobs.
    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}
