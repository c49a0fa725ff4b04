//! Run Instance Execution
//!
//! Executes the step sequence of one run instance:
//! - resolves every interpolation token up front, before any action runs
//! - dispatches each resolved step to its action adapter in order
//! - applies the output gate to gated steps that exited 0
//! - skips the remainder of the sequence after the first failure
//!
//! Resolution is all-or-nothing: if any step of the instance carries an
//! unresolvable token, the instance fails without invoking a single
//! action.

use std::sync::Arc;
use std::time::Instant;

use log::{debug, error, info};

use crate::error::{EvalError, StepError};
use crate::workflow::model::{Job, Step, StepKind};
use crate::workflow::{EvalContext, RunInstance};

use super::action::{ExternalAction, ResolvedStep};
use super::gate::OutputGate;
use super::report::{InstanceReport, InstanceStatus, StepReport};

/// Resolves one step's templated fields against an evaluation context.
pub fn resolve_step(ctx: &EvalContext, step: &Step) -> Result<ResolvedStep, EvalError> {
    let kind = match &step.kind {
        StepKind::Run(command) => StepKind::Run(ctx.interpolate(command)?),
        StepKind::Uses(reference) => StepKind::Uses(ctx.interpolate(reference)?),
    };

    let mut with = std::collections::HashMap::new();
    for (key, value) in &step.with {
        with.insert(key.clone(), ctx.interpolate(value)?);
    }

    let name = match &step.name {
        Some(name) => ctx.interpolate(name)?,
        None => match &kind {
            StepKind::Run(command) => command.clone(),
            StepKind::Uses(reference) => reference.clone(),
        },
    };

    Ok(ResolvedStep {
        name,
        kind,
        with,
        gate_output: step.gate_output,
    })
}

/// Builds the display identity of a run instance: the job name alone for
/// instances without bindings, otherwise `job (v1, v2, ...)`.
pub fn instance_identity(job_name: &str, instance: &RunInstance) -> String {
    if instance.is_empty() {
        job_name.to_string()
    } else {
        format!("{} ({})", job_name, instance.identity())
    }
}

/// Executes the steps of one run instance sequentially.
pub struct StepRunner {
    shell: Arc<dyn ExternalAction>,
    external: Arc<dyn ExternalAction>,
    gate: Arc<OutputGate>,
}

impl StepRunner {
    /// Creates a runner with adapters for `run` and `uses` steps.
    pub fn new(
        shell: Arc<dyn ExternalAction>,
        external: Arc<dyn ExternalAction>,
        gate: Arc<OutputGate>,
    ) -> Self {
        Self {
            shell,
            external,
            gate,
        }
    }

    /// Runs one instance of a job and reports the outcome.
    pub fn run_instance(&self, job: &Job, instance: &RunInstance) -> InstanceReport {
        let identity = instance_identity(&job.name, instance);
        let started = Instant::now();

        info!("Starting run instance '{}'", identity);

        // Resolve everything first so a bad token never launches a
        // partial instance.
        let ctx = EvalContext::new(&job.name, instance);
        let resolved = match self.resolve_all(&ctx, &job.steps) {
            Ok(resolved) => resolved,
            Err((index, e)) => {
                error!("Run instance '{}' failed to resolve: {}", identity, e);
                return Self::resolution_failure(identity, &job.steps, index, e, started);
            }
        };

        let mut steps = Vec::with_capacity(resolved.len());
        let mut failed = false;

        for step in &resolved {
            if failed {
                steps.push(StepReport::skipped(&step.name));
                continue;
            }

            let report = self.run_step(&identity, step);
            failed = !report.succeeded();
            steps.push(report);
        }

        let status = if failed {
            InstanceStatus::Failed
        } else {
            InstanceStatus::Passed
        };
        let duration_ms = started.elapsed().as_millis();

        info!(
            "Run instance '{}' finished: {:?} ({} ms)",
            identity, status, duration_ms
        );

        InstanceReport {
            identity,
            status,
            steps,
            duration_ms,
        }
    }

    /// Resolves all steps of the sequence, reporting the index of the
    /// first step that fails.
    fn resolve_all(
        &self,
        ctx: &EvalContext,
        steps: &[Step],
    ) -> Result<Vec<ResolvedStep>, (usize, EvalError)> {
        steps
            .iter()
            .enumerate()
            .map(|(i, step)| resolve_step(ctx, step).map_err(|e| (i, e)))
            .collect()
    }

    /// Executes one resolved step through its adapter and applies the
    /// output gate if the step opted in.
    fn run_step(&self, identity: &str, step: &ResolvedStep) -> StepReport {
        debug!("[{}] running step '{}'", identity, step.name);
        let started = Instant::now();

        let adapter = match step.kind {
            StepKind::Run(_) => &self.shell,
            StepKind::Uses(_) => &self.external,
        };

        let outcome = match adapter.run(step) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("[{}] step '{}' failed: {}", identity, step.name, e);
                return StepReport::failed(
                    &step.name,
                    e.to_string(),
                    String::new(),
                    started.elapsed().as_millis(),
                );
            }
        };

        let duration_ms = started.elapsed().as_millis();

        if !outcome.success() {
            let reason = StepError::ActionFailed {
                exit_code: outcome.exit_code,
            }
            .to_string();
            error!("[{}] step '{}' failed: {}", identity, step.name, reason);
            return StepReport::failed(&step.name, reason, outcome.output, duration_ms);
        }

        if step.gate_output {
            if let Some(line) = self.gate.scan(&outcome.output) {
                let reason = StepError::GateTriggered { line }.to_string();
                error!("[{}] step '{}' failed: {}", identity, step.name, reason);
                return StepReport::failed(&step.name, reason, outcome.output, duration_ms);
            }
        }

        debug!("[{}] step '{}' passed", identity, step.name);
        StepReport::passed(&step.name, outcome.output, duration_ms)
    }

    /// Builds the report for an instance whose resolution failed: the
    /// offending step is marked failed, every other step skipped.
    fn resolution_failure(
        identity: String,
        steps: &[Step],
        failed_index: usize,
        error: EvalError,
        started: Instant,
    ) -> InstanceReport {
        let steps = steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                if i == failed_index {
                    StepReport::failed(
                        step.display_name(),
                        error.to_string(),
                        String::new(),
                        0,
                    )
                } else {
                    StepReport::skipped(step.display_name())
                }
            })
            .collect();

        InstanceReport {
            identity,
            status: InstanceStatus::Failed,
            steps,
            duration_ms: started.elapsed().as_millis(),
        }
    }
}
