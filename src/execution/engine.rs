//! Workflow Execution Engine
//!
//! The core engine that orchestrates workflow execution:
//! - expands each job's build matrix into run instances
//! - runs independent jobs in parallel, bounded by a job limit
//! - runs a job's instances in parallel, bounded by an instance limit
//! - enforces per-job fail-fast: after the first instance failure no new
//!   instance launches, in-flight instances run to completion, and
//!   never-launched instances are reported as cancelled
//! - aggregates everything into a [`WorkflowReport`]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, error, info, warn};

use crate::workflow::model::Job;
use crate::workflow::{expand, EvalContext, RunInstance, Workflow};

use super::action::{ExternalAction, ExternalRefAction, ShellAction};
use super::gate::OutputGate;
use super::report::{InstanceReport, InstanceStatus, JobReport, StepReport, WorkflowReport};
use super::step::{instance_identity, resolve_step, StepRunner};

/// Shared per-run configuration handed to every job thread.
struct RunShared {
    shell: Arc<ShellAction>,
    external: Arc<ExternalRefAction>,
    gate: Arc<OutputGate>,
    max_parallel_instances: usize,
    dry_run: bool,
}

/// Workflow execution engine.
///
/// # Example
///
/// ```rust,no_run
/// use gridrunner::execution::Engine;
/// use gridrunner::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("ci.yaml")?;
///     let mut engine = Engine::new(workflow);
///     engine.set_max_parallel_jobs(2);
///
///     let report = engine.run();
///     std::process::exit(if report.succeeded() { 0 } else { 1 });
/// }
/// ```
pub struct Engine {
    workflow: Workflow,
    max_parallel_jobs: usize,
    max_parallel_instances: usize,
    step_timeout: Option<Duration>,
    working_dir: Option<PathBuf>,
    dry_run: bool,
    uses_handlers: HashMap<String, String>,
}

impl Engine {
    /// Creates a new execution engine for a workflow.
    pub fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            max_parallel_jobs: 4,
            max_parallel_instances: num_cpus::get().max(1),
            step_timeout: None,
            working_dir: None,
            dry_run: false,
            uses_handlers: HashMap::new(),
        }
    }

    /// Sets the maximum number of jobs running at once.
    pub fn set_max_parallel_jobs(&mut self, max: usize) {
        self.max_parallel_jobs = max.max(1);
    }

    /// Sets the maximum number of run instances per job at once.
    pub fn set_max_parallel_instances(&mut self, max: usize) {
        self.max_parallel_instances = max.max(1);
    }

    /// Sets the per-step timeout. Default: unlimited.
    pub fn set_step_timeout(&mut self, timeout: Duration) {
        self.step_timeout = Some(timeout);
    }

    /// Sets the working directory for step execution.
    pub fn set_working_dir(&mut self, dir: impl Into<PathBuf>) {
        self.working_dir = Some(dir.into());
    }

    /// Enables or disables dry run mode.
    ///
    /// A dry run expands and resolves everything but invokes no action.
    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
    }

    /// Registers a local handler command for a `uses` action reference.
    ///
    /// References without a handler are treated as provided by the
    /// hosting environment and succeed as no-ops.
    pub fn register_action_handler(
        &mut self,
        reference: impl Into<String>,
        command: impl Into<String>,
    ) {
        self.uses_handlers.insert(reference.into(), command.into());
    }

    /// Executes the workflow and returns its report.
    ///
    /// Jobs have no ordering relationship; they run concurrently up to
    /// the job limit, and the report lists them in declaration order.
    pub fn run(&self) -> WorkflowReport {
        let started_at = Utc::now();
        info!(
            "Starting workflow: {} job(s), {} parallel job(s), {} parallel instance(s)",
            self.workflow.len(),
            self.max_parallel_jobs,
            self.max_parallel_instances
        );

        let mut shell = ShellAction::new().with_timeout(self.step_timeout);
        if let Some(ref dir) = self.working_dir {
            shell = shell.with_working_dir(dir);
        }

        let mut external = ExternalRefAction::new(shell.clone());
        for (reference, command) in &self.uses_handlers {
            external.register(reference, command);
        }

        let shared = Arc::new(RunShared {
            shell: Arc::new(shell),
            external: Arc::new(external),
            gate: Arc::new(OutputGate::new()),
            max_parallel_instances: self.max_parallel_instances,
            dry_run: self.dry_run,
        });

        let jobs = self.run_all_jobs(shared);
        let finished_at = Utc::now();

        let report = WorkflowReport {
            started_at,
            finished_at,
            jobs,
        };

        if report.succeeded() {
            info!("Workflow passed");
        } else {
            error!("Workflow failed");
        }

        report
    }

    /// Runs every job, bounded by the job limit, preserving declaration
    /// order in the result.
    fn run_all_jobs(&self, shared: Arc<RunShared>) -> Vec<JobReport> {
        let total = self.workflow.len();
        let (tx, rx) = channel::<(usize, JobReport)>();

        let mut reports: Vec<Option<JobReport>> = (0..total).map(|_| None).collect();
        let mut next = 0;
        let mut running = 0;
        let mut finished = 0;

        while finished < total {
            while next < total && running < self.max_parallel_jobs {
                let job = self.workflow.jobs[next].clone();
                let shared = Arc::clone(&shared);
                let tx = tx.clone();
                let index = next;

                debug!("Launching job '{}'", job.name);
                thread::spawn(move || {
                    let report = run_job(&job, &shared);
                    // The receiver outlives all senders within this loop.
                    let _ = tx.send((index, report));
                });

                next += 1;
                running += 1;
            }

            if let Ok((index, report)) = rx.recv() {
                reports[index] = Some(report);
                running -= 1;
                finished += 1;
            } else {
                break;
            }
        }

        reports.into_iter().flatten().collect()
    }
}

/// Runs all instances of one job with its fail-fast policy.
fn run_job(job: &Job, shared: &RunShared) -> JobReport {
    let instances = match expand(job.strategy.as_ref()) {
        Ok(instances) => instances,
        Err(e) => {
            error!("Job '{}' has an invalid matrix: {}", job.name, e);
            return JobReport {
                name: job.name.clone(),
                instances: Vec::new(),
                error: Some(e.to_string()),
            };
        }
    };

    info!(
        "Job '{}' expands to {} run instance(s)",
        job.name,
        instances.len()
    );

    if shared.dry_run {
        return dry_run_job(job, &instances);
    }

    let fail_fast = job.fail_fast();
    let total = instances.len();
    let identities: Vec<String> = instances
        .iter()
        .map(|i| instance_identity(&job.name, i))
        .collect();

    let runner = StepRunner::new(
        Arc::clone(&shared.shell) as Arc<dyn ExternalAction>,
        Arc::clone(&shared.external) as Arc<dyn ExternalAction>,
        Arc::clone(&shared.gate),
    );
    let runner = Arc::new(runner);
    let job = Arc::new(job.clone());

    let (tx, rx) = channel::<(usize, InstanceReport)>();

    let mut reports: Vec<Option<InstanceReport>> = (0..total).map(|_| None).collect();
    let mut next = 0;
    let mut running = 0;
    let mut failed = false;

    while next < total || running > 0 {
        // Fail-fast only stops new launches. In-flight instances finish
        // and report normally.
        while next < total && running < shared.max_parallel_instances && !(fail_fast && failed) {
            let runner = Arc::clone(&runner);
            let job = Arc::clone(&job);
            let instance = instances[next].clone();
            let tx = tx.clone();
            let index = next;

            thread::spawn(move || {
                let report = runner.run_instance(&job, &instance);
                let _ = tx.send((index, report));
            });

            next += 1;
            running += 1;
        }

        if running == 0 {
            break;
        }

        if let Ok((index, report)) = rx.recv() {
            if !report.succeeded() && fail_fast && next < total {
                warn!(
                    "Job '{}': instance '{}' failed, cancelling {} pending instance(s)",
                    job.name,
                    report.identity,
                    total - next
                );
            }
            failed = failed || !report.succeeded();
            reports[index] = Some(report);
            running -= 1;
        } else {
            break;
        }
    }

    // Whatever never launched is cancelled, not failed.
    let instances = reports
        .into_iter()
        .enumerate()
        .map(|(i, report)| report.unwrap_or_else(|| InstanceReport::cancelled(&identities[i])))
        .collect();

    JobReport {
        name: job.name.clone(),
        instances,
        error: None,
    }
}

/// Resolves and prints every instance's step sequence without executing
/// anything. Resolution errors still fail the instance.
fn dry_run_job(job: &Job, instances: &[RunInstance]) -> JobReport {
    let mut reports = Vec::with_capacity(instances.len());

    for instance in instances {
        let identity = instance_identity(&job.name, instance);
        let ctx = EvalContext::new(&job.name, instance);

        let mut steps = Vec::with_capacity(job.steps.len());
        let mut failure = None;

        for (i, step) in job.steps.iter().enumerate() {
            match resolve_step(&ctx, step) {
                Ok(resolved) => steps.push(resolved),
                Err(e) => {
                    failure = Some((i, e));
                    break;
                }
            }
        }

        match failure {
            None => {
                println!("[DRY RUN] {}", identity);
                for step in &steps {
                    println!("[DRY RUN]   {}", step.name);
                }
                reports.push(InstanceReport {
                    identity,
                    status: InstanceStatus::Passed,
                    steps: steps
                        .iter()
                        .map(|s| StepReport::passed(&s.name, String::new(), 0))
                        .collect(),
                    duration_ms: 0,
                });
            }
            Some((index, e)) => {
                error!("[DRY RUN] {} failed to resolve: {}", identity, e);
                reports.push(InstanceReport {
                    identity,
                    status: InstanceStatus::Failed,
                    steps: job
                        .steps
                        .iter()
                        .enumerate()
                        .map(|(i, step)| {
                            if i == index {
                                StepReport::failed(
                                    step.display_name(),
                                    e.to_string(),
                                    String::new(),
                                    0,
                                )
                            } else {
                                StepReport::skipped(step.display_name())
                            }
                        })
                        .collect(),
                    duration_ms: 0,
                });
            }
        }
    }

    JobReport {
        name: job.name.clone(),
        instances: reports,
        error: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::report::{InstanceStatus, StepStatus};
    use crate::workflow::model::{Step, Strategy};

    fn single_job_workflow(job: Job) -> Workflow {
        Workflow::from_jobs(vec![job])
    }

    #[test]
    fn test_engine_runs_simple_workflow() {
        let job = Job::new("test", "ubuntu-latest").with_step(Step::run("true"));
        let engine = Engine::new(single_job_workflow(job));

        let report = engine.run();
        assert!(report.succeeded());
        assert_eq!(report.jobs.len(), 1);
        assert_eq!(report.jobs[0].instances.len(), 1);
        assert_eq!(report.jobs[0].instances[0].identity, "test");
    }

    #[test]
    fn test_engine_matrix_expansion_runs_every_instance() {
        let job = Job::new("test", "ubuntu-latest")
            .with_strategy(
                Strategy::new()
                    .with_axis("rust", &["nightly", "stable"])
                    .with_axis("target", &["T1", "T2"]),
            )
            .with_step(Step::run("true"));
        let engine = Engine::new(single_job_workflow(job));

        let report = engine.run();
        assert!(report.succeeded());
        assert_eq!(report.jobs[0].instances.len(), 4);

        let identities: Vec<&str> = report.jobs[0]
            .instances
            .iter()
            .map(|i| i.identity.as_str())
            .collect();
        assert_eq!(
            identities,
            vec![
                "test (nightly, T1)",
                "test (nightly, T2)",
                "test (stable, T1)",
                "test (stable, T2)",
            ]
        );
    }

    #[test]
    fn test_engine_fail_fast_cancels_pending() {
        // Serial execution makes the cancellation point deterministic:
        // the first instance fails, so the rest never launch.
        let job = Job::new("test", "ubuntu-latest")
            .with_strategy(Strategy::new().with_axis("n", &["1", "2", "3"]))
            .with_step(Step::run("false"));
        let mut engine = Engine::new(single_job_workflow(job));
        engine.set_max_parallel_instances(1);

        let report = engine.run();
        assert!(!report.succeeded());

        let instances = &report.jobs[0].instances;
        assert_eq!(instances[0].status, InstanceStatus::Failed);
        assert_eq!(instances[1].status, InstanceStatus::Cancelled);
        assert_eq!(instances[2].status, InstanceStatus::Cancelled);
    }

    #[test]
    fn test_engine_fail_fast_lets_in_flight_instance_finish() {
        // With two slots, the first instance fails almost immediately
        // while the second is still sleeping. The failure must only stop
        // the third from launching; the in-flight second instance runs to
        // completion and reports its true result.
        let job = Job::new("test", "ubuntu-latest")
            .with_strategy(Strategy::new().with_axis("n", &["1", "2", "3"]))
            .with_step(Step::run(
                "case ${{ matrix.n }} in 1) exit 1 ;; 2) sleep 1 ;; esac",
            ));
        let mut engine = Engine::new(single_job_workflow(job));
        engine.set_max_parallel_instances(2);

        let report = engine.run();
        assert!(!report.succeeded());

        let instances = &report.jobs[0].instances;
        assert_eq!(instances[0].status, InstanceStatus::Failed);
        assert_eq!(instances[1].status, InstanceStatus::Passed);
        assert_eq!(instances[2].status, InstanceStatus::Cancelled);
    }

    #[test]
    fn test_engine_no_fail_fast_runs_everything() {
        let job = Job::new("test", "ubuntu-latest")
            .with_strategy(
                Strategy::new()
                    .fail_fast(false)
                    .with_axis("n", &["1", "2", "3"]),
            )
            .with_step(Step::run("test ${{ matrix.n }} = 2"));
        let mut engine = Engine::new(single_job_workflow(job));
        engine.set_max_parallel_instances(1);

        let report = engine.run();
        assert!(!report.succeeded());

        let statuses: Vec<&InstanceStatus> = report.jobs[0]
            .instances
            .iter()
            .map(|i| &i.status)
            .collect();
        assert_eq!(
            statuses,
            vec![
                &InstanceStatus::Failed,
                &InstanceStatus::Passed,
                &InstanceStatus::Failed,
            ]
        );
    }

    #[test]
    fn test_engine_one_failing_job_fails_workflow() {
        let good = Job::new("good", "ubuntu-latest").with_step(Step::run("true"));
        let bad = Job::new("bad", "ubuntu-latest").with_step(Step::run("false"));
        let engine = Engine::new(Workflow::from_jobs(vec![good, bad]));

        let report = engine.run();
        assert!(!report.succeeded());
        assert!(report.jobs[0].succeeded());
        assert!(!report.jobs[1].succeeded());
    }

    #[test]
    fn test_engine_reports_jobs_in_declaration_order() {
        let jobs: Vec<Job> = ["a", "b", "c", "d"]
            .iter()
            .map(|name| Job::new(*name, "ubuntu-latest").with_step(Step::run("true")))
            .collect();
        let mut engine = Engine::new(Workflow::from_jobs(jobs));
        engine.set_max_parallel_jobs(4);

        let report = engine.run();
        let names: Vec<&str> = report.jobs.iter().map(|j| j.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_engine_empty_matrix_is_job_error() {
        let job = Job::new("test", "ubuntu-latest")
            .with_strategy(Strategy {
                fail_fast: true,
                matrix: Some(Vec::new()),
            })
            .with_step(Step::run("true"));
        let engine = Engine::new(single_job_workflow(job));

        let report = engine.run();
        assert!(!report.succeeded());
        assert!(report.jobs[0].error.is_some());
        assert!(report.jobs[0].instances.is_empty());
    }

    #[test]
    fn test_engine_interpolates_matrix_into_commands() {
        let job = Job::new("test", "ubuntu-latest")
            .with_strategy(Strategy::new().with_axis("word", &["alpha", "beta"]))
            .with_step(Step::run("echo ${{ matrix.word }}"));
        let engine = Engine::new(single_job_workflow(job));

        let report = engine.run();
        assert!(report.succeeded());

        let outputs: Vec<String> = report.jobs[0]
            .instances
            .iter()
            .map(|i| i.steps[0].output.trim().to_string())
            .collect();
        assert_eq!(outputs, vec!["alpha", "beta"]);
    }

    #[test]
    fn test_engine_registered_uses_handler_runs() {
        let job = Job::new("test", "ubuntu-latest")
            .with_step(Step::uses("checkout"))
            .with_step(Step::run("true"));
        let mut engine = Engine::new(single_job_workflow(job));
        engine.register_action_handler("checkout", "echo fetched");

        let report = engine.run();
        assert!(report.succeeded());
        assert_eq!(report.jobs[0].instances[0].steps[0].output.trim(), "fetched");
    }

    #[test]
    fn test_engine_unregistered_uses_is_noop() {
        let job = Job::new("test", "ubuntu-latest").with_step(Step::uses("cache"));
        let engine = Engine::new(single_job_workflow(job));

        let report = engine.run();
        assert!(report.succeeded());
    }

    #[test]
    fn test_engine_dry_run_executes_nothing() {
        use tempfile::tempdir;

        let temp_dir = tempdir().unwrap();
        let marker = temp_dir.path().join("ran");

        let job = Job::new("test", "ubuntu-latest")
            .with_step(Step::run(format!("touch {}", marker.display())));
        let mut engine = Engine::new(single_job_workflow(job));
        engine.set_dry_run(true);

        let report = engine.run();
        assert!(report.succeeded());
        assert!(!marker.exists());
    }

    #[test]
    fn test_engine_dry_run_surfaces_resolution_errors() {
        let job = Job::new("test", "ubuntu-latest")
            .with_step(Step::run("echo ${{ matrix.missing }}"));
        let mut engine = Engine::new(single_job_workflow(job));
        engine.set_dry_run(true);

        let report = engine.run();
        assert!(!report.succeeded());
        assert!(matches!(
            report.jobs[0].instances[0].steps[0].status,
            StepStatus::Failed(_)
        ));
    }

    #[test]
    fn test_engine_step_timeout_applies() {
        let job = Job::new("test", "ubuntu-latest").with_step(Step::run("sleep 5"));
        let mut engine = Engine::new(single_job_workflow(job));
        engine.set_step_timeout(Duration::from_millis(200));

        let started = std::time::Instant::now();
        let report = engine.run();

        assert!(!report.succeeded());
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    fn test_engine_working_dir_applies() {
        use tempfile::tempdir;

        let temp_dir = tempdir().unwrap();
        let job = Job::new("test", "ubuntu-latest").with_step(Step::run("touch here"));
        let mut engine = Engine::new(single_job_workflow(job));
        engine.set_working_dir(temp_dir.path());

        let report = engine.run();
        assert!(report.succeeded());
        assert!(temp_dir.path().join("here").exists());
    }
}
