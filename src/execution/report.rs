//! Execution Reports
//!
//! Status tracking and reporting for steps, run instances, jobs, and the
//! workflow as a whole. Only the aggregate workflow status decides the
//! process exit code, but per-instance detail (which axis combination
//! failed, the captured output) stays retrievable for diagnosis.

use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use colored::Colorize;
use log::info;
use serde::{Deserialize, Serialize};

/// Outcome of a single step within a run instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StepStatus {
    /// Step completed with exit 0 and a clean gate
    Passed,
    /// Step failed, with the reason
    Failed(String),
    /// Step never ran because an earlier step failed
    Skipped,
}

/// Report for one executed (or skipped) step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    /// Resolved display name
    pub name: String,

    /// Final status after any gate override
    pub status: StepStatus,

    /// Captured combined output
    pub output: String,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u128,
}

impl StepReport {
    /// Creates a passed step report.
    pub fn passed(name: impl Into<String>, output: String, duration_ms: u128) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Passed,
            output,
            duration_ms,
        }
    }

    /// Creates a failed step report with its reason.
    pub fn failed(
        name: impl Into<String>,
        reason: String,
        output: String,
        duration_ms: u128,
    ) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Failed(reason),
            output,
            duration_ms,
        }
    }

    /// Creates a skipped step report.
    pub fn skipped(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: StepStatus::Skipped,
            output: String::new(),
            duration_ms: 0,
        }
    }

    /// Returns true unless the step failed.
    pub fn succeeded(&self) -> bool {
        !matches!(self.status, StepStatus::Failed(_))
    }
}

/// Outcome of one run instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InstanceStatus {
    /// All steps passed
    Passed,
    /// A step failed or resolution failed
    Failed,
    /// Never started because fail-fast stopped the job
    Cancelled,
}

/// Report for one run instance, identified by its axis-value tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstanceReport {
    /// Job name plus bound axis values, e.g. `test (stable, T1)`
    pub identity: String,

    /// Aggregate instance status
    pub status: InstanceStatus,

    /// Per-step detail in execution order
    pub steps: Vec<StepReport>,

    /// Wall-clock duration in milliseconds
    pub duration_ms: u128,
}

impl InstanceReport {
    /// Creates a report for an instance cancelled before it started.
    pub fn cancelled(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            status: InstanceStatus::Cancelled,
            steps: Vec::new(),
            duration_ms: 0,
        }
    }

    /// Returns true if the instance did not fail.
    ///
    /// Cancelled instances are not failures: they carry no result at all.
    pub fn succeeded(&self) -> bool {
        self.status != InstanceStatus::Failed
    }
}

/// Report for one job: its instances plus any definition-level error
/// (e.g. a matrix that failed to expand).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobReport {
    /// Job name
    pub name: String,

    /// One report per launched or cancelled instance
    pub instances: Vec<InstanceReport>,

    /// Definition-level failure, set when no instance ever launched
    pub error: Option<String>,
}

impl JobReport {
    /// Aggregate job status: failure iff the definition was invalid or at
    /// least one instance failed.
    pub fn succeeded(&self) -> bool {
        self.error.is_none() && self.instances.iter().all(|i| i.succeeded())
    }
}

/// Top-level report for a workflow run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowReport {
    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run finished
    pub finished_at: DateTime<Utc>,

    /// One report per job, in declaration order
    pub jobs: Vec<JobReport>,
}

impl WorkflowReport {
    /// The workflow succeeds iff every job succeeded.
    pub fn succeeded(&self) -> bool {
        self.jobs.iter().all(|j| j.succeeded())
    }

    /// Saves the report as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Saved workflow report to {}", path.display());
        Ok(())
    }

    /// Prints a colored per-job, per-instance summary.
    pub fn print_summary(&self) {
        println!();
        for job in &self.jobs {
            let marker = if job.succeeded() {
                "PASS".green()
            } else {
                "FAIL".red()
            };
            println!("{} job '{}'", marker, job.name);

            if let Some(ref error) = job.error {
                println!("       {}", error.red());
            }

            for instance in &job.instances {
                let marker = match instance.status {
                    InstanceStatus::Passed => "pass".green(),
                    InstanceStatus::Failed => "fail".red(),
                    InstanceStatus::Cancelled => "skip".yellow(),
                };
                println!("  {} {} ({} ms)", marker, instance.identity, instance.duration_ms);

                for step in &instance.steps {
                    if let StepStatus::Failed(ref reason) = step.status {
                        println!("       step '{}': {}", step.name, reason);
                    }
                }
            }
        }

        println!();
        if self.succeeded() {
            println!("Workflow result: {}", "PASSED".green().bold());
        } else {
            println!("Workflow result: {}", "FAILED".red().bold());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passed_instance(identity: &str) -> InstanceReport {
        InstanceReport {
            identity: identity.to_string(),
            status: InstanceStatus::Passed,
            steps: vec![StepReport::passed("step", String::new(), 1)],
            duration_ms: 1,
        }
    }

    fn failed_instance(identity: &str) -> InstanceReport {
        InstanceReport {
            identity: identity.to_string(),
            status: InstanceStatus::Failed,
            steps: vec![StepReport::failed(
                "step",
                "action exited with code 1".to_string(),
                String::new(),
                1,
            )],
            duration_ms: 1,
        }
    }

    #[test]
    fn test_step_report_succeeded() {
        assert!(StepReport::passed("s", String::new(), 0).succeeded());
        assert!(StepReport::skipped("s").succeeded());
        assert!(!StepReport::failed("s", "boom".to_string(), String::new(), 0).succeeded());
    }

    #[test]
    fn test_cancelled_instance_is_not_a_failure() {
        let cancelled = InstanceReport::cancelled("test (stable, T2)");
        assert_eq!(cancelled.status, InstanceStatus::Cancelled);
        assert!(cancelled.succeeded());
    }

    #[test]
    fn test_job_aggregate_status() {
        let job = JobReport {
            name: "test".to_string(),
            instances: vec![passed_instance("a"), failed_instance("b")],
            error: None,
        };
        assert!(!job.succeeded());

        let job = JobReport {
            name: "test".to_string(),
            instances: vec![passed_instance("a"), InstanceReport::cancelled("b")],
            error: None,
        };
        assert!(job.succeeded());
    }

    #[test]
    fn test_job_definition_error_is_failure() {
        let job = JobReport {
            name: "test".to_string(),
            instances: Vec::new(),
            error: Some("matrix declares no axes".to_string()),
        };
        assert!(!job.succeeded());
    }

    #[test]
    fn test_workflow_fails_iff_any_job_fails() {
        let good = JobReport {
            name: "a".to_string(),
            instances: vec![passed_instance("a")],
            error: None,
        };
        let bad = JobReport {
            name: "b".to_string(),
            instances: vec![failed_instance("b")],
            error: None,
        };

        let report = WorkflowReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            jobs: vec![good.clone()],
        };
        assert!(report.succeeded());

        let report = WorkflowReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            jobs: vec![good, bad],
        };
        assert!(!report.succeeded());
    }

    #[test]
    fn test_report_json_round_trip() {
        let report = WorkflowReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            jobs: vec![JobReport {
                name: "test".to_string(),
                instances: vec![failed_instance("test (stable, T1)")],
                error: None,
            }],
        };

        let json = serde_json::to_string(&report).unwrap();
        let parsed: WorkflowReport = serde_json::from_str(&json).unwrap();

        assert!(!parsed.succeeded());
        assert_eq!(parsed.jobs[0].instances[0].identity, "test (stable, T1)");
    }

    #[test]
    fn test_report_save() {
        use tempfile::tempdir;

        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("report.json");

        let report = WorkflowReport {
            started_at: Utc::now(),
            finished_at: Utc::now(),
            jobs: Vec::new(),
        };

        report.save(&path).unwrap();
        assert!(path.exists());
    }
}
