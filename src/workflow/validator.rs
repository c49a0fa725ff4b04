//! Workflow Validation
//!
//! Structural validation for workflow definitions:
//! - at least one job, unique job names
//! - every job has at least one step
//! - matrix axes are uniquely named
//!
//! Interpolation tokens are deliberately not checked here: they are
//! resolved per run instance at expansion time, where an unresolvable
//! token fails exactly the instance that owns it.

use std::collections::HashSet;

use log::{debug, warn};

use crate::error::ValidationError;

use super::model::Workflow;

/// Validates a workflow's structure.
///
/// Returns the first error found; warnings for suspicious-but-legal
/// shapes are logged instead of failing the workflow.
pub fn validate_workflow(workflow: &Workflow) -> Result<(), ValidationError> {
    if workflow.is_empty() {
        return Err(ValidationError::EmptyWorkflow);
    }

    let mut seen_jobs = HashSet::new();

    for job in &workflow.jobs {
        if !seen_jobs.insert(job.name.as_str()) {
            return Err(ValidationError::DuplicateJob(job.name.clone()));
        }

        if job.steps.is_empty() {
            return Err(ValidationError::NoSteps(job.name.clone()));
        }

        if job.runs_on.trim().is_empty() {
            warn!("Job '{}' has an empty runs-on label", job.name);
        }

        if let Some(axes) = job.strategy.as_ref().and_then(|s| s.matrix.as_ref()) {
            let mut seen_axes = HashSet::new();
            for axis in axes {
                if !seen_axes.insert(axis.name.as_str()) {
                    return Err(ValidationError::DuplicateAxis {
                        job: job.name.clone(),
                        axis: axis.name.clone(),
                    });
                }
            }
        }

        debug!(
            "Job '{}' validated: {} step(s), matrix: {}",
            job.name,
            job.steps.len(),
            job.strategy
                .as_ref()
                .and_then(|s| s.matrix.as_ref())
                .map_or(0, |axes| axes.len())
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::model::{Job, Step, Strategy};

    fn minimal_job(name: &str) -> Job {
        Job::new(name, "ubuntu-latest").with_step(Step::run("true"))
    }

    #[test]
    fn test_validate_empty_workflow() {
        let workflow = Workflow::new();
        assert_eq!(
            validate_workflow(&workflow),
            Err(ValidationError::EmptyWorkflow)
        );
    }

    #[test]
    fn test_validate_minimal_workflow() {
        let workflow = Workflow::from_jobs(vec![minimal_job("test")]);
        assert!(validate_workflow(&workflow).is_ok());
    }

    #[test]
    fn test_validate_duplicate_jobs() {
        // from_jobs bypasses add_job's duplicate check
        let workflow = Workflow::from_jobs(vec![minimal_job("test"), minimal_job("test")]);
        assert_eq!(
            validate_workflow(&workflow),
            Err(ValidationError::DuplicateJob("test".to_string()))
        );
    }

    #[test]
    fn test_validate_job_without_steps() {
        let workflow = Workflow::from_jobs(vec![Job::new("empty", "ubuntu-latest")]);
        assert_eq!(
            validate_workflow(&workflow),
            Err(ValidationError::NoSteps("empty".to_string()))
        );
    }

    #[test]
    fn test_validate_duplicate_axis() {
        let job = minimal_job("test").with_strategy(
            Strategy::new()
                .with_axis("rust", &["stable"])
                .with_axis("rust", &["nightly"]),
        );
        let workflow = Workflow::from_jobs(vec![job]);

        assert_eq!(
            validate_workflow(&workflow),
            Err(ValidationError::DuplicateAxis {
                job: "test".to_string(),
                axis: "rust".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_matrix_job() {
        let job = minimal_job("test").with_strategy(
            Strategy::new()
                .with_axis("rust", &["nightly", "stable"])
                .with_axis("target", &["t1", "t2"]),
        );
        let workflow = Workflow::from_jobs(vec![job]);

        assert!(validate_workflow(&workflow).is_ok());
    }
}
