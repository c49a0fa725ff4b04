//! Workflow Parser
//!
//! Handles loading and parsing workflow definitions from YAML files.
//! The on-disk format mirrors the usual CI vocabulary (`jobs.<id>.runs-on`,
//! `strategy.fail-fast`, `strategy.matrix.<axis>`, `steps[].run`/`.uses`)
//! while the in-memory model stays provider-agnostic.
//!
//! Job declaration order and matrix axis declaration order are both
//! preserved: the former fixes report ordering, the latter fixes the
//! matrix product ordering.

use std::collections::HashMap;
use std::fs;

use log::{debug, info};
use serde::Deserialize;
use serde_yaml::{Mapping, Value};

use crate::error::{ParseError, ValidationError};

use super::model::{Axis, Job, Step, StepKind, Strategy, Workflow};
use super::validator::validate_workflow;

/// Top-level workflow file shape.
#[derive(Deserialize)]
struct WorkflowFile {
    /// Mapping preserves declaration order of jobs
    jobs: Mapping,
}

/// Raw job entry before conversion into the model.
#[derive(Deserialize)]
struct JobFile {
    #[serde(rename = "runs-on")]
    runs_on: String,

    strategy: Option<StrategyFile>,

    #[serde(default)]
    steps: Vec<StepFile>,
}

/// Raw strategy entry.
#[derive(Deserialize)]
struct StrategyFile {
    #[serde(rename = "fail-fast", default = "default_fail_fast")]
    fail_fast: bool,

    /// Absent key and `matrix: {}` are different configurations, so the
    /// distinction must survive parsing
    matrix: Option<Mapping>,
}

/// The provider default: stop launching instances after the first failure.
fn default_fail_fast() -> bool {
    true
}

/// Raw step entry. Exactly one of `run`/`uses` must be present.
#[derive(Deserialize)]
struct StepFile {
    name: Option<String>,
    run: Option<String>,
    uses: Option<String>,

    #[serde(default)]
    with: HashMap<String, Value>,

    #[serde(rename = "gate-output", default)]
    gate_output: bool,
}

/// Coerces a YAML scalar to its string form.
///
/// Matrix values and `with` parameters are commonly written as bare
/// numbers or booleans (`rust: [1.63, stable]`, `use-cross: true`); the
/// engine works on strings throughout.
fn scalar_to_string(key: &str, value: &Value) -> Result<String, ValidationError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(ValidationError::NonScalarValue {
            key: key.to_string(),
        }),
    }
}

/// Converts a raw matrix mapping into ordered axes.
fn convert_matrix(matrix: Mapping) -> Result<Vec<Axis>, ValidationError> {
    let mut axes = Vec::with_capacity(matrix.len());

    for (key, value) in matrix {
        let name = scalar_to_string("matrix", &key)?;

        let values = match value {
            Value::Sequence(seq) => seq
                .iter()
                .map(|v| scalar_to_string(&name, v))
                .collect::<Result<Vec<_>, _>>()?,
            // A bare scalar is a single-value axis
            other => vec![scalar_to_string(&name, &other)?],
        };

        debug!("Matrix axis '{}': {} value(s)", name, values.len());
        axes.push(Axis::new(name, values));
    }

    Ok(axes)
}

/// Converts a raw step entry, enforcing the run/uses exclusivity rule.
fn convert_step(job: &str, index: usize, raw: StepFile) -> Result<Step, ValidationError> {
    let kind = match (raw.run, raw.uses) {
        (Some(command), None) => StepKind::Run(command.trim().to_string()),
        (None, Some(reference)) => StepKind::Uses(reference.trim().to_string()),
        (Some(_), Some(_)) => {
            return Err(ValidationError::AmbiguousStep {
                job: job.to_string(),
                index,
            })
        }
        (None, None) => {
            return Err(ValidationError::MissingAction {
                job: job.to_string(),
                index,
            })
        }
    };

    let mut with = HashMap::with_capacity(raw.with.len());
    for (key, value) in raw.with {
        let coerced = scalar_to_string(&key, &value)?;
        with.insert(key, coerced);
    }

    Ok(Step {
        name: raw.name,
        kind,
        with,
        gate_output: raw.gate_output,
    })
}

/// Converts a raw job entry into the model.
fn convert_job(name: String, raw: JobFile) -> Result<Job, ValidationError> {
    let strategy = match raw.strategy {
        None => None,
        Some(s) => Some(Strategy {
            fail_fast: s.fail_fast,
            matrix: s.matrix.map(convert_matrix).transpose()?,
        }),
    };

    let steps = raw
        .steps
        .into_iter()
        .enumerate()
        .map(|(index, step)| convert_step(&name, index, step))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Job {
        name,
        runs_on: raw.runs_on,
        strategy,
        steps,
    })
}

/// Parses a workflow from YAML text.
///
/// This performs the full pipeline: YAML deserialization, conversion into
/// the provider-agnostic model, and structural validation. Any error here
/// is fatal before any job is scheduled.
pub fn parse_workflow(yaml: &str) -> Result<Workflow, ParseError> {
    let file: WorkflowFile = serde_yaml::from_str(yaml)?;

    let mut workflow = Workflow::new();

    for (key, value) in file.jobs {
        let name = scalar_to_string("jobs", &key)?;
        let raw: JobFile = serde_yaml::from_value(value)?;
        let job = convert_job(name, raw)?;
        workflow.add_job(job)?;
    }

    validate_workflow(&workflow)?;

    Ok(workflow)
}

/// Loads a workflow from a YAML file.
///
/// # Example
///
/// ```rust,no_run
/// use gridrunner::workflow::load_workflow;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let workflow = load_workflow("pipeline.yaml")?;
///     println!("Loaded {} jobs", workflow.jobs.len());
///     Ok(())
/// }
/// ```
pub fn load_workflow(path: &str) -> Result<Workflow, ParseError> {
    info!("Loading workflow from: {}", path);

    let yaml_content = fs::read_to_string(path).map_err(|e| ParseError::Io {
        path: path.to_string(),
        source: e,
    })?;

    debug!("YAML content loaded ({} bytes)", yaml_content.len());

    let workflow = parse_workflow(&yaml_content)?;

    info!("Parsed {} job(s)", workflow.jobs.len());

    Ok(workflow)
}
