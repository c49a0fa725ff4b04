//! Build Matrix Expansion
//!
//! Turns a job's declared matrix axes into the ordered cartesian product
//! of concrete run instances. Expansion is a pure function of the
//! strategy: axis order and value order are preserved, and instances come
//! out in standard nested-loop order (the last declared axis varies
//! fastest).

use log::debug;

use crate::error::MatrixError;

use super::model::Strategy;

/// One concrete combination of axis values, executed as an independent
/// sequence of steps.
///
/// Bindings are kept in declared axis order; the derived identity is the
/// tuple of bound values in that order.
#[derive(Debug, Clone, PartialEq)]
pub struct RunInstance {
    bindings: Vec<(String, String)>,
}

impl RunInstance {
    /// Creates the single instance of a job without a matrix.
    pub fn empty() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Looks up the bound value for an axis.
    pub fn get(&self, axis: &str) -> Option<&str> {
        self.bindings
            .iter()
            .find(|(name, _)| name == axis)
            .map(|(_, value)| value.as_str())
    }

    /// Returns the bindings in declared axis order.
    pub fn bindings(&self) -> &[(String, String)] {
        &self.bindings
    }

    /// Returns true if this instance carries no bindings.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Derived identity: bound values joined in declared axis order.
    ///
    /// Empty for the single instance of a matrix-less job.
    pub fn identity(&self) -> String {
        self.bindings
            .iter()
            .map(|(_, value)| value.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn bind(&self, axis: &str, value: &str) -> Self {
        let mut bindings = self.bindings.clone();
        bindings.push((axis.to_string(), value.to_string()));
        Self { bindings }
    }
}

/// Expands a job's strategy into its run instances.
///
/// - No strategy, or a strategy without a `matrix` key: one instance with
///   empty bindings.
/// - A declared matrix with no axes, or any axis with no values: a
///   [`MatrixError`], fatal to the owning job before any instance starts.
/// - Otherwise the full cartesian product; the instance count equals the
///   product of the axis cardinalities.
pub fn expand(strategy: Option<&Strategy>) -> Result<Vec<RunInstance>, MatrixError> {
    let axes = match strategy.and_then(|s| s.matrix.as_ref()) {
        None => return Ok(vec![RunInstance::empty()]),
        Some(axes) => axes,
    };

    if axes.is_empty() {
        return Err(MatrixError::EmptyMatrix);
    }

    let mut instances = vec![RunInstance::empty()];

    for axis in axes {
        if axis.values.is_empty() {
            return Err(MatrixError::EmptyAxis {
                axis: axis.name.clone(),
            });
        }

        instances = instances
            .iter()
            .flat_map(|instance| {
                axis.values
                    .iter()
                    .map(|value| instance.bind(&axis.name, value))
            })
            .collect();
    }

    debug!(
        "Expanded {} axes into {} instance(s)",
        axes.len(),
        instances.len()
    );

    Ok(instances)
}
