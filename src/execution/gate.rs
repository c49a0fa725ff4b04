//! Output Gate
//!
//! A post-hoc check on a step's captured output that can override a
//! successful exit status. The gate reproduces a "treat warnings as
//! errors" policy implemented purely through output inspection: any line
//! that starts, case-insensitively, with `warning` or `error` fails the
//! step even though the tool itself exited 0.
//!
//! Text matching is fragile by construction (it depends on the exact
//! wording an external tool emits), so the rule lives here, isolated
//! from all scheduling logic, and the prefix list is swappable.

/// Scans combined step output for failure-indicating line prefixes.
#[derive(Debug, Clone)]
pub struct OutputGate {
    /// Lowercase prefixes that fail a line
    prefixes: Vec<String>,
}

impl OutputGate {
    /// Creates a gate with the default `warning`/`error` prefixes.
    pub fn new() -> Self {
        Self::with_prefixes(&["warning", "error"])
    }

    /// Creates a gate with a custom prefix list.
    pub fn with_prefixes(prefixes: &[&str]) -> Self {
        Self {
            prefixes: prefixes.iter().map(|p| p.to_lowercase()).collect(),
        }
    }

    /// Scans output line by line and returns the first offending line.
    ///
    /// Returns `None` when the output is clean.
    pub fn scan(&self, output: &str) -> Option<String> {
        for line in output.lines() {
            let lowered = line.to_lowercase();
            if self.prefixes.iter().any(|p| lowered.starts_with(p)) {
                return Some(line.to_string());
            }
        }
        None
    }
}

impl Default for OutputGate {
    fn default() -> Self {
        Self::new()
    }
}
