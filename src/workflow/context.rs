//! Interpolation and Condition Evaluation
//!
//! Resolves `${{ ... }}` tokens in step fields against a run instance's
//! bound axis values and the owning job's identity. A token may be:
//!
//! - a lookup: `matrix.<axis>` or `job.name`
//! - a quoted literal: `'nightly'`
//! - a comparison: `<operand> == <operand>` or `<operand> != <operand>`,
//!   substituted as `true`/`false`
//!
//! Every token must resolve; an unresolvable token is fatal to the owning
//! run instance before any step executes.

use crate::error::EvalError;

use super::matrix::RunInstance;

/// Evaluation context for one run instance: the job's identity plus the
/// instance's axis bindings.
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    job_name: &'a str,
    instance: &'a RunInstance,
}

impl<'a> EvalContext<'a> {
    /// Creates a context for a run instance of the named job.
    pub fn new(job_name: &'a str, instance: &'a RunInstance) -> Self {
        Self { job_name, instance }
    }

    /// Substitutes every interpolation token in a template.
    ///
    /// Text outside tokens passes through unchanged.
    pub fn interpolate(&self, template: &str) -> Result<String, EvalError> {
        let mut result = String::with_capacity(template.len());
        let mut rest = template;

        while let Some(start) = rest.find("${{") {
            result.push_str(&rest[..start]);

            let after = &rest[start + 3..];
            let end = after
                .find("}}")
                .ok_or_else(|| EvalError::UnterminatedToken(template.to_string()))?;

            let resolved = self.resolve_expr(after[..end].trim())?;
            result.push_str(&resolved);

            rest = &after[end + 2..];
        }

        result.push_str(rest);
        Ok(result)
    }

    /// Interpolates a template and requires a boolean result.
    ///
    /// This is how per-instance conditionals are derived, e.g.
    /// `${{ matrix.target != 'x86_64-unknown-linux-gnu' }}` selecting
    /// cross-compilation tooling for non-native targets.
    pub fn evaluate_bool(&self, template: &str) -> Result<bool, EvalError> {
        match self.interpolate(template)?.trim() {
            "true" => Ok(true),
            "false" => Ok(false),
            other => Err(EvalError::InvalidExpression(other.to_string())),
        }
    }

    /// Resolves the expression inside one token.
    fn resolve_expr(&self, expr: &str) -> Result<String, EvalError> {
        if let Some((lhs, negated, rhs)) = split_comparison(expr) {
            let left = self.resolve_operand(lhs.trim())?;
            let right = self.resolve_operand(rhs.trim())?;
            let equal = left == right;
            return Ok((equal != negated).to_string());
        }

        self.resolve_operand(expr)
    }

    /// Resolves a single operand: quoted literal, `matrix.*`, or `job.*`.
    fn resolve_operand(&self, operand: &str) -> Result<String, EvalError> {
        if operand.len() >= 2 && operand.starts_with('\'') && operand.ends_with('\'') {
            return Ok(operand[1..operand.len() - 1].to_string());
        }

        if let Some(axis) = operand.strip_prefix("matrix.") {
            return self
                .instance
                .get(axis)
                .map(str::to_string)
                .ok_or_else(|| EvalError::UnknownAxis(axis.to_string()));
        }

        if let Some(field) = operand.strip_prefix("job.") {
            if field == "name" {
                return Ok(self.job_name.to_string());
            }
            return Err(EvalError::UnknownJobField(field.to_string()));
        }

        Err(EvalError::InvalidExpression(operand.to_string()))
    }
}

/// Splits a comparison expression at its `==`/`!=` operator.
///
/// The operator is only recognized outside single quotes, so literals may
/// contain either symbol. Returns (lhs, negated, rhs).
fn split_comparison(expr: &str) -> Option<(&str, bool, &str)> {
    let bytes = expr.as_bytes();
    let mut in_quote = false;

    for i in 0..bytes.len().saturating_sub(1) {
        match bytes[i] {
            b'\'' => in_quote = !in_quote,
            b'=' | b'!' if !in_quote && bytes[i + 1] == b'=' => {
                return Some((&expr[..i], bytes[i] == b'!', &expr[i + 2..]));
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::matrix::expand;
    use crate::workflow::model::Strategy;

    const NATIVE: &str = "x86_64-unknown-linux-gnu";

    fn instance_for(target: &str) -> RunInstance {
        let strategy = Strategy::new()
            .with_axis("rust", &["stable"])
            .with_axis("target", &[target]);
        expand(Some(&strategy)).unwrap().remove(0)
    }

    #[test]
    fn test_interpolate_matrix_token() {
        let instance = instance_for("armv7-unknown-linux-gnueabihf");
        let ctx = EvalContext::new("test", &instance);

        let result = ctx
            .interpolate("cargo test --target ${{ matrix.target }}")
            .unwrap();
        assert_eq!(result, "cargo test --target armv7-unknown-linux-gnueabihf");
    }

    #[test]
    fn test_interpolate_job_name() {
        let instance = RunInstance::empty();
        let ctx = EvalContext::new("docs", &instance);

        let result = ctx.interpolate("job=${{ job.name }}").unwrap();
        assert_eq!(result, "job=docs");
    }

    #[test]
    fn test_interpolate_multiple_tokens() {
        let instance = instance_for("T1");
        let ctx = EvalContext::new("test", &instance);

        let result = ctx
            .interpolate("${{ matrix.rust }}/${{ matrix.target }}")
            .unwrap();
        assert_eq!(result, "stable/T1");
    }

    #[test]
    fn test_interpolate_no_tokens_passthrough() {
        let instance = RunInstance::empty();
        let ctx = EvalContext::new("test", &instance);

        let result = ctx.interpolate("cargo fmt -- --check").unwrap();
        assert_eq!(result, "cargo fmt -- --check");
    }

    #[test]
    fn test_interpolate_unknown_axis() {
        let instance = instance_for("T1");
        let ctx = EvalContext::new("test", &instance);

        let result = ctx.interpolate("${{ matrix.unknownAxis }}");
        assert_eq!(
            result,
            Err(EvalError::UnknownAxis("unknownAxis".to_string()))
        );
    }

    #[test]
    fn test_interpolate_unknown_job_field() {
        let instance = RunInstance::empty();
        let ctx = EvalContext::new("test", &instance);

        let result = ctx.interpolate("${{ job.id }}");
        assert_eq!(result, Err(EvalError::UnknownJobField("id".to_string())));
    }

    #[test]
    fn test_interpolate_unterminated_token() {
        let instance = RunInstance::empty();
        let ctx = EvalContext::new("test", &instance);

        let result = ctx.interpolate("before ${{ matrix.rust");
        assert!(matches!(result, Err(EvalError::UnterminatedToken(_))));
    }

    #[test]
    fn test_use_cross_false_for_native_target() {
        let instance = instance_for(NATIVE);
        let ctx = EvalContext::new("test", &instance);

        let use_cross = ctx
            .evaluate_bool("${{ matrix.target != 'x86_64-unknown-linux-gnu' }}")
            .unwrap();
        assert!(!use_cross);
    }

    #[test]
    fn test_use_cross_true_for_other_targets() {
        for target in ["armv7-unknown-linux-gnueabihf", "thumbv7em-none-eabi"] {
            let instance = instance_for(target);
            let ctx = EvalContext::new("test", &instance);

            let use_cross = ctx
                .evaluate_bool("${{ matrix.target != 'x86_64-unknown-linux-gnu' }}")
                .unwrap();
            assert!(use_cross, "expected cross for target {}", target);
        }
    }

    #[test]
    fn test_equality_comparison() {
        let instance = instance_for("T1");
        let ctx = EvalContext::new("test", &instance);

        assert!(ctx.evaluate_bool("${{ matrix.rust == 'stable' }}").unwrap());
        assert!(!ctx.evaluate_bool("${{ matrix.rust == 'nightly' }}").unwrap());
    }

    #[test]
    fn test_comparison_between_lookups() {
        let instance = instance_for("T1");
        let ctx = EvalContext::new("stable", &instance);

        // Both sides resolve before comparison
        assert!(ctx.evaluate_bool("${{ matrix.rust == job.name }}").unwrap());
    }

    #[test]
    fn test_quoted_literal_may_contain_operator() {
        let instance = instance_for("a==b");
        let ctx = EvalContext::new("test", &instance);

        assert!(ctx.evaluate_bool("${{ matrix.target == 'a==b' }}").unwrap());
    }

    #[test]
    fn test_evaluate_bool_rejects_non_boolean() {
        let instance = instance_for("T1");
        let ctx = EvalContext::new("test", &instance);

        let result = ctx.evaluate_bool("${{ matrix.rust }}");
        assert!(matches!(result, Err(EvalError::InvalidExpression(_))));
    }

    #[test]
    fn test_evaluate_bool_plain_literal() {
        let instance = RunInstance::empty();
        let ctx = EvalContext::new("test", &instance);

        assert!(ctx.evaluate_bool("true").unwrap());
        assert!(!ctx.evaluate_bool("false").unwrap());
    }

    #[test]
    fn test_bare_word_operand_rejected() {
        let instance = instance_for("T1");
        let ctx = EvalContext::new("test", &instance);

        let result = ctx.interpolate("${{ nightly }}");
        assert!(matches!(result, Err(EvalError::InvalidExpression(_))));
    }
}
