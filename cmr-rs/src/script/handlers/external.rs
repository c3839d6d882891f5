//! `run_python`: hand off to the process runner and keep its result.

use std::time::Duration;

use serde_json::Value;

use super::Exec;
use crate::error::RunError;
use crate::script::command::RunPython;
use crate::script::context::ExecutionContext;
use crate::script::value::type_name;

const DEFAULT_TIMEOUT_S: f64 = 10.0;

impl RunPython {
    /// The argument list: a literal list, a `$var` holding one, or a JSON
    /// string.  `$` references inside the list are resolved.
    fn arguments(&self, ctx: &ExecutionContext<'_>) -> Result<Value, RunError> {
        let raw = match &self.args {
            None => Value::Array(Vec::new()),
            Some(Value::String(s)) if s.trim().starts_with('$') => {
                ctx.resolve_value(&Value::from(s.trim()))?
            }
            Some(Value::String(s)) => serde_json::from_str(s).map_err(|e| {
                RunError::type_error(format!("run_python: args is not a JSON list: {e}"))
            })?,
            Some(v) => v.clone(),
        };
        match raw {
            Value::Null => Ok(Value::Array(Vec::new())),
            Value::Array(_) => ctx.resolve_deep(&raw),
            other => Err(RunError::type_error(format!(
                "run_python: args must be a list, got {}",
                type_name(&other)
            ))),
        }
    }
}

impl Exec for RunPython {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let file = ctx.path(&self.file)?;
        let args = self.arguments(ctx)?;
        let timeout = match ctx.seconds_or(&self.timeout_s, DEFAULT_TIMEOUT_S)? {
            t if t.is_zero() => Duration::from_secs_f64(DEFAULT_TIMEOUT_S),
            t => t,
        };

        let result = ctx.services.runner.run(&file, &args, timeout)?;

        if let Some(out) = self.out.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
            ctx.vars.set(out, result);
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
