//! Variable commands.

use rand::seq::SliceRandom;
use rand::Rng;
use serde_json::Value;
use tracing::info;

use super::Exec;
use crate::error::RunError;
use crate::script::command::{
    Add, Contains, ExportJson, ImportJson, Random, RandomRange, RandomValue, Set,
};
use crate::script::context::ExecutionContext;
use crate::script::value::{self, loose_eq, type_name, Num};

impl Exec for Set {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let v = ctx.resolve_set_value(&self.value)?;
        ctx.vars.set(self.var.as_str(), v);
        Ok(())
    }
}

impl Exec for Add {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let delta = ctx.resolve_set_value(&self.value)?;
        let current = ctx.vars.get(&self.var).cloned().unwrap_or(Value::from(0));
        let sum = value::add(&current, &delta)?;
        ctx.vars.set(self.var.as_str(), sum);
        Ok(())
    }
}

/// Substring for strings, membership for lists, key lookup for maps.
/// Mismatched types are simply not contained.
fn contains(needle: &Value, haystack: &Value) -> bool {
    match (needle, haystack) {
        (Value::String(n), Value::String(h)) => h.contains(n.as_str()),
        (n, Value::Array(items)) => items.iter().any(|i| loose_eq(n, i)),
        (Value::String(k), Value::Object(map)) => map.contains_key(k),
        _ => false,
    }
}

impl Exec for Contains {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let needle = ctx.resolve_value(&self.needle)?;
        let haystack = ctx.resolve_value(&self.haystack)?;
        ctx.vars.set(self.out.as_str(), contains(&needle, &haystack));
        Ok(())
    }
}

impl Exec for Random {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let choices = match &self.choices {
            Value::String(s) if s.starts_with('$') => ctx.resolve_value(&self.choices)?,
            v => ctx.resolve_deep(v)?,
        };
        let Value::Array(items) = choices else {
            return Err(RunError::type_error(format!(
                "random: choices must be a list, got {}",
                type_name(&choices)
            )));
        };
        let picked = items
            .choose(&mut ctx.rng)
            .cloned()
            .ok_or_else(|| RunError::type_error("random: choices list is empty"))?;
        ctx.vars.set(self.out.as_str(), picked);
        Ok(())
    }
}

impl Exec for RandomRange {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let min = ctx.resolve_number(&self.min)?;
        let max = ctx.resolve_number(&self.max)?;
        let (lo, hi) = (min.as_f64(), max.as_f64());
        if !lo.is_finite() || !hi.is_finite() {
            return Err(RunError::Invalid(format!(
                "random_range: bounds must be finite, got {min} and {max}"
            )));
        }
        if lo > hi {
            return Err(RunError::Invalid(format!(
                "random_range: min ({min}) cannot be greater than max ({max})"
            )));
        }
        let picked = if self.integer {
            let lo = integer_bound(min)?;
            let hi = integer_bound(max)?;
            Value::from(ctx.rng.gen_range(lo..=hi))
        } else if (hi - lo).is_finite() {
            Num::Float(ctx.rng.gen_range(lo..=hi)).to_json()
        } else {
            return Err(RunError::Invalid(format!(
                "random_range: span from {min} to {max} is too wide"
            )));
        };
        ctx.vars.set(self.out.as_str(), picked);
        Ok(())
    }
}

/// Truncate toward zero; floats outside the `i64` range are rejected
/// rather than saturated.
fn integer_bound(n: Num) -> Result<i64, RunError> {
    match n {
        Num::Int(i) => Ok(i),
        Num::Float(x) if x >= -(2f64.powi(63)) && x < 2f64.powi(63) => Ok(x.trunc() as i64),
        Num::Float(x) => Err(RunError::Invalid(format!(
            "random_range: {x} does not fit an integer range"
        ))),
    }
}

impl Exec for RandomValue {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let x: f64 = ctx.rng.gen();
        ctx.vars.set(self.out.as_str(), x);
        Ok(())
    }
}

impl Exec for ExportJson {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let path = ctx.path(&self.filename)?;
        let data = Value::Object(ctx.vars.to_object(&self.vars));
        std::fs::write(&path, serde_json::to_string_pretty(&data)?)?;
        info!("exported variables to {}", path.display());
        Ok(())
    }
}

impl Exec for ImportJson {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let path = ctx.path(&self.filename)?;
        let text = std::fs::read_to_string(&path)?;
        match serde_json::from_str::<Value>(&text)? {
            Value::Object(map) => {
                ctx.vars.merge(map);
                Ok(())
            }
            other => Err(RunError::type_error(format!(
                "import_json: {} holds {}, expected an object",
                path.display(),
                type_name(&other)
            ))),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::test_support::Rig;
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    #[test]
    fn set_literal_reference_and_formula() {
        let rig = Rig::new(json!([
            {"cmd": "set", "var": "a", "value": [1, 2]},
            {"cmd": "set", "var": "b", "value": "$a"},
            {"cmd": "set", "var": "c", "value": "=2 ** 10"},
            {"cmd": "set", "var": "d", "value": "$a[1]"},
        ]));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert_eq!(ctx.vars.get("b"), Some(&json!([1, 2])));
        assert_eq!(ctx.vars.get("c"), Some(&json!(1024)));
        assert_eq!(ctx.vars.get("d"), Some(&json!(2)));
    }

    #[test]
    fn add_accumulates_from_zero() {
        let rig = Rig::new(json!([
            {"cmd": "add", "var": "n", "value": 2},
            {"cmd": "add", "var": "n", "value": "=0.5"},
        ]));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert_eq!(ctx.vars.get("n"), Some(&json!(2.5)));
    }

    #[test]
    fn add_to_string_is_type_error() {
        let rig = Rig::new(json!([
            {"cmd": "set", "var": "s", "value": "text"},
            {"cmd": "add", "var": "s", "value": 1},
        ]));
        let mut ctx = rig.ctx();
        assert!(matches!(rig.run(&mut ctx), Err(RunError::Type(_))));
    }

    #[test]
    fn failed_formula_aborts() {
        let rig = Rig::new(json!([{"cmd": "set", "var": "x", "value": "=$nope + 1"}]));
        let mut ctx = rig.ctx();
        assert!(matches!(rig.run(&mut ctx), Err(RunError::Eval(_))));
        assert!(ctx.vars.get("x").is_none());
    }

    #[test]
    fn containment() {
        assert!(contains(&json!("ell"), &json!("hello")));
        assert!(contains(&json!(2), &json!([1, 2.0, 3])));
        assert!(contains(&json!("k"), &json!({"k": 1})));
        assert!(!contains(&json!(1), &json!("123")));
        assert!(!contains(&json!("x"), &json!(5)));
    }

    #[test]
    fn random_choice_from_variable() {
        let rig = Rig::new(json!([
            {"cmd": "set", "var": "opts", "value": ["x", "y"]},
            {"cmd": "random", "choices": "$opts", "out": "r"},
        ]));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        let r = ctx.vars.get("r").unwrap();
        assert!(r == &json!("x") || r == &json!("y"));
    }

    #[test]
    fn random_rejects_empty_and_non_lists() {
        let rig = Rig::new(json!([
            {"cmd": "random", "choices": [], "out": "r"},
            {"cmd": "random", "choices": "$missing", "out": "r"},
        ]));
        let mut ctx = rig.ctx();
        assert!(matches!(rig.exec(&mut ctx, 0), Err(RunError::Type(_))));
        assert!(matches!(rig.exec(&mut ctx, 1), Err(RunError::Type(_))));
    }

    #[test]
    fn random_range_is_inclusive() {
        let rig = Rig::new(json!([
            {"cmd": "random_range", "min": 3, "max": 3, "out": "i"},
            {"cmd": "random_range", "min": 0.5, "max": 0.5, "out": "f", "integer": false},
            {"cmd": "random_range", "min": 5, "max": 1, "out": "bad"},
        ]));
        let mut ctx = rig.ctx();
        ctx.rng = StdRng::seed_from_u64(7);
        rig.exec(&mut ctx, 0).unwrap();
        rig.exec(&mut ctx, 1).unwrap();
        assert_eq!(ctx.vars.get("i"), Some(&json!(3)));
        assert_eq!(ctx.vars.get("f"), Some(&json!(0.5)));
        assert!(matches!(rig.exec(&mut ctx, 2), Err(RunError::Invalid(_))));
    }

    #[test]
    fn random_range_rejects_unusable_bounds() {
        let rig = Rig::new(json!([
            {"cmd": "random_range", "min": 0, "max": "=math.inf", "integer": false, "out": "r"},
            {"cmd": "random_range", "min": 0, "max": "=math.inf - math.inf", "out": "r"},
            {"cmd": "random_range", "min": -1e308, "max": 1e308, "integer": false, "out": "r"},
            {"cmd": "random_range", "min": 0, "max": 1e30, "out": "r"},
            {"cmd": "random_range", "min": -2.7, "max": 2.9, "out": "r"},
        ]));
        let mut ctx = rig.ctx();
        for i in 0..4 {
            assert!(matches!(rig.exec(&mut ctx, i), Err(RunError::Invalid(_))), "#{i}");
        }
        assert!(ctx.vars.get("r").is_none());
        rig.exec(&mut ctx, 4).unwrap();
        let r = ctx.vars.get("r").and_then(Value::as_i64).unwrap();
        assert!((-2..=2).contains(&r));
    }

    #[test]
    fn random_value_is_unit_interval() {
        let rig = Rig::new(json!([{"cmd": "random_value", "out": "u"}]));
        let mut ctx = rig.ctx();
        for _ in 0..50 {
            rig.exec(&mut ctx, 0).unwrap();
            let u = ctx.vars.get("u").and_then(Value::as_f64).unwrap();
            assert!((0.0..1.0).contains(&u));
        }
    }

    #[test]
    fn export_then_import() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("vars.json");
        let file = file.to_str().unwrap();
        let rig = Rig::new(json!([
            {"cmd": "set", "var": "a", "value": 1},
            {"cmd": "set", "var": "b", "value": "two"},
            {"cmd": "export_json", "filename": file, "vars": ["a", "zz"]},
            {"cmd": "import_json", "filename": file},
        ]));
        let mut ctx = rig.ctx();
        for i in 0..3 {
            rig.exec(&mut ctx, i).unwrap();
        }
        let written: Value =
            serde_json::from_str(&std::fs::read_to_string(file).unwrap()).unwrap();
        assert_eq!(written, json!({"a": 1}));

        ctx.vars.clear();
        rig.exec(&mut ctx, 3).unwrap();
        assert_eq!(ctx.vars.get("a"), Some(&json!(1)));
        assert!(ctx.vars.get("b").is_none());
    }

    #[test]
    fn import_rejects_non_objects() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("list.json");
        std::fs::write(&file, "[1, 2]").unwrap();
        let rig = Rig::new(json!([{"cmd": "import_json", "filename": file.to_str().unwrap()}]));
        let mut ctx = rig.ctx();
        assert!(matches!(rig.exec(&mut ctx, 0), Err(RunError::Type(_))));
    }

    #[test]
    fn import_missing_file_is_io_error() {
        let rig = Rig::new(json!([{"cmd": "import_json", "filename": "/nonexistent/cmr/x.json"}]));
        let mut ctx = rig.ctx();
        assert!(matches!(rig.exec(&mut ctx, 0), Err(RunError::Io(_))));
    }
}
