//! Per-run state handed to every command handler.
//!
//! [`ExecutionContext`] owns the variable store and instruction pointer for
//! one run and borrows the read-only pieces (indices, cancellation token,
//! collaborators) from the engine.  A handler that jumps names the next
//! instruction with [`ExecutionContext::jump`]; otherwise the engine moves
//! on to `ip + 1`.

use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::SeedableRng;
use regex::Regex;
use serde_json::{Map, Value};

use super::expr;
use super::index::FlowIndex;
use super::value::{type_name, CompareOp, Num};
use crate::backend::{Capability, SharedBackend};
use crate::error::RunError;
use crate::perception::{FrameProvider, NoFrames, NoOcr, OcrProvider};
use crate::subprocess::{ProcessRunner, PythonRunner};
use crate::timing::CancelToken;
use crate::var::VarStore;

/// External collaborators a run may call on.
#[derive(Clone)]
pub struct Services {
    pub frames: Arc<dyn FrameProvider>,
    pub ocr: Arc<dyn OcrProvider>,
    pub runner: Arc<dyn ProcessRunner>,
}

impl Default for Services {
    fn default() -> Self {
        Self {
            frames: Arc::new(NoFrames),
            ocr: Arc::new(NoOcr),
            runner: Arc::new(PythonRunner::default()),
        }
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Services { .. }")
    }
}

pub struct ExecutionContext<'a> {
    pub vars: VarStore,
    pub ip: usize,
    /// Set by `start_timing`; the zero point for `wait_until`,
    /// `get_elapsed` and `mash.until_ms`.
    pub timing_start: Option<Instant>,
    pub index: &'a FlowIndex,
    pub cancel: &'a CancelToken,
    pub services: &'a Services,
    pub rng: StdRng,
    backend: Option<SharedBackend>,
    next: Option<usize>,
}

impl<'a> ExecutionContext<'a> {
    pub fn new(
        index: &'a FlowIndex,
        cancel: &'a CancelToken,
        services: &'a Services,
        backend: Option<SharedBackend>,
    ) -> Self {
        Self {
            vars: VarStore::new(),
            ip: 0,
            timing_start: None,
            index,
            cancel,
            services,
            rng: StdRng::from_entropy(),
            backend,
            next: None,
        }
    }

    /// Make `target` the next instruction.
    pub fn jump(&mut self, target: usize) {
        self.next = Some(target);
    }

    /// Move to the next instruction and return it.
    pub fn advance(&mut self) -> usize {
        self.ip = self.next.take().unwrap_or(self.ip + 1);
        self.ip
    }

    /// The active backend, provided it is still connected.
    pub fn backend(&self) -> Result<SharedBackend, RunError> {
        match &self.backend {
            Some(b) if b.is_connected() => Ok(Arc::clone(b)),
            _ => Err(RunError::NoBackend),
        }
    }

    /// The active backend, checked for an optional capability.
    pub fn backend_with(
        &self,
        command: &'static str,
        capability: Capability,
    ) -> Result<SharedBackend, RunError> {
        let backend = self.backend()?;
        if !backend.supports(capability) {
            return Err(RunError::Unsupported {
                command,
                capability,
            });
        }
        Ok(backend)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Milliseconds since `start_timing`, or `None` before it.
    pub fn elapsed_ms(&self) -> Option<f64> {
        self.timing_start
            .map(|t| t.elapsed().as_secs_f64() * 1000.0)
    }

    // ── Resolution ────────────────────────────────────────────────────────

    /// `$name` (with optional `[i]`/`[key]` indexing) becomes the variable's
    /// value, or `null` when missing.  Anything else is returned unchanged.
    pub fn resolve_value(&self, v: &Value) -> Result<Value, RunError> {
        match v {
            Value::String(s) if s.starts_with('$') => self.lookup(&s[1..]),
            other => Ok(other.clone()),
        }
    }

    fn lookup(&self, reference: &str) -> Result<Value, RunError> {
        let Some(bracket) = reference.find('[') else {
            return Ok(self.vars.get(reference).cloned().unwrap_or(Value::Null));
        };
        let mut current = match self.vars.get(&reference[..bracket]) {
            Some(v) => v.clone(),
            None => return Ok(Value::Null),
        };
        for cap in subscript()?.captures_iter(&reference[bracket..]) {
            let raw = cap[1].trim();
            let key = if raw.starts_with('$') {
                self.resolve_value(&Value::from(raw))?
            } else if let Ok(n) = raw.parse::<i64>() {
                Value::from(n)
            } else {
                Value::from(raw.trim_matches(|c| c == '"' || c == '\''))
            };
            match subscript_value(&current, &key) {
                Some(next) => current = next,
                None => return Ok(Value::Null),
            }
        }
        Ok(current)
    }

    /// Resolve `$` references inside lists and maps as well.
    pub fn resolve_deep(&self, v: &Value) -> Result<Value, RunError> {
        Ok(match v {
            Value::String(_) => self.resolve_value(v)?,
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .map(|i| self.resolve_deep(i))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, i)| Ok((k.clone(), self.resolve_deep(i)?)))
                    .collect::<Result<Map<_, _>, RunError>>()?,
            ),
            other => other.clone(),
        })
    }

    /// Value for `set`/`add`: `=expr` is evaluated, `$ref` is looked up,
    /// anything else is a literal.
    pub fn resolve_set_value(&self, v: &Value) -> Result<Value, RunError> {
        if let Value::String(s) = v {
            if let Some(src) = s.trim().strip_prefix('=') {
                return Ok(expr::evaluate(src, &self.vars)?.to_json());
            }
        }
        self.resolve_value(v)
    }

    /// A numeric field: numbers pass through, `=expr` is evaluated, `$var`
    /// must hold a number and numeric strings are parsed.
    pub fn resolve_number(&self, v: &Value) -> Result<Num, RunError> {
        match v {
            Value::String(s) => {
                let s = s.trim();
                if let Some(src) = s.strip_prefix('=') {
                    return Ok(expr::evaluate(src, &self.vars)?);
                }
                if s.starts_with('$') {
                    let resolved = self.resolve_value(&Value::from(s))?;
                    return Num::from_json(&resolved).ok_or_else(|| {
                        RunError::type_error(format!(
                            "{s} holds {}, expected a number",
                            type_name(&resolved)
                        ))
                    });
                }
                parse_number(s)
                    .ok_or_else(|| RunError::type_error(format!("{s:?} is not a number")))
            }
            other => Num::from_json(other).ok_or_else(|| {
                RunError::type_error(format!("expected a number, got {}", type_name(other)))
            }),
        }
    }

    pub fn number(&self, v: &Value) -> Result<f64, RunError> {
        Ok(self.resolve_number(v)?.as_f64())
    }

    /// Optional numeric field with a default.
    pub fn number_or(&self, v: &Option<Value>, default: f64) -> Result<f64, RunError> {
        match v {
            Some(v) => self.number(v),
            None => Ok(default),
        }
    }

    /// Integer field, truncating toward zero.
    pub fn int(&self, v: &Value) -> Result<i64, RunError> {
        Ok(match self.resolve_number(v)? {
            Num::Int(n) => n,
            Num::Float(x) => x as i64,
        })
    }

    pub fn int_or(&self, v: &Option<Value>, default: i64) -> Result<i64, RunError> {
        match v {
            Some(v) => self.int(v),
            None => Ok(default),
        }
    }

    /// A millisecond field as a duration; negative values become zero.
    pub fn millis(&self, v: &Value) -> Result<Duration, RunError> {
        ms_to_duration(self.number(v)?)
    }

    pub fn millis_or(&self, v: &Option<Value>, default: f64) -> Result<Duration, RunError> {
        ms_to_duration(self.number_or(v, default)?)
    }

    pub fn seconds_or(&self, v: &Option<Value>, default: f64) -> Result<Duration, RunError> {
        ms_to_duration(self.number_or(v, default)? * 1000.0)
    }

    /// A string field that may also be a `$ref`.
    pub fn text(&self, v: &Value) -> Result<String, RunError> {
        Ok(match self.resolve_value(v)? {
            Value::String(s) => s,
            Value::Null => String::new(),
            other => super::value::display(&other),
        })
    }

    /// An `[r, g, b]` field.  Channels clamp to 0..=255.
    pub fn rgb(&self, v: &Value) -> Result<[u8; 3], RunError> {
        let resolved = self.resolve_value(v)?;
        let items = match &resolved {
            Value::Array(items) if items.len() == 3 => items,
            other => {
                return Err(RunError::type_error(format!(
                    "rgb must be a list of three numbers, got {}",
                    type_name(other)
                )))
            }
        };
        let mut out = [0u8; 3];
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = self.number(item)?.clamp(0.0, 255.0) as u8;
        }
        Ok(out)
    }

    pub fn compare(&self, left: &Value, op: CompareOp, right: &Value) -> Result<bool, RunError> {
        op.apply(&self.resolve_value(left)?, &self.resolve_value(right)?)
    }

    /// Jump target for `goto`.
    pub fn label(&self, name: &str) -> Result<usize, RunError> {
        self.index
            .labels
            .get(name)
            .copied()
            .ok_or_else(|| RunError::UnknownLabel(name.to_owned()))
    }

    pub fn path(&self, v: &str) -> Result<PathBuf, RunError> {
        let name = self.text(&Value::from(v))?;
        if name.trim().is_empty() {
            return Err(RunError::Invalid("file name is empty".to_owned()));
        }
        Ok(PathBuf::from(name.trim()))
    }
}

/// Non-positive and NaN become zero; anything `Duration` cannot hold is a
/// type error.
fn ms_to_duration(ms: f64) -> Result<Duration, RunError> {
    if ms.is_nan() || ms <= 0.0 {
        return Ok(Duration::ZERO);
    }
    Duration::try_from_secs_f64(ms / 1000.0)
        .map_err(|_| RunError::type_error(format!("duration of {ms}ms is out of range")))
}

fn parse_number(s: &str) -> Option<Num> {
    if let Ok(n) = s.parse::<i64>() {
        return Some(Num::Int(n));
    }
    s.parse::<f64>().ok().map(Num::Float)
}

fn subscript() -> Result<&'static Regex, RunError> {
    static RE: OnceLock<Result<Regex, regex::Error>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]"))
        .as_ref()
        .map_err(|e| RunError::Invalid(e.to_string()))
}

/// `container[key]`.  Negative list indices count from the end.
fn subscript_value(container: &Value, key: &Value) -> Option<Value> {
    match (container, key) {
        (Value::Array(items), Value::Number(n)) => {
            let i = n.as_i64()?;
            let i = if i < 0 { items.len() as i64 + i } else { i };
            items.get(usize::try_from(i).ok()?).cloned()
        }
        (Value::String(s), Value::Number(n)) => {
            let chars: Vec<char> = s.chars().collect();
            let i = n.as_i64()?;
            let i = if i < 0 { chars.len() as i64 + i } else { i };
            chars.get(usize::try_from(i).ok()?).map(|c| Value::from(c.to_string()))
        }
        (Value::Object(map), Value::String(k)) => map.get(k).cloned(),
        (Value::Object(map), Value::Number(n)) => map.get(&n.to_string()).cloned(),
        _ => None,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
