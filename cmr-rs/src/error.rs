//! Error types for each layer of the runner.
//!
//! Load errors are raised before a run is allowed, evaluator and runtime
//! errors abort the current run, and backend errors come from transports.

use thiserror::Error;

use crate::backend::Capability;

/// Problems found while turning JSON into a validated script.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("script must be a JSON array of commands")]
    NotAnArray,

    #[error("command #{index} is not an object")]
    NotAnObject { index: usize },

    #[error("command #{index} has no \"cmd\" field")]
    MissingCmd { index: usize },

    #[error("unknown command at #{index}: {name}")]
    UnknownCommand { index: usize, name: String },

    #[error("command #{index} ({command}) is missing required field \"{field}\"")]
    MissingField {
        index: usize,
        command: String,
        field: String,
    },

    #[error("command #{index} ({command}) has an invalid field: {message}")]
    InvalidField {
        index: usize,
        command: String,
        message: String,
    },

    #[error("label at #{index} has an empty name")]
    EmptyLabel { index: usize },

    #[error("duplicate label \"{name}\" at #{second} (first defined at #{first})")]
    DuplicateLabel {
        name: String,
        first: usize,
        second: usize,
    },

    #[error("{closer} at #{index} has no matching opener")]
    UnmatchedCloser { closer: &'static str, index: usize },

    #[error("{opener} at #{index} is never closed")]
    Unclosed { opener: &'static str, index: usize },

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cannot read script: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the safe expression evaluator.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvalError {
    #[error("syntax error in expression: {0}")]
    Syntax(String),

    #[error("disallowed expression element: {0}")]
    Disallowed(String),

    #[error("expression references undefined variable: ${0}")]
    UndefinedVariable(String),

    #[error("function not allowed: {0}")]
    FunctionNotAllowed(String),

    #[error("variable ${name} is not numeric (found {found})")]
    NotNumeric { name: String, found: &'static str },

    #[error("{func}() takes {expected} argument(s), got {got}")]
    Arity {
        func: String,
        expected: &'static str,
        got: usize,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("math domain error in {0}()")]
    Domain(String),
}

/// Errors raised by an output backend.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend is not connected")]
    NotConnected,

    #[error("{op} is not supported by the {backend} backend")]
    Unsupported {
        op: &'static str,
        backend: &'static str,
    },

    #[error("serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort a running script.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("No output backend connected.")]
    NoBackend,

    #[error("{command} requires {capability}, which the active backend does not support")]
    Unsupported {
        command: &'static str,
        capability: Capability,
    },

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error("type error: {0}")]
    Type(String),

    #[error("unknown label: {0}")]
    UnknownLabel(String),

    #[error("{0}")]
    Invalid(String),

    #[error("subprocess failed: {0}")]
    Subprocess(String),

    #[error("subprocess timed out after {0:.1}s")]
    Timeout(f64),

    #[error("OCR failed: {0}")]
    Ocr(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("command panicked: {0}")]
    Panicked(String),
}

impl RunError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        RunError::Type(msg.into())
    }
}

/// Refusals from the engine's host-facing operations.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine is busy; stop the running script first")]
    Busy,

    #[error("No output backend connected.")]
    NoBackend,

    #[error("No script loaded.")]
    EmptyScript,

    #[error("script has {0} unresolved load problem(s); fix them before running")]
    NotRunnable(usize),

    #[error("active backend cannot run: {}", list_unsupported(.0))]
    UnsupportedCommands(Vec<(usize, &'static str)>),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("cannot spawn worker thread: {0}")]
    Spawn(std::io::Error),
}

/// A command that has no equivalent in an exported program.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unexportable {
    pub index: usize,
    pub command: &'static str,
}

/// Refusals from the standalone-program exporter.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No script loaded.")]
    EmptyScript,

    #[error("script has {0} unresolved load problem(s); fix them before exporting")]
    NotRunnable(usize),

    #[error("cannot export: {}", list_unexportable(.0))]
    Unexportable(Vec<Unexportable>),
}

fn list_unexportable(items: &[Unexportable]) -> String {
    items
        .iter()
        .map(|u| format!("#{} {}", u.index, u.command))
        .collect::<Vec<_>>()
        .join(", ")
}

fn list_unsupported(items: &[(usize, &'static str)]) -> String {
    items
        .iter()
        .map(|(i, name)| format!("#{i} {name}"))
        .collect::<Vec<_>>()
        .join(", ")
}

pub type Result<T, E = RunError> = std::result::Result<T, E>;

// ── Tests ─────────────────────────────────────────────────────────────────────
