//! Script language: JSON command records run by a cancellable interpreter.
//!
//! A script is a JSON array of `{"cmd": name, ...fields}` records.  Loading
//! goes through three stages:
//!
//! - [`command`] turns each record into a typed [`Command`], applying
//!   legacy renames and rejecting unknown commands or missing fields
//! - [`index`] pairs `if`/`end_if` and `while`/`end_while` and collects labels
//! - [`program`] bundles both into an immutable [`Script`]
//!
//! [`Engine`] then runs a script on a worker thread, dispatching each
//! command to its [`handlers`] implementation with an [`ExecutionContext`].
//! Numeric fields may hold `=expr` formulas, evaluated by the restricted
//! evaluator in [`expr`].  [`export`] renders a structured script as a
//! standalone Python program.
//!
//! # Quick start
//!
//! ```rust
//! use cmr::script::{Script, Strictness};
//!
//! let script = Script::from_json_str(
//!     r#"[{"cmd":"set","var":"n","value":0},
//!         {"cmd":"while","left":"$n","op":"<","right":3},
//!         {"cmd":"add","var":"n","value":1},
//!         {"cmd":"end_while"}]"#,
//!     Strictness::Strict,
//! )
//! .unwrap();
//! assert_eq!(script.index().while_to_end.get(&1), Some(&3));
//! ```

pub mod command;
pub mod context;
pub mod engine;
pub mod export;
pub mod expr;
pub mod handlers;
pub mod index;
pub mod program;
pub mod spec;
pub mod value;

// Re-exports for convenience.
pub use command::Command;
pub use context::{ExecutionContext, Services};
pub use engine::{Engine, EngineObserver, EngineState, NullObserver};
pub use export::{export_python, ExportOptions};
pub use expr::{evaluate, EvalContext};
pub use index::{FlowIndex, Strictness};
pub use program::Script;
pub use value::{CompareOp, Num};
