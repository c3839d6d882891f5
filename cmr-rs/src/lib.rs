//! Controller macro runner.
//!
//! Runs JSON command scripts against a game console's controller input,
//! either through a serial-attached microcontroller or through the 3DS
//! input-redirection UDP service.
//!
//! | Module | Concern |
//! |--------|---------|
//! | [`script`] | command records, control-flow indices, evaluator, engine, Python export |
//! | [`backend`] | output backends and their wire encoders |
//! | [`controller`] | abstract controller state |
//! | [`perception`] | frames, colour distance, OCR hook |
//! | [`subprocess`] | `run_python` process runner |
//! | [`timing`] | precise, cancellable sleeps |

pub mod backend;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod perception;
pub mod script;
pub mod subprocess;
pub mod timing;
pub mod var;
