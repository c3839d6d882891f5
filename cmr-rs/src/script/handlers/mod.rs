//! Command handlers.
//!
//! Every command payload implements [`Exec`]; [`Command::as_exec`] picks the
//! implementation for a variant.  Handlers are grouped by concern:
//!
//! | Module     | Commands                                                  |
//! |------------|-----------------------------------------------------------|
//! | `flow`     | comment, label, goto, if/end_if, while/end_while          |
//! | `timing`   | wait, start_timing, wait_until, get_elapsed               |
//! | `pad`      | press, hold, mash                                         |
//! | `vars`     | set, add, contains, random*, export_json, import_json     |
//! | `vision`   | find_color, find_area_color, wait_for_color*, read_text   |
//! | `external` | run_python                                                |
//! | `threeds`  | tap_touch, sticks, ZL/ZR, Home/Power                      |
//! | `keyboard` | type_name                                                 |
//!
//! [`Command::as_exec`]: super::command::Command::as_exec

mod external;
mod flow;
mod keyboard;
mod pad;
mod threeds;
mod timing;
mod vars;
mod vision;

use std::time::Duration;

use tracing::warn;

use super::context::ExecutionContext;
use crate::backend::{OutputBackend, SharedBackend};
use crate::controller::Button;
use crate::error::RunError;
use crate::timing::{interruptible_sleep, CancelToken};

pub use keyboard::{Keyboard, Page, Step};

pub trait Exec {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError>;
}

/// Releases every button when dropped, so a handler that bails out early
/// (error or cancellation) never leaves one held.
pub(crate) struct ReleaseGuard {
    backend: SharedBackend,
    armed: bool,
}

impl ReleaseGuard {
    pub(crate) fn new(backend: SharedBackend) -> Self {
        Self {
            backend,
            armed: true,
        }
    }

    pub(crate) fn backend(&self) -> &dyn OutputBackend {
        self.backend.as_ref()
    }

    /// Release now and report a failure instead of only logging it.
    pub(crate) fn release(mut self) -> Result<(), RunError> {
        self.armed = false;
        self.backend.set_buttons(&[])?;
        Ok(())
    }
}

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.backend.set_buttons(&[]) {
            warn!("cannot release buttons: {e}");
        }
    }
}

/// Hold `buttons` for `hold`, then release.  Returns `true` if cancelled
/// during the hold; the buttons are released either way.
pub(crate) fn tap(
    backend: &dyn OutputBackend,
    buttons: &[Button],
    hold: Duration,
    cancel: &CancelToken,
) -> Result<bool, RunError> {
    if cancel.is_cancelled() {
        return Ok(true);
    }
    backend.set_buttons(buttons)?;
    let interrupted = interruptible_sleep(hold, cancel);
    backend.set_buttons(&[])?;
    Ok(interrupted)
}

#[cfg(test)]
pub(crate) mod test_support {
    //! A context wired to a [`MemoryBackend`] for handler tests.

    use std::sync::Arc;

    use serde_json::Value;

    use crate::backend::{MemoryBackend, SharedBackend};
    use crate::error::RunError;
    use crate::script::command::{parse_commands, Command};
    use crate::script::context::{ExecutionContext, Services};
    use crate::script::index::{FlowIndex, Strictness};
    use crate::timing::CancelToken;

    pub struct Rig {
        pub backend: Arc<MemoryBackend>,
        pub index: FlowIndex,
        pub cancel: CancelToken,
        pub services: Services,
        pub commands: Vec<Command>,
    }

    impl Rig {
        pub fn new(script: Value) -> Self {
            Self::with_backend(script, MemoryBackend::new())
        }

        pub fn with_backend(script: Value, backend: MemoryBackend) -> Self {
            let commands = parse_commands(script).unwrap();
            let (index, _) = FlowIndex::build(&commands, Strictness::Strict).unwrap();
            Self {
                backend: Arc::new(backend),
                index,
                cancel: CancelToken::new(),
                services: Services::default(),
                commands,
            }
        }

        pub fn ctx(&self) -> ExecutionContext<'_> {
            let backend: SharedBackend = self.backend.clone();
            ExecutionContext::new(&self.index, &self.cancel, &self.services, Some(backend))
        }

        /// Execute command `i` with `ctx.ip` set to it.
        pub fn exec(&self, ctx: &mut ExecutionContext<'_>, i: usize) -> Result<(), RunError> {
            ctx.ip = i;
            self.commands[i].as_exec().exec(ctx)
        }

        /// Run the whole script the way the engine does.
        pub fn run(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
            ctx.ip = 0;
            while ctx.ip < self.commands.len() {
                self.commands[ctx.ip].as_exec().exec(ctx)?;
                ctx.advance();
            }
            Ok(())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
