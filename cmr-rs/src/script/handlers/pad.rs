//! Pad buttons: `press`, `hold` and `mash`.

use std::time::Instant;

use super::{tap, Exec, ReleaseGuard};
use crate::error::RunError;
use crate::script::command::{Hold, Mash, Press};
use crate::script::context::ExecutionContext;
use crate::timing::{deadline_after, interruptible_sleep};

impl Exec for Press {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let backend = ctx.backend()?;
        let hold = ctx.millis(&self.ms)?;
        tap(backend.as_ref(), &self.buttons, hold, ctx.cancel)?;
        Ok(())
    }
}

impl Exec for Hold {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        ctx.backend()?.set_buttons(&self.buttons)?;
        Ok(())
    }
}

impl Exec for Mash {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let backend = ctx.backend()?;
        let hold = ctx.millis_or(&self.hold_ms, 25.0)?;
        let wait = ctx.millis_or(&self.wait_ms, 25.0)?;
        let end = match (&self.until_ms, ctx.timing_start) {
            (Some(until), Some(start)) => deadline_after(start, ctx.millis(until)?),
            _ => deadline_after(Instant::now(), ctx.millis_or(&self.duration_ms, 1000.0)?),
        };

        let guard = ReleaseGuard::new(backend);
        let pad = guard.backend();
        while !ctx.is_cancelled() {
            let remaining = end.saturating_duration_since(Instant::now());
            if remaining < hold {
                break;
            }
            pad.set_buttons(&self.buttons)?;
            if interruptible_sleep(hold.min(remaining), ctx.cancel) {
                break;
            }
            pad.set_buttons(&[])?;

            let remaining = end.saturating_duration_since(Instant::now());
            if remaining.is_zero() || interruptible_sleep(wait.min(remaining), ctx.cancel) {
                break;
            }
        }
        guard.release()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
