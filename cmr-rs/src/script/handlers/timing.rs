//! Waiting and the timing reference.

use std::time::{Duration, Instant};

use tracing::warn;

use super::Exec;
use crate::error::RunError;
use crate::script::command::{GetElapsed, StartTiming, Wait, WaitUntil};
use crate::script::context::ExecutionContext;
use crate::timing::{deadline_after, interruptible_sleep, sleep_until};

/// `wait_until` returns this much early to absorb dispatch overhead before
/// the next command.
const DISPATCH_COMPENSATION: Duration = Duration::from_millis(3);

impl Exec for Wait {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        interruptible_sleep(ctx.millis(&self.ms)?, ctx.cancel);
        Ok(())
    }
}

impl Exec for StartTiming {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        ctx.timing_start = Some(Instant::now());
        Ok(())
    }
}

impl Exec for WaitUntil {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let target_ms = ctx.number(&self.ms)?;
        let offset = ctx.millis(&self.ms)?;
        let Some(start) = ctx.timing_start else {
            interruptible_sleep(offset, ctx.cancel);
            return Ok(());
        };
        let deadline = deadline_after(start, offset)
            .checked_sub(DISPATCH_COMPENSATION)
            .unwrap_or(start);
        let now = Instant::now();
        if now >= deadline {
            let actual = now.duration_since(start).as_secs_f64() * 1000.0;
            warn!(
                "wait_until {target_ms}ms: already {:.2}ms past target",
                now.duration_since(deadline).as_secs_f64() * 1000.0
            );
            ctx.vars.set("_wait_until_actual_ms", actual);
            return Ok(());
        }
        sleep_until(deadline, ctx.cancel);
        Ok(())
    }
}

impl Exec for GetElapsed {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        match ctx.elapsed_ms() {
            Some(ms) => ctx.vars.set(self.out.as_str(), ms),
            None => ctx.vars.set(self.out.as_str(), 0),
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::test_support::Rig;
    use serde_json::json;
    use std::time::{Duration, Instant};

    #[test]
    fn wait_sleeps() {
        let rig = Rig::new(json!([{"cmd": "wait", "ms": 20}]));
        let mut ctx = rig.ctx();
        let t0 = Instant::now();
        rig.exec(&mut ctx, 0).unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_returns_early_when_cancelled() {
        let rig = Rig::new(json!([{"cmd": "wait", "ms": 5000}]));
        rig.cancel.cancel();
        let mut ctx = rig.ctx();
        let t0 = Instant::now();
        rig.exec(&mut ctx, 0).unwrap();
        assert!(t0.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn elapsed_without_reference_is_zero() {
        let rig = Rig::new(json!([{"cmd": "get_elapsed", "out": "t"}]));
        let mut ctx = rig.ctx();
        rig.exec(&mut ctx, 0).unwrap();
        assert_eq!(ctx.vars.get("t"), Some(&json!(0)));
    }

    #[test]
    fn wait_until_is_relative_to_start_timing() {
        let rig = Rig::new(json!([
            {"cmd": "start_timing"},
            {"cmd": "wait", "ms": 10},
            {"cmd": "wait_until", "ms": 40},
            {"cmd": "get_elapsed", "out": "t"},
        ]));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        let t = ctx.vars.get("t").and_then(|v| v.as_f64()).unwrap();
        assert!((36.0..200.0).contains(&t), "elapsed {t}");
        assert!(ctx.vars.get("_wait_until_actual_ms").is_none());
    }

    #[test]
    fn wait_until_in_the_past_records_actual() {
        let rig = Rig::new(json!([
            {"cmd": "start_timing"},
            {"cmd": "wait", "ms": 20},
            {"cmd": "wait_until", "ms": 5},
        ]));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        let actual = ctx
            .vars
            .get("_wait_until_actual_ms")
            .and_then(|v| v.as_f64())
            .unwrap();
        assert!(actual >= 20.0);
    }

    #[test]
    fn wait_until_without_reference_waits_plainly() {
        let rig = Rig::new(json!([{"cmd": "wait_until", "ms": 15}]));
        let mut ctx = rig.ctx();
        let t0 = Instant::now();
        rig.exec(&mut ctx, 0).unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(15));
    }
}
