//! Commands for the 3DS input-redirection extras: touch screen, both
//! sticks, ZL/ZR and the Home/Power buttons.

use super::Exec;
use crate::backend::Capability;
use crate::error::RunError;
use crate::script::command::{
    HoldInterface, HoldIr, PressInterface, PressIr, ResetLeftStick, ResetRightStick,
    SetLeftStick, SetRightStick, TapTouch,
};
use crate::script::context::ExecutionContext;
use crate::timing::interruptible_sleep;

impl Exec for TapTouch {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let backend = ctx.backend_with("tap_touch", Capability::Touch)?;
        let x = ctx.int(&self.x)?;
        let y = ctx.int(&self.y)?;
        let down = ctx.seconds_or(&self.down_time, 0.1)?;
        let settle = ctx.seconds_or(&self.settle, 0.1)?;
        backend.tap_touch(x, y, down, settle, ctx.cancel)?;
        Ok(())
    }
}

impl Exec for SetLeftStick {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let backend = ctx.backend_with("set_left_stick", Capability::LeftStick)?;
        backend.set_left_stick(ctx.number(&self.x)?, ctx.number(&self.y)?)?;
        Ok(())
    }
}

impl Exec for SetRightStick {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let backend = ctx.backend_with("set_right_stick", Capability::RightStick)?;
        backend.set_right_stick(ctx.number(&self.x)?, ctx.number(&self.y)?)?;
        Ok(())
    }
}

impl Exec for ResetLeftStick {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        ctx.backend_with("reset_left_stick", Capability::LeftStick)?
            .set_left_stick(0.0, 0.0)?;
        Ok(())
    }
}

impl Exec for ResetRightStick {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        ctx.backend_with("reset_right_stick", Capability::RightStick)?
            .set_right_stick(0.0, 0.0)?;
        Ok(())
    }
}

impl Exec for PressIr {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let backend = ctx.backend_with("press_ir", Capability::AuxButtons)?;
        let hold = ctx.millis(&self.ms)?;
        backend.set_aux_buttons(&self.buttons)?;
        interruptible_sleep(hold, ctx.cancel);
        backend.set_aux_buttons(&[])?;
        Ok(())
    }
}

impl Exec for HoldIr {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        ctx.backend_with("hold_ir", Capability::AuxButtons)?
            .set_aux_buttons(&self.buttons)?;
        Ok(())
    }
}

impl Exec for PressInterface {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let backend = ctx.backend_with("press_interface", Capability::InterfaceButtons)?;
        let hold = ctx.millis(&self.ms)?;
        backend.set_interface_buttons(&self.buttons)?;
        interruptible_sleep(hold, ctx.cancel);
        backend.set_interface_buttons(&[])?;
        Ok(())
    }
}

impl Exec for HoldInterface {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        ctx.backend_with("hold_interface", Capability::InterfaceButtons)?
            .set_interface_buttons(&self.buttons)?;
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
