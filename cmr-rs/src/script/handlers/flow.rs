//! Control flow.  `end_while` is the only backward jump.

use super::Exec;
use crate::error::RunError;
use crate::script::command::{Comment, EndIf, EndWhile, Goto, If, Label, While};
use crate::script::context::ExecutionContext;

impl Exec for Comment {
    fn exec(&self, _: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        Ok(())
    }
}

impl Exec for Label {
    fn exec(&self, _: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        Ok(())
    }
}

impl Exec for EndIf {
    fn exec(&self, _: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        Ok(())
    }
}

impl Exec for Goto {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let target = ctx.label(&self.label)?;
        ctx.jump(target + 1);
        Ok(())
    }
}

fn unmatched(opener: &str, ip: usize) -> RunError {
    RunError::Invalid(format!("{opener} at #{ip} has no matching end_{opener}"))
}

impl Exec for If {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        if !ctx.compare(&self.left, self.op, &self.right)? {
            let end = *ctx
                .index
                .if_to_end
                .get(&ctx.ip)
                .ok_or_else(|| unmatched("if", ctx.ip))?;
            ctx.jump(end + 1);
        }
        Ok(())
    }
}

impl Exec for While {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        if !ctx.compare(&self.left, self.op, &self.right)? {
            let end = *ctx
                .index
                .while_to_end
                .get(&ctx.ip)
                .ok_or_else(|| unmatched("while", ctx.ip))?;
            ctx.jump(end + 1);
        }
        Ok(())
    }
}

impl Exec for EndWhile {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let head = *ctx.index.end_to_while.get(&ctx.ip).ok_or_else(|| {
            RunError::Invalid(format!("end_while at #{} has no matching while", ctx.ip))
        })?;
        ctx.jump(head);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::test_support::Rig;
    use serde_json::json;

    #[test]
    fn while_loop_counts_to_three() {
        let rig = Rig::new(json!([
            {"cmd": "set", "var": "n", "value": 0},
            {"cmd": "set", "var": "body", "value": 0},
            {"cmd": "while", "left": "$n", "op": "<", "right": 3},
            {"cmd": "add", "var": "n", "value": 1},
            {"cmd": "add", "var": "body", "value": 1},
            {"cmd": "end_while"},
        ]));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert_eq!(ctx.vars.get("n"), Some(&json!(3)));
        assert_eq!(ctx.vars.get("body"), Some(&json!(3)));
    }

    #[test]
    fn while_at_index_zero_loops() {
        let rig = Rig::new(json!([
            {"cmd": "while", "left": "$n", "op": "!=", "right": 2},
            {"cmd": "add", "var": "n", "value": 1},
            {"cmd": "end_while"},
        ]));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert_eq!(ctx.vars.get("n"), Some(&json!(2)));
    }

    #[test]
    fn false_if_skips_block() {
        let rig = Rig::new(json!([
            {"cmd": "if", "left": 1, "op": ">", "right": 2},
            {"cmd": "set", "var": "hit", "value": true},
            {"cmd": "end_if"},
            {"cmd": "set", "var": "after", "value": true},
        ]));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert!(ctx.vars.get("hit").is_none());
        assert_eq!(ctx.vars.get("after"), Some(&json!(true)));
    }

    #[test]
    fn true_if_runs_block() {
        let rig = Rig::new(json!([
            {"cmd": "if", "left": "a", "op": "==", "right": "a"},
            {"cmd": "set", "var": "hit", "value": true},
            {"cmd": "end_if"},
        ]));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert_eq!(ctx.vars.get("hit"), Some(&json!(true)));
    }

    #[test]
    fn goto_skips_ahead() {
        let rig = Rig::new(json!([
            {"cmd": "goto", "label": "end"},
            {"cmd": "set", "var": "skipped", "value": false},
            {"cmd": "label", "name": "end"},
            {"cmd": "set", "var": "done", "value": true},
        ]));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert!(ctx.vars.get("skipped").is_none());
        assert_eq!(ctx.vars.get("done"), Some(&json!(true)));
    }

    #[test]
    fn goto_unknown_label_fails() {
        let rig = Rig::new(json!([{"cmd": "goto", "label": "nowhere"}]));
        let mut ctx = rig.ctx();
        assert!(matches!(
            rig.run(&mut ctx),
            Err(crate::error::RunError::UnknownLabel(_))
        ));
    }

    #[test]
    fn ordering_a_string_against_a_number_is_a_type_error() {
        let rig = Rig::new(json!([
            {"cmd": "if", "left": "abc", "op": "<", "right": 3},
            {"cmd": "end_if"},
        ]));
        let mut ctx = rig.ctx();
        assert!(matches!(
            rig.run(&mut ctx),
            Err(crate::error::RunError::Type(_))
        ));
    }
}
