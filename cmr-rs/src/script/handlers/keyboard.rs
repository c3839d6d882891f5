//! `type_name`: drive the Gen 3 naming screen with the D-pad.
//!
//! The screen shows one of three pages of keys; Select cycles through them.
//! Planning is separate from pressing so the cursor walk can be checked
//! without any timing involved.

use std::time::Duration;

use super::{tap, Exec, ReleaseGuard};
use crate::controller::Button;
use crate::error::RunError;
use crate::script::command::TypeName;
use crate::script::context::ExecutionContext;
use crate::timing::interruptible_sleep;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Key {
    Char(char),
    Next,
    Back,
    Ok,
}

use Key::{Back, Char as C, Next, Ok as Done};

#[rustfmt::skip]
const UPPER: [Key; 36] = [
    C('A'), C('B'), C('C'), C('D'), C('E'), C('F'), C(' '), C('.'), Next,
    C('G'), C('H'), C('I'), C('J'), C('K'), C('L'), C(' '), C(','), Back,
    C('M'), C('N'), C('O'), C('P'), C('Q'), C('R'), C('S'), C(' '), Back,
    C('T'), C('U'), C('V'), C('W'), C('X'), C('Y'), C('Z'), C(' '), Done,
];

#[rustfmt::skip]
const LOWER: [Key; 36] = [
    C('a'), C('b'), C('c'), C('d'), C('e'), C('f'), C(' '), C('.'), Next,
    C('g'), C('h'), C('i'), C('j'), C('k'), C('l'), C(' '), C(','), Back,
    C('m'), C('n'), C('o'), C('p'), C('q'), C('r'), C('s'), C(' '), Back,
    C('t'), C('u'), C('v'), C('w'), C('x'), C('y'), C('z'), C(' '), Done,
];

#[rustfmt::skip]
const OTHER: [Key; 28] = [
    C('0'), C('1'), C('2'), C('3'), C('4'), C(' '), Next,
    C('5'), C('6'), C('7'), C('8'), C('9'), C(' '), Back,
    C('!'), C('?'), C('♂'), C('♀'), C('/'), C('-'), Back,
    C('…'), C('“'), C('”'), C('‘'), C('’'), C(' '), Done,
];

/// One page of the naming keyboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Upper,
    Lower,
    Other,
}

impl Page {
    fn keys(self) -> &'static [Key] {
        match self {
            Page::Upper => &UPPER,
            Page::Lower => &LOWER,
            Page::Other => &OTHER,
        }
    }

    /// Columns, including the control column on the right.
    pub fn width(self) -> usize {
        match self {
            Page::Upper | Page::Lower => 9,
            Page::Other => 7,
        }
    }

    /// Page shown after pressing Select.
    pub fn next(self) -> Page {
        match self {
            Page::Upper => Page::Lower,
            Page::Lower => Page::Other,
            Page::Other => Page::Upper,
        }
    }

    /// Column and row of the first key that types `c`.
    pub fn position(self, c: char) -> Option<(usize, usize)> {
        let i = self.keys().iter().position(|k| *k == Key::Char(c))?;
        Some((i % self.width(), i / self.width()))
    }

    pub fn contains(self, c: char) -> bool {
        self.position(c).is_some()
    }
}

/// What the naming screen needs next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Select: go to the next page.
    SwitchPage,
    /// One D-pad press.
    Move(Button),
    /// A: type the key under the cursor.
    Pick,
}

impl Step {
    fn button(self) -> Button {
        match self {
            Step::SwitchPage => Button::Select,
            Step::Move(b) => b,
            Step::Pick => Button::A,
        }
    }
}

/// Cursor position on the naming screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keyboard {
    pub x: usize,
    pub y: usize,
    pub page: Page,
}

impl Default for Keyboard {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            page: Page::Upper,
        }
    }
}

impl Keyboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cycle to the next page.  The cursor stays in the control column if
    /// it was there; otherwise it is kept left of the new control column.
    pub fn switch_page(&mut self) {
        let old_width = self.page.width();
        self.page = self.page.next();
        let new_width = self.page.width();
        self.x = if self.x + 1 >= old_width {
            new_width - 1
        } else {
            self.x.min(new_width - 2)
        };
    }

    /// Steps that type `c`, moving the cursor along.  `None` when no page
    /// has the character.
    pub fn type_char(&mut self, c: char) -> Option<Vec<Step>> {
        if ![Page::Upper, Page::Lower, Page::Other]
            .iter()
            .any(|p| p.contains(c))
        {
            return None;
        }
        let mut steps = Vec::new();
        while !self.page.contains(c) {
            self.switch_page();
            steps.push(Step::SwitchPage);
        }
        let (tx, ty) = self.page.position(c)?;
        while self.x != tx {
            if tx > self.x {
                self.x += 1;
                steps.push(Step::Move(Button::Right));
            } else {
                self.x -= 1;
                steps.push(Step::Move(Button::Left));
            }
        }
        while self.y != ty {
            if ty > self.y {
                self.y += 1;
                steps.push(Step::Move(Button::Down));
            } else {
                self.y -= 1;
                steps.push(Step::Move(Button::Up));
            }
        }
        steps.push(Step::Pick);
        Some(steps)
    }

    /// Steps for a whole name.  Characters missing from every page are
    /// skipped.
    pub fn plan(&mut self, name: &str) -> Vec<Step> {
        name.chars().filter_map(|c| self.type_char(c)).flatten().collect()
    }
}

struct Delays {
    movement: Duration,
    select: Duration,
    press: Duration,
    hold: Duration,
}

impl Delays {
    fn after(&self, step: Step) -> Duration {
        match step {
            Step::SwitchPage => self.select,
            Step::Move(_) => self.movement,
            Step::Pick => self.press,
        }
    }
}

impl Exec for TypeName {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let backend = ctx.backend()?;
        let name = ctx.text(&self.name)?;
        let delays = Delays {
            movement: ctx.millis_or(&self.move_delay_ms, 200.0)?,
            select: ctx.millis_or(&self.select_delay_ms, 600.0)?,
            press: ctx.millis_or(&self.press_delay_ms, 400.0)?,
            hold: ctx.millis_or(&self.button_hold_ms, 50.0)?,
        };

        let guard = ReleaseGuard::new(backend);
        let pad = guard.backend();
        let cancel = ctx.cancel;
        let press = |button: Button, after: Duration| -> Result<bool, RunError> {
            Ok(tap(pad, &[button], delays.hold, cancel)? || interruptible_sleep(after, cancel))
        };

        let mut keyboard = Keyboard::new();
        let mut interrupted = false;
        'name: for c in name.chars() {
            let Some(steps) = keyboard.type_char(c) else {
                continue;
            };
            for step in steps {
                if press(step.button(), delays.after(step))? {
                    interrupted = true;
                    break 'name;
                }
            }
        }

        if !interrupted && !press(Button::Start, delays.movement)? && self.confirm {
            press(Button::A, delays.movement)?;
        }
        guard.release()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::test_support::Rig;
    use super::*;
    use serde_json::json;
    use Button::*;

    fn buttons(steps: &[Step]) -> Vec<Button> {
        steps.iter().map(|s| s.button()).collect()
    }

    #[test]
    fn page_geometry() {
        assert_eq!(Page::Upper.position('A'), Some((0, 0)));
        assert_eq!(Page::Upper.position('Z'), Some((6, 3)));
        assert_eq!(Page::Upper.position(' '), Some((6, 0)));
        assert_eq!(Page::Other.position('9'), Some((4, 1)));
        assert_eq!(Page::Other.position('’'), Some((4, 3)));
        assert!(!Page::Lower.contains('A'));
    }

    #[test]
    fn walks_right_then_down() {
        let mut kb = Keyboard::new();
        let steps = kb.type_char('J').unwrap();
        assert_eq!(buttons(&steps), vec![Right, Right, Right, Down, A]);
        assert_eq!((kb.x, kb.y), (3, 1));
    }

    #[test]
    fn lowercase_switches_page_once() {
        let mut kb = Keyboard::new();
        assert_eq!(buttons(&kb.plan("Ab")), vec![A, Select, Right, A]);
        assert_eq!(kb.page, Page::Lower);
    }

    #[test]
    fn page_switch_clamps_cursor() {
        let mut kb = Keyboard {
            x: 7,
            y: 0,
            page: Page::Lower,
        };
        kb.switch_page();
        assert_eq!((kb.page, kb.x), (Page::Other, 5));

        let mut kb = Keyboard {
            x: 8,
            y: 2,
            page: Page::Lower,
        };
        kb.switch_page();
        assert_eq!((kb.page, kb.x), (Page::Other, 6));

        kb.switch_page();
        assert_eq!((kb.page, kb.x), (Page::Upper, 8));
    }

    #[test]
    fn digits_go_through_both_pages() {
        let mut kb = Keyboard::new();
        let plan = kb.plan("1");
        assert_eq!(buttons(&plan), vec![Select, Select, Right, A]);
    }

    #[test]
    fn unknown_characters_are_skipped() {
        let mut kb = Keyboard::new();
        assert!(kb.type_char('#').is_none());
        assert_eq!(kb, Keyboard::new());
        assert_eq!(buttons(&kb.plan("#A")), vec![A]);
    }

    fn presses(rig: &Rig) -> Vec<Button> {
        rig.backend
            .sent()
            .iter()
            .filter_map(|s| s.buttons.iter().next().copied())
            .collect()
    }

    #[test]
    fn types_then_starts_and_confirms() {
        let rig = Rig::new(json!([{
            "cmd": "type_name", "name": "AB",
            "move_delay_ms": 0, "select_delay_ms": 0, "press_delay_ms": 0, "button_hold_ms": 1
        }]));
        let mut ctx = rig.ctx();
        rig.exec(&mut ctx, 0).unwrap();
        assert_eq!(presses(&rig), vec![A, Right, A, Start, A]);
        assert!(rig.backend.state().buttons.is_empty());
    }

    #[test]
    fn confirm_can_be_skipped() {
        let rig = Rig::new(json!([{
            "cmd": "type_name", "name": "$who", "confirm": false,
            "move_delay_ms": 0, "select_delay_ms": 0, "press_delay_ms": 0, "button_hold_ms": 1
        }]));
        let mut ctx = rig.ctx();
        ctx.vars.set("who", "A");
        rig.exec(&mut ctx, 0).unwrap();
        assert_eq!(presses(&rig), vec![A, Start]);
    }

    #[test]
    fn cancelled_before_start_sends_nothing_but_release() {
        let rig = Rig::new(json!([{"cmd": "type_name", "name": "RED"}]));
        rig.cancel.cancel();
        let mut ctx = rig.ctx();
        rig.exec(&mut ctx, 0).unwrap();
        assert!(presses(&rig).is_empty());
        assert!(rig.backend.state().buttons.is_empty());
    }
}
