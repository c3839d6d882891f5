//! Abstract controller state shared by every output backend.
//!
//! A backend owns one [`ControllerState`], mutates it in response to
//! commands and then encodes the whole state onto its own wire format.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Touch screen size in pixels.
pub const TOUCH_WIDTH: u16 = 320;
pub const TOUCH_HEIGHT: u16 = 240;

// ── Buttons ───────────────────────────────────────────────────────────────────

/// The twelve primary face, shoulder and directional buttons.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Button {
    A,
    B,
    X,
    Y,
    Up,
    Down,
    Left,
    Right,
    Start,
    Select,
    L,
    R,
}

impl Button {
    pub const ALL: [Button; 12] = [
        Button::A,
        Button::B,
        Button::X,
        Button::Y,
        Button::Up,
        Button::Down,
        Button::Left,
        Button::Right,
        Button::Start,
        Button::Select,
        Button::L,
        Button::R,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Button::A => "A",
            Button::B => "B",
            Button::X => "X",
            Button::Y => "Y",
            Button::Up => "Up",
            Button::Down => "Down",
            Button::Left => "Left",
            Button::Right => "Right",
            Button::Start => "Start",
            Button::Select => "Select",
            Button::L => "L",
            Button::R => "R",
        }
    }

    pub fn from_name(name: &str) -> Option<Button> {
        Button::ALL.into_iter().find(|b| b.name() == name)
    }
}

/// Extra shoulder buttons carried alongside the second stick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AuxButton {
    ZL,
    ZR,
}

/// Console-level buttons outside the regular pad.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum InterfaceButton {
    Home,
    Power,
    #[serde(alias = "POWER_LONG", alias = "Power_Long", alias = "Power Long")]
    PowerLong,
}

macro_rules! display_via_debug {
    ($($t:ty),*) => {$(
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
    )*};
}

display_via_debug!(Button, AuxButton, InterfaceButton);

// ── Analog inputs ─────────────────────────────────────────────────────────────

/// An analog stick position, both axes in `[-1, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Stick {
    pub x: f64,
    pub y: f64,
}

impl Stick {
    /// Build a stick position, clamping each axis to `[-1, 1]`.
    /// NaN collapses to centre.
    pub fn new(x: f64, y: f64) -> Self {
        let clamp = |v: f64| if v.is_nan() { 0.0 } else { v.clamp(-1.0, 1.0) };
        Self { x: clamp(x), y: clamp(y) }
    }

    pub fn is_centered(&self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }
}

/// A touch point in screen pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Touch {
    pub x: u16,
    pub y: u16,
}

impl Touch {
    /// Clamp a pixel coordinate onto the touch screen.
    pub fn clamped(x: i64, y: i64) -> Self {
        Self {
            x: x.clamp(0, i64::from(TOUCH_WIDTH - 1)) as u16,
            y: y.clamp(0, i64::from(TOUCH_HEIGHT - 1)) as u16,
        }
    }
}

// ── ControllerState ───────────────────────────────────────────────────────────

/// Everything a backend needs to encode one packet.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ControllerState {
    pub buttons: BTreeSet<Button>,
    pub left_stick: Stick,
    pub right_stick: Stick,
    pub touch: Option<Touch>,
    pub aux: BTreeSet<AuxButton>,
    pub interface: BTreeSet<InterfaceButton>,
}

impl ControllerState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held primary buttons.
    pub fn set_buttons(&mut self, buttons: &[Button]) {
        self.buttons = buttons.iter().copied().collect();
    }

    pub fn set_aux(&mut self, buttons: &[AuxButton]) {
        self.aux = buttons.iter().copied().collect();
    }

    pub fn set_interface(&mut self, buttons: &[InterfaceButton]) {
        self.interface = buttons.iter().copied().collect();
    }

    pub fn is_neutral(&self) -> bool {
        *self == Self::default()
    }

    /// Release everything and centre both sticks.
    pub fn reset_neutral(&mut self) {
        *self = Self::default();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
