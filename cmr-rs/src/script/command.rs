//! Typed command records.
//!
//! A script file is a JSON array of `{"cmd": name, ...fields}` objects.
//! [`parse_commands`] checks each record against the specification table
//! (so unknown names and missing fields are reported with their index) and
//! then deserializes it into its [`Command`] variant.
//!
//! Fields that may hold a `$var` reference or an `=expr` formula are kept as
//! raw [`Value`]s and resolved when the command executes.

use std::fmt;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::handlers::Exec;
use super::spec;
use super::value::{display, CompareOp};
use crate::backend::Capability;
use crate::controller::{AuxButton, Button, InterfaceButton};
use crate::error::LoadError;

/// Old command names still accepted on load.
const LEGACY_NAMES: &[(&str, &str)] = &[
    ("set_circle_pad", "set_left_stick"),
    ("reset_circle_pad", "reset_left_stick"),
    ("set_c_stick", "set_right_stick"),
    ("reset_c_stick", "reset_right_stick"),
];

macro_rules! commands {
    ($($variant:ident => $name:literal),* $(,)?) => {
        /// One script instruction.
        #[derive(Debug, Clone, PartialEq, Deserialize)]
        #[serde(tag = "cmd")]
        pub enum Command {
            $( #[serde(rename = $name)] $variant($variant), )*
        }

        impl Command {
            pub fn name(&self) -> &'static str {
                match self {
                    $( Command::$variant(_) => $name, )*
                }
            }

            pub fn as_exec(&self) -> &dyn Exec {
                match self {
                    $( Command::$variant(c) => c, )*
                }
            }
        }

        /// Names of every command variant, in declaration order.
        pub const COMMAND_NAMES: &[&str] = &[$($name),*];
    };
}

commands! {
    Comment => "comment",
    Wait => "wait",
    StartTiming => "start_timing",
    WaitUntil => "wait_until",
    GetElapsed => "get_elapsed",
    Press => "press",
    Hold => "hold",
    Mash => "mash",
    Label => "label",
    Goto => "goto",
    If => "if",
    EndIf => "end_if",
    While => "while",
    EndWhile => "end_while",
    Set => "set",
    Add => "add",
    Contains => "contains",
    Random => "random",
    RandomRange => "random_range",
    RandomValue => "random_value",
    ExportJson => "export_json",
    ImportJson => "import_json",
    FindColor => "find_color",
    FindAreaColor => "find_area_color",
    WaitForColor => "wait_for_color",
    WaitForColorArea => "wait_for_color_area",
    ReadText => "read_text",
    RunPython => "run_python",
    TapTouch => "tap_touch",
    SetLeftStick => "set_left_stick",
    SetRightStick => "set_right_stick",
    ResetLeftStick => "reset_left_stick",
    ResetRightStick => "reset_right_stick",
    PressIr => "press_ir",
    HoldIr => "hold_ir",
    PressInterface => "press_interface",
    HoldInterface => "hold_interface",
    TypeName => "type_name",
}

impl Command {
    /// Optional backend feature this command needs, if any.
    pub fn required_capability(&self) -> Option<Capability> {
        match self {
            Command::TapTouch(_) => Some(Capability::Touch),
            Command::SetLeftStick(_) | Command::ResetLeftStick(_) => Some(Capability::LeftStick),
            Command::SetRightStick(_) | Command::ResetRightStick(_) => Some(Capability::RightStick),
            Command::PressIr(_) | Command::HoldIr(_) => Some(Capability::AuxButtons),
            Command::PressInterface(_) | Command::HoldInterface(_) => {
                Some(Capability::InterfaceButtons)
            }
            _ => None,
        }
    }
}

// ── Command payloads ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Comment {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Wait {
    pub ms: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartTiming {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WaitUntil {
    pub ms: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GetElapsed {
    pub out: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Press {
    pub buttons: Vec<Button>,
    pub ms: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Hold {
    pub buttons: Vec<Button>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Mash {
    pub buttons: Vec<Button>,
    pub duration_ms: Option<Value>,
    /// Stop at this many ms after `start_timing` instead of after `duration_ms`.
    pub until_ms: Option<Value>,
    pub hold_ms: Option<Value>,
    pub wait_ms: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Label {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Goto {
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct If {
    pub left: Value,
    pub op: CompareOp,
    pub right: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EndIf {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct While {
    pub left: Value,
    pub op: CompareOp,
    pub right: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EndWhile {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Set {
    pub var: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Add {
    pub var: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Contains {
    pub needle: Value,
    pub haystack: Value,
    pub out: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Random {
    pub choices: Value,
    pub out: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RandomRange {
    pub min: Value,
    pub max: Value,
    pub out: String,
    #[serde(default = "yes")]
    pub integer: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RandomValue {
    pub out: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ExportJson {
    pub filename: String,
    #[serde(default)]
    pub vars: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ImportJson {
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FindColor {
    pub x: Value,
    pub y: Value,
    pub rgb: Value,
    pub out: String,
    pub tol: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FindAreaColor {
    pub x: Value,
    pub y: Value,
    pub width: Value,
    pub height: Value,
    pub rgb: Value,
    pub out: String,
    pub tol: Option<Value>,
}

/// Polling options shared by the two `wait_for_color` commands.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ColorPoll {
    pub tol: Option<Value>,
    /// Seconds between samples.
    pub interval: Option<Value>,
    /// Seconds; zero or absent waits forever.
    pub timeout: Option<Value>,
    #[serde(default = "yes")]
    pub wait_for: bool,
    pub out: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WaitForColor {
    pub x: Value,
    pub y: Value,
    pub rgb: Value,
    #[serde(flatten)]
    pub poll: ColorPoll,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WaitForColorArea {
    pub x: Value,
    pub y: Value,
    pub width: Value,
    pub height: Value,
    pub rgb: Value,
    #[serde(flatten)]
    pub poll: ColorPoll,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ReadText {
    pub x: Value,
    pub y: Value,
    pub width: Value,
    pub height: Value,
    pub out: String,
    pub scale: Option<Value>,
    pub threshold: Option<Value>,
    #[serde(default)]
    pub invert: bool,
    pub psm: Option<Value>,
    #[serde(default)]
    pub whitelist: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunPython {
    pub file: String,
    pub args: Option<Value>,
    pub out: Option<String>,
    pub timeout_s: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TapTouch {
    pub x: Value,
    pub y: Value,
    /// Seconds.
    pub down_time: Option<Value>,
    /// Seconds.
    pub settle: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetLeftStick {
    pub x: Value,
    pub y: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetRightStick {
    pub x: Value,
    pub y: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResetLeftStick {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResetRightStick {}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PressIr {
    pub buttons: Vec<AuxButton>,
    pub ms: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HoldIr {
    pub buttons: Vec<AuxButton>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PressInterface {
    pub buttons: Vec<InterfaceButton>,
    pub ms: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HoldInterface {
    pub buttons: Vec<InterfaceButton>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TypeName {
    pub name: Value,
    #[serde(default = "yes")]
    pub confirm: bool,
    pub move_delay_ms: Option<Value>,
    pub select_delay_ms: Option<Value>,
    pub press_delay_ms: Option<Value>,
    pub button_hold_ms: Option<Value>,
}

fn yes() -> bool {
    true
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Validate and convert a JSON array of command records.  Fails on the
/// first bad record; nothing is returned partially.
pub fn parse_commands(doc: Value) -> Result<Vec<Command>, LoadError> {
    let Value::Array(items) = doc else {
        return Err(LoadError::NotAnArray);
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::Object(record) = item else {
                return Err(LoadError::NotAnObject { index });
            };
            parse_record(index, record)
        })
        .collect()
}

fn parse_record(index: usize, mut record: Map<String, Value>) -> Result<Command, LoadError> {
    let name = match record.get("cmd") {
        Some(Value::String(s)) => s.clone(),
        _ => return Err(LoadError::MissingCmd { index }),
    };
    let name = match LEGACY_NAMES.iter().find(|(old, _)| *old == name) {
        Some((_, new)) => {
            record.insert("cmd".into(), Value::from(*new));
            (*new).to_owned()
        }
        None => name,
    };
    let spec = spec::get(&name).ok_or_else(|| LoadError::UnknownCommand {
        index,
        name: name.clone(),
    })?;
    if let Some(field) = spec.required.iter().find(|f| !record.contains_key(**f)) {
        return Err(LoadError::MissingField {
            index,
            command: name,
            field: (*field).to_owned(),
        });
    }
    serde_json::from_value(Value::Object(record)).map_err(|e| LoadError::InvalidField {
        index,
        command: name,
        message: e.to_string(),
    })
}

// ── Display ───────────────────────────────────────────────────────────────────

fn list<T: fmt::Display>(items: &[T]) -> String {
    if items.is_empty() {
        return "(none)".to_owned();
    }
    items
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" + ")
}

fn opt(v: &Option<Value>, default: &str) -> String {
    v.as_ref().map_or_else(|| default.to_owned(), display)
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = display;
        match self {
            Command::Comment(c) => write!(f, "# {}", c.text),
            Command::Wait(c) => write!(f, "Wait {} ms", d(&c.ms)),
            Command::StartTiming(_) => write!(f, "Start timing"),
            Command::WaitUntil(c) => write!(f, "Wait until {} ms", d(&c.ms)),
            Command::GetElapsed(c) => write!(f, "${} = elapsed ms", c.out),
            Command::Press(c) => write!(f, "Press {} for {} ms", list(&c.buttons), d(&c.ms)),
            Command::Hold(c) if c.buttons.is_empty() => write!(f, "Release all buttons"),
            Command::Hold(c) => write!(f, "Hold {}", list(&c.buttons)),
            Command::Mash(c) => match &c.until_ms {
                Some(until) => write!(f, "Mash {} until {} ms", list(&c.buttons), d(until)),
                None => write!(
                    f,
                    "Mash {} for {} ms",
                    list(&c.buttons),
                    opt(&c.duration_ms, "1000")
                ),
            },
            Command::Label(c) => write!(f, "{}:", c.name),
            Command::Goto(c) => write!(f, "Goto {}", c.label),
            Command::If(c) => write!(f, "If {} {} {}", d(&c.left), c.op, d(&c.right)),
            Command::EndIf(_) => write!(f, "End if"),
            Command::While(c) => write!(f, "While {} {} {}", d(&c.left), c.op, d(&c.right)),
            Command::EndWhile(_) => write!(f, "End while"),
            Command::Set(c) => write!(f, "${} = {}", c.var, d(&c.value)),
            Command::Add(c) => write!(f, "${} += {}", c.var, d(&c.value)),
            Command::Contains(c) => write!(
                f,
                "${} = {} in {}",
                c.out,
                d(&c.needle),
                d(&c.haystack)
            ),
            Command::Random(c) => write!(f, "${} = random choice of {}", c.out, d(&c.choices)),
            Command::RandomRange(c) => write!(
                f,
                "${} = random {} in [{}, {}]",
                c.out,
                if c.integer { "integer" } else { "number" },
                d(&c.min),
                d(&c.max)
            ),
            Command::RandomValue(c) => write!(f, "${} = random in [0, 1)", c.out),
            Command::ExportJson(c) if c.vars.is_empty() => {
                write!(f, "Export all variables to {}", c.filename)
            }
            Command::ExportJson(c) => write!(f, "Export {} to {}", c.vars.join(", "), c.filename),
            Command::ImportJson(c) => write!(f, "Import variables from {}", c.filename),
            Command::FindColor(c) => write!(
                f,
                "${} = color at ({}, {}) ~ {}",
                c.out,
                d(&c.x),
                d(&c.y),
                d(&c.rgb)
            ),
            Command::FindAreaColor(c) => write!(
                f,
                "${} = area ({}, {}, {}x{}) ~ {}",
                c.out,
                d(&c.x),
                d(&c.y),
                d(&c.width),
                d(&c.height),
                d(&c.rgb)
            ),
            Command::WaitForColor(c) => write!(
                f,
                "Wait for color at ({}, {}) {} {}",
                d(&c.x),
                d(&c.y),
                if c.poll.wait_for { "to be" } else { "to stop being" },
                d(&c.rgb)
            ),
            Command::WaitForColorArea(c) => write!(
                f,
                "Wait for area ({}, {}, {}x{}) {} {}",
                d(&c.x),
                d(&c.y),
                d(&c.width),
                d(&c.height),
                if c.poll.wait_for { "to be" } else { "to stop being" },
                d(&c.rgb)
            ),
            Command::ReadText(c) => write!(
                f,
                "${} = text in ({}, {}, {}x{})",
                c.out,
                d(&c.x),
                d(&c.y),
                d(&c.width),
                d(&c.height)
            ),
            Command::RunPython(c) => match &c.out {
                Some(out) => write!(f, "${out} = run {}", c.file),
                None => write!(f, "Run {}", c.file),
            },
            Command::TapTouch(c) => write!(f, "Tap screen at ({}, {})", d(&c.x), d(&c.y)),
            Command::SetLeftStick(c) => write!(f, "Left stick ({}, {})", d(&c.x), d(&c.y)),
            Command::SetRightStick(c) => write!(f, "Right stick ({}, {})", d(&c.x), d(&c.y)),
            Command::ResetLeftStick(_) => write!(f, "Centre left stick"),
            Command::ResetRightStick(_) => write!(f, "Centre right stick"),
            Command::PressIr(c) => write!(f, "Press {} for {} ms", list(&c.buttons), d(&c.ms)),
            Command::HoldIr(c) => write!(f, "Hold {}", list(&c.buttons)),
            Command::PressInterface(c) => {
                write!(f, "Press {} for {} ms", list(&c.buttons), d(&c.ms))
            }
            Command::HoldInterface(c) => write!(f, "Hold {}", list(&c.buttons)),
            Command::TypeName(c) => write!(
                f,
                "Type name \"{}\"{}",
                d(&c.name),
                if c.confirm { " and confirm" } else { "" }
            ),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_records() {
        let cmds = parse_commands(json!([
            {"cmd": "press", "buttons": ["A", "Up"], "ms": 80},
            {"cmd": "if", "left": "$n", "op": "<", "right": 3},
            {"cmd": "end_if"},
        ]))
        .unwrap();
        assert_eq!(cmds.len(), 3);
        assert_eq!(
            cmds[0],
            Command::Press(Press {
                buttons: vec![Button::A, Button::Up],
                ms: json!(80)
            })
        );
        assert_eq!(cmds[1].name(), "if");
        assert_eq!(cmds[2], Command::EndIf(EndIf {}));
    }

    #[test]
    fn legacy_names_are_renamed() {
        let cmds = parse_commands(json!([
            {"cmd": "set_circle_pad", "x": 1, "y": 0},
            {"cmd": "reset_c_stick"},
        ]))
        .unwrap();
        assert_eq!(cmds[0].name(), "set_left_stick");
        assert_eq!(cmds[1].name(), "reset_right_stick");
    }

    #[test]
    fn unknown_command_reports_index() {
        let err = parse_commands(json!([{"cmd": "wait", "ms": 1}, {"cmd": "fly"}])).unwrap_err();
        assert!(matches!(err, LoadError::UnknownCommand { index: 1, ref name } if name == "fly"));
    }

    #[test]
    fn missing_field_reports_field() {
        let err = parse_commands(json!([{"cmd": "press", "buttons": ["A"]}])).unwrap_err();
        assert!(matches!(
            err,
            LoadError::MissingField { index: 0, ref field, .. } if field == "ms"
        ));
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(parse_commands(json!({})), Err(LoadError::NotAnArray)));
        assert!(matches!(
            parse_commands(json!([1])),
            Err(LoadError::NotAnObject { index: 0 })
        ));
        assert!(matches!(
            parse_commands(json!([{"wait": 5}])),
            Err(LoadError::MissingCmd { index: 0 })
        ));
    }

    #[test]
    fn bad_button_and_op_are_invalid_fields() {
        let err = parse_commands(json!([{"cmd": "hold", "buttons": ["Turbo"]}])).unwrap_err();
        assert!(matches!(err, LoadError::InvalidField { index: 0, .. }));
        let err = parse_commands(json!([
            {"cmd": "while", "left": 1, "op": "=~", "right": 2}
        ]))
        .unwrap_err();
        assert!(matches!(err, LoadError::InvalidField { .. }));
    }

    #[test]
    fn optional_fields_default() {
        let cmds = parse_commands(json!([
            {"cmd": "wait_for_color", "x": 1, "y": 2, "rgb": [0, 0, 0]},
            {"cmd": "random_range", "min": 1, "max": 6, "out": "d"},
        ]))
        .unwrap();
        let Command::WaitForColor(w) = &cmds[0] else {
            panic!("expected wait_for_color")
        };
        assert!(w.poll.wait_for);
        assert_eq!(w.poll.timeout, None);
        let Command::RandomRange(r) = &cmds[1] else {
            panic!("expected random_range")
        };
        assert!(r.integer);
    }

    #[test]
    fn extra_fields_are_ignored() {
        let cmds = parse_commands(json!([{"cmd": "comment", "text": "hi", "color": "red"}]));
        assert!(cmds.is_ok());
    }

    #[test]
    fn display_formats() {
        let cmds = parse_commands(json!([
            {"cmd": "press", "buttons": ["A", "B"], "ms": 50},
            {"cmd": "set", "var": "n", "value": "=$n+1"},
            {"cmd": "hold", "buttons": []},
            {"cmd": "while", "left": "$n", "op": "<", "right": 3},
        ]))
        .unwrap();
        let shown: Vec<String> = cmds.iter().map(ToString::to_string).collect();
        assert_eq!(
            shown,
            ["Press A + B for 50 ms", "$n = =$n+1", "Release all buttons", "While $n < 3"]
        );
    }

    #[test]
    fn capabilities() {
        let cmds = parse_commands(json!([
            {"cmd": "tap_touch", "x": 1, "y": 1},
            {"cmd": "hold_ir", "buttons": ["ZL"]},
            {"cmd": "wait", "ms": 1},
        ]))
        .unwrap();
        assert_eq!(cmds[0].required_capability(), Some(Capability::Touch));
        assert_eq!(cmds[1].required_capability(), Some(Capability::AuxButtons));
        assert_eq!(cmds[2].required_capability(), None);
    }
}
