//! Static command specification table.
//!
//! Describes every command the loader accepts: its required fields, its
//! optional arguments with defaults, documentation, and how a command
//! palette should group and order it.  Purely descriptive; execution lives
//! in [`super::handlers`].

use std::fmt;

/// Value shape of an argument, for documentation and editors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    /// Number, `$var` or `=expr`.
    Number,
    Bool,
    Text,
    /// Any JSON value, `$var` allowed.
    Value,
    Buttons,
    /// Variable name to write.
    VarName,
    List,
    /// `[r, g, b]`.
    Rgb,
    Compare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArgSpec {
    pub key: &'static str,
    pub kind: ArgKind,
    pub default: Option<&'static str>,
    pub help: &'static str,
    pub choices: &'static [&'static str],
}

const fn arg(key: &'static str, kind: ArgKind, help: &'static str) -> ArgSpec {
    ArgSpec {
        key,
        kind,
        default: None,
        help,
        choices: &[],
    }
}

impl ArgSpec {
    const fn with_default(mut self, value: &'static str) -> Self {
        self.default = Some(value);
        self
    }

    const fn with_choices(mut self, choices: &'static [&'static str]) -> Self {
        self.choices = choices;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Group {
    Meta,
    Timing,
    Controller,
    ControlFlow,
    Variables,
    Image,
    Custom,
    ThreeDs,
    Pokemon,
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Group::Meta => "Meta",
            Group::Timing => "Timing",
            Group::Controller => "Controller",
            Group::ControlFlow => "Control Flow",
            Group::Variables => "Variables",
            Group::Image => "Image",
            Group::Custom => "Custom",
            Group::ThreeDs => "3DS",
            Group::Pokemon => "Pokemon",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub group: Group,
    pub order: u16,
    pub doc: &'static str,
    pub required: &'static [&'static str],
    pub args: &'static [ArgSpec],
    /// Can be translated to a standalone program.
    pub exportable: bool,
    /// Can be tried in isolation against a live frame.
    pub testable: bool,
}

const DEFAULT_ORDER: u16 = 999;

const fn spec(
    name: &'static str,
    group: Group,
    order: u16,
    doc: &'static str,
    required: &'static [&'static str],
    args: &'static [ArgSpec],
) -> CommandSpec {
    CommandSpec {
        name,
        group,
        order,
        doc,
        required,
        args,
        exportable: true,
        testable: false,
    }
}

impl CommandSpec {
    /// Mark a command that has no equivalent in an exported program.
    const fn no_export(mut self) -> Self {
        self.exportable = false;
        self
    }
}

/// Image commands sample the live frame; they are testable but have no
/// standalone equivalent.
const fn image(
    name: &'static str,
    order: u16,
    doc: &'static str,
    required: &'static [&'static str],
    args: &'static [ArgSpec],
) -> CommandSpec {
    CommandSpec {
        exportable: false,
        testable: true,
        ..spec(name, Group::Image, order, doc, required, args)
    }
}

use ArgKind::*;

const PAD: &[&str] = &[
    "A", "B", "X", "Y", "Up", "Down", "Left", "Right", "Start", "Select", "L", "R",
];
const IR: &[&str] = &["ZL", "ZR"];
const INTERFACE: &[&str] = &["Home", "Power", "PowerLong"];
const OPS: &[&str] = &["==", "!=", "<", "<=", ">", ">="];

const COND: &[ArgSpec] = &[
    arg("left", Value, "left operand"),
    arg("op", Compare, "comparison operator").with_choices(OPS),
    arg("right", Value, "right operand"),
];

const TAP_TOUCH: &[ArgSpec] = &[
    arg("x", Number, "pixel column"),
    arg("y", Number, "pixel row"),
    arg("down_time", Number, "seconds held down").with_default("0.1"),
    arg("settle", Number, "seconds after release").with_default("0.1"),
];

const STICK: &[ArgSpec] = &[
    arg("x", Number, "horizontal axis, -1 to 1"),
    arg("y", Number, "vertical axis, -1 to 1"),
];

const POLL_DOC: &str = "sample repeatedly until the colour matches (or stops matching)";

static SPECS: &[CommandSpec] = &[
    spec("comment", Group::Meta, 1, "Annotation; does nothing.", &["text"], &[
        arg("text", Text, "comment text"),
    ]),
    spec("wait", Group::Timing, 1, "Sleep for a number of milliseconds.", &["ms"], &[
        arg("ms", Number, "milliseconds"),
    ]),
    spec("start_timing", Group::Timing, 2, "Mark the reference instant for wait_until and get_elapsed.", &[], &[]),
    spec("wait_until", Group::Timing, 3, "Sleep until ms after start_timing.", &["ms"], &[
        arg("ms", Number, "milliseconds after start_timing"),
    ]),
    spec("get_elapsed", Group::Timing, 4, "Store milliseconds since start_timing.", &["out"], &[
        arg("out", VarName, "variable to store into"),
    ]),
    spec("press", Group::Controller, 1, "Hold buttons for a duration, then release.", &["buttons", "ms"], &[
        arg("buttons", Buttons, "buttons to press").with_choices(PAD),
        arg("ms", Number, "hold time in milliseconds").with_default("50"),
    ]),
    spec("hold", Group::Controller, 2, "Hold buttons until changed; an empty list releases.", &["buttons"], &[
        arg("buttons", Buttons, "buttons to hold").with_choices(PAD),
    ]),
    spec("mash", Group::Controller, 3, "Rapidly press and release buttons.", &["buttons"], &[
        arg("buttons", Buttons, "buttons to mash").with_choices(PAD),
        arg("duration_ms", Number, "total duration").with_default("1000"),
        arg("until_ms", Number, "stop at this time after start_timing"),
        arg("hold_ms", Number, "press time per cycle").with_default("25"),
        arg("wait_ms", Number, "release time per cycle").with_default("25"),
    ]),
    spec("label", Group::ControlFlow, 1, "Jump target.", &["name"], &[
        arg("name", Text, "label name"),
    ])
    .no_export(),
    spec("goto", Group::ControlFlow, 2, "Jump to a label.", &["label"], &[
        arg("label", Text, "label to jump to"),
    ])
    .no_export(),
    spec("if", Group::ControlFlow, 3, "Run the block up to end_if when the comparison holds.", &["left", "op", "right"], COND),
    spec("end_if", Group::ControlFlow, 4, "Close an if block.", &[], &[]),
    spec("while", Group::ControlFlow, 5, "Repeat the block up to end_while while the comparison holds.", &["left", "op", "right"], COND),
    spec("end_while", Group::ControlFlow, 6, "Close a while block.", &[], &[]),
    spec("set", Group::Variables, 1, "Assign a literal, a $variable or an =expression.", &["var", "value"], &[
        arg("var", VarName, "variable name"),
        arg("value", Value, "value, $var or =expr"),
    ]),
    spec("add", Group::Variables, 2, "Add a number to a variable (missing counts as 0).", &["var", "value"], &[
        arg("var", VarName, "variable name"),
        arg("value", Number, "amount"),
    ]),
    spec("contains", Group::Variables, 3, "Test substring or list membership.", &["needle", "haystack", "out"], &[
        arg("needle", Value, "value to look for"),
        arg("haystack", Value, "string or list"),
        arg("out", VarName, "variable to store the boolean"),
    ]),
    spec("random", Group::Variables, 4, "Pick a random element of a list.", &["choices", "out"], &[
        arg("choices", List, "list or $var"),
        arg("out", VarName, "variable to store into"),
    ]),
    spec("random_range", Group::Variables, 5, "Random number between min and max inclusive.", &["min", "max", "out"], &[
        arg("min", Number, "lower bound"),
        arg("max", Number, "upper bound"),
        arg("out", VarName, "variable to store into"),
        arg("integer", Bool, "whole numbers only").with_default("true"),
    ]),
    spec("random_value", Group::Variables, 6, "Random number in [0, 1).", &["out"], &[
        arg("out", VarName, "variable to store into"),
    ]),
    spec("export_json", Group::Variables, 7, "Write variables to a JSON file.", &["filename"], &[
        arg("filename", Text, "output path"),
        arg("vars", List, "names to export; empty exports all").with_default("[]"),
    ])
    .no_export(),
    spec("import_json", Group::Variables, 8, "Merge a JSON object file into the variables.", &["filename"], &[
        arg("filename", Text, "input path"),
    ])
    .no_export(),
    image("find_color", 1, "Compare one pixel against a colour.", &["x", "y", "rgb", "out"], &[
        arg("x", Number, "pixel column"),
        arg("y", Number, "pixel row"),
        arg("rgb", Rgb, "target colour"),
        arg("out", VarName, "variable to store the boolean"),
        arg("tol", Number, "maximum colour distance (CIE76)").with_default("10"),
    ]),
    image("find_area_color", 2, "Compare the mean colour of a region.", &["x", "y", "width", "height", "rgb", "out"], &[
        arg("x", Number, "left edge"),
        arg("y", Number, "top edge"),
        arg("width", Number, "region width"),
        arg("height", Number, "region height"),
        arg("rgb", Rgb, "target colour"),
        arg("out", VarName, "variable to store the boolean"),
        arg("tol", Number, "maximum colour distance (CIE76)").with_default("10"),
    ]),
    image("wait_for_color", 3, POLL_DOC, &["x", "y", "rgb"], &[
        arg("x", Number, "pixel column"),
        arg("y", Number, "pixel row"),
        arg("rgb", Rgb, "target colour"),
        arg("tol", Number, "maximum colour distance").with_default("10"),
        arg("interval", Number, "seconds between samples").with_default("0.1"),
        arg("timeout", Number, "seconds, 0 waits forever").with_default("0"),
        arg("wait_for", Bool, "wait for a match (true) or a mismatch (false)").with_default("true"),
        arg("out", VarName, "variable to store whether the wait succeeded"),
    ]),
    image("wait_for_color_area", 4, POLL_DOC, &["x", "y", "width", "height", "rgb"], &[
        arg("x", Number, "left edge"),
        arg("y", Number, "top edge"),
        arg("width", Number, "region width"),
        arg("height", Number, "region height"),
        arg("rgb", Rgb, "target colour"),
        arg("tol", Number, "maximum colour distance").with_default("10"),
        arg("interval", Number, "seconds between samples").with_default("0.1"),
        arg("timeout", Number, "seconds, 0 waits forever").with_default("0"),
        arg("wait_for", Bool, "wait for a match (true) or a mismatch (false)").with_default("true"),
        arg("out", VarName, "variable to store whether the wait succeeded"),
    ]),
    image("read_text", 5, "Recognise text in a region.", &["x", "y", "width", "height", "out"], &[
        arg("x", Number, "left edge"),
        arg("y", Number, "top edge"),
        arg("width", Number, "region width"),
        arg("height", Number, "region height"),
        arg("out", VarName, "variable to store the text"),
        arg("scale", Number, "upscale factor").with_default("4"),
        arg("threshold", Number, "binarisation threshold, 0 for automatic").with_default("0"),
        arg("invert", Bool, "invert before recognition").with_default("false"),
        arg("psm", Number, "page segmentation mode").with_default("7"),
        arg("whitelist", Text, "allowed characters").with_default(""),
    ]),
    spec("run_python", Group::Custom, 1, "Run a script file and store its JSON result.", &["file"], &[
        arg("file", Text, "path, relative to the scripts directory"),
        arg("args", List, "JSON arguments or $var").with_default("[]"),
        arg("out", VarName, "variable to store the result"),
        arg("timeout_s", Number, "seconds before the process is killed").with_default("10"),
    ]),
    spec("tap_touch", Group::ThreeDs, 1, "Tap the touch screen.", &["x", "y"], TAP_TOUCH)
    .no_export(),
    spec("set_left_stick", Group::ThreeDs, 2, "Move the circle pad.", &["x", "y"], STICK)
    .no_export(),
    spec("reset_left_stick", Group::ThreeDs, 3, "Centre the circle pad.", &[], &[])
    .no_export(),
    spec("set_right_stick", Group::ThreeDs, 4, "Move the C-stick.", &["x", "y"], STICK)
    .no_export(),
    spec("reset_right_stick", Group::ThreeDs, 5, "Centre the C-stick.", &[], &[])
    .no_export(),
    spec("press_ir", Group::ThreeDs, 6, "Press ZL/ZR for a duration.", &["buttons", "ms"], &[
        arg("buttons", Buttons, "buttons to press").with_choices(IR),
        arg("ms", Number, "hold time in milliseconds").with_default("50"),
    ])
    .no_export(),
    spec("hold_ir", Group::ThreeDs, 7, "Hold ZL/ZR until changed.", &["buttons"], &[
        arg("buttons", Buttons, "buttons to hold").with_choices(IR),
    ])
    .no_export(),
    spec("press_interface", Group::ThreeDs, 8, "Press Home/Power for a duration.", &["buttons", "ms"], &[
        arg("buttons", Buttons, "buttons to press").with_choices(INTERFACE),
        arg("ms", Number, "hold time in milliseconds").with_default("50"),
    ])
    .no_export(),
    spec("hold_interface", Group::ThreeDs, 9, "Hold Home/Power until changed.", &["buttons"], &[
        arg("buttons", Buttons, "buttons to hold").with_choices(INTERFACE),
    ])
    .no_export(),
    spec("type_name", Group::Pokemon, DEFAULT_ORDER, "Enter a name on the on-screen naming keyboard.", &["name"], &[
        arg("name", Text, "name to type"),
        arg("confirm", Bool, "press A after Start").with_default("true"),
        arg("move_delay_ms", Number, "pause after each cursor move").with_default("200"),
        arg("select_delay_ms", Number, "pause after switching page").with_default("600"),
        arg("press_delay_ms", Number, "pause after choosing a letter").with_default("400"),
        arg("button_hold_ms", Number, "press duration").with_default("50"),
    ])
    .no_export(),
];

/// Look up a command by name.
pub fn get(name: &str) -> Option<&'static CommandSpec> {
    SPECS.iter().find(|s| s.name == name)
}

/// All command names, sorted.
pub fn list_commands() -> Vec<&'static str> {
    let mut names: Vec<_> = SPECS.iter().map(|s| s.name).collect();
    names.sort_unstable();
    names
}

/// All specs in presentation order: group, then order, then name.
pub fn ordered() -> Vec<&'static CommandSpec> {
    let mut specs: Vec<_> = SPECS.iter().collect();
    specs.sort_by_key(|s| (s.group, s.order, s.name));
    specs
}

// ── Tests ─────────────────────────────────────────────────────────────────────
