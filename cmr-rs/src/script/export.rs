//! Translate a script into a standalone Python program.
//!
//! The generated program talks to the serial microcontroller directly with
//! `pyserial`: it rebuilds the button map from [`serial::button_bits`],
//! keeps the receiver alive during long waits and releases everything on
//! exit.  Script variables become Python locals and `if`/`while` blocks
//! become native blocks.
//!
//! Only structured scripts translate.  Commands whose table entry is not
//! [`exportable`](super::spec::CommandSpec::exportable) (jumps, image
//! commands, the 3DS extras, file import/export and `type_name`) block the
//! export and are reported with their index.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

use super::command::Command;
use super::program::Script;
use super::spec;
use crate::backend::serial::{self, DEFAULT_BAUD};
use crate::controller::Button;
use crate::error::{ExportError, Unexportable};
use crate::subprocess::LAUNCHER;

/// Settings baked into the exported program.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportOptions {
    pub port: String,
    pub baud: u32,
    pub keepalive_s: f64,
    pub warmup_s: f64,
    /// Base directory for relative `run_python` files.
    pub scripts_dir: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            port: "COM4".to_owned(),
            baud: DEFAULT_BAUD,
            keepalive_s: 0.05,
            warmup_s: 1.0,
            scripts_dir: "py_scripts".to_owned(),
        }
    }
}

/// Commands that block an export, in script order.
pub fn unexportable(script: &Script) -> Vec<Unexportable> {
    script
        .commands()
        .iter()
        .enumerate()
        .filter(|(_, c)| !spec::get(c.name()).is_some_and(|s| s.exportable))
        .map(|(index, c)| Unexportable {
            index,
            command: c.name(),
        })
        .collect()
}

/// Render `script` as Python source.
pub fn export_python(script: &Script, options: &ExportOptions) -> Result<String, ExportError> {
    if script.is_empty() {
        return Err(ExportError::EmptyScript);
    }
    if !script.is_runnable() {
        return Err(ExportError::NotRunnable(script.warnings().len()));
    }
    let blocked = unexportable(script);
    if !blocked.is_empty() {
        return Err(ExportError::Unexportable(blocked));
    }

    let names = VarNames::collect(script.commands());
    let mut body = Body::new(&names);
    for (index, command) in script.commands().iter().enumerate() {
        if !body.command(command) {
            return Err(ExportError::Unexportable(vec![Unexportable {
                index,
                command: command.name(),
            }]));
        }
    }

    let uses = |name: &str| script.commands().iter().any(|c| c.name() == name);
    let random = uses("random") || uses("random_range") || uses("random_value");
    let python = uses("run_python");

    let mut out = Vec::new();
    out.push("import math".to_owned());
    if random {
        out.push("import random".to_owned());
    }
    out.push("import time".to_owned());
    if python {
        out.extend(["import json", "import os", "import subprocess", "import sys"].map(String::from));
    }
    out.push(String::new());
    out.push("import serial".to_owned());
    out.push(String::new());
    settings(&mut out, options);
    if python {
        out.push(String::new());
        out.push("LAUNCHER = r'''".to_owned());
        out.extend(LAUNCHER.trim().lines().map(String::from));
        out.push("'''".to_owned());
        out.push(String::new());
        out.extend(RUN_PYTHON.lines().map(String::from));
    }
    out.push(String::new());
    out.extend(MAIN_HEAD.lines().map(String::from));
    if random {
        out.push("        random.seed(time.time())".to_owned());
    }
    for (script_name, py) in &names.0 {
        out.push(format!("        {py} = 0  # ${script_name}"));
    }
    out.push(String::new());
    out.extend(body.lines.iter().map(|l| format!("        {l}")));
    out.extend(MAIN_TAIL.lines().map(String::from));
    let mut text = out.join("\n");
    text.push('\n');
    Ok(text)
}

// ── Program text ──────────────────────────────────────────────────────────────

fn settings(out: &mut Vec<String>, options: &ExportOptions) {
    out.push(format!("PORT = {}", py_string(&options.port)));
    out.push(format!("BAUD = {}", options.baud));
    out.push(format!("KEEPALIVE_INTERVAL_S = {:?}", options.keepalive_s));
    out.push(format!("WARMUP_S = {:?}", options.warmup_s));
    out.push(format!("SCRIPTS_DIR = {}", py_string(&options.scripts_dir)));
    out.push(format!("STATE_HEADER = 0x{:02X}", serial::STATE_HEADER));
    out.push(String::new());
    out.push("# (high, low) bits per button".to_owned());
    out.push("BUTTON_MAP = {".to_owned());
    for b in Button::ALL {
        let (high, low) = serial::button_bits(b);
        out.push(format!("    {}: (0x{high:02X}, 0x{low:02X}),", py_string(b.name())));
    }
    out.push("}".to_owned());
    out.push(String::new());
    out.extend(BUTTONS_TO_BYTES.lines().map(String::from));
}

const BUTTONS_TO_BYTES: &str = r#"
def buttons_to_bytes(buttons):
    high = low = 0
    for b in buttons:
        h, l = BUTTON_MAP[b]
        high |= h
        low |= l
    return high, low"#;

const RUN_PYTHON: &str = r#"def run_python_main(script_path, args, timeout_s=10):
    if not os.path.isabs(script_path):
        script_path = os.path.join(SCRIPTS_DIR, script_path)
    if timeout_s <= 0:
        timeout_s = 10
    cp = subprocess.run(
        [sys.executable, "-c", LAUNCHER, script_path, json.dumps(args, ensure_ascii=False)],
        capture_output=True, text=True, timeout=timeout_s,
    )
    if cp.returncode != 0:
        raise RuntimeError((cp.stderr or cp.stdout or "").strip())
    out = (cp.stdout or "").strip()
    return json.loads(out) if out else None"#;

const MAIN_HEAD: &str = r#"def main():
    ser = serial.Serial(PORT, BAUD, timeout=1)
    held = []
    timing = {"t0": None}

    def send_buttons(buttons):
        nonlocal held
        held = list(buttons)
        high, low = buttons_to_bytes(held)
        ser.write(bytes([STATE_HEADER, high, low]))

    def wait_with_keepalive(seconds):
        now = time.perf_counter()
        end = now + max(0.0, seconds)
        next_send = now + KEEPALIVE_INTERVAL_S
        while now < end:
            if now >= next_send:
                send_buttons(held)
                next_send += KEEPALIVE_INTERVAL_S
            time.sleep(max(0.0, min(end, next_send) - now))
            now = time.perf_counter()

    def press(buttons, ms):
        send_buttons(buttons)
        wait_with_keepalive(ms / 1000.0)
        send_buttons([])

    def mash(buttons, duration_ms, hold_ms, wait_ms, until_ms=None):
        if until_ms is not None and timing["t0"] is not None:
            end = timing["t0"] + until_ms / 1000.0
        else:
            end = time.perf_counter() + duration_ms / 1000.0
        while end - time.perf_counter() >= hold_ms / 1000.0:
            send_buttons(buttons)
            time.sleep(hold_ms / 1000.0)
            send_buttons([])
            remaining = end - time.perf_counter()
            if remaining <= 0:
                break
            time.sleep(min(wait_ms / 1000.0, remaining))
        send_buttons([])

    def wait_until(ms):
        if timing["t0"] is None:
            wait_with_keepalive(ms / 1000.0)
        else:
            wait_with_keepalive(timing["t0"] + ms / 1000.0 - time.perf_counter())

    def elapsed_ms():
        if timing["t0"] is None:
            return 0
        return (time.perf_counter() - timing["t0"]) * 1000.0

    try:
        send_buttons([])
        wait_with_keepalive(WARMUP_S)"#;

const MAIN_TAIL: &str = r#"    finally:
        try:
            send_buttons([])
        finally:
            ser.close()


if __name__ == "__main__":
    main()"#;

// ── Variable names ────────────────────────────────────────────────────────────

/// Names the generated program defines or that formulas may call.
const RESERVED: &[&str] = &[
    "False", "None", "True", "and", "as", "assert", "async", "await", "break", "case", "class",
    "continue", "def", "del", "elif", "else", "except", "finally", "for", "from", "global", "if",
    "import", "in", "is", "lambda", "match", "nonlocal", "not", "or", "pass", "raise", "return",
    "try", "while", "with", "yield", "abs", "bool", "float", "int", "len", "max", "min", "print",
    "round", "str", "sum", "json", "math", "os", "random", "serial", "subprocess", "sys", "time",
    "main", "ser", "held", "timing", "res", "send_buttons", "wait_with_keepalive", "press", "mash",
    "wait_until", "elapsed_ms", "run_python_main", "buttons_to_bytes", "BAUD", "BUTTON_MAP",
    "KEEPALIVE_INTERVAL_S", "LAUNCHER", "PORT", "SCRIPTS_DIR", "STATE_HEADER", "WARMUP_S",
];

/// Script variable name → Python identifier.
struct VarNames(BTreeMap<String, String>);

impl VarNames {
    fn collect(commands: &[Command]) -> Self {
        let mut found = BTreeSet::new();
        for command in commands {
            let (written, read) = touched(command);
            found.extend(written.into_iter().map(str::to_owned));
            for v in read {
                references(v, &mut found);
            }
        }

        let mut taken = BTreeSet::new();
        let mut map = BTreeMap::new();
        for name in found {
            let base = py_ident(&name);
            let mut ident = base.clone();
            let mut n = 2;
            while taken.contains(&ident) {
                ident = format!("{base}_{n}");
                n += 1;
            }
            taken.insert(ident.clone());
            map.insert(name, ident);
        }
        Self(map)
    }

    fn get(&self, name: &str) -> String {
        self.0.get(name).cloned().unwrap_or_else(|| py_ident(name))
    }

    /// Any field value as a Python expression.
    fn value(&self, v: &Value) -> String {
        match v {
            Value::Null => "None".to_owned(),
            Value::Bool(true) => "True".to_owned(),
            Value::Bool(false) => "False".to_owned(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => {
                let t = s.trim();
                if let Some(src) = t.strip_prefix('=') {
                    format!("({})", self.formula(src))
                } else if let Some(r) = t.strip_prefix('$') {
                    self.reference(r)
                } else {
                    py_string(s)
                }
            }
            Value::Array(items) => {
                let items: Vec<_> = items.iter().map(|i| self.value(i)).collect();
                format!("[{}]", items.join(", "))
            }
            Value::Object(map) => {
                let pairs: Vec<_> = map
                    .iter()
                    .map(|(k, v)| format!("{}: {}", py_string(k), self.value(v)))
                    .collect();
                format!("{{{}}}", pairs.join(", "))
            }
        }
    }

    /// A numeric field; numeric strings become numbers.
    fn number(&self, v: &Value) -> String {
        if let Value::String(s) = v {
            let t = s.trim();
            if t.parse::<f64>().is_ok_and(f64::is_finite) {
                return t.to_owned();
            }
        }
        self.value(v)
    }

    fn number_or(&self, v: &Option<Value>, default: &str) -> String {
        v.as_ref().map_or_else(|| default.to_owned(), |v| self.number(v))
    }

    fn formula(&self, src: &str) -> String {
        match var_ref() {
            Some(re) => re
                .replace_all(src, |c: &Captures<'_>| self.get(&c[1]))
                .into_owned(),
            None => src.replace('$', ""),
        }
    }

    /// `name[0][key][$i]` after the `$`.
    fn reference(&self, r: &str) -> String {
        let Some(bracket) = r.find('[') else {
            return self.get(r);
        };
        let mut out = self.get(&r[..bracket]);
        let Some(re) = subscript() else {
            return out;
        };
        for cap in re.captures_iter(&r[bracket..]) {
            let raw = cap[1].trim();
            let key = if let Some(inner) = raw.strip_prefix('$') {
                self.reference(inner)
            } else if raw.parse::<i64>().is_ok() {
                raw.to_owned()
            } else {
                py_string(raw.trim_matches(|c| c == '"' || c == '\''))
            };
            out.push('[');
            out.push_str(&key);
            out.push(']');
        }
        out
    }
}

/// Variables a command writes, and the raw fields it reads.
fn touched(command: &Command) -> (Vec<&str>, Vec<&Value>) {
    match command {
        Command::Wait(c) => (vec![], vec![&c.ms]),
        Command::WaitUntil(c) => (vec![], vec![&c.ms]),
        Command::GetElapsed(c) => (vec![&c.out], vec![]),
        Command::Press(c) => (vec![], vec![&c.ms]),
        Command::Mash(c) => (
            vec![],
            [&c.duration_ms, &c.until_ms, &c.hold_ms, &c.wait_ms]
                .into_iter()
                .flatten()
                .collect(),
        ),
        Command::If(c) => (vec![], vec![&c.left, &c.right]),
        Command::While(c) => (vec![], vec![&c.left, &c.right]),
        Command::Set(c) => (vec![&c.var], vec![&c.value]),
        Command::Add(c) => (vec![&c.var], vec![&c.value]),
        Command::Contains(c) => (vec![&c.out], vec![&c.needle, &c.haystack]),
        Command::Random(c) => (vec![&c.out], vec![&c.choices]),
        Command::RandomRange(c) => (vec![&c.out], vec![&c.min, &c.max]),
        Command::RandomValue(c) => (vec![&c.out], vec![]),
        Command::RunPython(c) => (
            c.out.as_deref().map(str::trim).filter(|o| !o.is_empty()).into_iter().collect(),
            [&c.args, &c.timeout_s].into_iter().flatten().collect(),
        ),
        _ => (vec![], vec![]),
    }
}

fn references(v: &Value, found: &mut BTreeSet<String>) {
    match v {
        Value::String(s) => {
            let t = s.trim();
            let names = |text: &str| -> Vec<String> {
                var_ref().map_or_else(Vec::new, |re| {
                    re.captures_iter(text).map(|c| c[1].to_owned()).collect()
                })
            };
            if let Some(src) = t.strip_prefix('=') {
                found.extend(names(src));
            } else if let Some(r) = t.strip_prefix('$') {
                let base = r.find('[').map_or(r, |b| &r[..b]);
                found.insert(base.to_owned());
                found.extend(names(&r[base.len()..]));
            }
        }
        Value::Array(items) => items.iter().for_each(|i| references(i, found)),
        Value::Object(map) => map.values().for_each(|i| references(i, found)),
        _ => {}
    }
}

fn var_ref() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z_][A-Za-z0-9_]*)").ok())
        .as_ref()
}

fn subscript() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]+)\]").ok()).as_ref()
}

fn py_ident(name: &str) -> String {
    let mut s: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if s.is_empty() {
        s.push_str("var");
    }
    if s.starts_with(|c: char| c.is_ascii_digit()) {
        s.insert(0, '_');
    }
    if RESERVED.contains(&s.as_str()) {
        s.push('_');
    }
    s
}

fn py_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => out.push_str(&format!("\\u{:04x}", u32::from(c))),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn py_buttons(buttons: &[Button]) -> String {
    let names: Vec<_> = buttons.iter().map(|b| py_string(b.name())).collect();
    format!("[{}]", names.join(", "))
}

// ── Body ──────────────────────────────────────────────────────────────────────

struct Body<'a> {
    names: &'a VarNames,
    lines: Vec<String>,
    depth: usize,
    /// Line count right after each open block's header.
    open: Vec<usize>,
}

impl<'a> Body<'a> {
    fn new(names: &'a VarNames) -> Self {
        Self {
            names,
            lines: Vec::new(),
            depth: 0,
            open: Vec::new(),
        }
    }

    fn line(&mut self, text: impl AsRef<str>) {
        self.lines
            .push(format!("{}{}", "    ".repeat(self.depth), text.as_ref()));
    }

    fn open_block(&mut self, header: String) {
        self.line(header);
        self.open.push(self.lines.len());
        self.depth += 1;
    }

    fn close_block(&mut self) {
        if self.open.pop() == Some(self.lines.len()) {
            self.line("pass");
        }
        self.depth = self.depth.saturating_sub(1);
    }

    /// Emit one command.  Returns `false` for a command with no translation.
    fn command(&mut self, command: &Command) -> bool {
        let n = self.names;
        match command {
            Command::Comment(c) => {
                if c.text.trim().is_empty() {
                    self.line("#");
                }
                for l in c.text.lines() {
                    self.line(format!("# {l}").trim_end());
                }
            }
            Command::Wait(c) => {
                self.line(format!("wait_with_keepalive({} / 1000.0)", n.number(&c.ms)));
            }
            Command::StartTiming(_) => self.line(r#"timing["t0"] = time.perf_counter()"#),
            Command::WaitUntil(c) => self.line(format!("wait_until({})", n.number(&c.ms))),
            Command::GetElapsed(c) => self.line(format!("{} = elapsed_ms()", n.get(&c.out))),
            Command::Press(c) => self.line(format!(
                "press({}, {})",
                py_buttons(&c.buttons),
                n.number(&c.ms)
            )),
            Command::Hold(c) => self.line(format!("send_buttons({})", py_buttons(&c.buttons))),
            Command::Mash(c) => self.line(format!(
                "mash({}, {}, {}, {}, {})",
                py_buttons(&c.buttons),
                n.number_or(&c.duration_ms, "1000"),
                n.number_or(&c.hold_ms, "25"),
                n.number_or(&c.wait_ms, "25"),
                n.number_or(&c.until_ms, "None"),
            )),
            Command::If(c) => {
                self.open_block(format!("if {} {} {}:", n.value(&c.left), c.op, n.value(&c.right)));
            }
            Command::While(c) => {
                self.open_block(format!(
                    "while {} {} {}:",
                    n.value(&c.left),
                    c.op,
                    n.value(&c.right)
                ));
            }
            Command::EndIf(_) | Command::EndWhile(_) => self.close_block(),
            Command::Set(c) => self.line(format!("{} = {}", n.get(&c.var), n.value(&c.value))),
            Command::Add(c) => self.line(format!("{} += {}", n.get(&c.var), n.number(&c.value))),
            Command::Contains(c) => {
                let out = n.get(&c.out);
                self.line("try:");
                self.line(format!(
                    "    {out} = {} in {}",
                    n.value(&c.needle),
                    n.value(&c.haystack)
                ));
                self.line("except TypeError:");
                self.line(format!("    {out} = False"));
            }
            Command::Random(c) => {
                self.line(format!("{} = random.choice({})", n.get(&c.out), n.value(&c.choices)));
            }
            Command::RandomRange(c) if c.integer => self.line(format!(
                "{} = random.randint(int({}), int({}))",
                n.get(&c.out),
                n.number(&c.min),
                n.number(&c.max)
            )),
            Command::RandomRange(c) => self.line(format!(
                "{} = random.uniform({}, {})",
                n.get(&c.out),
                n.number(&c.min),
                n.number(&c.max)
            )),
            Command::RandomValue(c) => self.line(format!("{} = random.random()", n.get(&c.out))),
            Command::RunPython(c) => {
                let args = match &c.args {
                    None => "[]".to_owned(),
                    Some(Value::String(s)) if !s.trim().starts_with('$') => {
                        format!("json.loads({})", py_string(s))
                    }
                    Some(v) => n.value(v),
                };
                let call = format!(
                    "run_python_main({}, {args}, timeout_s={})",
                    py_string(&c.file),
                    n.number_or(&c.timeout_s, "10")
                );
                match c.out.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
                    Some(out) => self.line(format!("{} = {call}", n.get(out))),
                    None => self.line(call),
                }
            }
            _ => return false,
        }
        true
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::index::Strictness;
    use serde_json::json;

    fn script(doc: Value) -> Script {
        Script::from_value(doc, Strictness::Strict).unwrap()
    }

    fn export(doc: Value) -> String {
        export_python(&script(doc), &ExportOptions::default()).unwrap()
    }

    #[test]
    fn structured_script_becomes_native_blocks() {
        let py = export(json!([
            {"cmd": "set", "var": "n", "value": 0},
            {"cmd": "while", "left": "$n", "op": "<", "right": 3},
            {"cmd": "press", "buttons": ["A", "Up"], "ms": "80"},
            {"cmd": "add", "var": "n", "value": 1},
            {"cmd": "end_while"},
            {"cmd": "wait", "ms": "=$n * 100"},
        ]));
        assert!(py.contains("        n = 0  # $n\n"));
        assert!(py.contains("        while n < 3:\n            press([\"A\", \"Up\"], 80)\n            n += 1\n"));
        assert!(py.contains("        wait_with_keepalive((n * 100) / 1000.0)\n"));
        assert!(py.contains("    \"L\": (0x01, 0x00),"));
        assert!(py.contains("STATE_HEADER = 0x54"));
        assert!(py.ends_with("    main()\n"));
        assert!(!py.contains("import random"));
        assert!(!py.contains("run_python_main"));
    }

    #[test]
    fn empty_blocks_get_pass() {
        let py = export(json!([
            {"cmd": "if", "left": 1, "op": "==", "right": 1},
            {"cmd": "end_if"},
            {"cmd": "hold", "buttons": []},
        ]));
        assert!(py.contains("        if 1 == 1:\n            pass\n        send_buttons([])\n"));
    }

    #[test]
    fn jumps_and_console_extras_block_export() {
        let s = script(json!([
            {"cmd": "label", "name": "top"},
            {"cmd": "press", "buttons": ["A"], "ms": 50},
            {"cmd": "find_color", "x": 1, "y": 1, "rgb": [0, 0, 0], "out": "hit"},
            {"cmd": "tap_touch", "x": 1, "y": 1},
            {"cmd": "goto", "label": "top"},
        ]));
        match export_python(&s, &ExportOptions::default()) {
            Err(ExportError::Unexportable(list)) => {
                let found: Vec<_> = list.iter().map(|u| (u.index, u.command)).collect();
                assert_eq!(
                    found,
                    [(0, "label"), (2, "find_color"), (3, "tap_touch"), (4, "goto")]
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn every_exportable_command_translates() {
        let records = json!([
            {"cmd": "comment", "text": "hi"},
            {"cmd": "wait", "ms": 1},
            {"cmd": "start_timing"},
            {"cmd": "wait_until", "ms": 5},
            {"cmd": "get_elapsed", "out": "t"},
            {"cmd": "press", "buttons": ["A"], "ms": 1},
            {"cmd": "hold", "buttons": ["B"]},
            {"cmd": "mash", "buttons": ["A"], "until_ms": 900},
            {"cmd": "if", "left": 1, "op": "!=", "right": 2},
            {"cmd": "end_if"},
            {"cmd": "while", "left": 1, "op": "<", "right": 0},
            {"cmd": "end_while"},
            {"cmd": "set", "var": "s", "value": "text"},
            {"cmd": "add", "var": "s", "value": 1},
            {"cmd": "contains", "needle": "x", "haystack": "$s", "out": "c"},
            {"cmd": "random", "choices": [1, 2], "out": "r"},
            {"cmd": "random_range", "min": 1, "max": 6, "out": "d"},
            {"cmd": "random_value", "out": "u"},
            {"cmd": "run_python", "file": "f.py", "args": ["$d"], "out": "res"},
        ]);
        let exportable: BTreeSet<_> = crate::script::command::COMMAND_NAMES
            .iter()
            .copied()
            .filter(|n| spec::get(n).is_some_and(|s| s.exportable))
            .collect();
        let covered: BTreeSet<_> = records
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|r| r["cmd"].as_str())
            .collect();
        assert_eq!(exportable, covered);

        let py = export(records);
        assert!(py.contains("mash([\"A\"], 1000, 25, 25, 900)"));
        assert!(py.contains("res_ = run_python_main(\"f.py\", [d], timeout_s=10)"));
        assert!(py.contains("LAUNCHER = r'''"));
        assert!(py.contains("import random"));
        assert!(py.contains("        random.seed(time.time())"));
        assert!(py.contains("            c = \"x\" in s\n"));
    }

    #[test]
    fn references_and_names() {
        let py = export(json!([
            {"cmd": "set", "var": "grid", "value": [[1, 2]]},
            {"cmd": "set", "var": "my var", "value": "$grid[0][$i]"},
            {"cmd": "set", "var": "my_var", "value": "$m[hp]"},
            {"cmd": "set", "var": "time", "value": "say \"hi\"\n"},
        ]));
        assert!(py.contains("        my_var = grid[0][i]\n"));
        assert!(py.contains("        my_var_2 = m[\"hp\"]\n"));
        assert!(py.contains("        time_ = \"say \\\"hi\\\"\\n\"\n"));
        assert!(py.contains("        i = 0  # $i\n"));
    }

    #[test]
    fn settings_are_baked_in() {
        let s = script(json!([{"cmd": "wait", "ms": 1}]));
        let options = ExportOptions {
            port: "/dev/ttyUSB0".to_owned(),
            baud: 115_200,
            keepalive_s: 0.1,
            warmup_s: 3.0,
            scripts_dir: "helpers".to_owned(),
        };
        let py = export_python(&s, &options).unwrap();
        assert!(py.contains("PORT = \"/dev/ttyUSB0\"\nBAUD = 115200\nKEEPALIVE_INTERVAL_S = 0.1\nWARMUP_S = 3.0\n"));
    }

    #[test]
    fn refuses_empty_and_tolerant_scripts() {
        assert!(matches!(
            export_python(&Script::default(), &ExportOptions::default()),
            Err(ExportError::EmptyScript)
        ));
        let s = Script::from_value(json!([{"cmd": "end_if"}]), Strictness::Tolerant).unwrap();
        assert!(matches!(
            export_python(&s, &ExportOptions::default()),
            Err(ExportError::NotRunnable(1))
        ));
    }
}
