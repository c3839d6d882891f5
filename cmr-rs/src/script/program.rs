//! A loaded script: commands plus their control-flow indices.

use std::path::Path;

use serde_json::Value;

use super::command::{parse_commands, Command};
use super::index::{FlowIndex, Strictness};
use crate::error::LoadError;

/// Immutable once built; reloading builds a new `Script`.
#[derive(Debug, Default)]
pub struct Script {
    commands: Vec<Command>,
    index: FlowIndex,
    warnings: Vec<LoadError>,
}

impl Script {
    pub fn from_commands(commands: Vec<Command>, strict: Strictness) -> Result<Self, LoadError> {
        let (index, warnings) = FlowIndex::build(&commands, strict)?;
        Ok(Self {
            commands,
            index,
            warnings,
        })
    }

    pub fn from_value(doc: Value, strict: Strictness) -> Result<Self, LoadError> {
        Self::from_commands(parse_commands(doc)?, strict)
    }

    pub fn from_json_str(text: &str, strict: Strictness) -> Result<Self, LoadError> {
        Self::from_value(serde_json::from_str(text)?, strict)
    }

    pub fn from_file(path: impl AsRef<Path>, strict: Strictness) -> Result<Self, LoadError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text, strict)
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    pub fn get(&self, ip: usize) -> Option<&Command> {
        self.commands.get(ip)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn index(&self) -> &FlowIndex {
        &self.index
    }

    /// Problems tolerated by a tolerant load.  Always empty after a
    /// strict load.
    pub fn warnings(&self) -> &[LoadError] {
        &self.warnings
    }

    /// A script may only run when a strict load would have accepted it.
    pub fn is_runnable(&self) -> bool {
        self.warnings.is_empty()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_from_text() {
        let s = Script::from_json_str(
            r#"[{"cmd":"label","name":"top"},{"cmd":"goto","label":"top"}]"#,
            Strictness::Strict,
        )
        .unwrap();
        assert_eq!(s.len(), 2);
        assert_eq!(s.index().labels.get("top"), Some(&0));
        assert!(s.is_runnable());
    }

    #[test]
    fn tolerant_load_keeps_warnings() {
        let text = r#"[{"cmd":"end_if"}]"#;
        assert!(Script::from_json_str(text, Strictness::Strict).is_err());
        let s = Script::from_json_str(text, Strictness::Tolerant).unwrap();
        assert_eq!(s.warnings().len(), 1);
        assert!(!s.is_runnable());
    }

    #[test]
    fn bad_json_is_a_load_error() {
        assert!(matches!(
            Script::from_json_str("[{", Strictness::Strict),
            Err(LoadError::Json(_))
        ));
    }

    #[test]
    fn reads_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        std::fs::write(&path, r#"[{"cmd":"wait","ms":10}]"#).unwrap();
        let s = Script::from_file(&path, Strictness::Strict).unwrap();
        assert_eq!(s.get(0).map(Command::name), Some("wait"));
        assert!(matches!(
            Script::from_file(dir.path().join("missing.json"), Strictness::Strict),
            Err(LoadError::Io(_))
        ));
    }
}
