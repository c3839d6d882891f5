//! Control-flow indices: label table, if map and while maps.
//!
//! All three are pure functions of the command list, built by a single
//! forward scan.  In strict mode any inconsistency is a [`LoadError`]; in
//! tolerant mode the scan carries on and reports what it skipped.

use std::collections::HashMap;

use super::command::Command;
use crate::error::LoadError;

pub type LabelTable = HashMap<String, usize>;

/// Opener index → closer index (or the reverse, for `end_to_while`).
pub type BlockMap = HashMap<usize, usize>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strictness {
    /// Any problem fails the load.  Required before a run.
    #[default]
    Strict,
    /// Problems become warnings so a half-written script can be inspected.
    Tolerant,
}

impl Strictness {
    fn is_strict(self) -> bool {
        self == Strictness::Strict
    }
}

/// Result of matching one kind of block.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockScan {
    pub forward: BlockMap,
    pub backward: BlockMap,
    /// Stray closers and never-closed openers, in script order.
    pub unclosed: Vec<usize>,
}

fn scan_blocks(
    commands: &[Command],
    is_open: fn(&Command) -> bool,
    is_close: fn(&Command) -> bool,
) -> (BlockScan, Vec<usize>, Vec<usize>) {
    let mut scan = BlockScan::default();
    let mut stack = Vec::new();
    let mut stray = Vec::new();
    for (i, cmd) in commands.iter().enumerate() {
        if is_open(cmd) {
            stack.push(i);
        } else if is_close(cmd) {
            match stack.pop() {
                Some(open) => {
                    scan.forward.insert(open, i);
                    scan.backward.insert(i, open);
                }
                None => stray.push(i),
            }
        }
    }
    scan.unclosed = stray.iter().chain(stack.iter()).copied().collect();
    scan.unclosed.sort_unstable();
    (scan, stray, stack)
}

fn check_blocks(
    commands: &[Command],
    strict: Strictness,
    names: (&'static str, &'static str),
    is_open: fn(&Command) -> bool,
    is_close: fn(&Command) -> bool,
) -> Result<BlockScan, LoadError> {
    let (scan, stray, leftover) = scan_blocks(commands, is_open, is_close);
    if strict.is_strict() {
        if let Some(&index) = stray.first() {
            return Err(LoadError::UnmatchedCloser {
                closer: names.1,
                index,
            });
        }
        if let Some(&index) = leftover.first() {
            return Err(LoadError::Unclosed {
                opener: names.0,
                index,
            });
        }
    }
    Ok(scan)
}

/// Map each `if` to its `end_if`.  Returns the map and the indices of
/// unmatched `if`/`end_if` commands.
pub fn build_if_map(
    commands: &[Command],
    strict: Strictness,
) -> Result<(BlockMap, Vec<usize>), LoadError> {
    let scan = check_blocks(
        commands,
        strict,
        ("if", "end_if"),
        |c| matches!(c, Command::If(_)),
        |c| matches!(c, Command::EndIf(_)),
    )?;
    Ok((scan.forward, scan.unclosed))
}

/// Map each `while` to its `end_while` and back.
pub fn build_while_map(
    commands: &[Command],
    strict: Strictness,
) -> Result<(BlockMap, BlockMap, Vec<usize>), LoadError> {
    let scan = check_blocks(
        commands,
        strict,
        ("while", "end_while"),
        |c| matches!(c, Command::While(_)),
        |c| matches!(c, Command::EndWhile(_)),
    )?;
    Ok((scan.forward, scan.backward, scan.unclosed))
}

/// Map label names to their index.  The first definition wins in tolerant
/// mode; later duplicates are reported as warnings.
pub fn build_labels(
    commands: &[Command],
    strict: Strictness,
) -> Result<(LabelTable, Vec<LoadError>), LoadError> {
    let mut labels = LabelTable::new();
    let mut warnings = Vec::new();
    for (index, cmd) in commands.iter().enumerate() {
        let Command::Label(label) = cmd else { continue };
        let problem = if label.name.is_empty() {
            Some(LoadError::EmptyLabel { index })
        } else if let Some(&first) = labels.get(&label.name) {
            Some(LoadError::DuplicateLabel {
                name: label.name.clone(),
                first,
                second: index,
            })
        } else {
            labels.insert(label.name.clone(), index);
            None
        };
        match problem {
            Some(e) if strict.is_strict() => return Err(e),
            Some(e) => warnings.push(e),
            None => {}
        }
    }
    Ok((labels, warnings))
}

/// Every index a running script needs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlowIndex {
    pub labels: LabelTable,
    pub if_to_end: BlockMap,
    pub while_to_end: BlockMap,
    pub end_to_while: BlockMap,
}

impl FlowIndex {
    /// Build all indices.  In tolerant mode the second value lists every
    /// problem that strict mode would have rejected.
    pub fn build(
        commands: &[Command],
        strict: Strictness,
    ) -> Result<(FlowIndex, Vec<LoadError>), LoadError> {
        let (labels, mut warnings) = build_labels(commands, strict)?;
        let (if_to_end, if_unclosed) = build_if_map(commands, strict)?;
        let (while_to_end, end_to_while, while_unclosed) = build_while_map(commands, strict)?;

        for index in if_unclosed {
            warnings.push(unclosed_warning(commands, index, "if", "end_if"));
        }
        for index in while_unclosed {
            warnings.push(unclosed_warning(commands, index, "while", "end_while"));
        }
        let index = FlowIndex {
            labels,
            if_to_end,
            while_to_end,
            end_to_while,
        };
        Ok((index, warnings))
    }
}

fn unclosed_warning(
    commands: &[Command],
    index: usize,
    opener: &'static str,
    closer: &'static str,
) -> LoadError {
    if commands[index].name() == opener {
        LoadError::Unclosed { opener, index }
    } else {
        LoadError::UnmatchedCloser { closer, index }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
