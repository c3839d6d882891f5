//! External helper scripts for `run_python`.
//!
//! The script file must define `main(*args)`.  A small launcher imports it,
//! calls `main` with the JSON-decoded argument list and prints the return
//! value as JSON on stdout, which becomes the command's result.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::RunError;

/// Launches a helper script and returns its decoded result.
pub trait ProcessRunner: Send + Sync {
    /// `args` is passed as a JSON list.  A non-zero exit, a timeout or
    /// undecodable output is an error.
    fn run(&self, file: &Path, args: &Value, timeout: Duration) -> Result<Value, RunError>;
}

/// Imports the helper, calls `main(*args)` and prints the result as JSON.
pub(crate) const LAUNCHER: &str = r#"
import json, sys, importlib.util

def load(path):
    spec = importlib.util.spec_from_file_location("user_module", path)
    if spec is None or spec.loader is None:
        raise RuntimeError("cannot load module from " + path)
    mod = importlib.util.module_from_spec(spec)
    spec.loader.exec_module(mod)
    return mod

mod = load(sys.argv[1])
if not hasattr(mod, "main"):
    raise RuntimeError("script does not define main(...)")
args = json.loads(sys.argv[2]) if len(sys.argv) > 2 else []
print(json.dumps(mod.main(*args), ensure_ascii=False))
"#;

/// Runs scripts with a Python interpreter.  Relative paths resolve under
/// `scripts_dir`.
#[derive(Debug, Clone)]
pub struct PythonRunner {
    pub interpreter: String,
    pub scripts_dir: PathBuf,
}

impl Default for PythonRunner {
    fn default() -> Self {
        Self::new("python3", "py_scripts")
    }
}

impl PythonRunner {
    pub fn new(interpreter: impl Into<String>, scripts_dir: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
            scripts_dir: scripts_dir.into(),
        }
    }

    pub fn resolve(&self, file: &Path) -> PathBuf {
        if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.scripts_dir.join(file)
        }
    }
}

impl ProcessRunner for PythonRunner {
    fn run(&self, file: &Path, args: &Value, timeout: Duration) -> Result<Value, RunError> {
        let path = self.resolve(file);
        if !path.exists() {
            return Err(RunError::Subprocess(format!(
                "file not found: {}",
                path.display()
            )));
        }
        let argv: Vec<OsString> = vec![
            "-c".into(),
            LAUNCHER.into(),
            path.clone().into_os_string(),
            args.to_string().into(),
        ];
        debug!("run_python {} {}", path.display(), args);
        run_json(&self.interpreter, &argv, timeout)
    }
}

/// Run `program argv...` to completion on a private runtime and decode its
/// stdout as JSON.  Empty output decodes to `null`.
pub fn run_json(program: &str, argv: &[OsString], timeout: Duration) -> Result<Value, RunError> {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    rt.block_on(spawn_and_decode(program, argv, timeout))
}

async fn spawn_and_decode(
    program: &str,
    argv: &[OsString],
    timeout: Duration,
) -> Result<Value, RunError> {
    let child = tokio::process::Command::new(program)
        .args(argv)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RunError::Subprocess(format!("cannot start {program}: {e}")))?;

    let out = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| RunError::Timeout(timeout.as_secs_f64()))??;

    let stdout = String::from_utf8_lossy(&out.stdout);
    if !out.status.success() {
        let stderr = String::from_utf8_lossy(&out.stderr);
        let detail = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        return Err(RunError::Subprocess(format!("{}: {detail}", out.status)));
    }
    let text = stdout.trim();
    if text.is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(text)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
