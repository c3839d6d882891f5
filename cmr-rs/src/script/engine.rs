//! The script engine: an `Idle → Running → Stopping → Idle` state machine
//! that runs one [`Script`] at a time on a dedicated worker thread.
//!
//! The host thread only loads, starts and stops scripts and reads the
//! published instruction pointer and variable snapshot.  The worker owns
//! the variable store for the duration of a run.  Cancellation is
//! cooperative: the shared [`CancelToken`] is checked at the top of every
//! iteration and inside every sleep.
//!
//! ```no_run
//! use std::sync::Arc;
//! use cmr::backend::MemoryBackend;
//! use cmr::script::{Engine, Script, Strictness};
//!
//! let mut engine = Engine::default();
//! engine.set_backend(Some(Arc::new(MemoryBackend::new()))).unwrap();
//! engine
//!     .load(Script::from_json_str(r#"[{"cmd":"press","buttons":["A"],"ms":50}]"#,
//!           Strictness::Strict).unwrap())
//!     .unwrap();
//! engine.run().unwrap();
//! engine.wait();
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::context::{ExecutionContext, Services};
use super::index::Strictness;
use super::program::Script;
use crate::backend::SharedBackend;
use crate::error::{EngineError, RunError};
use crate::timing::CancelToken;

/// Default bound on how long [`Engine::stop`] waits for the worker.
pub const DEFAULT_STOP_JOIN: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running,
    Stopping,
}

/// Callbacks from the engine.  All are invoked on the worker thread except
/// those emitted by [`Engine::stop`], which run on the caller's thread.
pub trait EngineObserver: Send + Sync {
    /// The instruction about to execute, or `None` once a run has ended.
    fn on_ip(&self, _ip: Option<usize>) {}
    /// A command finished.
    fn on_tick(&self) {}
    fn on_status(&self, _message: &str) {}
    /// The run aborted with `error`.
    fn on_error(&self, _error: &RunError) {}
    /// The worker is about to exit; the engine is already idle.
    fn on_finished(&self) {}
}

/// Observer that ignores everything.
#[derive(Debug, Default)]
pub struct NullObserver;

impl EngineObserver for NullObserver {}

// ── Shared worker state ───────────────────────────────────────────────────────

#[derive(Debug)]
struct Shared {
    state: Mutex<EngineState>,
    idle: Condvar,
    ip: AtomicUsize,
    vars: Mutex<Map<String, Value>>,
}

impl Shared {
    fn new() -> Self {
        Self {
            state: Mutex::new(EngineState::Idle),
            idle: Condvar::new(),
            ip: AtomicUsize::new(0),
            vars: Mutex::new(Map::new()),
        }
    }

    fn state(&self) -> EngineState {
        *lock(&self.state)
    }

    fn set_state(&self, state: EngineState) {
        *lock(&self.state) = state;
        if state == EngineState::Idle {
            self.idle.notify_all();
        }
    }

    /// Move `Running` to `Stopping` under one lock.  Returns `false` when
    /// there is no run to stop.
    fn begin_stop(&self) -> bool {
        let mut state = lock(&self.state);
        if *state != EngineState::Running {
            return false;
        }
        *state = EngineState::Stopping;
        true
    }

    /// Block until idle or until `timeout` passes.  Returns `true` if idle.
    fn wait_idle(&self, timeout: Duration) -> bool {
        let guard = lock(&self.state);
        let (guard, _) = self
            .idle
            .wait_timeout_while(guard, timeout, |s| *s != EngineState::Idle)
            .unwrap_or_else(PoisonError::into_inner);
        *guard == EngineState::Idle
    }

    fn publish_vars(&self, vars: Map<String, Value>) {
        *lock(&self.vars) = vars;
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

// ── Engine ────────────────────────────────────────────────────────────────────

pub struct Engine {
    script: Arc<Script>,
    backend: Option<SharedBackend>,
    services: Services,
    observer: Arc<dyn EngineObserver>,
    cancel: CancelToken,
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    stop_join: Duration,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(Services::default())
    }
}

impl Engine {
    pub fn new(services: Services) -> Self {
        Self {
            script: Arc::new(Script::default()),
            backend: None,
            services,
            observer: Arc::new(NullObserver),
            cancel: CancelToken::new(),
            shared: Arc::new(Shared::new()),
            worker: None,
            stop_join: DEFAULT_STOP_JOIN,
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn EngineObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// How long [`stop`](Self::stop) waits before detaching the worker.
    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_join = timeout;
        self
    }

    pub fn state(&self) -> EngineState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        self.state() != EngineState::Idle
    }

    /// Instruction pointer as last published by the worker.
    pub fn ip(&self) -> usize {
        self.shared.ip.load(Ordering::Relaxed)
    }

    /// Snapshot of the variables, refreshed after every command that
    /// changed them.
    pub fn vars(&self) -> Map<String, Value> {
        lock(&self.shared.vars).clone()
    }

    pub fn script(&self) -> &Script {
        &self.script
    }

    pub fn backend(&self) -> Option<&SharedBackend> {
        self.backend.as_ref()
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Swap the output backend.  Refused while a script is running.
    pub fn set_backend(&mut self, backend: Option<SharedBackend>) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::Busy);
        }
        self.backend = backend;
        Ok(())
    }

    /// Replace the loaded script and reset the variables and IP.
    pub fn load(&mut self, script: Script) -> Result<(), EngineError> {
        if self.is_running() {
            return Err(EngineError::Busy);
        }
        let len = script.len();
        self.script = Arc::new(script);
        self.shared.publish_vars(Map::new());
        self.shared.ip.store(0, Ordering::Relaxed);
        self.status(&format!("Loaded script ({len} commands)"));
        Ok(())
    }

    /// Strictly load a script file.  On failure the previous script stays.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        let script = Script::from_file(path, Strictness::Strict)?;
        self.load(script)
    }

    /// Start the loaded script on a worker thread.
    pub fn run(&mut self) -> Result<(), EngineError> {
        let backend = match &self.backend {
            Some(b) if b.is_connected() => Arc::clone(b),
            _ => return Err(EngineError::NoBackend),
        };
        if self.script.is_empty() {
            return Err(EngineError::EmptyScript);
        }
        if self.is_running() {
            return Err(EngineError::Busy);
        }
        if !self.script.is_runnable() {
            return Err(EngineError::NotRunnable(self.script.warnings().len()));
        }
        let unsupported: Vec<(usize, &'static str)> = self
            .script
            .commands()
            .iter()
            .enumerate()
            .filter(|(_, c)| c.required_capability().is_some_and(|cap| !backend.supports(cap)))
            .map(|(i, c)| (i, c.name()))
            .collect();
        if !unsupported.is_empty() {
            warn!(backend = backend.name(), count = unsupported.len(), "unsupported commands");
            return Err(EngineError::UnsupportedCommands(unsupported));
        }

        // A worker detached by an earlier stop() has reached Idle by now.
        if let Some(old) = self.worker.take() {
            let _ = old.join();
        }

        self.cancel.reset();
        self.shared.publish_vars(Map::new());
        self.shared.ip.store(0, Ordering::Relaxed);
        self.shared.set_state(EngineState::Running);

        let job = Job {
            script: Arc::clone(&self.script),
            backend,
            services: self.services.clone(),
            cancel: self.cancel.clone(),
            shared: Arc::clone(&self.shared),
            observer: Arc::clone(&self.observer),
        };
        match thread::Builder::new()
            .name("cmr-engine".into())
            .spawn(move || job.work())
        {
            Ok(handle) => {
                self.worker = Some(handle);
                Ok(())
            }
            Err(e) => {
                self.shared.set_state(EngineState::Idle);
                Err(EngineError::Spawn(e))
            }
        }
    }

    /// Cancel the running script, wait a bounded time for the worker, then
    /// force the backend to neutral.  A worker that is still inside a
    /// non-interruptible call is left to finish on its own.
    pub fn stop(&mut self) {
        if !self.shared.begin_stop() {
            return;
        }
        self.cancel.cancel();

        if self.shared.wait_idle(self.stop_join) {
            if let Some(handle) = self.worker.take() {
                let _ = handle.join();
            }
        } else {
            warn!(
                "worker still busy after {}ms; detaching it",
                self.stop_join.as_millis()
            );
        }

        self.reset_backend();
        self.shared.ip.store(0, Ordering::Relaxed);
        self.observer.on_ip(None);
        self.status("Script stopped.");
    }

    /// Block until the current run ends on its own.
    pub fn wait(&mut self) {
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    fn reset_backend(&self) {
        if let Some(b) = self.backend.as_ref().filter(|b| b.is_connected()) {
            if let Err(e) = b.reset_neutral() {
                warn!("cannot reset backend to neutral: {e}");
            }
        }
    }

    fn status(&self, message: &str) {
        info!("{message}");
        self.observer.on_status(message);
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

struct Job {
    script: Arc<Script>,
    backend: SharedBackend,
    services: Services,
    cancel: CancelToken,
    shared: Arc<Shared>,
    observer: Arc<dyn EngineObserver>,
}

impl Job {
    fn work(self) {
        info!("Running Script.");
        self.observer.on_status("Running Script.");

        // A panicking handler must still leave the engine idle and neutral.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute()))
            .unwrap_or_else(|payload| Err(RunError::Panicked(panic_message(&*payload))));

        if self.backend.is_connected() {
            if let Err(e) = self.backend.reset_neutral() {
                warn!("cannot reset backend to neutral: {e}");
            }
        }
        match &outcome {
            Ok(()) if !self.cancel.is_cancelled() => {
                info!("Script completed.");
                self.observer.on_status("Script completed.");
            }
            Ok(()) => debug!("worker exiting after cancellation"),
            Err(e) => {
                error!("Script error: {e}");
                self.observer.on_status(&format!("Script error: {e}"));
                self.observer.on_error(e);
            }
        }

        self.shared.ip.store(0, Ordering::Relaxed);
        self.observer.on_ip(None);
        self.cancel.reset();
        self.shared.set_state(EngineState::Idle);
        self.observer.on_finished();
    }

    fn execute(&self) -> Result<(), RunError> {
        let mut ctx = ExecutionContext::new(
            self.script.index(),
            &self.cancel,
            &self.services,
            Some(Arc::clone(&self.backend)),
        );
        while !self.cancel.is_cancelled() {
            let Some(command) = self.script.get(ctx.ip) else {
                break;
            };
            self.shared.ip.store(ctx.ip, Ordering::Relaxed);
            self.observer.on_ip(Some(ctx.ip));
            debug!(ip = ctx.ip, "{command}");

            let result = command.as_exec().exec(&mut ctx);
            if ctx.vars.take_dirty() {
                self.shared.publish_vars(ctx.vars.to_object(&[]));
            }
            result?;

            self.observer.on_tick();
            ctx.advance();
        }
        Ok(())
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
