//! In-memory backend that records every state it would have sent.
//!
//! Used for dry runs from the command line and as the test double for the
//! engine.  It supports every capability unless told otherwise.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::debug;

use super::{Capability, OutputBackend};
use crate::controller::{AuxButton, Button, ControllerState, InterfaceButton, Stick, Touch};
use crate::error::BackendError;
use crate::timing::{self, CancelToken};

#[derive(Debug)]
pub struct MemoryBackend {
    state: Mutex<ControllerState>,
    sent: Mutex<Vec<ControllerState>>,
    connected: AtomicBool,
    capabilities: HashSet<Capability>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_capabilities(&Capability::ALL)
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend that only advertises `caps` (plus the required pad).
    pub fn with_capabilities(caps: &[Capability]) -> Self {
        Self {
            state: Mutex::new(ControllerState::new()),
            sent: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
            capabilities: caps.iter().copied().collect(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ControllerState {
        lock(&self.state).clone()
    }

    /// Every state sent so far, oldest first.
    pub fn sent(&self) -> Vec<ControllerState> {
        lock(&self.sent).clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn update(&self, f: impl FnOnce(&mut ControllerState)) -> Result<(), BackendError> {
        if !self.is_connected() {
            return Err(BackendError::NotConnected);
        }
        let mut state = lock(&self.state);
        f(&mut state);
        debug!(state = ?*state, "memory backend send");
        lock(&self.sent).push(state.clone());
        Ok(())
    }

    fn require(&self, cap: Capability, op: &'static str) -> Result<(), BackendError> {
        if self.capabilities.contains(&cap) {
            Ok(())
        } else {
            Err(BackendError::Unsupported {
                op,
                backend: self.name(),
            })
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl OutputBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_buttons(&self, buttons: &[Button]) -> Result<(), BackendError> {
        self.update(|s| s.set_buttons(buttons))
    }

    fn reset_neutral(&self) -> Result<(), BackendError> {
        self.update(ControllerState::reset_neutral)
    }

    fn supports(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }

    fn tap_touch(
        &self,
        x: i64,
        y: i64,
        down: Duration,
        settle: Duration,
        cancel: &CancelToken,
    ) -> Result<(), BackendError> {
        self.require(Capability::Touch, "tap_touch")?;
        self.update(|s| s.touch = Some(Touch::clamped(x, y)))?;
        let interrupted = timing::interruptible_sleep(down, cancel);
        self.update(|s| s.touch = None)?;
        if !interrupted {
            timing::interruptible_sleep(settle, cancel);
        }
        Ok(())
    }

    fn set_left_stick(&self, x: f64, y: f64) -> Result<(), BackendError> {
        self.require(Capability::LeftStick, "set_left_stick")?;
        self.update(|s| s.left_stick = Stick::new(x, y))
    }

    fn set_right_stick(&self, x: f64, y: f64) -> Result<(), BackendError> {
        self.require(Capability::RightStick, "set_right_stick")?;
        self.update(|s| s.right_stick = Stick::new(x, y))
    }

    fn set_aux_buttons(&self, buttons: &[AuxButton]) -> Result<(), BackendError> {
        self.require(Capability::AuxButtons, "set_aux_buttons")?;
        self.update(|s| s.set_aux(buttons))
    }

    fn set_interface_buttons(&self, buttons: &[InterfaceButton]) -> Result<(), BackendError> {
        self.require(Capability::InterfaceButtons, "set_interface_buttons")?;
        self.update(|s| s.set_interface(buttons))
    }

    fn disconnect(&self) -> Result<(), BackendError> {
        self.set_connected(false);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
