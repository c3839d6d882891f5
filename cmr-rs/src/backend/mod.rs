//! Output backends: where controller state ends up.
//!
//! Every backend implements [`OutputBackend`].  The required methods cover
//! the twelve-button pad; everything else is optional and advertised
//! through [`OutputBackend::supports`].  Calling an optional method the
//! backend does not implement yields [`BackendError::Unsupported`] instead
//! of a panic.
//!
//! Methods take `&self`: each backend guards its own state with a lock that
//! is held only while a packet is encoded and written.

pub mod memory;
pub mod serial;
pub mod udp;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::controller::{AuxButton, Button, InterfaceButton};
use crate::timing::CancelToken;
use crate::error::BackendError;

pub use memory::MemoryBackend;
pub use serial::SerialBackend;
pub use udp::UdpBackend;

/// Optional features a backend may provide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Touch,
    LeftStick,
    RightStick,
    AuxButtons,
    InterfaceButtons,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Capability::Touch,
        Capability::LeftStick,
        Capability::RightStick,
        Capability::AuxButtons,
        Capability::InterfaceButtons,
    ];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Capability::Touch => "touch input",
            Capability::LeftStick => "a left stick",
            Capability::RightStick => "a right stick",
            Capability::AuxButtons => "ZL/ZR buttons",
            Capability::InterfaceButtons => "Home/Power buttons",
        })
    }
}

pub type SharedBackend = Arc<dyn OutputBackend>;

pub trait OutputBackend: Send + Sync {
    /// Short human-readable name used in messages.
    fn name(&self) -> &'static str;

    fn is_connected(&self) -> bool;

    /// Replace the held primary buttons and send the new state.
    fn set_buttons(&self, buttons: &[Button]) -> Result<(), BackendError>;

    /// Release everything, centre the sticks and send.
    fn reset_neutral(&self) -> Result<(), BackendError>;

    fn supports(&self, _cap: Capability) -> bool {
        false
    }

    /// Press the touch screen at a pixel position, hold for `down`, release
    /// and let the console settle for `settle`.  Both waits end early once
    /// `cancel` fires; the touch is always released.
    fn tap_touch(
        &self,
        _x: i64,
        _y: i64,
        _down: Duration,
        _settle: Duration,
        _cancel: &CancelToken,
    ) -> Result<(), BackendError> {
        Err(unsupported(self.name(), "tap_touch"))
    }

    fn set_left_stick(&self, _x: f64, _y: f64) -> Result<(), BackendError> {
        Err(unsupported(self.name(), "set_left_stick"))
    }

    fn set_right_stick(&self, _x: f64, _y: f64) -> Result<(), BackendError> {
        Err(unsupported(self.name(), "set_right_stick"))
    }

    fn set_aux_buttons(&self, _buttons: &[AuxButton]) -> Result<(), BackendError> {
        Err(unsupported(self.name(), "set_aux_buttons"))
    }

    fn set_interface_buttons(&self, _buttons: &[InterfaceButton]) -> Result<(), BackendError> {
        Err(unsupported(self.name(), "set_interface_buttons"))
    }

    /// Close the transport.  Further calls fail with `NotConnected`.
    fn disconnect(&self) -> Result<(), BackendError> {
        Ok(())
    }
}

fn unsupported(backend: &'static str, op: &'static str) -> BackendError {
    BackendError::Unsupported { op, backend }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    struct PadOnly;

    impl OutputBackend for PadOnly {
        fn name(&self) -> &'static str {
            "pad"
        }
        fn is_connected(&self) -> bool {
            true
        }
        fn set_buttons(&self, _: &[Button]) -> Result<(), BackendError> {
            Ok(())
        }
        fn reset_neutral(&self) -> Result<(), BackendError> {
            Ok(())
        }
    }

    #[test]
    fn optional_methods_report_unsupported() {
        let b = PadOnly;
        assert!(!b.supports(Capability::Touch));
        let err = b.set_left_stick(0.5, 0.0).unwrap_err();
        assert_eq!(err.to_string(), "set_left_stick is not supported by the pad backend");
        assert!(matches!(
            b.tap_touch(1, 1, Duration::ZERO, Duration::ZERO, &CancelToken::new()),
            Err(BackendError::Unsupported { op: "tap_touch", .. })
        ));
    }
}
