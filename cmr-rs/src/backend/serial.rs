//! Serial backend for the USB-to-controller bridge microcontroller.
//!
//! Wire format: every state is one three-byte packet
//! `[0x54, high, low]`, one bit per button.  The bridge drops back to
//! neutral when it stops hearing from us, so a keepalive thread resends the
//! last packet every [`SerialOptions::keepalive`] between state changes.
//!
//! The encoding functions are pure and independent of any port; the
//! [`SerialBackend`] adds the transport, locking and keepalive.

use std::io::Write;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::OutputBackend;
use crate::controller::{Button, ControllerState};
use crate::error::BackendError;
use crate::timing::{self, CancelToken};

pub const STATE_HEADER: u8 = 0x54;
pub const CHANNEL_HEADER: u8 = 0x43;
pub const DEFAULT_BAUD: u32 = 1_000_000;

// ── Encoding ──────────────────────────────────────────────────────────────────

/// Position of a button in the packet: `(high, low)` with exactly one bit set.
pub fn button_bits(button: Button) -> (u8, u8) {
    match button {
        Button::L => (0x01, 0),
        Button::R => (0x02, 0),
        Button::X => (0x04, 0),
        Button::Y => (0x08, 0),
        Button::A => (0, 0x01),
        Button::B => (0, 0x02),
        Button::Right => (0, 0x04),
        Button::Left => (0, 0x08),
        Button::Up => (0, 0x10),
        Button::Down => (0, 0x20),
        Button::Select => (0, 0x40),
        Button::Start => (0, 0x80),
    }
}

pub fn buttons_to_bytes<'a>(buttons: impl IntoIterator<Item = &'a Button>) -> (u8, u8) {
    buttons.into_iter().fold((0, 0), |(high, low), &b| {
        let (h, l) = button_bits(b);
        (high | h, low | l)
    })
}

/// Decode the two button bytes back into names, in [`Button::ALL`] order.
pub fn bytes_to_buttons(high: u8, low: u8) -> Vec<Button> {
    Button::ALL
        .into_iter()
        .filter(|&b| {
            let (h, l) = button_bits(b);
            high & h != 0 || low & l != 0
        })
        .collect()
}

pub fn encode_state(state: &ControllerState) -> [u8; 3] {
    let (high, low) = buttons_to_bytes(&state.buttons);
    [STATE_HEADER, high, low]
}

/// One-off packet that moves the receiver to another radio channel.
pub fn encode_channel_set(channel: u8) -> [u8; 3] {
    [CHANNEL_HEADER, channel, 0x00]
}

// ── Backend ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SerialOptions {
    pub keepalive: Duration,
    /// Neutral hold after connecting, so the receiver can pair.
    pub warmup: Duration,
}

impl Default for SerialOptions {
    fn default() -> Self {
        Self {
            keepalive: Duration::from_millis(50),
            warmup: Duration::from_secs(1),
        }
    }
}

pub type Transport = Box<dyn Write + Send>;

struct Link {
    port: Option<Transport>,
    state: ControllerState,
}

impl Link {
    fn write(&mut self, packet: &[u8]) -> std::io::Result<()> {
        match self.port.as_mut() {
            Some(port) => {
                port.write_all(packet)?;
                port.flush()
            }
            None => Err(std::io::ErrorKind::NotConnected.into()),
        }
    }
}

pub struct SerialBackend {
    link: Arc<Mutex<Link>>,
    stop: CancelToken,
    keepalive: Mutex<Option<JoinHandle<()>>>,
}

impl SerialBackend {
    /// Open a serial port and run the connect sequence.
    pub fn open(path: &str, baud: u32, options: SerialOptions) -> Result<Self, BackendError> {
        let mut port = serialport::new(path, baud)
            .timeout(Duration::from_secs(1))
            .open()?;
        port.write_data_terminal_ready(false)?;
        port.write_request_to_send(false)?;
        info!(port = path, baud, "serial port opened");
        Self::with_transport(Box::new(port), options)
    }

    /// Run the connect sequence over an already opened transport: start the
    /// keepalive, send neutral and hold it for the warm-up period.
    pub fn with_transport(transport: Transport, options: SerialOptions) -> Result<Self, BackendError> {
        let link = Arc::new(Mutex::new(Link {
            port: Some(transport),
            state: ControllerState::new(),
        }));
        let stop = CancelToken::new();
        let handle = {
            let link = Arc::clone(&link);
            let stop = stop.clone();
            std::thread::Builder::new()
                .name("serial-keepalive".into())
                .spawn(move || keepalive_loop(link, stop, options.keepalive))?
        };
        let backend = Self {
            link,
            stop,
            keepalive: Mutex::new(Some(handle)),
        };
        info!("sending neutral state for receiver pairing");
        backend.send_with(ControllerState::reset_neutral)?;
        timing::sleep(options.warmup);
        info!("serial backend ready");
        Ok(backend)
    }

    /// Ask the receiver to switch radio channel.  Takes effect after the
    /// receiver is power cycled.
    pub fn send_channel_set(&self, channel: u8) -> Result<(), BackendError> {
        lock(&self.link).write(&encode_channel_set(channel))?;
        info!("Sent channel set: 0x{channel:02X} (power cycle receiver required)");
        Ok(())
    }

    /// Update the state and write it.  Write failures are logged and left
    /// to the keepalive to retry.
    fn send_with(&self, f: impl FnOnce(&mut ControllerState)) -> Result<(), BackendError> {
        let mut link = lock(&self.link);
        if link.port.is_none() {
            return Err(BackendError::NotConnected);
        }
        f(&mut link.state);
        let packet = encode_state(&link.state);
        debug!(?packet, "serial send");
        if let Err(e) = link.write(&packet) {
            warn!("Serial write error: {e}");
        }
        Ok(())
    }
}

fn lock(link: &Mutex<Link>) -> MutexGuard<'_, Link> {
    link.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn keepalive_loop(link: Arc<Mutex<Link>>, stop: CancelToken, interval: Duration) {
    while !timing::interruptible_sleep(interval, &stop) {
        let mut link = lock(&link);
        if link.port.is_none() {
            break;
        }
        let packet = encode_state(&link.state);
        if let Err(e) = link.write(&packet) {
            warn!("Serial write error: {e}; keepalive stopped");
            break;
        }
    }
    debug!("keepalive thread exiting");
}

impl OutputBackend for SerialBackend {
    fn name(&self) -> &'static str {
        "serial"
    }

    fn is_connected(&self) -> bool {
        lock(&self.link).port.is_some()
    }

    fn set_buttons(&self, buttons: &[Button]) -> Result<(), BackendError> {
        self.send_with(|s| s.set_buttons(buttons))
    }

    fn reset_neutral(&self) -> Result<(), BackendError> {
        self.send_with(ControllerState::reset_neutral)
    }

    fn disconnect(&self) -> Result<(), BackendError> {
        self.stop.cancel();
        let handle = self
            .keepalive
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("keepalive thread panicked");
            }
        }
        if lock(&self.link).port.take().is_some() {
            info!("serial port closed");
        }
        Ok(())
    }
}

impl Drop for SerialBackend {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn packets(&self) -> Vec<[u8; 3]> {
            self.0
                .lock()
                .unwrap()
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect()
        }
    }

    fn quiet() -> SerialOptions {
        SerialOptions {
            keepalive: Duration::from_secs(60),
            warmup: Duration::ZERO,
        }
    }

    #[test]
    fn bit_table_is_one_hot() {
        let mut seen_high = 0u8;
        let mut seen_low = 0u8;
        for b in Button::ALL {
            let (h, l) = button_bits(b);
            assert_eq!((h.count_ones() + l.count_ones()), 1, "{b}");
            assert_eq!(seen_high & h, 0);
            assert_eq!(seen_low & l, 0);
            seen_high |= h;
            seen_low |= l;
        }
        assert_eq!(seen_high, 0x0F);
        assert_eq!(seen_low, 0xFF);
    }

    #[test]
    fn a_and_up_round_trip() {
        let (high, low) = buttons_to_bytes(&[Button::A, Button::Up]);
        assert_eq!((high, low), (0x00, 0x11));
        assert_eq!(bytes_to_buttons(high, low), vec![Button::A, Button::Up]);
    }

    #[test]
    fn state_packet_layout() {
        let mut s = ControllerState::new();
        s.set_buttons(&[Button::L, Button::Start]);
        assert_eq!(encode_state(&s), [0x54, 0x01, 0x80]);
        assert_eq!(encode_channel_set(0x2A), [0x43, 0x2A, 0x00]);
    }

    #[test]
    fn connect_sends_neutral_first() {
        let buf = SharedBuf::default();
        let backend = SerialBackend::with_transport(Box::new(buf.clone()), quiet()).unwrap();
        backend.set_buttons(&[Button::B]).unwrap();
        backend.reset_neutral().unwrap();
        assert_eq!(
            buf.packets(),
            vec![[0x54, 0, 0], [0x54, 0, 0x02], [0x54, 0, 0]]
        );
    }

    #[test]
    fn keepalive_resends_last_state() {
        let buf = SharedBuf::default();
        let options = SerialOptions {
            keepalive: Duration::from_millis(5),
            warmup: Duration::ZERO,
        };
        let backend = SerialBackend::with_transport(Box::new(buf.clone()), options).unwrap();
        backend.set_buttons(&[Button::X]).unwrap();
        std::thread::sleep(Duration::from_millis(60));
        backend.disconnect().unwrap();
        let packets = buf.packets();
        let repeats = packets.iter().filter(|p| **p == [0x54, 0x04, 0]).count();
        assert!(repeats >= 3, "only {repeats} keepalive packets");
    }

    #[test]
    fn disconnect_closes() {
        let buf = SharedBuf::default();
        let backend = SerialBackend::with_transport(Box::new(buf), quiet()).unwrap();
        assert!(backend.is_connected());
        backend.disconnect().unwrap();
        assert!(!backend.is_connected());
        assert!(matches!(backend.set_buttons(&[]), Err(BackendError::NotConnected)));
    }

    #[test]
    fn channel_set_is_not_a_state() {
        let buf = SharedBuf::default();
        let backend = SerialBackend::with_transport(Box::new(buf.clone()), quiet()).unwrap();
        backend.send_channel_set(3).unwrap();
        assert_eq!(buf.packets().last(), Some(&[0x43, 3, 0]));
    }
}
