//! Input-redirection backend: controller state as UDP datagrams.
//!
//! Each state change sends one 20-byte datagram made of five little-endian
//! `u32` fields:
//!
//! | # | field | neutral |
//! |---|-------|---------|
//! | 1 | pad buttons, bit cleared = pressed | `0x00000FFF` |
//! | 2 | touch screen | `0x02000000` |
//! | 3 | circle pad (left stick) | `0x007FF7FF` |
//! | 4 | C-stick (right stick) + ZL/ZR | `0x80800081` |
//! | 5 | Home/Power buttons | `0x00000000` |
//!
//! Nothing is acknowledged; the next state change overwrites any lost one.

use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{Capability, OutputBackend};
use crate::controller::{
    AuxButton, Button, ControllerState, InterfaceButton, Stick, Touch, TOUCH_HEIGHT, TOUCH_WIDTH,
};
use crate::error::BackendError;
use crate::timing::{self, CancelToken};

pub const DEFAULT_PORT: u16 = 4950;
pub const PACKET_LEN: usize = 20;

pub const PAD_IDLE: u32 = 0xFFF;
pub const TOUCH_NONE: u32 = 0x0200_0000;
pub const CIRCLE_NEUTRAL: u32 = 0x007F_F7FF;
pub const CSTICK_NEUTRAL: u32 = 0x8080_0081;

const CIRCLE_CENTER: f64 = 2048.0;
const CIRCLE_SCALE: f64 = 2048.0;
const CIRCLE_MAX: i64 = 0xFFF;
const CSTICK_CENTER: f64 = 128.0;
const CSTICK_SCALE: f64 = 127.0;
const CSTICK_MAX: i64 = 0xFF;

// ── Field encoders ────────────────────────────────────────────────────────────

pub fn pad_bit(button: Button) -> u32 {
    1 << match button {
        Button::A => 0,
        Button::B => 1,
        Button::Select => 2,
        Button::Start => 3,
        Button::Right => 4,
        Button::Left => 5,
        Button::Up => 6,
        Button::Down => 7,
        Button::R => 8,
        Button::L => 9,
        Button::X => 10,
        Button::Y => 11,
    }
}

/// Field 1: the idle mask with each held button's bit cleared.
pub fn encode_pad<'a>(buttons: impl IntoIterator<Item = &'a Button>) -> u32 {
    let pressed = buttons.into_iter().fold(0, |m, &b| m | pad_bit(b));
    PAD_IDLE & !pressed
}

/// Field 2: bit 24 marks a touch, then 12-bit Y and X scaled to `0..=0xFFF`.
pub fn encode_touch(touch: Option<Touch>) -> u32 {
    match touch {
        None => TOUCH_NONE,
        Some(t) => {
            let x = 0xFFF * u32::from(t.x) / u32::from(TOUCH_WIDTH);
            let y = 0xFFF * u32::from(t.y) / u32::from(TOUCH_HEIGHT);
            (1 << 24) | (y << 12) | x
        }
    }
}

fn scale_axis(v: f64, center: f64, scale: f64, max: i64) -> u32 {
    let raw = (v * scale + center) as i64;
    let clamped = if raw > max {
        if v < 0.0 {
            0
        } else {
            max
        }
    } else {
        raw.max(0)
    };
    clamped as u32
}

/// Field 3: `(y << 12) | x`, each axis 12 bits centred on `0x800`.
pub fn encode_circle_pad(stick: Stick) -> u32 {
    if stick.is_centered() {
        return CIRCLE_NEUTRAL;
    }
    let x = scale_axis(stick.x, CIRCLE_CENTER, CIRCLE_SCALE, CIRCLE_MAX);
    let y = scale_axis(stick.y, CIRCLE_CENTER, CIRCLE_SCALE, CIRCLE_MAX);
    (y << 12) | x
}

pub fn aux_bit(button: AuxButton) -> u32 {
    match button {
        AuxButton::ZR => 1 << 1,
        AuxButton::ZL => 1 << 2,
    }
}

/// Field 4: the C-stick rotated 45 degrees, each axis 8 bits centred on
/// `0x80`, ZL/ZR in the second byte and `0x81` in the low byte.
pub fn encode_cstick<'a>(stick: Stick, aux: impl IntoIterator<Item = &'a AuxButton>) -> u32 {
    let ir = aux.into_iter().fold(0, |m, &b| m | aux_bit(b));
    if stick.is_centered() && ir == 0 {
        return CSTICK_NEUTRAL;
    }
    let rx = std::f64::consts::FRAC_1_SQRT_2 * (stick.x + stick.y);
    let ry = std::f64::consts::FRAC_1_SQRT_2 * (stick.y - stick.x);
    let x = scale_axis(rx, CSTICK_CENTER, CSTICK_SCALE, CSTICK_MAX);
    let y = scale_axis(ry, CSTICK_CENTER, CSTICK_SCALE, CSTICK_MAX);
    (y << 24) | (x << 16) | (ir << 8) | 0x81
}

pub fn interface_bit(button: InterfaceButton) -> u32 {
    match button {
        InterfaceButton::Home => 1 << 0,
        InterfaceButton::Power => 1 << 1,
        InterfaceButton::PowerLong => 1 << 2,
    }
}

/// Field 5.
pub fn encode_interface<'a>(buttons: impl IntoIterator<Item = &'a InterfaceButton>) -> u32 {
    buttons.into_iter().fold(0, |m, &b| m | interface_bit(b))
}

/// Encode a full datagram.
pub fn encode_packet(state: &ControllerState) -> [u8; PACKET_LEN] {
    let fields = [
        encode_pad(&state.buttons),
        encode_touch(state.touch),
        encode_circle_pad(state.left_stick),
        encode_cstick(state.right_stick, &state.aux),
        encode_interface(&state.interface),
    ];
    let mut out = [0u8; PACKET_LEN];
    for (chunk, field) in out.chunks_exact_mut(4).zip(fields) {
        chunk.copy_from_slice(&field.to_le_bytes());
    }
    out
}

/// Split a datagram back into its five fields.
pub fn decode_fields(packet: &[u8; PACKET_LEN]) -> [u32; 5] {
    let mut fields = [0u32; 5];
    for (field, chunk) in fields.iter_mut().zip(packet.chunks_exact(4)) {
        *field = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
    }
    fields
}

// ── Backend ───────────────────────────────────────────────────────────────────

pub struct UdpBackend {
    socket: UdpSocket,
    target: SocketAddr,
    state: Mutex<ControllerState>,
    connected: AtomicBool,
}

impl UdpBackend {
    pub fn connect(host: &str, port: u16) -> Result<Self, BackendError> {
        let target = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
            std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                format!("cannot resolve {host}"),
            )
        })?;
        let bind = if target.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
        let socket = UdpSocket::bind(bind)?;
        info!(%target, "input redirection target set");
        Ok(Self {
            socket,
            target,
            state: Mutex::new(ControllerState::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }

    pub fn state(&self) -> ControllerState {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn send_with(&self, f: impl FnOnce(&mut ControllerState)) -> Result<(), BackendError> {
        if !self.is_connected() {
            return Err(BackendError::NotConnected);
        }
        let mut state = self.lock();
        f(&mut state);
        self.send_locked(&state);
        Ok(())
    }

    fn send_locked(&self, state: &ControllerState) {
        let packet = encode_packet(state);
        debug!(fields = ?decode_fields(&packet), "udp send");
        if let Err(e) = self.socket.send_to(&packet, self.target) {
            warn!("UDP send error: {e}");
        }
    }
}

impl OutputBackend for UdpBackend {
    fn name(&self) -> &'static str {
        "input-redirection"
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_buttons(&self, buttons: &[Button]) -> Result<(), BackendError> {
        self.send_with(|s| s.set_buttons(buttons))
    }

    fn reset_neutral(&self) -> Result<(), BackendError> {
        self.send_with(ControllerState::reset_neutral)
    }

    fn supports(&self, _cap: Capability) -> bool {
        true
    }

    fn tap_touch(
        &self,
        x: i64,
        y: i64,
        down: Duration,
        settle: Duration,
        cancel: &CancelToken,
    ) -> Result<(), BackendError> {
        self.send_with(|s| s.touch = Some(Touch::clamped(x, y)))?;
        let interrupted = timing::interruptible_sleep(down, cancel);
        self.send_with(|s| s.touch = None)?;
        if !interrupted {
            timing::interruptible_sleep(settle, cancel);
        }
        Ok(())
    }

    fn set_left_stick(&self, x: f64, y: f64) -> Result<(), BackendError> {
        self.send_with(|s| s.left_stick = Stick::new(x, y))
    }

    fn set_right_stick(&self, x: f64, y: f64) -> Result<(), BackendError> {
        self.send_with(|s| s.right_stick = Stick::new(x, y))
    }

    fn set_aux_buttons(&self, buttons: &[AuxButton]) -> Result<(), BackendError> {
        self.send_with(|s| s.set_aux(buttons))
    }

    fn set_interface_buttons(&self, buttons: &[InterfaceButton]) -> Result<(), BackendError> {
        self.send_with(|s| s.set_interface(buttons))
    }

    fn disconnect(&self) -> Result<(), BackendError> {
        if self.connected.swap(false, Ordering::SeqCst) {
            let mut state = self.lock();
            state.reset_neutral();
            self.send_locked(&state);
            info!("input redirection disconnected");
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_packet() {
        let fields = decode_fields(&encode_packet(&ControllerState::new()));
        assert_eq!(fields, [PAD_IDLE, TOUCH_NONE, CIRCLE_NEUTRAL, CSTICK_NEUTRAL, 0]);
    }

    #[test]
    fn pad_bits_clear_when_pressed() {
        assert_eq!(encode_pad(&[Button::A]), 0xFFE);
        assert_eq!(encode_pad(&[Button::Y, Button::Start]), 0xFFF & !(0x800 | 0x8));
    }

    #[test]
    fn circle_pad_full_right() {
        let v = encode_circle_pad(Stick::new(1.0, 0.0));
        assert_eq!(v & 0xFFF, 0xFFF);
        assert_eq!(v >> 12, 0x800);
    }

    #[test]
    fn circle_pad_full_left_and_down() {
        let v = encode_circle_pad(Stick::new(-1.0, -1.0));
        assert_eq!(v, 0);
    }

    #[test]
    fn touch_scaling() {
        assert_eq!(encode_touch(Some(Touch { x: 0, y: 0 })), 1 << 24);
        let v = encode_touch(Some(Touch { x: 160, y: 120 }));
        assert_eq!(v & 0xFFF, 0xFFF * 160 / 320);
        assert_eq!((v >> 12) & 0xFFF, 0xFFF * 120 / 240);
        assert_ne!(v & (1 << 24), 0);
    }

    #[test]
    fn cstick_aux_only() {
        assert_eq!(encode_cstick(Stick::default(), &[AuxButton::ZL]), 0x8080_0481);
        assert_eq!(
            encode_cstick(Stick::default(), &[AuxButton::ZL, AuxButton::ZR]),
            0x8080_0681
        );
    }

    #[test]
    fn cstick_rotation() {
        // Straight up rotates to equal positive components on both axes.
        let v = encode_cstick(Stick::new(0.0, 1.0), &[]);
        let x = (v >> 16) & 0xFF;
        let y = v >> 24;
        let expected = (std::f64::consts::FRAC_1_SQRT_2 * 127.0 + 128.0) as u32;
        assert_eq!(x, expected);
        assert_eq!(y, expected);
        assert_eq!(v & 0xFF, 0x81);
    }

    #[test]
    fn cstick_saturates_by_sign() {
        let v = encode_cstick(Stick::new(1.0, 1.0), &[]);
        assert_eq!((v >> 16) & 0xFF, 0xFF);
        assert_eq!(v >> 24, 0x80);
        let v = encode_cstick(Stick::new(-1.0, -1.0), &[]);
        assert_eq!((v >> 16) & 0xFF, 0);
    }

    #[test]
    fn interface_bits() {
        assert_eq!(
            encode_interface(&[InterfaceButton::Home, InterfaceButton::PowerLong]),
            0b101
        );
    }

    #[test]
    fn sends_datagrams() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let port = receiver.local_addr().unwrap().port();
        let backend = UdpBackend::connect("127.0.0.1", port).unwrap();

        backend.set_buttons(&[Button::B]).unwrap();
        let mut buf = [0u8; PACKET_LEN];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        assert_eq!(n, PACKET_LEN);
        assert_eq!(decode_fields(&buf)[0], 0xFFD);

        backend.disconnect().unwrap();
        receiver.recv_from(&mut buf).unwrap();
        assert_eq!(decode_fields(&buf)[0], PAD_IDLE);
        assert!(backend.set_buttons(&[]).is_err());
    }
}
