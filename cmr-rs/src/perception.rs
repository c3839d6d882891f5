//! Captured frames, colour distance and the OCR seam.
//!
//! The engine never captures video itself.  A host hands it a
//! [`FrameProvider`] that returns the most recent frame (or nothing), and
//! optionally an [`OcrProvider`] for `read_text`.

use std::sync::{Arc, Mutex};

pub type Rgb = [u8; 3];

/// An RGB frame, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub width: usize,
    pub height: usize,
    pub pixels: Vec<Rgb>,
}

/// A rectangle in frame coordinates.  May extend past the frame; users
/// clamp it with [`Frame::clamp`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Region {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl Frame {
    /// A frame filled with one colour.
    pub fn filled(width: usize, height: usize, colour: Rgb) -> Self {
        Self {
            width,
            height,
            pixels: vec![colour; width * height],
        }
    }

    pub fn from_pixels(width: usize, height: usize, pixels: Vec<Rgb>) -> Option<Self> {
        (pixels.len() == width * height).then_some(Self {
            width,
            height,
            pixels,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Pixel at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: i64, y: i64) -> Option<Rgb> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        self.pixels.get(y * self.width + x).copied()
    }

    pub fn put(&mut self, x: usize, y: usize, colour: Rgb) {
        if x < self.width && y < self.height {
            self.pixels[y * self.width + x] = colour;
        }
    }

    /// Clamp a region to the frame.  The origin is pulled inside and the
    /// result always covers at least one pixel, so any region on a
    /// non-empty frame yields `Some`.  Returns `(x0, y0, x1, y1)` with
    /// exclusive ends.
    pub fn clamp(&self, r: Region) -> Option<(usize, usize, usize, usize)> {
        if self.is_empty() {
            return None;
        }
        let (w, h) = (self.width as i64, self.height as i64);
        let x0 = r.x.clamp(0, w - 1);
        let y0 = r.y.clamp(0, h - 1);
        let x1 = r.x.saturating_add(r.width).min(w).max(x0 + 1);
        let y1 = r.y.saturating_add(r.height).min(h).max(y0 + 1);
        Some((x0 as usize, y0 as usize, x1 as usize, y1 as usize))
    }

    /// Mean colour of the clamped region, each channel truncated.
    pub fn region_mean(&self, r: Region) -> Option<Rgb> {
        let (x0, y0, x1, y1) = self.clamp(r)?;
        let mut sum = [0u64; 3];
        for y in y0..y1 {
            let row = &self.pixels[y * self.width..(y + 1) * self.width];
            for px in &row[x0..x1] {
                for c in 0..3 {
                    sum[c] += u64::from(px[c]);
                }
            }
        }
        let n = ((x1 - x0) * (y1 - y0)) as u64;
        Some(sum.map(|s| (s / n) as u8))
    }

    /// Copy of the clamped region as its own frame.
    pub fn crop(&self, r: Region) -> Option<Frame> {
        let (x0, y0, x1, y1) = self.clamp(r)?;
        let pixels = (y0..y1)
            .flat_map(|y| self.pixels[y * self.width + x0..y * self.width + x1].iter().copied())
            .collect();
        Some(Frame {
            width: x1 - x0,
            height: y1 - y0,
            pixels,
        })
    }
}

// ── Colour distance ───────────────────────────────────────────────────────────

fn linearize(c: u8) -> f64 {
    let c = f64::from(c) / 255.0;
    if c > 0.04045 {
        ((c + 0.055) / 1.055).powf(2.4)
    } else {
        c / 12.92
    }
}

fn lab_f(t: f64) -> f64 {
    const DELTA: f64 = 6.0 / 29.0;
    if t > DELTA * DELTA * DELTA {
        t.cbrt()
    } else {
        t / (3.0 * DELTA * DELTA) + 4.0 / 29.0
    }
}

/// sRGB → CIELAB under a D65 white point.
pub fn rgb_to_lab(rgb: Rgb) -> [f64; 3] {
    let [r, g, b] = rgb.map(linearize);
    let x = r * 0.4124564 + g * 0.3575761 + b * 0.1804375;
    let y = r * 0.2126729 + g * 0.7151522 + b * 0.0721750;
    let z = r * 0.0193339 + g * 0.1191920 + b * 0.9503041;

    let fx = lab_f(x / 0.95047);
    let fy = lab_f(y);
    let fz = lab_f(z / 1.08883);
    [116.0 * fy - 16.0, 500.0 * (fx - fy), 200.0 * (fy - fz)]
}

/// CIE76 ΔE: Euclidean distance in Lab.  Below ~2 is hard to see; 100 is
/// roughly black against white.
pub fn delta_e76(a: Rgb, b: Rgb) -> f64 {
    let (la, lb) = (rgb_to_lab(a), rgb_to_lab(b));
    la.iter()
        .zip(lb.iter())
        .map(|(p, q)| (p - q) * (p - q))
        .sum::<f64>()
        .sqrt()
}

// ── Providers ─────────────────────────────────────────────────────────────────

/// Source of the most recent captured frame.  Must not block.
pub trait FrameProvider: Send + Sync {
    fn get_frame(&self) -> Option<Arc<Frame>>;
}

/// Provider for hosts without a capture device.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFrames;

impl FrameProvider for NoFrames {
    fn get_frame(&self) -> Option<Arc<Frame>> {
        None
    }
}

/// A slot the capture side overwrites and the engine reads.
#[derive(Debug, Default)]
pub struct SharedFrame {
    slot: Mutex<Option<Arc<Frame>>>,
}

impl SharedFrame {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, frame: Frame) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = Some(Arc::new(frame));
        }
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.slot.lock() {
            *slot = None;
        }
    }
}

impl FrameProvider for SharedFrame {
    fn get_frame(&self) -> Option<Arc<Frame>> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Preprocessing and recognition options for `read_text`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrOptions {
    /// Upscale factor applied before recognition.
    pub scale: u32,
    /// Binary threshold; 0 picks one automatically.
    pub threshold: u8,
    /// Light text on a dark background.
    pub invert: bool,
    /// Page segmentation mode (7 = single line, 6 = block).
    pub psm: u32,
    /// Restrict recognition to these characters; empty allows all.
    pub whitelist: String,
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            scale: 4,
            threshold: 0,
            invert: false,
            psm: 7,
            whitelist: String::new(),
        }
    }
}

impl OcrOptions {
    pub fn is_numeric(&self) -> bool {
        self.whitelist == "0123456789"
    }
}

/// Text recognition over a frame region.  `Err` carries a message for the
/// run-error observer (missing engine, recognition failure).
pub trait OcrProvider: Send + Sync {
    fn ocr_region(&self, frame: &Frame, region: Region, options: &OcrOptions)
        -> Result<String, String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoOcr;

impl OcrProvider for NoOcr {
    fn ocr_region(&self, _: &Frame, _: Region, _: &OcrOptions) -> Result<String, String> {
        Err("no OCR engine is configured".to_owned())
    }
}

/// Map glyphs commonly misread in digit-only text back to digits.
pub fn fix_numeric_confusions(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            'O' => '0',
            'I' | 'l' | '[' | ']' => '1',
            'S' => '5',
            'Z' => '2',
            'B' => '8',
            c => c,
        })
        .collect()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
