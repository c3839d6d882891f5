//! Perception commands.  They read the latest frame and store a result;
//! a missing frame yields `false` or `""`, never an error.

use serde_json::Value;

use super::Exec;
use crate::error::RunError;
use crate::perception::{delta_e76, fix_numeric_confusions, Frame, OcrOptions, Region, Rgb};
use crate::script::command::{
    ColorPoll, FindAreaColor, FindColor, ReadText, WaitForColor, WaitForColorArea,
};
use crate::script::context::ExecutionContext;
use crate::timing::interruptible_sleep;

const DEFAULT_TOL: f64 = 10.0;

/// Where a colour is sampled.
#[derive(Debug, Clone, Copy)]
enum Probe {
    Pixel(i64, i64),
    Area(Region),
}

impl Probe {
    fn sample(self, frame: &Frame) -> Option<Rgb> {
        match self {
            Probe::Pixel(x, y) => frame.pixel(x, y),
            Probe::Area(r) => frame.region_mean(r),
        }
    }
}

fn region(
    ctx: &ExecutionContext<'_>,
    x: &Value,
    y: &Value,
    w: &Value,
    h: &Value,
) -> Result<Region, RunError> {
    Ok(Region::new(ctx.int(x)?, ctx.int(y)?, ctx.int(w)?, ctx.int(h)?))
}

/// Whether the latest frame matches `target` at `probe`; `None` when there
/// is no frame or the probe falls outside it.
fn probe_matches(ctx: &ExecutionContext<'_>, probe: Probe, target: Rgb, tol: f64) -> Option<bool> {
    let frame = ctx.services.frames.get_frame()?;
    let sample = probe.sample(&frame)?;
    Some(delta_e76(sample, target) <= tol)
}

fn find(
    ctx: &mut ExecutionContext<'_>,
    probe: Probe,
    rgb: &Value,
    tol: &Option<Value>,
    out: &str,
) -> Result<(), RunError> {
    let target = ctx.rgb(rgb)?;
    let tol = ctx.number_or(tol, DEFAULT_TOL)?;
    let found = probe_matches(ctx, probe, target, tol).unwrap_or(false);
    ctx.vars.set(out, found);
    Ok(())
}

/// Poll until the match state equals `poll.wait_for`.  Stores `true` on
/// success and `false` on timeout or cancellation.
fn wait_for(
    ctx: &mut ExecutionContext<'_>,
    probe: Probe,
    rgb: &Value,
    poll: &ColorPoll,
) -> Result<(), RunError> {
    let target = ctx.rgb(rgb)?;
    let tol = ctx.number_or(&poll.tol, DEFAULT_TOL)?;
    let interval = ctx.seconds_or(&poll.interval, 0.1)?;
    let timeout = ctx.seconds_or(&poll.timeout, 0.0)?;
    let out = poll.out.as_deref().unwrap_or("match");
    let start = std::time::Instant::now();

    let reached = loop {
        if ctx.is_cancelled() {
            break false;
        }
        if probe_matches(ctx, probe, target, tol) == Some(poll.wait_for) {
            break true;
        }
        if !timeout.is_zero() && start.elapsed() >= timeout {
            break false;
        }
        if interruptible_sleep(interval, ctx.cancel) {
            break false;
        }
    };
    ctx.vars.set(out, reached);
    Ok(())
}

impl Exec for FindColor {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let probe = Probe::Pixel(ctx.int(&self.x)?, ctx.int(&self.y)?);
        find(ctx, probe, &self.rgb, &self.tol, &self.out)
    }
}

impl Exec for FindAreaColor {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let probe = Probe::Area(region(ctx, &self.x, &self.y, &self.width, &self.height)?);
        find(ctx, probe, &self.rgb, &self.tol, &self.out)
    }
}

impl Exec for WaitForColor {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let probe = Probe::Pixel(ctx.int(&self.x)?, ctx.int(&self.y)?);
        wait_for(ctx, probe, &self.rgb, &self.poll)
    }
}

impl Exec for WaitForColorArea {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let probe = Probe::Area(region(ctx, &self.x, &self.y, &self.width, &self.height)?);
        wait_for(ctx, probe, &self.rgb, &self.poll)
    }
}

impl Exec for ReadText {
    fn exec(&self, ctx: &mut ExecutionContext<'_>) -> Result<(), RunError> {
        let Some(frame) = ctx.services.frames.get_frame() else {
            ctx.vars.set(self.out.as_str(), "");
            return Ok(());
        };
        let area = region(ctx, &self.x, &self.y, &self.width, &self.height)?;
        let options = OcrOptions {
            scale: ctx.int_or(&self.scale, 4)?.clamp(1, 16) as u32,
            threshold: ctx.int_or(&self.threshold, 0)?.clamp(0, 255) as u8,
            invert: self.invert,
            psm: ctx.int_or(&self.psm, 7)?.clamp(0, 13) as u32,
            whitelist: self.whitelist.clone(),
        };
        let raw = ctx
            .services
            .ocr
            .ocr_region(&frame, area, &options)
            .map_err(RunError::Ocr)?;
        let text = raw.trim();
        let text = if options.is_numeric() {
            fix_numeric_confusions(text)
        } else {
            text.to_owned()
        };
        ctx.vars.set(self.out.as_str(), text);
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::super::test_support::Rig;
    use super::*;
    use crate::perception::{OcrProvider, SharedFrame};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    fn rig_with_frame(script: Value, frame: Option<Frame>) -> (Rig, Arc<SharedFrame>) {
        let mut rig = Rig::new(script);
        let slot = Arc::new(SharedFrame::new());
        if let Some(f) = frame {
            slot.set(f);
        }
        rig.services.frames = slot.clone();
        (rig, slot)
    }

    fn red_square() -> Frame {
        let mut f = Frame::filled(8, 8, [0, 0, 0]);
        for y in 2..4 {
            for x in 2..4 {
                f.put(x, y, [255, 0, 0]);
            }
        }
        f
    }

    #[test]
    fn find_color_matches_pixel() {
        let (rig, _) = rig_with_frame(
            json!([
                {"cmd": "find_color", "x": 2, "y": 2, "rgb": [250, 5, 0], "out": "hit"},
                {"cmd": "find_color", "x": 0, "y": 0, "rgb": [255, 0, 0], "out": "miss"},
                {"cmd": "find_color", "x": 99, "y": 0, "rgb": [0, 0, 0], "out": "outside"},
            ]),
            Some(red_square()),
        );
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert_eq!(ctx.vars.get("hit"), Some(&json!(true)));
        assert_eq!(ctx.vars.get("miss"), Some(&json!(false)));
        assert_eq!(ctx.vars.get("outside"), Some(&json!(false)));
    }

    #[test]
    fn no_frame_means_false_and_empty_text() {
        let (rig, _) = rig_with_frame(
            json!([
                {"cmd": "find_color", "x": 0, "y": 0, "rgb": [0, 0, 0], "out": "m"},
                {"cmd": "read_text", "x": 0, "y": 0, "width": 5, "height": 5, "out": "t"},
            ]),
            None,
        );
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert_eq!(ctx.vars.get("m"), Some(&json!(false)));
        assert_eq!(ctx.vars.get("t"), Some(&json!("")));
    }

    #[test]
    fn area_mean_is_compared() {
        let (rig, _) = rig_with_frame(
            json!([
                {"cmd": "find_area_color", "x": 2, "y": 2, "width": 2, "height": 2,
                 "rgb": [255, 0, 0], "out": "inside"},
                {"cmd": "find_area_color", "x": 0, "y": 0, "width": 8, "height": 8,
                 "rgb": [255, 0, 0], "out": "whole", "tol": 5},
            ]),
            Some(red_square()),
        );
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert_eq!(ctx.vars.get("inside"), Some(&json!(true)));
        assert_eq!(ctx.vars.get("whole"), Some(&json!(false)));
    }

    #[test]
    fn wait_for_color_sees_a_change() {
        let (rig, slot) = rig_with_frame(
            json!([{"cmd": "wait_for_color", "x": 0, "y": 0, "rgb": [0, 255, 0],
                    "interval": 0.005, "timeout": 2, "out": "seen"}]),
            Some(Frame::filled(2, 2, [0, 0, 0])),
        );
        let mut ctx = rig.ctx();
        std::thread::scope(|s| {
            s.spawn(|| {
                std::thread::sleep(Duration::from_millis(30));
                slot.set(Frame::filled(2, 2, [0, 255, 0]));
            });
            rig.exec(&mut ctx, 0).unwrap();
        });
        assert_eq!(ctx.vars.get("seen"), Some(&json!(true)));
    }

    #[test]
    fn wait_for_absence_and_timeout() {
        let (rig, _) = rig_with_frame(
            json!([
                {"cmd": "wait_for_color_area", "x": 0, "y": 0, "width": 2, "height": 2,
                 "rgb": [0, 0, 0], "wait_for": false, "interval": 0.005, "timeout": 0.05},
                {"cmd": "wait_for_color", "x": 0, "y": 0, "rgb": [255, 255, 255],
                 "wait_for": false, "out": "gone"},
            ]),
            Some(Frame::filled(2, 2, [0, 0, 0])),
        );
        let mut ctx = rig.ctx();
        let t0 = Instant::now();
        rig.exec(&mut ctx, 0).unwrap();
        assert!(t0.elapsed() >= Duration::from_millis(50));
        assert_eq!(ctx.vars.get("match"), Some(&json!(false)));
        rig.exec(&mut ctx, 1).unwrap();
        assert_eq!(ctx.vars.get("gone"), Some(&json!(true)));
    }

    #[test]
    fn cancelled_wait_stores_false() {
        let (rig, _) = rig_with_frame(
            json!([{"cmd": "wait_for_color", "x": 0, "y": 0, "rgb": [9, 9, 9]}]),
            None,
        );
        rig.cancel.cancel();
        let mut ctx = rig.ctx();
        rig.exec(&mut ctx, 0).unwrap();
        assert_eq!(ctx.vars.get("match"), Some(&json!(false)));
    }

    struct Canned(&'static str);

    impl OcrProvider for Canned {
        fn ocr_region(&self, _: &Frame, _: Region, o: &OcrOptions) -> Result<String, String> {
            assert_eq!(o.psm, 7);
            Ok(self.0.to_owned())
        }
    }

    #[test]
    fn read_text_uses_provider() {
        let (mut rig, _) = rig_with_frame(
            json!([
                {"cmd": "read_text", "x": 0, "y": 0, "width": 4, "height": 4, "out": "t"},
                {"cmd": "read_text", "x": 0, "y": 0, "width": 4, "height": 4, "out": "n",
                 "whitelist": "0123456789"},
            ]),
            Some(Frame::filled(4, 4, [0, 0, 0])),
        );
        rig.services.ocr = Arc::new(Canned(" 1O5 \n"));
        let mut ctx = rig.ctx();
        rig.run(&mut ctx).unwrap();
        assert_eq!(ctx.vars.get("t"), Some(&json!("1O5")));
        assert_eq!(ctx.vars.get("n"), Some(&json!("105")));
    }

    #[test]
    fn missing_ocr_engine_is_an_error() {
        let (rig, _) = rig_with_frame(
            json!([{"cmd": "read_text", "x": 0, "y": 0, "width": 4, "height": 4, "out": "t"}]),
            Some(Frame::filled(4, 4, [0, 0, 0])),
        );
        let mut ctx = rig.ctx();
        assert!(matches!(rig.exec(&mut ctx, 0), Err(RunError::Ocr(_))));
    }
}
