//! Precision sleeping and cooperative cancellation.
//!
//! OS sleeps are only accurate to a millisecond or two, so every wait here
//! is split in two phases: short relaxing sleeps for the bulk of the
//! duration, then a busy-wait on the monotonic clock for the final
//! [`BUSY_WAIT_WINDOW`].  The cancellable variants poll a [`CancelToken`]
//! at every chunk boundary and inside the busy-wait.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Remaining time below which we stop sleeping and spin.
pub const BUSY_WAIT_WINDOW: Duration = Duration::from_millis(2);

/// Upper bound on a single relaxing sleep.
const MAX_CHUNK: Duration = Duration::from_millis(1);

/// Step used by [`sleep_until`] while far away from the deadline.
const COARSE_STEP: Duration = Duration::from_millis(100);

/// Longest single wait; longer requests are clamped to it.
pub const MAX_WAIT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

// ── CancelToken ───────────────────────────────────────────────────────────────

/// A shared stop flag.  Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── Deadlines ──────────────────────────────────────────────────────────────────

/// `from + duration`, with `duration` clamped to [`MAX_WAIT`] so the sum
/// cannot overflow the clock.
pub fn deadline_after(from: Instant, duration: Duration) -> Instant {
    let duration = duration.min(MAX_WAIT);
    from.checked_add(duration).unwrap_or(from)
}

// ── Sleeping ──────────────────────────────────────────────────────────────────

/// Sleep for `duration` with sub-millisecond accuracy.
pub fn sleep(duration: Duration) {
    if duration.is_zero() {
        return;
    }
    let end = deadline_after(Instant::now(), duration);
    relax_until(end, None);
    spin_until(end, None);
}

/// Sleep for `duration` unless `token` is cancelled first.
///
/// Returns `true` when the sleep was interrupted and `false` when the full
/// duration elapsed.  A zero duration returns `false` without checking the
/// token.
pub fn interruptible_sleep(duration: Duration, token: &CancelToken) -> bool {
    if duration.is_zero() {
        return false;
    }
    if token.is_cancelled() {
        return true;
    }
    let end = deadline_after(Instant::now(), duration);
    relax_until(end, Some(token)) || spin_until(end, Some(token))
}

/// Sleep until `deadline`, using coarse 100ms steps while far from it.
///
/// The coarse phase ends once less than a threshold remains; the threshold
/// grows with the total wait (100ms below one second, 500ms up to ten
/// seconds, one second beyond) so long waits stay cheap and short waits
/// stay precise.  Returns `true` if interrupted.
pub fn sleep_until(deadline: Instant, token: &CancelToken) -> bool {
    let now = Instant::now();
    if deadline <= now {
        return false;
    }
    let threshold = coarse_threshold(deadline - now);
    loop {
        if token.is_cancelled() {
            return true;
        }
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining <= threshold {
            break;
        }
        std::thread::sleep(COARSE_STEP.min(remaining - threshold));
    }
    interruptible_sleep(deadline.saturating_duration_since(Instant::now()), token)
}

fn coarse_threshold(total: Duration) -> Duration {
    if total < Duration::from_secs(1) {
        Duration::from_millis(100)
    } else if total <= Duration::from_secs(10) {
        Duration::from_millis(500)
    } else {
        Duration::from_secs(1)
    }
}

/// Relaxing phase: sleep in halving chunks until the busy-wait window.
fn relax_until(end: Instant, token: Option<&CancelToken>) -> bool {
    loop {
        if token.is_some_and(CancelToken::is_cancelled) {
            return true;
        }
        let remaining = end.saturating_duration_since(Instant::now());
        if remaining <= BUSY_WAIT_WINDOW {
            return false;
        }
        std::thread::sleep((remaining / 2).min(MAX_CHUNK));
    }
}

fn spin_until(end: Instant, token: Option<&CancelToken>) -> bool {
    while Instant::now() < end {
        if token.is_some_and(CancelToken::is_cancelled) {
            return true;
        }
        std::hint::spin_loop();
    }
    false
}

// ── Tests ─────────────────────────────────────────────────────────────────────
