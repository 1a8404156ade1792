use std::time::{Duration, Instant};

/// Frame rate shared by the live ticker, the time step and GIF export.
pub const FPS: u32 = 60;

/// Scalar animation time fed to the `uTime` uniform.
///
/// Time is not wall-clock based: every rendered frame advances it by
/// `animation_speed / FPS`, so a paused viewer keeps a stable image.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnimationClock {
    time: f32,
}

impl AnimationClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    /// Returns the clock to zero, as happens when a viewer is (re)initialised.
    pub fn reset(&mut self) {
        self.time = 0.0;
    }

    /// Advances by one frame's worth of animation at `speed`.
    pub fn advance(&mut self, speed: f32) {
        self.time += speed / FPS as f32;
    }

    pub fn set(&mut self, time: f32) {
        self.time = time;
    }
}

/// Fixed-cadence timer for the live loop.
///
/// The ticker never skips ahead to catch up: after a late poll the next
/// deadline is scheduled one period from the poll, not from the missed slot.
#[derive(Debug, Clone)]
pub struct FrameTicker {
    period: Duration,
    next: Instant,
}

impl FrameTicker {
    pub fn new(fps: u32, now: Instant) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(fps.max(1)));
        Self {
            period,
            next: now + period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns true when a tick is due and schedules the following one.
    pub fn poll(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        self.next = now + self.period;
        true
    }

    pub fn next_deadline(&self) -> Instant {
        self.next
    }

    pub fn reset(&mut self, now: Instant) {
        self.next = now + self.period;
    }
}
