//! Frame timing

use glam::Mat4;

/// Per-frame values handed to the tree walk and to material hooks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameState {
    /// Monotonic frame counter
    pub frame: u64,
    /// Seconds since the clock started
    pub time: f64,
    /// `time` of the previous frame
    pub previous_time: f64,
    /// Camera projection times view
    pub view_projection: Mat4,
    /// The camera changed since the last frame
    pub camera_dirty: bool,
}

impl Default for FrameState {
    fn default() -> Self {
        Self {
            frame: 0,
            time: 0.0,
            previous_time: 0.0,
            view_projection: Mat4::IDENTITY,
            camera_dirty: false,
        }
    }
}

impl FrameState {
    /// Seconds elapsed since the previous frame
    pub fn delta(&self) -> f64 {
        self.time - self.previous_time
    }
}

/// Frame timing snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    pub frame: u64,
    pub time: f64,
    pub previous_time: f64,
}

/// Frame clock producing `FrameTime` snapshots.
///
/// The gap between `previous_time` and `time` is clamped so a long stall
/// (debugger, minimized window) shows up as one bounded step.
#[derive(Debug, Clone)]
pub struct FrameClock {
    origin: f64,
    last: Option<f64>,
    frame_index: u64,
    max_delta: f64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::with_max_delta(0.25)
    }

    pub fn with_max_delta(max_delta: f64) -> Self {
        Self {
            origin: now_seconds(),
            last: None,
            frame_index: 0,
            max_delta,
        }
    }

    /// Resets the clock baseline.
    pub fn reset(&mut self) {
        self.origin = now_seconds();
        self.last = None;
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Advances the clock using the wall clock
    pub fn tick(&mut self) -> FrameTime {
        let now = now_seconds() - self.origin;
        self.tick_at(now)
    }

    /// Advances the clock to `time` seconds; time never runs backwards
    pub fn tick_at(&mut self, time: f64) -> FrameTime {
        let previous = self.last.unwrap_or(time);
        let time = time.max(previous);
        let previous_time = previous.max(time - self.max_delta);

        let frame_time = FrameTime {
            frame: self.frame_index,
            time,
            previous_time,
        };

        self.last = Some(time);
        self.frame_index = self.frame_index.wrapping_add(1);
        frame_time
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn now_seconds() -> f64 {
    use std::sync::OnceLock;
    use std::time::Instant;

    static START: OnceLock<Instant> = OnceLock::new();
    START.get_or_init(Instant::now).elapsed().as_secs_f64()
}

#[cfg(target_arch = "wasm32")]
fn now_seconds() -> f64 {
    js_sys::Date::now() / 1000.0
}
