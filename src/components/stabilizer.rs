// ============================================================================
// STROKE STABILIZER - weighted moving average sampled at a fixed rate
// ============================================================================

use std::time::{Duration, Instant};

use crate::geometry::Rect;

/// Number of recent samples averaged per tick.
pub const SAMPLE_COUNT: usize = 3;

/// Sampling rate of the stabilizer timer.
pub const SAMPLE_RATE_HZ: u64 = 60;

/// Weight of the newest sample; each older one is scaled by [`WEIGHT_DECAY`].
const BASE_WEIGHT: f32 = 100.0;
const WEIGHT_DECAY: f32 = 0.85;

/// Interval between two stabilizer ticks.
pub const fn sample_period() -> Duration {
    Duration::from_nanos(1_000_000_000 / SAMPLE_RATE_HZ)
}

/// One point of the smoothed output path.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PathPoint {
    pub x: f32,
    pub y: f32,
    pub time: Instant,
}

impl PathPoint {
    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }
}

/// Turns raw pointer motion into a smoothed path.
///
/// Pointer input only updates the real position; the path grows on
/// [`Stabilizer::update`], which the host calls at [`SAMPLE_RATE_HZ`]
/// (see [`Stabilizer::advance`]).
#[derive(Clone, Debug)]
pub struct Stabilizer {
    real: (f32, f32),
    stabilized: (f32, f32),
    /// Ring buffer of recent real positions; `head` is the newest.
    samples: [(f32, f32); SAMPLE_COUNT],
    head: usize,
    path: Vec<PathPoint>,
    active: bool,
    /// Time of the last timer tick while active.
    last_tick: Option<Instant>,
}

impl Default for Stabilizer {
    fn default() -> Self {
        Self {
            real: (0.0, 0.0),
            stabilized: (0.0, 0.0),
            samples: [(0.0, 0.0); SAMPLE_COUNT],
            head: 0,
            path: Vec::new(),
            active: false,
            last_tick: None,
        }
    }
}

impl Stabilizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset everything to (`x`, `y`) and start the timer at `now`.
    pub fn start(&mut self, x: f32, y: f32, now: Instant) {
        self.real = (x, y);
        self.stabilized = (x, y);
        self.samples = [(x, y); SAMPLE_COUNT];
        self.head = 0;
        self.path.clear();
        self.path.push(PathPoint { x, y, time: now });
        self.active = true;
        self.last_tick = Some(now);
    }

    /// Record the latest pointer position. Does not touch the path.
    pub fn move_to(&mut self, x: f32, y: f32) {
        if self.active {
            self.real = (x, y);
        }
    }

    /// One timer tick. Returns `true` when a point was appended.
    pub fn update(&mut self, now: Instant) -> bool {
        if !self.active || self.stabilized == self.real {
            return false;
        }

        self.head = (self.head + 1) % SAMPLE_COUNT;
        self.samples[self.head] = self.real;

        if self.samples.iter().all(|s| *s == self.real) {
            // Window holds only the real position: settle exactly on it.
            self.stabilized = self.real;
        } else {
            let (mut dx, mut dy) = (0.0f32, 0.0f32);
            let mut total = 0.0f32;
            let mut weight = BASE_WEIGHT;
            for i in 0..SAMPLE_COUNT {
                let (sx, sy) = self.samples[(self.head + SAMPLE_COUNT - i) % SAMPLE_COUNT];
                dx += (sx - self.stabilized.0) * weight;
                dy += (sy - self.stabilized.1) * weight;
                total += weight;
                weight *= WEIGHT_DECAY;
            }
            self.stabilized.0 += dx / total;
            self.stabilized.1 += dy / total;
        }

        self.path.push(PathPoint { x: self.stabilized.0, y: self.stabilized.1, time: now });
        true
    }

    /// Run every tick due between the last tick and `now`.
    /// Returns how many points were appended.
    pub fn advance(&mut self, now: Instant) -> usize {
        let Some(mut last) = self.last_tick.filter(|_| self.active) else {
            return 0;
        };
        let period = sample_period();
        let mut appended = 0;
        while now.saturating_duration_since(last) >= period {
            last += period;
            if self.update(last) {
                appended += 1;
            }
        }
        self.last_tick = Some(last);
        appended
    }

    /// Stop sampling. The path is final after this returns.
    pub fn finish(&mut self, now: Instant) -> &[PathPoint] {
        if self.active {
            if self.stabilized != self.real {
                let (x, y) = self.real;
                self.stabilized = self.real;
                self.path.push(PathPoint { x, y, time: now });
            } else if let Some(last) = self.path.last_mut() {
                last.time = now;
            }
            self.active = false;
            self.last_tick = None;
        }
        &self.path
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn real_position(&self) -> (f32, f32) {
        self.real
    }

    pub fn stabilized_position(&self) -> (f32, f32) {
        self.stabilized
    }

    pub fn path(&self) -> &[PathPoint] {
        &self.path
    }

    /// Bounding rect of the path grown by half the brush `size`
    /// (plus a pixel of antialiasing), rounded out to whole pixels.
    pub fn bounds(&self, size: f32) -> Rect {
        let Some(first) = self.path.first() else {
            return Rect::EMPTY;
        };
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &self.path[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Rect::from_min_max(min_x, min_y, max_x, max_y)
            .expand(size * 0.5 + 1.0)
            .round_out()
    }
}
