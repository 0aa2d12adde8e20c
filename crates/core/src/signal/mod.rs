//! Per-axis smoothing of raw accelerometer readings.

use serde::{Deserialize, Serialize};

use crate::config::FilterConfig;

/// One three-axis acceleration sample, raw or conditioned.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotionReading {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl MotionReading {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &MotionReading) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Exponential low-pass filter: `y = alpha * x + (1 - alpha) * y_prev`.
///
/// The previous output starts at zero, so the first readings of a session
/// ramp up from rest.
#[derive(Debug, Clone)]
pub struct LowPassFilter {
    alpha: f32,
    previous: f32,
}

impl LowPassFilter {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha,
            previous: 0.0,
        }
    }

    pub fn filter(&mut self, value: f32) -> f32 {
        self.previous = self.alpha * value + (1.0 - self.alpha) * self.previous;
        self.previous
    }
}

/// Independent filters for the x, y and z axes.
///
/// Create a fresh conditioner for every connection session; state carried
/// over from a previous stream would bleed into the first readings.
#[derive(Debug, Clone)]
pub struct SignalConditioner {
    x: LowPassFilter,
    y: LowPassFilter,
    z: LowPassFilter,
}

impl SignalConditioner {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            x: LowPassFilter::new(config.alpha),
            y: LowPassFilter::new(config.alpha),
            z: LowPassFilter::new(config.alpha),
        }
    }

    pub fn condition(&mut self, raw: MotionReading) -> MotionReading {
        MotionReading {
            x: self.x.filter(raw.x),
            y: self.y.filter(raw.y),
            z: self.z.filter(raw.z),
        }
    }
}
