//! Per-gesture recognizers.
//!
//! The trainer treats a matcher as an opaque capability; [`TemplateMatcher`]
//! is the implementation bundled with the bridge.

use std::collections::VecDeque;

use crate::{config::MatcherConfig, GestureId, Match, MotionReading};

/// Stateful recognizer bound to one gesture.
pub trait Matcher {
    /// Retrains on the cropped samples and resynchronizes the internal tick
    /// so the next fed reading is `tick`.
    fn update(&mut self, training: &[&[MotionReading]], tick: u64);

    /// Consumes the next reading of the live stream.
    fn feed(&mut self, reading: MotionReading) -> Option<Match>;

    fn is_running(&self) -> bool;

    /// Device-side artifact describing this gesture.
    fn generate_code_block(&self) -> String;

    fn prototype(&self) -> &[MotionReading];
}

/// Builds matchers for newly created or renamed gestures.
pub trait MatcherFactory {
    fn create(&self, id: GestureId, name: &str) -> Box<dyn Matcher>;
}

/// Nearest-template recognizer.
///
/// The prototype is the element-wise mean of the training samples truncated
/// to the shortest one. A sliding window of the same length is compared to
/// the prototype by mean Euclidean distance.
#[derive(Debug, Clone)]
pub struct TemplateMatcher {
    id: GestureId,
    name: String,
    config: MatcherConfig,
    prototype: Vec<MotionReading>,
    threshold: f32,
    window: VecDeque<MotionReading>,
    next_tick: u64,
    last_match_end: Option<u64>,
}

impl TemplateMatcher {
    pub fn new(id: GestureId, name: impl Into<String>, config: MatcherConfig) -> Self {
        Self {
            id,
            name: name.into(),
            config,
            prototype: Vec::new(),
            threshold: 0.0,
            window: VecDeque::new(),
            next_tick: 0,
            last_match_end: None,
        }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }
}

impl Matcher for TemplateMatcher {
    fn update(&mut self, training: &[&[MotionReading]], tick: u64) {
        self.next_tick = tick;
        self.window.clear();
        self.last_match_end = None;

        let samples: Vec<&[MotionReading]> = training
            .iter()
            .copied()
            .filter(|sample| !sample.is_empty())
            .collect();
        let Some(len) = samples.iter().map(|sample| sample.len()).min() else {
            self.prototype.clear();
            self.threshold = 0.0;
            return;
        };

        let count = samples.len() as f32;
        self.prototype = (0..len)
            .map(|i| {
                let (x, y, z) = samples.iter().fold((0.0, 0.0, 0.0), |acc, sample| {
                    (acc.0 + sample[i].x, acc.1 + sample[i].y, acc.2 + sample[i].z)
                });
                MotionReading::new(x / count, y / count, z / count)
            })
            .collect();

        let spread = samples
            .iter()
            .map(|sample| mean_distance(sample[..len].iter(), &self.prototype))
            .fold(0.0_f32, f32::max);
        self.threshold = (spread * self.config.threshold_margin).max(self.config.min_threshold);
    }

    fn feed(&mut self, reading: MotionReading) -> Option<Match> {
        let tick = self.next_tick;
        self.next_tick += 1;

        let len = self.prototype.len();
        if len == 0 {
            return None;
        }

        self.window.push_back(reading);
        while self.window.len() > len {
            self.window.pop_front();
        }
        if self.window.len() < len {
            return None;
        }

        let start = tick + 1 - len as u64;
        if self.last_match_end.map_or(false, |end| start <= end) {
            return None;
        }

        if mean_distance(self.window.iter(), &self.prototype) <= self.threshold {
            self.last_match_end = Some(tick);
            Some(Match::new(start, tick))
        } else {
            None
        }
    }

    fn is_running(&self) -> bool {
        !self.prototype.is_empty()
    }

    fn generate_code_block(&self) -> String {
        let rows: Vec<String> = self
            .prototype
            .iter()
            .map(|r| {
                format!(
                    "    [{}, {}, {}],",
                    r.x.round() as i32,
                    r.y.round() as i32,
                    r.z.round() as i32
                )
            })
            .collect();

        format!(
            "// gesture {id}: {name}\nconst GESTURE_{id}_THRESHOLD: f32 = {threshold:.1};\nconst GESTURE_{id}_PROTOTYPE: [[i32; 3]; {len}] = [\n{rows}\n];\n",
            id = self.id,
            name = self.name,
            threshold = self.threshold,
            len = self.prototype.len(),
            rows = rows.join("\n"),
        )
    }

    fn prototype(&self) -> &[MotionReading] {
        &self.prototype
    }
}

/// Factory for [`TemplateMatcher`] instances sharing one tuning.
#[derive(Debug, Clone, Default)]
pub struct TemplateMatcherFactory {
    config: MatcherConfig,
}

impl TemplateMatcherFactory {
    pub fn new(config: MatcherConfig) -> Self {
        Self { config }
    }
}

impl MatcherFactory for TemplateMatcherFactory {
    fn create(&self, id: GestureId, name: &str) -> Box<dyn Matcher> {
        Box::new(TemplateMatcher::new(id, name, self.config.clone()))
    }
}

fn mean_distance<'a>(
    window: impl Iterator<Item = &'a MotionReading>,
    prototype: &[MotionReading],
) -> f32 {
    if prototype.is_empty() {
        return 0.0;
    }
    let total: f32 = window
        .zip(prototype)
        .map(|(reading, reference)| reading.distance(reference))
        .sum();
    total / prototype.len() as f32
}
