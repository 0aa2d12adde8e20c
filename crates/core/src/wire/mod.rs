//! Parser for the accelerometer text stream carried in console data.
//!
//! The stream is whitespace-delimited. A marker token opens one frame and the
//! next three tokens are the integer x, y and z values. Everything else is
//! noise from other console output and is skipped.

use tracing::warn;

use crate::{config::SensorConfig, MotionReading};

/// Result of parsing one console payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameBatch {
    pub readings: Vec<MotionReading>,
    /// Markers that were not followed by three integers. These frames are
    /// dropped rather than passed on with made-up values.
    pub dropped: usize,
}

#[derive(Debug, Clone)]
pub struct FrameParser {
    marker: String,
}

impl FrameParser {
    pub fn new(config: &SensorConfig) -> Self {
        Self {
            marker: config.marker.clone(),
        }
    }

    pub fn parse(&self, payload: &str) -> FrameBatch {
        let tokens: Vec<&str> = payload.split_whitespace().collect();
        let mut batch = FrameBatch::default();
        let mut index = 0;

        while index < tokens.len() {
            if tokens[index] != self.marker {
                index += 1;
                continue;
            }
            match parse_triple(&tokens[index + 1..]) {
                Some(reading) => {
                    batch.readings.push(reading);
                    index += 4;
                }
                None => {
                    batch.dropped += 1;
                    index += 1;
                }
            }
        }

        if batch.dropped > 0 {
            warn!(dropped = batch.dropped, "dropped truncated sensor frames");
        }
        batch
    }
}

fn parse_triple(tokens: &[&str]) -> Option<MotionReading> {
    let mut values = tokens.iter().take(3).map(|token| token.parse::<i32>().ok());
    let x = values.next()??;
    let y = values.next()??;
    let z = values.next()??;
    Some(MotionReading::new(x as f32, y as f32, z as f32))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> FrameParser {
        FrameParser::new(&SensorConfig::default())
    }

    #[test]
    fn reads_marked_triples_and_skips_noise() {
        let batch = parser().parse("boot ok A 12 -40 1024 temp 21 A 0 0 -1020\n");
        assert_eq!(
            batch.readings,
            vec![
                MotionReading::new(12.0, -40.0, 1024.0),
                MotionReading::new(0.0, 0.0, -1020.0),
            ]
        );
        assert_eq!(batch.dropped, 0);
    }

    #[test]
    fn truncated_frames_are_dropped() {
        let batch = parser().parse("A 1 2 3 A 4 5");
        assert_eq!(batch.readings, vec![MotionReading::new(1.0, 2.0, 3.0)]);
        assert_eq!(batch.dropped, 1);
    }

    #[test]
    fn marker_inside_a_broken_frame_still_opens_a_frame() {
        let batch = parser().parse("A 7 x A 1 1 1");
        assert_eq!(batch.readings, vec![MotionReading::new(1.0, 1.0, 1.0)]);
        assert_eq!(batch.dropped, 1);
    }

    #[test]
    fn non_integer_values_are_rejected() {
        let batch = parser().parse("A 1.5 2 3");
        assert!(batch.readings.is_empty());
        assert_eq!(batch.dropped, 1);
    }

    #[test]
    fn custom_marker() {
        let parser = FrameParser::new(&SensorConfig {
            marker: "acc:".to_string(),
        });
        let batch = parser.parse("A 1 1 1 acc: 3 2 1");
        assert_eq!(batch.readings, vec![MotionReading::new(3.0, 2.0, 1.0)]);
    }
}
