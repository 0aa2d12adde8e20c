use crate::MotionReading;

/// Captures conditioned readings while the user performs a gesture.
#[derive(Debug, Clone)]
pub struct Recorder {
    max_len: usize,
    captured: Vec<MotionReading>,
    is_recording: bool,
}

impl Recorder {
    pub fn new(max_len: usize) -> Self {
        Self {
            max_len,
            captured: Vec::new(),
            is_recording: false,
        }
    }

    /// Starts a fresh capture, discarding anything left from an abandoned one.
    pub fn start(&mut self) {
        self.captured.clear();
        self.is_recording = true;
    }

    /// Ends the capture and hands back what was recorded.
    pub fn stop(&mut self) -> Vec<MotionReading> {
        self.is_recording = false;
        std::mem::take(&mut self.captured)
    }

    pub fn cancel(&mut self) {
        self.is_recording = false;
        self.captured.clear();
    }

    /// Appends a reading if recording; readings past the cap are ignored.
    pub fn push(&mut self, reading: MotionReading) {
        if self.is_recording && self.captured.len() < self.max_len {
            self.captured.push(reading);
        }
    }

    pub fn is_recording(&self) -> bool {
        self.is_recording
    }

    pub fn captured(&self) -> &[MotionReading] {
        &self.captured
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_captures_while_recording() {
        let mut recorder = Recorder::new(10);
        recorder.push(MotionReading::new(1.0, 0.0, 0.0));
        recorder.start();
        recorder.push(MotionReading::new(2.0, 0.0, 0.0));

        let captured = recorder.stop();
        assert_eq!(captured, vec![MotionReading::new(2.0, 0.0, 0.0)]);
        assert!(!recorder.is_recording());
        assert!(recorder.captured().is_empty());
    }

    #[test]
    fn capture_is_capped() {
        let mut recorder = Recorder::new(2);
        recorder.start();
        for i in 0..5 {
            recorder.push(MotionReading::new(i as f32, 0.0, 0.0));
        }
        assert_eq!(recorder.stop().len(), 2);
    }
}
