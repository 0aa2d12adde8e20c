use std::fmt;

use crate::{Matcher, MotionReading};

/// Matchers stored at the same index as their gesture in the catalog.
///
/// The registry itself knows nothing about gestures; keeping the two arrays
/// aligned is the job of [`crate::GestureTrainer`], which only changes both
/// within a single call.
#[derive(Default)]
pub struct MatcherRegistry {
    matchers: Vec<Box<dyn Matcher>>,
}

impl MatcherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn push(&mut self, matcher: Box<dyn Matcher>) {
        self.matchers.push(matcher);
    }

    pub fn remove(&mut self, index: usize) -> Option<Box<dyn Matcher>> {
        (index < self.matchers.len()).then(|| self.matchers.remove(index))
    }

    /// Swaps the matcher at `index`, returning the previous one.
    pub fn replace(&mut self, index: usize, matcher: Box<dyn Matcher>) -> Option<Box<dyn Matcher>> {
        self.matchers
            .get_mut(index)
            .map(|slot| std::mem::replace(slot, matcher))
    }

    /// Replaces the whole array. Only hydration does this.
    pub fn replace_all(&mut self, matchers: Vec<Box<dyn Matcher>>) {
        self.matchers = matchers;
    }

    pub fn get(&self, index: usize) -> Option<&dyn Matcher> {
        self.matchers.get(index).map(|matcher| matcher.as_ref())
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut (dyn Matcher + 'static)> {
        self.matchers.get_mut(index).map(|matcher| matcher.as_mut())
    }

    /// Retrains the matcher at `index` and returns its refreshed prototype.
    pub fn retrain(
        &mut self,
        index: usize,
        training: &[&[MotionReading]],
        tick: u64,
    ) -> Option<Vec<MotionReading>> {
        let matcher = self.matchers.get_mut(index)?;
        matcher.update(training, tick);
        Some(matcher.prototype().to_vec())
    }

    /// Code blocks of every running matcher, in catalog order.
    pub fn running_code_blocks(&self) -> Vec<String> {
        self.matchers
            .iter()
            .filter(|matcher| matcher.is_running())
            .map(|matcher| matcher.generate_code_block())
            .collect()
    }
}

impl fmt::Debug for MatcherRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MatcherRegistry")
            .field("matchers", &self.matchers.len())
            .field(
                "running",
                &self.matchers.iter().filter(|m| m.is_running()).count(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::MatcherConfig, GestureId, TemplateMatcher};

    fn template(id: u32) -> Box<dyn Matcher> {
        Box::new(TemplateMatcher::new(GestureId(id), format!("g{id}"), MatcherConfig::default()))
    }

    #[test]
    fn only_running_matchers_contribute_code() {
        let mut registry = MatcherRegistry::new();
        registry.push(template(1));
        registry.push(template(2));

        let sample = vec![MotionReading::new(1.0, 2.0, 3.0)];
        let prototype = registry.retrain(1, &[&sample], 0).unwrap();
        assert_eq!(prototype, sample);

        let blocks = registry.running_code_blocks();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].contains("gesture 2: g2"));
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let mut registry = MatcherRegistry::new();
        registry.push(template(1));

        assert!(registry.remove(3).is_none());
        assert!(registry.retrain(1, &[], 0).is_none());
        assert!(registry.replace(1, template(9)).is_none());
        assert_eq!(registry.len(), 1);
    }
}
