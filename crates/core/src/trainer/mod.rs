//! Gesture lifecycle and the real-time feed loop.
//!
//! [`GestureTrainer`] owns the catalog and the matcher registry together and
//! is the only place either changes, so the two arrays have equal length
//! whenever control returns to the caller. The current gesture is held as an
//! id and resolved to an index on every use.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    catalog::{parse_catalog, CropRange},
    config::{AppConfig, FilterConfig},
    Gesture, GestureCatalog, GestureId, HistoryBuffer, Match, MatchTracker, MatcherFactory,
    MatcherRegistry, MotionReading, Recorder, Result, Sample, SignalConditioner, SubscriptionId,
    TrainerError,
};

/// One buffered reading as the display should draw it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayPoint {
    pub reading: MotionReading,
    pub tick: u64,
    pub highlighted: bool,
}

pub struct GestureTrainer {
    catalog: GestureCatalog,
    registry: MatcherRegistry,
    factory: Box<dyn MatcherFactory>,
    current: Option<GestureId>,
    filter: FilterConfig,
    conditioner: SignalConditioner,
    history: HistoryBuffer,
    tracker: MatchTracker,
    recorder: Recorder,
    edited: bool,
}

impl GestureTrainer {
    pub fn new(config: &AppConfig, factory: Box<dyn MatcherFactory>) -> Self {
        Self {
            catalog: GestureCatalog::new(),
            registry: MatcherRegistry::new(),
            factory,
            current: None,
            filter: config.filter.clone(),
            conditioner: SignalConditioner::new(&config.filter),
            history: HistoryBuffer::new(config.history.capacity),
            tracker: MatchTracker::new(),
            recorder: Recorder::new(config.history.max_sample_len),
            edited: false,
        }
    }

    pub fn catalog(&self) -> &GestureCatalog {
        &self.catalog
    }

    /// Registers a listener for every catalog publish.
    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&Arc<Vec<Gesture>>) + 'static,
    ) -> SubscriptionId {
        self.catalog.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.catalog.unsubscribe(id)
    }

    pub fn snapshot(&self) -> Arc<Vec<Gesture>> {
        self.catalog.snapshot()
    }

    pub fn registry(&self) -> &MatcherRegistry {
        &self.registry
    }

    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }

    pub fn tracker(&self) -> &MatchTracker {
        &self.tracker
    }

    pub fn current_gesture(&self) -> Option<GestureId> {
        self.current
    }

    /// Resolves the current gesture to its position in the catalog.
    pub fn current_index(&self) -> Result<usize> {
        let id = self.current.ok_or(TrainerError::NoCurrentGesture)?;
        self.index_of(id)
    }

    pub fn is_recording(&self) -> bool {
        self.recorder.is_recording()
    }

    /// Reports and clears whether a user edit happened since the last call.
    pub fn take_edited(&mut self) -> bool {
        std::mem::take(&mut self.edited)
    }

    /// Creates a gesture with a fresh id and its matcher, and selects it.
    pub fn add_gesture(&mut self) -> GestureId {
        let id = self.catalog.issue_id();
        let gesture = Gesture::new(id, format!("Gesture {id}"));
        let matcher = self.factory.create(id, &gesture.name);

        let mut draft = self.catalog.draft();
        draft.push(gesture);
        self.registry.push(matcher);
        self.catalog.publish(draft);

        if self.recorder.is_recording() {
            warn!(%id, "adding a gesture abandons the recording in progress");
            self.recorder.cancel();
        }
        self.current = Some(id);
        self.tracker.clear();
        self.edited = true;
        debug!(%id, "added gesture");
        id
    }

    /// Inserts `sample` as the newest sample of gesture `id`.
    pub fn add_sample(&mut self, id: GestureId, sample: Sample) -> Result<()> {
        let index = self.index_of(id)?;
        let mut draft = self.catalog.draft();
        draft[index].samples.insert(0, sample);
        self.retrain_into(&mut draft, index);
        self.catalog.publish(draft);

        self.edited = true;
        debug!(%id, "added sample");
        Ok(())
    }

    pub fn delete_sample(&mut self, id: GestureId, sample_index: usize) -> Result<Sample> {
        let index = self.index_of(id)?;
        let mut draft = self.catalog.draft();
        if sample_index >= draft[index].samples.len() {
            return Err(TrainerError::SampleNotFound {
                gesture: id,
                index: sample_index,
            });
        }
        let removed = draft[index].samples.remove(sample_index);
        self.retrain_into(&mut draft, index);
        self.catalog.publish(draft);

        self.edited = true;
        debug!(%id, sample_index, "deleted sample");
        Ok(removed)
    }

    /// Restricts a sample to `[start, end)` of its readings.
    pub fn crop_sample(
        &mut self,
        id: GestureId,
        sample_index: usize,
        start: usize,
        end: usize,
    ) -> Result<()> {
        if start > end {
            return Err(TrainerError::msg(format!(
                "crop start {start} is past its end {end}"
            )));
        }
        let index = self.index_of(id)?;
        let mut draft = self.catalog.draft();
        let sample = draft[index]
            .samples
            .get_mut(sample_index)
            .ok_or(TrainerError::SampleNotFound {
                gesture: id,
                index: sample_index,
            })?;
        let end = end.min(sample.readings.len());
        sample.crop = Some(CropRange {
            start: start.min(end),
            end,
        });
        self.retrain_into(&mut draft, index);
        self.catalog.publish(draft);

        self.edited = true;
        Ok(())
    }

    pub fn rename_gesture(&mut self, id: GestureId, name: impl Into<String>) -> Result<()> {
        let index = self.index_of(id)?;
        let mut draft = self.catalog.draft();
        draft[index].name = name.into();

        let mut matcher = self.factory.create(id, &draft[index].name);
        matcher.update(&draft[index].training_data(), self.history.tick_count());
        draft[index].prototype = matcher.prototype().to_vec();
        self.registry.replace(index, matcher);
        self.catalog.publish(draft);

        self.edited = true;
        Ok(())
    }

    /// Removes a gesture and the matcher at the same index.
    pub fn delete_gesture(&mut self, id: GestureId) -> Result<Gesture> {
        let index = self.index_of(id)?;
        let mut draft = self.catalog.draft();
        let removed = draft.remove(index);
        self.registry.remove(index);
        self.catalog.publish(draft);

        if self.current == Some(id) {
            self.current = None;
            self.recorder.cancel();
            self.tracker.clear();
        }
        self.edited = true;
        debug!(%id, "deleted gesture");
        Ok(removed)
    }

    /// Discards the current gesture if it never received a sample and is not
    /// being recorded. Returns whether anything was deleted.
    pub fn delete_if_gesture_empty(&mut self) -> Result<bool> {
        if self.recorder.is_recording() {
            return Ok(false);
        }
        let Some(id) = self.current else {
            return Ok(false);
        };
        let index = self.index_of(id)?;
        if !self.catalog.gestures()[index].samples.is_empty() {
            return Ok(false);
        }
        self.delete_gesture(id)?;
        Ok(true)
    }

    /// Selects gesture `id` and resynchronizes its matcher with the current
    /// training data and tick.
    pub fn set_current_gesture(&mut self, id: GestureId) -> Result<()> {
        let index = self.index_of(id)?;
        if self.current != Some(id) {
            if self.recorder.is_recording() {
                warn!(%id, "switching gesture abandons the recording in progress");
                self.recorder.cancel();
            }
            self.tracker.clear();
        }
        self.current = Some(id);

        let training = self.catalog.gestures()[index].training_data();
        self.registry
            .retrain(index, &training, self.history.tick_count());
        Ok(())
    }

    /// Replaces catalog and matchers with a serialized catalog from the host.
    ///
    /// Blank input or an empty array keeps the existing state. Returns
    /// whether anything was replaced.
    pub fn hydrate(&mut self, raw: &str) -> Result<bool> {
        if raw.trim().is_empty() {
            return Ok(false);
        }
        let mut gestures = parse_catalog(raw)?;
        if gestures.is_empty() {
            return Ok(false);
        }

        let tick = self.history.tick_count();
        let mut matchers = Vec::with_capacity(gestures.len());
        for gesture in &mut gestures {
            let mut matcher = self.factory.create(gesture.id, &gesture.name);
            matcher.update(&gesture.training_data(), tick);
            gesture.prototype = matcher.prototype().to_vec();
            matchers.push(matcher);
        }

        let keep_current = self
            .current
            .filter(|id| gestures.iter().any(|gesture| gesture.id == *id));
        self.current = keep_current.or_else(|| gestures.first().map(|gesture| gesture.id));
        if keep_current.is_none() {
            self.recorder.cancel();
        }

        info!(gestures = gestures.len(), "hydrated catalog");
        self.registry.replace_all(matchers);
        self.catalog.publish(gestures);
        self.tracker.clear();
        Ok(true)
    }

    pub fn serialize(&self) -> Result<String> {
        self.catalog.serialize()
    }

    /// Starts a new conditioning session, forgetting filter state from any
    /// previous connection.
    pub fn reset_stream(&mut self) {
        self.conditioner = SignalConditioner::new(&self.filter);
    }

    /// Conditions one raw frame, appends it to the history and feeds the
    /// current gesture's matcher if it is running.
    pub fn ingest(&mut self, raw: MotionReading) -> Option<Match> {
        let reading = self.conditioner.condition(raw);
        self.history.append(reading);
        self.recorder.push(reading);
        if let Some(oldest) = self.history.oldest_tick() {
            self.tracker.retain_from(oldest);
        }

        let index = self.current.and_then(|id| self.catalog.index_of(id))?;
        let matcher = self.registry.get_mut(index)?;
        if !matcher.is_running() {
            return None;
        }
        let found = matcher.feed(reading)?;
        debug!(start = found.start_time, end = found.end_time, "gesture matched");
        self.tracker.record(found);
        Some(found)
    }

    pub fn start_recording(&mut self) -> Result<()> {
        self.current_index()?;
        self.recorder.start();
        Ok(())
    }

    /// Ends the recording and stores it as the newest sample of the current
    /// gesture. Returns whether a sample was added.
    pub fn stop_recording(&mut self) -> Result<bool> {
        if !self.recorder.is_recording() {
            return Ok(false);
        }
        let readings = self.recorder.stop();
        if readings.is_empty() {
            return Ok(false);
        }
        let id = self.current.ok_or(TrainerError::NoCurrentGesture)?;
        self.add_sample(id, Sample::new(readings))?;
        Ok(true)
    }

    pub fn display_window(&self) -> Vec<DisplayPoint> {
        self.history
            .iter()
            .enumerate()
            .map(|(offset, reading)| DisplayPoint {
                reading: *reading,
                tick: self.history.tick_at(offset).unwrap_or_default(),
                highlighted: self.history.is_match(offset, &self.tracker),
            })
            .collect()
    }

    fn index_of(&self, id: GestureId) -> Result<usize> {
        self.catalog
            .index_of(id)
            .ok_or(TrainerError::GestureNotFound(id))
    }

    /// Retrains the matcher aligned with the edited gesture and copies its
    /// prototype into the draft.
    fn retrain_into(&mut self, draft: &mut [Gesture], index: usize) {
        let training = draft[index].training_data();
        let prototype = self
            .registry
            .retrain(index, &training, self.history.tick_count())
            .unwrap_or_default();
        draft[index].prototype = prototype;
    }
}

impl std::fmt::Debug for GestureTrainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GestureTrainer")
            .field("catalog", &self.catalog)
            .field("registry", &self.registry)
            .field("current", &self.current)
            .field("ticks", &self.history.tick_count())
            .field("recording", &self.recorder.is_recording())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::MatcherConfig, TemplateMatcherFactory};

    fn trainer() -> GestureTrainer {
        let config = AppConfig::default();
        GestureTrainer::new(
            &config,
            Box::new(TemplateMatcherFactory::new(MatcherConfig {
                threshold_margin: 1.0,
                min_threshold: 1.0,
            })),
        )
    }

    fn sample(values: &[f32]) -> Sample {
        Sample::new(values.iter().map(|v| MotionReading::new(*v, 0.0, 0.0)).collect())
    }

    fn assert_aligned(trainer: &GestureTrainer) {
        assert_eq!(trainer.catalog().len(), trainer.registry().len());
    }

    #[test]
    fn add_sample_delete_scenario() {
        let mut trainer = trainer();
        let id = trainer.add_gesture();
        assert_eq!(id, GestureId(1));
        assert_eq!(trainer.catalog().len(), 1);
        assert_eq!(trainer.current_index().unwrap(), 0);

        let a = sample(&[1.0]);
        let b = sample(&[2.0]);
        trainer.add_sample(id, a.clone()).unwrap();
        assert_eq!(trainer.catalog().gestures()[0].samples, vec![a.clone()]);
        trainer.add_sample(id, b.clone()).unwrap();
        assert_eq!(trainer.catalog().gestures()[0].samples, vec![b, a]);

        trainer.delete_gesture(id).unwrap();
        assert!(trainer.catalog().is_empty());
        assert!(trainer.registry().is_empty());
        assert!(matches!(
            trainer.current_index(),
            Err(TrainerError::NoCurrentGesture)
        ));
    }

    #[test]
    fn matchers_stay_aligned_and_ids_grow() {
        let mut trainer = trainer();
        let mut last = GestureId(0);
        let mut live = Vec::new();

        for round in 0..12 {
            let id = trainer.add_gesture();
            assert!(id > last);
            last = id;
            live.push(id);
            assert_aligned(&trainer);

            if round % 3 == 2 {
                let victim = live.remove(live.len() / 2);
                trainer.delete_gesture(victim).unwrap();
                assert_aligned(&trainer);
            }
            if round % 4 == 3 {
                let newest = live.pop().unwrap();
                trainer.delete_gesture(newest).unwrap();
                assert_aligned(&trainer);
            }
        }
        assert_eq!(trainer.catalog().len(), live.len());
    }

    #[test]
    fn sample_edits_retrain_the_edited_gesture() {
        let mut trainer = trainer();
        let first = trainer.add_gesture();
        let second = trainer.add_gesture();
        assert_eq!(trainer.current_gesture(), Some(second));

        trainer.add_sample(first, sample(&[4.0, 8.0])).unwrap();
        assert!(trainer.registry().get(0).unwrap().is_running());
        assert!(!trainer.registry().get(1).unwrap().is_running());
        assert_eq!(trainer.catalog().gestures()[0].prototype.len(), 2);

        trainer.delete_sample(first, 0).unwrap();
        assert!(!trainer.registry().get(0).unwrap().is_running());
        assert!(trainer.catalog().gestures()[0].prototype.is_empty());
    }

    #[test]
    fn missing_sample_is_reported() {
        let mut trainer = trainer();
        let id = trainer.add_gesture();
        let err = trainer.delete_sample(id, 0).unwrap_err();
        assert!(matches!(err, TrainerError::SampleNotFound { index: 0, .. }));
    }

    #[test]
    fn unknown_current_id_fails_fast() {
        let mut trainer = trainer();
        trainer.add_gesture();
        let err = trainer.set_current_gesture(GestureId(42)).unwrap_err();
        assert!(matches!(err, TrainerError::GestureNotFound(GestureId(42))));
        assert_eq!(trainer.current_gesture(), Some(GestureId(1)));
    }

    #[test]
    fn current_is_resolved_by_id_after_structural_changes() {
        let mut trainer = trainer();
        let first = trainer.add_gesture();
        let second = trainer.add_gesture();
        trainer.set_current_gesture(second).unwrap();
        assert_eq!(trainer.current_index().unwrap(), 1);

        trainer.delete_gesture(first).unwrap();
        assert_eq!(trainer.current_index().unwrap(), 0);
    }

    #[test]
    fn empty_draft_is_discarded() {
        let mut trainer = trainer();
        let kept = trainer.add_gesture();
        trainer.add_sample(kept, sample(&[1.0])).unwrap();
        trainer.add_gesture();

        assert!(trainer.delete_if_gesture_empty().unwrap());
        assert_eq!(trainer.catalog().len(), 1);
        assert_aligned(&trainer);

        trainer.set_current_gesture(kept).unwrap();
        assert!(!trainer.delete_if_gesture_empty().unwrap());
    }

    #[test]
    fn recording_gesture_is_not_discarded() {
        let mut trainer = trainer();
        trainer.add_gesture();
        trainer.start_recording().unwrap();
        assert!(!trainer.delete_if_gesture_empty().unwrap());
        assert_eq!(trainer.catalog().len(), 1);
    }

    #[test]
    fn adding_gesture_abandons_recording() {
        let mut trainer = trainer();
        let first = trainer.add_gesture();
        trainer.start_recording().unwrap();
        for _ in 0..3 {
            trainer.ingest(MotionReading::new(8.0, 0.0, 0.0));
        }

        trainer.add_gesture();
        assert!(!trainer.is_recording());
        assert!(trainer.delete_if_gesture_empty().unwrap());
        assert!(!trainer.stop_recording().unwrap());

        assert_eq!(trainer.catalog().len(), 1);
        let kept = &trainer.catalog().gestures()[0];
        assert_eq!(kept.id, first);
        assert!(kept.samples.is_empty());
    }

    #[test]
    fn recording_becomes_newest_sample() {
        let mut trainer = trainer();
        let id = trainer.add_gesture();
        trainer.add_sample(id, sample(&[0.0])).unwrap();

        trainer.start_recording().unwrap();
        for _ in 0..3 {
            trainer.ingest(MotionReading::new(8.0, 0.0, 0.0));
        }
        assert!(trainer.stop_recording().unwrap());

        let samples = &trainer.catalog().gestures()[0].samples;
        assert_eq!(samples.len(), 2);
        let xs: Vec<f32> = samples[0].readings.iter().map(|r| r.x).collect();
        assert_eq!(xs, vec![4.0, 6.0, 7.0]);
    }

    #[test]
    fn feed_loop_keeps_window_and_tick() {
        let mut trainer = trainer();
        for i in 0..35 {
            trainer.ingest(MotionReading::new(i as f32, 0.0, 0.0));
        }
        assert_eq!(trainer.history().len(), 30);
        assert_eq!(trainer.history().tick_count(), 35);
        let window = trainer.display_window();
        assert_eq!(window.first().unwrap().tick, 5);
        assert_eq!(window.last().unwrap().tick, 34);
    }

    #[test]
    fn running_matcher_highlights_detections() {
        let mut trainer = trainer();
        let id = trainer.add_gesture();

        // Conditioning a constant input from rest gives 50, 75, 87.5 ...
        // so a constant template near the settled value only matches late.
        trainer
            .add_sample(id, sample(&[100.0, 100.0, 100.0]))
            .unwrap();
        let mut found = Vec::new();
        for _ in 0..20 {
            if let Some(m) = trainer.ingest(MotionReading::new(100.0, 0.0, 0.0)) {
                found.push(m);
            }
        }

        assert!(!found.is_empty());
        let first = found[0];
        assert_eq!(first.end_time - first.start_time, 2);
        let highlighted: Vec<u64> = trainer
            .display_window()
            .iter()
            .filter(|point| point.highlighted)
            .map(|point| point.tick)
            .collect();
        assert!(highlighted.contains(&found.last().unwrap().end_time));
    }

    #[test]
    fn crop_and_rename_keep_alignment() {
        let mut trainer = trainer();
        let id = trainer.add_gesture();
        trainer.add_sample(id, sample(&[1.0, 2.0, 3.0, 4.0])).unwrap();
        trainer.crop_sample(id, 0, 1, 3).unwrap();
        assert_eq!(trainer.catalog().gestures()[0].prototype.len(), 2);

        trainer.rename_gesture(id, "flick").unwrap();
        assert_eq!(trainer.catalog().gestures()[0].name, "flick");
        assert!(trainer.registry().running_code_blocks()[0].contains("flick"));
        assert_aligned(&trainer);

        assert!(trainer.crop_sample(id, 0, 3, 1).is_err());
    }

    #[test]
    fn hydrate_round_trips_and_rebuilds_matchers() {
        let mut source = trainer();
        let a = source.add_gesture();
        source.add_sample(a, sample(&[1.0, 2.0])).unwrap();
        source.add_sample(a, sample(&[3.0, 4.0])).unwrap();
        let b = source.add_gesture();
        source.rename_gesture(b, "empty").unwrap();
        let raw = source.serialize().unwrap();

        let mut target = trainer();
        assert!(target.hydrate(&raw).unwrap());

        assert_eq!(target.registry().len(), source.registry().len());
        let pairs = target.catalog().gestures().iter().zip(source.catalog().gestures());
        for (loaded, original) in pairs {
            assert_eq!(loaded.id, original.id);
            assert_eq!(loaded.name, original.name);
            assert_eq!(loaded.samples, original.samples);
        }
        assert_eq!(target.current_gesture(), Some(a));
        assert!(!target.take_edited());

        // New ids continue above the loaded ones.
        assert_eq!(target.add_gesture(), GestureId(3));
    }

    #[test]
    fn blank_or_empty_hydrate_keeps_state() {
        let mut trainer = trainer();
        trainer.add_gesture();

        assert!(!trainer.hydrate("").unwrap());
        assert!(!trainer.hydrate("[]").unwrap());
        assert!(trainer.hydrate("not json").is_err());
        assert_eq!(trainer.catalog().len(), 1);
        assert_aligned(&trainer);
    }

    #[test]
    fn subscribers_observe_whole_arrays() {
        use std::{cell::RefCell, rc::Rc};

        let mut trainer = trainer();
        let lengths = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&lengths);
        trainer.subscribe(move |gestures| sink.borrow_mut().push(gestures.len()));

        let first = trainer.add_gesture();
        trainer.add_gesture();
        trainer.delete_gesture(first).unwrap();
        assert_eq!(*lengths.borrow(), vec![1, 2, 1]);
    }

    #[test]
    fn edits_are_reported_once() {
        let mut trainer = trainer();
        assert!(!trainer.take_edited());
        trainer.add_gesture();
        assert!(trainer.take_edited());
        assert!(!trainer.take_edited());
    }
}
