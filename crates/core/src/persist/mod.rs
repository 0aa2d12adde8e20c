//! Debounced persistence of the catalog and generated code.

use std::time::Duration;

use tracing::{debug, info};

use crate::{
    config::PersistenceConfig, protocol::CodeState, GestureCatalog, MatcherRegistry, Result,
    TimerHandle, TimerQueue,
};

const CODE_HEADER: &str = "// Generated by the gesture trainer. Edits will be overwritten.\n";

/// Dirty flag plus a trailing-edge debounce timer.
///
/// Every [`mark_dirty`](Self::mark_dirty) cancels the pending timer and
/// schedules a new one, so a burst of edits produces exactly one flush once
/// the burst has been quiet for the configured delay.
#[derive(Debug)]
pub struct PersistenceScheduler {
    delay: Duration,
    dirty: bool,
    timers: TimerQueue<()>,
    pending: Option<TimerHandle>,
}

impl PersistenceScheduler {
    pub fn new(config: &PersistenceConfig) -> Self {
        Self {
            delay: Duration::from_millis(config.debounce_ms),
            dirty: false,
            timers: TimerQueue::new(),
            pending: None,
        }
    }

    pub fn mark_dirty(&mut self, now: Duration) {
        if !self.dirty {
            debug!("catalog marked dirty");
        }
        self.dirty = true;
        if let Some(handle) = self.pending.take() {
            self.timers.cancel(handle);
        }
        self.pending = Some(self.timers.schedule(now, self.delay, ()));
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn is_scheduled(&self) -> bool {
        self.pending.is_some()
    }

    pub fn next_deadline(&self) -> Option<Duration> {
        self.timers.next_deadline()
    }

    /// Fires the debounce timer if its deadline has passed. Returns whether
    /// a flush is now due.
    pub fn poll(&mut self, now: Duration) -> bool {
        let fired = !self.timers.fire_due(now).is_empty();
        if fired {
            self.pending = None;
        }
        fired
    }

    /// Builds the write payload and clears the dirty flag, or does nothing if
    /// there is nothing new to persist.
    pub fn flush(
        &mut self,
        catalog: &GestureCatalog,
        registry: &MatcherRegistry,
    ) -> Result<Option<CodeState>> {
        if !self.dirty {
            return Ok(None);
        }
        let serialized_state = catalog.serialize()?;
        let code = build_code_unit(&registry.running_code_blocks());
        self.dirty = false;
        info!(gestures = catalog.len(), "flushing catalog to host");
        Ok(Some(CodeState {
            code,
            serialized_state,
        }))
    }

    /// Drops the pending timer without touching the dirty flag.
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            self.timers.cancel(handle);
        }
    }

    /// Cancels the timer and forgets unsaved edits.
    pub fn reset(&mut self) {
        self.cancel();
        self.dirty = false;
    }
}

/// Joins the code blocks of every running matcher into one unit.
pub fn build_code_unit(blocks: &[String]) -> String {
    let mut code = String::from(CODE_HEADER);
    for block in blocks {
        code.push('\n');
        code.push_str(block);
    }
    code
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{catalog::Gesture, GestureId};

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    fn scheduler() -> PersistenceScheduler {
        PersistenceScheduler::new(&PersistenceConfig { debounce_ms: 100 })
    }

    #[test]
    fn burst_of_edits_flushes_once() {
        let mut scheduler = scheduler();
        let catalog = GestureCatalog::new();
        let registry = MatcherRegistry::new();

        for t in [0, 20, 40, 60, 80] {
            scheduler.mark_dirty(ms(t));
            assert!(!scheduler.poll(ms(t)));
        }
        // The first call's deadline has passed, but it was superseded.
        assert!(!scheduler.poll(ms(150)));
        assert!(scheduler.poll(ms(180)));
        assert!(scheduler.flush(&catalog, &registry).unwrap().is_some());

        assert!(!scheduler.poll(ms(1000)));
        assert!(scheduler.flush(&catalog, &registry).unwrap().is_none());
    }

    #[test]
    fn edit_after_flush_schedules_one_more() {
        let mut scheduler = scheduler();
        let catalog = GestureCatalog::new();
        let registry = MatcherRegistry::new();

        scheduler.mark_dirty(ms(0));
        assert!(scheduler.poll(ms(100)));
        scheduler.flush(&catalog, &registry).unwrap();

        scheduler.mark_dirty(ms(200));
        assert!(scheduler.is_scheduled());
        assert!(scheduler.poll(ms(300)));
        assert!(!scheduler.is_scheduled());
        assert!(!scheduler.poll(ms(400)));
    }

    #[test]
    fn flush_carries_state_and_code() {
        let mut scheduler = scheduler();
        let mut catalog = GestureCatalog::new();
        catalog.publish(vec![Gesture::new(GestureId(3), "swing")]);
        let registry = MatcherRegistry::new();

        scheduler.mark_dirty(ms(0));
        let payload = scheduler.flush(&catalog, &registry).unwrap().unwrap();
        assert!(payload.serialized_state.contains("\"swing\""));
        assert!(payload.code.starts_with(CODE_HEADER));
        assert!(!scheduler.is_dirty());
    }

    #[test]
    fn code_unit_concatenates_blocks() {
        let code = build_code_unit(&["a\n".to_string(), "b\n".to_string()]);
        assert_eq!(code, format!("{CODE_HEADER}\na\n\nb\n"));
    }

    #[test]
    fn reset_forgets_pending_flush() {
        let mut scheduler = scheduler();
        scheduler.mark_dirty(ms(0));
        scheduler.reset();
        assert!(!scheduler.is_dirty());
        assert!(!scheduler.poll(ms(500)));
    }
}
