//! The ordered set of gestures and their training samples.
//!
//! The catalog is published as an immutable `Arc<Vec<Gesture>>`. Every edit
//! clones the published array into a draft, mutates the draft and swaps it in
//! with [`GestureCatalog::publish`], so a reader holding a snapshot sees
//! either the complete array before an edit or the complete array after it.

use std::{collections::HashSet, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{MotionReading, Result, TrainerError};

/// Stable gesture identifier. Assigned once, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GestureId(pub u32);

impl fmt::Display for GestureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Half-open range `[start, end)` selecting the useful part of a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRange {
    pub start: usize,
    pub end: usize,
}

/// One recorded training example.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Sample {
    pub readings: Vec<MotionReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<CropRange>,
}

impl Sample {
    pub fn new(readings: Vec<MotionReading>) -> Self {
        Self {
            readings,
            crop: None,
        }
    }

    /// The readings selected by the crop range, clamped to what was recorded.
    pub fn cropped(&self) -> &[MotionReading] {
        match self.crop {
            None => &self.readings,
            Some(CropRange { start, end }) => {
                let end = end.min(self.readings.len());
                let start = start.min(end);
                &self.readings[start..end]
            }
        }
    }
}

/// A named, user-trained motion pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gesture {
    pub id: GestureId,
    pub name: String,
    /// Newest sample first.
    #[serde(default)]
    pub samples: Vec<Sample>,
    /// Display prototype copied from the aligned matcher; derived, never
    /// persisted.
    #[serde(skip)]
    pub prototype: Vec<MotionReading>,
}

impl Gesture {
    pub fn new(id: GestureId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            samples: Vec::new(),
            prototype: Vec::new(),
        }
    }

    /// Cropped readings of every sample, in sample order.
    pub fn training_data(&self) -> Vec<&[MotionReading]> {
        self.samples.iter().map(Sample::cropped).collect()
    }
}

/// Handle returned by [`GestureCatalog::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&Arc<Vec<Gesture>>)>;

pub struct GestureCatalog {
    published: Arc<Vec<Gesture>>,
    highest_issued: u32,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
}

impl GestureCatalog {
    pub fn new() -> Self {
        Self {
            published: Arc::new(Vec::new()),
            highest_issued: 0,
            listeners: Vec::new(),
            next_subscription: 0,
        }
    }

    /// The currently published array. The returned snapshot never changes.
    pub fn snapshot(&self) -> Arc<Vec<Gesture>> {
        Arc::clone(&self.published)
    }

    pub fn gestures(&self) -> &[Gesture] {
        &self.published
    }

    pub fn len(&self) -> usize {
        self.published.len()
    }

    pub fn is_empty(&self) -> bool {
        self.published.is_empty()
    }

    /// Resolves an id to its current position by scanning the catalog.
    pub fn index_of(&self, id: GestureId) -> Option<usize> {
        self.published.iter().position(|gesture| gesture.id == id)
    }

    pub fn get(&self, id: GestureId) -> Option<&Gesture> {
        self.published.iter().find(|gesture| gesture.id == id)
    }

    /// Hands out the next id: one above anything ever issued or loaded.
    pub fn issue_id(&mut self) -> GestureId {
        let highest = self
            .published
            .iter()
            .map(|gesture| gesture.id.0)
            .max()
            .unwrap_or(0)
            .max(self.highest_issued);
        self.highest_issued = highest + 1;
        GestureId(self.highest_issued)
    }

    /// A private copy of the published array to edit.
    pub fn draft(&self) -> Vec<Gesture> {
        self.published.as_ref().clone()
    }

    /// Swaps in a finished draft and notifies subscribers.
    pub fn publish(&mut self, next: Vec<Gesture>) {
        if let Some(highest) = next.iter().map(|gesture| gesture.id.0).max() {
            self.highest_issued = self.highest_issued.max(highest);
        }
        self.published = Arc::new(next);
        for (_, listener) in &mut self.listeners {
            listener(&self.published);
        }
    }

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&Arc<Vec<Gesture>>) + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(existing, _)| *existing != id);
        self.listeners.len() != before
    }

    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string(self.published.as_ref())?)
    }
}

impl Default for GestureCatalog {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GestureCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GestureCatalog")
            .field("gestures", &self.published.len())
            .field("highest_issued", &self.highest_issued)
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

/// Parses and validates a serialized catalog.
///
/// Ids must be non-zero and unique; crop ranges must not be inverted.
pub fn parse_catalog(raw: &str) -> Result<Vec<Gesture>> {
    let gestures: Vec<Gesture> = serde_json::from_str(raw)?;

    let mut seen = HashSet::new();
    for gesture in &gestures {
        if gesture.id.0 == 0 {
            return Err(TrainerError::InvalidCatalog(format!(
                "gesture `{}` has reserved id 0",
                gesture.name
            )));
        }
        if !seen.insert(gesture.id) {
            return Err(TrainerError::InvalidCatalog(format!(
                "duplicate gesture id {}",
                gesture.id
            )));
        }
        for sample in &gesture.samples {
            if let Some(crop) = sample.crop {
                if crop.start > crop.end {
                    return Err(TrainerError::InvalidCatalog(format!(
                        "gesture {} has an inverted crop range",
                        gesture.id
                    )));
                }
            }
        }
    }

    Ok(gestures)
}
