//! Core library for the Gesture Trainer.
//!
//! The crate conditions a live accelerometer stream, keeps a catalog of
//! user-trained gestures aligned with one matcher per gesture, and keeps that
//! catalog in sync with the host that embeds the trainer. Each module owns a
//! distinct piece (signal conditioning, history, catalog, matchers, host
//! protocol, persistence) and [`Session`] wires them into a single-threaded
//! event loop.

pub mod catalog;
pub mod config;
pub mod error;
pub mod history;
pub mod matcher;
pub mod persist;
pub mod protocol;
pub mod record;
pub mod registry;
pub mod session;
pub mod signal;
pub mod timeline;
pub mod trainer;
pub mod wire;

pub use catalog::{
    parse_catalog, CropRange, Gesture, GestureCatalog, GestureId, Sample, SubscriptionId,
};
pub use config::{
    AppConfig, FilterConfig, HistoryConfig, MatcherConfig, PersistenceConfig, SensorConfig,
    SyncConfig,
};
pub use error::{Result, TrainerError};
pub use history::{HistoryBuffer, Match, MatchTracker};
pub use matcher::{Matcher, MatcherFactory, TemplateMatcher, TemplateMatcherFactory};
pub use persist::{build_code_unit, PersistenceScheduler};
pub use protocol::{CodeState, ConsoleData, Envelope, HostAction, HostEvent, Inbound, SyncChannel};
pub use record::Recorder;
pub use registry::MatcherRegistry;
pub use session::{HostTransport, Session};
pub use signal::{LowPassFilter, MotionReading, SignalConditioner};
pub use timeline::{ScheduledEvent, SessionClock, TimerHandle, TimerQueue};
pub use trainer::{DisplayPoint, GestureTrainer};
pub use wire::{FrameBatch, FrameParser};
