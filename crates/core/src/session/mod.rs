//! Event-driven composition of trainer, host channel and persistence.
//!
//! A [`Session`] is driven by three kinds of calls: inbound host messages,
//! user edits through [`Session::edit`], and [`Session::poll`] when time has
//! passed. Each call runs to completion before the next one starts, which is
//! what lets the catalog rely on copy-on-write instead of locks.

use std::time::Duration;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::{
    config::AppConfig,
    protocol::{parse_read_code, Envelope, HostAction, HostEvent, Inbound, SyncChannel},
    FrameParser, GestureTrainer, MatcherFactory, PersistenceScheduler, Result, TrainerError,
};

/// Outbound half of the host channel.
pub trait HostTransport {
    fn send(&mut self, envelope: &Envelope) -> Result<()>;
}

/// Collects envelopes in memory.
impl HostTransport for Vec<Envelope> {
    fn send(&mut self, envelope: &Envelope) -> Result<()> {
        self.push(envelope.clone());
        Ok(())
    }
}

pub struct Session<T: HostTransport> {
    trainer: GestureTrainer,
    channel: SyncChannel,
    persistence: PersistenceScheduler,
    parser: FrameParser,
    transport: T,
    connected: bool,
    write_failed: bool,
    torn_down: bool,
}

impl<T: HostTransport> Session<T> {
    pub fn new(config: &AppConfig, factory: Box<dyn MatcherFactory>, transport: T) -> Self {
        Self {
            trainer: GestureTrainer::new(config, factory),
            channel: SyncChannel::new(&config.sync),
            persistence: PersistenceScheduler::new(&config.persistence),
            parser: FrameParser::new(&config.sensor),
            transport,
            connected: false,
            write_failed: false,
            torn_down: false,
        }
    }

    pub fn trainer(&self) -> &GestureTrainer {
        &self.trainer
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn is_dirty(&self) -> bool {
        self.persistence.is_dirty()
    }

    /// Whether the last write to the host was abandoned after all retries.
    pub fn write_failed(&self) -> bool {
        self.write_failed
    }

    /// Announces the trainer to the host.
    pub fn start(&mut self, now: Duration) -> Result<()> {
        info!("session started");
        self.send(HostAction::Init, None, now)
    }

    pub fn handle_text(&mut self, raw: &str, now: Duration) -> Result<()> {
        let envelope = Envelope::from_json(raw)?;
        self.handle_message(&envelope, now)
    }

    pub fn handle_message(&mut self, envelope: &Envelope, now: Duration) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        match self.channel.classify(envelope)? {
            Inbound::Event(HostEvent::Shown) => {
                info!("host shown, subscribing to data stream");
                self.connected = true;
                self.trainer.reset_stream();
                self.send(HostAction::StartDataStream, None, now)?;
                self.send(HostAction::ReadCode, None, now)?;
            }
            Inbound::Event(HostEvent::Hidden) => {
                info!("host hidden");
                self.connected = false;
            }
            Inbound::Event(HostEvent::ConsoleData(data)) => {
                if data.simulator_origin {
                    debug!("dropping simulator console data");
                    return Ok(());
                }
                let batch = self.parser.parse(&data.payload);
                for reading in batch.readings {
                    self.trainer.ingest(reading);
                }
            }
            Inbound::Response {
                action: HostAction::ReadCode,
                body,
            } => {
                if let Some(state) = parse_read_code(body.as_ref())? {
                    if self.trainer.hydrate(&state.serialized_state)? {
                        // Host state is authoritative; nothing local is pending.
                        self.persistence.reset();
                    }
                }
            }
            Inbound::Response {
                action: HostAction::WriteCode,
                ..
            } => {
                debug!("host acknowledged write");
                self.write_failed = false;
            }
            Inbound::Response { action, .. } => {
                debug!(%action, "host acknowledged request");
            }
            Inbound::Ignored => {}
        }
        Ok(())
    }

    /// Runs a user edit against the trainer and schedules persistence if it
    /// changed anything.
    pub fn edit<R>(
        &mut self,
        now: Duration,
        f: impl FnOnce(&mut GestureTrainer) -> Result<R>,
    ) -> Result<R> {
        let outcome = f(&mut self.trainer);
        if self.trainer.take_edited() && !self.torn_down {
            self.persistence.mark_dirty(now);
        }
        outcome
    }

    /// Fires a due flush and retries or abandons timed-out requests.
    pub fn poll(&mut self, now: Duration) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        if self.persistence.poll(now) {
            self.flush(now)?;
        }

        for expired in self.channel.expire(now) {
            let action = expired.action;
            match self.channel.retry(expired, now) {
                Some(envelope) => self.transmit(action, &envelope)?,
                None if action == HostAction::WriteCode => {
                    error!("giving up on writing the catalog to the host");
                    self.write_failed = true;
                    self.persistence.mark_dirty(now);
                }
                None => warn!(%action, "giving up on host request"),
            }
        }
        Ok(())
    }

    /// Earliest instant at which [`poll`](Self::poll) has work to do.
    pub fn next_deadline(&self) -> Option<Duration> {
        match (self.persistence.next_deadline(), self.channel.next_deadline()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Sends the catalog and generated code if anything changed. Returns
    /// whether a write request went out.
    pub fn flush(&mut self, now: Duration) -> Result<bool> {
        let Some(state) = self
            .persistence
            .flush(self.trainer.catalog(), self.trainer.registry())?
        else {
            return Ok(false);
        };
        let body = serde_json::to_value(&state)?;
        self.send(HostAction::WriteCode, Some(body), now)?;
        Ok(true)
    }

    /// Writes out unsaved edits immediately and stops all timers. Nothing is
    /// flushed or retried afterwards.
    pub fn teardown(&mut self, now: Duration) -> Result<()> {
        if self.torn_down {
            return Ok(());
        }
        let flushed = self.flush(now);
        self.persistence.cancel();
        self.channel.clear_pending();
        self.torn_down = true;
        info!("session torn down");
        flushed.map(|_| ())
    }

    fn send(&mut self, action: HostAction, body: Option<Value>, now: Duration) -> Result<()> {
        let envelope = self.channel.send_request(action, body, now);
        self.transmit(action, &envelope)
    }

    fn transmit(&mut self, action: HostAction, envelope: &Envelope) -> Result<()> {
        self.transport
            .send(envelope)
            .map_err(|err| TrainerError::Transport(format!("{action}: {err}")))
    }
}

impl<T: HostTransport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("trainer", &self.trainer)
            .field("pending_requests", &self.channel.pending_len())
            .field("dirty", &self.persistence.is_dirty())
            .field("connected", &self.connected)
            .field("write_failed", &self.write_failed)
            .finish()
    }
}
