//! Request/response channel to the hosting environment.
//!
//! Outbound requests carry a fresh correlation id that is remembered until
//! the matching response arrives. Looking a response up removes the entry,
//! so each request is answered at most once and stale or duplicate responses
//! fall through as [`Inbound::Ignored`].

use std::{collections::HashMap, fmt, time::Duration};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{config::SyncConfig, Result};

pub const EVENT_CONSOLE_DATA: &str = "console-data";
pub const EVENT_SHOWN: &str = "shown";
pub const EVENT_HIDDEN: &str = "hidden";

/// Wire envelope shared by both directions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Envelope {
    pub fn from_json(raw: &str) -> Result<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Requests the trainer sends to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HostAction {
    Init,
    StartDataStream,
    ReadCode,
    WriteCode,
}

impl HostAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            HostAction::Init => "init",
            HostAction::StartDataStream => "start-data-stream",
            HostAction::ReadCode => "read-code",
            HostAction::WriteCode => "write-code",
        }
    }
}

impl fmt::Display for HostAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generated code plus the serialized catalog, as written to and read back
/// from the host.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CodeState {
    pub code: String,
    pub serialized_state: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleData {
    #[serde(default)]
    pub simulator_origin: bool,
    #[serde(default)]
    pub payload: String,
}

/// Unsolicited notifications from the host.
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    ConsoleData(ConsoleData),
    Shown,
    Hidden,
}

/// Classification of one inbound envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Event(HostEvent),
    Response {
        action: HostAction,
        body: Option<Value>,
    },
    Ignored,
}

/// A request that has been sent and not yet answered.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRequest {
    pub action: HostAction,
    pub body: Option<Value>,
    pub sent_at: Duration,
    /// Zero for the first send, incremented on each retry.
    pub attempt: u32,
}

#[derive(Debug)]
pub struct SyncChannel {
    channel: String,
    ext_id: String,
    timeout: Duration,
    max_retries: u32,
    next_id: u64,
    pending: HashMap<String, PendingRequest>,
}

impl SyncChannel {
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            channel: config.channel.clone(),
            ext_id: config.ext_id.clone(),
            timeout: Duration::from_millis(config.request_timeout_ms),
            max_retries: config.max_retries,
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Registers a new request and returns the envelope to transmit.
    pub fn send_request(
        &mut self,
        action: HostAction,
        body: Option<Value>,
        now: Duration,
    ) -> Envelope {
        self.dispatch(PendingRequest {
            action,
            body,
            sent_at: now,
            attempt: 0,
        })
    }

    /// Re-sends an expired request under a fresh id, or returns `None` once
    /// its retries are used up.
    pub fn retry(&mut self, expired: PendingRequest, now: Duration) -> Option<Envelope> {
        if expired.attempt >= self.max_retries {
            return None;
        }
        Some(self.dispatch(PendingRequest {
            sent_at: now,
            attempt: expired.attempt + 1,
            ..expired
        }))
    }

    /// Removes and returns every request that has waited past the timeout.
    pub fn expire(&mut self, now: Duration) -> Vec<PendingRequest> {
        let timeout = self.timeout;
        let expired_ids: Vec<String> = self
            .pending
            .iter()
            .filter(|(_, request)| now.saturating_sub(request.sent_at) >= timeout)
            .map(|(id, _)| id.clone())
            .collect();

        let mut expired: Vec<PendingRequest> = expired_ids
            .iter()
            .filter_map(|id| self.pending.remove(id))
            .collect();
        expired.sort_by_key(|request| request.sent_at);
        for request in &expired {
            warn!(action = %request.action, attempt = request.attempt, "host request timed out");
        }
        expired
    }

    /// When the oldest outstanding request will time out.
    pub fn next_deadline(&self) -> Option<Duration> {
        self.pending
            .values()
            .map(|request| request.sent_at + self.timeout)
            .min()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drops every outstanding request; their responses will be ignored.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    pub fn classify(&mut self, envelope: &Envelope) -> Result<Inbound> {
        if envelope.kind != self.channel {
            debug!(kind = %envelope.kind, "ignoring message for another channel");
            return Ok(Inbound::Ignored);
        }

        if let Some(event) = envelope.event.as_deref() {
            return Ok(match event {
                EVENT_CONSOLE_DATA => {
                    let body = envelope.body.clone().unwrap_or(Value::Null);
                    Inbound::Event(HostEvent::ConsoleData(serde_json::from_value(body)?))
                }
                EVENT_SHOWN => Inbound::Event(HostEvent::Shown),
                EVENT_HIDDEN => Inbound::Event(HostEvent::Hidden),
                other => {
                    warn!(event = other, "unknown host event");
                    Inbound::Ignored
                }
            });
        }

        let Some(id) = envelope.id.as_deref() else {
            debug!("ignoring envelope without event or id");
            return Ok(Inbound::Ignored);
        };
        match self.pending.remove(id) {
            Some(request) => Ok(Inbound::Response {
                action: request.action,
                body: envelope.body.clone(),
            }),
            None => {
                debug!(id, "ignoring stale or duplicate response");
                Ok(Inbound::Ignored)
            }
        }
    }

    fn dispatch(&mut self, request: PendingRequest) -> Envelope {
        let id = self.next_id.to_string();
        self.next_id += 1;

        let envelope = Envelope {
            kind: self.channel.clone(),
            action: Some(request.action.as_str().to_string()),
            event: None,
            ext_id: Some(self.ext_id.clone()),
            response: Some(true),
            id: Some(id.clone()),
            body: request.body.clone(),
        };
        self.pending.insert(id, request);
        envelope
    }
}

/// Extracts the stored code and catalog from a `read-code` response body,
/// which nests them under `response`.
pub fn parse_read_code(body: Option<&Value>) -> Result<Option<CodeState>> {
    match body.and_then(|body| body.get("response")) {
        None | Some(Value::Null) => Ok(None),
        Some(state) => Ok(Some(serde_json::from_value(state.clone())?)),
    }
}
