//! Control surface consumed between ticks.
//!
//! Messages are JSON objects keyed by `type`:
//! `{"type":"override","value":2.5}`, `{"type":"auto"}`, `{"type":"shock"}`.
//! Anything else is dropped without reaching the engine.

use serde::Serialize;
use serde_json::Value;
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::debug;

/// A parsed control instruction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Pin the price multiplier to `value`.
    Override { value: f64 },
    /// Hand the price back to the policy.
    Auto,
    /// Inject an enterprise demand shock on the next tick.
    Shock,
}

impl ControlMessage {
    /// Parse a wire message. Returns `None` for malformed JSON, unknown
    /// types and override values that are not finite numbers.
    pub fn parse(text: &str) -> Option<Self> {
        let msg: Value = serde_json::from_str(text).ok()?;
        match msg.get("type")?.as_str()? {
            "override" => {
                let value = match msg.get("value")? {
                    Value::Number(n) => n.as_f64()?,
                    Value::String(s) => s.trim().parse::<f64>().ok()?,
                    _ => return None,
                };
                value
                    .is_finite()
                    .then_some(ControlMessage::Override { value })
            }
            "auto" => Some(ControlMessage::Auto),
            "shock" => Some(ControlMessage::Shock),
            _ => None,
        }
    }

    pub fn to_json(&self) -> String {
        // A unit/struct enum of plain numbers always serialises.
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Cloneable sender into a session's control inbox.
///
/// Used both by the streaming channel and by out-of-band administrative
/// callers; messages are applied in arrival order at the start of a tick.
#[derive(Clone, Debug)]
pub struct ControlHandle {
    tx: Sender<ControlMessage>,
}

impl ControlHandle {
    /// Queue a message. Returns false once the session is gone.
    pub fn send(&self, msg: ControlMessage) -> bool {
        self.tx.send(msg).is_ok()
    }

    /// Parse and queue a raw wire message; malformed input is ignored.
    pub fn send_raw(&self, text: &str) -> bool {
        match ControlMessage::parse(text) {
            Some(msg) => self.send(msg),
            None => {
                debug!(len = text.len(), "ignoring malformed control message");
                false
            }
        }
    }

    /// Administrative shock trigger.
    pub fn trigger_shock(&self) -> bool {
        self.send(ControlMessage::Shock)
    }

    pub fn engage_override(&self, price: f64) -> bool {
        self.send(ControlMessage::Override { value: price })
    }

    pub fn release_override(&self) -> bool {
        self.send(ControlMessage::Auto)
    }
}

/// Create a connected handle/inbox pair.
pub fn control_channel() -> (ControlHandle, Receiver<ControlMessage>) {
    let (tx, rx) = mpsc::channel();
    (ControlHandle { tx }, rx)
}
