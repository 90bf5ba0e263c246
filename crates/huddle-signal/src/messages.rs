//! Signal protocol messages
//!
//! Every WebSocket frame carries one JSON object. Only the `action` tag is
//! interpreted; `offer`, `answer` and `candidate` are opaque and forwarded
//! untouched. Unknown top-level fields are dropped.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Action tag marking the sender as in a call
pub const CALL_STARTED: &str = "call_started";

/// Action tag marking the sender's call as finished
pub const CALL_ENDED: &str = "call_ended";

/// Wire shape of a signaling frame
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Action tag; empty strings decode as absent
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "non_empty"
    )]
    pub action: Option<String>,

    /// SDP offer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offer: Option<Value>,

    /// SDP answer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answer: Option<Value>,

    /// ICE candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub candidate: Option<Value>,
}

fn non_empty<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.filter(|s| !s.is_empty()))
}

impl Envelope {
    /// Parse from JSON.
    ///
    /// A bare `null` is the empty envelope; arrays and scalars are rejected.
    pub fn from_json(frame: &[u8]) -> Result<Self, CodecError> {
        let value: Value = serde_json::from_slice(frame)?;
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => Ok(serde_json::from_value(value)?),
            _ => Err(CodecError::NotAnObject),
        }
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Envelope carrying only an action tag
    pub fn action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Self::default()
        }
    }
}

/// A decoded frame, classified by what the relay does with it
#[derive(Clone, Debug, PartialEq)]
pub enum Signal {
    /// Sender entered a call
    CallStarted,

    /// Sender left a call
    CallEnded,

    /// Anything else: forwarded unchanged to every other peer
    Relay(Envelope),
}

impl Signal {
    /// Decode one inbound frame
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        Envelope::from_json(frame).map(Self::from)
    }
}

impl From<Envelope> for Signal {
    fn from(envelope: Envelope) -> Self {
        match envelope.action.as_deref() {
            Some(CALL_STARTED) => Signal::CallStarted,
            Some(CALL_ENDED) => Signal::CallEnded,
            _ => Signal::Relay(envelope),
        }
    }
}

/// Frame codec errors
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("frame is not a JSON object")]
    NotAnObject,
}
