//! Control message envelope and its JSON wire codec.
//!
//! On the wire every message is one JSON object:
//!
//! ```text
//! {"msg_type": "cmd", "msg_val": "configure", "id": 7,
//!  "params": {"xsp": {"num_cards": 4}}, "timestamp": "2025-01-01T12:00:00.000000"}
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{AsRefStr, Display, EnumString};

use crate::{Error, Result};

pub type Params = serde_json::Map<String, Value>;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MsgType {
    Cmd,
    Ack,
    #[serde(alias = "nak")]
    #[strum(to_string = "nack", serialize = "nak")]
    Nack,
}

/// What an outbound message is for; follows from its verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum MessageKind {
    Cmd,
    Config,
    Request,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, AsRefStr, Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Verb {
    Configure,
    RequestConfiguration,
    Connect,
    Disconnect,
    Save,
    Restore,
    Start,
    Stop,
    Trigger,
}

impl Verb {
    pub const COMMANDS: [Verb; 7] = [
        Verb::Connect,
        Verb::Disconnect,
        Verb::Save,
        Verb::Restore,
        Verb::Start,
        Verb::Stop,
        Verb::Trigger,
    ];

    pub fn kind(self) -> MessageKind {
        match self {
            Verb::Configure => MessageKind::Config,
            Verb::RequestConfiguration => MessageKind::Request,
            _ => MessageKind::Cmd,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub msg_type: MsgType,
    pub verb: Verb,
    pub id: u32,
    pub params: Params,
}

impl Message {
    pub fn new(msg_type: MsgType, verb: Verb, params: Params) -> Self {
        Self {
            msg_type,
            verb,
            id: 0,
            params,
        }
    }

    /// Bare command, e.g. `start`. Carries no state.
    pub fn command(verb: Verb) -> Self {
        debug_assert_eq!(verb.kind(), MessageKind::Cmd, "{verb} is not a command verb");
        Self::new(MsgType::Cmd, verb, Params::new())
    }

    pub fn config(params: Params) -> Self {
        Self::new(MsgType::Cmd, Verb::Configure, params)
    }

    pub fn request() -> Self {
        Self::new(MsgType::Cmd, Verb::RequestConfiguration, Params::new())
    }

    pub fn ack(verb: Verb, id: u32, params: Params) -> Self {
        Self::new(MsgType::Ack, verb, params).with_id(id)
    }

    pub fn nack(verb: Verb, id: u32, reason: impl Into<String>) -> Self {
        let mut params = Params::new();
        params.insert("error".to_string(), Value::String(reason.into()));
        Self::new(MsgType::Nack, verb, params).with_id(id)
    }

    pub fn with_id(mut self, id: u32) -> Self {
        self.id = id;
        self
    }

    pub fn kind(&self) -> MessageKind {
        self.verb.kind()
    }

    pub fn is_reply(&self) -> bool {
        matches!(self.msg_type, MsgType::Ack | MsgType::Nack)
    }

    /// The `error` param of a nack, if any.
    pub fn error(&self) -> Option<&str> {
        self.params.get("error").and_then(Value::as_str)
    }
}

#[derive(Serialize, Deserialize)]
struct WireMessage {
    msg_type: MsgType,
    msg_val: Verb,
    id: u32,
    #[serde(default)]
    params: Option<Params>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

pub fn encode(msg: &Message) -> Result<Vec<u8>> {
    let wire = WireMessage {
        msg_type: msg.msg_type,
        msg_val: msg.verb,
        id: msg.id,
        params: Some(msg.params.clone()),
        timestamp: Some(chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()),
    };
    Ok(serde_json::to_vec(&wire)?)
}

/// Decode one frame. Any structural problem is a [`Error::Protocol`].
pub fn decode(bytes: &[u8]) -> Result<Message> {
    let wire: WireMessage = serde_json::from_slice(bytes)
        .map_err(|e| Error::protocol(format!("malformed message: {e}")))?;
    Ok(Message {
        msg_type: wire.msg_type,
        verb: wire.msg_val,
        id: wire.id,
        params: wire.params.unwrap_or_default(),
    })
}
