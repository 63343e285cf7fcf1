use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::hub::ClientId;

/// Wire envelope used in both directions.
///
/// An empty `channel` means the message is a global broadcast; a non-empty
/// one restricts delivery to subscribers of exactly that channel. Empty
/// optional fields are left off the wire and unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub event: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
}

impl Message {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            ..Default::default()
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn is_global(&self) -> bool {
        self.channel.is_empty()
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            kind: "error".to_string(),
            error: text.into(),
            ..Default::default()
        }
    }

    /// Handshake completion signal sent right after registration
    pub fn connected(client_id: &ClientId) -> Self {
        Self::new("connected").with_data(json!({
            "clientId": client_id,
            "timestamp": Utc::now().timestamp(),
            "message": "Connected to API",
        }))
    }

    pub fn subscribed(channel: &str) -> Self {
        Self::new("subscribed").with_data(json!({ "channel": channel }))
    }

    pub fn unsubscribed(channel: &str) -> Self {
        Self::new("unsubscribed").with_data(json!({ "channel": channel }))
    }

    pub fn pong() -> Self {
        Self::new("pong").with_data(json!({ "timestamp": Utc::now().timestamp() }))
    }

    pub fn echo(data: Option<Value>) -> Self {
        Self {
            kind: "echo".to_string(),
            data,
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
