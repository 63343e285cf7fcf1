//! Control protocol spoken by clients over their connection

use serde_json::Value;

use super::Message;

/// Reasons an inbound frame is rejected. The display text is sent back to
/// the client verbatim.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Invalid message format")]
    InvalidFormat(#[source] serde_json::Error),

    #[error("Channel name required")]
    ChannelRequired,
}

/// A decoded control command
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Subscribe(String),
    Unsubscribe(String),
    Ping,
    /// Any other message type; its payload is sent back unchanged
    Echo(Option<Value>),
}

impl Command {
    /// Decode a raw frame (text or binary) into a command
    pub fn decode(frame: &[u8]) -> Result<Self, ProtocolError> {
        let message: Message =
            serde_json::from_slice(frame).map_err(ProtocolError::InvalidFormat)?;
        Self::from_message(message)
    }

    pub fn from_message(message: Message) -> Result<Self, ProtocolError> {
        match message.kind.as_str() {
            "subscribe" => required_channel(message.channel).map(Self::Subscribe),
            "unsubscribe" => required_channel(message.channel).map(Self::Unsubscribe),
            "ping" => Ok(Self::Ping),
            _ => Ok(Self::Echo(message.data)),
        }
    }

    /// Reply delivered to the sender only
    pub fn response(&self) -> Message {
        match self {
            Self::Subscribe(channel) => Message::subscribed(channel),
            Self::Unsubscribe(channel) => Message::unsubscribed(channel),
            Self::Ping => Message::pong(),
            Self::Echo(data) => Message::echo(data.clone()),
        }
    }
}

fn required_channel(channel: String) -> Result<String, ProtocolError> {
    if channel.is_empty() {
        Err(ProtocolError::ChannelRequired)
    } else {
        Ok(channel)
    }
}
