mod account;

pub use account::{TokenPair, UserProfile};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::ParseError;

/// How a chat message should be presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    #[default]
    Chat,
    /// System-originated result announcement.
    Winner,
}

impl MessageKind {
    /// Unknown tags fall back to `Chat`.
    pub fn from_wire_tag(tag: &str) -> Self {
        match tag {
            "winner" => Self::Winner,
            _ => Self::Chat,
        }
    }

    pub fn as_wire_tag(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Winner => "winner",
        }
    }
}

/// One message in a room transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub sender: Option<String>,
    pub text: String,
    pub is_admin_sender: bool,
    pub kind: MessageKind,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    /// Winner announcements carry no sender identity requirement.
    pub fn is_announcement(&self) -> bool {
        self.kind == MessageKind::Winner
    }

    /// Label shown next to the message, `None` for announcements.
    pub fn display_name(&self) -> Option<&str> {
        if self.is_announcement() {
            None
        } else if self.is_admin_sender {
            Some("Admin")
        } else {
            self.sender.as_deref()
        }
    }
}

#[derive(Deserialize)]
struct WireChatMessage {
    #[serde(default)]
    sender: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    is_admin: Option<bool>,
    #[serde(default)]
    msg_type: Option<String>,
    #[serde(default)]
    created_at: Option<String>,
}

/// Parse a single inbound socket frame into a chat message
pub fn parse_chat_frame(frame: &str) -> Result<ChatMessage, ParseError> {
    if frame.trim().is_empty() {
        return Err(ParseError::EmptyMessage);
    }

    let value: Value = serde_json::from_str(frame)?;
    parse_chat_value(value)
}

/// Parse an already-decoded JSON message object
pub fn parse_chat_value(value: Value) -> Result<ChatMessage, ParseError> {
    if !value.is_object() {
        return Err(ParseError::InvalidFormat(
            "chat message must be a JSON object".to_string(),
        ));
    }

    let wire: WireChatMessage = serde_json::from_value(value)?;
    let text = wire
        .message
        .ok_or_else(|| ParseError::MissingField("message".to_string()))?;

    let timestamp = wire
        .created_at
        .as_deref()
        .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
        .map(|ts| ts.with_timezone(&Utc));

    Ok(ChatMessage {
        sender: wire.sender,
        text,
        is_admin_sender: wire.is_admin.unwrap_or(false),
        kind: wire
            .msg_type
            .as_deref()
            .map(MessageKind::from_wire_tag)
            .unwrap_or_default(),
        timestamp,
    })
}

/// Parse a room history response body.
///
/// A body that is not an array is treated as an empty history. Entries are
/// returned in delivery order (oldest first) so the caller can skip and log
/// the ones that fail to parse.
pub fn parse_history(body: Value) -> Vec<Result<ChatMessage, ParseError>> {
    match body {
        Value::Array(entries) => entries.into_iter().map(parse_chat_value).collect(),
        _ => Vec::new(),
    }
}
