use serde::Serialize;

use crate::MessageKind;

/// A chat message the client sends over a room socket.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    pub text: String,
    pub kind: MessageKind,
}

#[derive(Serialize)]
struct WireOutgoing<'a> {
    message: &'a str,
    #[serde(rename = "type")]
    kind: &'a str,
}

impl OutgoingMessage {
    pub fn chat(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            kind: MessageKind::Chat,
        }
    }

    /// Serialize to wire format: {"message": TEXT, "type": KIND}
    pub fn to_wire_format(&self) -> String {
        let wire = WireOutgoing {
            message: &self.text,
            kind: self.kind.as_wire_tag(),
        };
        // A struct of two string fields always serializes.
        serde_json::to_string(&wire).unwrap_or_default()
    }
}
