use std::sync::Arc;

use arena_protocol::{MessageKind, OutgoingMessage};

use crate::channel::ChannelShared;

/// Result of a send attempt. Rejections are normal UI states, not errors.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Handed to the socket. The message shows up once the server echoes it.
    Sent,
    /// Text was empty or whitespace only.
    EmptyText,
    /// The channel is not open (still connecting, closed, or retired).
    NotOpen,
}

impl SendOutcome {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent)
    }
}

/// Cloneable handle for sending messages to one room.
///
/// This can be passed to input tasks and cloned freely. It never appends to
/// the transcript itself.
#[derive(Clone)]
pub struct Sender {
    shared: Arc<ChannelShared>,
}

impl Sender {
    pub(crate) fn new(shared: Arc<ChannelShared>) -> Self {
        Self { shared }
    }

    /// Send a chat message
    pub fn send(&self, text: &str) -> SendOutcome {
        self.send_kind(text, MessageKind::Chat)
    }

    /// Send a message with an explicit kind, e.g. a winner announcement
    pub fn send_kind(&self, text: &str, kind: MessageKind) -> SendOutcome {
        if text.trim().is_empty() {
            tracing::warn!(room = %self.shared.room_id, "Ignoring empty chat message");
            return SendOutcome::EmptyText;
        }

        self.shared.send(OutgoingMessage {
            text: text.to_string(),
            kind,
        })
    }
}
