use arena_protocol::ChatMessage;

use crate::room::{ConnectionStatus, RoomId};

/// Observer for room channel events.
///
/// All methods have default no-op implementations, so you only need to
/// implement the events you care about. Events are only delivered while the
/// channel is the current one for its room; nothing arrives after `close()`.
///
/// Methods run on the channel's background tasks and should return quickly.
///
/// # Example
///
/// ```ignore
/// struct Printer;
///
/// impl ChannelHandler for Printer {
///     fn on_message(&self, room: &RoomId, message: &ChatMessage) {
///         println!("[{room}] {}", message.text);
///     }
/// }
/// ```
pub trait ChannelHandler: Send + Sync {
    /// Called when the connection changes state.
    fn on_status(&self, room: &RoomId, status: ConnectionStatus) {
        let _ = (room, status);
    }

    /// Called once when history has been prepended to the transcript.
    fn on_history(&self, room: &RoomId, messages: &[ChatMessage]) {
        let _ = (room, messages);
    }

    /// Called for each live message appended to the transcript.
    fn on_message(&self, room: &RoomId, message: &ChatMessage) {
        let _ = (room, message);
    }
}
