use std::sync::Arc;

use arena_protocol::parse_chat_frame;
use reqwest::Url;

use crate::channel::ChannelShared;
use crate::connection::{BackoffPolicy, SocketConnector, SocketEvent, SocketHandle};
use crate::room::ConnectionStatus;

/// How one socket session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SocketEnd {
    /// The channel was closed or replaced while the socket was live.
    Retired,
    Closed,
    Failed,
}

impl SocketEnd {
    fn status(self) -> Option<ConnectionStatus> {
        match self {
            Self::Retired => None,
            Self::Closed => Some(ConnectionStatus::Closed),
            Self::Failed => Some(ConnectionStatus::Failed),
        }
    }
}

/// Connect, pump inbound frames into the transcript, and optionally reconnect.
///
/// The URL carries the credential, so it is never logged.
pub(crate) async fn run(
    shared: Arc<ChannelShared>,
    connector: Arc<dyn SocketConnector>,
    url: Url,
    reconnect: Option<BackoffPolicy>,
) {
    let mut retries = reconnect.as_ref().map(BackoffPolicy::delays);

    loop {
        let end = match connector.connect(&url).await {
            Ok(socket) => {
                let end = pump(&shared, socket).await;
                if end != SocketEnd::Retired {
                    // The socket did open, so the next outage gets a fresh budget.
                    retries = reconnect.as_ref().map(BackoffPolicy::delays);
                }
                end
            }
            Err(e) if shared.is_current() => {
                tracing::error!(room = %shared.room_id, error = %e, "Failed to connect to room socket");
                SocketEnd::Failed
            }
            Err(_) => SocketEnd::Retired,
        };

        let Some(status) = end.status() else {
            return;
        };

        let Some(delay) = retries.as_mut().and_then(Iterator::next) else {
            shared.set_status(status);
            return;
        };

        tracing::warn!(room = %shared.room_id, ?delay, ?status, "Room socket down, reconnecting");
        if !shared.set_status(ConnectionStatus::Connecting) {
            return;
        }
        tokio::time::sleep(delay).await;
        if !shared.is_current() {
            return;
        }
    }
}

async fn pump(shared: &ChannelShared, socket: SocketHandle) -> SocketEnd {
    let SocketHandle {
        outgoing,
        mut incoming,
    } = socket;

    if !shared.attach(outgoing) {
        return SocketEnd::Retired;
    }
    tracing::info!(room = %shared.room_id, "Room socket open");

    let end = loop {
        let Some(event) = incoming.recv().await else {
            break SocketEnd::Closed;
        };

        match event {
            SocketEvent::Text(text) => match parse_chat_frame(&text) {
                Ok(message) => {
                    if !shared.push_live(message) {
                        tracing::debug!(room = %shared.room_id, "Discarding frame for retired channel");
                        break SocketEnd::Retired;
                    }
                }
                Err(e) => {
                    tracing::warn!(room = %shared.room_id, error = %e, "Dropping unparseable chat frame");
                }
            },
            SocketEvent::Closed => {
                tracing::info!(room = %shared.room_id, "Room socket closed by server");
                break SocketEnd::Closed;
            }
            SocketEvent::Error(e) => {
                tracing::error!(room = %shared.room_id, error = %e, "Room socket error");
                break SocketEnd::Failed;
            }
        }
    };

    shared.detach();
    if shared.is_current() { end } else { SocketEnd::Retired }
}
