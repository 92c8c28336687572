use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use reqwest::Url;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};

use crate::room::RoomId;
use crate::storage::Credential;

/// Bounded exponential backoff.
#[derive(Debug, Clone, PartialEq)]
pub struct BackoffPolicy {
    pub max_attempts: usize,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl BackoffPolicy {
    /// Delay before each retry, `max_attempts` items long.
    pub fn delays(&self) -> impl Iterator<Item = Duration> + Send + use<> {
        let multiplier = self.backoff_multiplier;
        let max_delay = self.max_delay;
        std::iter::successors(Some(self.initial_delay.min(max_delay)), move |delay| {
            Some(Duration::from_secs_f64(delay.as_secs_f64() * multiplier).min(max_delay))
        })
        .take(self.max_attempts)
    }
}

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("WebSocket handshake failed: {0}")]
    Handshake(String),

    #[error("timed out after {0:?} connecting to room socket")]
    Timeout(Duration),

    #[error("invalid socket URL: {0}")]
    InvalidUrl(String),
}

/// Frames the client pushes to the socket.
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Text(String),
    Close,
}

/// Events the socket reports back.
#[derive(Debug, Clone, PartialEq)]
pub enum SocketEvent {
    Text(String),
    Closed,
    Error(String),
}

/// One open bidirectional connection.
///
/// Dropping `outgoing` closes the connection.
#[derive(Debug)]
pub struct SocketHandle {
    pub outgoing: mpsc::UnboundedSender<Outbound>,
    pub incoming: mpsc::UnboundedReceiver<SocketEvent>,
}

/// Opens raw sockets. Implemented over tokio-tungstenite, and by in-memory
/// fakes in tests.
#[async_trait]
pub trait SocketConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<SocketHandle, TransportError>;
}

/// Build the socket URL for a room.
///
/// The credential travels as the `token` query parameter since the socket
/// handshake cannot carry custom headers.
pub fn room_socket_url(
    base: &Url,
    room: &RoomId,
    credential: &Credential,
) -> Result<Url, TransportError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| TransportError::InvalidUrl(base.to_string()))?
        .pop_if_empty()
        .extend(["ws", "room", room.as_str(), ""]);
    url.query_pairs_mut()
        .clear()
        .append_pair("token", credential.as_str());
    Ok(url)
}

/// tokio-tungstenite backed connector.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector {
    connect_timeout: Option<Duration>,
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Option<Duration>) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &Url) -> Result<SocketHandle, TransportError> {
        let handshake = connect_async(url.as_str());
        let result = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, handshake)
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => handshake.await,
        };
        let (ws, _response) = result.map_err(|e| TransportError::Handshake(e.to_string()))?;

        let (mut ws_write, mut ws_read) = ws.split();
        let (outgoing, mut outgoing_rx) = mpsc::unbounded_channel::<Outbound>();
        let (incoming_tx, incoming) = mpsc::unbounded_channel::<SocketEvent>();
        let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<Message>();

        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    outbound = outgoing_rx.recv() => match outbound {
                        Some(Outbound::Text(text)) => Message::Text(text.into()),
                        Some(Outbound::Close) | None => {
                            let _ = ws_write.send(Message::Close(None)).await;
                            break;
                        }
                    },
                    Some(pong) = pong_rx.recv() => pong,
                };

                if let Err(e) = ws_write.send(message).await {
                    tracing::debug!(error = %e, "Socket write failed");
                    break;
                }
            }
        });

        tokio::spawn(async move {
            while let Some(message) = ws_read.next().await {
                let event = match message {
                    Ok(Message::Text(text)) => SocketEvent::Text(text.to_string()),
                    Ok(Message::Ping(data)) => {
                        let _ = pong_tx.send(Message::Pong(data));
                        continue;
                    }
                    Ok(Message::Close(_)) => SocketEvent::Closed,
                    Ok(_) => continue,
                    Err(e) => SocketEvent::Error(e.to_string()),
                };

                let done = !matches!(event, SocketEvent::Text(_));
                if incoming_tx.send(event).is_err() || done {
                    return;
                }
            }
            let _ = incoming_tx.send(SocketEvent::Closed);
        });

        Ok(SocketHandle { outgoing, incoming })
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpListener;

    use super::*;

    #[test]
    fn backoff_is_bounded_and_capped() {
        let policy = BackoffPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
        };
        let delays: Vec<u128> = policy.delays().map(|d| d.as_millis()).collect();

        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
    }

    #[test]
    fn zero_attempts_never_retries() {
        let policy = BackoffPolicy {
            max_attempts: 0,
            ..BackoffPolicy::default()
        };
        assert_eq!(policy.delays().count(), 0);
    }

    #[test]
    fn socket_url_carries_token() {
        let base = Url::parse("wss://arena.example.com").unwrap();
        let url = room_socket_url(
            &base,
            &RoomId::new("3f2a-77"),
            &Credential::new("tok.en"),
        )
        .unwrap();

        assert_eq!(
            url.as_str(),
            "wss://arena.example.com/ws/room/3f2a-77/?token=tok.en"
        );
    }

    #[test]
    fn socket_url_keeps_base_path() {
        let base = Url::parse("ws://localhost:8000/backend/").unwrap();
        let url = room_socket_url(&base, &RoomId::new("r1"), &Credential::new("t")).unwrap();

        assert_eq!(url.path(), "/backend/ws/room/r1/");
    }

    #[test]
    fn socket_url_escapes_room_id() {
        let base = Url::parse("ws://localhost:8000").unwrap();
        let url = room_socket_url(&base, &RoomId::new("a/b"), &Credential::new("t")).unwrap();

        assert_eq!(url.path(), "/ws/room/a%2Fb/");
    }

    #[tokio::test]
    async fn tungstenite_echo_and_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

            let first = ws.next().await.unwrap().unwrap();
            ws.send(first).await.unwrap();

            let mut saw_close = false;
            while let Some(Ok(message)) = ws.next().await {
                if message.is_close() {
                    saw_close = true;
                    break;
                }
            }
            saw_close
        });

        let url = Url::parse(&format!("ws://{addr}/ws/room/r1/?token=t")).unwrap();
        let mut socket = TungsteniteConnector::new(Some(Duration::from_secs(5)))
            .connect(&url)
            .await
            .unwrap();

        socket
            .outgoing
            .send(Outbound::Text(r#"{"message":"hi","type":"chat"}"#.to_string()))
            .unwrap();

        match socket.incoming.recv().await {
            Some(SocketEvent::Text(text)) => assert_eq!(text, r#"{"message":"hi","type":"chat"}"#),
            other => panic!("unexpected event: {other:?}"),
        }

        socket.outgoing.send(Outbound::Close).unwrap();
        assert!(server.await.unwrap());
    }

    #[tokio::test]
    async fn refused_connection_is_handshake_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/ws/room/r1/?token=t")).unwrap();
        let err = TungsteniteConnector::default().connect(&url).await.unwrap_err();

        assert!(matches!(err, TransportError::Handshake(_)));
    }
}
