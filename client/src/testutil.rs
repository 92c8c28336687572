//! In-memory fakes for the backend and socket seams.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use std::sync::Arc;

use arena_protocol::{ChatMessage, MessageKind, TokenPair, UserProfile};
use async_trait::async_trait;
use reqwest::Url;
use tokio::sync::{Semaphore, mpsc, oneshot, watch};

use crate::api::{ApiError, Backend};
use crate::auth::Registration;
use crate::connection::{Outbound, SocketConnector, SocketEvent, SocketHandle, TransportError};
use crate::lock;
use crate::room::RoomId;
use crate::storage::Credential;

type Deferred<T> = oneshot::Sender<Result<T, ApiError>>;

enum Reply<T> {
    Ready(Result<T, ApiError>),
    Deferred(oneshot::Receiver<Result<T, ApiError>>),
}

impl<T> Reply<T> {
    async fn resolve(self) -> Result<T, ApiError> {
        match self {
            Self::Ready(result) => result,
            Self::Deferred(rx) => rx.await.unwrap_or_else(|_| Err(status(503, "abandoned"))),
        }
    }
}

pub(crate) fn status(status: u16, message: &str) -> ApiError {
    ApiError::Status {
        status,
        message: message.to_string(),
    }
}

pub(crate) fn alice() -> UserProfile {
    UserProfile {
        id: 1,
        username: "alice".to_string(),
        email: "a@x.com".to_string(),
        is_staff: false,
        is_superuser: false,
    }
}

pub(crate) fn chat(sender: &str, text: &str) -> ChatMessage {
    ChatMessage {
        sender: Some(sender.to_string()),
        text: text.to_string(),
        is_admin_sender: false,
        kind: MessageKind::Chat,
        timestamp: None,
    }
}

/// Inbound frame as the room gateway broadcasts it.
pub(crate) fn frame(sender: &str, text: &str) -> String {
    serde_json::json!({
        "type": "chat_message",
        "message": text,
        "sender": sender,
        "is_admin": false,
        "msg_type": "chat",
    })
    .to_string()
}

pub(crate) fn texts(messages: &[ChatMessage]) -> Vec<String> {
    messages.iter().map(|m| m.text.clone()).collect()
}

pub(crate) async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, predicate: F)
where
    F: FnMut(&T) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(predicate))
        .await
        .expect("timed out waiting for state")
        .expect("watch sender dropped");
}

/// Let spawned tasks run until they block.
pub(crate) async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// Log sink for asserting on diagnostics.
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&lock(&self.0)).into_owned()
    }
}

impl std::io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        lock(&self.0).extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogBuffer {
    type Writer = LogBuffer;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Route debug-level logs on this thread into a buffer until the guard drops.
pub(crate) fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let logs = LogBuffer::default();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(logs.clone())
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    profiles: Mutex<VecDeque<Reply<UserProfile>>>,
    histories: Mutex<HashMap<String, VecDeque<Reply<Vec<ChatMessage>>>>>,
    tokens: Mutex<VecDeque<Result<TokenPair, ApiError>>>,
    profile_calls: AtomicUsize,
    history_calls: AtomicUsize,
}

impl FakeBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_profile(&self, result: Result<UserProfile, ApiError>) {
        lock(&self.profiles).push_back(Reply::Ready(result));
    }

    pub fn defer_profile(&self) -> Deferred<UserProfile> {
        let (tx, rx) = oneshot::channel();
        lock(&self.profiles).push_back(Reply::Deferred(rx));
        tx
    }

    pub fn push_history(&self, room: &str, result: Result<Vec<ChatMessage>, ApiError>) {
        lock(&self.histories)
            .entry(room.to_string())
            .or_default()
            .push_back(Reply::Ready(result));
    }

    pub fn defer_history(&self, room: &str) -> Deferred<Vec<ChatMessage>> {
        let (tx, rx) = oneshot::channel();
        lock(&self.histories)
            .entry(room.to_string())
            .or_default()
            .push_back(Reply::Deferred(rx));
        tx
    }

    pub fn push_tokens(&self, result: Result<TokenPair, ApiError>) {
        lock(&self.tokens).push_back(result);
    }

    pub fn profile_calls(&self) -> usize {
        self.profile_calls.load(Ordering::SeqCst)
    }

    pub fn history_calls(&self) -> usize {
        self.history_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn fetch_profile(&self, _credential: &Credential) -> Result<UserProfile, ApiError> {
        self.profile_calls.fetch_add(1, Ordering::SeqCst);
        let reply = lock(&self.profiles).pop_front();
        match reply {
            Some(reply) => reply.resolve().await,
            None => Err(status(500, "no profile reply queued")),
        }
    }

    async fn fetch_room_history(
        &self,
        room: &RoomId,
        _credential: &Credential,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        let reply = lock(&self.histories)
            .get_mut(room.as_str())
            .and_then(VecDeque::pop_front);
        match reply {
            Some(reply) => reply.resolve().await,
            None => Ok(Vec::new()),
        }
    }

    async fn exchange_password(
        &self,
        _username: &str,
        _password: &str,
    ) -> Result<TokenPair, ApiError> {
        lock(&self.tokens)
            .pop_front()
            .unwrap_or_else(|| Err(status(401, "Invalid username or password")))
    }

    async fn register(&self, _registration: &Registration) -> Result<TokenPair, ApiError> {
        lock(&self.tokens)
            .pop_front()
            .unwrap_or_else(|| Err(status(400, "Username already exists")))
    }
}

/// The server side of a fake socket.
pub(crate) struct ServerEnd {
    pub url: Url,
    pub from_client: mpsc::UnboundedReceiver<Outbound>,
    pub to_client: mpsc::UnboundedSender<SocketEvent>,
}

impl ServerEnd {
    pub fn push(&self, event: SocketEvent) {
        let _ = self.to_client.send(event);
    }
}

pub(crate) struct FakeConnector {
    accepted: mpsc::UnboundedSender<ServerEnd>,
    gate: Option<Arc<Semaphore>>,
    failures: Mutex<usize>,
    connects: AtomicUsize,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        Self::build(None)
    }

    /// Each connect waits for one permit on the returned semaphore.
    pub fn gated() -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        let (connector, accepted) = Self::build(Some(gate.clone()));
        (connector, accepted, gate)
    }

    fn build(gate: Option<Arc<Semaphore>>) -> (Arc<Self>, mpsc::UnboundedReceiver<ServerEnd>) {
        let (accepted, accepted_rx) = mpsc::unbounded_channel();
        let connector = Arc::new(Self {
            accepted,
            gate,
            failures: Mutex::new(0),
            connects: AtomicUsize::new(0),
        });
        (connector, accepted_rx)
    }

    pub fn fail_next(&self, count: usize) {
        *lock(&self.failures) = count;
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SocketConnector for FakeConnector {
    async fn connect(&self, url: &Url) -> Result<SocketHandle, TransportError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|_| TransportError::Handshake("gate closed".to_string()))?
                .forget();
        }

        {
            let mut failures = lock(&self.failures);
            if *failures > 0 {
                *failures -= 1;
                return Err(TransportError::Handshake("connection refused".to_string()));
            }
        }

        let (outgoing, from_client) = mpsc::unbounded_channel();
        let (to_client, incoming) = mpsc::unbounded_channel();
        let _ = self.accepted.send(ServerEnd {
            url: url.clone(),
            from_client,
            to_client,
        });

        Ok(SocketHandle { outgoing, incoming })
    }
}
