//! Room channel: one live connection to one room.
//!
//! Each channel carries a generation drawn from an epoch counter it may share
//! with other channels (see [`crate::RoomView`]). Background task results are
//! applied only while that generation is still the epoch's current value, so
//! a history response or socket frame that lands after `close()` is dropped.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use arena_protocol::{ChatMessage, MessageKind, OutgoingMessage};
use reqwest::Url;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::{ApiClient, Backend};
use crate::config::{ClientConfig, ConfigError};
use crate::connection::{
    BackoffPolicy, Outbound, SocketConnector, TungsteniteConnector, room_socket_url,
};
use crate::handler::ChannelHandler;
use crate::lock;
use crate::receiver;
use crate::room::{ConnectionStatus, RoomId};
use crate::sender::{SendOutcome, Sender};
use crate::storage::Credential;

/// Collaborators a channel needs.
#[derive(Clone)]
pub struct ChannelDeps {
    pub backend: Arc<dyn Backend>,
    pub connector: Arc<dyn SocketConnector>,
    pub socket_base: Url,
}

impl ChannelDeps {
    pub fn from_config(config: &ClientConfig, api: ApiClient) -> Result<Self, ConfigError> {
        Ok(Self {
            backend: Arc::new(api),
            connector: Arc::new(TungsteniteConnector::new(config.request_timeout())),
            socket_base: config.socket_base()?,
        })
    }
}

#[derive(Clone, Default)]
pub struct ChannelOptions {
    /// `None` leaves reconnection to the caller.
    pub reconnect: Option<BackoffPolicy>,
    pub handler: Option<Arc<dyn ChannelHandler>>,
}

pub(crate) struct ChannelShared {
    pub(crate) room_id: RoomId,
    generation: u64,
    epoch: Arc<AtomicU64>,
    transcript: Mutex<Vec<ChatMessage>>,
    outgoing: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
    status: watch::Sender<ConnectionStatus>,
    handler: Option<Arc<dyn ChannelHandler>>,
}

impl ChannelShared {
    pub(crate) fn is_current(&self) -> bool {
        self.epoch.load(Ordering::SeqCst) == self.generation
    }

    pub(crate) fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Returns false, changing nothing, once the channel is retired.
    pub(crate) fn set_status(&self, status: ConnectionStatus) -> bool {
        let applied = self.status.send_if_modified(|current| {
            if !self.is_current() {
                return false;
            }
            *current = status;
            true
        });
        if !applied {
            return false;
        }

        tracing::debug!(room = %self.room_id, ?status, "Room channel status changed");
        if let Some(handler) = &self.handler {
            handler.on_status(&self.room_id, status);
        }
        true
    }

    /// History goes in front of anything that already arrived live.
    pub(crate) fn prepend_history(&self, history: Vec<ChatMessage>) -> bool {
        {
            let mut transcript = lock(&self.transcript);
            if !self.is_current() {
                return false;
            }
            transcript.splice(0..0, history.iter().cloned());
        }

        if let Some(handler) = &self.handler {
            handler.on_history(&self.room_id, &history);
        }
        true
    }

    pub(crate) fn push_live(&self, message: ChatMessage) -> bool {
        {
            let mut transcript = lock(&self.transcript);
            if !self.is_current() {
                return false;
            }
            transcript.push(message.clone());
        }

        if let Some(handler) = &self.handler {
            handler.on_message(&self.room_id, &message);
        }
        true
    }

    /// Take ownership of a freshly opened socket and move to `Open`.
    pub(crate) fn attach(&self, outgoing: mpsc::UnboundedSender<Outbound>) -> bool {
        {
            let mut slot = lock(&self.outgoing);
            if !self.is_current() {
                return false;
            }
            *slot = Some(outgoing);
        }
        self.set_status(ConnectionStatus::Open)
    }

    pub(crate) fn detach(&self) {
        lock(&self.outgoing).take();
    }

    pub(crate) fn send(&self, message: OutgoingMessage) -> SendOutcome {
        if !self.is_current() || !self.status().is_open() {
            tracing::warn!(room = %self.room_id, status = ?self.status(), "Room socket not open, message not sent");
            return SendOutcome::NotOpen;
        }

        let slot = lock(&self.outgoing);
        let Some(outgoing) = slot.as_ref() else {
            tracing::warn!(room = %self.room_id, "Room socket not attached, message not sent");
            return SendOutcome::NotOpen;
        };

        if outgoing.send(Outbound::Text(message.to_wire_format())).is_err() {
            tracing::warn!(room = %self.room_id, "Room socket writer gone, message not sent");
            return SendOutcome::NotOpen;
        }
        SendOutcome::Sent
    }

    /// Advance past this generation and close the socket.
    fn retire(&self) {
        let _ = self.epoch.compare_exchange(
            self.generation,
            self.generation + 1,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
        if let Some(outgoing) = lock(&self.outgoing).take() {
            let _ = outgoing.send(Outbound::Close);
        }
    }
}

/// Live, ordered view of one room's chat.
///
/// Must be opened inside a tokio runtime. The socket is closed on
/// [`close()`](Self::close) or drop.
pub struct RoomChannel {
    shared: Arc<ChannelShared>,
    credential: Option<Credential>,
    tasks: Vec<JoinHandle<()>>,
    closed: bool,
}

impl RoomChannel {
    /// Open a channel for `room_id`.
    ///
    /// With an empty room id or no credential the channel stays `Idle` and
    /// touches neither the backend nor the socket.
    pub fn open(
        deps: &ChannelDeps,
        room_id: RoomId,
        credential: Option<Credential>,
        options: ChannelOptions,
    ) -> Self {
        Self::open_in_epoch(
            deps,
            room_id,
            credential,
            options,
            Arc::new(AtomicU64::new(0)),
        )
    }

    pub(crate) fn open_in_epoch(
        deps: &ChannelDeps,
        room_id: RoomId,
        credential: Option<Credential>,
        options: ChannelOptions,
        epoch: Arc<AtomicU64>,
    ) -> Self {
        let generation = epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        let shared = Arc::new(ChannelShared {
            room_id: room_id.clone(),
            generation,
            epoch,
            transcript: Mutex::new(Vec::new()),
            outgoing: Mutex::new(None),
            status,
            handler: options.handler,
        });

        let mut channel = Self {
            shared: shared.clone(),
            credential: credential.clone(),
            tasks: Vec::new(),
            closed: false,
        };

        let credential = match credential {
            Some(credential) if !room_id.is_empty() => credential,
            _ => {
                tracing::debug!(room = %room_id, "Missing room id or credential, channel stays idle");
                return channel;
            }
        };

        let url = match room_socket_url(&deps.socket_base, &room_id, &credential) {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(room = %room_id, error = %e, "Cannot build room socket URL");
                shared.set_status(ConnectionStatus::Failed);
                return channel;
            }
        };

        tracing::info!(room = %room_id, generation, "Opening room channel");
        shared.set_status(ConnectionStatus::Connecting);

        channel.tasks.push(tokio::spawn(load_history(
            shared.clone(),
            deps.backend.clone(),
            credential,
        )));
        channel.tasks.push(tokio::spawn(receiver::run(
            shared,
            deps.connector.clone(),
            url,
            options.reconnect,
        )));

        channel
    }

    pub fn room_id(&self) -> &RoomId {
        &self.shared.room_id
    }

    pub(crate) fn credential(&self) -> Option<&Credential> {
        self.credential.as_ref()
    }

    pub fn status(&self) -> ConnectionStatus {
        self.shared.status()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.shared.status.subscribe()
    }

    /// Transcript snapshot, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        lock(&self.shared.transcript).clone()
    }

    pub fn send(&self, text: &str) -> SendOutcome {
        self.sender().send(text)
    }

    pub fn send_kind(&self, text: &str, kind: MessageKind) -> SendOutcome {
        self.sender().send_kind(text, kind)
    }

    pub fn sender(&self) -> Sender {
        Sender::new(self.shared.clone())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the socket and discard any result that arrives afterwards.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.shared.retire();
        for task in self.tasks.drain(..) {
            task.abort();
        }

        if self.shared.status() != ConnectionStatus::Idle {
            self.shared.status.send_replace(ConnectionStatus::Closed);
            if let Some(handler) = &self.shared.handler {
                handler.on_status(&self.shared.room_id, ConnectionStatus::Closed);
            }
        }
        tracing::info!(room = %self.shared.room_id, "Room channel closed");
    }
}

impl Drop for RoomChannel {
    fn drop(&mut self) {
        self.close();
    }
}

async fn load_history(shared: Arc<ChannelShared>, backend: Arc<dyn Backend>, credential: Credential) {
    match backend.fetch_room_history(&shared.room_id, &credential).await {
        Ok(history) => {
            let count = history.len();
            if shared.prepend_history(history) {
                tracing::info!(room = %shared.room_id, count, "Loaded chat history");
            } else {
                tracing::debug!(room = %shared.room_id, "Discarding history for retired channel");
            }
        }
        Err(e) if shared.is_current() => {
            tracing::error!(room = %shared.room_id, error = %e, "Failed to load chat history");
        }
        Err(e) => {
            tracing::debug!(room = %shared.room_id, error = %e, "Ignoring history failure for retired channel");
        }
    }
}
