pub mod api;
pub mod auth;
pub mod channel;
pub mod config;
pub mod connection;
pub mod handler;
mod receiver;
pub mod room;
pub mod sender;
pub mod session;
pub mod state;
pub mod storage;
pub mod view;

#[cfg(test)]
mod testutil;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

pub use arena_protocol::{ChatMessage, MessageKind, OutgoingMessage, TokenPair, UserProfile};

pub use api::{ApiClient, ApiError, Backend};
pub use auth::{Registration, ResetAck};
pub use channel::{ChannelDeps, ChannelOptions, RoomChannel};
pub use config::{ClientConfig, ConfigError};
pub use connection::{BackoffPolicy, SocketConnector, TungsteniteConnector};
pub use handler::ChannelHandler;
pub use room::{ConnectionStatus, RoomId};
pub use sender::{SendOutcome, Sender};
pub use session::{ProfileFailurePolicy, SessionError, SessionManager};
pub use state::{SessionPhase, SessionState};
pub use storage::{Credential, CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use view::RoomView;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Arena client wired from a [`ClientConfig`].
///
/// Holds the HTTP client, a session backed by the credential file in the
/// data directory, and everything needed to open room channels.
pub struct ArenaClient {
    api: ApiClient,
    session: Arc<SessionManager>,
    channel_deps: ChannelDeps,
}

impl ArenaClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ClientError> {
        Self::with_policy(config, ProfileFailurePolicy::default())
    }

    pub fn with_policy(
        config: &ClientConfig,
        policy: ProfileFailurePolicy,
    ) -> Result<Self, ClientError> {
        let api = ApiClient::new(config)?;
        let store = Arc::new(FileCredentialStore::in_dir(&config.data_dir));
        let session = Arc::new(SessionManager::new(Arc::new(api.clone()), store, policy));
        let channel_deps = ChannelDeps::from_config(config, api.clone())?;

        Ok(Self {
            api,
            session,
            channel_deps,
        })
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn channel_deps(&self) -> &ChannelDeps {
        &self.channel_deps
    }

    /// A room view bound to this client's session.
    pub fn room_view(&self, options: ChannelOptions) -> RoomView {
        RoomView::new(self.session.clone(), self.channel_deps.clone(), options)
    }

    /// Open a standalone channel with the session's current credential.
    pub fn open_room(&self, room_id: impl Into<RoomId>, options: ChannelOptions) -> RoomChannel {
        RoomChannel::open(
            &self.channel_deps,
            room_id.into(),
            self.session.credential(),
            options,
        )
    }
}

/// Lock a mutex, recovering the data if a holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
