//! Session manager: the single source of truth for who is logged in.
//!
//! One instance is constructed per process and handed to whatever needs it
//! (usually behind an `Arc`). It bootstraps from the persisted credential,
//! fetches the profile, and reacts to login and logout. Every profile fetch is
//! tagged with a generation; a completion from an older generation is
//! discarded without touching state or storage.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arena_protocol::UserProfile;
use thiserror::Error;
use tokio::sync::watch;

use crate::api::{ApiError, Backend};
use crate::auth::Registration;
use crate::connection::BackoffPolicy;
use crate::state::SessionState;
use crate::storage::{Credential, CredentialStore, StorageError, StoredCredentials};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("failed to persist credential: {0}")]
    Storage(#[from] StorageError),
}

/// What to do when the profile fetch fails.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ProfileFailurePolicy {
    /// Any failure clears the credential and logs out.
    #[default]
    LogoutOnAnyError,
    /// Transient failures (transport errors, 5xx, non-JSON) are retried with
    /// backoff and, once retries run out, leave the credential in place for
    /// the next bootstrap. Every other failure logs out and clears it.
    RetryTransient(BackoffPolicy),
}

pub struct SessionManager {
    backend: Arc<dyn Backend>,
    store: Arc<dyn CredentialStore>,
    policy: ProfileFailurePolicy,
    state: watch::Sender<SessionState>,
    generation: AtomicU64,
}

impl SessionManager {
    pub fn new(
        backend: Arc<dyn Backend>,
        store: Arc<dyn CredentialStore>,
        policy: ProfileFailurePolicy,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            backend,
            store,
            policy,
            state,
            generation: AtomicU64::new(0),
        }
    }

    /// Current snapshot.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.state.borrow().user.clone()
    }

    pub fn is_admin(&self) -> bool {
        self.state.borrow().is_admin()
    }

    /// Credential snapshot for room channels. `None` unless logged in.
    pub fn credential(&self) -> Option<Credential> {
        if self.state.borrow().is_logged_in {
            self.store.load()
        } else {
            None
        }
    }

    /// Read the persisted credential and resolve the session from it.
    ///
    /// Resolves once the session has settled in `LoggedIn` or `LoggedOut`,
    /// or immediately if a later `login()`/`logout()` superseded it.
    pub async fn bootstrap(&self) {
        let generation = self.advance();

        match self.store.load() {
            None => {
                tracing::info!("No stored credential, starting logged out");
                self.apply(generation, |state| *state = SessionState::logged_out());
            }
            Some(credential) => {
                tracing::info!("Found stored credential, resolving profile");
                self.apply(generation, |state| *state = SessionState::resolving());
                self.resolve_profile(generation, credential).await;
            }
        }
    }

    /// React to a freshly persisted credential.
    ///
    /// Calling it again before the profile resolves restarts the fetch.
    pub async fn login(&self) {
        let generation = self.advance();

        let Some(credential) = self.store.load() else {
            tracing::warn!("login() called without a stored credential");
            self.apply(generation, |state| *state = SessionState::logged_out());
            return;
        };

        self.apply(generation, |state| *state = SessionState::resolving());
        self.resolve_profile(generation, credential).await;
    }

    /// Clear the credential and drop to `LoggedOut`. Never contacts the backend.
    pub fn logout(&self) {
        self.advance();
        if let Err(e) = self.store.clear() {
            tracing::error!(error = %e, "Failed to clear stored credential");
        }
        self.state.send_replace(SessionState::logged_out());
        tracing::info!("Logged out");
    }

    /// Exchange username and password, persist the tokens, then `login()`.
    pub async fn sign_in(&self, username: &str, password: &str) -> Result<(), SessionError> {
        let tokens = self.backend.exchange_password(username, password).await?;
        self.store.save(&StoredCredentials {
            token: tokens.access,
            refresh: tokens.refresh,
        })?;
        tracing::info!(username, "Signed in");

        self.login().await;
        Ok(())
    }

    /// Create an account, persist the issued tokens, then `login()`.
    pub async fn register(&self, registration: &Registration) -> Result<(), SessionError> {
        let tokens = self.backend.register(registration).await?;
        self.store.save(&StoredCredentials {
            token: tokens.access,
            refresh: tokens.refresh,
        })?;
        tracing::info!(username = %registration.username, "Registered");

        self.login().await;
        Ok(())
    }

    fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    /// Mutate state only if `generation` is still current. The check runs
    /// under the watch lock so a concurrent `logout()` cannot be overwritten.
    fn apply(&self, generation: u64, update: impl FnOnce(&mut SessionState)) -> bool {
        self.state.send_if_modified(|state| {
            if !self.is_current(generation) {
                return false;
            }
            update(state);
            true
        })
    }

    async fn resolve_profile(&self, generation: u64, credential: Credential) {
        let mut retries = match &self.policy {
            ProfileFailurePolicy::LogoutOnAnyError => None,
            ProfileFailurePolicy::RetryTransient(policy) => Some(policy.delays()),
        };

        loop {
            let result = self.backend.fetch_profile(&credential).await;

            if !self.is_current(generation) {
                tracing::debug!(generation, "Discarding superseded profile response");
                return;
            }

            let err = match result {
                Ok(profile) => {
                    tracing::info!(username = %profile.username, admin = profile.is_admin(), "Session established");
                    self.apply(generation, |state| *state = SessionState::logged_in(profile));
                    return;
                }
                Err(err) => err,
            };

            let transient = err.is_transient();
            if transient
                && let Some(delay) = retries.as_mut().and_then(Iterator::next)
            {
                tracing::warn!(error = %err, ?delay, "Profile fetch failed, retrying");
                tokio::time::sleep(delay).await;
                continue;
            }

            let keep_credential = transient && retries.is_some();
            tracing::error!(error = %err, keep_credential, "Profile load failed, logging out");

            let store = &self.store;
            self.apply(generation, |state| {
                if !keep_credential && let Err(e) = store.clear() {
                    tracing::error!(error = %e, "Failed to clear stored credential");
                }
                *state = SessionState::logged_out();
            });
            return;
        }
    }
}
