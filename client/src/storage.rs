//! Persisted credential store.
//!
//! The bearer token lives in a single JSON file (`credentials.json`) under the
//! configured data directory, written with 0o600 permissions.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::lock;

const CREDENTIALS_FILE_NAME: &str = "credentials.json";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Opaque bearer token proving identity to the backend.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(<redacted>)")
    }
}

/// What gets written to durable storage after a login or register exchange.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredCredentials {
    pub token: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

impl fmt::Debug for StoredCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredCredentials")
            .field("token", &"<redacted>")
            .field("has_refresh", &self.refresh.is_some())
            .finish()
    }
}

/// Single fixed-key read/write/delete surface for the bearer token.
pub trait CredentialStore: Send + Sync {
    /// `None` when nothing usable is stored.
    fn load(&self) -> Option<Credential>;

    fn save(&self, credentials: &StoredCredentials) -> Result<(), StorageError>;

    /// Removes both access and refresh tokens. Clearing an empty store succeeds.
    fn clear(&self) -> Result<(), StorageError>;
}

/// File-backed store under the client data directory.
#[derive(Debug, Clone)]
pub struct FileCredentialStore {
    path: PathBuf,
}

impl FileCredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join(CREDENTIALS_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Option<Credential> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to read credential file");
                return None;
            }
        };

        match serde_json::from_str::<StoredCredentials>(&data) {
            Ok(stored) if !stored.token.trim().is_empty() => Some(Credential(stored.token)),
            Ok(_) => None,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to parse credential file");
                None
            }
        }
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(credentials)?;
        std::fs::write(&self.path, json)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&self.path, perms);
        }

        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// In-process store, for embedders that keep credentials elsewhere and for tests.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    slot: Mutex<Option<StoredCredentials>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            slot: Mutex::new(Some(StoredCredentials {
                token: token.into(),
                refresh: None,
            })),
        }
    }

    pub fn stored(&self) -> Option<StoredCredentials> {
        lock(&self.slot).clone()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Option<Credential> {
        lock(&self.slot)
            .as_ref()
            .filter(|stored| !stored.token.trim().is_empty())
            .map(|stored| Credential(stored.token.clone()))
    }

    fn save(&self, credentials: &StoredCredentials) -> Result<(), StorageError> {
        *lock(&self.slot) = Some(credentials.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), StorageError> {
        *lock(&self.slot) = None;
        Ok(())
    }
}
