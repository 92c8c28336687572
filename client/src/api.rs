use arena_protocol::{ChatMessage, TokenPair, UserProfile, parse_history};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;

use crate::auth::Registration;
use crate::config::ClientConfig;
use crate::room::RoomId;
use crate::storage::Credential;

const PROFILE_ENDPOINT: &str = "/api/profile/";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("server returned non-JSON response (status {status}), check that the backend is running")]
    NonJson { status: u16 },

    #[error("{message} (status {status})")]
    Status { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid API URL {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl ApiError {
    /// HTTP status of the response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::NonJson { status } | Self::Status { status, .. } => Some(*status),
            Self::Transport(_) | Self::Decode(_) | Self::InvalidUrl { .. } => None,
        }
    }

    /// The backend rejected the credential itself, whatever the body looked like.
    pub fn is_auth_failure(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }

    /// Failures that say nothing about the credential and may clear up on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            // A 2xx page instead of JSON means a proxy is answering for the backend.
            Self::NonJson { status } => *status >= 500 || (200..300).contains(status),
            Self::Status { status, .. } => *status >= 500,
            Self::Decode(_) | Self::InvalidUrl { .. } => false,
        }
    }
}

/// Backend endpoints the session and room channel depend on.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn fetch_profile(&self, credential: &Credential) -> Result<UserProfile, ApiError>;

    /// Oldest first.
    async fn fetch_room_history(
        &self,
        room: &RoomId,
        credential: &Credential,
    ) -> Result<Vec<ChatMessage>, ApiError>;

    async fn exchange_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenPair, ApiError>;

    async fn register(&self, registration: &Registration) -> Result<TokenPair, ApiError>;
}

/// Thin JSON client for the arena REST API.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            http: builder.build()?,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        credential: Option<&Credential>,
    ) -> Result<T, ApiError> {
        let url = self.endpoint_url(endpoint)?;
        self.request(Method::GET, url, credential, None::<&()>)
            .await
    }

    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        credential: Option<&Credential>,
        body: &B,
    ) -> Result<T, ApiError> {
        let url = self.endpoint_url(endpoint)?;
        self.request(Method::POST, url, credential, Some(body))
            .await
    }

    fn endpoint_url(&self, endpoint: &str) -> Result<Url, ApiError> {
        let raw = format!("{}{}", self.base_url, endpoint);
        Url::parse(&raw).map_err(|e| ApiError::InvalidUrl {
            url: raw.clone(),
            reason: e.to_string(),
        })
    }

    /// Base URL with `segments` appended, each percent-encoded as a single
    /// path segment, plus a trailing slash.
    fn segments_url(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let invalid = |reason: String| ApiError::InvalidUrl {
            url: self.base_url.clone(),
            reason,
        };

        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("cannot be a base".to_string()))?
            .pop_if_empty()
            .extend(segments)
            .push("");
        Ok(url)
    }

    /// Issue a request, parse the JSON body and normalize failures.
    async fn request<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        credential: Option<&Credential>,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let endpoint = url.path().to_string();

        let mut request = self
            .http
            .request(method.clone(), url)
            .header(CONTENT_TYPE, "application/json");
        if let Some(credential) = credential {
            request = request.header(AUTHORIZATION, format!("Bearer {}", credential.as_str()));
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.inspect_err(|e| {
            tracing::error!(%method, %endpoint, error = %e, "API request failed");
        })?;
        let status = response.status();

        let is_json = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("application/json"));
        if !is_json {
            tracing::error!(%method, %endpoint, status = status.as_u16(), "API returned non-JSON response");
            return Err(ApiError::NonJson {
                status: status.as_u16(),
            });
        }

        let data: Value = response.json().await?;

        if !status.is_success() {
            let message = error_message(&data);
            tracing::warn!(%method, %endpoint, status = status.as_u16(), reason = %message, "API request rejected");
            return Err(ApiError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(serde_json::from_value(data)?)
    }
}

/// Pull the human-readable reason out of an error body.
fn error_message(data: &Value) -> String {
    ["error", "detail"]
        .iter()
        .find_map(|key| data.get(*key).and_then(Value::as_str))
        .unwrap_or("API request failed")
        .to_string()
}

#[async_trait]
impl Backend for ApiClient {
    async fn fetch_profile(&self, credential: &Credential) -> Result<UserProfile, ApiError> {
        self.get(PROFILE_ENDPOINT, Some(credential)).await
    }

    async fn fetch_room_history(
        &self,
        room: &RoomId,
        credential: &Credential,
    ) -> Result<Vec<ChatMessage>, ApiError> {
        let url = self.segments_url(&["chat", "room", room.as_str(), "messages"])?;
        let body: Value = self
            .request(Method::GET, url, Some(credential), None::<&()>)
            .await?;

        let messages = parse_history(body)
            .into_iter()
            .enumerate()
            .filter_map(|(index, parsed)| {
                parsed
                    .inspect_err(|e| {
                        tracing::warn!(room = %room, index, error = %e, "Skipping malformed history entry");
                    })
                    .ok()
            })
            .collect();

        Ok(messages)
    }

    async fn exchange_password(
        &self,
        username: &str,
        password: &str,
    ) -> Result<TokenPair, ApiError> {
        self.login(username, password).await
    }

    async fn register(&self, registration: &Registration) -> Result<TokenPair, ApiError> {
        self.register_account(registration).await
    }
}
