use arena_protocol::TokenPair;
use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError};

const LOGIN_ENDPOINT: &str = "/api/login/";
const REGISTER_ENDPOINT: &str = "/api/register/";
const FORGOT_PASSWORD_ENDPOINT: &str = "/api/forgot-password/";
const RESET_PASSWORD_ENDPOINT: &str = "/api/reset-password/";

/// New account details for the register endpoint.
#[derive(Clone, Serialize)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub game_id: Option<String>,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("username", &self.username)
            .field("email", &self.email)
            .field("game_id", &self.game_id)
            .finish_non_exhaustive()
    }
}

/// Server acknowledgement for the password reset flow.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResetAck {
    pub message: String,
    /// Returned by development backends in place of an email link.
    #[serde(default)]
    pub reset_token: Option<String>,
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct ForgotPasswordRequest<'a> {
    email: &'a str,
}

#[derive(Serialize)]
struct ResetPasswordRequest<'a> {
    uid: &'a str,
    token: &'a str,
    password: &'a str,
}

impl ApiClient {
    /// Exchange username and password for a token pair.
    ///
    /// This only talks to the backend; persisting the token is up to the
    /// session manager.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenPair, ApiError> {
        self.post(
            LOGIN_ENDPOINT,
            None,
            &LoginRequest { username, password },
        )
        .await
    }

    pub async fn register_account(
        &self,
        registration: &Registration,
    ) -> Result<TokenPair, ApiError> {
        self.post(REGISTER_ENDPOINT, None, registration).await
    }

    /// Ask the backend to start a password reset for `email`.
    ///
    /// The backend answers the same way whether or not the account exists.
    pub async fn request_password_reset(&self, email: &str) -> Result<ResetAck, ApiError> {
        self.post(FORGOT_PASSWORD_ENDPOINT, None, &ForgotPasswordRequest { email })
            .await
    }

    /// Complete a reset with the `uid`/`token` pair from the reset link.
    pub async fn reset_password(
        &self,
        uid: &str,
        token: &str,
        password: &str,
    ) -> Result<ResetAck, ApiError> {
        self.post(
            RESET_PASSWORD_ENDPOINT,
            None,
            &ResetPasswordRequest {
                uid,
                token,
                password,
            },
        )
        .await
    }
}
