//! # Identity Provider Contract
//!
//! The gateway never issues or validates tokens itself. Everything identity related
//! goes through the [`AuthService`] trait; [`RemoteAuthService`] implements it over
//! HTTP against the identity provider configured with `AUTH_URL`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Sign-up payload accepted on `POST /users` and `POST /admins`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignUp {
    pub email: String,
    pub username: String,
    pub password: String,
    /// The account already exists at the identity provider (third-party login)
    pub is_federated: bool,
    pub uid: String,
}

impl SignUp {
    /// Check that the fields required for this kind of sign-up are present
    pub fn validate(&self) -> Result<(), String> {
        if self.is_federated {
            if self.uid.is_empty() {
                return Err("uid is required for federated sign-up".to_string());
            }
            return Ok(());
        }

        let missing: Vec<&str> = [
            ("email", &self.email),
            ("username", &self.username),
            ("password", &self.password),
        ]
        .iter()
        .filter(|(_, value)| value.is_empty())
        .map(|(field, _)| *field)
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(format!("missing fields: {}", missing.join(", ")))
        }
    }
}

/// Canonical account record forwarded to the users backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    pub uid: String,
    pub username: String,
    pub email: String,
}

/// Errors reported by an identity provider
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthServiceError {
    /// The provider answered and refused the operation; the message is shown to clients
    #[error("{0}")]
    Rejected(String),

    /// The provider could not be reached or answered garbage
    #[error("identity provider unavailable: {0}")]
    Transport(String),
}

impl AuthServiceError {
    pub fn rejected<S: Into<String>>(message: S) -> Self {
        Self::Rejected(message.into())
    }
}

/// Opaque identity-provider operations used by the pipeline handlers
#[async_trait]
pub trait AuthService: Send + Sync {
    /// Register a new account
    async fn create_user(&self, signup: &SignUp) -> Result<UserRecord, AuthServiceError>;

    /// Resolve a raw token into the uid it was issued for
    async fn verify_token(&self, token: &str) -> Result<String, AuthServiceError>;

    /// Look an existing account up
    async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthServiceError>;

    /// Block or unblock an account
    async fn set_block_status(&self, uid: &str, blocked: bool) -> Result<(), AuthServiceError>;
}

#[derive(Serialize)]
struct CreateAccountRequest<'a> {
    email: &'a str,
    username: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct VerifyTokenRequest<'a> {
    token: &'a str,
}

#[derive(Deserialize)]
struct VerifyTokenResponse {
    uid: String,
}

#[derive(Serialize)]
struct UpdateAccountRequest {
    disabled: bool,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: String,
}

/// [`AuthService`] backed by the identity provider's HTTP API
#[derive(Debug, Clone)]
pub struct RemoteAuthService {
    client: Client,
    base_url: Url,
}

impl RemoteAuthService {
    pub fn new(base_url: Url, timeout: Duration) -> Result<Self, AuthServiceError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthServiceError::Transport(e.to_string()))?;
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.as_str().trim_end_matches('/'), path)
    }

    fn account_endpoint(&self, uid: &str) -> String {
        self.endpoint(&format!("/accounts/{}", urlencoding::encode(uid)))
    }

    /// Turn a non-2xx answer into a rejection carrying the provider's message
    async fn check(response: reqwest::Response) -> Result<reqwest::Response, AuthServiceError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = match response.json::<ErrorResponse>().await {
            Ok(body) if !body.error.is_empty() => body.error,
            _ => status
                .canonical_reason()
                .unwrap_or("identity provider error")
                .to_string(),
        };
        debug!(status = status.as_u16(), "Identity provider rejected request");
        Err(AuthServiceError::Rejected(message))
    }
}

fn transport(err: reqwest::Error) -> AuthServiceError {
    AuthServiceError::Transport(err.to_string())
}

#[async_trait]
impl AuthService for RemoteAuthService {
    async fn create_user(&self, signup: &SignUp) -> Result<UserRecord, AuthServiceError> {
        let response = self
            .client
            .post(self.endpoint("/accounts"))
            .json(&CreateAccountRequest {
                email: &signup.email,
                username: &signup.username,
                password: &signup.password,
            })
            .send()
            .await
            .map_err(transport)?;

        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn verify_token(&self, token: &str) -> Result<String, AuthServiceError> {
        let response = self
            .client
            .post(self.endpoint("/tokens/verify"))
            .json(&VerifyTokenRequest { token })
            .send()
            .await
            .map_err(transport)?;

        let body: VerifyTokenResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(body.uid)
    }

    async fn get_user(&self, uid: &str) -> Result<UserRecord, AuthServiceError> {
        let response = self
            .client
            .get(self.account_endpoint(uid))
            .send()
            .await
            .map_err(transport)?;

        Self::check(response).await?.json().await.map_err(transport)
    }

    async fn set_block_status(&self, uid: &str, blocked: bool) -> Result<(), AuthServiceError> {
        let response = self
            .client
            .patch(self.account_endpoint(uid))
            .json(&UpdateAccountRequest { disabled: blocked })
            .send()
            .await
            .map_err(transport)?;

        Self::check(response).await?;
        Ok(())
    }
}
