//! Account auth client and credential storage.

mod manager;

pub use manager::TokenManager;

use std::fmt;
use std::sync::Mutex;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::util::{compact_text, normalize_http_base};

/// Access/refresh token pair returned by the auth endpoints.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("TokenPair")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .finish()
    }
}

/// Durable storage for the signed-in token pair.
///
/// The core ships [`MemoryTokenStore`]; clients provide their own backing
/// (keystore, config file) behind this trait.
pub trait TokenStore: Send + Sync + 'static {
    fn load_tokens(&self) -> Result<Option<TokenPair>>;
    fn save_tokens(&self, tokens: &TokenPair) -> Result<()>;
    fn clear_tokens(&self) -> Result<()>;
}

/// In-process token store, mostly for tests and short-lived tools.
#[derive(Default)]
pub struct MemoryTokenStore {
    tokens: Mutex<Option<TokenPair>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new(tokens: Option<TokenPair>) -> Self {
        Self {
            tokens: Mutex::new(tokens),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load_tokens(&self) -> Result<Option<TokenPair>> {
        Ok(self
            .tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone())
    }

    fn save_tokens(&self, tokens: &TokenPair) -> Result<()> {
        *self
            .tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(tokens.clone());
        Ok(())
    }

    fn clear_tokens(&self) -> Result<()> {
        self.tokens
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct CredentialsRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// HTTP client for the account endpoints (`/api/auth/*`).
#[derive(Clone)]
pub struct AuthClient {
    base_url: String,
    client: Client,
}

impl AuthClient {
    pub fn new(base_url: impl AsRef<str>) -> Result<Self> {
        Ok(Self {
            base_url: normalize_http_base(base_url.as_ref())?,
            client: Client::builder().build()?,
        })
    }

    /// Create an account and sign in.
    pub async fn register(&self, email: &str, password: &str) -> Result<TokenPair> {
        validate_credentials(email, password)?;
        self.request_tokens("register", &CredentialsRequest { email, password })
            .await
    }

    /// Sign in with an existing account.
    pub async fn login(&self, email: &str, password: &str) -> Result<TokenPair> {
        validate_credentials(email, password)?;
        self.request_tokens("login", &CredentialsRequest { email, password })
            .await
    }

    /// Exchange a refresh token for a fresh pair.
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair> {
        if refresh_token.trim().is_empty() {
            return Err(Error::Auth("refresh token must not be empty".to_string()));
        }
        self.request_tokens("refresh", &RefreshRequest { refresh_token })
            .await
    }

    async fn request_tokens<B: Serialize + Sync>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<TokenPair> {
        let response = self
            .client
            .post(format!("{}/api/auth/{endpoint}", self.base_url))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Auth(parse_api_error(status, &text)));
        }

        let tokens = response.json::<TokenPair>().await?;
        if tokens.access_token.trim().is_empty() || tokens.refresh_token.trim().is_empty() {
            return Err(Error::Auth(
                "auth response did not include both tokens".to_string(),
            ));
        }
        Ok(tokens)
    }
}

fn validate_credentials(email: &str, password: &str) -> Result<()> {
    if email.trim().is_empty() {
        return Err(Error::InvalidInput("email is required".to_string()));
    }
    if password.trim().is_empty() {
        return Err(Error::InvalidInput("password is required".to_string()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

/// Extract a readable message from an error response body.
pub(crate) fn parse_api_error(status: reqwest::StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return format!("{} ({})", message.trim(), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", compact_text(trimmed), status.as_u16())
    }
}
