//! Access-token lifecycle around authenticated requests.

use tokio::sync::Mutex;

use crate::error::{Error, Result};

use super::{AuthClient, TokenStore};

/// Refresh protocol state. Every authenticated call runs against
/// `Authorized`; a 401 moves the manager through `Refreshing` and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AuthState {
    Authorized,
    Refreshing,
}

/// Owns the stored token pair and the refresh sub-protocol.
///
/// On a 401 the caller hands back the access token it used; the manager
/// refreshes once and the caller retransmits the original request exactly
/// once with the new token. A refresh failure surfaces as [`Error::Auth`]
/// and persists nothing, so the next 401 simply repeats the attempt.
pub struct TokenManager<S: TokenStore> {
    store: S,
    auth: AuthClient,
    state: Mutex<AuthState>,
}

impl<S: TokenStore> TokenManager<S> {
    pub fn new(store: S, auth: AuthClient) -> Self {
        Self {
            store,
            auth,
            state: Mutex::new(AuthState::Authorized),
        }
    }

    /// The current access token, or `Auth` when signed out.
    pub fn access_token(&self) -> Result<String> {
        self.store
            .load_tokens()?
            .map(|tokens| tokens.access_token)
            .ok_or_else(|| Error::Auth("not signed in".to_string()))
    }

    /// Refresh after a 401 observed with `stale_access`.
    ///
    /// Serialized: concurrent callers queue on the state lock, and a caller
    /// that arrives after someone else already refreshed gets the fresh
    /// token without spending another refresh round trip.
    pub async fn refresh(&self, stale_access: &str) -> Result<String> {
        let mut state = self.state.lock().await;

        let current = self
            .store
            .load_tokens()?
            .ok_or_else(|| Error::Auth("not signed in".to_string()))?;
        if current.access_token != stale_access {
            return Ok(current.access_token);
        }

        *state = AuthState::Refreshing;
        tracing::debug!("access token rejected; refreshing");
        let refreshed = self.auth.refresh(&current.refresh_token).await;
        *state = AuthState::Authorized;

        match refreshed {
            Ok(tokens) => {
                self.store.save_tokens(&tokens)?;
                Ok(tokens.access_token)
            }
            Err(error) => {
                tracing::warn!(%error, "token refresh failed");
                Err(Error::Auth(format!("token refresh failed: {error}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{MemoryTokenStore, TokenPair};

    fn manager(tokens: Option<TokenPair>) -> TokenManager<MemoryTokenStore> {
        TokenManager::new(
            MemoryTokenStore::new(tokens),
            AuthClient::new("http://localhost:0").unwrap(),
        )
    }

    #[test]
    fn access_token_requires_sign_in() {
        let signed_out = manager(None);
        assert!(matches!(signed_out.access_token(), Err(Error::Auth(_))));

        let signed_in = manager(Some(TokenPair {
            access_token: "a".to_string(),
            refresh_token: "r".to_string(),
        }));
        assert_eq!(signed_in.access_token().unwrap(), "a");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_reuses_tokens_minted_by_another_caller() {
        // The stored pair differs from the stale one the caller saw, so the
        // manager returns it without touching the network.
        let manager = manager(Some(TokenPair {
            access_token: "fresh".to_string(),
            refresh_token: "r".to_string(),
        }));

        let token = manager.refresh("stale").await.unwrap();
        assert_eq!(token, "fresh");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn refresh_when_signed_out_is_auth_error() {
        let manager = manager(None);
        assert!(matches!(
            manager.refresh("whatever").await,
            Err(Error::Auth(_))
        ));
    }
}
