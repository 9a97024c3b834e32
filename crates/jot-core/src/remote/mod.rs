//! HTTP client for the note sync service.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use crate::auth::{parse_api_error, TokenManager, TokenStore};
use crate::error::{Error, Result};
use crate::models::{Note, NoteId};
use crate::util::normalize_http_base;

/// Outbound interface to the note service (consumed by the sync layer).
#[async_trait]
pub trait RemoteDataSource: Send + Sync {
    /// One page of notes, 1-indexed
    async fn get_notes(&self, page: u32, size: u32) -> Result<Vec<Note>>;

    /// Create a note remotely
    async fn post_note(&self, note: &Note) -> Result<()>;

    /// Overwrite a note remotely
    async fn update_note(&self, note: &Note) -> Result<()>;

    /// Delete a note remotely
    async fn delete_note(&self, id: &NoteId) -> Result<()>;
}

/// reqwest-backed implementation against `/api/notes`.
///
/// Every call is bearer-authenticated. A 401 triggers one token refresh
/// through the [`TokenManager`], after which the original request is
/// retransmitted exactly once.
pub struct HttpRemoteClient<S: TokenStore> {
    base_url: String,
    client: Client,
    tokens: Arc<TokenManager<S>>,
}

impl<S: TokenStore> HttpRemoteClient<S> {
    pub fn new(base_url: impl AsRef<str>, tokens: Arc<TokenManager<S>>) -> Result<Self> {
        Ok(Self {
            base_url: normalize_http_base(base_url.as_ref())?,
            client: Client::builder().build()?,
            tokens,
        })
    }

    fn notes_url(&self) -> String {
        format!("{}/api/notes", self.base_url)
    }

    fn note_url(&self, id: &NoteId) -> String {
        format!("{}/api/notes/{id}", self.base_url)
    }

    async fn send_authorized<F>(&self, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder + Send + Sync,
    {
        let access = self.tokens.access_token()?;
        let response = build().bearer_auth(&access).send().await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return finalize(response).await;
        }

        // Expired access token: refresh once and retransmit once
        let access = self.tokens.refresh(&access).await?;
        let response = build().bearer_auth(&access).send().await?;
        finalize(response).await
    }
}

async fn finalize(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body))
}

fn status_error(status: StatusCode, body: &str) -> Error {
    match status {
        // Second 401 means the refreshed token was rejected too
        StatusCode::UNAUTHORIZED => Error::Auth(parse_api_error(status, body)),
        StatusCode::NOT_FOUND => Error::NotFound(parse_api_error(status, body)),
        _ => Error::Remote(parse_api_error(status, body)),
    }
}

#[async_trait]
impl<S: TokenStore> RemoteDataSource for HttpRemoteClient<S> {
    async fn get_notes(&self, page: u32, size: u32) -> Result<Vec<Note>> {
        let response = self
            .send_authorized(|| {
                self.client
                    .get(self.notes_url())
                    .query(&[("page", page), ("size", size)])
            })
            .await?;
        Ok(response.json::<Vec<Note>>().await?)
    }

    async fn post_note(&self, note: &Note) -> Result<()> {
        self.send_authorized(|| self.client.post(self.notes_url()).json(note))
            .await?;
        Ok(())
    }

    async fn update_note(&self, note: &Note) -> Result<()> {
        self.send_authorized(|| self.client.put(self.note_url(&note.id)).json(note))
            .await?;
        Ok(())
    }

    async fn delete_note(&self, id: &NoteId) -> Result<()> {
        self.send_authorized(|| self.client.delete(self.note_url(id)))
            .await?;
        Ok(())
    }
}

/// Remote used when no sync service is configured. Every call fails with a
/// `Remote` error, so local-first operations still succeed and mutations
/// simply accumulate in the pending queue.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineRemote;

impl OfflineRemote {
    const MESSAGE: &'static str = "sync service is not configured";
}

#[async_trait]
impl RemoteDataSource for OfflineRemote {
    async fn get_notes(&self, _page: u32, _size: u32) -> Result<Vec<Note>> {
        Err(Error::Remote(Self::MESSAGE.to_string()))
    }

    async fn post_note(&self, _note: &Note) -> Result<()> {
        Err(Error::Remote(Self::MESSAGE.to_string()))
    }

    async fn update_note(&self, _note: &Note) -> Result<()> {
        Err(Error::Remote(Self::MESSAGE.to_string()))
    }

    async fn delete_note(&self, _id: &NoteId) -> Result<()> {
        Err(Error::Remote(Self::MESSAGE.to_string()))
    }
}
