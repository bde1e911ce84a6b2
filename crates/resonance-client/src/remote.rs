//! Durable store over the node's HTTP API.

use crate::config::SessionConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};
use resonance_core::{now_millis, Entry, EntryDraft, MemoryStore, StoreError, StoreResult};
use serde::Serialize;
use tracing::debug;

/// Body of an append request.
#[derive(Debug, Serialize)]
struct AppendRequest<'a> {
    x: &'a str,
    y: &'a str,
    z: &'a str,
    score: u8,
    timestamp: u64,
}

/// [`MemoryStore`] backed by a `resonance-node`.
pub struct RemoteStore {
    client: Client,
    entries_url: Url,
    credential: String,
}

impl RemoteStore {
    /// Fails if the config is local-only.
    pub fn new(config: &SessionConfig) -> Result<Self> {
        let credential = config
            .credential
            .clone()
            .ok_or_else(|| Error::Config("no store credential configured".into()))?;
        let entries_url = config.api_url("api/v1/entries")?;
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self {
            client,
            entries_url,
            credential,
        })
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.bearer_auth(&self.credential).send().await?;
        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let message = response.text().await.unwrap_or_default();
            debug!("Store answered {}: {}", status, message);
            Err(Error::Status { status, message })
        }
    }

    async fn try_append(&self, draft: &EntryDraft) -> Result<Entry> {
        let body = AppendRequest {
            x: &draft.x,
            y: &draft.y,
            z: &draft.z,
            score: draft.score,
            timestamp: now_millis(),
        };
        let response = self
            .send(self.client.post(self.entries_url.clone()).json(&body))
            .await?;
        Ok(response.json().await?)
    }

    async fn try_list_recent(&self, limit: usize) -> Result<Vec<Entry>> {
        let request = self
            .client
            .get(self.entries_url.clone())
            .query(&[("order", "timestamp-desc".to_string()), ("limit", limit.to_string())]);
        let response = self.send(request).await?;
        Ok(response.json().await?)
    }

    async fn try_clear_all(&self) -> Result<()> {
        self.send(self.client.delete(self.entries_url.clone())).await?;
        Ok(())
    }
}

#[async_trait]
impl MemoryStore for RemoteStore {
    async fn append(&self, draft: EntryDraft) -> StoreResult<Entry> {
        draft.validate()?;
        self.try_append(&draft).await.map_err(StoreError::from)
    }

    async fn list_recent(&self, limit: usize) -> StoreResult<Vec<Entry>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        self.try_list_recent(limit).await.map_err(StoreError::from)
    }

    async fn clear_all(&self) -> StoreResult<()> {
        self.try_clear_all().await.map_err(StoreError::from)
    }

    fn is_durable(&self) -> bool {
        true
    }
}
