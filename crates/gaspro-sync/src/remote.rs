//! # Remote Replica
//!
//! The [`Replica`] trait is the seam between the replicator and the network.
//! [`HttpReplica`] talks to the real replica over HTTPS; tests substitute an
//! in-process fake.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use gaspro_core::Snapshot;

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{PullResponse, PushAck, PushBatch};

/// A remote copy of the ledger.
#[async_trait]
pub trait Replica: Send + Sync {
    /// Uploads a batch and returns which entries the replica accepted.
    async fn push(&self, batch: &PushBatch) -> SyncResult<PushAck>;

    /// Downloads the replica's full snapshot.
    async fn pull(&self) -> SyncResult<Snapshot>;
}

/// [`Replica`] over HTTP with JSON bodies.
#[derive(Debug, Clone)]
pub struct HttpReplica {
    client: Client,
    base_url: Url,
}

impl HttpReplica {
    pub fn new(config: &SyncConfig) -> SyncResult<Self> {
        let raw = config
            .remote_url()
            .ok_or_else(|| SyncError::InvalidConfig("Remote URL required for sync".into()))?;
        let mut base_url = Url::parse(raw)?;
        // Url::join replaces the last segment unless the path ends in '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let mut headers = HeaderMap::new();
        if let Some(token) = &config.sync.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| SyncError::InvalidConfig(format!("Invalid auth token: {}", e)))?;
            headers.insert(AUTHORIZATION, value);
        }

        let client = Client::builder()
            .timeout(config.push_timeout())
            .default_headers(headers)
            .build()
            .map_err(|e| SyncError::InvalidConfig(format!("Failed to build HTTP client: {}", e)))?;

        Ok(HttpReplica { client, base_url })
    }

    fn url(&self, path: &str) -> SyncResult<Url> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl Replica for HttpReplica {
    async fn push(&self, batch: &PushBatch) -> SyncResult<PushAck> {
        let url = self.url("push")?;
        debug!(%url, entries = batch.entries.len(), "POST push batch");

        let resp = self.client.post(url).json(batch).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json::<PushAck>().await?)
    }

    async fn pull(&self) -> SyncResult<Snapshot> {
        let url = self.url("snapshot")?;
        debug!(%url, "GET snapshot");

        let resp = self.client.get(url).send().await?;
        let resp = check_status(resp).await?;
        resp.json::<PullResponse>().await?.into_snapshot()
    }
}

async fn check_status(resp: reqwest::Response) -> SyncResult<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(SyncError::RemoteStatus {
        status: status.as_u16(),
        message: if message.is_empty() {
            status
                .canonical_reason()
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR.as_str())
                .to_string()
        } else {
            message
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncMode;

    fn online(url: &str) -> SyncConfig {
        let mut config = SyncConfig::default();
        config.sync.mode = SyncMode::Online;
        config.sync.remote_url = Some(url.to_string());
        config
    }

    #[test]
    fn test_endpoints_resolve_under_base_path() {
        let replica = HttpReplica::new(&online("https://replica.example.com/api/v1")).unwrap();
        assert_eq!(
            replica.url("push").unwrap().as_str(),
            "https://replica.example.com/api/v1/push"
        );

        let replica = HttpReplica::new(&online("https://replica.example.com/api/")).unwrap();
        assert_eq!(
            replica.url("snapshot").unwrap().as_str(),
            "https://replica.example.com/api/snapshot"
        );
    }

    #[test]
    fn test_requires_remote_url() {
        let err = HttpReplica::new(&SyncConfig::default()).unwrap_err();
        assert!(err.is_config_error());
    }
}
