//! Remote sync adapter over a repository content API.
//!
//! Each identity owns one JSON document at
//! `{api_url}/repos/{repository}/contents/{directory}/{identity}.json`,
//! stored base64-encoded. Every call is a single attempt.
//!
//! Writes for one `RemoteSync` are serialized, and background pushes go
//! through a [`PushQueue`] that only keeps the newest snapshot.

use std::{future::Future, sync::Arc, time::Duration};

use base64::{engine::general_purpose, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    runtime::Handle,
    sync::{watch, Mutex},
};

use pocketledger_core::{BackupSnapshot, SnapshotPayload};

use crate::config::RemoteConfig;
use crate::session::Identity;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote sync not configured: {0}")]
    NotConfigured(String),
    #[error("remote document not found: {0}")]
    NotFound(String),
    #[error("remote rejected credentials")]
    Unauthorized,
    #[error("remote conflict: {0}")]
    Conflict(String),
    #[error("remote unavailable: {0}")]
    Unavailable(String),
    #[error("could not decode remote document: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(e: reqwest::Error) -> Self {
        RemoteError::Unavailable(e.to_string())
    }
}

#[derive(Debug, Deserialize)]
struct ContentDocument {
    #[serde(default)]
    content: String,
    sha: String,
}

#[derive(Debug, Serialize)]
struct PutContent<'a> {
    message: String,
    content: String,
    branch: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<String>,
}

pub struct RemoteSync {
    http: Client,
    api_url: String,
    repository: String,
    branch: String,
    directory: String,
    token: String,
    writes: Mutex<()>,
}

impl RemoteSync {
    pub fn from_config(config: &RemoteConfig) -> Result<Self, RemoteError> {
        if !config.enabled {
            return Err(RemoteError::NotConfigured("remote.enabled is false".to_string()));
        }
        if config.repository.trim().is_empty() {
            return Err(RemoteError::NotConfigured("remote.repository is empty".to_string()));
        }
        let token = match config.token.as_deref().map(str::trim) {
            Some(token) if !token.is_empty() => token.to_string(),
            _ => return Err(RemoteError::NotConfigured("no remote token".to_string())),
        };

        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .connect_timeout(Duration::from_secs(10))
            .user_agent("pocketledger")
            .build()?;

        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repository: config.repository.trim_matches('/').to_string(),
            branch: config.branch.clone(),
            directory: config.directory.trim_matches('/').to_string(),
            token,
            writes: Mutex::new(()),
        })
    }

    pub fn document_url(&self, identity: &Identity) -> String {
        format!(
            "{}/repos/{}/contents/{}/{}.json",
            self.api_url, self.repository, self.directory, identity
        )
    }

    /// Pushes `payload`, logging and discarding any failure.
    pub async fn push(&self, identity: &Identity, payload: &SnapshotPayload) {
        if let Err(e) = self.try_push(identity, payload).await {
            tracing::warn!(identity = %identity, error = %e, "Remote push failed");
        }
    }

    /// Creates or replaces the identity's document.
    pub async fn try_push(&self, identity: &Identity, payload: &SnapshotPayload) -> Result<(), RemoteError> {
        let json = payload
            .to_json()
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        // the sha read below must still be current when the PUT lands
        let _write = self.writes.lock().await;

        // replacing an existing document requires its current sha
        let sha = match self.fetch(identity).await {
            Ok(document) => Some(document.sha),
            Err(RemoteError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let body = PutContent {
            message: format!("Update ledger data for {}", identity),
            content: general_purpose::STANDARD.encode(json),
            branch: &self.branch,
            sha,
        };

        let url = self.document_url(identity);
        let response = self
            .http
            .put(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url));
        }
        tracing::info!(
            identity = %identity,
            transactions = payload.transactions.len(),
            categories = payload.categories.len(),
            "Pushed ledger to remote"
        );
        Ok(())
    }

    pub async fn pull(&self, identity: &Identity) -> Result<SnapshotPayload, RemoteError> {
        let document = self.fetch(identity).await?;
        let payload = decode_content(&document.content)?;
        tracing::info!(
            identity = %identity,
            transactions = payload.transactions.len(),
            categories = payload.categories.len(),
            "Pulled ledger from remote"
        );
        Ok(payload)
    }

    async fn fetch(&self, identity: &Identity) -> Result<ContentDocument, RemoteError> {
        let url = self.document_url(identity);
        tracing::debug!(url = %url, branch = %self.branch, "Fetching remote document");
        let response = self
            .http
            .get(&url)
            .query(&[("ref", self.branch.as_str())])
            .header("Authorization", self.auth_header())
            .header("Accept", "application/vnd.github+json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(status_error(status, &url));
        }
        response
            .json::<ContentDocument>()
            .await
            .map_err(|e| RemoteError::Decode(e.to_string()))
    }

    fn auth_header(&self) -> String {
        format!("token {}", self.token)
    }
}

/// Single background worker that pushes snapshots for one identity.
///
/// Enqueuing replaces whatever is still waiting, so a burst of mutations
/// ends in one push of the newest snapshot.
pub struct PushQueue {
    latest: watch::Sender<Option<(u64, Arc<BackupSnapshot>)>>,
    pushed: watch::Receiver<u64>,
}

impl PushQueue {
    pub fn spawn(remote: Arc<RemoteSync>, identity: Identity, handle: &Handle) -> Self {
        let (latest, mut queued) = watch::channel(None::<(u64, Arc<BackupSnapshot>)>);
        let (done, pushed) = watch::channel(0u64);

        handle.spawn(async move {
            while queued.changed().await.is_ok() {
                let next = queued.borrow_and_update().clone();
                if let Some((generation, snapshot)) = next {
                    remote.push(&identity, &snapshot.payload).await;
                    done.send_replace(generation);
                }
            }
            tracing::debug!(identity = %identity, "Push worker stopped");
        });

        Self { latest, pushed }
    }

    pub fn enqueue(&self, snapshot: Arc<BackupSnapshot>) {
        self.latest.send_modify(|slot| {
            let generation = slot.as_ref().map_or(0, |(generation, _)| *generation) + 1;
            *slot = Some((generation, snapshot));
        });
    }

    /// True once the worker has exited, e.g. because its runtime shut down.
    pub fn is_closed(&self) -> bool {
        self.latest.is_closed()
    }

    /// Resolves when everything enqueued so far has been pushed or has failed.
    pub fn flush(&self) -> impl Future<Output = ()> + Send + 'static {
        let target = self
            .latest
            .borrow()
            .as_ref()
            .map_or(0, |(generation, _)| *generation);
        let mut pushed = self.pushed.clone();
        async move {
            let stopped = pushed.wait_for(|done| *done >= target).await.is_err();
            if stopped {
                tracing::debug!("Push worker stopped before flushing");
            }
        }
    }
}

/// The content API wraps base64 output at fixed widths, so whitespace is dropped first.
fn decode_content(content: &str) -> Result<SnapshotPayload, RemoteError> {
    let cleaned: String = content.chars().filter(|c| !c.is_whitespace()).collect();
    let bytes = general_purpose::STANDARD
        .decode(cleaned)
        .map_err(|e| RemoteError::Decode(e.to_string()))?;
    let json = String::from_utf8(bytes).map_err(|e| RemoteError::Decode(e.to_string()))?;
    SnapshotPayload::from_json(&json).map_err(|e| RemoteError::Decode(e.to_string()))
}

fn status_error(status: StatusCode, url: &str) -> RemoteError {
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(url.to_string()),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => RemoteError::Unauthorized,
        StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
            RemoteError::Conflict(format!("{} returned {}", url, status))
        }
        _ => RemoteError::Unavailable(format!("{} returned {}", url, status)),
    }
}
