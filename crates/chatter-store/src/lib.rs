pub mod listen;
pub mod push_id;

pub use listen::Subscription;
pub use push_id::PushIdGenerator;

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("store rejected {path}: {status}")]
    Rejected {
        path: String,
        status: reqwest::StatusCode,
    },

    #[error("listener cancelled by the store")]
    Cancelled,

    #[error("listener credentials revoked")]
    AuthRevoked,

    #[error("malformed stream event: {0}")]
    BadEvent(String),
}

/// Client for the hierarchical realtime store.
///
/// Paths are slash-separated keys into the JSON tree (`messages/{channelId}`).
/// Writes report acceptance, not replication, and failures are terminal for
/// the single operation; retries are the caller's decision.
pub struct Store {
    http: reqwest::Client,
    base_url: String,
    push_ids: PushIdGenerator,
}

impl Store {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            push_ids: PushIdGenerator::new(),
        }
    }

    /// A fresh store key: time-prefixed so keys sort chronologically.
    pub fn push_id(&self) -> String {
        self.push_ids.generate()
    }

    fn url(&self, path: &str, auth: Option<&str>) -> String {
        let mut url = format!("{}/{}.json", self.base_url, path.trim_matches('/'));
        if let Some(token) = auth {
            url.push_str("?auth=");
            url.push_str(token);
        }
        url
    }

    /// Write `value` at `path`, replacing whatever is there.
    pub async fn put<T: Serialize>(
        &self,
        path: &str,
        value: &T,
        auth: Option<&str>,
    ) -> Result<(), StoreError> {
        let resp = self
            .http
            .put(self.url(path, auth))
            .json(value)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(StoreError::Rejected {
                path: path.to_string(),
                status: resp.status(),
            });
        }

        debug!("put {} accepted", path);
        Ok(())
    }

    /// Read the subtree at `path`. Missing paths come back as `Value::Null`.
    pub async fn get(&self, path: &str, auth: Option<&str>) -> Result<Value, StoreError> {
        let resp = self.http.get(self.url(path, auth)).send().await?;

        if !resp.status().is_success() {
            return Err(StoreError::Rejected {
                path: path.to_string(),
                status: resp.status(),
            });
        }

        Ok(resp.json().await?)
    }

    /// Open a standing listener on `path`.
    ///
    /// Every change to the subtree delivers the full updated snapshot, not a
    /// diff. Dropping the returned [`Subscription`] releases the listener.
    pub fn subscribe(&self, path: &str, auth: Option<&str>) -> Subscription {
        listen::spawn(self.http.clone(), self.url(path, auth), path.to_string())
    }
}
