use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use url::Url;

use super::{StoreError, TtlCache};

/// [`TtlCache`] client for a Redis-over-HTTP REST endpoint.
///
/// Commands map onto path segments (`/get/{key}`, `/set/{key}?EX=n`,
/// `/ttl/{key}`, `/del/{key}`) and replies arrive as a `{"result": ...}` or
/// `{"error": ...}` envelope.
///
/// # Example
/// ```no_run
/// use std::sync::Arc;
/// use devauth::store::{CacheDeviceCodeStore, RestTtlCache};
///
/// let cache = RestTtlCache::new("https://cache.example.com", "token")?;
/// let store = CacheDeviceCodeStore::new(Arc::new(cache));
/// # Ok::<(), devauth::store::StoreError>(())
/// ```
#[derive(Debug, Clone)]
pub struct RestTtlCache {
    client: reqwest::Client,
    base_url: Url,
    token: String,
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    result: Value,
    error: Option<String>,
}

impl RestTtlCache {
    pub fn new(base_url: &str, token: impl Into<String>) -> Result<Self, StoreError> {
        Self::with_client(reqwest::Client::new(), base_url, token)
    }

    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        token: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| StoreError::Backend(format!("invalid cache url {base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Backend(format!(
                "cache url cannot be a base: {base_url}"
            )));
        }
        Ok(Self {
            client,
            base_url,
            token: token.into(),
        })
    }

    fn command_url(&self, command: &str, key: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(command).push(key);
        }
        url
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, StoreError> {
        let resp = request.bearer_auth(&self.token).send().await?;
        let status = resp.status();
        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| StoreError::Backend(format!("cache reply unreadable ({status}): {e}")))?;
        if let Some(error) = envelope.error {
            return Err(StoreError::Backend(error));
        }
        if !status.is_success() {
            return Err(StoreError::Backend(format!(
                "cache request failed with status {status}"
            )));
        }
        Ok(envelope.result)
    }
}

#[async_trait]
impl TtlCache for RestTtlCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let result = self
            .send(self.client.get(self.command_url("get", key)))
            .await?;
        match result {
            Value::Null => Ok(None),
            Value::String(value) => Ok(Some(value)),
            other => Err(StoreError::Backend(format!(
                "unexpected GET result: {other}"
            ))),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        // EX takes whole seconds; round up so a key never outlives its record early.
        let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
        if secs == 0 {
            return Err(StoreError::Backend("ttl must be positive".to_string()));
        }
        let mut url = self.command_url("set", key);
        url.query_pairs_mut().append_pair("EX", &secs.to_string());
        let request = self.client.post(url).body(value.to_string());
        match self.send(request).await? {
            Value::String(ok) if ok == "OK" => Ok(()),
            other => Err(StoreError::Backend(format!(
                "unexpected SET result: {other}"
            ))),
        }
    }

    async fn ttl(&self, key: &str) -> Result<Option<Duration>, StoreError> {
        let result = self
            .send(self.client.get(self.command_url("ttl", key)))
            .await?;
        match result.as_i64() {
            Some(secs) if secs >= 0 => Ok(Some(Duration::from_secs(secs as u64))),
            // -2: missing, -1: no expiry.
            Some(_) => Ok(None),
            None => Err(StoreError::Backend(format!(
                "unexpected TTL result: {result}"
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let result = self
            .send(self.client.get(self.command_url("del", key)))
            .await?;
        match result.as_i64() {
            Some(count) => Ok(count > 0),
            None => Err(StoreError::Backend(format!(
                "unexpected DEL result: {result}"
            ))),
        }
    }
}
