//! HTTP client back-end: issues the wire calls in the external interface
//! section against a remote registry server, with a TTL-keyed ETag cache
//! and single-flight request coalescing.

use crate::{check_cancelled, sorted_dedup, RegistryError, RegistryStore};
use async_trait::async_trait;
use orizon_core::{Cid, Constraint, PackageBlob, PackageId, PackageManifest};
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
struct CacheEntry<T> {
    value: T,
    etag: Option<String>,
    fetched_at: Instant,
}

/// Keyed by `"list:name"` or `"find:name|constraint"` per spec §5.
struct Cache<T> {
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry<T>>>,
    inflight: Mutex<HashMap<String, broadcast::Sender<()>>>,
}

impl<T: Clone> Cache<T> {
    fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            inflight: Mutex::new(HashMap::new()),
        }
    }

    fn get_fresh(&self, key: &str) -> Option<T> {
        let entries = self.entries.lock();
        entries.get(key).and_then(|e| {
            if e.fetched_at.elapsed() < self.ttl {
                Some(e.value.clone())
            } else {
                None
            }
        })
    }

    fn etag(&self, key: &str) -> Option<String> {
        self.entries.lock().get(key).and_then(|e| e.etag.clone())
    }

    /// Only `200` and `304` responses reach this method; errors never
    /// populate the cache.
    fn store(&self, key: &str, value: T, etag: Option<String>) {
        self.entries.lock().insert(
            key.to_string(),
            CacheEntry {
                value,
                etag,
                fetched_at: Instant::now(),
            },
        );
    }

    fn refresh_timestamp(&self, key: &str) {
        if let Some(entry) = self.entries.lock().get_mut(key) {
            entry.fetched_at = Instant::now();
        }
    }

    /// Run `work` for `key`, coalescing concurrent callers for the same
    /// key into a single execution: the first caller runs `work` and
    /// broadcasts completion; the rest wait, then re-check the cache.
    async fn single_flight<F, Fut>(&self, key: &str, work: F) -> Result<T, RegistryError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<(T, Option<String>), RegistryError>>,
    {
        let mut rx_existing = None;
        {
            let mut inflight = self.inflight.lock();
            if let Some(tx) = inflight.get(key) {
                rx_existing = Some(tx.subscribe());
            } else {
                let (tx, _rx) = broadcast::channel(1);
                inflight.insert(key.to_string(), tx);
            }
        }

        if let Some(mut rx) = rx_existing {
            let _ = rx.recv().await;
            if let Some(v) = self.get_fresh(key) {
                return Ok(v);
            }
        }

        let result = work().await;
        let tx = self.inflight.lock().remove(key);
        match &result {
            Ok((value, etag)) => self.store(key, value.clone(), etag.clone()),
            Err(_) => {}
        }
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
        result.map(|(v, _)| v)
    }
}

#[derive(Serialize)]
struct PublishRequest<'a> {
    manifest: &'a PackageManifest,
    #[serde(with = "base64_bytes")]
    data: &'a [u8],
}

#[derive(Deserialize)]
struct PublishResponse {
    cid: String,
}

#[derive(Deserialize)]
struct FetchResponse {
    manifest: PackageManifest,
    #[serde(with = "base64_bytes_owned")]
    data: Vec<u8>,
}

#[derive(Deserialize)]
struct FindResponse {
    cid: String,
    manifest: PackageManifest,
}

mod base64_bytes {
    use base64::Engine as _;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(bytes: &&[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

mod base64_bytes_owned {
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        base64::engine::general_purpose::STANDARD
            .decode(s)
            .map_err(serde::de::Error::custom)
    }
}

/// HTTP client back-end, communicating with a registry server over the
/// wire protocol in the external interface section.
pub struct HttpRegistry {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    list_cache: Cache<Vec<PackageManifest>>,
    find_cache: Cache<(Cid, PackageManifest)>,
}

impl HttpRegistry {
    pub fn new(base_url: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token,
            list_cache: Cache::new(Duration::from_secs(30)),
            find_cache: Cache::new(Duration::from_secs(30)),
        }
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(t) => builder.bearer_auth(t),
            None => builder,
        }
    }

    fn map_status(status: StatusCode, body: &str) -> RegistryError {
        match status {
            StatusCode::NOT_FOUND => RegistryError::NotFound(body.to_string()),
            StatusCode::UNAUTHORIZED => RegistryError::Unauthorized,
            StatusCode::TOO_MANY_REQUESTS => RegistryError::RateLimited,
            StatusCode::PAYLOAD_TOO_LARGE => RegistryError::PayloadTooLarge,
            StatusCode::BAD_REQUEST => RegistryError::InvalidConstraint(body.to_string()),
            _ => RegistryError::Io(format!("http {}: {}", status, body)),
        }
    }

    /// Issue `GET path`, retrying up to 3 times with exponential backoff
    /// (base 100ms, doubling) on transport-level failure.
    async fn get_with_retry(
        &self,
        path: &str,
        etag: Option<&str>,
    ) -> Result<(StatusCode, reqwest::header::HeaderMap, String), RegistryError> {
        let mut attempt = 0;
        let mut delay = Duration::from_millis(100);
        loop {
            let mut req = self.authed(self.client.get(format!("{}{}", self.base_url, path)));
            if let Some(tag) = etag {
                req = req.header(reqwest::header::IF_NONE_MATCH, tag);
            }
            match req.send().await {
                Ok(resp) => {
                    let status = resp.status();
                    let headers = resp.headers().clone();
                    let body = resp.text().await.unwrap_or_default();
                    return Ok((status, headers, body));
                }
                Err(e) if attempt < 2 => {
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    tracing::warn!(error = %e, attempt, "retrying registry request");
                }
                Err(e) => return Err(RegistryError::Io(e.to_string())),
            }
        }
    }
}

#[async_trait]
impl RegistryStore for HttpRegistry {
    async fn publish(&self, blob: PackageBlob, cancel: &CancellationToken) -> Result<Cid, RegistryError> {
        check_cancelled(cancel)?;
        let body = PublishRequest {
            manifest: &blob.manifest,
            data: &blob.data,
        };
        let resp = self
            .authed(self.client.post(format!("{}/publish", self.base_url)).json(&body))
            .send()
            .await
            .map_err(|e| RegistryError::Io(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Self::map_status(status, &text));
        }
        let parsed: PublishResponse = resp.json().await.map_err(|e| RegistryError::Io(e.to_string()))?;
        Cid::from_str(&parsed.cid).map_err(|e| RegistryError::Io(e.to_string()))
    }

    async fn fetch(&self, cid: &Cid, cancel: &CancellationToken) -> Result<PackageBlob, RegistryError> {
        check_cancelled(cancel)?;
        let path = format!("/fetch?cid={}", cid);
        let (status, _headers, body) = self.get_with_retry(&path, None).await?;
        if !status.is_success() {
            return Err(Self::map_status(status, &body));
        }
        let parsed: FetchResponse = serde_json::from_str(&body).map_err(|e| RegistryError::Io(e.to_string()))?;
        Ok(PackageBlob {
            manifest: parsed.manifest,
            data: parsed.data,
        })
    }

    async fn find(
        &self,
        name: &PackageId,
        constraint: Option<&Constraint>,
        cancel: &CancellationToken,
    ) -> Result<(Cid, PackageManifest), RegistryError> {
        check_cancelled(cancel)?;
        let constraint_str = constraint.map(|c| c.to_string()).unwrap_or_default();
        let key = format!("find:{}|{}", name, constraint_str);

        if let Some(v) = self.find_cache.get_fresh(&key) {
            return Ok(v);
        }

        let path = format!("/find?name={}&constraint={}", name, urlencoding::encode(&constraint_str));
        let etag = self.find_cache.etag(&key);
        let cache = &self.find_cache;
        cache
            .single_flight(&key, || async {
                let (status, headers, body) = self.get_with_retry(&path, etag.as_deref()).await?;
                if status == StatusCode::NOT_MODIFIED {
                    if let Some(v) = cache.get_fresh(&key).or_else(|| cache.entries.lock().get(&key).map(|e| e.value.clone())) {
                        cache.refresh_timestamp(&key);
                        return Ok((v, etag));
                    }
                }
                if !status.is_success() {
                    return Err(Self::map_status(status, &body));
                }
                let parsed: FindResponse = serde_json::from_str(&body).map_err(|e| RegistryError::Io(e.to_string()))?;
                let cid = Cid::from_str(&parsed.cid).map_err(|e| RegistryError::Io(e.to_string()))?;
                let new_etag = headers
                    .get(reqwest::header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());
                Ok(((cid, parsed.manifest), new_etag))
            })
            .await
    }

    async fn list(&self, name: &PackageId, cancel: &CancellationToken) -> Result<Vec<PackageManifest>, RegistryError> {
        check_cancelled(cancel)?;
        let key = format!("list:{}", name);
        if let Some(v) = self.list_cache.get_fresh(&key) {
            return Ok(v);
        }
        let path = format!("/list?name={}", name);
        let etag = self.list_cache.etag(&key);
        let cache = &self.list_cache;
        let result = cache
            .single_flight(&key, || async {
                let (status, headers, body) = self.get_with_retry(&path, etag.as_deref()).await?;
                if status == StatusCode::NOT_MODIFIED {
                    if let Some(v) = cache.entries.lock().get(&key).map(|e| e.value.clone()) {
                        cache.refresh_timestamp(&key);
                        return Ok((v, etag));
                    }
                }
                if !status.is_success() {
                    return Err(Self::map_status(status, &body));
                }
                let manifests: Vec<PackageManifest> =
                    serde_json::from_str(&body).map_err(|e| RegistryError::Io(e.to_string()))?;
                let new_etag = headers
                    .get(reqwest::header::ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(|s| s.to_string());
                Ok((manifests, new_etag))
            })
            .await?;
        Ok(sorted_dedup(result))
    }

    async fn all(&self, cancel: &CancellationToken) -> Result<Vec<PackageManifest>, RegistryError> {
        check_cancelled(cancel)?;
        let (status, _headers, body) = self.get_with_retry("/all", None).await?;
        if !status.is_success() {
            return Err(Self::map_status(status, &body));
        }
        let manifests: Vec<PackageManifest> = serde_json::from_str(&body).map_err(|e| RegistryError::Io(e.to_string()))?;
        Ok(sorted_dedup(manifests))
    }
}
