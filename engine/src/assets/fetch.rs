//! Fetchers that turn an asset location into raw bytes.
//!
//! Locations come in three shapes: `data:` URIs (decoded in place), absolute
//! `http(s)://` URLs, and bare paths that are resolved against the
//! configured [`AssetBase`]. HTTP requests carry a `nocache` query so
//! repeated exports never see a stale cached response.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for {location}")]
    Status { status: u16, location: String },

    #[error("failed to read '{location}': {source}")]
    Io {
        location: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid data URI: {0}")]
    DataUri(String),

    #[error("undecodable payload: {0}")]
    Decode(String),
}

/// Source of raw asset bytes.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    /// Fetch the bytes behind `location`. `cache_bust` is a per-request token
    /// that network fetchers attach to defeat intermediate caches.
    async fn fetch(&self, location: &str, cache_bust: &str) -> Result<Vec<u8>, AssetError>;
}

/// Where bare asset paths are resolved from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetBase {
    Url(String),
    Dir(PathBuf),
}

impl AssetBase {
    pub fn parse(base: &str) -> Self {
        if is_http(base) {
            AssetBase::Url(base.trim_end_matches('/').to_string())
        } else {
            AssetBase::Dir(PathBuf::from(base))
        }
    }
}

fn is_http(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Append the cache-busting query parameter to a URL.
pub fn with_cache_bust(url: &str, token: &str) -> String {
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}nocache={token}")
}

/// Plain HTTP GET fetcher.
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, AssetError> {
        let client = Client::builder().timeout(FETCH_TIMEOUT).build()?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AssetFetcher for HttpFetcher {
    async fn fetch(&self, location: &str, cache_bust: &str) -> Result<Vec<u8>, AssetError> {
        let url = with_cache_bust(location, cache_bust);
        debug!(%url, "fetching asset");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(AssetError::Status {
                status: status.as_u16(),
                location: location.to_string(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

/// Reads assets from the local filesystem.
#[derive(Debug, Clone)]
pub struct FileFetcher {
    root: PathBuf,
}

impl FileFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Locations are site-rooted: `/felix.ttf` and `felix.ttf` both name
    /// a file directly under the root, as they would under a URL base.
    fn resolve(&self, location: &str) -> PathBuf {
        let relative = location.trim_start_matches("./").trim_start_matches('/');
        self.root.join(relative)
    }
}

#[async_trait]
impl AssetFetcher for FileFetcher {
    async fn fetch(&self, location: &str, _cache_bust: &str) -> Result<Vec<u8>, AssetError> {
        let path = self.resolve(location);
        tokio::fs::read(&path).await.map_err(|source| AssetError::Io {
            location: path.display().to_string(),
            source,
        })
    }
}

/// Decode a `data:<mime>;base64,<payload>` URI.
pub fn decode_data_uri(uri: &str) -> Result<Vec<u8>, AssetError> {
    let comma = uri
        .find(',')
        .ok_or_else(|| AssetError::DataUri("missing comma".to_string()))?;
    let header = &uri[..comma];
    if !header.ends_with(";base64") {
        return Err(AssetError::DataUri("only base64 payloads are supported".to_string()));
    }
    base64::engine::general_purpose::STANDARD
        .decode(uri[comma + 1..].trim())
        .map_err(|e| AssetError::DataUri(e.to_string()))
}

/// Dispatches each location to the right fetcher.
///
/// `data:` URIs are decoded locally, absolute URLs go over HTTP, and bare
/// paths are joined onto the asset base (a URL or a directory).
pub struct SourceFetcher {
    base: AssetBase,
    http: HttpFetcher,
    files: FileFetcher,
}

impl SourceFetcher {
    pub fn new(base: AssetBase) -> Result<Self, AssetError> {
        Ok(Self::with_http(base, HttpFetcher::new()?))
    }

    pub fn with_http(base: AssetBase, http: HttpFetcher) -> Self {
        let root = match &base {
            AssetBase::Dir(dir) => dir.clone(),
            AssetBase::Url(_) => PathBuf::from("."),
        };
        Self {
            base,
            http,
            files: FileFetcher::new(root),
        }
    }
}

#[async_trait]
impl AssetFetcher for SourceFetcher {
    async fn fetch(&self, location: &str, cache_bust: &str) -> Result<Vec<u8>, AssetError> {
        if location.starts_with("data:") {
            return decode_data_uri(location);
        }
        if is_http(location) {
            return self.http.fetch(location, cache_bust).await;
        }
        match &self.base {
            AssetBase::Url(base) => {
                let url = format!("{}/{}", base, location.trim_start_matches('/'));
                self.http.fetch(&url, cache_bust).await
            }
            AssetBase::Dir(_) => self.files.fetch(location, cache_bust).await,
        }
    }
}
