//! # Asset Loader
//!
//! Resolves every binary asset a job references (background image, display
//! and body fonts, per-item images) into an [`AssetCache`].
//!
//! All fetches are spawned onto one `JoinSet` and awaited together: `load`
//! returns only when every fetch has settled. A failed fetch or an
//! undecodable payload is logged and simply left out of the cache. Nothing
//! is retried and nothing here can fail the job.

pub mod fetch;

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::image_loader::{decode_image_bytes, LoadedImage};

pub use fetch::{AssetBase, AssetError, AssetFetcher, FileFetcher, HttpFetcher, SourceFetcher};

/// Which font a font asset feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FontSlot {
    Display,
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum AssetKind {
    Background,
    Font(FontSlot),
    ItemImage,
}

/// A reference to one binary asset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct AssetRef {
    pub kind: AssetKind,
    pub location: String,
}

impl AssetRef {
    pub fn new(kind: AssetKind, location: impl Into<String>) -> Self {
        Self {
            kind,
            location: location.into(),
        }
    }
}

/// One asset to load, plus who asked for it (used in log messages).
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub asset: AssetRef,
    pub owner: Option<String>,
}

impl AssetRequest {
    pub fn new(asset: AssetRef) -> Self {
        Self { asset, owner: None }
    }

    pub fn owned_by(asset: AssetRef, owner: impl Into<String>) -> Self {
        Self {
            asset,
            owner: Some(owner.into()),
        }
    }
}

/// A fetched asset in its embeddable form.
#[derive(Debug, Clone)]
pub enum AssetPayload {
    Image(Arc<LoadedImage>),
    /// Raw TrueType/OpenType bytes that ttf-parser accepted.
    Font(Arc<Vec<u8>>),
}

/// Loaded assets for one job.
#[derive(Debug, Default)]
pub struct AssetCache {
    entries: HashMap<AssetRef, AssetPayload>,
}

impl AssetCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, asset: AssetRef, payload: AssetPayload) {
        self.entries.insert(asset, payload);
    }

    pub fn get(&self, asset: &AssetRef) -> Option<&AssetPayload> {
        self.entries.get(asset)
    }

    pub fn contains(&self, asset: &AssetRef) -> bool {
        self.entries.contains_key(asset)
    }

    pub fn image(&self, asset: &AssetRef) -> Option<&Arc<LoadedImage>> {
        match self.entries.get(asset) {
            Some(AssetPayload::Image(img)) => Some(img),
            _ => None,
        }
    }

    pub fn font(&self, asset: &AssetRef) -> Option<&Arc<Vec<u8>>> {
        match self.entries.get(asset) {
            Some(AssetPayload::Font(data)) => Some(data),
            _ => None,
        }
    }

    /// The first loaded font for a slot.
    pub fn font_for(&self, slot: FontSlot) -> Option<(&AssetRef, &Arc<Vec<u8>>)> {
        self.entries.iter().find_map(|(asset, payload)| match (asset.kind, payload) {
            (AssetKind::Font(s), AssetPayload::Font(data)) if s == slot => Some((asset, data)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Fans asset fetches out and joins them back into a cache.
#[derive(Clone)]
pub struct AssetLoader {
    fetcher: Arc<dyn AssetFetcher>,
}

impl AssetLoader {
    pub fn new(fetcher: Arc<dyn AssetFetcher>) -> Self {
        Self { fetcher }
    }

    /// Fetch and decode every requested asset concurrently.
    ///
    /// Duplicate references are fetched once. The returned cache holds only
    /// the assets that were fetched and decoded successfully.
    pub async fn load(&self, requests: Vec<AssetRequest>, job_token: &str) -> AssetCache {
        let mut seen = HashMap::new();
        for request in requests {
            seen.entry(request.asset.clone()).or_insert(request);
        }
        let total = seen.len();

        let mut tasks = JoinSet::new();
        for (seq, request) in seen.into_values().enumerate() {
            let fetcher = Arc::clone(&self.fetcher);
            let cache_bust = cache_bust_token(job_token, seq);
            tasks.spawn(async move {
                let result = fetcher
                    .fetch(&request.asset.location, &cache_bust)
                    .await
                    .and_then(|bytes| decode_payload(request.asset.kind, bytes));
                (request, result)
            });
        }

        let mut cache = AssetCache::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((request, Ok(payload))) => {
                    debug!(location = %request.asset.location, "asset loaded");
                    cache.insert(request.asset, payload);
                }
                Ok((request, Err(e))) => {
                    warn!(
                        location = %request.asset.location,
                        kind = ?request.asset.kind,
                        owner = request.owner.as_deref().unwrap_or("-"),
                        error = %e,
                        "asset unavailable, continuing without it"
                    );
                }
                Err(e) => warn!(error = %e, "asset fetch task aborted"),
            }
        }

        info!(loaded = cache.len(), requested = total, "assets settled");
        cache
    }
}

/// `<job>_<seq>_<random>`: unique per request, even across repeated exports.
fn cache_bust_token(job_token: &str, seq: usize) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", job_token, seq, &random[..8])
}

fn decode_payload(kind: AssetKind, bytes: Vec<u8>) -> Result<AssetPayload, AssetError> {
    match kind {
        AssetKind::Font(_) => {
            ttf_parser::Face::parse(&bytes, 0).map_err(|e| AssetError::Decode(e.to_string()))?;
            Ok(AssetPayload::Font(Arc::new(bytes)))
        }
        AssetKind::Background | AssetKind::ItemImage => decode_image_bytes(&bytes)
            .map(|img| AssetPayload::Image(Arc::new(img)))
            .map_err(|e| AssetError::Decode(e.to_string())),
    }
}
