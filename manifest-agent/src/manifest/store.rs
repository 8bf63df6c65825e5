//! Object store boundary used to stage manifests.
//!
//! The verification workflow only needs `get`/`put` of whole objects, so the
//! trait stays that small. Three backends:
//! - [`LocalObjectStore`]: one directory per bucket under a root
//! - [`HttpObjectStore`]: `GET`/`PUT {base}/{bucket}/{key}`
//! - [`MemoryObjectStore`]: in-process, for tests and dry runs

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::{debug, info};

use super::Manifest;
use crate::utils::errors::{AgentError, Result};

/// Whole-object storage addressed by bucket and key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object. Missing objects are an error.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>>;

    /// Store an object, replacing any previous content.
    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()>;
}

/// Join a key prefix and a name the way object keys are usually laid out.
pub fn object_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", prefix, name)
    }
}

// ============================================================================
// Local directory backend
// ============================================================================

/// Buckets are subdirectories of `root`; keys are relative paths inside them.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<PathBuf> {
        let bucket_path = safe_relative(bucket)
            .ok_or_else(|| AgentError::Store(format!("invalid bucket name: {:?}", bucket)))?;
        let key_path = safe_relative(key)
            .ok_or_else(|| AgentError::Store(format!("invalid object key: {:?}", key)))?;
        Ok(self.root.join(bucket_path).join(key_path))
    }
}

/// Accept only plain relative paths (no `..`, no root, no empty key).
fn safe_relative(key: &str) -> Option<PathBuf> {
    let path = Path::new(key);
    if key.is_empty() || !path.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    Some(path.to_path_buf())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let path = self.object_path(bucket, key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| AgentError::Store(format!("read {}/{}: {}", bucket, key, e)))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let path = self.object_path(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, body)
            .await
            .map_err(|e| AgentError::Store(format!("write {}/{}: {}", bucket, key, e)))?;
        debug!("Stored object at {}", path.display());
        Ok(())
    }
}

// ============================================================================
// HTTP backend
// ============================================================================

/// Object store reached over plain HTTP (`GET`/`PUT {base}/{bucket}/{key}`).
#[derive(Debug, Clone)]
pub struct HttpObjectStore {
    client: reqwest::Client,
    base_url: reqwest::Url,
    token: Option<String>,
}

impl HttpObjectStore {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let base_url = reqwest::Url::parse(base_url)
            .map_err(|e| AgentError::Config(format!("invalid store url {:?}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(AgentError::Config(format!("store url cannot be a base: {}", base_url)));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            base_url,
            token,
        })
    }

    fn object_url(&self, bucket: &str, key: &str) -> reqwest::Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(bucket);
            segments.extend(key.split('/').filter(|s| !s.is_empty()));
        }
        url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let url = self.object_url(bucket, key);
        let resp = self.authorize(self.client.get(url.clone())).send().await?;

        if !resp.status().is_success() {
            return Err(AgentError::Store(format!("GET {} returned {}", url, resp.status())));
        }
        Ok(resp.bytes().await?.to_vec())
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let url = self.object_url(bucket, key);
        let resp = self
            .authorize(self.client.put(url.clone()))
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let error_text = resp.text().await.unwrap_or_default();
            return Err(AgentError::Store(format!("PUT {} returned {}: {}", url, status, error_text)));
        }
        Ok(())
    }
}

// ============================================================================
// In-memory backend
// ============================================================================

/// In-memory object store.
#[derive(Debug, Default, Clone)]
pub struct MemoryObjectStore {
    objects: Arc<RwLock<HashMap<(String, String), Vec<u8>>>>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Synchronous insert, handy for seeding fixtures.
    pub fn insert(&self, bucket: &str, key: &str, body: Vec<u8>) {
        if let Ok(mut objects) = self.objects.write() {
            objects.insert((bucket.to_string(), key.to_string()), body);
        }
    }

    pub fn contains(&self, bucket: &str, key: &str) -> bool {
        self.objects
            .read()
            .map(|o| o.contains_key(&(bucket.to_string(), key.to_string())))
            .unwrap_or(false)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>> {
        let objects = self
            .objects
            .read()
            .map_err(|_| AgentError::Store("object map poisoned".to_string()))?;
        objects
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
            .ok_or_else(|| AgentError::Store(format!("no such object: {}/{}", bucket, key)))
    }

    async fn put_object(&self, bucket: &str, key: &str, body: Vec<u8>) -> Result<()> {
        let mut objects = self
            .objects
            .write()
            .map_err(|_| AgentError::Store("object map poisoned".to_string()))?;
        objects.insert((bucket.to_string(), key.to_string()), body);
        Ok(())
    }
}

// ============================================================================
// Manifest store client
// ============================================================================

/// Loads and saves manifest documents in one bucket.
#[derive(Clone)]
pub struct ManifestStore {
    store: Arc<dyn ObjectStore>,
    bucket: String,
}

impl ManifestStore {
    pub fn new(store: Arc<dyn ObjectStore>, bucket: impl Into<String>) -> Self {
        Self {
            store,
            bucket: bucket.into(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Fetch and parse the manifest stored at `key`.
    ///
    /// # Errors
    ///
    /// * `AgentError::Store` / `AgentError::Http` - the object could not be fetched
    /// * `AgentError::DataIntegrity` - the object is not a valid manifest document
    pub async fn load(&self, key: &str) -> Result<Manifest> {
        info!("Downloading manifest from {}/{}", self.bucket, key);
        let bytes = self.store.get_object(&self.bucket, key).await?;
        let manifest = Manifest::from_document(&bytes).map_err(|e| match e {
            AgentError::DataIntegrity(msg) => {
                AgentError::DataIntegrity(format!("{}/{}: {}", self.bucket, key, msg))
            }
            other => other,
        })?;
        info!("Loaded manifest {}/{}: {} files", self.bucket, key, manifest.len());
        Ok(manifest)
    }

    pub async fn save(&self, key: &str, manifest: &Manifest) -> Result<()> {
        let body = manifest.to_document()?;
        self.store.put_object(&self.bucket, key, body).await?;
        info!("Uploaded manifest to {}/{} ({} files)", self.bucket, key, manifest.len());
        Ok(())
    }
}
