//! Object storage abstraction.
//!
//! Provides a unified, bucket-scoped interface over S3, the local
//! filesystem, and an in-memory store (used by tests and dry runs). The
//! pipeline moves whole CSV objects around, so the surface is small:
//! list, head, get, put, and same-bucket copy.

mod local;
mod s3;

use bytes::Bytes;
use futures::StreamExt;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use regex::Regex;
use snafu::prelude::*;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::debug;

use crate::error::{InvalidKeySnafu, InvalidUrlSnafu, ObjectStoreSnafu, StorageError};

pub use local::LocalConfig;
pub use s3::S3Config;

/// Storage provider scoped to a single bucket (or directory).
#[derive(Clone)]
pub struct StorageProvider {
    pub(crate) config: BackendConfig,
    pub(crate) object_store: Arc<dyn ObjectStore>,
    pub(crate) canonical_url: String,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.canonical_url)
    }
}

// URL patterns for the supported backends
const S3_URL: &str = r"^[sS]3[aA]?://(?P<bucket>[a-z0-9\-\.]+)/?$";
const MEM_URL: &str = r"^mem://(?P<name>[a-zA-Z0-9\-_\.]+)/?$";
const FILE_URI: &str = r"^file://(?P<path>.*)$";
const FILE_PATH: &str = r"^/(?P<path>.*)$";

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
enum Backend {
    S3,
    Memory,
    Local,
}

fn matchers() -> &'static Vec<(Backend, Regex)> {
    static MATCHERS: OnceLock<Vec<(Backend, Regex)>> = OnceLock::new();
    MATCHERS.get_or_init(|| {
        vec![
            (Backend::S3, Regex::new(S3_URL).unwrap()),
            (Backend::Memory, Regex::new(MEM_URL).unwrap()),
            (Backend::Local, Regex::new(FILE_URI).unwrap()),
            (Backend::Local, Regex::new(FILE_PATH).unwrap()),
        ]
    })
}

/// Backend configuration enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    S3(S3Config),
    Local(LocalConfig),
    Memory { name: String },
}

impl BackendConfig {
    /// Parse a bucket URL into a backend configuration.
    pub fn parse_url(url: &str) -> Result<Self, StorageError> {
        for (backend, regex) in matchers() {
            let Some(captures) = regex.captures(url) else {
                continue;
            };
            return Ok(match backend {
                Backend::S3 => BackendConfig::S3(S3Config {
                    bucket: captures["bucket"].to_string(),
                    region: None,
                    endpoint: None,
                }),
                Backend::Memory => BackendConfig::Memory {
                    name: captures["name"].to_string(),
                },
                Backend::Local => BackendConfig::Local(LocalConfig {
                    path: if url.starts_with('/') {
                        url.to_string()
                    } else {
                        format!("/{}", &captures["path"])
                    },
                }),
            });
        }
        InvalidUrlSnafu { url }.fail()
    }

    /// The bucket (or directory, or store name) this config addresses.
    pub fn bucket(&self) -> &str {
        match self {
            BackendConfig::S3(s3) => &s3.bucket,
            BackendConfig::Local(local) => &local.path,
            BackendConfig::Memory { name } => name,
        }
    }
}

impl StorageProvider {
    /// Connect to the bucket addressed by `url`.
    pub async fn connect(
        url: &str,
        options: HashMap<String, String>,
    ) -> Result<Self, StorageError> {
        let config = BackendConfig::parse_url(url)?;
        match config {
            BackendConfig::S3(s3) => Self::construct_s3(s3, options).await,
            BackendConfig::Local(local) => Self::construct_local(local),
            BackendConfig::Memory { name } => Ok(Self::memory(&name)),
        }
    }

    /// Bucket name this provider is scoped to.
    pub fn bucket(&self) -> &str {
        self.config.bucket()
    }

    /// Canonical URL of the bucket.
    pub fn url(&self) -> &str {
        &self.canonical_url
    }

    /// List object keys under a prefix.
    pub async fn list(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let prefix_path = if prefix.is_empty() {
            None
        } else {
            Some(parse_key(prefix)?)
        };

        let mut stream = self.object_store.list(prefix_path.as_ref());
        let mut keys = Vec::new();
        while let Some(meta) = stream.next().await {
            let meta = meta.context(ObjectStoreSnafu)?;
            keys.push(meta.location.to_string());
        }
        debug!("[storage] listed {} objects under '{}'", keys.len(), prefix);
        Ok(keys)
    }

    /// Check whether an object exists (head request).
    pub async fn exists(&self, key: &str) -> Result<bool, StorageError> {
        let path = parse_key(key)?;
        match self.object_store.head(&path).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }

    /// Fetch a whole object.
    pub async fn get(&self, key: &str) -> Result<Bytes, StorageError> {
        let path = parse_key(key)?;
        let result = self.object_store.get(&path).await.context(ObjectStoreSnafu)?;
        result.bytes().await.context(ObjectStoreSnafu)
    }

    /// Write a whole object.
    pub async fn put(&self, key: &str, data: Bytes) -> Result<(), StorageError> {
        let path = parse_key(key)?;
        self.object_store
            .put(&path, PutPayload::from(data))
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Copy an object within this bucket, replacing the target if present.
    pub async fn copy(&self, from: &str, to: &str) -> Result<(), StorageError> {
        let from = parse_key(from)?;
        let to = parse_key(to)?;
        self.object_store
            .copy(&from, &to)
            .await
            .context(ObjectStoreSnafu)?;
        debug!("[storage] copied {} -> {}", from, to);
        Ok(())
    }
}

fn parse_key(key: &str) -> Result<Path, StorageError> {
    Path::parse(key).context(InvalidKeySnafu { key })
}
