//! Local filesystem and in-memory storage backends.
//!
//! The in-memory backend exists for tests and dry runs; the local backend
//! is handy when exercising adapters against files on disk.

use object_store::ObjectStore;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use snafu::prelude::*;
use std::sync::Arc;

use crate::error::{LocalConfigSnafu, StorageError};

use super::{BackendConfig, StorageProvider};

/// Local filesystem configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalConfig {
    pub path: String,
}

impl StorageProvider {
    pub(super) fn construct_local(config: LocalConfig) -> Result<Self, StorageError> {
        let store = LocalFileSystem::new_with_prefix(&config.path).context(LocalConfigSnafu)?;
        let canonical_url = format!("file://{}", config.path);
        Ok(Self {
            config: BackendConfig::Local(config),
            object_store: Arc::new(store),
            canonical_url,
        })
    }

    /// An in-memory provider. Objects live as long as the provider (and
    /// its clones), which is exactly what adapter tests need.
    pub fn memory(name: &str) -> Self {
        Self {
            config: BackendConfig::Memory {
                name: name.to_string(),
            },
            object_store: Arc::new(InMemory::new()),
            canonical_url: format!("mem://{name}"),
        }
    }
}
