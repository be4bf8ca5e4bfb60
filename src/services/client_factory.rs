//! Resolves a provider name into a live `StorageClient`.
//!
//! Lookup order: providers registered on the `ProviderRegistry`, then the
//! built-in OpenDAL providers. An unknown name never fails; it falls back to
//! the filesystem provider.

use crate::services::{
    opendal_client::OpendalClient,
    storage_client::{StorageClient, StorageError, StorageResult},
};
use opendal::{
    Operator,
    layers::LoggingLayer,
    services::{Fs, Memory, S3},
};
use serde::Deserialize;
use std::{collections::HashMap, fmt, sync::Arc};
use tracing::{info, warn};

pub const DEFAULT_PROVIDER: &str = "filesystem";
pub const DEFAULT_ROOT: &str = "./data/storage";
const DEFAULT_S3_REGION: &str = "us-east-1";

/// Provider selection plus whatever credentials the provider needs.
#[derive(Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    pub provider: Option<String>,
    /// Root folder (filesystem) or key prefix (object stores).
    pub root: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("provider", &self.provider)
            .field("root", &self.root)
            .field("bucket", &self.bucket)
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .field("access_key_id", &self.access_key_id)
            .field(
                "secret_access_key",
                &self.secret_access_key.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

pub type ProviderFactory =
    Arc<dyn Fn(&ClientOptions) -> StorageResult<Arc<dyn StorageClient>> + Send + Sync>;

/// Additional providers, looked up by name before the built-in ones.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&ClientOptions) -> StorageResult<Arc<dyn StorageClient>> + Send + Sync + 'static,
    {
        self.providers
            .insert(name.into().to_ascii_lowercase(), Arc::new(factory));
        self
    }

    pub fn get(&self, name: &str) -> Option<&ProviderFactory> {
        self.providers.get(&name.to_ascii_lowercase())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuiltinProvider {
    Filesystem,
    Memory,
    S3,
}

impl BuiltinProvider {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "filesystem" | "fs" | "local" => Some(Self::Filesystem),
            "memory" | "mem" => Some(Self::Memory),
            "s3" | "amazon" | "aws" => Some(Self::S3),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Filesystem => "filesystem",
            Self::Memory => "memory",
            Self::S3 => "s3",
        }
    }

    fn operator(self, options: &ClientOptions) -> StorageResult<Operator> {
        let op = match self {
            Self::Filesystem => {
                let root = options.root.as_deref().unwrap_or(DEFAULT_ROOT);
                Operator::new(Fs::default().root(root))?
                    .layer(LoggingLayer::default())
                    .finish()
            }
            Self::Memory => {
                let mut builder = Memory::default();
                if let Some(root) = options.root.as_deref() {
                    builder = builder.root(root);
                }
                Operator::new(builder)?
                    .layer(LoggingLayer::default())
                    .finish()
            }
            Self::S3 => {
                let bucket = options.bucket.as_deref().ok_or_else(|| {
                    StorageError::InvalidConfig {
                        provider: self.name().into(),
                        reason: "bucket is required".into(),
                    }
                })?;
                let mut builder = S3::default()
                    .bucket(bucket)
                    .region(options.region.as_deref().unwrap_or(DEFAULT_S3_REGION));
                if let Some(root) = options.root.as_deref() {
                    builder = builder.root(root);
                }
                if let Some(endpoint) = options.endpoint.as_deref().filter(|e| !e.is_empty()) {
                    builder = builder.endpoint(endpoint);
                }
                if let Some(key_id) = options.access_key_id.as_deref() {
                    builder = builder.access_key_id(key_id);
                }
                if let Some(secret) = options.secret_access_key.as_deref() {
                    builder = builder.secret_access_key(secret);
                }
                Operator::new(builder)?
                    .layer(LoggingLayer::default())
                    .finish()
            }
        };
        Ok(op)
    }
}

/// Build the storage client for `options.provider`.
pub fn create_client(
    options: &ClientOptions,
    registry: &ProviderRegistry,
) -> StorageResult<Arc<dyn StorageClient>> {
    let requested = options.provider.as_deref().unwrap_or(DEFAULT_PROVIDER);

    if let Some(factory) = registry.get(requested) {
        info!(provider = requested, "using registered storage provider");
        return factory(options);
    }

    let provider = BuiltinProvider::from_name(requested).unwrap_or_else(|| {
        warn!(
            provider = requested,
            fallback = DEFAULT_PROVIDER,
            "unknown storage provider, falling back"
        );
        BuiltinProvider::Filesystem
    });

    let operator = provider.operator(options)?;
    info!(provider = provider.name(), "storage client ready");
    Ok(Arc::new(OpendalClient::new(provider.name(), operator)))
}
