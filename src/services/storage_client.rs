//! The storage client contract the connector and the transfer handler talk
//! to. Provider differences stay behind this trait.

use crate::models::file::StoredFile;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use std::io;
use thiserror::Error;

/// Streaming object body.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    /// Only list keys starting with this prefix (relative to the container).
    pub prefix: Option<String>,
}

impl ListOptions {
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct WriteOptions {
    pub content_type: Option<String>,
    pub acl: Option<String>,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("file `{path}` not found in container `{container}`")]
    NotFound { container: String, path: String },
    #[error("provider `{provider}` misconfigured: {reason}")]
    InvalidConfig { provider: String, reason: String },
    #[error(transparent)]
    Provider(#[from] opendal::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// An in-progress upload. Must be finished with `close` or `abort`.
#[async_trait]
pub trait FileWriter: Send {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()>;

    /// Commit the upload and describe the stored object.
    async fn close(self: Box<Self>) -> StorageResult<StoredFile>;

    /// Discard whatever has been written so far.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Name of the provider backing this client.
    fn provider(&self) -> &str;

    /// Recursively list objects in `container`.
    async fn get_files(
        &self,
        container: &str,
        options: &ListOptions,
    ) -> StorageResult<Vec<StoredFile>>;

    async fn get_file(&self, container: &str, path: &str) -> StorageResult<StoredFile>;

    async fn remove_file(&self, container: &str, path: &str) -> StorageResult<()>;

    async fn writer(
        &self,
        container: &str,
        path: &str,
        options: &WriteOptions,
    ) -> StorageResult<Box<dyn FileWriter>>;

    async fn read(&self, container: &str, path: &str) -> StorageResult<(StoredFile, ByteStream)>;

    /// Verify the backend is reachable.
    async fn check(&self) -> StorageResult<()>;
}
