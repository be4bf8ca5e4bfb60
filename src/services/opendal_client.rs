//! `StorageClient` backed by an OpenDAL operator.
//!
//! One `OpendalClient` is built per provider. Containers are top-level
//! folders beneath the operator root, so `uploads` + `42/a.txt` is stored at
//! `uploads/42/a.txt`.

use crate::{
    models::file::{FileMetadata, StoredFile},
    services::storage_client::{
        ByteStream, FileWriter, ListOptions, StorageClient, StorageError, StorageResult,
        WriteOptions,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use opendal::{ErrorKind, Metadata, Operator, Writer};
use serde_json::{Map, Value, json};
use tracing::debug;

#[derive(Clone, Debug)]
pub struct OpendalClient {
    provider: String,
    operator: Operator,
}

impl OpendalClient {
    pub fn new(provider: impl Into<String>, operator: Operator) -> Self {
        Self {
            provider: provider.into(),
            operator,
        }
    }

    /// Folder holding everything in `container`, always ending with `/`.
    fn container_root(container: &str) -> String {
        let trimmed = container.trim_matches('/');
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("{}/", trimmed)
        }
    }

    fn object_path(container: &str, path: &str) -> String {
        format!(
            "{}{}",
            Self::container_root(container),
            path.trim_start_matches('/')
        )
    }

    fn not_found(err: opendal::Error, container: &str, path: &str) -> StorageError {
        if err.kind() == ErrorKind::NotFound {
            StorageError::NotFound {
                container: container.to_string(),
                path: path.to_string(),
            }
        } else {
            StorageError::Provider(err)
        }
    }

    /// A listed entry deleted before its stat is dropped from the listing.
    fn still_present(stat: opendal::Result<Metadata>) -> StorageResult<Option<Metadata>> {
        match stat {
            Ok(meta) => Ok(Some(meta)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(StorageError::Provider(err)),
        }
    }

    /// Normalize OpenDAL metadata and keep the provider's view next to it.
    fn stored_file(&self, container: &str, key: String, meta: &Metadata) -> StoredFile {
        let mode = if meta.mode().is_dir() {
            "dir"
        } else if meta.mode().is_file() {
            "file"
        } else {
            "unknown"
        };
        let size = if meta.mode().is_dir() {
            0
        } else {
            meta.content_length()
        };

        let mut raw = Map::new();
        raw.insert("provider".into(), json!(self.provider));
        raw.insert("path".into(), json!(Self::object_path(container, &key)));
        raw.insert("mode".into(), json!(mode));
        raw.insert("content_length".into(), json!(size));
        if let Some(value) = meta.content_type() {
            raw.insert("content_type".into(), json!(value));
        }
        if let Some(value) = meta.content_md5() {
            raw.insert("content_md5".into(), json!(value));
        }
        if let Some(value) = meta.etag() {
            raw.insert("etag".into(), json!(value));
        }
        if let Some(value) = meta.version() {
            raw.insert("version".into(), json!(value));
        }
        if let Some(value) = meta.last_modified() {
            raw.insert("last_modified".into(), json!(value.to_rfc3339()));
        }

        let metadata = FileMetadata {
            container: container.to_string(),
            name: key,
            size,
            content_type: meta.content_type().map(str::to_string),
            etag: meta
                .etag()
                .or_else(|| meta.content_md5())
                .map(str::to_string),
            last_modified: meta.last_modified(),
        };
        StoredFile::new(metadata, raw)
    }

    /// Zero-size placeholder for a folder entry.
    fn folder_marker(&self, container: &str, key: String) -> StoredFile {
        let mut raw = Map::new();
        raw.insert("provider".into(), json!(self.provider));
        raw.insert("path".into(), json!(Self::object_path(container, &key)));
        raw.insert("mode".into(), json!("dir"));
        raw.insert("content_length".into(), Value::from(0));
        StoredFile::new(
            FileMetadata {
                container: container.to_string(),
                name: key,
                size: 0,
                content_type: None,
                etag: None,
                last_modified: None,
            },
            raw,
        )
    }

    async fn stat(&self, container: &str, path: &str) -> StorageResult<StoredFile> {
        let full = Self::object_path(container, path);
        let meta = self
            .operator
            .stat(&full)
            .await
            .map_err(|err| Self::not_found(err, container, path))?;
        Ok(self.stored_file(container, path.trim_start_matches('/').to_string(), &meta))
    }
}

#[async_trait]
impl StorageClient for OpendalClient {
    fn provider(&self) -> &str {
        &self.provider
    }

    async fn get_files(
        &self,
        container: &str,
        options: &ListOptions,
    ) -> StorageResult<Vec<StoredFile>> {
        let root = Self::container_root(container);
        let prefix = format!(
            "{}{}",
            root,
            options
                .prefix
                .as_deref()
                .unwrap_or_default()
                .trim_start_matches('/')
        );
        // Listing works on folders; narrow to the exact prefix afterwards.
        let list_dir = match prefix.rfind('/') {
            Some(pos) => prefix[..=pos].to_string(),
            None => "/".to_string(),
        };

        let mut lister = match self.operator.lister_with(&list_dir).recursive(true).await {
            Ok(lister) => lister,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::Provider(err)),
        };

        let mut files = Vec::new();
        while let Some(entry) = lister.try_next().await? {
            let path = entry.path();
            if !path.starts_with(&prefix) {
                continue;
            }
            let key = path.strip_prefix(&root).unwrap_or(path).to_string();
            if key.is_empty() {
                continue;
            }
            if entry.metadata().mode().is_dir() {
                files.push(self.folder_marker(container, key));
                continue;
            }
            match Self::still_present(self.operator.stat(path).await)? {
                Some(meta) => files.push(self.stored_file(container, key, &meta)),
                None => debug!(provider = %self.provider, path, "entry vanished while listing"),
            }
        }
        files.sort_by(|a, b| a.name().cmp(b.name()));

        debug!(
            provider = %self.provider,
            container,
            prefix = %prefix,
            count = files.len(),
            "listed files"
        );
        Ok(files)
    }

    async fn get_file(&self, container: &str, path: &str) -> StorageResult<StoredFile> {
        self.stat(container, path).await
    }

    async fn remove_file(&self, container: &str, path: &str) -> StorageResult<()> {
        // Deletes are idempotent in OpenDAL; surface a missing object instead.
        self.stat(container, path).await?;
        self.operator
            .delete(&Self::object_path(container, path))
            .await?;
        debug!(provider = %self.provider, container, path, "removed file");
        Ok(())
    }

    async fn writer(
        &self,
        container: &str,
        path: &str,
        options: &WriteOptions,
    ) -> StorageResult<Box<dyn FileWriter>> {
        let full = Self::object_path(container, path);
        let mut builder = self.operator.writer_with(&full);
        if let Some(content_type) = options.content_type.as_deref() {
            builder = builder.content_type(content_type);
        }
        if let Some(acl) = options.acl.as_deref() {
            debug!(provider = %self.provider, acl, "per-object ACL not applied by this provider");
        }
        let inner = builder.await?;

        Ok(Box::new(OpendalWriter {
            client: self.clone(),
            inner,
            container: container.to_string(),
            path: path.trim_start_matches('/').to_string(),
        }))
    }

    async fn read(&self, container: &str, path: &str) -> StorageResult<(StoredFile, ByteStream)> {
        let file = self.stat(container, path).await?;
        let reader = self
            .operator
            .reader(&Self::object_path(container, path))
            .await
            .map_err(|err| Self::not_found(err, container, path))?;
        let stream = reader.into_bytes_stream(..).await?;
        Ok((file, stream.boxed()))
    }

    async fn check(&self) -> StorageResult<()> {
        self.operator.check().await?;
        Ok(())
    }
}

struct OpendalWriter {
    client: OpendalClient,
    inner: Writer,
    container: String,
    path: String,
}

#[async_trait]
impl FileWriter for OpendalWriter {
    async fn write(&mut self, chunk: Bytes) -> StorageResult<()> {
        self.inner.write(chunk).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> StorageResult<StoredFile> {
        let mut this = *self;
        this.inner.close().await?;
        this.client.stat(&this.container, &this.path).await
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        let mut this = *self;
        this.inner.abort().await?;
        Ok(())
    }
}
