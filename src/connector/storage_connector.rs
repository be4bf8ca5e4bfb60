//! StorageConnector: exposes a storage container as a read-only model.
//!
//! Every record id owns the folder `"<id>/"` inside the container. Reads list
//! that folder; file operations resolve names inside it. All mutations of
//! the model itself are refused with "Operation not permitted".

use crate::{
    connector::{
        Connector, ConnectorError, ConnectorResult, Filter, ModelDefinition, StorageOptions, Where,
    },
    models::{
        file::StoredFile,
        record::{FileCollection, FileRecord},
    },
    services::{
        client_factory::{ProviderRegistry, create_client},
        storage_client::{ListOptions, StorageClient, StorageResult},
        transfer::{self, IncomingFile, UploadOptions, UploadResult},
    },
};
use async_trait::async_trait;
use axum::{extract::Multipart, response::Response};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

pub const CONNECTOR_NAME: &str = "storage";

#[derive(Clone)]
pub struct StorageConnector {
    client: Arc<dyn StorageClient>,
    options: Arc<StorageOptions>,
}

impl StorageConnector {
    /// Create the connector and its storage client. The client lives as long
    /// as the connector.
    pub fn new(options: StorageOptions, registry: &ProviderRegistry) -> StorageResult<Self> {
        let client = create_client(&options.client, registry)?;
        Ok(Self::with_client(options, client))
    }

    pub fn with_client(options: StorageOptions, client: Arc<dyn StorageClient>) -> Self {
        Self {
            client,
            options: Arc::new(options),
        }
    }

    pub fn client(&self) -> &Arc<dyn StorageClient> {
        &self.client
    }

    pub fn container(&self) -> &str {
        &self.options.container
    }

    pub fn options(&self) -> &StorageOptions {
        &self.options
    }

    async fn list(&self, prefix: Option<String>) -> ConnectorResult<Vec<StoredFile>> {
        let options = ListOptions { prefix };
        let files = self.client.get_files(self.container(), &options).await?;
        Ok(files)
    }

    /// Fetch one file owned by record `id`.
    pub async fn file(&self, id: &Value, file: &str) -> ConnectorResult<StoredFile> {
        let path = build_file_name(file, id);
        Ok(self.client.get_file(self.container(), &path).await?)
    }

    pub async fn remove_file(&self, id: &Value, file: &str) -> ConnectorResult<()> {
        let path = build_file_name(file, id);
        self.client.remove_file(self.container(), &path).await?;
        Ok(())
    }

    /// Store the files of a multipart request under record `id`.
    pub async fn upload(
        &self,
        id: &Value,
        multipart: Multipart,
        options: UploadOptions,
    ) -> ConnectorResult<UploadResult> {
        let options = self.upload_options(id, options);
        debug!(?options, "uploading");
        Ok(transfer::upload(self.client.as_ref(), multipart, &options).await?)
    }

    pub async fn download(&self, id: &Value, file: &str) -> ConnectorResult<Response> {
        let path = build_file_name(file, id);
        Ok(transfer::download(self.client.as_ref(), self.container(), &path).await?)
    }

    /// Fill the request's unset upload options from the connector's settings.
    ///
    /// The stored name is always scoped to the record folder, after the
    /// caller's (or else the connector's) `get_filename` has run.
    pub fn upload_options(&self, id: &Value, mut options: UploadOptions) -> UploadOptions {
        let defaults = &self.options;
        if options.container.is_none() {
            options.container = Some(defaults.container.clone());
        }

        let base = options
            .get_filename
            .take()
            .or_else(|| defaults.get_filename.clone());
        let owner = id.clone();
        options.get_filename = Some(Arc::new(move |file: &IncomingFile| {
            let name = match &base {
                Some(get_filename) => get_filename(file),
                None => file.name.clone(),
            };
            build_file_name(&name, &owner)
        }));

        if options.acl.is_none() {
            options.acl = defaults.acl.clone();
        }
        if options.allowed_content_types.is_none() {
            options.allowed_content_types = defaults.allowed_content_types.clone();
        }
        if options.max_file_size.is_none() {
            options.max_file_size = defaults.max_file_size;
        }
        if options.name_conflict.is_none() {
            options.name_conflict = defaults.name_conflict;
        }
        if options.max_fields_size.is_none() {
            options.max_fields_size = defaults.max_fields_size;
        }
        options
    }
}

async fn not_permitted<T>() -> ConnectorResult<T> {
    // Stay asynchronous even though no I/O happens.
    tokio::task::yield_now().await;
    Err(ConnectorError::OperationNotPermitted)
}

/// Empty ids (null, false, 0, "") list the whole container.
fn scopes_listing(id: &Value) -> bool {
    match id {
        Value::Null => false,
        Value::Bool(flag) => *flag,
        Value::Number(n) => n.as_f64().is_some_and(|v| v != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Path segment for a record id: strings verbatim, anything else as JSON.
fn id_segment(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Folder owned by record `id`.
pub fn build_id(id: &Value) -> String {
    format!("{}/", id_segment(id))
}

/// Resolve `file` inside the folder of record `id`.
pub fn build_file_name(file: &str, id: &Value) -> String {
    let folder = build_id(id);
    if file.starts_with(&folder) {
        file.to_string()
    } else {
        format!("{}{}", folder, file)
    }
}

/// Turn a listing into file records, dropping zero-size entries.
///
/// Without an explicit folder each file is attributed to its first path
/// segment; objects at the container root have no owner.
pub fn map_files(
    files: &[StoredFile],
    folder: Option<&str>,
    id: Option<&Value>,
) -> Vec<FileRecord> {
    files
        .iter()
        .filter(|file| file.size() > 0)
        .map(|file| {
            let full_name = file.name();
            let folder = match folder {
                Some(folder) => folder.to_string(),
                None => match full_name.find('/') {
                    Some(pos) => full_name[..=pos].to_string(),
                    None => String::new(),
                },
            };
            let id = match id {
                Some(id) => id.clone(),
                None if folder.is_empty() => Value::Null,
                None => Value::String(folder.trim_end_matches('/').to_string()),
            };
            FileRecord {
                id,
                name: full_name
                    .strip_prefix(folder.as_str())
                    .unwrap_or(full_name)
                    .to_string(),
                folder,
                full_name: full_name.to_string(),
            }
        })
        .collect()
}

#[async_trait]
impl Connector for StorageConnector {
    type Record = FileCollection;

    fn name(&self) -> &str {
        CONNECTOR_NAME
    }

    async fn create(&self, _model: &ModelDefinition, _data: Value) -> ConnectorResult<Value> {
        not_permitted().await
    }

    async fn update_or_create(
        &self,
        _model: &ModelDefinition,
        _data: Value,
    ) -> ConnectorResult<Value> {
        not_permitted().await
    }

    async fn patch_or_create_with_where(
        &self,
        _model: &ModelDefinition,
        _where: &Where,
        _data: Value,
    ) -> ConnectorResult<Value> {
        not_permitted().await
    }

    async fn upsert_with_where(
        &self,
        _model: &ModelDefinition,
        _where: &Where,
        _data: Value,
    ) -> ConnectorResult<Value> {
        not_permitted().await
    }

    async fn find_or_create(
        &self,
        _model: &ModelDefinition,
        _filter: &Filter,
        _data: Value,
    ) -> ConnectorResult<Value> {
        not_permitted().await
    }

    async fn save(&self, _model: &ModelDefinition, _data: Value) -> ConnectorResult<Value> {
        not_permitted().await
    }

    async fn destroy(&self, _model: &ModelDefinition, _id: &Value) -> ConnectorResult<()> {
        not_permitted().await
    }

    async fn destroy_all(&self, _model: &ModelDefinition, _where: &Where) -> ConnectorResult<u64> {
        not_permitted().await
    }

    async fn count(&self, _model: &ModelDefinition, _where: &Where) -> ConnectorResult<u64> {
        not_permitted().await
    }

    async fn update(
        &self,
        _model: &ModelDefinition,
        _where: &Where,
        _data: Value,
    ) -> ConnectorResult<u64> {
        not_permitted().await
    }

    async fn update_all(
        &self,
        _model: &ModelDefinition,
        _where: &Where,
        _data: Value,
    ) -> ConnectorResult<u64> {
        not_permitted().await
    }

    async fn update_attributes(
        &self,
        _model: &ModelDefinition,
        _id: &Value,
        _data: Value,
    ) -> ConnectorResult<Value> {
        not_permitted().await
    }

    async fn replace_by_id(
        &self,
        _model: &ModelDefinition,
        _id: &Value,
        _data: Value,
    ) -> ConnectorResult<Value> {
        not_permitted().await
    }

    async fn replace_or_create(
        &self,
        _model: &ModelDefinition,
        _data: Value,
    ) -> ConnectorResult<Value> {
        not_permitted().await
    }

    async fn exists(&self, _model: &ModelDefinition, id: &Value) -> ConnectorResult<bool> {
        let folder = build_id(id);
        let files = self.list(Some(folder.clone())).await?;
        Ok(!map_files(&files, Some(folder.as_str()), Some(id)).is_empty())
    }

    async fn find_by_id(
        &self,
        model: &ModelDefinition,
        id: &Value,
        _filter: &Filter,
    ) -> ConnectorResult<FileCollection> {
        let folder = build_id(id);
        let files = self.list(Some(folder.clone())).await?;
        let records = map_files(&files, Some(folder.as_str()), Some(id));
        Ok(FileCollection::scoped(
            records,
            id.clone(),
            folder,
            &self.id_name(model),
        ))
    }

    async fn all(
        &self,
        model: &ModelDefinition,
        filter: &Filter,
    ) -> ConnectorResult<Vec<FileCollection>> {
        let id_name = self.id_name(model);
        let collection = match filter.where_.get(&id_name).filter(|id| scopes_listing(id)) {
            Some(id) => {
                let folder = build_id(id);
                let files = self.list(Some(folder.clone())).await?;
                let records = map_files(&files, Some(folder.as_str()), Some(id));
                FileCollection::scoped(records, id.clone(), folder, &id_name)
            }
            None => {
                let files = self.list(None).await?;
                FileCollection::unscoped(map_files(&files, None, None), &id_name)
            }
        };
        Ok(vec![collection])
    }
}
