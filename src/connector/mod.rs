//! The model-layer connector contract and its storage-backed implementation.
//!
//! A `Connector` is what the model layer calls in place of a database
//! driver. `StorageConnector` answers reads from a storage listing and
//! refuses every mutation.

pub mod options;
pub mod storage_connector;

use crate::services::{
    client_factory::ProviderRegistry, storage_client::StorageError, transfer::TransferError,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::info;

pub use options::StorageOptions;
pub use storage_connector::StorageConnector;

/// Property filter, keyed by property name.
pub type Where = Map<String, Value>;

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    #[serde(rename = "where", default, skip_serializing_if = "Map::is_empty")]
    pub where_: Where,
}

impl Filter {
    pub fn by(property: &str, value: Value) -> Self {
        let mut where_ = Where::new();
        where_.insert(property.to_string(), value);
        Self { where_ }
    }
}

/// What the connector needs to know about a model.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelDefinition {
    pub name: String,
    #[serde(default = "default_id_name")]
    pub id_name: String,
}

fn default_id_name() -> String {
    "id".to_string()
}

impl ModelDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id_name: default_id_name(),
        }
    }

    pub fn with_id_name(mut self, id_name: impl Into<String>) -> Self {
        self.id_name = id_name.into();
        self
    }
}

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Operation not permitted")]
    OperationNotPermitted,
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
}

pub type ConnectorResult<T> = Result<T, ConnectorError>;

#[async_trait]
pub trait Connector: Send + Sync {
    type Record: Serialize + Send;

    fn name(&self) -> &str;

    fn id_name(&self, model: &ModelDefinition) -> String {
        model.id_name.clone()
    }

    /// Called once per model attached to the data source.
    fn define(&self, _model: &ModelDefinition) {}

    async fn create(&self, model: &ModelDefinition, data: Value) -> ConnectorResult<Value>;
    async fn update_or_create(&self, model: &ModelDefinition, data: Value)
    -> ConnectorResult<Value>;
    async fn patch_or_create_with_where(
        &self,
        model: &ModelDefinition,
        where_: &Where,
        data: Value,
    ) -> ConnectorResult<Value>;
    async fn upsert_with_where(
        &self,
        model: &ModelDefinition,
        where_: &Where,
        data: Value,
    ) -> ConnectorResult<Value>;
    async fn find_or_create(
        &self,
        model: &ModelDefinition,
        filter: &Filter,
        data: Value,
    ) -> ConnectorResult<Value>;
    async fn save(&self, model: &ModelDefinition, data: Value) -> ConnectorResult<Value>;
    async fn destroy(&self, model: &ModelDefinition, id: &Value) -> ConnectorResult<()>;
    async fn destroy_all(&self, model: &ModelDefinition, where_: &Where) -> ConnectorResult<u64>;
    async fn count(&self, model: &ModelDefinition, where_: &Where) -> ConnectorResult<u64>;
    async fn update(
        &self,
        model: &ModelDefinition,
        where_: &Where,
        data: Value,
    ) -> ConnectorResult<u64>;
    async fn update_all(
        &self,
        model: &ModelDefinition,
        where_: &Where,
        data: Value,
    ) -> ConnectorResult<u64>;
    async fn update_attributes(
        &self,
        model: &ModelDefinition,
        id: &Value,
        data: Value,
    ) -> ConnectorResult<Value>;
    async fn replace_by_id(
        &self,
        model: &ModelDefinition,
        id: &Value,
        data: Value,
    ) -> ConnectorResult<Value>;
    async fn replace_or_create(&self, model: &ModelDefinition, data: Value)
    -> ConnectorResult<Value>;

    async fn exists(&self, model: &ModelDefinition, id: &Value) -> ConnectorResult<bool>;
    async fn find_by_id(
        &self,
        model: &ModelDefinition,
        id: &Value,
        filter: &Filter,
    ) -> ConnectorResult<Self::Record>;
    async fn all(&self, model: &ModelDefinition, filter: &Filter)
    -> ConnectorResult<Vec<Self::Record>>;

    /// Geo filters have no meaning for this backend.
    fn build_near_filter(&self, _filter: &Filter) -> Option<Filter> {
        None
    }

    async fn automigrate(&self, _models: &[ModelDefinition]) -> ConnectorResult<()> {
        Ok(())
    }

    /// No transactional semantics: the connector is its own transaction.
    fn transaction(&self) -> &Self
    where
        Self: Sized,
    {
        self
    }

    async fn exec(&self) -> ConnectorResult<()> {
        Ok(())
    }
}

/// Build the connector for a data source from its settings.
pub fn initialize(
    options: StorageOptions,
    registry: &ProviderRegistry,
    models: &[ModelDefinition],
) -> ConnectorResult<StorageConnector> {
    let connector = StorageConnector::new(options, registry)?;
    for model in models {
        connector.define(model);
    }
    info!(
        connector = connector.name(),
        provider = connector.client().provider(),
        container = connector.container(),
        models = models.len(),
        "data source initialized"
    );
    Ok(connector)
}
