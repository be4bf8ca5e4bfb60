//! Connector-level settings. Fixed at construction; upload requests fall
//! back to them for anything they leave unset.

use crate::services::{
    client_factory::ClientOptions,
    transfer::{FilenameFn, NameConflict},
};
use std::fmt;

#[derive(Clone, Default)]
pub struct StorageOptions {
    /// Provider name and credentials.
    pub client: ClientOptions,
    pub container: String,
    pub get_filename: Option<FilenameFn>,
    pub acl: Option<String>,
    pub allowed_content_types: Option<Vec<String>>,
    pub max_file_size: Option<u64>,
    pub max_fields_size: Option<u64>,
    pub name_conflict: Option<NameConflict>,
}

impl StorageOptions {
    pub fn new(client: ClientOptions, container: impl Into<String>) -> Self {
        Self {
            client,
            container: container.into(),
            ..Default::default()
        }
    }

    pub fn provider(&self) -> Option<&str> {
        self.client.provider.as_deref()
    }
}

impl fmt::Debug for StorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageOptions")
            .field("client", &self.client)
            .field("container", &self.container)
            .field("get_filename", &self.get_filename.is_some())
            .field("acl", &self.acl)
            .field("allowed_content_types", &self.allowed_content_types)
            .field("max_file_size", &self.max_file_size)
            .field("max_fields_size", &self.max_fields_size)
            .field("name_conflict", &self.name_conflict)
            .finish()
    }
}
