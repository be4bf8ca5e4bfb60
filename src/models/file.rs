//! Represents an object (file) returned by a storage provider.
//!
//! Providers describe their objects differently. `StoredFile` keeps the
//! provider's own description in `raw_metadata` and a normalized
//! `FileMetadata` beside it, so callers read metadata the same way no matter
//! which provider produced the file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

/// Provider-independent description of a stored object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Container (top-level folder) the object lives in.
    pub container: String,

    /// Object key relative to the container (e.g. `42/report.pdf`).
    pub name: String,

    /// Size in bytes. Directory markers report 0.
    pub size: u64,

    /// Content type (MIME type), when the provider records one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Provider etag or checksum.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,

    /// Timestamp when the object was last modified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
}

/// A single object as seen through a storage client.
#[derive(Clone, Debug)]
pub struct StoredFile {
    metadata: FileMetadata,
    raw_metadata: Map<String, Value>,
}

impl StoredFile {
    pub fn new(metadata: FileMetadata, raw_metadata: Map<String, Value>) -> Self {
        Self {
            metadata,
            raw_metadata,
        }
    }

    /// Build a file from normalized metadata only; the raw view mirrors it.
    pub fn from_metadata(metadata: FileMetadata) -> Self {
        let raw_metadata = match serde_json::to_value(&metadata) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self::new(metadata, raw_metadata)
    }

    pub fn metadata(&self) -> &FileMetadata {
        &self.metadata
    }

    /// Metadata exactly as the provider reported it.
    pub fn raw_metadata(&self) -> &Map<String, Value> {
        &self.raw_metadata
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn size(&self) -> u64 {
        self.metadata.size
    }
}

impl Serialize for StoredFile {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.metadata.serialize(serializer)
    }
}
