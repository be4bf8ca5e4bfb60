//! Pseudo-records the connector hands back to the model layer.
//!
//! Nothing here is persisted: records are rebuilt from a listing on every
//! request.

use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};
use serde_json::Value;

/// One file owned by a record.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FileRecord {
    /// Id of the owning record.
    pub id: Value,

    /// Folder derived from the owning id (e.g. `42/`).
    pub folder: String,

    /// Key relative to `folder`.
    pub name: String,

    /// Full object key within the container.
    pub full_name: String,
}

/// The files of one record (or of the whole container), exposed as a single
/// record.
#[derive(Clone, Debug, PartialEq)]
pub struct FileCollection {
    pub files: Vec<FileRecord>,
    pub id: Option<Value>,
    pub folder: Option<String>,
    /// Property name the id is emitted under.
    pub id_name: String,
}

impl FileCollection {
    pub fn scoped(files: Vec<FileRecord>, id: Value, folder: String, id_name: &str) -> Self {
        Self {
            files,
            id: Some(id),
            folder: Some(folder),
            id_name: id_name.to_string(),
        }
    }

    pub fn unscoped(files: Vec<FileRecord>, id_name: &str) -> Self {
        Self {
            files,
            id: None,
            folder: None,
            id_name: id_name.to_string(),
        }
    }
}

impl Serialize for FileCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("files", &self.files)?;
        if let Some(id) = &self.id {
            map.serialize_entry(&self.id_name, id)?;
        }
        if let Some(folder) = &self.folder {
            map.serialize_entry("folder", folder)?;
        }
        map.end()
    }
}
