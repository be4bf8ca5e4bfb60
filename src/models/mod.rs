//! Data models for the storage connector.
//!
//! `file` describes objects as the storage client reports them; `record`
//! describes the pseudo-records built from them for the model layer. Both
//! serialize as JSON via `serde`.

pub mod file;
pub mod record;
