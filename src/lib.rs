//! File storage exposed as a read-only model.
//!
//! A [`connector::storage_connector::StorageConnector`] lists a storage
//! container through a [`services::storage_client::StorageClient`] and hands
//! the files back as pseudo-records. The `routes` module mounts the model
//! and its per-record file operations on an axum router.

pub mod config;
pub mod connector;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
