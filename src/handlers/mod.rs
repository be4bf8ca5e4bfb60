//! HTTP handlers. Each one translates a request into a connector call and
//! the connector's answer (or error) into a response.

pub mod file_handlers;
pub mod health_handlers;
pub mod model_handlers;

use crate::connector::{ModelDefinition, StorageConnector};
use serde_json::Value;
use std::sync::Arc;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub connector: StorageConnector,
    pub model: Arc<ModelDefinition>,
}

impl AppState {
    pub fn new(connector: StorageConnector, model: ModelDefinition) -> Self {
        Self {
            connector,
            model: Arc::new(model),
        }
    }
}

/// Record ids arrive as path text; canonical integers become JSON numbers
/// so the folder name is unchanged either way.
pub fn parse_id(raw: &str) -> Value {
    match raw.parse::<i64>() {
        Ok(n) if n.to_string() == raw => Value::from(n),
        _ => Value::String(raw.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_ids_stay_numbers() {
        assert_eq!(parse_id("42"), json!(42));
        assert_eq!(parse_id("-3"), json!(-3));
        assert_eq!(parse_id("042"), json!("042"));
        assert_eq!(parse_id("042a"), json!("042a"));
        assert_eq!(parse_id("4.5"), json!("4.5"));
    }
}
