pub mod cluster;
pub mod mcis;
pub mod resource;

use serde::{Deserialize, Serialize};

/// Opaque driver-supplied metadata attached to CSP-backed entities.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
pub struct KeyValue {
    pub key: String,
    pub value: String,
}

impl KeyValue {
    pub fn new(key: String, value: String) -> Self {
        KeyValue { key, value }
    }
}

/// Logical tenant container. Every other entity is keyed under a namespace.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Namespace {
    pub id: String,
    pub uuid: String,
    #[serde(default)]
    pub description: String,
}
