//! Tenant-facing request payloads. These are the declarative inputs the
//! embedding API layer binds and hands to the engine.

pub mod cluster;
pub mod mcis;
pub mod resource;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceReq {
    pub name: String,
    #[serde(default)]
    pub description: String,
}
