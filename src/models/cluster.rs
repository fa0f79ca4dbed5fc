//! Managed-cluster records, the node-group analogue of MCIS/VM.

use super::KeyValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum ClusterStatus {
    Creating,
    Active,
    Updating,
    Deleting,
    Failed,
    Undefined,
}

impl ClusterStatus {
    pub fn from_driver_status(raw: &str) -> ClusterStatus {
        match raw.trim().to_lowercase().as_str() {
            "creating" => ClusterStatus::Creating,
            "active" | "running" => ClusterStatus::Active,
            "updating" | "upgrading" => ClusterStatus::Updating,
            "deleting" => ClusterStatus::Deleting,
            "failed" | "inactive" => ClusterStatus::Failed,
            _ => ClusterStatus::Undefined,
        }
    }
}

impl Display for ClusterStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            ClusterStatus::Creating => "Creating",
            ClusterStatus::Active => "Active",
            ClusterStatus::Updating => "Updating",
            ClusterStatus::Deleting => "Deleting",
            ClusterStatus::Failed => "Failed",
            ClusterStatus::Undefined => "Undefined",
        })
    }
}

#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub enum NodeGroupStatus {
    Creating,
    Active,
    Updating,
    Deleting,
    Failed,
    Undefined,
}

impl NodeGroupStatus {
    pub fn from_driver_status(raw: &str) -> NodeGroupStatus {
        match raw.trim().to_lowercase().as_str() {
            "creating" => NodeGroupStatus::Creating,
            "active" | "running" => NodeGroupStatus::Active,
            "updating" => NodeGroupStatus::Updating,
            "deleting" => NodeGroupStatus::Deleting,
            "failed" => NodeGroupStatus::Failed,
            _ => NodeGroupStatus::Undefined,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterNetwork {
    pub v_net_id: String,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ClusterAccessInfo {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub kubeconfig: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroup {
    pub id: String,
    pub uuid: String,
    pub image_id: String,
    pub spec_id: String,
    #[serde(default)]
    pub root_disk_type: String,
    #[serde(default)]
    pub root_disk_size: String,
    pub ssh_key_id: String,
    pub on_auto_scaling: bool,
    pub desired_node_size: u32,
    pub min_node_size: u32,
    pub max_node_size: u32,
    pub status: NodeGroupStatus,
    #[serde(default)]
    pub csp_resource_id: String,
    #[serde(default)]
    pub csp_resource_name: String,
    #[serde(default)]
    pub key_value_list: Vec<KeyValue>,
}

/// A managed cluster, persisted under `/ns/{nsId}/cluster/{clusterId}`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub id: String,
    pub uuid: String,
    pub connection_name: String,
    pub version: String,
    pub network: ClusterNetwork,
    pub ssh_key_id: String,
    #[serde(default)]
    pub node_group_list: Vec<NodeGroup>,
    pub status: ClusterStatus,
    #[serde(default)]
    pub access_info: ClusterAccessInfo,
    #[serde(default)]
    pub addons: Vec<KeyValue>,
    #[serde(default)]
    pub csp_resource_id: String,
    #[serde(default)]
    pub csp_resource_name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub label: BTreeMap<String, String>,
    #[serde(default)]
    pub system_label: String,
    #[serde(default)]
    pub created_time: String,
    #[serde(default)]
    pub key_value_list: Vec<KeyValue>,
}
