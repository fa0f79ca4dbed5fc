use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterReq {
    pub name: String,
    pub connection_name: String,
    pub version: String,
    pub v_net_id: String,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    pub ssh_key_id: String,
    #[serde(default)]
    pub node_group_list: Vec<NodeGroupReq>,
    #[serde(default)]
    pub label: BTreeMap<String, String>,
    #[serde(default)]
    pub system_label: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeGroupReq {
    pub name: String,
    pub image_id: String,
    pub spec_id: String,
    #[serde(default)]
    pub root_disk_type: String,
    #[serde(default)]
    pub root_disk_size: String,
    pub ssh_key_id: String,
    #[serde(default)]
    pub on_auto_scaling: bool,
    #[serde(default = "default_node_size")]
    pub desired_node_size: u32,
    #[serde(default = "default_node_size")]
    pub min_node_size: u32,
    #[serde(default = "default_node_size")]
    pub max_node_size: u32,
}

fn default_node_size() -> u32 {
    1
}
