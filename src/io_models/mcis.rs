use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct McisReq {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub install_mon_agent: bool,
    #[serde(default)]
    pub label: BTreeMap<String, String>,
    #[serde(default)]
    pub system_label: String,
    pub vm: Vec<VmReq>,
}

/// A VM request. `sub_group_size > 1` expands into that many sibling VMs
/// named `{name}-{idx}`, all sharing `name` as their sub-group id.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VmReq {
    pub name: String,
    #[serde(default = "default_sub_group_size")]
    pub sub_group_size: u32,
    pub connection_name: String,
    pub spec_id: String,
    pub image_id: String,
    pub v_net_id: String,
    pub subnet_id: String,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    pub ssh_key_id: String,
    #[serde(default)]
    pub data_disk_ids: Vec<String>,
    #[serde(default)]
    pub root_disk_type: String,
    #[serde(default)]
    pub root_disk_size: String,
    #[serde(default)]
    pub vm_user_account: String,
    #[serde(default)]
    pub vm_user_password: String,
    #[serde(default)]
    pub description: String,
}

fn default_sub_group_size() -> u32 {
    1
}
