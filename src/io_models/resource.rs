use crate::models::resource::FirewallRule;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VNetReq {
    pub name: String,
    pub connection_name: String,
    pub cidr_block: String,
    #[serde(default)]
    pub subnet_info_list: Vec<SubnetReq>,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SubnetReq {
    pub name: String,
    pub cidr_block: String,
    #[serde(default)]
    pub description: String,
}

/// Registers a VPC that already exists on the CSP side; nothing is created
/// on the cloud.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VNetRegisterReq {
    pub name: String,
    pub connection_name: String,
    pub csp_resource_id: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SecurityGroupReq {
    pub name: String,
    pub connection_name: String,
    pub v_net_id: String,
    #[serde(default)]
    pub firewall_rules: Vec<FirewallRule>,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SshKeyReq {
    pub name: String,
    pub connection_name: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageReq {
    pub name: String,
    pub connection_name: String,
    pub csp_image_name: String,
    #[serde(default)]
    pub guest_os: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VmSpecReq {
    pub name: String,
    pub connection_name: String,
    pub csp_spec_name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DataDiskReq {
    pub name: String,
    pub connection_name: String,
    pub disk_type: String,
    pub disk_size: String,
    #[serde(default)]
    pub description: String,
}
