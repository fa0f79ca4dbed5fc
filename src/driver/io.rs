//! Wire types of the Spider driver REST contract. Field names are the
//! driver's PascalCase ones; everything here serializes exactly as it goes
//! over the wire.

use serde::{Deserialize, Serialize};

/// Identity pair returned by the driver for every CSP-backed object.
/// `name_id` is driver-local, `system_id` is CSP-native. Both are preserved
/// verbatim.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct IId {
    #[serde(rename = "NameId", default)]
    pub name_id: String,
    #[serde(rename = "SystemId", default)]
    pub system_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DriverKeyValue {
    #[serde(rename = "Key", default)]
    pub key: String,
    #[serde(rename = "Value", default)]
    pub value: String,
}

/// Envelope of every driver request: the connection triple plus the
/// operation payload.
#[derive(Serialize, Clone, Debug)]
pub struct DriverRequest<T: Serialize> {
    #[serde(rename = "ConnectionName")]
    pub connection_name: String,
    #[serde(rename = "ReqInfo")]
    pub req_info: T,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct VpcReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IPv4_CIDR")]
    pub ipv4_cidr: String,
    #[serde(rename = "SubnetInfoList", default)]
    pub subnet_info_list: Vec<SubnetReqInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SubnetReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "IPv4_CIDR")]
    pub ipv4_cidr: String,
}

/// Payload of `POST /regvpc`: adopt an existing CSP VPC under driver
/// management.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RegisterVpcReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CSPId")]
    pub csp_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VpcInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "IPv4_CIDR", default)]
    pub ipv4_cidr: String,
    #[serde(rename = "SubnetInfoList", default)]
    pub subnet_info_list: Vec<SubnetInfo>,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<DriverKeyValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SubnetInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "IPv4_CIDR", default)]
    pub ipv4_cidr: String,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<DriverKeyValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SecurityGroupReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "VPCName")]
    pub vpc_name: String,
    #[serde(rename = "SecurityRules", default)]
    pub security_rules: Vec<SecurityRuleInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityRuleInfo {
    #[serde(rename = "FromPort", default)]
    pub from_port: String,
    #[serde(rename = "ToPort", default)]
    pub to_port: String,
    #[serde(rename = "IPProtocol", default)]
    pub ip_protocol: String,
    #[serde(rename = "Direction", default)]
    pub direction: String,
    #[serde(rename = "CIDR", default)]
    pub cidr: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SecurityGroupInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "VpcIID", default)]
    pub vpc_iid: IId,
    #[serde(rename = "SecurityRules", default)]
    pub security_rules: Vec<SecurityRuleInfo>,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<DriverKeyValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct KeyPairReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyPairInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "Fingerprint", default)]
    pub fingerprint: String,
    #[serde(rename = "PublicKey", default)]
    pub public_key: String,
    #[serde(rename = "PrivateKey", default)]
    pub private_key: String,
    #[serde(rename = "VMUserID", default)]
    pub vm_user_id: String,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<DriverKeyValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "GuestOS", default)]
    pub guest_os: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<DriverKeyValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VmSpecVCpu {
    #[serde(rename = "Count", default)]
    pub count: String,
    #[serde(rename = "Clock", default)]
    pub clock: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VmSpecInfo {
    #[serde(rename = "Region", default)]
    pub region: String,
    #[serde(rename = "Name", default)]
    pub name: String,
    #[serde(rename = "VCpu", default)]
    pub v_cpu: VmSpecVCpu,
    #[serde(rename = "Mem", default)]
    pub mem: String,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<DriverKeyValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct DiskReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "DiskType", default)]
    pub disk_type: String,
    #[serde(rename = "DiskSize", default)]
    pub disk_size: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct DiskInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "DiskType", default)]
    pub disk_type: String,
    #[serde(rename = "DiskSize", default)]
    pub disk_size: String,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "OwnerVM", default)]
    pub owner_vm: IId,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<DriverKeyValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VmReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ImageName")]
    pub image_name: String,
    #[serde(rename = "VPCName")]
    pub vpc_name: String,
    #[serde(rename = "SubnetName")]
    pub subnet_name: String,
    #[serde(rename = "SecurityGroupNames", default)]
    pub security_group_names: Vec<String>,
    #[serde(rename = "KeyPairName")]
    pub key_pair_name: String,
    #[serde(rename = "VMSpecName")]
    pub vm_spec_name: String,
    #[serde(rename = "DataDiskNames", default)]
    pub data_disk_names: Vec<String>,
    #[serde(rename = "RootDiskType", default)]
    pub root_disk_type: String,
    #[serde(rename = "RootDiskSize", default)]
    pub root_disk_size: String,
    #[serde(rename = "VMUserId", default)]
    pub vm_user_id: String,
    #[serde(rename = "VMUserPasswd", default)]
    pub vm_user_passwd: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct RegionInfo {
    #[serde(rename = "Region", default)]
    pub region: String,
    #[serde(rename = "Zone", default)]
    pub zone: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VmInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "StartTime", default)]
    pub start_time: String,
    #[serde(rename = "Region", default)]
    pub region: RegionInfo,
    #[serde(rename = "ImageIId", default)]
    pub image_iid: IId,
    #[serde(rename = "VpcIID", default)]
    pub vpc_iid: IId,
    #[serde(rename = "SubnetIID", default)]
    pub subnet_iid: IId,
    #[serde(rename = "SecurityGroupIIds", default)]
    pub security_group_iids: Vec<IId>,
    #[serde(rename = "KeyPairIId", default)]
    pub key_pair_iid: IId,
    #[serde(rename = "DataDiskIIDs", default)]
    pub data_disk_iids: Vec<IId>,
    #[serde(rename = "VMSpecName", default)]
    pub vm_spec_name: String,
    #[serde(rename = "VMUserId", default)]
    pub vm_user_id: String,
    #[serde(rename = "PublicIP", default)]
    pub public_ip: String,
    #[serde(rename = "PrivateIP", default)]
    pub private_ip: String,
    #[serde(rename = "SSHAccessPoint", default)]
    pub ssh_access_point: String,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<DriverKeyValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct VmStatusInfo {
    #[serde(rename = "Status", default)]
    pub status: String,
}

/// Spider's boolean result payload, e.g. `{"Result": "true"}` on deletes.
#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct BooleanInfo {
    #[serde(rename = "Result", default)]
    pub result: String,
}

impl BooleanInfo {
    pub fn is_true(&self) -> bool {
        self.result.eq_ignore_ascii_case("true")
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ClusterReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "VPCName")]
    pub vpc_name: String,
    #[serde(rename = "SubnetNames", default)]
    pub subnet_names: Vec<String>,
    #[serde(rename = "SecurityGroupNames", default)]
    pub security_group_names: Vec<String>,
    #[serde(rename = "NodeGroupList", default)]
    pub node_group_list: Vec<NodeGroupReqInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeGroupReqInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "ImageName")]
    pub image_name: String,
    #[serde(rename = "VMSpecName")]
    pub vm_spec_name: String,
    #[serde(rename = "RootDiskType", default)]
    pub root_disk_type: String,
    #[serde(rename = "RootDiskSize", default)]
    pub root_disk_size: String,
    #[serde(rename = "KeyPairName")]
    pub key_pair_name: String,
    #[serde(rename = "OnAutoScaling", default)]
    pub on_auto_scaling: bool,
    #[serde(rename = "DesiredNodeSize", default)]
    pub desired_node_size: u32,
    #[serde(rename = "MinNodeSize", default)]
    pub min_node_size: u32,
    #[serde(rename = "MaxNodeSize", default)]
    pub max_node_size: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct NodeGroupInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "ImageIID", default)]
    pub image_iid: IId,
    #[serde(rename = "VMSpecName", default)]
    pub vm_spec_name: String,
    #[serde(rename = "RootDiskType", default)]
    pub root_disk_type: String,
    #[serde(rename = "RootDiskSize", default)]
    pub root_disk_size: String,
    #[serde(rename = "KeyPairIID", default)]
    pub key_pair_iid: IId,
    #[serde(rename = "OnAutoScaling", default)]
    pub on_auto_scaling: bool,
    #[serde(rename = "DesiredNodeSize", default)]
    pub desired_node_size: u32,
    #[serde(rename = "MinNodeSize", default)]
    pub min_node_size: u32,
    #[serde(rename = "MaxNodeSize", default)]
    pub max_node_size: u32,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "Nodes", default)]
    pub nodes: Vec<IId>,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<DriverKeyValue>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct OnAutoScalingReqInfo {
    #[serde(rename = "OnAutoScaling")]
    pub on_auto_scaling: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ScaleSizeReqInfo {
    #[serde(rename = "DesiredNodeSize")]
    pub desired_node_size: u32,
    #[serde(rename = "MinNodeSize")]
    pub min_node_size: u32,
    #[serde(rename = "MaxNodeSize")]
    pub max_node_size: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct UpgradeReqInfo {
    #[serde(rename = "Version")]
    pub version: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterAccessInfo {
    #[serde(rename = "Endpoint", default)]
    pub endpoint: String,
    #[serde(rename = "Kubeconfig", default)]
    pub kubeconfig: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterInfo {
    #[serde(rename = "IId", default)]
    pub iid: IId,
    #[serde(rename = "Version", default)]
    pub version: String,
    #[serde(rename = "VpcIID", default)]
    pub vpc_iid: IId,
    #[serde(rename = "NodeGroupList", default)]
    pub node_group_list: Vec<NodeGroupInfo>,
    #[serde(rename = "AccessInfo", default)]
    pub access_info: ClusterAccessInfo,
    #[serde(rename = "Addons", default)]
    pub addons: Vec<DriverKeyValue>,
    #[serde(rename = "Status", default)]
    pub status: String,
    #[serde(rename = "CreatedTime", default)]
    pub created_time: String,
    #[serde(rename = "KeyValueList", default)]
    pub key_value_list: Vec<DriverKeyValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_iid_roundtrips_verbatim() {
        // setup:
        let raw = r#"{"NameId":"vnet1-67e5504410b14","SystemId":"vpc-0a1b2c3d"}"#;

        // execute:
        let iid: IId = serde_json::from_str(raw).unwrap();

        // verify:
        assert_eq!("vnet1-67e5504410b14", iid.name_id);
        assert_eq!("vpc-0a1b2c3d", iid.system_id);
        assert_eq!(raw, serde_json::to_string(&iid).unwrap());
    }

    #[test]
    fn test_driver_request_envelope_shape() {
        // setup:
        let req = DriverRequest {
            connection_name: "aws-ap-northeast-2".to_string(),
            req_info: KeyPairReqInfo {
                name: "key1-0123456789abc".to_string(),
            },
        };

        // execute:
        let encoded = serde_json::to_value(&req).unwrap();

        // verify:
        assert_eq!("aws-ap-northeast-2", encoded["ConnectionName"]);
        assert_eq!("key1-0123456789abc", encoded["ReqInfo"]["Name"]);
    }
}
