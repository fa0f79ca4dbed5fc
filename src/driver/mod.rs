pub mod errors;
pub mod http;
pub mod io;
pub mod monitoring;

pub use http::SpiderClient;

use crate::constants;
use crate::driver::errors::DriverError;
use crate::driver::io::*;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Deadline class of a driver call. Every outbound request carries one.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TimeoutClass {
    /// Lookups and cheap mutations.
    Short,
    /// Ordinary resource mutations.
    Medium,
    /// VM provisioning and teardown.
    Long,
    /// Cluster provisioning and upgrades.
    VeryLong,
}

impl TimeoutClass {
    pub fn deadline(&self) -> Duration {
        match self {
            TimeoutClass::Short => constants::TIMEOUT_SHORT,
            TimeoutClass::Medium => constants::TIMEOUT_MEDIUM,
            TimeoutClass::Long => constants::TIMEOUT_LONG,
            TimeoutClass::VeryLong => constants::TIMEOUT_VERY_LONG,
        }
    }
}

impl Display for TimeoutClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TimeoutClass::Short => "short",
            TimeoutClass::Medium => "medium",
            TimeoutClass::Long => "long",
            TimeoutClass::VeryLong => "veryLong",
        })
    }
}

/// Verbs of `GET /controlvm/{name}?action=…`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VmControlVerb {
    Suspend,
    Resume,
    Reboot,
}

impl Display for VmControlVerb {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            VmControlVerb::Suspend => "suspend",
            VmControlVerb::Resume => "resume",
            VmControlVerb::Reboot => "reboot",
        })
    }
}

/// The single choke point for every cloud effect. All engine components go
/// through this trait; tests plug a scripted implementation.
pub trait Driver: Send + Sync {
    fn create_vpc(&self, connection: &str, req: &VpcReqInfo) -> Result<VpcInfo, DriverError>;
    fn register_vpc(&self, connection: &str, req: &RegisterVpcReqInfo) -> Result<VpcInfo, DriverError>;
    fn get_vpc(&self, connection: &str, name: &str) -> Result<VpcInfo, DriverError>;
    fn delete_vpc(&self, connection: &str, name: &str, force: bool) -> Result<bool, DriverError>;
    fn add_subnet(&self, connection: &str, vpc_name: &str, req: &SubnetReqInfo) -> Result<VpcInfo, DriverError>;
    fn delete_subnet(
        &self,
        connection: &str,
        vpc_name: &str,
        subnet_name: &str,
        force: bool,
    ) -> Result<bool, DriverError>;

    fn create_security_group(
        &self,
        connection: &str,
        req: &SecurityGroupReqInfo,
    ) -> Result<SecurityGroupInfo, DriverError>;
    fn delete_security_group(&self, connection: &str, name: &str, force: bool) -> Result<bool, DriverError>;

    fn create_key_pair(&self, connection: &str, req: &KeyPairReqInfo) -> Result<KeyPairInfo, DriverError>;
    fn delete_key_pair(&self, connection: &str, name: &str, force: bool) -> Result<bool, DriverError>;

    fn get_image(&self, connection: &str, name: &str) -> Result<ImageInfo, DriverError>;
    fn get_vm_spec(&self, connection: &str, name: &str) -> Result<VmSpecInfo, DriverError>;

    fn create_disk(&self, connection: &str, req: &DiskReqInfo) -> Result<DiskInfo, DriverError>;
    fn delete_disk(&self, connection: &str, name: &str, force: bool) -> Result<bool, DriverError>;
    fn attach_disk(&self, connection: &str, vm_name: &str, disk_name: &str) -> Result<DiskInfo, DriverError>;
    fn detach_disk(&self, connection: &str, vm_name: &str, disk_name: &str) -> Result<bool, DriverError>;

    fn start_vm(&self, connection: &str, req: &VmReqInfo) -> Result<VmInfo, DriverError>;
    fn get_vm(&self, connection: &str, name: &str) -> Result<VmInfo, DriverError>;
    fn get_vm_status(&self, connection: &str, name: &str) -> Result<VmStatusInfo, DriverError>;
    fn control_vm(&self, connection: &str, name: &str, verb: VmControlVerb) -> Result<VmStatusInfo, DriverError>;
    fn terminate_vm(&self, connection: &str, name: &str) -> Result<VmStatusInfo, DriverError>;

    fn create_cluster(&self, connection: &str, req: &ClusterReqInfo) -> Result<ClusterInfo, DriverError>;
    fn get_cluster(&self, connection: &str, name: &str) -> Result<ClusterInfo, DriverError>;
    fn delete_cluster(&self, connection: &str, name: &str, force: bool) -> Result<bool, DriverError>;
    fn add_node_group(
        &self,
        connection: &str,
        cluster_name: &str,
        req: &NodeGroupReqInfo,
    ) -> Result<NodeGroupInfo, DriverError>;
    fn remove_node_group(
        &self,
        connection: &str,
        cluster_name: &str,
        node_group_name: &str,
        force: bool,
    ) -> Result<bool, DriverError>;
    fn set_node_group_autoscaling(
        &self,
        connection: &str,
        cluster_name: &str,
        node_group_name: &str,
        on: bool,
    ) -> Result<bool, DriverError>;
    fn change_node_group_scaling(
        &self,
        connection: &str,
        cluster_name: &str,
        node_group_name: &str,
        desired: u32,
        min: u32,
        max: u32,
    ) -> Result<NodeGroupInfo, DriverError>;
    fn upgrade_cluster(&self, connection: &str, name: &str, version: &str) -> Result<ClusterInfo, DriverError>;
}
