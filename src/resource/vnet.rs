//! vNet creation and registration, including child subnets.

use crate::context::Context;
use crate::driver::io::{DriverKeyValue, RegisterVpcReqInfo, SubnetReqInfo, VpcInfo, VpcReqInfo};
use crate::errors::OrchestratorError;
use crate::io_models::resource::{SubnetReq, VNetRegisterReq, VNetReq};
use crate::models::resource::{Subnet, VNet};
use crate::models::KeyValue;
use crate::resource::{ensure_not_exists, ensure_ns, store, ResourceKind};
use crate::utilities::{to_csp_resource_name, to_uuid_string, validate_id};
use ipnet::IpNet;
use uuid::Uuid;

pub(crate) fn to_key_values(list: &[DriverKeyValue]) -> Vec<KeyValue> {
    list.iter().map(|kv| KeyValue::new(kv.key.clone(), kv.value.clone())).collect()
}

fn validate_cidr(field: &str, cidr: &str) -> Result<(), OrchestratorError> {
    cidr.parse::<IpNet>()
        .map(|_| ())
        .map_err(|e| OrchestratorError::invalid_field(field, format!("`{cidr}` is not a valid CIDR: {e}")))
}

/// One planned subnet: the tenant id plus the CSP-facing identity we hand to
/// the driver.
struct PlannedSubnet {
    id: String,
    uuid: Uuid,
    csp_name: String,
    cidr_block: String,
    description: String,
}

fn plan_subnets(reqs: &[SubnetReq]) -> Result<Vec<PlannedSubnet>, OrchestratorError> {
    let mut planned = Vec::with_capacity(reqs.len());
    for req in reqs {
        validate_id("subnetInfoList.name", &req.name)?;
        validate_cidr("subnetInfoList.cidrBlock", &req.cidr_block)?;
        let uuid = Uuid::new_v4();
        planned.push(PlannedSubnet {
            id: req.name.clone(),
            csp_name: to_csp_resource_name(&req.name, &uuid),
            uuid,
            cidr_block: req.cidr_block.clone(),
            description: req.description.clone(),
        });
    }
    Ok(planned)
}

/// Persists child subnet records out of the driver response, matching them
/// back to the planned tenant ids. Subnets the CSP invented on its own are
/// kept as auto-generated records.
fn persist_subnets(
    ctx: &Context,
    ns_id: &str,
    v_net_id: &str,
    connection: &str,
    response: &VpcInfo,
    planned: &[PlannedSubnet],
) -> Result<Vec<Subnet>, OrchestratorError> {
    let mut subnets = Vec::with_capacity(response.subnet_info_list.len());
    for info in &response.subnet_info_list {
        let matched = planned.iter().find(|p| p.csp_name == info.iid.name_id);
        let subnet = match matched {
            Some(plan) => Subnet {
                id: plan.id.clone(),
                uuid: to_uuid_string(&plan.uuid),
                v_net_id: v_net_id.to_string(),
                connection_name: connection.to_string(),
                cidr_block: info.ipv4_cidr.clone(),
                csp_resource_id: info.iid.system_id.clone(),
                csp_resource_name: info.iid.name_id.clone(),
                description: plan.description.clone(),
                status: "Available".to_string(),
                key_value_list: to_key_values(&info.key_value_list),
                associated_object_list: Vec::new(),
                is_auto_generated: false,
                system_label: String::new(),
            },
            None => Subnet {
                id: info.iid.name_id.clone(),
                uuid: to_uuid_string(&Uuid::new_v4()),
                v_net_id: v_net_id.to_string(),
                connection_name: connection.to_string(),
                cidr_block: info.ipv4_cidr.clone(),
                csp_resource_id: info.iid.system_id.clone(),
                csp_resource_name: info.iid.name_id.clone(),
                description: String::new(),
                status: "Available".to_string(),
                key_value_list: to_key_values(&info.key_value_list),
                associated_object_list: Vec::new(),
                is_auto_generated: true,
                system_label: "Auto-generated by CSP".to_string(),
            },
        };
        store(ctx, ns_id, &subnet)?;
        subnets.push(subnet);
    }
    Ok(subnets)
}

pub fn create_vnet(ctx: &Context, ns_id: &str, req: &VNetReq) -> Result<VNet, OrchestratorError> {
    validate_id("name", &req.name)?;
    if req.connection_name.is_empty() {
        return Err(OrchestratorError::invalid_field("connectionName", "must not be empty".to_string()));
    }
    validate_cidr("cidrBlock", &req.cidr_block)?;

    ensure_ns(ctx, ns_id)?;
    ensure_not_exists(ctx, ns_id, ResourceKind::VNet, &req.name)?;
    let planned = plan_subnets(&req.subnet_info_list)?;
    for plan in &planned {
        ensure_not_exists(ctx, ns_id, ResourceKind::Subnet, &plan.id)?;
    }

    let uuid = Uuid::new_v4();
    let csp_name = to_csp_resource_name(&req.name, &uuid);

    let driver_req = VpcReqInfo {
        name: csp_name,
        ipv4_cidr: req.cidr_block.clone(),
        subnet_info_list: planned
            .iter()
            .map(|p| SubnetReqInfo {
                name: p.csp_name.clone(),
                ipv4_cidr: p.cidr_block.clone(),
            })
            .collect(),
    };

    let response = {
        let _permit = ctx.throttle().acquire(&req.connection_name)?;
        ctx.driver().create_vpc(&req.connection_name, &driver_req)?
    };

    let subnets = persist_subnets(ctx, ns_id, &req.name, &req.connection_name, &response, &planned)?;

    let vnet = VNet {
        id: req.name.clone(),
        uuid: to_uuid_string(&uuid),
        connection_name: req.connection_name.clone(),
        cidr_block: response.ipv4_cidr.clone(),
        csp_resource_id: response.iid.system_id.clone(),
        csp_resource_name: response.iid.name_id.clone(),
        description: req.description.clone(),
        status: "Available".to_string(),
        subnet_info_list: subnets,
        key_value_list: to_key_values(&response.key_value_list),
        associated_object_list: Vec::new(),
        is_auto_generated: false,
        system_label: String::new(),
    };
    store(ctx, ns_id, &vnet)?;

    info!("vNet `{}` created in namespace `{ns_id}`", vnet.id);
    Ok(vnet)
}

/// Adopts an existing CSP VPC (driver `regvpc`). Nothing is created on the
/// cloud; the driver answers with the VPC it now manages.
pub fn register_vnet(ctx: &Context, ns_id: &str, req: &VNetRegisterReq) -> Result<VNet, OrchestratorError> {
    validate_id("name", &req.name)?;
    if req.csp_resource_id.is_empty() {
        return Err(OrchestratorError::invalid_field("cspResourceId", "must not be empty".to_string()));
    }

    ensure_ns(ctx, ns_id)?;
    ensure_not_exists(ctx, ns_id, ResourceKind::VNet, &req.name)?;

    let uuid = Uuid::new_v4();
    let driver_req = RegisterVpcReqInfo {
        name: to_csp_resource_name(&req.name, &uuid),
        csp_id: req.csp_resource_id.clone(),
    };

    let response = {
        let _permit = ctx.throttle().acquire(&req.connection_name)?;
        ctx.driver().register_vpc(&req.connection_name, &driver_req)?
    };

    let subnets = persist_subnets(ctx, ns_id, &req.name, &req.connection_name, &response, &[])?;

    let vnet = VNet {
        id: req.name.clone(),
        uuid: to_uuid_string(&uuid),
        connection_name: req.connection_name.clone(),
        cidr_block: response.ipv4_cidr.clone(),
        csp_resource_id: response.iid.system_id.clone(),
        csp_resource_name: response.iid.name_id.clone(),
        description: req.description.clone(),
        status: "Available".to_string(),
        subnet_info_list: subnets,
        key_value_list: to_key_values(&response.key_value_list),
        associated_object_list: Vec::new(),
        is_auto_generated: false,
        system_label: "Registered from CSP".to_string(),
    };
    store(ctx, ns_id, &vnet)?;

    info!("vNet `{}` registered in namespace `{ns_id}`", vnet.id);
    Ok(vnet)
}

/// Adds one subnet to an existing vNet.
pub fn add_subnet(ctx: &Context, ns_id: &str, v_net_id: &str, req: &SubnetReq) -> Result<VNet, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let mut parent: VNet = super::load(ctx, ns_id, v_net_id)?;
    ensure_not_exists(ctx, ns_id, ResourceKind::Subnet, &req.name)?;

    let planned = plan_subnets(std::slice::from_ref(req))?;
    let driver_req = SubnetReqInfo {
        name: planned[0].csp_name.clone(),
        ipv4_cidr: planned[0].cidr_block.clone(),
    };

    let response = {
        let _permit = ctx.throttle().acquire(&parent.connection_name)?;
        ctx.driver()
            .add_subnet(&parent.connection_name, &parent.csp_resource_name, &driver_req)?
    };

    // the driver answers with the whole VPC; only the new subnet is ours to record
    let mut filtered = response;
    filtered.subnet_info_list.retain(|s| s.iid.name_id == planned[0].csp_name);

    let subnets = persist_subnets(ctx, ns_id, v_net_id, &parent.connection_name, &filtered, &planned)?;
    if let Some(created) = subnets.into_iter().find(|s| s.id == req.name) {
        parent.subnet_info_list.retain(|s| s.id != created.id);
        parent.subnet_info_list.push(created);
    }
    store(ctx, ns_id, &parent)?;

    Ok(parent)
}

/// Drops a subnet from the parent's child list after the subnet record and
/// CSP subnet are gone.
pub(crate) fn detach_subnet_from_parent(
    ctx: &Context,
    ns_id: &str,
    v_net_id: &str,
    subnet_id: &str,
) -> Result<(), OrchestratorError> {
    let mut parent: VNet = super::load(ctx, ns_id, v_net_id)?;
    parent.subnet_info_list.retain(|s| s.id != subnet_id);
    store(ctx, ns_id, &parent)
}
