use crate::context::Context;
use crate::driver::io::{SecurityGroupReqInfo, SecurityRuleInfo};
use crate::errors::OrchestratorError;
use crate::io_models::resource::SecurityGroupReq;
use crate::models::resource::{SecurityGroup, VNet};
use crate::resource::vnet::to_key_values;
use crate::resource::{ensure_not_exists, ensure_ns, store, update_associated_object_list, AssociationAction, ResourceKind};
use crate::utilities::{to_csp_resource_name, to_uuid_string, validate_id};
use uuid::Uuid;

pub fn create_security_group(
    ctx: &Context,
    ns_id: &str,
    req: &SecurityGroupReq,
) -> Result<SecurityGroup, OrchestratorError> {
    validate_id("name", &req.name)?;
    if req.firewall_rules.is_empty() {
        return Err(OrchestratorError::invalid_field(
            "firewallRules",
            "at least one rule is required".to_string(),
        ));
    }

    ensure_ns(ctx, ns_id)?;
    ensure_not_exists(ctx, ns_id, ResourceKind::SecurityGroup, &req.name)?;

    // the vNet must exist in the same namespace and share the connection
    let parent_vnet: VNet = super::load(ctx, ns_id, &req.v_net_id)?;
    if parent_vnet.connection_name != req.connection_name {
        return Err(OrchestratorError::invalid_field(
            "connectionName",
            format!(
                "`{}` does not match vNet `{}` connection `{}`",
                req.connection_name, req.v_net_id, parent_vnet.connection_name
            ),
        ));
    }

    let uuid = Uuid::new_v4();
    let driver_req = SecurityGroupReqInfo {
        name: to_csp_resource_name(&req.name, &uuid),
        vpc_name: parent_vnet.csp_resource_name.clone(),
        security_rules: req
            .firewall_rules
            .iter()
            .map(|rule| SecurityRuleInfo {
                from_port: rule.from_port.clone(),
                to_port: rule.to_port.clone(),
                ip_protocol: rule.ip_protocol.clone(),
                direction: rule.direction.clone(),
                cidr: rule.cidr.clone(),
            })
            .collect(),
    };

    let response = {
        let _permit = ctx.throttle().acquire(&req.connection_name)?;
        ctx.driver().create_security_group(&req.connection_name, &driver_req)?
    };

    let security_group = SecurityGroup {
        id: req.name.clone(),
        uuid: to_uuid_string(&uuid),
        connection_name: req.connection_name.clone(),
        v_net_id: req.v_net_id.clone(),
        csp_resource_id: response.iid.system_id.clone(),
        csp_resource_name: response.iid.name_id.clone(),
        description: req.description.clone(),
        status: "Available".to_string(),
        firewall_rules: req.firewall_rules.clone(),
        key_value_list: to_key_values(&response.key_value_list),
        associated_object_list: Vec::new(),
        is_auto_generated: false,
        system_label: String::new(),
    };
    store(ctx, ns_id, &security_group)?;

    update_associated_object_list(
        ctx,
        ns_id,
        ResourceKind::VNet,
        &req.v_net_id,
        AssociationAction::Add,
        &format!("securityGroup/{}", req.name),
    )?;

    info!("securityGroup `{}` created in namespace `{ns_id}`", security_group.id);
    Ok(security_group)
}
