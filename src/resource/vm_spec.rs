use crate::context::Context;
use crate::errors::OrchestratorError;
use crate::io_models::resource::VmSpecReq;
use crate::models::resource::VmSpec;
use crate::resource::vnet::to_key_values;
use crate::resource::{ensure_not_exists, ensure_ns, store, ResourceKind};
use crate::utilities::{to_uuid_string, validate_id};
use uuid::Uuid;

/// Registers a CSP VM sizing spec under a tenant id, pulling vCPU/memory
/// metadata from the driver.
pub fn register_vm_spec(ctx: &Context, ns_id: &str, req: &VmSpecReq) -> Result<VmSpec, OrchestratorError> {
    validate_id("name", &req.name)?;
    if req.csp_spec_name.is_empty() {
        return Err(OrchestratorError::invalid_field("cspSpecName", "must not be empty".to_string()));
    }

    ensure_ns(ctx, ns_id)?;
    ensure_not_exists(ctx, ns_id, ResourceKind::Spec, &req.name)?;

    let response = {
        let _permit = ctx.throttle().acquire(&req.connection_name)?;
        ctx.driver().get_vm_spec(&req.connection_name, &req.csp_spec_name)?
    };

    let vm_spec = VmSpec {
        id: req.name.clone(),
        uuid: to_uuid_string(&Uuid::new_v4()),
        connection_name: req.connection_name.clone(),
        csp_spec_name: req.csp_spec_name.clone(),
        num_v_cpu: response.v_cpu.count.parse().unwrap_or(0),
        mem_gib: response.mem.parse().ok(),
        cost_per_hour: None,
        description: req.description.clone(),
        status: "Available".to_string(),
        key_value_list: to_key_values(&response.key_value_list),
        associated_object_list: Vec::new(),
        is_auto_generated: false,
        system_label: String::new(),
    };
    store(ctx, ns_id, &vm_spec)?;

    info!("spec `{}` registered in namespace `{ns_id}`", vm_spec.id);
    Ok(vm_spec)
}
