use crate::context::Context;
use crate::driver::io::KeyPairReqInfo;
use crate::errors::OrchestratorError;
use crate::io_models::resource::SshKeyReq;
use crate::models::resource::SshKey;
use crate::resource::vnet::to_key_values;
use crate::resource::{ensure_not_exists, ensure_ns, store, ResourceKind};
use crate::utilities::{to_csp_resource_name, to_uuid_string, validate_id};
use uuid::Uuid;

pub fn create_ssh_key(ctx: &Context, ns_id: &str, req: &SshKeyReq) -> Result<SshKey, OrchestratorError> {
    validate_id("name", &req.name)?;

    ensure_ns(ctx, ns_id)?;
    ensure_not_exists(ctx, ns_id, ResourceKind::SshKey, &req.name)?;

    let uuid = Uuid::new_v4();
    let driver_req = KeyPairReqInfo {
        name: to_csp_resource_name(&req.name, &uuid),
    };

    let response = {
        let _permit = ctx.throttle().acquire(&req.connection_name)?;
        ctx.driver().create_key_pair(&req.connection_name, &driver_req)?
    };

    let username = if req.username.is_empty() {
        response.vm_user_id.clone()
    } else {
        req.username.clone()
    };

    let ssh_key = SshKey {
        id: req.name.clone(),
        uuid: to_uuid_string(&uuid),
        connection_name: req.connection_name.clone(),
        username,
        public_key: response.public_key.clone(),
        private_key: response.private_key.clone(),
        fingerprint: response.fingerprint.clone(),
        csp_resource_id: response.iid.system_id.clone(),
        csp_resource_name: response.iid.name_id.clone(),
        description: req.description.clone(),
        status: "Available".to_string(),
        key_value_list: to_key_values(&response.key_value_list),
        associated_object_list: Vec::new(),
        is_auto_generated: false,
        system_label: String::new(),
    };
    store(ctx, ns_id, &ssh_key)?;

    info!("sshKey `{}` created in namespace `{ns_id}`", ssh_key.id);
    Ok(ssh_key)
}
