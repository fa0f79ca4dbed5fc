use crate::context::Context;
use crate::driver::io::DiskReqInfo;
use crate::errors::OrchestratorError;
use crate::io_models::resource::DataDiskReq;
use crate::models::resource::DataDisk;
use crate::resource::vnet::to_key_values;
use crate::resource::{ensure_not_exists, ensure_ns, store, ResourceKind};
use crate::utilities::{to_csp_resource_name, to_uuid_string, validate_id};
use uuid::Uuid;

pub fn create_data_disk(ctx: &Context, ns_id: &str, req: &DataDiskReq) -> Result<DataDisk, OrchestratorError> {
    validate_id("name", &req.name)?;
    if req.disk_size.is_empty() {
        return Err(OrchestratorError::invalid_field("diskSize", "must not be empty".to_string()));
    }

    ensure_ns(ctx, ns_id)?;
    ensure_not_exists(ctx, ns_id, ResourceKind::DataDisk, &req.name)?;

    let uuid = Uuid::new_v4();
    let driver_req = DiskReqInfo {
        name: to_csp_resource_name(&req.name, &uuid),
        disk_type: req.disk_type.clone(),
        disk_size: req.disk_size.clone(),
    };

    let response = {
        let _permit = ctx.throttle().acquire(&req.connection_name)?;
        ctx.driver().create_disk(&req.connection_name, &driver_req)?
    };

    let data_disk = DataDisk {
        id: req.name.clone(),
        uuid: to_uuid_string(&uuid),
        connection_name: req.connection_name.clone(),
        disk_type: response.disk_type.clone(),
        disk_size: response.disk_size.clone(),
        csp_resource_id: response.iid.system_id.clone(),
        csp_resource_name: response.iid.name_id.clone(),
        description: req.description.clone(),
        status: if response.status.is_empty() {
            "Available".to_string()
        } else {
            response.status.clone()
        },
        key_value_list: to_key_values(&response.key_value_list),
        associated_object_list: Vec::new(),
        is_auto_generated: false,
        system_label: String::new(),
    };
    store(ctx, ns_id, &data_disk)?;

    info!("dataDisk `{}` created in namespace `{ns_id}`", data_disk.id);
    Ok(data_disk)
}
