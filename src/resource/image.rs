use crate::context::Context;
use crate::errors::OrchestratorError;
use crate::io_models::resource::ImageReq;
use crate::models::resource::Image;
use crate::resource::vnet::to_key_values;
use crate::resource::{ensure_not_exists, ensure_ns, store, ResourceKind};
use crate::utilities::{to_uuid_string, validate_id};
use uuid::Uuid;

/// Registers a CSP image under a tenant id. The driver is asked for the
/// image's metadata; nothing is created on the cloud.
pub fn register_image(ctx: &Context, ns_id: &str, req: &ImageReq) -> Result<Image, OrchestratorError> {
    validate_id("name", &req.name)?;
    if req.csp_image_name.is_empty() {
        return Err(OrchestratorError::invalid_field("cspImageName", "must not be empty".to_string()));
    }

    ensure_ns(ctx, ns_id)?;
    ensure_not_exists(ctx, ns_id, ResourceKind::Image, &req.name)?;

    let response = {
        let _permit = ctx.throttle().acquire(&req.connection_name)?;
        ctx.driver().get_image(&req.connection_name, &req.csp_image_name)?
    };

    let guest_os = if req.guest_os.is_empty() {
        response.guest_os.clone()
    } else {
        req.guest_os.clone()
    };

    let image = Image {
        id: req.name.clone(),
        uuid: to_uuid_string(&Uuid::new_v4()),
        connection_name: req.connection_name.clone(),
        csp_image_name: req.csp_image_name.clone(),
        csp_resource_id: response.iid.system_id.clone(),
        csp_resource_name: response.iid.name_id.clone(),
        guest_os,
        description: req.description.clone(),
        status: response.status.clone(),
        key_value_list: to_key_values(&response.key_value_list),
        associated_object_list: Vec::new(),
        is_auto_generated: false,
        system_label: String::new(),
    };
    store(ctx, ns_id, &image)?;

    info!("image `{}` registered in namespace `{ns_id}`", image.id);
    Ok(image)
}
