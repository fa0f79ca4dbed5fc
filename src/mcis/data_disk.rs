//! Data-disk attach/detach for a VM. The driver is driven through the
//! control-vm query style; the disk's association list tracks the owning
//! MCIS.

use crate::context::Context;
use crate::errors::OrchestratorError;
use crate::locks::LockKey;
use crate::mcis::{ensure_ns, list_vms, load_vm, store_vm};
use crate::models::mcis::{Vm, VmStatus};
use crate::models::resource::DataDisk;
use crate::resource::{update_associated_object_list, AssociationAction, ResourceKind};

pub fn attach_data_disk(
    ctx: &Context,
    ns_id: &str,
    mcis_id: &str,
    vm_id: &str,
    disk_id: &str,
) -> Result<Vm, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Vm {
        ns_id: ns_id.to_string(),
        mcis_id: mcis_id.to_string(),
        vm_id: vm_id.to_string(),
    })?;

    let mut vm = load_vm(ctx, ns_id, mcis_id, vm_id)?;
    if vm.status != VmStatus::Running && vm.status != VmStatus::Suspended {
        return Err(OrchestratorError::Conflict {
            id: vm_id.to_string(),
            message: format!("cannot attach a disk to a VM in state {}", vm.status),
        });
    }
    if vm.data_disk_ids.iter().any(|d| d == disk_id) {
        return Err(OrchestratorError::Conflict {
            id: disk_id.to_string(),
            message: format!("disk is already attached to VM `{vm_id}`"),
        });
    }

    let disk: DataDisk = crate::resource::load(ctx, ns_id, disk_id)?;
    if disk.connection_name != vm.connection_name {
        return Err(OrchestratorError::invalid_field(
            "dataDiskId",
            format!(
                "disk `{disk_id}` lives on connection `{}`, VM on `{}`",
                disk.connection_name, vm.connection_name
            ),
        ));
    }

    {
        let _permit = ctx.throttle().acquire(&vm.connection_name)?;
        ctx.driver()
            .attach_disk(&vm.connection_name, &vm.csp_resource_name, &disk.csp_resource_name)?;
    }

    vm.data_disk_ids.push(disk_id.to_string());
    store_vm(ctx, ns_id, mcis_id, &vm)?;
    update_associated_object_list(ctx, ns_id, ResourceKind::DataDisk, disk_id, AssociationAction::Add, mcis_id)?;

    info!("disk `{disk_id}` attached to VM `{vm_id}` of MCIS `{mcis_id}`");
    Ok(vm)
}

pub fn detach_data_disk(
    ctx: &Context,
    ns_id: &str,
    mcis_id: &str,
    vm_id: &str,
    disk_id: &str,
) -> Result<Vm, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Vm {
        ns_id: ns_id.to_string(),
        mcis_id: mcis_id.to_string(),
        vm_id: vm_id.to_string(),
    })?;

    let mut vm = load_vm(ctx, ns_id, mcis_id, vm_id)?;
    if !vm.data_disk_ids.iter().any(|d| d == disk_id) {
        return Err(OrchestratorError::Conflict {
            id: disk_id.to_string(),
            message: format!("disk is not attached to VM `{vm_id}`"),
        });
    }

    let disk: DataDisk = crate::resource::load(ctx, ns_id, disk_id)?;

    {
        let _permit = ctx.throttle().acquire(&vm.connection_name)?;
        ctx.driver()
            .detach_disk(&vm.connection_name, &vm.csp_resource_name, &disk.csp_resource_name)?;
    }

    vm.data_disk_ids.retain(|d| d != disk_id);
    store_vm(ctx, ns_id, mcis_id, &vm)?;

    // the MCIS back-reference goes away with the last attachment inside it
    let still_attached = list_vms(ctx, ns_id, mcis_id)?
        .iter()
        .any(|v| v.data_disk_ids.iter().any(|d| d == disk_id));
    if !still_attached {
        update_associated_object_list(ctx, ns_id, ResourceKind::DataDisk, disk_id, AssociationAction::Remove, mcis_id)?;
    }

    info!("disk `{disk_id}` detached from VM `{vm_id}` of MCIS `{mcis_id}`");
    Ok(vm)
}
