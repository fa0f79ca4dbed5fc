//! MCIS engine: lifecycle of VM groups, per-VM state machine, concurrent
//! fan-out and status aggregation.

pub mod autocontrol;
pub mod control;
pub mod create;
pub mod data_disk;
pub mod status;

pub use create::{create_mcis, create_mcis_with_cancellation, CancellationToken};

use crate::context::Context;
use crate::errors::OrchestratorError;
use crate::keys;
use crate::label;
use crate::locks::LockKey;
use crate::models::mcis::{ControlAction, Mcis, Vm, VmStatus};
use crate::resource::{update_associated_object_list, AssociationAction, ResourceKind};
use itertools::Itertools;
use std::collections::BTreeMap;
use std::sync::mpsc;
use std::thread;

pub(crate) const LABEL_KIND_MCIS: &str = "mcis";
pub(crate) const LABEL_KIND_VM: &str = "vm";

pub(crate) fn ensure_ns(ctx: &Context, ns_id: &str) -> Result<(), OrchestratorError> {
    if !crate::namespace::check_ns(ctx, ns_id)? {
        return Err(OrchestratorError::NamespaceNotFound {
            ns_id: ns_id.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn store_mcis(ctx: &Context, ns_id: &str, mcis: &Mcis) -> Result<(), OrchestratorError> {
    // VM records are children in the KV tree, never inlined in the parent
    let mut flat = mcis.clone();
    flat.vm = Vec::new();

    let key = keys::mcis_key(ns_id, &mcis.id);
    ctx.kv().put(&key, &serde_json::to_string(&flat)?)?;
    label::upsert(
        ctx.kv(),
        LABEL_KIND_MCIS,
        &mcis.uuid,
        &key,
        mcis.label.clone(),
        BTreeMap::from([("nsId".to_string(), ns_id.to_string())]),
    )?;
    Ok(())
}

pub(crate) fn store_vm(ctx: &Context, ns_id: &str, mcis_id: &str, vm: &Vm) -> Result<(), OrchestratorError> {
    let key = keys::vm_key(ns_id, mcis_id, &vm.id);
    ctx.kv().put(&key, &serde_json::to_string(vm)?)?;
    label::upsert(
        ctx.kv(),
        LABEL_KIND_VM,
        &vm.uuid,
        &key,
        BTreeMap::new(),
        BTreeMap::from([
            ("nsId".to_string(), ns_id.to_string()),
            ("mcisId".to_string(), mcis_id.to_string()),
        ]),
    )?;
    Ok(())
}

pub(crate) fn load_mcis_flat(ctx: &Context, ns_id: &str, mcis_id: &str) -> Result<Mcis, OrchestratorError> {
    let entry = ctx
        .kv()
        .get(&keys::mcis_key(ns_id, mcis_id))?
        .ok_or_else(|| OrchestratorError::McisNotFound {
            ns_id: ns_id.to_string(),
            mcis_id: mcis_id.to_string(),
        })?;
    Ok(serde_json::from_str(&entry.value)?)
}

pub fn load_vm(ctx: &Context, ns_id: &str, mcis_id: &str, vm_id: &str) -> Result<Vm, OrchestratorError> {
    let entry = ctx
        .kv()
        .get(&keys::vm_key(ns_id, mcis_id, vm_id))?
        .ok_or_else(|| OrchestratorError::VmNotFound {
            ns_id: ns_id.to_string(),
            mcis_id: mcis_id.to_string(),
            vm_id: vm_id.to_string(),
        })?;
    Ok(serde_json::from_str(&entry.value)?)
}

pub fn list_vms(ctx: &Context, ns_id: &str, mcis_id: &str) -> Result<Vec<Vm>, OrchestratorError> {
    let entries = ctx.kv().get_list(&keys::vm_prefix(ns_id, mcis_id), false)?;
    let mut vms = Vec::with_capacity(entries.len());
    for entry in entries {
        vms.push(serde_json::from_str(&entry.value)?);
    }
    Ok(vms)
}

/// Assembled view: the MCIS record with child VM records re-attached and the
/// label entry re-asserted.
pub fn get_mcis(ctx: &Context, ns_id: &str, mcis_id: &str) -> Result<Mcis, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let mut mcis = load_mcis_flat(ctx, ns_id, mcis_id)?;
    mcis.vm = list_vms(ctx, ns_id, mcis_id)?;
    label::assert_entry(
        ctx.kv(),
        LABEL_KIND_MCIS,
        &mcis.uuid,
        &keys::mcis_key(ns_id, mcis_id),
        mcis.label.clone(),
        BTreeMap::from([("nsId".to_string(), ns_id.to_string())]),
    )?;
    Ok(mcis)
}

pub fn list_mcis_ids(ctx: &Context, ns_id: &str) -> Result<Vec<String>, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let prefix = keys::mcis_prefix(ns_id);
    let entries = ctx.kv().get_list(&prefix, true)?;
    Ok(crate::kv_store::get_child_list(&entries, &prefix))
}

pub fn list_mcis(ctx: &Context, ns_id: &str) -> Result<Vec<Mcis>, OrchestratorError> {
    let mut result = Vec::new();
    for mcis_id in list_mcis_ids(ctx, ns_id)? {
        result.push(get_mcis(ctx, ns_id, &mcis_id)?);
    }
    Ok(result)
}

/// The MCIR kinds a VM references, as `(kind, id)` pairs used for
/// association bookkeeping.
pub(crate) fn vm_resource_refs(vm: &Vm) -> Vec<(ResourceKind, String)> {
    let mut refs = vec![
        (ResourceKind::VNet, vm.v_net_id.clone()),
        (ResourceKind::Subnet, vm.subnet_id.clone()),
        (ResourceKind::SshKey, vm.ssh_key_id.clone()),
    ];
    for sg in &vm.security_group_ids {
        refs.push((ResourceKind::SecurityGroup, sg.clone()));
    }
    for disk in &vm.data_disk_ids {
        refs.push((ResourceKind::DataDisk, disk.clone()));
    }
    refs
}

/// Removes the MCIS back-reference from every resource `removed` VMs point
/// at, unless a surviving VM still uses that resource.
pub(crate) fn remove_vm_associations(
    ctx: &Context,
    ns_id: &str,
    mcis_id: &str,
    removed: &[Vm],
    surviving: &[Vm],
) -> Result<(), OrchestratorError> {
    let still_used: Vec<(ResourceKind, String)> =
        surviving.iter().flat_map(vm_resource_refs).unique().collect();

    for (kind, resource_id) in removed.iter().flat_map(vm_resource_refs).unique() {
        if still_used.contains(&(kind, resource_id.clone())) {
            continue;
        }
        // the resource may already be gone; association cleanup is best-effort
        match update_associated_object_list(ctx, ns_id, kind, &resource_id, AssociationAction::Remove, mcis_id) {
            Ok(_) => {}
            Err(OrchestratorError::ResourceNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

/// Runs `task` once per VM on scoped threads and collects every outcome
/// through a completion channel. The call returns only after all children
/// finished; no early abort.
pub(crate) fn fan_out_vms<T, F>(vms: &[Vm], task: F) -> Vec<(String, Result<T, OrchestratorError>)>
where
    T: Send,
    F: Fn(&Vm) -> Result<T, OrchestratorError> + Sync,
{
    thread::scope(|scope| {
        let (tx, rx) = mpsc::channel();
        for vm in vms {
            let tx = tx.clone();
            let tx_err = tx.clone();
            let task = &task;
            let spawned = thread::Builder::new()
                .name(format!("vm-task-{}", vm.id))
                .spawn_scoped(scope, move || {
                    let result = task(vm);
                    let _ = tx.send((vm.id.clone(), result));
                });
            if let Err(e) = spawned {
                let _ = tx_err.send((
                    vm.id.clone(),
                    Err(OrchestratorError::internal(format!("cannot spawn VM task: {e}"))),
                ));
            }
        }
        drop(tx);
        rx.iter().collect()
    })
}

/// Deletes an MCIS: terminates whatever still exists on the CSPs (best
/// effort, in parallel), removes VM keys, association entries and the MCIS
/// record itself.
pub fn del_mcis(ctx: &Context, ns_id: &str, mcis_id: &str) -> Result<(), OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Mcis {
        ns_id: ns_id.to_string(),
        mcis_id: mcis_id.to_string(),
    })?;

    let mcis = load_mcis_flat(ctx, ns_id, mcis_id)?;
    if mcis.status.is_in_progress() && mcis.target_action != ControlAction::Terminate {
        return Err(OrchestratorError::Conflict {
            id: mcis_id.to_string(),
            message: format!("MCIS is {}; wait or terminate first", mcis.status),
        });
    }
    let vms = list_vms(ctx, ns_id, mcis_id)?;

    let outcomes = fan_out_vms(&vms, |vm| {
        if vm.csp_resource_name.is_empty() || vm.status == VmStatus::Terminated {
            return Ok(());
        }
        let _permit = ctx.throttle().acquire(&vm.connection_name)?;
        match ctx.driver().terminate_vm(&vm.connection_name, &vm.csp_resource_name) {
            Ok(_) => Ok(()),
            // already gone on the CSP side
            Err(e) if matches!(e, crate::driver::errors::DriverError::NotFound { .. }) => Ok(()),
            Err(e) => Err(e.into()),
        }
    });
    for (vm_id, outcome) in &outcomes {
        if let Err(e) = outcome {
            warn!("terminating VM `{vm_id}` of MCIS `{mcis_id}` failed: {e}");
        }
    }

    remove_vm_associations(ctx, ns_id, mcis_id, &vms, &[])?;

    for vm in &vms {
        ctx.kv().delete(&keys::vm_key(ns_id, mcis_id, &vm.id))?;
        label::remove(ctx.kv(), LABEL_KIND_VM, &vm.uuid)?;
    }
    ctx.kv().delete(&keys::mcis_key(ns_id, mcis_id))?;
    label::remove(ctx.kv(), LABEL_KIND_MCIS, &mcis.uuid)?;

    info!("MCIS `{mcis_id}` deleted from namespace `{ns_id}`");
    Ok(())
}

/// Deletes a single VM from an MCIS, terminating it on the CSP first.
pub fn del_mcis_vm(ctx: &Context, ns_id: &str, mcis_id: &str, vm_id: &str) -> Result<(), OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Vm {
        ns_id: ns_id.to_string(),
        mcis_id: mcis_id.to_string(),
        vm_id: vm_id.to_string(),
    })?;

    let vm = load_vm(ctx, ns_id, mcis_id, vm_id)?;
    if !vm.csp_resource_name.is_empty() && vm.status != VmStatus::Terminated {
        let _permit = ctx.throttle().acquire(&vm.connection_name)?;
        match ctx.driver().terminate_vm(&vm.connection_name, &vm.csp_resource_name) {
            Ok(_) => {}
            Err(crate::driver::errors::DriverError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    let surviving: Vec<Vm> = list_vms(ctx, ns_id, mcis_id)?
        .into_iter()
        .filter(|v| v.id != vm_id)
        .collect();
    remove_vm_associations(ctx, ns_id, mcis_id, std::slice::from_ref(&vm), &surviving)?;

    ctx.kv().delete(&keys::vm_key(ns_id, mcis_id, vm_id))?;
    label::remove(ctx.kv(), LABEL_KIND_VM, &vm.uuid)?;

    // keep the stored aggregate in line with what is left
    let mut mcis = load_mcis_flat(ctx, ns_id, mcis_id)?;
    let statuses: Vec<VmStatus> = surviving.iter().map(|v| v.status).collect();
    mcis.status = status::aggregate_mcis_status(&statuses);
    store_mcis(ctx, ns_id, &mcis)?;

    info!("VM `{vm_id}` deleted from MCIS `{mcis_id}`");
    Ok(())
}
