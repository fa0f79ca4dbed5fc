//! Control actions over an MCIS or a single VM, gated by the per-VM state
//! machine and per-entity locks.

use crate::context::Context;
use crate::driver::VmControlVerb;
use crate::errors::OrchestratorError;
use crate::keys;
use crate::label;
use crate::locks::LockKey;
use crate::mcis::status::aggregate_mcis_status;
use crate::mcis::{
    ensure_ns, fan_out_vms, get_mcis, list_vms, load_mcis_flat, load_vm, remove_vm_associations, store_mcis,
    store_vm, LABEL_KIND_VM,
};
use crate::models::mcis::{ControlAction, Mcis, McisStatus, Vm, VmStatus};

fn verb_of(action: ControlAction) -> Option<VmControlVerb> {
    match action {
        ControlAction::Suspend => Some(VmControlVerb::Suspend),
        ControlAction::Resume => Some(VmControlVerb::Resume),
        ControlAction::Reboot => Some(VmControlVerb::Reboot),
        _ => None,
    }
}

fn mcis_target_of(action: ControlAction) -> McisStatus {
    match action {
        ControlAction::Suspend => McisStatus::Suspended,
        ControlAction::Resume | ControlAction::Reboot => McisStatus::Running,
        ControlAction::Terminate => McisStatus::Terminated,
        _ => McisStatus::Undefined,
    }
}

/// Applies one control verb to one VM. Takes the VM lock for the whole
/// driver+persist sequence; a concurrent action observes `Busy`.
fn apply_vm_action(
    ctx: &Context,
    ns_id: &str,
    mcis_id: &str,
    vm_id: &str,
    action: ControlAction,
) -> Result<Vm, OrchestratorError> {
    let _guard = ctx.locks().try_acquire(LockKey::Vm {
        ns_id: ns_id.to_string(),
        mcis_id: mcis_id.to_string(),
        vm_id: vm_id.to_string(),
    })?;

    let mut vm = load_vm(ctx, ns_id, mcis_id, vm_id)?;
    if !action.allowed_from(vm.status) {
        return Err(OrchestratorError::Conflict {
            id: vm_id.to_string(),
            message: format!("cannot {action} a VM in state {}", vm.status),
        });
    }

    // a VM that never materialized on the CSP can only be terminated, and
    // that is pure bookkeeping
    if vm.csp_resource_id.is_empty() {
        if action == ControlAction::Terminate {
            vm.status = VmStatus::Terminated;
            vm.target_status = VmStatus::Undefined;
            vm.target_action = ControlAction::None;
            store_vm(ctx, ns_id, mcis_id, &vm)?;
            return Ok(vm);
        }
        return Err(OrchestratorError::Conflict {
            id: vm_id.to_string(),
            message: format!("cannot {action} a VM without a CSP resource"),
        });
    }

    let previous_status = vm.status;
    vm.target_action = action;
    vm.target_status = action.target_status();
    vm.status = action.transitional_status();
    store_vm(ctx, ns_id, mcis_id, &vm)?;

    let outcome = {
        let permit = ctx.throttle().acquire(&vm.connection_name);
        match permit {
            Ok(_permit) => match action {
                ControlAction::Terminate => ctx
                    .driver()
                    .terminate_vm(&vm.connection_name, &vm.csp_resource_name)
                    .map_err(OrchestratorError::from),
                _ => match verb_of(action) {
                    Some(verb) => ctx
                        .driver()
                        .control_vm(&vm.connection_name, &vm.csp_resource_name, verb)
                        .map_err(OrchestratorError::from),
                    None => Err(OrchestratorError::invalid_field(
                        "action",
                        format!("`{action}` is not a VM control verb"),
                    )),
                },
            },
            Err(e) => Err(e),
        }
    };

    match outcome {
        Ok(info) => {
            vm.status = VmStatus::from_driver_status(&info.status);
            if vm.status == vm.target_status {
                vm.target_status = VmStatus::Undefined;
                vm.target_action = ControlAction::None;
            }
            vm.system_message = String::new();
            store_vm(ctx, ns_id, mcis_id, &vm)?;
            Ok(vm)
        }
        Err(e) => {
            // the driver refused or died: fall back to the last observed state
            vm.status = previous_status;
            vm.target_status = VmStatus::Undefined;
            vm.target_action = ControlAction::None;
            vm.system_message = e.to_string();
            store_vm(ctx, ns_id, mcis_id, &vm)?;
            Err(e)
        }
    }
}

/// Control verb against a single VM of an MCIS.
pub fn control_mcis_vm(
    ctx: &Context,
    ns_id: &str,
    mcis_id: &str,
    vm_id: &str,
    action: ControlAction,
) -> Result<Vm, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    if !matches!(
        action,
        ControlAction::Suspend | ControlAction::Resume | ControlAction::Reboot | ControlAction::Terminate
    ) {
        return Err(OrchestratorError::invalid_field(
            "action",
            format!("`{action}` cannot target a single VM"),
        ));
    }

    // existence check before taking the lock, so unknown ids are NotFound
    load_vm(ctx, ns_id, mcis_id, vm_id)?;
    apply_vm_action(ctx, ns_id, mcis_id, vm_id, action)
}

/// Control verb against every VM of an MCIS, fanned out in parallel.
/// Per-VM refusals (state machine, busy) are recorded and do not abort
/// sibling VMs.
pub fn control_mcis(
    ctx: &Context,
    ns_id: &str,
    mcis_id: &str,
    action: ControlAction,
) -> Result<Mcis, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;

    match action {
        ControlAction::Refine => return refine_mcis(ctx, ns_id, mcis_id),
        ControlAction::Continue => return continue_mcis(ctx, ns_id, mcis_id),
        ControlAction::Suspend | ControlAction::Resume | ControlAction::Reboot | ControlAction::Terminate => {}
        ControlAction::None | ControlAction::Create => {
            return Err(OrchestratorError::invalid_field(
                "action",
                format!("`{action}` is not a control verb"),
            ));
        }
    }

    let _guard = ctx.locks().try_acquire(LockKey::Mcis {
        ns_id: ns_id.to_string(),
        mcis_id: mcis_id.to_string(),
    })?;

    let mut mcis = load_mcis_flat(ctx, ns_id, mcis_id)?;
    mcis.target_action = action;
    mcis.target_status = mcis_target_of(action);
    store_mcis(ctx, ns_id, &mcis)?;

    let vms = list_vms(ctx, ns_id, mcis_id)?;
    let outcomes = fan_out_vms(&vms, |vm| apply_vm_action(ctx, ns_id, mcis_id, &vm.id, action).map(|_| ()));
    for (vm_id, outcome) in &outcomes {
        match outcome {
            Ok(()) => {}
            Err(OrchestratorError::Conflict { message, .. }) => {
                debug!("VM `{vm_id}` skipped for {action}: {message}");
            }
            Err(e) => warn!("{action} on VM `{vm_id}` failed: {e}"),
        }
    }

    let refreshed = list_vms(ctx, ns_id, mcis_id)?;
    let statuses: Vec<VmStatus> = refreshed.iter().map(|v| v.status).collect();
    mcis.status = aggregate_mcis_status(&statuses);
    if !mcis.status.is_in_progress() {
        mcis.target_status = McisStatus::Undefined;
        mcis.target_action = ControlAction::None;
    }
    store_mcis(ctx, ns_id, &mcis)?;

    get_mcis(ctx, ns_id, mcis_id)
}

/// `refine`: drops VMs that failed provisioning (or lost their CSP
/// identity) from the MCIS, cleaning their records and back-references.
fn refine_mcis(ctx: &Context, ns_id: &str, mcis_id: &str) -> Result<Mcis, OrchestratorError> {
    let _guard = ctx.locks().try_acquire(LockKey::Mcis {
        ns_id: ns_id.to_string(),
        mcis_id: mcis_id.to_string(),
    })?;

    let mut mcis = load_mcis_flat(ctx, ns_id, mcis_id)?;
    let vms = list_vms(ctx, ns_id, mcis_id)?;
    let (removed, surviving): (Vec<Vm>, Vec<Vm>) = vms
        .into_iter()
        .partition(|vm| matches!(vm.status, VmStatus::Failed | VmStatus::Undefined));

    for vm in &removed {
        if !vm.csp_resource_id.is_empty() {
            // half-provisioned on the CSP: tear it down, tolerate absence
            let result = ctx
                .throttle()
                .acquire(&vm.connection_name)
                .and_then(|_permit| Ok(ctx.driver().terminate_vm(&vm.connection_name, &vm.csp_resource_name)?));
            if let Err(e) = result {
                warn!("refine could not terminate VM `{}`: {e}", vm.id);
            }
        }
        ctx.kv().delete(&keys::vm_key(ns_id, mcis_id, &vm.id))?;
        label::remove(ctx.kv(), LABEL_KIND_VM, &vm.uuid)?;
    }
    remove_vm_associations(ctx, ns_id, mcis_id, &removed, &surviving)?;

    let statuses: Vec<VmStatus> = surviving.iter().map(|v| v.status).collect();
    mcis.status = aggregate_mcis_status(&statuses);
    store_mcis(ctx, ns_id, &mcis)?;

    info!("refined MCIS `{mcis_id}`: removed {} VM(s)", removed.len());
    get_mcis(ctx, ns_id, mcis_id)
}

/// `continue`: re-issues the action matching `targetStatus` on every VM
/// whose observed status still lags it.
fn continue_mcis(ctx: &Context, ns_id: &str, mcis_id: &str) -> Result<Mcis, OrchestratorError> {
    let _guard = ctx.locks().try_acquire(LockKey::Mcis {
        ns_id: ns_id.to_string(),
        mcis_id: mcis_id.to_string(),
    })?;

    let mut mcis = load_mcis_flat(ctx, ns_id, mcis_id)?;
    let vms = list_vms(ctx, ns_id, mcis_id)?;

    let outcomes = fan_out_vms(&vms, |vm| {
        if vm.target_status == VmStatus::Undefined || vm.status == vm.target_status || vm.status.is_pending() {
            return Ok(());
        }
        let action = match (vm.target_status, vm.status) {
            (VmStatus::Running, VmStatus::Suspended) => ControlAction::Resume,
            (VmStatus::Suspended, VmStatus::Running) => ControlAction::Suspend,
            (VmStatus::Terminated, _) => ControlAction::Terminate,
            _ => return Ok(()),
        };
        apply_vm_action(ctx, ns_id, mcis_id, &vm.id, action).map(|_| ())
    });
    for (vm_id, outcome) in &outcomes {
        if let Err(e) = outcome {
            warn!("continue on VM `{vm_id}` failed: {e}");
        }
    }

    let refreshed = list_vms(ctx, ns_id, mcis_id)?;
    let statuses: Vec<VmStatus> = refreshed.iter().map(|v| v.status).collect();
    mcis.status = aggregate_mcis_status(&statuses);
    if !mcis.status.is_in_progress() {
        mcis.target_status = McisStatus::Undefined;
        mcis.target_action = ControlAction::None;
    }
    store_mcis(ctx, ns_id, &mcis)?;

    get_mcis(ctx, ns_id, mcis_id)
}
