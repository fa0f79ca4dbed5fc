//! Status aggregation and the driver-backed status poll.

use crate::context::Context;
use crate::driver::errors::DriverError;
use crate::errors::OrchestratorError;
use crate::mcis::{ensure_ns, fan_out_vms, get_mcis, list_vms, load_mcis_flat, store_mcis, store_vm};
use crate::models::mcis::{ControlAction, Mcis, McisStatus, VmStatus};

/// The deterministic aggregation law over observed VM states:
/// - all `Running` / `Suspended` / `Terminated` collapse to that label;
/// - any pending state wins as `<action>-InProgress`, priority
///   Creating > Terminating > Rebooting;
/// - all `Failed` is `Failed`; any `Failed` mixed in (no pending) is
///   `Partial-Failed`;
/// - mixed terminal states become `Partial-<dominant>`, ties broken
///   Running > Suspended > Terminated.
pub fn aggregate_mcis_status(statuses: &[VmStatus]) -> McisStatus {
    if statuses.is_empty() {
        return McisStatus::Undefined;
    }

    let total = statuses.len();
    let count = |status: VmStatus| statuses.iter().filter(|s| **s == status).count();

    let creating = count(VmStatus::Creating);
    let terminating = count(VmStatus::Terminating);
    let rebooting = count(VmStatus::Rebooting);
    if creating > 0 {
        return McisStatus::CreatingInProgress;
    }
    if terminating > 0 {
        return McisStatus::TerminatingInProgress;
    }
    if rebooting > 0 {
        return McisStatus::RebootingInProgress;
    }

    let running = count(VmStatus::Running);
    let suspended = count(VmStatus::Suspended);
    let terminated = count(VmStatus::Terminated);
    let failed = count(VmStatus::Failed);

    if running == total {
        return McisStatus::Running;
    }
    if suspended == total {
        return McisStatus::Suspended;
    }
    if terminated == total {
        return McisStatus::Terminated;
    }
    if failed == total {
        return McisStatus::Failed;
    }
    if failed > 0 {
        return McisStatus::PartialFailed;
    }

    if running == 0 && suspended == 0 && terminated == 0 {
        return McisStatus::Undefined;
    }
    if running >= suspended && running >= terminated {
        McisStatus::PartialRunning
    } else if suspended >= terminated {
        McisStatus::PartialSuspended
    } else {
        McisStatus::PartialTerminated
    }
}

/// Read path: no CSP traffic, but the stored aggregate is recomputed from
/// the stored VM states and written back.
pub fn mcis_status_from_store(ctx: &Context, ns_id: &str, mcis_id: &str) -> Result<Mcis, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let mut mcis = load_mcis_flat(ctx, ns_id, mcis_id)?;
    let vms = list_vms(ctx, ns_id, mcis_id)?;

    let statuses: Vec<VmStatus> = vms.iter().map(|v| v.status).collect();
    mcis.status = aggregate_mcis_status(&statuses);
    store_mcis(ctx, ns_id, &mcis)?;

    mcis.vm = vms;
    Ok(mcis)
}

/// `action=status`: polls each VM through the driver in parallel, writes
/// every observed state to the KV store and returns the fresh aggregate.
pub fn refresh_mcis_status(ctx: &Context, ns_id: &str, mcis_id: &str) -> Result<Mcis, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let mut mcis = load_mcis_flat(ctx, ns_id, mcis_id)?;
    let vms = list_vms(ctx, ns_id, mcis_id)?;

    let outcomes = fan_out_vms(&vms, |vm| {
        // a VM that never reached the CSP has nothing to poll
        if vm.csp_resource_name.is_empty() || (vm.status == VmStatus::Failed && vm.csp_resource_id.is_empty()) {
            return Ok(());
        }

        let observed = {
            let _permit = ctx.throttle().acquire(&vm.connection_name)?;
            ctx.driver().get_vm_status(&vm.connection_name, &vm.csp_resource_name)
        };

        let status = match observed {
            Ok(info) => VmStatus::from_driver_status(&info.status),
            Err(DriverError::NotFound { .. }) => VmStatus::Terminated,
            Err(e) => {
                warn!("status poll for VM `{}` failed: {e}", vm.id);
                return Err(e.into());
            }
        };

        if status != vm.status {
            let mut updated = vm.clone();
            updated.status = status;
            if updated.target_status == status {
                updated.target_status = VmStatus::Undefined;
                updated.target_action = ControlAction::None;
            }
            store_vm(ctx, ns_id, mcis_id, &updated)?;
        } else {
            // observed == stored; the write keeps KV as the record of the
            // last observation
            store_vm(ctx, ns_id, mcis_id, vm)?;
        }
        Ok(())
    });
    for (vm_id, outcome) in &outcomes {
        if let Err(e) = outcome {
            warn!("status poll task for VM `{vm_id}` failed: {e}");
        }
    }

    let refreshed = list_vms(ctx, ns_id, mcis_id)?;
    let statuses: Vec<VmStatus> = refreshed.iter().map(|v| v.status).collect();
    mcis.status = aggregate_mcis_status(&statuses);
    if !mcis.status.is_in_progress() && mcis.target_action != ControlAction::Create {
        mcis.target_status = McisStatus::Undefined;
        mcis.target_action = ControlAction::None;
    }
    store_mcis(ctx, ns_id, &mcis)?;

    get_mcis(ctx, ns_id, mcis_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::mcis::VmStatus::*;

    #[test]
    fn test_aggregation_law() {
        // setup:
        let test_cases = vec![
            (vec![], McisStatus::Undefined),
            (vec![Running, Running], McisStatus::Running),
            (vec![Suspended, Suspended], McisStatus::Suspended),
            (vec![Terminated], McisStatus::Terminated),
            (vec![Failed, Failed], McisStatus::Failed),
            (vec![Running, Creating], McisStatus::CreatingInProgress),
            (vec![Creating, Terminating, Rebooting], McisStatus::CreatingInProgress),
            (vec![Running, Terminating], McisStatus::TerminatingInProgress),
            (vec![Running, Rebooting], McisStatus::RebootingInProgress),
            (vec![Running, Failed], McisStatus::PartialFailed),
            (vec![Failed, Creating], McisStatus::CreatingInProgress),
            (vec![Running, Suspended], McisStatus::PartialRunning),
            (vec![Running, Suspended, Suspended], McisStatus::PartialSuspended),
            (vec![Terminated, Suspended, Terminated], McisStatus::PartialTerminated),
            (vec![Running, Terminated], McisStatus::PartialRunning),
            (vec![Undefined, Undefined], McisStatus::Undefined),
        ];

        for (statuses, expected) in test_cases {
            // execute:
            let aggregate = aggregate_mcis_status(&statuses);

            // verify:
            assert_eq!(expected, aggregate, "{statuses:?}");
        }
    }
}
