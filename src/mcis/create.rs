//! MCIS creation: reference resolution, sub-group expansion and the
//! parallel provisioning fan-out.

use crate::context::Context;
use crate::driver::io::VmReqInfo;
use crate::driver::monitoring::AgentInstallReq;
use crate::errors::OrchestratorError;
use crate::io_models::mcis::{McisReq, VmReq};
use crate::keys;
use crate::locks::LockKey;
use crate::mcis::status::aggregate_mcis_status;
use crate::mcis::{ensure_ns, fan_out_vms, list_vms, store_mcis, store_vm, vm_resource_refs};
use crate::models::mcis::{ControlAction, Mcis, McisStatus, RegionZone, Vm, VmStatus};
use crate::models::resource::{Image, SecurityGroup, SshKey, Subnet, VNet, VmSpec};
use crate::resource::{update_associated_object_list, AssociationAction};
use crate::utilities::{to_csp_resource_name, to_uuid_string, validate_id};
use itertools::Itertools;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Shared cancellation flag checked before every driver submission.
/// Already-issued calls are never recalled; their results simply land on
/// VMs that are considered finished.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        CancellationToken {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// CSP-facing names resolved once per VM request and shared by the expanded
/// sub-group members.
struct ResolvedRefs {
    vpc_name: String,
    subnet_name: String,
    security_group_names: Vec<String>,
    key_pair_name: String,
    key_pair_username: String,
    key_pair_private_key: String,
    image_name: String,
    spec_name: String,
    data_disk_names: Vec<String>,
}

fn check_connection(
    entity: &str,
    entity_connection: &str,
    vm_connection: &str,
) -> Result<(), OrchestratorError> {
    if entity_connection != vm_connection {
        return Err(OrchestratorError::invalid_field(
            "connectionName",
            format!("{entity} lives on connection `{entity_connection}`, VM requests `{vm_connection}`"),
        ));
    }
    Ok(())
}

/// Resolves every MCIR reference of one VM request, enforcing that all of
/// them live in the namespace and share the VM's connection.
fn resolve_refs(ctx: &Context, ns_id: &str, req: &VmReq) -> Result<ResolvedRefs, OrchestratorError> {
    let vnet: VNet = crate::resource::load(ctx, ns_id, &req.v_net_id)?;
    check_connection("vNet", &vnet.connection_name, &req.connection_name)?;

    let subnet: Subnet = crate::resource::load(ctx, ns_id, &req.subnet_id)?;
    if subnet.v_net_id != req.v_net_id {
        return Err(OrchestratorError::invalid_field(
            "subnetId",
            format!("subnet `{}` belongs to vNet `{}`, not `{}`", req.subnet_id, subnet.v_net_id, req.v_net_id),
        ));
    }

    let mut security_group_names = Vec::with_capacity(req.security_group_ids.len());
    for sg_id in &req.security_group_ids {
        let sg: SecurityGroup = crate::resource::load(ctx, ns_id, sg_id)?;
        check_connection("securityGroup", &sg.connection_name, &req.connection_name)?;
        security_group_names.push(sg.csp_resource_name);
    }

    let ssh_key: SshKey = crate::resource::load(ctx, ns_id, &req.ssh_key_id)?;
    check_connection("sshKey", &ssh_key.connection_name, &req.connection_name)?;

    let image: Image = crate::resource::load(ctx, ns_id, &req.image_id)?;
    check_connection("image", &image.connection_name, &req.connection_name)?;

    let spec: VmSpec = crate::resource::load(ctx, ns_id, &req.spec_id)?;
    check_connection("spec", &spec.connection_name, &req.connection_name)?;

    let mut data_disk_names = Vec::with_capacity(req.data_disk_ids.len());
    for disk_id in &req.data_disk_ids {
        let disk: crate::models::resource::DataDisk = crate::resource::load(ctx, ns_id, disk_id)?;
        check_connection("dataDisk", &disk.connection_name, &req.connection_name)?;
        data_disk_names.push(disk.csp_resource_name);
    }

    let image_name = if image.csp_resource_name.is_empty() {
        image.csp_image_name
    } else {
        image.csp_resource_name
    };

    Ok(ResolvedRefs {
        vpc_name: vnet.csp_resource_name,
        subnet_name: subnet.csp_resource_name,
        security_group_names,
        key_pair_name: ssh_key.csp_resource_name,
        key_pair_username: ssh_key.username,
        key_pair_private_key: ssh_key.private_key,
        image_name,
        spec_name: spec.csp_spec_name,
        data_disk_names,
    })
}

/// Expands one VM request into its sub-group members. A request of size 1
/// keeps its plain name; larger groups become `{name}-{idx}`.
fn expand_sub_group(req: &VmReq) -> Vec<Vm> {
    let size = req.sub_group_size.max(1);
    (1..=size)
        .map(|idx| {
            let id = if size == 1 {
                req.name.clone()
            } else {
                format!("{}-{}", req.name, idx)
            };
            let uuid = Uuid::new_v4();
            Vm {
                csp_resource_name: to_csp_resource_name(&id, &uuid),
                id,
                uuid: to_uuid_string(&uuid),
                sub_group_id: req.name.clone(),
                connection_name: req.connection_name.clone(),
                spec_id: req.spec_id.clone(),
                image_id: req.image_id.clone(),
                v_net_id: req.v_net_id.clone(),
                subnet_id: req.subnet_id.clone(),
                security_group_ids: req.security_group_ids.clone(),
                ssh_key_id: req.ssh_key_id.clone(),
                data_disk_ids: req.data_disk_ids.clone(),
                status: VmStatus::Creating,
                target_status: VmStatus::Running,
                target_action: ControlAction::Create,
                public_ip: String::new(),
                private_ip: String::new(),
                ssh_port: String::new(),
                region: RegionZone::default(),
                csp_resource_id: String::new(),
                root_disk_type: req.root_disk_type.clone(),
                root_disk_size: req.root_disk_size.clone(),
                vm_user_account: req.vm_user_account.clone(),
                description: req.description.clone(),
                system_message: String::new(),
                key_value_list: Vec::new(),
            }
        })
        .collect()
}

fn provision_vm(
    ctx: &Context,
    ns_id: &str,
    mcis_id: &str,
    vm: &Vm,
    refs: &ResolvedRefs,
    user_password: &str,
    cancel: &CancellationToken,
) -> Result<(), OrchestratorError> {
    let _guard = ctx.locks().try_acquire(LockKey::Vm {
        ns_id: ns_id.to_string(),
        mcis_id: mcis_id.to_string(),
        vm_id: vm.id.clone(),
    })?;

    let mut vm = vm.clone();

    if cancel.is_cancelled() {
        vm.status = VmStatus::Failed;
        vm.target_action = ControlAction::None;
        vm.target_status = VmStatus::Undefined;
        vm.system_message = "creation cancelled before driver submission".to_string();
        store_vm(ctx, ns_id, mcis_id, &vm)?;
        return Ok(());
    }

    let driver_req = VmReqInfo {
        name: vm.csp_resource_name.clone(),
        image_name: refs.image_name.clone(),
        vpc_name: refs.vpc_name.clone(),
        subnet_name: refs.subnet_name.clone(),
        security_group_names: refs.security_group_names.clone(),
        key_pair_name: refs.key_pair_name.clone(),
        vm_spec_name: refs.spec_name.clone(),
        data_disk_names: refs.data_disk_names.clone(),
        root_disk_type: vm.root_disk_type.clone(),
        root_disk_size: vm.root_disk_size.clone(),
        vm_user_id: vm.vm_user_account.clone(),
        vm_user_passwd: user_password.to_string(),
    };

    let outcome = ctx.throttle().acquire(&vm.connection_name).and_then(|_permit| {
        // last check before the submission; an already-issued call is never
        // recalled
        if cancel.is_cancelled() {
            return Err(OrchestratorError::internal(
                "creation cancelled before driver submission".to_string(),
            ));
        }
        Ok(ctx.driver().start_vm(&vm.connection_name, &driver_req)?)
    });

    match outcome {
        Ok(info) => {
            vm.csp_resource_id = info.iid.system_id.clone();
            vm.csp_resource_name = info.iid.name_id.clone();
            vm.public_ip = info.public_ip.clone();
            vm.private_ip = info.private_ip.clone();
            vm.ssh_port = ssh_port_of(&info.ssh_access_point);
            vm.region = RegionZone {
                region: info.region.region.clone(),
                zone: info.region.zone.clone(),
            };
            vm.key_value_list = crate::resource::vnet::to_key_values(&info.key_value_list);
            vm.status = VmStatus::Running;
            vm.target_status = VmStatus::Undefined;
            vm.target_action = ControlAction::None;
        }
        Err(e) => {
            warn!("provisioning VM `{}` of MCIS `{mcis_id}` failed: {e}", vm.id);
            vm.status = VmStatus::Failed;
            vm.target_status = VmStatus::Undefined;
            vm.target_action = ControlAction::None;
            vm.system_message = e.to_string();
        }
    }

    store_vm(ctx, ns_id, mcis_id, &vm)
}

fn ssh_port_of(access_point: &str) -> String {
    access_point.rsplit_once(':').map(|(_, port)| port.to_string()).unwrap_or_default()
}

pub fn create_mcis(ctx: &Context, ns_id: &str, req: &McisReq) -> Result<Mcis, OrchestratorError> {
    create_mcis_with_cancellation(ctx, ns_id, req, &CancellationToken::new())
}

pub fn create_mcis_with_cancellation(
    ctx: &Context,
    ns_id: &str,
    req: &McisReq,
    cancel: &CancellationToken,
) -> Result<Mcis, OrchestratorError> {
    validate_id("name", &req.name)?;
    if req.vm.is_empty() {
        return Err(OrchestratorError::invalid_field("vm", "at least one VM request is required".to_string()));
    }
    for vm_req in &req.vm {
        validate_id("vm.name", &vm_req.name)?;
        if vm_req.sub_group_size < 1 {
            return Err(OrchestratorError::invalid_field(
                "vm.subGroupSize",
                format!("`{}` must be at least 1", vm_req.sub_group_size),
            ));
        }
    }
    let duplicate_names = req.vm.iter().map(|v| v.name.as_str()).duplicates().collect::<Vec<_>>();
    if !duplicate_names.is_empty() {
        return Err(OrchestratorError::invalid_field(
            "vm.name",
            format!("duplicate VM request names: {duplicate_names:?}"),
        ));
    }

    ensure_ns(ctx, ns_id)?;
    if ctx.kv().get(&keys::mcis_key(ns_id, &req.name))?.is_some() {
        return Err(OrchestratorError::AlreadyExists {
            id: req.name.clone(),
            message: format!("MCIS already exists in namespace `{ns_id}`"),
        });
    }

    let _guard = ctx.locks().try_acquire(LockKey::Mcis {
        ns_id: ns_id.to_string(),
        mcis_id: req.name.clone(),
    })?;

    // resolve every reference up front so a dangling id fails the request
    // before anything is persisted or sent to a CSP
    let mut resolved: HashMap<String, ResolvedRefs> = HashMap::new();
    for vm_req in &req.vm {
        resolved.insert(vm_req.name.clone(), resolve_refs(ctx, ns_id, vm_req)?);
    }

    let mut mcis = Mcis {
        id: req.name.clone(),
        uuid: to_uuid_string(&Uuid::new_v4()),
        description: req.description.clone(),
        status: McisStatus::CreatingInProgress,
        target_status: McisStatus::Running,
        target_action: ControlAction::Create,
        install_mon_agent: req.install_mon_agent,
        label: req.label.clone(),
        system_label: req.system_label.clone(),
        vm: Vec::new(),
    };
    store_mcis(ctx, ns_id, &mcis)?;

    let mut vms = Vec::new();
    for vm_req in &req.vm {
        vms.extend(expand_sub_group(vm_req));
    }
    for vm in &vms {
        store_vm(ctx, ns_id, &mcis.id, vm)?;
    }

    // back-references before provisioning: a half-created MCIS must already
    // block deletion of the resources it stands on
    for (kind, resource_id) in vms.iter().flat_map(vm_resource_refs).unique() {
        update_associated_object_list(ctx, ns_id, kind, &resource_id, AssociationAction::Add, &mcis.id)?;
    }

    let passwords: HashMap<String, String> = req
        .vm
        .iter()
        .map(|v| (v.name.clone(), v.vm_user_password.clone()))
        .collect();

    let outcomes = fan_out_vms(&vms, |vm| {
        let refs = resolved
            .get(&vm.sub_group_id)
            .ok_or_else(|| OrchestratorError::internal(format!("no resolved refs for sub-group `{}`", vm.sub_group_id)))?;
        let password = passwords.get(&vm.sub_group_id).map(String::as_str).unwrap_or_default();
        provision_vm(ctx, ns_id, &mcis.id, vm, refs, password, cancel)
    });
    for (vm_id, outcome) in &outcomes {
        if let Err(e) = outcome {
            warn!("VM task `{vm_id}` of MCIS `{}` failed: {e}", mcis.id);
        }
    }

    let provisioned = list_vms(ctx, ns_id, &mcis.id)?;
    let statuses: Vec<VmStatus> = provisioned.iter().map(|v| v.status).collect();
    mcis.status = aggregate_mcis_status(&statuses);
    if !mcis.status.is_in_progress() {
        mcis.target_status = McisStatus::Undefined;
        mcis.target_action = ControlAction::None;
    }
    store_mcis(ctx, ns_id, &mcis)?;

    if req.install_mon_agent {
        install_mon_agent(ctx, ns_id, &mcis.id, &provisioned, &resolved);
    }

    info!("MCIS `{}` created in namespace `{ns_id}` with status {}", mcis.id, mcis.status);
    mcis.vm = provisioned;
    Ok(mcis)
}

/// Best-effort agent install on every running VM. Failures are recorded on
/// the VM record and never change the MCIS status.
fn install_mon_agent(
    ctx: &Context,
    ns_id: &str,
    mcis_id: &str,
    vms: &[Vm],
    resolved: &HashMap<String, ResolvedRefs>,
) {
    for vm in vms.iter().filter(|v| v.status == VmStatus::Running) {
        let Some(refs) = resolved.get(&vm.sub_group_id) else {
            continue;
        };
        let req = AgentInstallReq {
            ns_id: ns_id.to_string(),
            mcis_id: mcis_id.to_string(),
            vm_id: vm.id.clone(),
            public_ip: vm.public_ip.clone(),
            ssh_port: vm.ssh_port.clone(),
            user_name: if vm.vm_user_account.is_empty() {
                refs.key_pair_username.clone()
            } else {
                vm.vm_user_account.clone()
            },
            ssh_key: refs.key_pair_private_key.clone(),
        };
        if let Err(e) = ctx.monitoring().install_agent(&req) {
            warn!("monitoring agent install on VM `{}` failed: {e}", vm.id);
            let mut updated = vm.clone();
            updated.system_message = format!("monitoring agent install failed: {e}");
            if let Err(store_err) = store_vm(ctx, ns_id, mcis_id, &updated) {
                warn!("cannot record agent failure on VM `{}`: {store_err}", vm.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io_models::mcis::VmReq;

    fn vm_req(name: &str, size: u32) -> VmReq {
        VmReq {
            name: name.to_string(),
            sub_group_size: size,
            connection_name: "aws-conn".to_string(),
            spec_id: "spec1".to_string(),
            image_id: "img1".to_string(),
            v_net_id: "vnet1".to_string(),
            subnet_id: "subnet1".to_string(),
            security_group_ids: vec!["sg1".to_string()],
            ssh_key_id: "key1".to_string(),
            data_disk_ids: Vec::new(),
            root_disk_type: String::new(),
            root_disk_size: String::new(),
            vm_user_account: String::new(),
            vm_user_password: String::new(),
            description: String::new(),
        }
    }

    #[test]
    fn test_sub_group_expansion_names_and_sizes() {
        // setup & execute:
        let single = expand_sub_group(&vm_req("web", 1));
        let group = expand_sub_group(&vm_req("worker", 3));

        // verify:
        assert_eq!(1, single.len());
        assert_eq!("web", single[0].id);
        assert_eq!("web", single[0].sub_group_id);

        assert_eq!(3, group.len());
        assert_eq!(
            vec!["worker-1", "worker-2", "worker-3"],
            group.iter().map(|v| v.id.as_str()).collect::<Vec<_>>()
        );
        assert!(group.iter().all(|v| v.sub_group_id == "worker"));
        assert!(group.iter().all(|v| v.status == VmStatus::Creating));
        assert_eq!(3, group.iter().map(|v| v.uuid.as_str()).collect::<std::collections::HashSet<_>>().len());
    }

    #[test]
    fn test_ssh_port_extraction() {
        // execute & verify:
        assert_eq!("22", ssh_port_of("3.35.10.2:22"));
        assert_eq!("", ssh_port_of("no-port"));
    }

    #[test]
    fn test_cancellation_token_flips_once() {
        // setup:
        let token = CancellationToken::new();
        let observer = token.clone();

        // execute:
        assert!(!observer.is_cancelled());
        token.cancel();

        // verify:
        assert!(observer.is_cancelled());
    }
}
