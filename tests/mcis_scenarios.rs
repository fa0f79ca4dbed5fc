//! MCIS engine scenarios: partial failure, per-VM serialization, fan-out
//! wall-clock, cancellation and the status poll.

mod common;

use common::{harness, harness_with_driver, mcis_req, seed_connection_resources, seed_namespace, vm_req, CONN, MockDriver};
use mcis_engine::errors::OrchestratorError;
use mcis_engine::kv_store::KvStore;
use mcis_engine::models::mcis::{ControlAction, McisStatus, VmStatus};
use mcis_engine::models::resource::VNet;
use mcis_engine::{mcis, namespace, resource};
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

#[test]
fn partial_failure_yields_partial_failed_and_delete_clears_keys() {
    // S2: one VM provisions, the sibling hits a driver outage
    let h = harness();
    seed_namespace(&h, "ns-a");
    h.driver.fail_start_vm_with_prefix("vm-bad");

    let created = mcis::create_mcis(
        &h.ctx,
        "ns-a",
        &mcis_req("m1", vec![vm_req("vm-ok", 1, CONN, "1"), vm_req("vm-bad", 1, CONN, "1")]),
    )
    .unwrap();

    assert_eq!(McisStatus::PartialFailed, created.status);
    assert_eq!(2, created.vm.len());

    let ok = mcis::load_vm(&h.ctx, "ns-a", "m1", "vm-ok").unwrap();
    assert_eq!(VmStatus::Running, ok.status);
    assert_eq!("3.35.10.2", ok.public_ip);
    assert_eq!("22", ok.ssh_port);
    assert!(ok.csp_resource_id.starts_with("csp-vm-ok-"));

    let bad = mcis::load_vm(&h.ctx, "ns-a", "m1", "vm-bad").unwrap();
    assert_eq!(VmStatus::Failed, bad.status);
    assert!(bad.system_message.contains("scripted provisioning failure"));
    assert!(bad.csp_resource_id.is_empty());

    // no rollback happened: the healthy VM is still there until delete
    mcis::del_mcis(&h.ctx, "ns-a", "m1").unwrap();
    assert!(matches!(
        mcis::get_mcis(&h.ctx, "ns-a", "m1"),
        Err(OrchestratorError::McisNotFound { .. })
    ));
    assert!(mcis::list_vms(&h.ctx, "ns-a", "m1").unwrap().is_empty());
}

#[test]
fn vm_uuids_are_unique_and_subgroups_expand() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let created = mcis::create_mcis(&h.ctx, "ns-a", &mcis_req("m1", vec![vm_req("worker", 3, CONN, "1")])).unwrap();

    let ids: Vec<&str> = created.vm.iter().map(|v| v.id.as_str()).collect();
    assert_eq!(vec!["worker-1", "worker-2", "worker-3"], ids);

    let uuids: std::collections::HashSet<&str> = created.vm.iter().map(|v| v.uuid.as_str()).collect();
    assert_eq!(3, uuids.len());
    assert!(created.vm.iter().all(|v| v.sub_group_id == "worker"));
    assert_eq!(McisStatus::Running, created.status);
}

#[test]
fn concurrent_actions_on_one_vm_first_wins_second_busy() {
    // S4: suspend racing a reboot on the same VM
    let h = harness_with_driver(MockDriver::with_latency(Duration::from_millis(300)));
    seed_namespace(&h, "ns-a");
    mcis::create_mcis(&h.ctx, "ns-a", &mcis_req("m1", vec![vm_req("web", 1, CONN, "1")])).unwrap();

    let racer = {
        let ctx = h.ctx.clone();
        thread::spawn(move || mcis::control::control_mcis_vm(&ctx, "ns-a", "m1", "web", ControlAction::Reboot))
    };

    // let the reboot take the lock and write its transitional state
    thread::sleep(Duration::from_millis(100));
    let stored = mcis::load_vm(&h.ctx, "ns-a", "m1", "web").unwrap();
    assert_eq!(VmStatus::Rebooting, stored.status);

    let second = mcis::control::control_mcis_vm(&h.ctx, "ns-a", "m1", "web", ControlAction::Suspend);
    assert!(matches!(second, Err(OrchestratorError::Busy { .. })));

    let rebooted = racer.join().unwrap().unwrap();
    assert_eq!(VmStatus::Running, rebooted.status);
}

#[test]
fn suspend_resume_walk_the_state_machine() {
    let h = harness();
    seed_namespace(&h, "ns-a");
    mcis::create_mcis(&h.ctx, "ns-a", &mcis_req("m1", vec![vm_req("web", 1, CONN, "1")])).unwrap();

    let suspended = mcis::control::control_mcis(&h.ctx, "ns-a", "m1", ControlAction::Suspend).unwrap();
    assert_eq!(McisStatus::Suspended, suspended.status);

    // suspend again: the state machine refuses per VM, aggregate unchanged
    let again = mcis::control::control_mcis(&h.ctx, "ns-a", "m1", ControlAction::Suspend).unwrap();
    assert_eq!(McisStatus::Suspended, again.status);

    let resumed = mcis::control::control_mcis(&h.ctx, "ns-a", "m1", ControlAction::Resume).unwrap();
    assert_eq!(McisStatus::Running, resumed.status);

    let terminated = mcis::control::control_mcis(&h.ctx, "ns-a", "m1", ControlAction::Terminate).unwrap();
    assert_eq!(McisStatus::Terminated, terminated.status);
}

#[test]
fn status_poll_is_idempotent_and_writes_observed_state() {
    // property 6: repeated polls converge on the same stored state
    let h = harness();
    seed_namespace(&h, "ns-a");
    mcis::create_mcis(&h.ctx, "ns-a", &mcis_req("m1", vec![vm_req("web", 1, CONN, "1")])).unwrap();

    // the CSP moved the VM behind our back
    let stored = mcis::load_vm(&h.ctx, "ns-a", "m1", "web").unwrap();
    h.driver.set_vm_status(&stored.csp_resource_name, "Suspended");

    let first = mcis::status::refresh_mcis_status(&h.ctx, "ns-a", "m1").unwrap();
    assert_eq!(McisStatus::Suspended, first.status);
    assert_eq!(VmStatus::Suspended, first.vm[0].status);

    let second = mcis::status::refresh_mcis_status(&h.ctx, "ns-a", "m1").unwrap();
    assert_eq!(first.status, second.status);
    assert_eq!(first.vm[0].status, second.vm[0].status);
    assert!(h.driver.status_poll_calls.load(Ordering::SeqCst) >= 2);
}

#[test]
fn bulk_status_poll_fans_out() {
    // S6: 50 VMs across 5 connections polled in parallel; sequential
    // latency would be 5 s
    let h = harness_with_driver(MockDriver::with_latency(Duration::from_millis(100)));
    namespace::create_ns(
        &h.ctx,
        &mcis_engine::io_models::NamespaceReq {
            name: "ns-a".to_string(),
            description: String::new(),
        },
    )
    .unwrap();

    let mut vm_reqs = Vec::new();
    for i in 1..=5 {
        let conn = format!("conn-{i}");
        seed_connection_resources(&h, "ns-a", &conn, &i.to_string());
        vm_reqs.push(vm_req(&format!("grp{i}"), 10, &conn, &i.to_string()));
    }
    mcis::create_mcis(&h.ctx, "ns-a", &mcis_req("m1", vm_reqs)).unwrap();
    assert_eq!(50, mcis::list_vms(&h.ctx, "ns-a", "m1").unwrap().len());

    let started = Instant::now();
    let polled = mcis::status::refresh_mcis_status(&h.ctx, "ns-a", "m1").unwrap();
    let elapsed = started.elapsed();

    assert_eq!(McisStatus::Running, polled.status);
    // fan-out bound: well under the 5 s a serial sweep would need
    assert!(elapsed < Duration::from_secs(2), "poll took {elapsed:?}");
}

#[test]
fn cancellation_keeps_finished_vms_and_fails_unsubmitted_ones() {
    // property 7: a cancelled create settles with only the finished VMs
    let h = harness_with_driver(MockDriver::with_latency(Duration::from_millis(500)));
    seed_namespace(&h, "ns-a");

    // 20 VMs on one connection: 10 go out immediately, 10 wait on the
    // per-connection cap and observe the cancellation
    let token = mcis::CancellationToken::new();
    let creator = {
        let ctx = h.ctx.clone();
        let token = token.clone();
        thread::spawn(move || {
            mcis::create_mcis_with_cancellation(&ctx, "ns-a", &mcis_req("m1", vec![vm_req("web", 20, CONN, "1")]), &token)
        })
    };

    // wait until the first batch is in flight, then cancel while the rest
    // still queue on the connection cap
    let waiting_since = Instant::now();
    while h.driver.start_vm_calls.load(Ordering::SeqCst) < 10 {
        assert!(waiting_since.elapsed() < Duration::from_secs(5), "first batch never went out");
        thread::sleep(Duration::from_millis(10));
    }
    token.cancel();
    let created = creator.join().unwrap().unwrap();

    let vms = mcis::list_vms(&h.ctx, "ns-a", "m1").unwrap();
    assert_eq!(20, vms.len());
    let running = vms.iter().filter(|v| v.status == VmStatus::Running).count();
    let cancelled = vms
        .iter()
        .filter(|v| v.status == VmStatus::Failed && v.system_message.contains("cancelled"))
        .count();
    assert_eq!(10, running, "issued calls are not recalled");
    assert_eq!(10, cancelled, "unsubmitted VMs observe the cancellation");
    assert_eq!(McisStatus::PartialFailed, created.status);
    assert_eq!(10, h.driver.start_vm_calls.load(Ordering::SeqCst));
}

#[test]
fn refine_drops_failed_vms() {
    let h = harness();
    seed_namespace(&h, "ns-a");
    h.driver.fail_start_vm_with_prefix("vm-bad");

    mcis::create_mcis(
        &h.ctx,
        "ns-a",
        &mcis_req("m1", vec![vm_req("vm-ok", 1, CONN, "1"), vm_req("vm-bad", 1, CONN, "1")]),
    )
    .unwrap();

    let refined = mcis::control::control_mcis(&h.ctx, "ns-a", "m1", ControlAction::Refine).unwrap();
    assert_eq!(McisStatus::Running, refined.status);
    assert_eq!(1, refined.vm.len());
    assert_eq!("vm-ok", refined.vm[0].id);
    assert!(matches!(
        mcis::load_vm(&h.ctx, "ns-a", "m1", "vm-bad"),
        Err(OrchestratorError::VmNotFound { .. })
    ));
}

#[test]
fn continue_reissues_the_lagging_action() {
    let h = harness();
    seed_namespace(&h, "ns-a");
    mcis::create_mcis(&h.ctx, "ns-a", &mcis_req("m1", vec![vm_req("web", 1, CONN, "1")])).unwrap();

    // a suspend whose driver call was lost: target set, status stale
    let mut vm = mcis::load_vm(&h.ctx, "ns-a", "m1", "web").unwrap();
    vm.target_status = VmStatus::Suspended;
    vm.target_action = ControlAction::Suspend;
    let key = format!("/ns/ns-a/mcis/m1/vm/{}", vm.id);
    h.kv
        .put(&key, &serde_json::to_string(&vm).unwrap())
        .unwrap();

    let resumed = mcis::control::control_mcis(&h.ctx, "ns-a", "m1", ControlAction::Continue).unwrap();
    assert_eq!(McisStatus::Suspended, resumed.status);
    let settled = mcis::load_vm(&h.ctx, "ns-a", "m1", "web").unwrap();
    assert_eq!(VmStatus::Suspended, settled.status);
    assert_eq!(ControlAction::None, settled.target_action);
}

#[test]
fn attach_and_detach_data_disk_track_associations() {
    let h = harness();
    seed_namespace(&h, "ns-a");
    common::seed_data_disk(&h, "ns-a", "disk1");
    mcis::create_mcis(&h.ctx, "ns-a", &mcis_req("m1", vec![vm_req("web", 1, CONN, "1")])).unwrap();

    let attached = mcis::data_disk::attach_data_disk(&h.ctx, "ns-a", "m1", "web", "disk1").unwrap();
    assert_eq!(vec!["disk1".to_string()], attached.data_disk_ids);

    // the disk now blocks its own deletion
    let blocked = resource::delete_resource(
        &h.ctx,
        "ns-a",
        mcis_engine::resource::ResourceKind::DataDisk,
        "disk1",
        false,
    );
    assert!(matches!(blocked, Err(OrchestratorError::Conflict { .. })));

    let again = mcis::data_disk::attach_data_disk(&h.ctx, "ns-a", "m1", "web", "disk1");
    assert!(matches!(again, Err(OrchestratorError::Conflict { .. })));

    let detached = mcis::data_disk::detach_data_disk(&h.ctx, "ns-a", "m1", "web", "disk1").unwrap();
    assert!(detached.data_disk_ids.is_empty());
    resource::delete_resource(
        &h.ctx,
        "ns-a",
        mcis_engine::resource::ResourceKind::DataDisk,
        "disk1",
        false,
    )
    .unwrap();
}

#[test]
fn deleting_a_single_vm_updates_aggregate_and_associations() {
    let h = harness();
    seed_namespace(&h, "ns-a");
    mcis::create_mcis(&h.ctx, "ns-a", &mcis_req("m1", vec![vm_req("web", 2, CONN, "1")])).unwrap();

    mcis::del_mcis_vm(&h.ctx, "ns-a", "m1", "web-1").unwrap();

    let remaining = mcis::list_vms(&h.ctx, "ns-a", "m1").unwrap();
    assert_eq!(1, remaining.len());
    // the surviving VM still pins the shared resources
    let vnet: VNet = resource::load(&h.ctx, "ns-a", "vnet1").unwrap();
    assert!(vnet.associated_object_list.contains(&"m1".to_string()));
}

#[test]
fn mcis_create_with_dangling_reference_fails_before_any_vm() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let mut req = vm_req("web", 1, CONN, "1");
    req.spec_id = "no-such-spec".to_string();
    let result = mcis::create_mcis(&h.ctx, "ns-a", &mcis_req("m1", vec![req]));

    assert!(matches!(result, Err(OrchestratorError::ResourceNotFound { .. })));
    assert!(matches!(
        mcis::get_mcis(&h.ctx, "ns-a", "m1"),
        Err(OrchestratorError::McisNotFound { .. })
    ));
    assert_eq!(0, h.driver.start_vm_calls.load(Ordering::SeqCst));
}
