//! Cluster engine scenarios: lifecycle, node-group mutations and the
//! per-cluster serialization of node-group changes.

mod common;

use common::{harness, harness_with_driver, seed_namespace, CONN, MockDriver};
use mcis_engine::cluster;
use mcis_engine::errors::OrchestratorError;
use mcis_engine::io_models::cluster::{ClusterReq, NodeGroupReq};
use mcis_engine::models::cluster::ClusterStatus;
use mcis_engine::models::resource::VNet;
use mcis_engine::resource;
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

fn node_group_req(name: &str) -> NodeGroupReq {
    NodeGroupReq {
        name: name.to_string(),
        image_id: "img1".to_string(),
        spec_id: "spec1".to_string(),
        root_disk_type: "gp3".to_string(),
        root_disk_size: "50".to_string(),
        ssh_key_id: "key1".to_string(),
        on_auto_scaling: true,
        desired_node_size: 2,
        min_node_size: 1,
        max_node_size: 4,
    }
}

fn cluster_req(name: &str) -> ClusterReq {
    ClusterReq {
        name: name.to_string(),
        connection_name: CONN.to_string(),
        version: "1.29".to_string(),
        v_net_id: "vnet1".to_string(),
        subnet_ids: vec!["subnet1".to_string()],
        security_group_ids: vec!["sg1".to_string()],
        ssh_key_id: "key1".to_string(),
        node_group_list: vec![node_group_req("ng1")],
        label: BTreeMap::new(),
        system_label: String::new(),
        description: String::new(),
    }
}

#[test]
fn cluster_lifecycle_roundtrip() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let created = cluster::create_cluster(&h.ctx, "ns-a", &cluster_req("c1")).unwrap();
    assert_eq!("c1", created.id);
    assert_eq!(ClusterStatus::Active, created.status);
    assert_eq!("1.29", created.version);
    assert_eq!(1, created.node_group_list.len());
    assert_eq!("ng1", created.node_group_list[0].id);
    assert!(!created.access_info.kubeconfig.is_empty());

    // the cluster pins its network resources
    let vnet: VNet = resource::load(&h.ctx, "ns-a", "vnet1").unwrap();
    assert!(vnet.associated_object_list.contains(&"cluster/c1".to_string()));
    let blocked = resource::delete_resource(&h.ctx, "ns-a", mcis_engine::resource::ResourceKind::VNet, "vnet1", false);
    assert!(matches!(blocked, Err(OrchestratorError::Conflict { .. })));

    cluster::delete_cluster(&h.ctx, "ns-a", "c1", false).unwrap();
    assert!(matches!(
        cluster::get_cluster(&h.ctx, "ns-a", "c1"),
        Err(OrchestratorError::ClusterNotFound { .. })
    ));
    let vnet: VNet = resource::load(&h.ctx, "ns-a", "vnet1").unwrap();
    assert!(!vnet.associated_object_list.contains(&"cluster/c1".to_string()));
}

#[test]
fn duplicate_cluster_is_rejected() {
    let h = harness();
    seed_namespace(&h, "ns-a");
    cluster::create_cluster(&h.ctx, "ns-a", &cluster_req("c1")).unwrap();

    let second = cluster::create_cluster(&h.ctx, "ns-a", &cluster_req("c1"));
    assert!(matches!(second, Err(OrchestratorError::AlreadyExists { .. })));
}

#[test]
fn node_group_add_scale_and_remove() {
    let h = harness();
    seed_namespace(&h, "ns-a");
    cluster::create_cluster(&h.ctx, "ns-a", &cluster_req("c1")).unwrap();

    let extended = cluster::add_node_group(&h.ctx, "ns-a", "c1", &node_group_req("ng2")).unwrap();
    assert_eq!(2, extended.node_group_list.len());

    let duplicate = cluster::add_node_group(&h.ctx, "ns-a", "c1", &node_group_req("ng2"));
    assert!(matches!(duplicate, Err(OrchestratorError::AlreadyExists { .. })));

    let scaled = cluster::change_autoscale_size(&h.ctx, "ns-a", "c1", "ng2", 3, 1, 5).unwrap();
    let ng2 = scaled.node_group_list.iter().find(|ng| ng.id == "ng2").unwrap();
    assert_eq!(3, ng2.desired_node_size);
    assert_eq!(5, ng2.max_node_size);

    let invalid = cluster::change_autoscale_size(&h.ctx, "ns-a", "c1", "ng2", 9, 1, 5);
    assert!(matches!(invalid, Err(OrchestratorError::Validation { .. })));

    let toggled = cluster::set_autoscaling(&h.ctx, "ns-a", "c1", "ng2", false).unwrap();
    assert!(!toggled.node_group_list.iter().find(|ng| ng.id == "ng2").unwrap().on_auto_scaling);

    let trimmed = cluster::remove_node_group(&h.ctx, "ns-a", "c1", "ng2", false).unwrap();
    assert_eq!(1, trimmed.node_group_list.len());

    let missing = cluster::remove_node_group(&h.ctx, "ns-a", "c1", "ng9", false);
    assert!(matches!(missing, Err(OrchestratorError::Conflict { .. })));
}

#[test]
fn upgrade_updates_version_and_status() {
    let h = harness();
    seed_namespace(&h, "ns-a");
    cluster::create_cluster(&h.ctx, "ns-a", &cluster_req("c1")).unwrap();

    let upgraded = cluster::upgrade_cluster(&h.ctx, "ns-a", "c1", "1.30").unwrap();
    assert_eq!("1.30", upgraded.version);
    assert_eq!(ClusterStatus::Updating, upgraded.status);
}

#[test]
fn node_group_mutations_serialize_per_cluster() {
    // the cluster lock makes concurrent node-group work on one cluster
    // observable as Busy, while other clusters progress
    let h = harness_with_driver(MockDriver::with_latency(Duration::from_millis(300)));
    seed_namespace(&h, "ns-a");
    cluster::create_cluster(&h.ctx, "ns-a", &cluster_req("c1")).unwrap();
    cluster::create_cluster(&h.ctx, "ns-a", &cluster_req("c2")).unwrap();

    let slow = {
        let ctx = h.ctx.clone();
        thread::spawn(move || cluster::add_node_group(&ctx, "ns-a", "c1", &node_group_req("ng-slow")))
    };
    thread::sleep(Duration::from_millis(100));

    let contended = cluster::add_node_group(&h.ctx, "ns-a", "c1", &node_group_req("ng-contended"));
    assert!(matches!(contended, Err(OrchestratorError::Busy { .. })));

    // a different cluster is not serialized behind c1
    cluster::add_node_group(&h.ctx, "ns-a", "c2", &node_group_req("ng-free")).unwrap();

    let done = slow.join().unwrap().unwrap();
    assert!(done.node_group_list.iter().any(|ng| ng.id == "ng-slow"));
}
