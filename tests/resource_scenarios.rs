//! Registry scenarios: create/get round-trips, duplicate detection and the
//! association bookkeeping that blocks premature deletion.

mod common;

use common::{harness, mcis_req, seed_namespace, vm_req, CONN};
use mcis_engine::errors::OrchestratorError;
use mcis_engine::io_models::resource::{SubnetReq, VNetReq};
use mcis_engine::io_models::NamespaceReq;
use mcis_engine::models::resource::{SecurityGroup, SshKey, Subnet, VNet};
use mcis_engine::resource::ResourceKind;
use mcis_engine::{mcis, namespace, resource};

#[test]
fn vnet_with_subnet_roundtrip() {
    // S1: create namespace and a vNet with one subnet, read both back
    let h = harness();
    seed_namespace(&h, "ns-a");

    let vnet: VNet = resource::load(&h.ctx, "ns-a", "vnet1").unwrap();
    assert_eq!("vnet1", vnet.id);
    assert_eq!(CONN, vnet.connection_name);
    assert_eq!("10.0.0.0/16", vnet.cidr_block);
    assert!(!vnet.uuid.is_empty());
    assert!(vnet.csp_resource_name.starts_with("vnet1-"));
    assert_eq!(1, vnet.subnet_info_list.len());

    // the subnet is its own record and carries the back-reference
    let subnet: Subnet = resource::load(&h.ctx, "ns-a", "subnet1").unwrap();
    assert_eq!("vnet1", subnet.v_net_id);
    assert_eq!("10.0.0.0/24", subnet.cidr_block);
    assert_ne!(subnet.uuid, vnet.uuid);
}

#[test]
fn duplicate_create_returns_already_exists_and_keeps_first() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let before: VNet = resource::load(&h.ctx, "ns-a", "vnet1").unwrap();
    let second = resource::vnet::create_vnet(
        &h.ctx,
        "ns-a",
        &VNetReq {
            name: "vnet1".to_string(),
            connection_name: CONN.to_string(),
            cidr_block: "192.168.0.0/16".to_string(),
            subnet_info_list: Vec::new(),
            description: "other".to_string(),
        },
    );

    assert!(matches!(second, Err(OrchestratorError::AlreadyExists { .. })));
    let after: VNet = resource::load(&h.ctx, "ns-a", "vnet1").unwrap();
    assert_eq!(before, after);
}

#[test]
fn invalid_cidr_is_rejected_before_any_effect() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let result = resource::vnet::create_vnet(
        &h.ctx,
        "ns-a",
        &VNetReq {
            name: "vnet9".to_string(),
            connection_name: CONN.to_string(),
            cidr_block: "not-a-cidr".to_string(),
            subnet_info_list: Vec::new(),
            description: String::new(),
        },
    );

    assert!(matches!(result, Err(OrchestratorError::Validation { .. })));
    assert!(!resource::exists(&h.ctx, "ns-a", ResourceKind::VNet, "vnet9").unwrap());
}

#[test]
fn mcis_reference_blocks_vnet_deletion_until_released() {
    // S3: vNet delete conflicts while an MCIS references it, then succeeds
    let h = harness();
    seed_namespace(&h, "ns-a");

    // a second vNet with no security group on it, so `m1` ends up the only
    // consumer of vnet2
    resource::vnet::create_vnet(
        &h.ctx,
        "ns-a",
        &VNetReq {
            name: "vnet2".to_string(),
            connection_name: CONN.to_string(),
            cidr_block: "10.1.0.0/16".to_string(),
            subnet_info_list: vec![SubnetReq {
                name: "subnet2".to_string(),
                cidr_block: "10.1.0.0/24".to_string(),
                description: String::new(),
            }],
            description: String::new(),
        },
    )
    .unwrap();

    let mut req = vm_req("web", 1, CONN, "1");
    req.v_net_id = "vnet2".to_string();
    req.subnet_id = "subnet2".to_string();
    req.security_group_ids = Vec::new();
    mcis::create_mcis(&h.ctx, "ns-a", &mcis_req("m1", vec![req])).unwrap();

    let vnet: VNet = resource::load(&h.ctx, "ns-a", "vnet2").unwrap();
    assert_eq!(vec!["m1".to_string()], vnet.associated_object_list);

    let blocked = resource::delete_resource(&h.ctx, "ns-a", ResourceKind::VNet, "vnet2", true);
    assert!(matches!(blocked, Err(OrchestratorError::Conflict { .. })));
    assert!(resource::exists(&h.ctx, "ns-a", ResourceKind::VNet, "vnet2").unwrap());

    mcis::del_mcis(&h.ctx, "ns-a", "m1").unwrap();
    let released: VNet = resource::load(&h.ctx, "ns-a", "vnet2").unwrap();
    assert!(released.associated_object_list.is_empty());

    resource::delete_resource(&h.ctx, "ns-a", ResourceKind::VNet, "vnet2", true).unwrap();
    assert!(!resource::exists(&h.ctx, "ns-a", ResourceKind::VNet, "vnet2").unwrap());
    // subnets go down with the parent
    assert!(!resource::exists(&h.ctx, "ns-a", ResourceKind::Subnet, "subnet2").unwrap());
}

#[test]
fn security_group_holds_a_reference_on_its_vnet() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let vnet: VNet = resource::load(&h.ctx, "ns-a", "vnet1").unwrap();
    assert!(vnet
        .associated_object_list
        .contains(&"securityGroup/sg1".to_string()));

    let blocked = resource::delete_resource(&h.ctx, "ns-a", ResourceKind::VNet, "vnet1", false);
    assert!(matches!(blocked, Err(OrchestratorError::Conflict { .. })));

    resource::delete_resource(&h.ctx, "ns-a", ResourceKind::SecurityGroup, "sg1", false).unwrap();
    let vnet: VNet = resource::load(&h.ctx, "ns-a", "vnet1").unwrap();
    assert!(vnet.associated_object_list.is_empty());
}

#[test]
fn ssh_key_roundtrip_keeps_driver_material() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let key: SshKey = resource::load(&h.ctx, "ns-a", "key1").unwrap();
    assert_eq!("cb-user", key.username);
    assert!(key.public_key.starts_with("ssh-rsa"));
    assert!(!key.fingerprint.is_empty());
    assert!(key.csp_resource_id.starts_with("csp-key1-"));
}

#[test]
fn association_helper_adds_once_and_removes() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let first = resource::update_associated_object_list(
        &h.ctx,
        "ns-a",
        ResourceKind::SshKey,
        "key1",
        resource::AssociationAction::Add,
        "m9",
    )
    .unwrap();
    let second = resource::update_associated_object_list(
        &h.ctx,
        "ns-a",
        ResourceKind::SshKey,
        "key1",
        resource::AssociationAction::Add,
        "m9",
    )
    .unwrap();
    assert_eq!(first, second);
    assert_eq!(vec!["m9".to_string()], second);

    let removed = resource::update_associated_object_list(
        &h.ctx,
        "ns-a",
        ResourceKind::SshKey,
        "key1",
        resource::AssociationAction::Remove,
        "m9",
    )
    .unwrap();
    assert!(removed.is_empty());
}

#[test]
fn namespace_deletion_requires_empty_tree() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let blocked = namespace::del_ns(&h.ctx, "ns-a");
    assert!(matches!(blocked, Err(OrchestratorError::Conflict { .. })));
    assert!(namespace::check_ns(&h.ctx, "ns-a").unwrap());
}

#[test]
fn namespace_charset_and_duplicates_are_enforced() {
    let h = harness();

    let bad = namespace::create_ns(
        &h.ctx,
        &NamespaceReq {
            name: "bad name!".to_string(),
            description: String::new(),
        },
    );
    assert!(matches!(bad, Err(OrchestratorError::Validation { .. })));

    namespace::create_ns(
        &h.ctx,
        &NamespaceReq {
            name: "ns-a".to_string(),
            description: String::new(),
        },
    )
    .unwrap();
    let duplicate = namespace::create_ns(
        &h.ctx,
        &NamespaceReq {
            name: "ns-a".to_string(),
            description: String::new(),
        },
    );
    assert!(matches!(duplicate, Err(OrchestratorError::AlreadyExists { .. })));
}

#[test]
fn creating_against_a_missing_namespace_is_not_found() {
    let h = harness();

    let result = resource::vnet::create_vnet(
        &h.ctx,
        "nowhere",
        &VNetReq {
            name: "vnet1".to_string(),
            connection_name: CONN.to_string(),
            cidr_block: "10.0.0.0/16".to_string(),
            subnet_info_list: Vec::new(),
            description: String::new(),
        },
    );
    assert!(matches!(result, Err(OrchestratorError::NamespaceNotFound { .. })));
}

#[test]
fn add_subnet_extends_an_existing_vnet() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let updated = resource::vnet::add_subnet(
        &h.ctx,
        "ns-a",
        "vnet1",
        &SubnetReq {
            name: "subnet1b".to_string(),
            cidr_block: "10.0.1.0/24".to_string(),
            description: String::new(),
        },
    )
    .unwrap();

    assert_eq!(2, updated.subnet_info_list.len());
    let child: Subnet = resource::load(&h.ctx, "ns-a", "subnet1b").unwrap();
    assert_eq!("vnet1", child.v_net_id);
    assert_eq!("10.0.1.0/24", child.cidr_block);
}

#[test]
fn register_vnet_adopts_an_existing_csp_vpc() {
    let h = harness();
    namespace::create_ns(
        &h.ctx,
        &NamespaceReq {
            name: "ns-a".to_string(),
            description: String::new(),
        },
    )
    .unwrap();

    let registered = resource::vnet::register_vnet(
        &h.ctx,
        "ns-a",
        &mcis_engine::io_models::resource::VNetRegisterReq {
            name: "adopted".to_string(),
            connection_name: CONN.to_string(),
            csp_resource_id: "vpc-0existing".to_string(),
            description: String::new(),
        },
    )
    .unwrap();

    assert_eq!("vpc-0existing", registered.csp_resource_id);
    assert_eq!("Registered from CSP", registered.system_label);

    let check = resource::check_resource(&h.ctx, "ns-a", ResourceKind::VNet, "adopted").unwrap();
    assert!(check);
}

#[test]
fn security_group_requires_matching_connection() {
    let h = harness();
    seed_namespace(&h, "ns-a");

    let result = resource::security_group::create_security_group(
        &h.ctx,
        "ns-a",
        &mcis_engine::io_models::resource::SecurityGroupReq {
            name: "sg-other".to_string(),
            connection_name: "gcp-other-conn".to_string(),
            v_net_id: "vnet1".to_string(),
            firewall_rules: vec![mcis_engine::models::resource::FirewallRule {
                from_port: "80".to_string(),
                to_port: "80".to_string(),
                ip_protocol: "tcp".to_string(),
                direction: "inbound".to_string(),
                cidr: "0.0.0.0/0".to_string(),
            }],
            description: String::new(),
        },
    );

    assert!(matches!(result, Err(OrchestratorError::Validation { .. })));
    let _: SecurityGroup = resource::load(&h.ctx, "ns-a", "sg1").unwrap();
}
