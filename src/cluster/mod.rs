//! Cluster engine: the node-group analogue of the MCIS engine. Node-group
//! mutations are serialized per cluster (driver constraint) by the cluster
//! lock; distinct clusters progress in parallel.

use crate::context::Context;
use crate::driver::io::{ClusterReqInfo, NodeGroupInfo, NodeGroupReqInfo};
use crate::errors::OrchestratorError;
use crate::io_models::cluster::{ClusterReq, NodeGroupReq};
use crate::keys;
use crate::label;
use crate::locks::LockKey;
use crate::models::cluster::{Cluster, ClusterAccessInfo, ClusterNetwork, ClusterStatus, NodeGroup, NodeGroupStatus};
use crate::models::resource::{Image, SecurityGroup, SshKey, Subnet, VNet, VmSpec};
use crate::resource::vnet::to_key_values;
use crate::resource::{update_associated_object_list, AssociationAction, ResourceKind};
use crate::utilities::{to_csp_resource_name, to_uuid_string, validate_id};
use std::collections::BTreeMap;
use uuid::Uuid;

const LABEL_KIND: &str = "cluster";

/// Composed identifier used when fanning a cluster matrix over CSPs and
/// regions: `{prefix}{cspIdx}{regionIdx}{add}`.
pub fn composed_cluster_id(prefix: &str, csp_idx: usize, region_idx: usize, add: &str) -> String {
    format!("{prefix}{csp_idx}{region_idx}{add}")
}

fn ensure_ns(ctx: &Context, ns_id: &str) -> Result<(), OrchestratorError> {
    if !crate::namespace::check_ns(ctx, ns_id)? {
        return Err(OrchestratorError::NamespaceNotFound {
            ns_id: ns_id.to_string(),
        });
    }
    Ok(())
}

fn store_cluster(ctx: &Context, ns_id: &str, cluster: &Cluster) -> Result<(), OrchestratorError> {
    let key = keys::cluster_key(ns_id, &cluster.id);
    ctx.kv().put(&key, &serde_json::to_string(cluster)?)?;
    label::upsert(
        ctx.kv(),
        LABEL_KIND,
        &cluster.uuid,
        &key,
        cluster.label.clone(),
        BTreeMap::from([("nsId".to_string(), ns_id.to_string())]),
    )?;
    Ok(())
}

fn load_cluster(ctx: &Context, ns_id: &str, cluster_id: &str) -> Result<Cluster, OrchestratorError> {
    let entry = ctx
        .kv()
        .get(&keys::cluster_key(ns_id, cluster_id))?
        .ok_or_else(|| OrchestratorError::ClusterNotFound {
            ns_id: ns_id.to_string(),
            cluster_id: cluster_id.to_string(),
        })?;
    Ok(serde_json::from_str(&entry.value)?)
}

pub fn get_cluster(ctx: &Context, ns_id: &str, cluster_id: &str) -> Result<Cluster, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let cluster = load_cluster(ctx, ns_id, cluster_id)?;
    label::assert_entry(
        ctx.kv(),
        LABEL_KIND,
        &cluster.uuid,
        &keys::cluster_key(ns_id, cluster_id),
        cluster.label.clone(),
        BTreeMap::from([("nsId".to_string(), ns_id.to_string())]),
    )?;
    Ok(cluster)
}

pub fn list_cluster_ids(ctx: &Context, ns_id: &str) -> Result<Vec<String>, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let prefix = keys::cluster_prefix(ns_id);
    let entries = ctx.kv().get_list(&prefix, true)?;
    Ok(crate::kv_store::get_child_list(&entries, &prefix))
}

pub fn list_clusters(ctx: &Context, ns_id: &str) -> Result<Vec<Cluster>, OrchestratorError> {
    let mut clusters = Vec::new();
    for cluster_id in list_cluster_ids(ctx, ns_id)? {
        clusters.push(get_cluster(ctx, ns_id, &cluster_id)?);
    }
    Ok(clusters)
}

/// CSP-facing identities of one planned node group.
struct PlannedNodeGroup {
    req: NodeGroupReq,
    uuid: Uuid,
    csp_name: String,
}

fn resolve_node_group(
    ctx: &Context,
    ns_id: &str,
    connection: &str,
    req: &NodeGroupReq,
) -> Result<(PlannedNodeGroup, NodeGroupReqInfo), OrchestratorError> {
    validate_id("nodeGroupList.name", &req.name)?;
    if req.min_node_size > req.desired_node_size || req.desired_node_size > req.max_node_size {
        return Err(OrchestratorError::invalid_field(
            "nodeGroupList",
            format!(
                "node sizes must satisfy min <= desired <= max, got {}/{}/{}",
                req.min_node_size, req.desired_node_size, req.max_node_size
            ),
        ));
    }

    let image: Image = crate::resource::load(ctx, ns_id, &req.image_id)?;
    let spec: VmSpec = crate::resource::load(ctx, ns_id, &req.spec_id)?;
    let ssh_key: SshKey = crate::resource::load(ctx, ns_id, &req.ssh_key_id)?;
    for (entity, entity_connection) in [
        ("image", image.connection_name.as_str()),
        ("spec", spec.connection_name.as_str()),
        ("sshKey", ssh_key.connection_name.as_str()),
    ] {
        if entity_connection != connection {
            return Err(OrchestratorError::invalid_field(
                "connectionName",
                format!("{entity} lives on connection `{entity_connection}`, cluster requests `{connection}`"),
            ));
        }
    }

    let uuid = Uuid::new_v4();
    let csp_name = to_csp_resource_name(&req.name, &uuid);
    let image_name = if image.csp_resource_name.is_empty() {
        image.csp_image_name
    } else {
        image.csp_resource_name
    };

    let driver_req = NodeGroupReqInfo {
        name: csp_name.clone(),
        image_name,
        vm_spec_name: spec.csp_spec_name,
        root_disk_type: req.root_disk_type.clone(),
        root_disk_size: req.root_disk_size.clone(),
        key_pair_name: ssh_key.csp_resource_name,
        on_auto_scaling: req.on_auto_scaling,
        desired_node_size: req.desired_node_size,
        min_node_size: req.min_node_size,
        max_node_size: req.max_node_size,
    };

    Ok((
        PlannedNodeGroup {
            req: req.clone(),
            uuid,
            csp_name,
        },
        driver_req,
    ))
}

fn node_group_from_response(planned: &PlannedNodeGroup, info: &NodeGroupInfo) -> NodeGroup {
    NodeGroup {
        id: planned.req.name.clone(),
        uuid: to_uuid_string(&planned.uuid),
        image_id: planned.req.image_id.clone(),
        spec_id: planned.req.spec_id.clone(),
        root_disk_type: planned.req.root_disk_type.clone(),
        root_disk_size: planned.req.root_disk_size.clone(),
        ssh_key_id: planned.req.ssh_key_id.clone(),
        on_auto_scaling: info.on_auto_scaling,
        desired_node_size: info.desired_node_size,
        min_node_size: info.min_node_size,
        max_node_size: info.max_node_size,
        status: NodeGroupStatus::from_driver_status(&info.status),
        csp_resource_id: info.iid.system_id.clone(),
        csp_resource_name: info.iid.name_id.clone(),
        key_value_list: to_key_values(&info.key_value_list),
    }
}

fn cluster_association_refs(cluster: &Cluster) -> Vec<(ResourceKind, String)> {
    let mut refs = vec![
        (ResourceKind::VNet, cluster.network.v_net_id.clone()),
        (ResourceKind::SshKey, cluster.ssh_key_id.clone()),
    ];
    for subnet in &cluster.network.subnet_ids {
        refs.push((ResourceKind::Subnet, subnet.clone()));
    }
    for sg in &cluster.network.security_group_ids {
        refs.push((ResourceKind::SecurityGroup, sg.clone()));
    }
    refs
}

pub fn create_cluster(ctx: &Context, ns_id: &str, req: &ClusterReq) -> Result<Cluster, OrchestratorError> {
    validate_id("name", &req.name)?;
    if req.version.is_empty() {
        return Err(OrchestratorError::invalid_field("version", "must not be empty".to_string()));
    }

    ensure_ns(ctx, ns_id)?;
    if ctx.kv().get(&keys::cluster_key(ns_id, &req.name))?.is_some() {
        return Err(OrchestratorError::AlreadyExists {
            id: req.name.clone(),
            message: format!("cluster already exists in namespace `{ns_id}`"),
        });
    }

    let _guard = ctx.locks().try_acquire(LockKey::Cluster {
        ns_id: ns_id.to_string(),
        cluster_id: req.name.clone(),
    })?;

    let vnet: VNet = crate::resource::load(ctx, ns_id, &req.v_net_id)?;
    if vnet.connection_name != req.connection_name {
        return Err(OrchestratorError::invalid_field(
            "connectionName",
            format!(
                "vNet `{}` lives on connection `{}`, cluster requests `{}`",
                req.v_net_id, vnet.connection_name, req.connection_name
            ),
        ));
    }
    let mut subnet_names = Vec::with_capacity(req.subnet_ids.len());
    for subnet_id in &req.subnet_ids {
        let subnet: Subnet = crate::resource::load(ctx, ns_id, subnet_id)?;
        if subnet.v_net_id != req.v_net_id {
            return Err(OrchestratorError::invalid_field(
                "subnetIds",
                format!("subnet `{subnet_id}` belongs to vNet `{}`", subnet.v_net_id),
            ));
        }
        subnet_names.push(subnet.csp_resource_name);
    }
    let mut security_group_names = Vec::with_capacity(req.security_group_ids.len());
    for sg_id in &req.security_group_ids {
        let sg: SecurityGroup = crate::resource::load(ctx, ns_id, sg_id)?;
        security_group_names.push(sg.csp_resource_name);
    }
    crate::resource::load::<SshKey>(ctx, ns_id, &req.ssh_key_id)?;

    // node groups resolve before the driver sees anything
    let mut planned_groups = Vec::with_capacity(req.node_group_list.len());
    let mut driver_groups = Vec::with_capacity(req.node_group_list.len());
    for ng_req in &req.node_group_list {
        let (planned, driver_req) = resolve_node_group(ctx, ns_id, &req.connection_name, ng_req)?;
        planned_groups.push(planned);
        driver_groups.push(driver_req);
    }

    let uuid = Uuid::new_v4();
    let driver_req = ClusterReqInfo {
        name: to_csp_resource_name(&req.name, &uuid),
        version: req.version.clone(),
        vpc_name: vnet.csp_resource_name.clone(),
        subnet_names,
        security_group_names,
        node_group_list: driver_groups,
    };

    let response = {
        let _permit = ctx.throttle().acquire(&req.connection_name)?;
        ctx.driver().create_cluster(&req.connection_name, &driver_req)?
    };

    let node_group_list = response
        .node_group_list
        .iter()
        .filter_map(|info| {
            planned_groups
                .iter()
                .find(|p| p.csp_name == info.iid.name_id)
                .map(|planned| node_group_from_response(planned, info))
        })
        .collect();

    let cluster = Cluster {
        id: req.name.clone(),
        uuid: to_uuid_string(&uuid),
        connection_name: req.connection_name.clone(),
        version: response.version.clone(),
        network: ClusterNetwork {
            v_net_id: req.v_net_id.clone(),
            subnet_ids: req.subnet_ids.clone(),
            security_group_ids: req.security_group_ids.clone(),
        },
        ssh_key_id: req.ssh_key_id.clone(),
        node_group_list,
        status: ClusterStatus::from_driver_status(&response.status),
        access_info: ClusterAccessInfo {
            endpoint: response.access_info.endpoint.clone(),
            kubeconfig: response.access_info.kubeconfig.clone(),
        },
        addons: to_key_values(&response.addons),
        csp_resource_id: response.iid.system_id.clone(),
        csp_resource_name: response.iid.name_id.clone(),
        description: req.description.clone(),
        label: req.label.clone(),
        system_label: req.system_label.clone(),
        created_time: response.created_time.clone(),
        key_value_list: to_key_values(&response.key_value_list),
    };
    store_cluster(ctx, ns_id, &cluster)?;

    for (kind, resource_id) in cluster_association_refs(&cluster) {
        update_associated_object_list(
            ctx,
            ns_id,
            kind,
            &resource_id,
            AssociationAction::Add,
            &format!("cluster/{}", cluster.id),
        )?;
    }

    info!("cluster `{}` created in namespace `{ns_id}` with status {}", cluster.id, cluster.status);
    Ok(cluster)
}

/// Pulls the driver's current view of the cluster into the record.
pub fn refresh_cluster_status(ctx: &Context, ns_id: &str, cluster_id: &str) -> Result<Cluster, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let mut cluster = load_cluster(ctx, ns_id, cluster_id)?;

    let response = {
        let _permit = ctx.throttle().acquire(&cluster.connection_name)?;
        ctx.driver().get_cluster(&cluster.connection_name, &cluster.csp_resource_name)?
    };

    cluster.status = ClusterStatus::from_driver_status(&response.status);
    cluster.version = response.version.clone();
    cluster.access_info = ClusterAccessInfo {
        endpoint: response.access_info.endpoint.clone(),
        kubeconfig: response.access_info.kubeconfig.clone(),
    };
    for node_group in &mut cluster.node_group_list {
        if let Some(info) = response
            .node_group_list
            .iter()
            .find(|info| info.iid.name_id == node_group.csp_resource_name)
        {
            node_group.status = NodeGroupStatus::from_driver_status(&info.status);
            node_group.desired_node_size = info.desired_node_size;
            node_group.min_node_size = info.min_node_size;
            node_group.max_node_size = info.max_node_size;
            node_group.on_auto_scaling = info.on_auto_scaling;
        }
    }
    store_cluster(ctx, ns_id, &cluster)?;
    Ok(cluster)
}

pub fn add_node_group(
    ctx: &Context,
    ns_id: &str,
    cluster_id: &str,
    req: &NodeGroupReq,
) -> Result<Cluster, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Cluster {
        ns_id: ns_id.to_string(),
        cluster_id: cluster_id.to_string(),
    })?;

    let mut cluster = load_cluster(ctx, ns_id, cluster_id)?;
    if cluster.node_group_list.iter().any(|ng| ng.id == req.name) {
        return Err(OrchestratorError::AlreadyExists {
            id: req.name.clone(),
            message: format!("node group already exists in cluster `{cluster_id}`"),
        });
    }

    let (planned, driver_req) = resolve_node_group(ctx, ns_id, &cluster.connection_name, req)?;

    let response = {
        let _permit = ctx.throttle().acquire(&cluster.connection_name)?;
        ctx.driver()
            .add_node_group(&cluster.connection_name, &cluster.csp_resource_name, &driver_req)?
    };

    cluster.node_group_list.push(node_group_from_response(&planned, &response));
    store_cluster(ctx, ns_id, &cluster)?;

    info!("node group `{}` added to cluster `{cluster_id}`", req.name);
    Ok(cluster)
}

fn find_node_group<'c>(cluster: &'c Cluster, node_group_id: &str) -> Result<&'c NodeGroup, OrchestratorError> {
    cluster
        .node_group_list
        .iter()
        .find(|ng| ng.id == node_group_id)
        .ok_or_else(|| OrchestratorError::Conflict {
            id: node_group_id.to_string(),
            message: format!("cluster `{}` has no such node group", cluster.id),
        })
}

pub fn remove_node_group(
    ctx: &Context,
    ns_id: &str,
    cluster_id: &str,
    node_group_id: &str,
    force: bool,
) -> Result<Cluster, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Cluster {
        ns_id: ns_id.to_string(),
        cluster_id: cluster_id.to_string(),
    })?;

    let mut cluster = load_cluster(ctx, ns_id, cluster_id)?;
    let csp_name = find_node_group(&cluster, node_group_id)?.csp_resource_name.clone();

    {
        let _permit = ctx.throttle().acquire(&cluster.connection_name)?;
        ctx.driver()
            .remove_node_group(&cluster.connection_name, &cluster.csp_resource_name, &csp_name, force)?;
    }

    cluster.node_group_list.retain(|ng| ng.id != node_group_id);
    store_cluster(ctx, ns_id, &cluster)?;

    info!("node group `{node_group_id}` removed from cluster `{cluster_id}`");
    Ok(cluster)
}

pub fn set_autoscaling(
    ctx: &Context,
    ns_id: &str,
    cluster_id: &str,
    node_group_id: &str,
    on: bool,
) -> Result<Cluster, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Cluster {
        ns_id: ns_id.to_string(),
        cluster_id: cluster_id.to_string(),
    })?;

    let mut cluster = load_cluster(ctx, ns_id, cluster_id)?;
    let csp_name = find_node_group(&cluster, node_group_id)?.csp_resource_name.clone();

    {
        let _permit = ctx.throttle().acquire(&cluster.connection_name)?;
        ctx.driver().set_node_group_autoscaling(
            &cluster.connection_name,
            &cluster.csp_resource_name,
            &csp_name,
            on,
        )?;
    }

    for node_group in &mut cluster.node_group_list {
        if node_group.id == node_group_id {
            node_group.on_auto_scaling = on;
        }
    }
    store_cluster(ctx, ns_id, &cluster)?;
    Ok(cluster)
}

pub fn change_autoscale_size(
    ctx: &Context,
    ns_id: &str,
    cluster_id: &str,
    node_group_id: &str,
    desired: u32,
    min: u32,
    max: u32,
) -> Result<Cluster, OrchestratorError> {
    if min > desired || desired > max {
        return Err(OrchestratorError::invalid_field(
            "autoscaleSize",
            format!("node sizes must satisfy min <= desired <= max, got {min}/{desired}/{max}"),
        ));
    }

    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Cluster {
        ns_id: ns_id.to_string(),
        cluster_id: cluster_id.to_string(),
    })?;

    let mut cluster = load_cluster(ctx, ns_id, cluster_id)?;
    let csp_name = find_node_group(&cluster, node_group_id)?.csp_resource_name.clone();

    let response = {
        let _permit = ctx.throttle().acquire(&cluster.connection_name)?;
        ctx.driver().change_node_group_scaling(
            &cluster.connection_name,
            &cluster.csp_resource_name,
            &csp_name,
            desired,
            min,
            max,
        )?
    };

    for node_group in &mut cluster.node_group_list {
        if node_group.id == node_group_id {
            node_group.desired_node_size = response.desired_node_size;
            node_group.min_node_size = response.min_node_size;
            node_group.max_node_size = response.max_node_size;
            node_group.status = NodeGroupStatus::from_driver_status(&response.status);
        }
    }
    store_cluster(ctx, ns_id, &cluster)?;
    Ok(cluster)
}

pub fn upgrade_cluster(
    ctx: &Context,
    ns_id: &str,
    cluster_id: &str,
    version: &str,
) -> Result<Cluster, OrchestratorError> {
    if version.is_empty() {
        return Err(OrchestratorError::invalid_field("version", "must not be empty".to_string()));
    }

    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Cluster {
        ns_id: ns_id.to_string(),
        cluster_id: cluster_id.to_string(),
    })?;

    let mut cluster = load_cluster(ctx, ns_id, cluster_id)?;

    let response = {
        let _permit = ctx.throttle().acquire(&cluster.connection_name)?;
        ctx.driver()
            .upgrade_cluster(&cluster.connection_name, &cluster.csp_resource_name, version)?
    };

    cluster.version = response.version.clone();
    cluster.status = ClusterStatus::from_driver_status(&response.status);
    store_cluster(ctx, ns_id, &cluster)?;

    info!("cluster `{cluster_id}` upgraded to version {version}");
    Ok(cluster)
}

pub fn delete_cluster(ctx: &Context, ns_id: &str, cluster_id: &str, force: bool) -> Result<(), OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Cluster {
        ns_id: ns_id.to_string(),
        cluster_id: cluster_id.to_string(),
    })?;

    let cluster = load_cluster(ctx, ns_id, cluster_id)?;

    if !cluster.csp_resource_name.is_empty() {
        let _permit = ctx.throttle().acquire(&cluster.connection_name)?;
        match ctx
            .driver()
            .delete_cluster(&cluster.connection_name, &cluster.csp_resource_name, force)
        {
            Ok(_) => {}
            Err(crate::driver::errors::DriverError::NotFound { .. }) => {}
            Err(e) => return Err(e.into()),
        }
    }

    for (kind, resource_id) in cluster_association_refs(&cluster) {
        match update_associated_object_list(
            ctx,
            ns_id,
            kind,
            &resource_id,
            AssociationAction::Remove,
            &format!("cluster/{}", cluster.id),
        ) {
            Ok(_) | Err(OrchestratorError::ResourceNotFound { .. }) => {}
            Err(e) => return Err(e),
        }
    }

    ctx.kv().delete(&keys::cluster_key(ns_id, cluster_id))?;
    label::remove(ctx.kv(), LABEL_KIND, &cluster.uuid)?;

    info!("cluster `{cluster_id}` deleted from namespace `{ns_id}`");
    Ok(())
}
