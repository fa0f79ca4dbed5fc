//! Resource registry: generic CRUD plumbing over every MCIR kind plus the
//! association bookkeeping that blocks premature deletion.

pub mod data_disk;
pub mod image;
pub mod security_group;
pub mod ssh_key;
pub mod vm_spec;
pub mod vnet;

use crate::context::Context;
use crate::errors::OrchestratorError;
use crate::keys;
use crate::label;
use crate::locks::LockKey;
use crate::namespace;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;
use strum_macros::{Display, EnumIter, EnumString};

/// The tagged registry of MCIR kinds. The string forms appear in KV paths
/// and label keys, so they are part of the persisted contract.
#[derive(
    Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq, Hash, Display, EnumString, EnumIter,
)]
pub enum ResourceKind {
    #[strum(serialize = "vNet")]
    #[serde(rename = "vNet")]
    VNet,
    #[strum(serialize = "subnet")]
    #[serde(rename = "subnet")]
    Subnet,
    #[strum(serialize = "securityGroup")]
    #[serde(rename = "securityGroup")]
    SecurityGroup,
    #[strum(serialize = "sshKey")]
    #[serde(rename = "sshKey")]
    SshKey,
    #[strum(serialize = "image")]
    #[serde(rename = "image")]
    Image,
    #[strum(serialize = "spec")]
    #[serde(rename = "spec")]
    Spec,
    #[strum(serialize = "dataDisk")]
    #[serde(rename = "dataDisk")]
    DataDisk,
}

/// One persisted MCIR variant. The generic registry plumbing is written once
/// over this seam.
pub trait McirEntity: Serialize + DeserializeOwned {
    const KIND: ResourceKind;

    fn id(&self) -> &str;
    fn uuid(&self) -> &str;
    fn associated_objects(&self) -> &[String];
}

macro_rules! impl_mcir_entity {
    ($ty:ty, $kind:expr) => {
        impl McirEntity for $ty {
            const KIND: ResourceKind = $kind;

            fn id(&self) -> &str {
                &self.id
            }

            fn uuid(&self) -> &str {
                &self.uuid
            }

            fn associated_objects(&self) -> &[String] {
                &self.associated_object_list
            }
        }
    };
}

impl_mcir_entity!(crate::models::resource::VNet, ResourceKind::VNet);
impl_mcir_entity!(crate::models::resource::Subnet, ResourceKind::Subnet);
impl_mcir_entity!(crate::models::resource::SecurityGroup, ResourceKind::SecurityGroup);
impl_mcir_entity!(crate::models::resource::SshKey, ResourceKind::SshKey);
impl_mcir_entity!(crate::models::resource::Image, ResourceKind::Image);
impl_mcir_entity!(crate::models::resource::VmSpec, ResourceKind::Spec);
impl_mcir_entity!(crate::models::resource::DataDisk, ResourceKind::DataDisk);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AssociationAction {
    Add,
    Remove,
}

impl FromStr for AssociationAction {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "add" => Ok(AssociationAction::Add),
            "remove" => Ok(AssociationAction::Remove),
            _ => Err(()),
        }
    }
}

pub(crate) fn system_labels(ns_id: &str, kind: ResourceKind) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("nsId".to_string(), ns_id.to_string()),
        ("kind".to_string(), kind.to_string()),
    ])
}

pub(crate) fn ensure_ns(ctx: &Context, ns_id: &str) -> Result<(), OrchestratorError> {
    if !namespace::check_ns(ctx, ns_id)? {
        return Err(OrchestratorError::NamespaceNotFound {
            ns_id: ns_id.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn ensure_not_exists(
    ctx: &Context,
    ns_id: &str,
    kind: ResourceKind,
    resource_id: &str,
) -> Result<(), OrchestratorError> {
    if exists(ctx, ns_id, kind, resource_id)? {
        return Err(OrchestratorError::AlreadyExists {
            id: resource_id.to_string(),
            message: format!("{kind} already exists in namespace `{ns_id}`"),
        });
    }
    Ok(())
}

pub fn exists(ctx: &Context, ns_id: &str, kind: ResourceKind, resource_id: &str) -> Result<bool, OrchestratorError> {
    Ok(ctx.kv().get(&keys::resource_key(ns_id, kind, resource_id))?.is_some())
}

/// `CheckResource`: existence probe once the namespace itself is known.
pub fn check_resource(
    ctx: &Context,
    ns_id: &str,
    kind: ResourceKind,
    resource_id: &str,
) -> Result<bool, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    exists(ctx, ns_id, kind, resource_id)
}

/// Persists an entity and writes its label-index entry.
pub(crate) fn store<T: McirEntity>(ctx: &Context, ns_id: &str, entity: &T) -> Result<(), OrchestratorError> {
    let key = keys::resource_key(ns_id, T::KIND, entity.id());
    ctx.kv().put(&key, &serde_json::to_string(entity)?)?;
    label::upsert(
        ctx.kv(),
        &T::KIND.to_string(),
        entity.uuid(),
        &key,
        BTreeMap::new(),
        system_labels(ns_id, T::KIND),
    )?;
    Ok(())
}

/// Loads a typed entity, re-asserting its label entry on the way out.
pub fn load<T: McirEntity>(ctx: &Context, ns_id: &str, resource_id: &str) -> Result<T, OrchestratorError> {
    let key = keys::resource_key(ns_id, T::KIND, resource_id);
    let entry = ctx.kv().get(&key)?.ok_or_else(|| OrchestratorError::ResourceNotFound {
        ns_id: ns_id.to_string(),
        kind: T::KIND,
        resource_id: resource_id.to_string(),
    })?;

    let entity: T = serde_json::from_str(&entry.value)?;
    label::assert_entry(
        ctx.kv(),
        &T::KIND.to_string(),
        entity.uuid(),
        &key,
        BTreeMap::new(),
        system_labels(ns_id, T::KIND),
    )?;
    Ok(entity)
}

pub fn list<T: McirEntity>(ctx: &Context, ns_id: &str) -> Result<Vec<T>, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let entries = ctx.kv().get_list(&keys::resource_kind_prefix(ns_id, T::KIND), false)?;
    let mut entities = Vec::with_capacity(entries.len());
    for entry in entries {
        entities.push(serde_json::from_str(&entry.value)?);
    }
    Ok(entities)
}

pub fn list_ids(ctx: &Context, ns_id: &str, kind: ResourceKind) -> Result<Vec<String>, OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let prefix = keys::resource_kind_prefix(ns_id, kind);
    let entries = ctx.kv().get_list(&prefix, true)?;
    Ok(crate::kv_store::get_child_list(&entries, &prefix))
}

/// Edits the back-reference list of `(kind, id)` on the raw JSON document,
/// so one implementation serves every kind. Entries are deduplicated on add
/// and returns the resulting list.
pub fn update_associated_object_list(
    ctx: &Context,
    ns_id: &str,
    kind: ResourceKind,
    resource_id: &str,
    action: AssociationAction,
    associate: &str,
) -> Result<Vec<String>, OrchestratorError> {
    let key = keys::resource_key(ns_id, kind, resource_id);
    let entry = ctx.kv().get(&key)?.ok_or_else(|| OrchestratorError::ResourceNotFound {
        ns_id: ns_id.to_string(),
        kind,
        resource_id: resource_id.to_string(),
    })?;

    let mut document: Value = serde_json::from_str(&entry.value)?;
    let list = document
        .get_mut("associatedObjectList")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| OrchestratorError::internal(format!("`{key}` has no associatedObjectList")))?;

    match action {
        AssociationAction::Add => {
            if !list.iter().any(|v| v.as_str() == Some(associate)) {
                list.push(Value::String(associate.to_string()));
            }
        }
        AssociationAction::Remove => {
            list.retain(|v| v.as_str() != Some(associate));
        }
    }

    let result: Vec<String> = list
        .iter()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    ctx.kv().put(&key, &serde_json::to_string(&document)?)?;
    Ok(result)
}

/// Raw-document view used by the generic delete path.
fn load_document(ctx: &Context, key: &str) -> Result<Option<Value>, OrchestratorError> {
    match ctx.kv().get(key)? {
        Some(entry) => Ok(Some(serde_json::from_str(&entry.value)?)),
        None => Ok(None),
    }
}

fn document_str(document: &Value, field: &str) -> String {
    document.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

/// Deletes an MCIR. Refuses with `Conflict` while back-references exist,
/// sends the driver delete (honoring `force`), then removes the KV entry
/// and label index. vNet deletion cascades to its subnets.
pub fn delete_resource(
    ctx: &Context,
    ns_id: &str,
    kind: ResourceKind,
    resource_id: &str,
    force: bool,
) -> Result<(), OrchestratorError> {
    ensure_ns(ctx, ns_id)?;
    let _guard = ctx.locks().try_acquire(LockKey::Resource {
        ns_id: ns_id.to_string(),
        kind,
        resource_id: resource_id.to_string(),
    })?;

    let key = keys::resource_key(ns_id, kind, resource_id);
    let document = load_document(ctx, &key)?.ok_or_else(|| OrchestratorError::ResourceNotFound {
        ns_id: ns_id.to_string(),
        kind,
        resource_id: resource_id.to_string(),
    })?;

    let associated: Vec<String> = document
        .get("associatedObjectList")
        .and_then(Value::as_array)
        .map(|list| list.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    if !associated.is_empty() {
        return Err(OrchestratorError::Conflict {
            id: resource_id.to_string(),
            message: format!("resource is still referenced by {associated:?}"),
        });
    }

    let connection = document_str(&document, "connectionName");
    let csp_name = document_str(&document, "cspResourceName");

    match kind {
        ResourceKind::VNet => {
            if !csp_name.is_empty() {
                let _permit = ctx.throttle().acquire(&connection)?;
                ctx.driver().delete_vpc(&connection, &csp_name, force)?;
            }
            // subnets go down with their parent
            for subnet in
                list::<crate::models::resource::Subnet>(ctx, ns_id)?
                    .into_iter()
                    .filter(|s| s.v_net_id == resource_id)
            {
                ctx.kv().delete(&keys::resource_key(ns_id, ResourceKind::Subnet, &subnet.id))?;
                label::remove(ctx.kv(), &ResourceKind::Subnet.to_string(), &subnet.uuid)?;
            }
        }
        ResourceKind::Subnet => {
            let v_net_id = document_str(&document, "vNetId");
            let parent = load::<crate::models::resource::VNet>(ctx, ns_id, &v_net_id)?;
            if !csp_name.is_empty() {
                let _permit = ctx.throttle().acquire(&connection)?;
                ctx.driver()
                    .delete_subnet(&connection, &parent.csp_resource_name, &csp_name, force)?;
            }
            vnet::detach_subnet_from_parent(ctx, ns_id, &v_net_id, resource_id)?;
        }
        ResourceKind::SecurityGroup => {
            if !csp_name.is_empty() {
                let _permit = ctx.throttle().acquire(&connection)?;
                ctx.driver().delete_security_group(&connection, &csp_name, force)?;
            }
            let v_net_id = document_str(&document, "vNetId");
            if !v_net_id.is_empty() {
                let _ = update_associated_object_list(
                    ctx,
                    ns_id,
                    ResourceKind::VNet,
                    &v_net_id,
                    AssociationAction::Remove,
                    &format!("securityGroup/{resource_id}"),
                );
            }
        }
        ResourceKind::SshKey => {
            if !csp_name.is_empty() {
                let _permit = ctx.throttle().acquire(&connection)?;
                ctx.driver().delete_key_pair(&connection, &csp_name, force)?;
            }
        }
        ResourceKind::DataDisk => {
            if !csp_name.is_empty() {
                let _permit = ctx.throttle().acquire(&connection)?;
                ctx.driver().delete_disk(&connection, &csp_name, force)?;
            }
        }
        // catalog entries have nothing to tear down on the CSP
        ResourceKind::Image | ResourceKind::Spec => {}
    }

    ctx.kv().delete(&key)?;
    label::remove(ctx.kv(), &kind.to_string(), &document_str(&document, "uuid"))?;
    info!("{kind} `{resource_id}` deleted from namespace `{ns_id}`");
    Ok(())
}
