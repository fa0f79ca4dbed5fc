//! Namespace lifecycle. Namespaces are pure containers: no driver calls,
//! only KV and label-index writes.

use crate::context::Context;
use crate::errors::OrchestratorError;
use crate::io_models::NamespaceReq;
use crate::keys;
use crate::label;
use crate::models::Namespace;
use crate::utilities::{to_uuid_string, validate_id};
use std::collections::BTreeMap;
use uuid::Uuid;

const LABEL_KIND: &str = "ns";

pub fn create_ns(ctx: &Context, req: &NamespaceReq) -> Result<Namespace, OrchestratorError> {
    validate_id("name", &req.name)?;

    if check_ns(ctx, &req.name)? {
        return Err(OrchestratorError::AlreadyExists {
            id: req.name.clone(),
            message: "namespace already exists".to_string(),
        });
    }

    let ns = Namespace {
        id: req.name.clone(),
        uuid: to_uuid_string(&Uuid::new_v4()),
        description: req.description.clone(),
    };

    let key = keys::ns_key(&ns.id);
    ctx.kv().put(&key, &serde_json::to_string(&ns)?)?;
    label::upsert(ctx.kv(), LABEL_KIND, &ns.uuid, &key, BTreeMap::new(), BTreeMap::new())?;

    info!("namespace `{}` created", ns.id);
    Ok(ns)
}

pub fn get_ns(ctx: &Context, ns_id: &str) -> Result<Namespace, OrchestratorError> {
    let entry = ctx
        .kv()
        .get(&keys::ns_key(ns_id))?
        .ok_or_else(|| OrchestratorError::NamespaceNotFound {
            ns_id: ns_id.to_string(),
        })?;

    let ns: Namespace = serde_json::from_str(&entry.value)?;
    label::assert_entry(ctx.kv(), LABEL_KIND, &ns.uuid, &entry.key, BTreeMap::new(), BTreeMap::new())?;
    Ok(ns)
}

pub fn list_ns(ctx: &Context) -> Result<Vec<Namespace>, OrchestratorError> {
    let entries = ctx.kv().get_list("/ns", false)?;
    let mut namespaces = Vec::with_capacity(entries.len());
    for entry in entries {
        namespaces.push(serde_json::from_str(&entry.value)?);
    }
    Ok(namespaces)
}

pub fn check_ns(ctx: &Context, ns_id: &str) -> Result<bool, OrchestratorError> {
    Ok(ctx.kv().get(&keys::ns_key(ns_id))?.is_some())
}

/// Fails `Conflict` while any child key lives under `/ns/{id}/`.
pub fn del_ns(ctx: &Context, ns_id: &str) -> Result<(), OrchestratorError> {
    let ns = get_ns(ctx, ns_id)?;

    let children = ctx.kv().get_list(&keys::ns_prefix(ns_id), true)?;
    if !children.is_empty() {
        return Err(OrchestratorError::Conflict {
            id: ns_id.to_string(),
            message: format!("namespace still holds {} child entries", children.len()),
        });
    }

    ctx.kv().delete(&keys::ns_key(ns_id))?;
    label::remove(ctx.kv(), LABEL_KIND, &ns.uuid)?;
    info!("namespace `{ns_id}` deleted");
    Ok(())
}
