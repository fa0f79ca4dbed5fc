//! Secondary index `/label/{kind}/{uuid}` over every persisted entity.
//!
//! Writes are best-effort consistent with the primary write: when the
//! primary write lands but the label write is lost, the next primary read
//! re-asserts the entry.

use crate::errors::OrchestratorError;
use crate::keys;
use crate::kv_store::KvStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LabelEntry {
    pub primary_key: String,
    #[serde(default)]
    pub user_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub system_labels: BTreeMap<String, String>,
    pub created_at: DateTime<Utc>,
}

pub fn upsert(
    kv: &dyn KvStore,
    kind: &str,
    uuid: &str,
    primary_key: &str,
    user_labels: BTreeMap<String, String>,
    system_labels: BTreeMap<String, String>,
) -> Result<(), OrchestratorError> {
    let entry = LabelEntry {
        primary_key: primary_key.to_string(),
        user_labels,
        system_labels,
        created_at: Utc::now(),
    };
    kv.put(&keys::label_key(kind, uuid), &serde_json::to_string(&entry)?)?;
    Ok(())
}

pub fn get(kv: &dyn KvStore, kind: &str, uuid: &str) -> Result<Option<LabelEntry>, OrchestratorError> {
    match kv.get(&keys::label_key(kind, uuid))? {
        Some(entry) => Ok(Some(serde_json::from_str(&entry.value)?)),
        None => Ok(None),
    }
}

pub fn remove(kv: &dyn KvStore, kind: &str, uuid: &str) -> Result<(), OrchestratorError> {
    kv.delete(&keys::label_key(kind, uuid))?;
    Ok(())
}

/// Re-asserts the index entry for a primary that was just read. Only writes
/// when the entry is missing, so reads stay cheap in the common case.
pub fn assert_entry(
    kv: &dyn KvStore,
    kind: &str,
    uuid: &str,
    primary_key: &str,
    user_labels: BTreeMap<String, String>,
    system_labels: BTreeMap<String, String>,
) -> Result<(), OrchestratorError> {
    if get(kv, kind, uuid)?.is_some() {
        return Ok(());
    }

    debug!("re-asserting missing label entry for {kind}/{uuid}");
    upsert(kv, kind, uuid, primary_key, user_labels, system_labels)
}

/// Finds every indexed entity carrying `label_key=label_value` in its user
/// labels, without scanning the primary tree.
pub fn find_by_label(
    kv: &dyn KvStore,
    label_key: &str,
    label_value: &str,
) -> Result<Vec<LabelEntry>, OrchestratorError> {
    let entries = kv.get_list(keys::LABEL_PREFIX, true)?;

    let mut matches = Vec::new();
    for entry in entries {
        let parsed: LabelEntry = serde_json::from_str(&entry.value)?;
        if parsed.user_labels.get(label_key).map(String::as_str) == Some(label_value) {
            matches.push(parsed);
        }
    }
    Ok(matches)
}
