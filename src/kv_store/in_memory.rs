use super::{Entry, KvError, KvStore};
use std::collections::BTreeMap;
use std::sync::RwLock;

/// In-process store backed by an ordered map.
///
/// Used by tests and by embedders that do not plug an external store. The
/// ordered map makes prefix scans cheap and deterministic.
#[derive(Default)]
pub struct InMemoryKvStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryKvStore {
    pub fn new() -> Self {
        InMemoryKvStore {
            entries: RwLock::new(BTreeMap::new()),
        }
    }

    fn check_key(key: &str) -> Result<(), KvError> {
        if key.is_empty() || !key.starts_with('/') {
            return Err(KvError::InvalidKey {
                key: key.to_string(),
                message: "keys must be non-empty `/`-separated paths".to_string(),
            });
        }
        Ok(())
    }
}

impl KvStore for InMemoryKvStore {
    fn put(&self, key: &str, value: &str) -> Result<(), KvError> {
        Self::check_key(key)?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Entry>, KvError> {
        Self::check_key(key)?;
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        Ok(entries
            .get(key)
            .map(|value| Entry::new(key.to_string(), value.to_string())))
    }

    fn get_list(&self, prefix: &str, recursive: bool) -> Result<Vec<Entry>, KvError> {
        Self::check_key(prefix)?;
        let normalized = prefix.trim_end_matches('/');
        let subtree_prefix = format!("{normalized}/");

        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        let mut matches = Vec::new();
        for (key, value) in entries.range(subtree_prefix.clone()..) {
            if !key.starts_with(subtree_prefix.as_str()) {
                break;
            }
            if !recursive && key[subtree_prefix.len()..].contains('/') {
                continue;
            }
            matches.push(Entry::new(key.to_string(), value.to_string()));
        }

        Ok(matches)
    }

    fn delete(&self, key: &str) -> Result<(), KvError> {
        Self::check_key(key)?;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv_store::get_child_list;

    #[test]
    fn test_put_get_roundtrip() {
        // setup:
        let store = InMemoryKvStore::new();

        // execute:
        store.put("/ns/ns01", r#"{"id":"ns01"}"#).unwrap();

        // verify:
        let entry = store.get("/ns/ns01").unwrap().unwrap();
        assert_eq!("/ns/ns01", entry.key);
        assert_eq!(r#"{"id":"ns01"}"#, entry.value);
        assert_eq!(None, store.get("/ns/ns02").unwrap());
    }

    #[test]
    fn test_get_list_recursive_vs_one_level() {
        // setup:
        let store = InMemoryKvStore::new();
        store.put("/ns/ns01/mcis/m1", "{}").unwrap();
        store.put("/ns/ns01/mcis/m1/vm/vm1", "{}").unwrap();
        store.put("/ns/ns01/mcis/m1/vm/vm2", "{}").unwrap();
        store.put("/ns/ns01/mcis/m2", "{}").unwrap();

        // execute:
        let recursive = store.get_list("/ns/ns01/mcis", true).unwrap();
        let one_level = store.get_list("/ns/ns01/mcis", false).unwrap();

        // verify:
        assert_eq!(4, recursive.len());
        assert_eq!(2, one_level.len());
        assert_eq!(
            vec!["m1".to_string(), "m2".to_string()],
            get_child_list(&recursive, "/ns/ns01/mcis")
        );
    }

    #[test]
    fn test_delete_is_idempotent() {
        // setup:
        let store = InMemoryKvStore::new();
        store.put("/config/DB_URL", "{}").unwrap();

        // execute:
        store.delete("/config/DB_URL").unwrap();
        let second = store.delete("/config/DB_URL");

        // verify:
        assert!(second.is_ok());
        assert_eq!(None, store.get("/config/DB_URL").unwrap());
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        // setup:
        let store = InMemoryKvStore::new();

        // execute:
        let result = store.put("no-leading-slash", "{}");

        // verify:
        assert!(matches!(result, Err(KvError::InvalidKey { .. })));
    }
}
