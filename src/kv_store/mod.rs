pub mod in_memory;

pub use in_memory::InMemoryKvStore;

use thiserror::Error;

#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum KvError {
    #[error("Invalid key `{key}`: {message}")]
    InvalidKey { key: String, message: String },
    #[error("Store backend failure: {raw_error_message}")]
    Backend { raw_error_message: String },
}

/// A stored key/value pair. Values are JSON documents.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

impl Entry {
    pub fn new(key: String, value: String) -> Self {
        Entry { key, value }
    }
}

/// Hierarchical, prefix-queryable key/value store.
///
/// Keys are `/`-separated paths. Writes are atomic per key; no multi-key
/// transaction is assumed, so callers must be idempotent and tolerate partial
/// updates. No ordering is promised across keys.
pub trait KvStore: Send + Sync {
    /// Writes `value` at `key`, overwriting any previous value.
    fn put(&self, key: &str, value: &str) -> Result<(), KvError>;

    /// Returns the entry at `key`, or `None` when absent.
    fn get(&self, key: &str) -> Result<Option<Entry>, KvError>;

    /// Returns entries under `prefix`. With `recursive` the whole subtree is
    /// returned, otherwise only keys exactly one level below `prefix`.
    fn get_list(&self, prefix: &str, recursive: bool) -> Result<Vec<Entry>, KvError>;

    /// Removes `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> Result<(), KvError>;
}

/// Filters `entries` down to the child names sitting exactly one level below
/// `prefix`. Deeper descendants and the prefix itself are skipped.
pub fn get_child_list(entries: &[Entry], prefix: &str) -> Vec<String> {
    let prefix = format!("{}/", prefix.trim_end_matches('/'));

    let mut children = Vec::new();
    for entry in entries {
        let Some(rest) = entry.key.strip_prefix(prefix.as_str()) else {
            continue;
        };
        if rest.is_empty() || rest.contains('/') {
            continue;
        }
        children.push(rest.to_string());
    }

    children
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_child_list_keeps_one_level_only() {
        // setup:
        let entries = vec![
            Entry::new("/ns/ns01".to_string(), "{}".to_string()),
            Entry::new("/ns/ns01/resources/vNet/vnet1".to_string(), "{}".to_string()),
            Entry::new("/ns/ns01/mcis/m1".to_string(), "{}".to_string()),
            Entry::new("/ns/ns01/mcis/m1/vm/vm1".to_string(), "{}".to_string()),
            Entry::new("/ns/ns02/mcis/m2".to_string(), "{}".to_string()),
        ];

        // execute:
        let children = get_child_list(&entries, "/ns/ns01/mcis");

        // verify:
        assert_eq!(vec!["m1".to_string()], children);
    }

    #[test]
    fn test_get_child_list_tolerates_trailing_slash() {
        // setup:
        let entries = vec![Entry::new("/config/SPIDER_REST_URL".to_string(), "{}".to_string())];

        // execute:
        let children = get_child_list(&entries, "/config/");

        // verify:
        assert_eq!(vec!["SPIDER_REST_URL".to_string()], children);
    }
}
