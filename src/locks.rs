//! In-memory per-entity serialization. Operations on the same entity key
//! take a non-reentrant try-lock; a second in-flight action observes `Busy`.

use crate::errors::OrchestratorError;
use crate::resource::ResourceKind;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::sync::{Arc, Mutex};

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum LockKey {
    Resource {
        ns_id: String,
        kind: ResourceKind,
        resource_id: String,
    },
    Mcis {
        ns_id: String,
        mcis_id: String,
    },
    Vm {
        ns_id: String,
        mcis_id: String,
        vm_id: String,
    },
    Cluster {
        ns_id: String,
        cluster_id: String,
    },
}

impl Display for LockKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            LockKey::Resource {
                ns_id,
                kind,
                resource_id,
            } => write!(f, "{ns_id}/{kind}/{resource_id}"),
            LockKey::Mcis { ns_id, mcis_id } => write!(f, "{ns_id}/mcis/{mcis_id}"),
            LockKey::Vm { ns_id, mcis_id, vm_id } => write!(f, "{ns_id}/mcis/{mcis_id}/vm/{vm_id}"),
            LockKey::Cluster { ns_id, cluster_id } => write!(f, "{ns_id}/cluster/{cluster_id}"),
        }
    }
}

#[derive(Default)]
pub struct EntityLocks {
    held: Mutex<HashSet<LockKey>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        EntityLocks {
            held: Mutex::new(HashSet::new()),
        }
    }

    /// Non-blocking: either the key is free and the guard is returned, or
    /// the caller observes `Busy`.
    pub fn try_acquire(self: &Arc<Self>, key: LockKey) -> Result<EntityGuard, OrchestratorError> {
        let mut held = self.held.lock().unwrap_or_else(|e| e.into_inner());
        if !held.insert(key.clone()) {
            return Err(OrchestratorError::Busy {
                id: key.to_string(),
                message: "another action is in flight for this entity".to_string(),
            });
        }

        Ok(EntityGuard {
            locks: self.clone(),
            key,
        })
    }
}

pub struct EntityGuard {
    locks: Arc<EntityLocks>,
    key: LockKey,
}

impl Drop for EntityGuard {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().unwrap_or_else(|e| e.into_inner());
        held.remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_on_same_key_is_busy() {
        // setup:
        let locks = Arc::new(EntityLocks::new());
        let key = LockKey::Vm {
            ns_id: "ns01".to_string(),
            mcis_id: "m1".to_string(),
            vm_id: "vm1".to_string(),
        };

        // execute:
        let guard = locks.try_acquire(key.clone()).unwrap();
        let second = locks.try_acquire(key.clone());

        // verify:
        assert!(matches!(second, Err(OrchestratorError::Busy { .. })));
        drop(guard);
        assert!(locks.try_acquire(key).is_ok());
    }

    #[test]
    fn test_distinct_keys_do_not_contend() {
        // setup:
        let locks = Arc::new(EntityLocks::new());
        let vm1 = LockKey::Vm {
            ns_id: "ns01".to_string(),
            mcis_id: "m1".to_string(),
            vm_id: "vm1".to_string(),
        };
        let vm2 = LockKey::Vm {
            ns_id: "ns01".to_string(),
            mcis_id: "m1".to_string(),
            vm_id: "vm2".to_string(),
        };

        // execute & verify:
        let _g1 = locks.try_acquire(vm1).unwrap();
        assert!(locks.try_acquire(vm2).is_ok());
    }
}
