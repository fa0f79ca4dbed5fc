//! Shared handle passed through every engine operation. The settings mirror
//! has a single writer (the config store) and many readers; nothing here is
//! ambient global state.

use crate::admission::ConnectionThrottle;
use crate::config::RuntimeSettings;
use crate::driver::monitoring::MonitoringService;
use crate::driver::Driver;
use crate::kv_store::KvStore;
use crate::locks::EntityLocks;
use std::sync::Arc;

#[derive(Clone)]
pub struct Context {
    kv: Arc<dyn KvStore>,
    driver: Arc<dyn Driver>,
    monitoring: Arc<dyn MonitoringService>,
    settings: Arc<RuntimeSettings>,
    locks: Arc<EntityLocks>,
    throttle: Arc<ConnectionThrottle>,
}

impl Context {
    pub fn new(
        kv: Arc<dyn KvStore>,
        driver: Arc<dyn Driver>,
        monitoring: Arc<dyn MonitoringService>,
        settings: Arc<RuntimeSettings>,
    ) -> Self {
        Context {
            kv,
            driver,
            monitoring,
            settings,
            locks: Arc::new(EntityLocks::new()),
            throttle: Arc::new(ConnectionThrottle::default()),
        }
    }

    pub fn kv(&self) -> &dyn KvStore {
        self.kv.as_ref()
    }

    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    pub fn monitoring(&self) -> &dyn MonitoringService {
        self.monitoring.as_ref()
    }

    pub fn settings(&self) -> &RuntimeSettings {
        self.settings.as_ref()
    }

    pub fn locks(&self) -> &Arc<EntityLocks> {
        &self.locks
    }

    pub fn throttle(&self) -> &Arc<ConnectionThrottle> {
        &self.throttle
    }
}
