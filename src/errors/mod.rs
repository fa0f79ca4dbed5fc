use crate::driver::errors::DriverError;
use crate::kv_store::KvError;
use crate::resource::ResourceKind;
use thiserror::Error;

/// OrchestratorError: every failure surfaced to API clients of the engine.
///
/// Fan-out operations never abort sibling tasks on a per-entity failure; the
/// aggregate result enumerates per-child outcomes instead.
#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("Invalid value for `{field}`: {message}")]
    Validation { field: String, message: String },

    #[error("Namespace `{ns_id}` was not found")]
    NamespaceNotFound { ns_id: String },

    #[error("{kind} `{resource_id}` was not found in namespace `{ns_id}`")]
    ResourceNotFound {
        ns_id: String,
        kind: ResourceKind,
        resource_id: String,
    },

    #[error("MCIS `{mcis_id}` was not found in namespace `{ns_id}`")]
    McisNotFound { ns_id: String, mcis_id: String },

    #[error("VM `{vm_id}` was not found in MCIS `{mcis_id}` of namespace `{ns_id}`")]
    VmNotFound {
        ns_id: String,
        mcis_id: String,
        vm_id: String,
    },

    #[error("Cluster `{cluster_id}` was not found in namespace `{ns_id}`")]
    ClusterNotFound { ns_id: String, cluster_id: String },

    #[error("Config `{key}` was not found")]
    ConfigNotFound { key: String },

    #[error("`{id}` already exists: {message}")]
    AlreadyExists { id: String, message: String },

    #[error("Conflict on `{id}`: {message}")]
    Conflict { id: String, message: String },

    #[error("`{id}` is busy: {message}")]
    Busy { id: String, message: String },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl OrchestratorError {
    /// Creates a `Validation` error for a named input field.
    pub fn invalid_field(field: &str, message: String) -> Self {
        OrchestratorError::Validation {
            field: field.to_string(),
            message,
        }
    }

    pub fn internal(message: String) -> Self {
        OrchestratorError::Internal { message }
    }

    /// True when the failure came from the driver reporting an absent CSP resource.
    pub fn is_driver_not_found(&self) -> bool {
        matches!(self, OrchestratorError::Driver(DriverError::NotFound { .. }))
    }
}

impl From<KvError> for OrchestratorError {
    fn from(err: KvError) -> Self {
        OrchestratorError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Internal {
            message: format!("JSON codec failure: {err}"),
        }
    }
}
