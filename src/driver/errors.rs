use crate::driver::TimeoutClass;
use thiserror::Error;

/// Typed failures surfaced by the driver client. Non-2xx driver responses
/// and transport failures are translated here; the raw driver message is
/// always carried along.
#[derive(Clone, Error, Debug, PartialEq, Eq)]
pub enum DriverError {
    #[error("Driver rejected the request for `{resource_name}`: {raw_error_message}")]
    BadRequest {
        resource_name: String,
        raw_error_message: String,
    },
    #[error("Driver does not know `{resource_name}`: {raw_error_message}")]
    NotFound {
        resource_name: String,
        raw_error_message: String,
    },
    #[error("Driver reported a conflict on `{resource_name}`: {raw_error_message}")]
    Conflict {
        resource_name: String,
        raw_error_message: String,
    },
    #[error("Driver is unavailable: {raw_error_message}")]
    Unavailable { raw_error_message: String },
    #[error("Driver call exceeded its `{timeout_class}` deadline: {raw_error_message}")]
    Timeout {
        timeout_class: TimeoutClass,
        raw_error_message: String,
    },
    #[error("Driver returned an unexpected payload: {raw_error_message}")]
    Decode { raw_error_message: String },
    #[error("Driver returned HTTP {status}: {raw_error_message}")]
    Other { status: u16, raw_error_message: String },
}

impl DriverError {
    /// True for failures that an idempotent request may retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DriverError::Unavailable { .. } | DriverError::Timeout { .. })
    }
}
