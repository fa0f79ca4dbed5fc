use std::time::Duration;

/// Default base URL of the Spider driver REST endpoint.
pub const DEFAULT_SPIDER_REST_URL: &str = "http://localhost:1024/spider";

/// Default base URL of the monitoring (Dragonfly) REST endpoint.
pub const DEFAULT_DRAGONFLY_REST_URL: &str = "http://localhost:9090/dragonfly";

/// Default reconciliation period of the autocontrol sweeper.
pub const DEFAULT_AUTOCONTROL_DURATION_MS: u64 = 10_000;

/// Maximum reconciliation attempts per MCIS before the sweeper gives up.
pub const AUTOCONTROL_MAX_ATTEMPTS: u32 = 3;

/// Maximum concurrent driver calls per connection.
pub const MAX_IN_FLIGHT_PER_CONNECTION: usize = 10;

/// Maximum callers allowed to wait for a connection slot before `Busy`.
pub const MAX_WAITING_PER_CONNECTION: usize = 32;

/// Driver requests admitted per second and per connection.
pub const DRIVER_REQUESTS_PER_SECOND: u32 = 10;

/// Admission control retries before giving up with `Busy`.
pub const ADMISSION_CONTROL_MAX_TRIES: u32 = 20;

/// Pause between admission control tries.
pub const ADMISSION_CONTROL_RETRY_INTERVAL: Duration = Duration::from_millis(250);

/// Upper bound on tenant-facing resource id length.
pub const MAX_RESOURCE_ID_LENGTH: usize = 63;

pub const TIMEOUT_SHORT: Duration = Duration::from_secs(5);
pub const TIMEOUT_MEDIUM: Duration = Duration::from_secs(30);
pub const TIMEOUT_LONG: Duration = Duration::from_secs(5 * 60);
pub const TIMEOUT_VERY_LONG: Duration = Duration::from_secs(30 * 60);
