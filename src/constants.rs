pub const SDK_NAME: &str = "vwo-fme-core-rs";
pub const SDK_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const SEED_VALUE: u32 = 1;
pub const MAX_TRAFFIC_VALUE: u32 = 100;
pub const MAX_VARIATION_VALUE: u32 = 10000;

pub const MEG_STORAGE_PREFIX: &str = "_vwo_meta_meg_";

pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 10 * 60;
pub const DEFAULT_EVENTS_PER_REQUEST: u32 = 100;
pub const DEFAULT_REQUEST_TIME_INTERVAL_SECS: u64 = 600;
pub const DEFAULT_MAX_WORKERS: usize = 4;

pub const RETRY_INITIAL_BACKOFF_SECS: u64 = 2;
pub const RETRY_MAX_ATTEMPTS: u32 = 3;

/// UUID namespace seed: `uuid5("https://vwo.com")`, nested under the account
/// id and then the user id (see `context::generate_uuid`).
pub const UUID_NAMESPACE_URL: &str = "https://vwo.com";
