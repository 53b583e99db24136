//! Default values for every optional setting.

pub(crate) const SERVER_ADDR: &str = "0.0.0.0:7200";
pub(crate) const ARIA2_URL: &str = "ws://localhost:6800/jsonrpc";
pub(crate) const STORAGE_ROOT: &str = "./objects";
pub(crate) const MAX_CONCURRENT: usize = 4;
pub(crate) const RETENTION_SECS: u64 = 3_600;
pub(crate) const PRUNE_INTERVAL_SECS: u64 = 60;
pub(crate) const CALLBACK_TIMEOUT_SECS: u64 = 10;
pub(crate) const LOG_LEVEL: &str = "info";
