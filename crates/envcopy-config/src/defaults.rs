//! Default tunables for refresh runs.
//!
//! # Design
//! - Keep every numeric default in one place so settings files and tests agree.

pub(crate) const ROOT_NAMESPACE: &str = envcopy_core::ROOT_NAMESPACE;
pub(crate) const COPY_CONCURRENCY: usize = 5;
pub(crate) const POLL_INTERVAL_SECS: u64 = 30;
pub(crate) const CREDENTIAL_REFRESH_MINUTES: u64 = 45;
pub(crate) const RETRY_MAX_ATTEMPTS: u32 = 3;
pub(crate) const RETRY_INITIAL_DELAY_SECS: u64 = 5;
pub(crate) const RETRY_MULTIPLIER: u32 = 2;
pub(crate) const SAFETY_MARGIN_PERCENT: u8 = 10;
pub(crate) const LARGE_OBJECT_THRESHOLD_GB: u64 = 50;
pub(crate) const LARGE_OBJECT_ALLOWANCE_MINUTES: u64 = 30;
pub(crate) const RESTORE_SUFFIX: &str = "-restored";
pub(crate) const RESTORE_LOOKBACK_MINUTES: i64 = 15;
pub(crate) const ACCESS_ROLE: &str = "Contributor";
pub(crate) const AZ_PATH: &str = "az";
pub(crate) const DEFAULT_MAX_WAIT_MINUTES: u64 = 180;
