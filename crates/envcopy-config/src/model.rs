//! Request and settings types.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use envcopy_core::{Namespace, StageKind};
use serde::{Deserialize, Serialize};

use crate::defaults;

/// Raw invocation parameters as collected from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RequestInput {
    /// Source environment token.
    pub source: String,
    /// Destination environment token.
    pub destination: String,
    /// Source namespace alias.
    pub source_namespace: String,
    /// Destination namespace alias.
    pub destination_namespace: String,
    /// Whether the run only reports what it would do.
    pub dry_run: bool,
    /// Upper bound on per-object copy polling.
    pub max_wait_minutes: Option<u64>,
    /// Point in time to restore from, in the given timezone.
    pub restore_date_time: Option<String>,
    /// Timezone of `restore_date_time`; the local zone when absent.
    pub timezone: Option<String>,
    /// Alias of the destination deployment endpoint.
    pub instance_alias: Option<String>,
    /// Previous alias to remove from the destination.
    pub instance_alias_to_remove: Option<String>,
}

/// Validated refresh request consumed by the workflow coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshRequest {
    /// Source environment token (lowercase).
    pub source_environment: String,
    /// Destination environment token (lowercase).
    pub destination_environment: String,
    /// Namespace copied from.
    pub source_namespace: Namespace,
    /// Namespace copied into; never the root namespace.
    pub destination_namespace: Namespace,
    /// Whether the run only reports what it would do.
    pub dry_run: bool,
    /// Upper bound on per-object copy polling.
    pub max_wait: Duration,
    /// Point in time the source is restored from.
    pub restore_point: DateTime<Utc>,
    /// Alias of the destination deployment endpoint.
    pub instance_alias: Option<String>,
    /// Previous alias to remove from the destination.
    pub instance_alias_to_remove: Option<String>,
}

/// Runtime tunables loaded from the settings file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RefreshSettings {
    /// Product token override; inferred from server names when absent.
    pub product: Option<String>,
    /// Alias reserved for the shared default deployment.
    pub root_namespace: String,
    /// Concurrent copies for parallel batches.
    pub copy_concurrency: usize,
    /// Seconds between readiness polls.
    pub poll_interval_secs: u64,
    /// Minutes between credential refreshes while polling.
    pub credential_refresh_minutes: u64,
    /// Backoff for copy initiation.
    pub retry: RetrySettings,
    /// Capacity admission tunables.
    pub capacity: CapacitySettings,
    /// Extra wait granted to large objects.
    pub large_object: LargeObjectSettings,
    /// Point-in-time restore tunables.
    pub restore: RestoreSettings,
    /// Temporary access grant tunables.
    pub access: AccessSettings,
    /// External commands for delegated stages.
    pub hooks: BTreeMap<StageKind, HookCommand>,
    /// Path of the cloud CLI executable.
    pub az_path: String,
}

impl Default for RefreshSettings {
    fn default() -> Self {
        Self {
            product: None,
            root_namespace: defaults::ROOT_NAMESPACE.to_string(),
            copy_concurrency: defaults::COPY_CONCURRENCY,
            poll_interval_secs: defaults::POLL_INTERVAL_SECS,
            credential_refresh_minutes: defaults::CREDENTIAL_REFRESH_MINUTES,
            retry: RetrySettings::default(),
            capacity: CapacitySettings::default(),
            large_object: LargeObjectSettings::default(),
            restore: RestoreSettings::default(),
            access: AccessSettings::default(),
            hooks: BTreeMap::new(),
            az_path: defaults::AZ_PATH.to_string(),
        }
    }
}

impl RefreshSettings {
    /// Poll interval as a duration.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Credential refresh cadence as a duration.
    #[must_use]
    pub const fn credential_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.credential_refresh_minutes * 60)
    }

    /// Hook configured for a stage, if any.
    #[must_use]
    pub fn hook_for(&self, stage: StageKind) -> Option<&HookCommand> {
        self.hooks.get(&stage)
    }
}

/// Retry tunables for copy initiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay_secs: u64,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            initial_delay_secs: defaults::RETRY_INITIAL_DELAY_SECS,
            multiplier: defaults::RETRY_MULTIPLIER,
        }
    }
}

/// Capacity admission tunables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CapacitySettings {
    /// Share of pool capacity that must stay free, in percent.
    pub safety_margin_percent: u8,
}

impl Default for CapacitySettings {
    fn default() -> Self {
        Self {
            safety_margin_percent: defaults::SAFETY_MARGIN_PERCENT,
        }
    }
}

/// Extra polling allowance for large objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LargeObjectSettings {
    /// Size at which an object counts as large, in gigabytes.
    pub threshold_gb: u64,
    /// Minutes added to the wait bound of large objects.
    pub allowance_minutes: u64,
}

impl Default for LargeObjectSettings {
    fn default() -> Self {
        Self {
            threshold_gb: defaults::LARGE_OBJECT_THRESHOLD_GB,
            allowance_minutes: defaults::LARGE_OBJECT_ALLOWANCE_MINUTES,
        }
    }
}

impl LargeObjectSettings {
    /// Threshold in bytes.
    #[must_use]
    pub const fn threshold_bytes(&self) -> u64 {
        self.threshold_gb.saturating_mul(1024 * 1024 * 1024)
    }

    /// Allowance as a duration.
    #[must_use]
    pub const fn allowance(&self) -> Duration {
        Duration::from_secs(self.allowance_minutes * 60)
    }
}

/// Point-in-time restore tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RestoreSettings {
    /// Suffix appended to scratch restore objects.
    pub suffix: String,
    /// Minutes before now used when no restore time is given.
    pub lookback_minutes: i64,
}

impl Default for RestoreSettings {
    fn default() -> Self {
        Self {
            suffix: defaults::RESTORE_SUFFIX.to_string(),
            lookback_minutes: defaults::RESTORE_LOOKBACK_MINUTES,
        }
    }
}

/// Temporary access grant tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AccessSettings {
    /// Role granted to the operator for the run.
    pub role: String,
}

impl Default for AccessSettings {
    fn default() -> Self {
        Self {
            role: defaults::ACCESS_ROLE.to_string(),
        }
    }
}

/// External command delegated a workflow stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HookCommand {
    /// Executable to run.
    pub program: String,
    /// Arguments passed verbatim.
    #[serde(default)]
    pub args: Vec<String>,
    /// Optional timeout for the command.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl HookCommand {
    /// Timeout as a duration.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Command line rendered for reports.
    #[must_use]
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

pub(crate) const fn default_max_wait_minutes() -> u64 {
    defaults::DEFAULT_MAX_WAIT_MINUTES
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_tunables() {
        let settings = RefreshSettings::default();
        assert_eq!(settings.root_namespace, "manufacturo");
        assert_eq!(settings.copy_concurrency, 5);
        assert_eq!(settings.poll_interval(), Duration::from_secs(30));
        assert_eq!(settings.credential_refresh_interval(), Duration::from_secs(45 * 60));
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.retry.initial_delay_secs, 5);
        assert_eq!(settings.capacity.safety_margin_percent, 10);
        assert_eq!(settings.large_object.threshold_bytes(), 50 * 1024 * 1024 * 1024);
        assert_eq!(settings.restore.suffix, "-restored");
        assert!(settings.hooks.is_empty());
    }

    #[test]
    fn hook_display_joins_arguments() {
        let hook = HookCommand {
            program: "kubectl".into(),
            args: vec!["scale".into(), "--replicas=0".into()],
            timeout_secs: Some(60),
        };
        assert_eq!(hook.display(), "kubectl scale --replicas=0");
        assert_eq!(hook.timeout(), Some(Duration::from_secs(60)));
    }
}
