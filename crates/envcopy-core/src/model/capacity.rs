//! Storage admission arithmetic for copy batches against a shared pool.

use std::fmt::{self, Display, Formatter};

use serde::{Deserialize, Serialize};

/// Measured inputs for one admission decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CapacityInputs {
    /// Pool storage limit.
    pub pool_max_bytes: u64,
    /// Sum of all current pool member sizes.
    pub current_usage_bytes: u64,
    /// Sum of source object sizes (incoming load).
    pub source_batch_bytes: u64,
    /// Sum of destination object sizes deleted before copying (reclaimed load).
    pub destination_batch_bytes_to_free: u64,
}

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityVerdict {
    /// Projected free space honours the safety margin.
    Admitted,
    /// Projected free space is non-negative but below the margin.
    BelowSafetyMargin,
    /// The batch would overrun the pool.
    Exhausted,
}

impl CapacityVerdict {
    /// Stable identifier for logs and reports.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admitted => "admitted",
            Self::BelowSafetyMargin => "below safety margin",
            Self::Exhausted => "exhausted",
        }
    }
}

impl Display for CapacityVerdict {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time capacity projection for a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapacityReport {
    /// Pool storage limit.
    pub pool_max_bytes: u64,
    /// Current pool usage.
    pub current_usage_bytes: u64,
    /// Incoming load.
    pub source_batch_bytes: u64,
    /// Reclaimed load.
    pub destination_batch_bytes_to_free: u64,
    /// `current + incoming - reclaimed`.
    pub projected_usage_bytes: i64,
    /// `max - projected_usage`.
    pub projected_free_bytes: i64,
    /// Minimum free space that must remain.
    pub safety_threshold_bytes: u64,
    /// `projected_free >= 0 && projected_free >= safety_threshold`.
    pub passed: bool,
}

impl CapacityReport {
    /// Project the pool state after the batch completes.
    #[must_use]
    pub fn evaluate(inputs: CapacityInputs, safety_margin_percent: u8) -> Self {
        let max = to_signed(inputs.pool_max_bytes);
        let projected_usage = to_signed(inputs.current_usage_bytes)
            .saturating_add(to_signed(inputs.source_batch_bytes))
            .saturating_sub(to_signed(inputs.destination_batch_bytes_to_free));
        let projected_free = max.saturating_sub(projected_usage);

        let threshold = u128::from(inputs.pool_max_bytes) * u128::from(safety_margin_percent) / 100;
        let safety_threshold_bytes = u64::try_from(threshold).unwrap_or(u64::MAX);

        let passed = projected_free >= 0 && projected_free >= to_signed(safety_threshold_bytes);

        Self {
            pool_max_bytes: inputs.pool_max_bytes,
            current_usage_bytes: inputs.current_usage_bytes,
            source_batch_bytes: inputs.source_batch_bytes,
            destination_batch_bytes_to_free: inputs.destination_batch_bytes_to_free,
            projected_usage_bytes: projected_usage,
            projected_free_bytes: projected_free,
            safety_threshold_bytes,
            passed,
        }
    }

    /// Net storage delta caused by the batch.
    #[must_use]
    pub const fn net_change_bytes(&self) -> i64 {
        to_signed(self.source_batch_bytes)
            .saturating_sub(to_signed(self.destination_batch_bytes_to_free))
    }

    /// Classify the projection.
    #[must_use]
    pub const fn verdict(&self) -> CapacityVerdict {
        if self.projected_free_bytes < 0 {
            CapacityVerdict::Exhausted
        } else if self.passed {
            CapacityVerdict::Admitted
        } else {
            CapacityVerdict::BelowSafetyMargin
        }
    }
}

const fn to_signed(value: u64) -> i64 {
    if value > i64::MAX as u64 {
        i64::MAX
    } else {
        value as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GB: u64 = 1024 * 1024 * 1024;

    #[test]
    fn margin_violation_denies_admission() {
        let report = CapacityReport::evaluate(
            CapacityInputs {
                pool_max_bytes: 100 * GB,
                current_usage_bytes: 85 * GB,
                source_batch_bytes: 20 * GB,
                destination_batch_bytes_to_free: 5 * GB,
            },
            10,
        );
        assert_eq!(report.projected_free_bytes, 0);
        assert_eq!(report.safety_threshold_bytes, 10 * GB);
        assert!(!report.passed);
        assert_eq!(report.verdict(), CapacityVerdict::BelowSafetyMargin);
    }

    #[test]
    fn overrun_is_exhausted() {
        let report = CapacityReport::evaluate(
            CapacityInputs {
                pool_max_bytes: 100 * GB,
                current_usage_bytes: 90 * GB,
                source_batch_bytes: 30 * GB,
                destination_batch_bytes_to_free: 0,
            },
            10,
        );
        assert_eq!(report.projected_free_bytes, -20 * (GB as i64));
        assert_eq!(report.verdict(), CapacityVerdict::Exhausted);
    }

    #[test]
    fn roomy_pool_is_admitted() {
        let report = CapacityReport::evaluate(
            CapacityInputs {
                pool_max_bytes: 100 * GB,
                current_usage_bytes: 40 * GB,
                source_batch_bytes: 10 * GB,
                destination_batch_bytes_to_free: 8 * GB,
            },
            10,
        );
        assert_eq!(report.net_change_bytes(), 2 * (GB as i64));
        assert_eq!(report.projected_usage_bytes, 42 * (GB as i64));
        assert!(report.passed);
        assert_eq!(report.verdict(), CapacityVerdict::Admitted);
    }

    #[test]
    fn projection_formula_holds_across_inputs() {
        for current in [0_u64, 7, 50, 99] {
            for incoming in [0_u64, 3, 40] {
                for reclaimed in [0_u64, 2, 30] {
                    let report = CapacityReport::evaluate(
                        CapacityInputs {
                            pool_max_bytes: 100,
                            current_usage_bytes: current,
                            source_batch_bytes: incoming,
                            destination_batch_bytes_to_free: reclaimed,
                        },
                        10,
                    );
                    let expected =
                        100 - (current as i64 + incoming as i64 - reclaimed as i64);
                    assert_eq!(report.projected_free_bytes, expected);
                    assert_eq!(
                        report.passed,
                        expected >= 0 && expected >= report.safety_threshold_bytes as i64
                    );
                }
            }
        }
    }
}
