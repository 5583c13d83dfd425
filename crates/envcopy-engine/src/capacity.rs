//! Pool capacity admission for copy batches.
//!
//! # Design
//! - Measurements are a point-in-time snapshot; concurrent pool activity is
//!   not locked out.
//! - Objects that cannot be measured yet count as zero bytes.

use envcopy_core::{
    CapacityInputs, CapacityReport, CapacityVerdict, CopyTask, PoolInspector,
};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{EngineError, EngineResult};

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Capacity projection for one batch against a named pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityAssessment {
    /// Pool name.
    pub pool: String,
    /// Projection.
    pub report: CapacityReport,
}

impl CapacityAssessment {
    /// One-line summary for stage details.
    #[must_use]
    pub fn summary(&self) -> String {
        #[allow(clippy::cast_precision_loss)]
        let gib = |bytes: i64| bytes as f64 / GIB;
        let report = &self.report;
        format!(
            "pool {}: usage {:.1} GiB, incoming {:.1} GiB, reclaimed {:.1} GiB, projected free {:.1} GiB (threshold {:.1} GiB)",
            self.pool,
            gib(i64::try_from(report.current_usage_bytes).unwrap_or(i64::MAX)),
            gib(i64::try_from(report.source_batch_bytes).unwrap_or(i64::MAX)),
            gib(i64::try_from(report.destination_batch_bytes_to_free).unwrap_or(i64::MAX)),
            gib(report.projected_free_bytes),
            gib(i64::try_from(report.safety_threshold_bytes).unwrap_or(i64::MAX)),
        )
    }

    fn denial(&self) -> EngineError {
        EngineError::Capacity {
            pool: self.pool.clone(),
            verdict: self.report.verdict(),
            projected_free_bytes: self.report.projected_free_bytes,
            threshold_bytes: self.report.safety_threshold_bytes,
        }
    }
}

/// Decision for a batch.
#[derive(Debug)]
pub enum Admission {
    /// The batch may proceed.
    Admitted,
    /// The batch may proceed in a dry run; the message is surfaced as a warning.
    Warned(String),
    /// The batch must not run.
    Denied(EngineError),
}

/// Evaluates batches against the safety margin.
#[derive(Debug, Clone, Copy)]
pub struct CapacityController {
    safety_margin_percent: u8,
}

impl CapacityController {
    /// Controller enforcing `safety_margin_percent` of free pool space.
    #[must_use]
    pub const fn new(safety_margin_percent: u8) -> Self {
        Self {
            safety_margin_percent,
        }
    }

    /// Measure a batch. Returns `None` when destination objects are not pooled.
    ///
    /// # Errors
    ///
    /// Returns an error when the pool limits or member sizes cannot be read.
    pub async fn assess(
        &self,
        pool: &dyn PoolInspector,
        tasks: &[CopyTask],
    ) -> EngineResult<Option<CapacityAssessment>> {
        let capacity = pool.capacity().await.map_err(|source| pool_error("read pool limits", source))?;
        let Some(capacity) = capacity else {
            debug!("destination is not pooled; capacity check skipped");
            return Ok(None);
        };

        let current_usage_bytes = pool
            .member_sizes()
            .await
            .map_err(|source| pool_error("list pool members", source))?
            .into_iter()
            .fold(0u64, u64::saturating_add);

        let source_batch_bytes = tasks
            .iter()
            .map(|task| task.source.size_bytes)
            .fold(0u64, u64::saturating_add);

        let mut destination_batch_bytes_to_free = 0u64;
        for task in tasks {
            let size = pool
                .object_size(&task.destination_name)
                .await
                .map_err(|source| pool_error("measure destination object", source))?
                .unwrap_or(0);
            destination_batch_bytes_to_free = destination_batch_bytes_to_free.saturating_add(size);
        }

        let report = CapacityReport::evaluate(
            CapacityInputs {
                pool_max_bytes: capacity.max_bytes,
                current_usage_bytes,
                source_batch_bytes,
                destination_batch_bytes_to_free,
            },
            self.safety_margin_percent,
        );
        let assessment = CapacityAssessment {
            pool: capacity.name,
            report,
        };
        info!(
            pool = %assessment.pool,
            verdict = %report.verdict(),
            projected_free_bytes = report.projected_free_bytes,
            threshold_bytes = report.safety_threshold_bytes,
            net_change_bytes = report.net_change_bytes(),
            "capacity assessed"
        );
        Ok(Some(assessment))
    }

    /// Apply the mode-dependent admission rule.
    ///
    /// Execute mode denies both overrun and margin violations. A dry run only
    /// warns on margin violations and denies overruns so they are recorded as
    /// failures.
    #[must_use]
    pub fn admit(&self, assessment: &CapacityAssessment, dry_run: bool) -> Admission {
        match assessment.report.verdict() {
            CapacityVerdict::Admitted => Admission::Admitted,
            CapacityVerdict::BelowSafetyMargin if dry_run => {
                let message = format!(
                    "capacity below {}% safety margin: {}",
                    self.safety_margin_percent,
                    assessment.summary()
                );
                warn!(pool = %assessment.pool, "{message}");
                Admission::Warned(message)
            }
            CapacityVerdict::BelowSafetyMargin | CapacityVerdict::Exhausted => {
                Admission::Denied(assessment.denial())
            }
        }
    }
}

fn pool_error(operation: &'static str, source: anyhow::Error) -> EngineError {
    EngineError::Collaborator {
        stage: envcopy_core::StageKind::CopyDatabases,
        operation,
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use envcopy_core::{PoolCapacity, ResourceDescriptor};
    use std::collections::HashMap;

    const GB: u64 = 1024 * 1024 * 1024;

    struct StaticPool {
        max: Option<u64>,
        members: Vec<u64>,
        destinations: HashMap<String, u64>,
    }

    #[async_trait]
    impl PoolInspector for StaticPool {
        async fn capacity(&self) -> anyhow::Result<Option<PoolCapacity>> {
            Ok(self.max.map(|max_bytes| PoolCapacity {
                name: "pool-qa2".into(),
                max_bytes,
            }))
        }

        async fn member_sizes(&self) -> anyhow::Result<Vec<u64>> {
            Ok(self.members.clone())
        }

        async fn object_size(&self, name: &str) -> anyhow::Result<Option<u64>> {
            Ok(self.destinations.get(name).copied())
        }
    }

    fn task(source_gb: u64, destination: &str) -> CopyTask {
        CopyTask::new(
            ResourceDescriptor::new(format!("src-{destination}")).with_size(source_gb * GB),
            destination,
        )
    }

    #[tokio::test]
    async fn margin_violation_warns_in_dry_run_and_denies_in_execute() {
        let pool = StaticPool {
            max: Some(100 * GB),
            members: vec![60 * GB, 25 * GB],
            destinations: HashMap::from([("db-a".to_string(), 5 * GB)]),
        };
        let tasks = vec![task(12, "db-a"), task(8, "db-b")];
        let controller = CapacityController::new(10);

        let assessment = controller.assess(&pool, &tasks).await.unwrap().unwrap();
        assert_eq!(assessment.report.current_usage_bytes, 85 * GB);
        assert_eq!(assessment.report.source_batch_bytes, 20 * GB);
        assert_eq!(assessment.report.destination_batch_bytes_to_free, 5 * GB);
        assert_eq!(assessment.report.projected_free_bytes, 0);

        assert!(matches!(controller.admit(&assessment, true), Admission::Warned(_)));
        assert!(matches!(
            controller.admit(&assessment, false),
            Admission::Denied(EngineError::Capacity {
                verdict: CapacityVerdict::BelowSafetyMargin,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn overrun_is_denied_in_both_modes() {
        let pool = StaticPool {
            max: Some(100 * GB),
            members: vec![95 * GB],
            destinations: HashMap::new(),
        };
        let controller = CapacityController::new(10);
        let assessment = controller
            .assess(&pool, &[task(10, "db-a")])
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(controller.admit(&assessment, true), Admission::Denied(_)));
        assert!(matches!(controller.admit(&assessment, false), Admission::Denied(_)));
    }

    #[tokio::test]
    async fn unpooled_destination_skips_check() {
        let pool = StaticPool {
            max: None,
            members: Vec::new(),
            destinations: HashMap::new(),
        };
        let controller = CapacityController::new(10);
        assert!(controller.assess(&pool, &[task(1, "db")]).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn healthy_pool_is_admitted() {
        let pool = StaticPool {
            max: Some(100 * GB),
            members: vec![20 * GB],
            destinations: HashMap::new(),
        };
        let controller = CapacityController::new(10);
        let assessment = controller
            .assess(&pool, &[task(10, "db")])
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(controller.admit(&assessment, false), Admission::Admitted));
        assert!(assessment.summary().starts_with("pool pool-qa2: usage 20.0 GiB"));
    }
}
