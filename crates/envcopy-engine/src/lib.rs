#![forbid(unsafe_code)]
#![warn(
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Orchestration engine for environment refreshes.
//!
//! Layout: `topology.rs` (inventory discovery), `capacity.rs` (pool
//! admission), `tags.rs` (post-copy tag reconciliation), `retry.rs`
//! (initiation backoff), `orchestrator.rs` (per-object copy state machine),
//! `plan.rs` (task planning from catalog listings), `workflow/` (stage
//! pipeline and run aggregation).

pub mod capacity;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod retry;
pub mod tags;
pub mod topology;
pub mod workflow;

pub use capacity::{Admission, CapacityAssessment, CapacityController};
pub use error::{EngineError, EngineResult};
pub use orchestrator::{
    BatchOptions, BatchOutcome, CopyOrchestrator, ExecutionMode, FailoverSummary,
    OrchestratorSettings,
};
pub use plan::{NamingContext, is_system_object, plan_container_tasks, plan_database_tasks};
pub use retry::{RetryExhausted, RetryPolicy, retry_with_backoff};
pub use tags::TagReconciler;
pub use topology::{EnvironmentTopology, TopologyResolver};
pub use workflow::WorkflowCoordinator;
