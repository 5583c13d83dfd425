//! Core domain types shared across the workspace.

mod capacity;
mod resource;
mod run;
mod task;
mod topology;

pub use capacity::{CapacityInputs, CapacityReport, CapacityVerdict};
pub use resource::{ResourceDescriptor, ResourceState, Tags};
pub use run::{StageKind, StageResult, StageStatus, WorkflowRun};
pub use task::{CopyPhase, CopyStatus, CopyTask};
pub use topology::{
    InventoryRecord, MIN_NAME_SEGMENTS, NAME_DELIMITER, ResourceKind, ServerTopology,
    StorageAccount, TopologyRole,
};
