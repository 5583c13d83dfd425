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

//! Provider-agnostic environment copy interfaces and DTOs.
//!
//! Layout: `model/` (topology, resources, copy tasks, capacity, workflow run),
//! `naming.rs` (destination name derivation), `tags.rs` (required tag rules),
//! `service/` (collaborator traits implemented by cloud adapters).

pub mod error;
pub mod model;
pub mod naming;
pub mod service;
pub mod tags;

pub use error::{CoreError, CoreResult};
pub use model::{
    CapacityInputs, CapacityReport, CapacityVerdict, CopyPhase, CopyStatus, CopyTask,
    InventoryRecord, ResourceDescriptor, ResourceKind, ResourceState, ServerTopology,
    StageKind, StageResult, StageStatus, StorageAccount, Tags, TopologyRole, WorkflowRun,
};
pub use naming::{NameDerivationRequest, Namespace, ROOT_NAMESPACE, derive_name, infer_service};
pub use service::{
    AccessControl, AccessScope, CloudPlatform, CopyBackend, DatabaseCatalog, FailoverRegistry,
    PoolCapacity, PoolInspector, ResourceInventory, StageContext, StageHooks,
};
