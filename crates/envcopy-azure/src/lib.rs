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

//! Azure collaborators driven through the `az` command line.
//!
//! Layout: `cli.rs` (process runner and JSON decoding), `inventory.rs`
//! (resource graph discovery), `sql.rs` (database catalog, copy, restore,
//! pool and failover adapters), `storage.rs` (container copies),
//! `access.rs` (role assignments), `hooks.rs` (external stage commands),
//! `platform.rs` (factory wiring everything together).

pub mod access;
pub mod cli;
pub mod error;
pub mod hooks;
pub mod inventory;
pub mod platform;
pub mod sql;
pub mod storage;

pub use access::AzAccess;
pub use cli::AzCli;
pub use error::{AzureError, AzureResult};
pub use hooks::CommandHooks;
pub use inventory::AzInventory;
pub use platform::AzurePlatform;
pub use sql::{AzCatalog, AzFailover, AzPool, CopyMode, SqlCopyBackend};
pub use storage::ContainerBackend;
