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

//! Invocation parameters and runtime settings for environment refreshes.
//!
//! Layout: `model.rs` (request and settings types), `validate.rs` (boundary
//! safety checks and time parsing), `loader.rs` (YAML settings file),
//! `defaults.rs` (tunable defaults).

mod defaults;
pub mod error;
pub mod loader;
pub mod model;
pub mod validate;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_settings, parse_settings};
pub use model::{
    AccessSettings, CapacitySettings, HookCommand, LargeObjectSettings, RefreshRequest,
    RefreshSettings, RequestInput, RestoreSettings, RetrySettings,
};
pub use validate::{
    TimeZoneSpec, parse_restore_point, parse_timezone, validate_request, validate_settings,
};
