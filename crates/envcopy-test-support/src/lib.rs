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

//! Shared test helpers used across integration suites.
//! Layout: mocks.rs (in-memory cloud), fixtures.rs (standard environment and
//! requests), assert.rs (call-log assertions).

pub mod assert;
pub mod fixtures;
pub mod mocks;

pub use mocks::{Call, FakeCloud};
