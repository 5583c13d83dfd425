//! Command handlers.

pub(crate) mod derive;
pub(crate) mod refresh;
