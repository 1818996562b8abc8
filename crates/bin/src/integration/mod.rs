//! Integration modules for wiring the library crates into the CLI.

pub(crate) mod cache_manager;
pub(crate) mod logging;
pub(crate) mod sources;
