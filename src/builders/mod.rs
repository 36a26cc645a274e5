//! Builders assembling scheduler components from configuration.

pub mod manager_builder;

pub use manager_builder::{build_limits, build_manager, build_source, restore_workers};
