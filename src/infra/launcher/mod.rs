//! Worker launchers.

pub mod memory;
pub mod process;

pub use memory::{InMemoryLauncher, MEMORY_WORKER_PREFIX};
pub use process::{RpmBuildLauncher, WorkerReport, RPM_WORKER_PREFIX, SRPM_BUILDS_CHROOT};
