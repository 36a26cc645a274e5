//! Infrastructure adapters: worker launchers and intake sources.

pub mod launcher;
pub mod source;

pub use launcher::{InMemoryLauncher, RpmBuildLauncher};
#[cfg(feature = "http-intake")]
pub use source::HttpTaskSource;
pub use source::{FileTaskSource, InMemoryTaskSource};
