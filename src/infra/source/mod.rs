//! Intake sources for pending build tasks.

pub mod file;
#[cfg(feature = "http-intake")]
pub mod http;
pub mod memory;

pub use file::FileTaskSource;
#[cfg(feature = "http-intake")]
pub use http::HttpTaskSource;
pub use memory::InMemoryTaskSource;
