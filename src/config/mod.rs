//! Configuration models for the dispatcher, its launcher and intake.

pub mod dispatch;

pub use dispatch::{DispatchConfig, IntakeConfig, LauncherConfig, CONFIG_ENV_VAR};
