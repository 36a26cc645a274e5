//! Dispatcher configuration structures.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::core::task::normalize_arch;

/// Environment variable holding the path of the JSON configuration file.
pub const CONFIG_ENV_VAR: &str = "RPM_DISPATCH_CONFIG";

/// Worker launcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LauncherConfig {
    /// Worker entrypoint executable.
    #[serde(default = "default_entrypoint")]
    pub entrypoint: PathBuf,
    /// Directory workers report their pid and result into.
    pub status_dir: PathBuf,
    /// Seconds a launched worker may take to report its pid.
    #[serde(default = "default_start_grace_secs")]
    pub start_grace_secs: u64,
}

/// Where pending tasks come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum IntakeConfig {
    /// Poll an HTTP endpoint returning a JSON array of records.
    Http {
        /// Endpoint URL.
        url: String,
    },
    /// Re-read a JSON array file on every pass.
    File {
        /// File path.
        path: PathBuf,
    },
    /// Empty in-memory intake, for development.
    InMemory,
}

/// Root dispatcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Seconds between scheduling passes.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    /// Cap on workers across every task; defaults to the CPU count.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Per-architecture caps keyed by architecture name. A cap of 0 stops
    /// admissions for that architecture.
    #[serde(default)]
    pub arch_limits: HashMap<String, usize>,
    /// Cap on workers per sandbox, unlimited when absent.
    #[serde(default)]
    pub sandbox_limit: Option<usize>,
    /// Cap on workers per project owner, unlimited when absent.
    #[serde(default)]
    pub owner_limit: Option<usize>,
    /// Launcher settings.
    pub launcher: LauncherConfig,
    /// Intake settings.
    pub intake: IntakeConfig,
}

fn default_entrypoint() -> PathBuf {
    PathBuf::from("copr-backend-process-build")
}

const fn default_start_grace_secs() -> u64 {
    60
}

const fn default_poll_interval_secs() -> u64 {
    5
}

fn default_max_workers() -> usize {
    num_cpus::get()
}

impl LauncherConfig {
    /// Validate launcher settings.
    pub fn validate(&self) -> Result<(), String> {
        if self.entrypoint.as_os_str().is_empty() {
            return Err("entrypoint must not be empty".into());
        }
        if self.status_dir.as_os_str().is_empty() {
            return Err("status_dir must not be empty".into());
        }
        Ok(())
    }
}

impl IntakeConfig {
    /// Validate intake settings.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::Http { url } if !(url.starts_with("http://") || url.starts_with("https://")) => {
                Err(format!("intake url `{url}` must be http(s)"))
            }
            Self::File { path } if path.as_os_str().is_empty() => {
                Err("intake path must not be empty".into())
            }
            _ => Ok(()),
        }
    }
}

impl DispatchConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be greater than 0".into());
        }
        if self.max_workers == 0 {
            return Err("max_workers must be greater than 0".into());
        }
        let mut seen: HashMap<&str, &str> = HashMap::new();
        for arch in self.arch_limits.keys() {
            if arch.is_empty() {
                return Err("arch_limits keys must not be empty".into());
            }
            if let Some(other) = seen.insert(normalize_arch(arch), arch) {
                return Err(format!("arch limits `{other}` and `{arch}` name the same architecture"));
            }
        }
        if self.sandbox_limit == Some(0) {
            return Err("sandbox_limit must be greater than 0".into());
        }
        if self.owner_limit == Some(0) {
            return Err("owner_limit must be greater than 0".into());
        }
        self.launcher
            .validate()
            .map_err(|e| format!("launcher invalid: {e}"))?;
        self.intake
            .validate()
            .map_err(|e| format!("intake invalid: {e}"))?;
        Ok(())
    }

    /// Parse dispatcher configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load the configuration file named by [`CONFIG_ENV_VAR`], after
    /// applying a `.env` file when one is present.
    pub fn from_env() -> Result<Self, String> {
        // A missing .env is fine; the variable may come from the environment.
        let _ = dotenvy::dotenv();
        let path = std::env::var(CONFIG_ENV_VAR).map_err(|_| format!("{CONFIG_ENV_VAR} is not set"))?;
        let raw = std::fs::read_to_string(&path).map_err(|e| format!("read {path}: {e}"))?;
        Self::from_json_str(&raw)
    }
}
