//! Builders to construct the worker manager and intake from configuration.

use std::collections::BTreeMap;

use crate::config::{DispatchConfig, IntakeConfig};
use crate::core::{
    DispatchError, LimitSet, TaskSource, TracingAuditSink, WorkerLauncher, WorkerLimit,
    WorkerManager,
};
use crate::infra::source::{FileTaskSource, InMemoryTaskSource};
use crate::infra::RpmBuildLauncher;

/// Limits described by `cfg`: the global cap, one cap per configured
/// architecture (in name order), then the sandbox and owner caps when set.
#[must_use]
pub fn build_limits(cfg: &DispatchConfig) -> LimitSet {
    let mut limits = LimitSet::new();
    limits.add(WorkerLimit::global(cfg.max_workers));

    let arch_limits: BTreeMap<&str, usize> = cfg
        .arch_limits
        .iter()
        .map(|(arch, capacity)| (arch.as_str(), *capacity))
        .collect();
    for (arch, capacity) in arch_limits {
        limits.add(WorkerLimit::architecture(arch, capacity));
    }

    if let Some(capacity) = cfg.sandbox_limit {
        limits.add(WorkerLimit::per_sandbox(capacity));
    }
    if let Some(capacity) = cfg.owner_limit {
        limits.add(WorkerLimit::per_owner(capacity));
    }
    limits
}

/// Validate `cfg` and build a manager driving `launcher` under its limits.
///
/// Scheduling decisions are audited to `tracing`.
///
/// # Errors
///
/// [`DispatchError::Config`] when the configuration is invalid.
pub fn build_manager<L: WorkerLauncher>(
    cfg: &DispatchConfig,
    launcher: L,
) -> Result<WorkerManager<L>, DispatchError> {
    cfg.validate()
        .map_err(|e| DispatchError::Config(format!("config invalid: {e}")))?;
    Ok(WorkerManager::new(launcher, build_limits(cfg)).with_audit(Box::new(TracingAuditSink)))
}

/// Build the intake source selected by `cfg`.
///
/// # Errors
///
/// [`DispatchError::Config`] when the source cannot be built, including an
/// HTTP intake in a build without the `http-intake` feature.
pub fn build_source(cfg: &DispatchConfig) -> Result<Box<dyn TaskSource>, DispatchError> {
    match &cfg.intake {
        IntakeConfig::File { path } => Ok(Box::new(FileTaskSource::new(path))),
        IntakeConfig::InMemory => Ok(Box::new(InMemoryTaskSource::new())),
        #[cfg(feature = "http-intake")]
        IntakeConfig::Http { url } => Ok(Box::new(crate::infra::source::HttpTaskSource::new(
            url.clone(),
        )?)),
        #[cfg(not(feature = "http-intake"))]
        IntakeConfig::Http { .. } => Err(DispatchError::Config(
            "http intake requires the `http-intake` feature".into(),
        )),
    }
}

/// Register the workers left running by a previous dispatcher instance.
///
/// Returns the number of workers restored.
///
/// # Errors
///
/// [`DispatchError::Launch`] when the status directory cannot be read.
pub async fn restore_workers(
    manager: &WorkerManager<RpmBuildLauncher>,
) -> Result<usize, DispatchError> {
    let rediscovered = manager.launcher().rediscover().await?;
    Ok(manager.rebuild(rediscovered))
}
