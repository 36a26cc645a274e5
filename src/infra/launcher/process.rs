//! Launcher running the RPM build worker as a daemonized OS process.
//!
//! The worker entrypoint is invoked as
//!
//! ```text
//! <entrypoint> --daemon --build-id <build_id> --chroot <srpm-builds|chroot> --worker-id <worker_id>
//! ```
//!
//! and is expected to fork into the background and exit. From then on the
//! worker talks back through files in the status directory:
//!
//! - `<worker_id>.task` is written by the launcher before the launch and lets
//!   a restarted scheduler rediscover its in-flight workers.
//! - `<worker_id>.pid` holds the pid of the detached build process.
//! - `<worker_id>.done` is a JSON report written when the build ends.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::LauncherConfig;
use crate::core::{
    BuildOutcome, BuildQueueTask, LaunchError, TaskRecord, Worker, WorkerId, WorkerLauncher,
    WorkerProbe,
};
use crate::util::clock::now_ms;

/// Worker id prefix of RPM build workers.
pub const RPM_WORKER_PREFIX: &str = "rpm_build_worker";

/// Chroot argument used for source builds.
pub const SRPM_BUILDS_CHROOT: &str = "srpm-builds";

const TASK_EXT: &str = "task";
const PID_EXT: &str = "pid";
const DONE_EXT: &str = "done";

/// Completion report written by the worker into `<worker_id>.done`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerReport {
    /// Build result.
    pub status: BuildOutcome,
}

/// Launcher for `copr-backend-process-build`-style worker daemons.
///
/// Dead workers are detected through `/proc` on Linux and `kill -0` on other
/// Unix systems. Elsewhere a worker that wrote its pid is only ever reaped
/// through its `.done` report.
#[derive(Debug, Clone)]
pub struct RpmBuildLauncher {
    entrypoint: PathBuf,
    status_dir: PathBuf,
    start_grace: Duration,
}

impl RpmBuildLauncher {
    /// Launcher running `entrypoint` and watching `status_dir`.
    pub fn new(entrypoint: impl Into<PathBuf>, status_dir: impl Into<PathBuf>) -> Self {
        Self {
            entrypoint: entrypoint.into(),
            status_dir: status_dir.into(),
            start_grace: Duration::from_secs(60),
        }
    }

    /// Launcher from configuration.
    #[must_use]
    pub fn from_config(cfg: &LauncherConfig) -> Self {
        Self::new(&cfg.entrypoint, &cfg.status_dir)
            .with_start_grace(Duration::from_secs(cfg.start_grace_secs))
    }

    /// How long a launched worker may go without writing its pid file before
    /// it is considered dead.
    #[must_use]
    pub const fn with_start_grace(mut self, grace: Duration) -> Self {
        self.start_grace = grace;
        self
    }

    /// Directory the workers report into.
    #[must_use]
    pub fn status_dir(&self) -> &Path {
        &self.status_dir
    }

    /// Arguments passed to the entrypoint for `task`.
    #[must_use]
    pub fn command_args(worker_id: &str, task: &BuildQueueTask) -> Vec<String> {
        let chroot = if task.is_source_build() {
            SRPM_BUILDS_CHROOT
        } else {
            task.chroot().unwrap_or(SRPM_BUILDS_CHROOT)
        };
        vec![
            "--daemon".to_owned(),
            "--build-id".to_owned(),
            task.build_id().to_string(),
            "--chroot".to_owned(),
            chroot.to_owned(),
            "--worker-id".to_owned(),
            worker_id.to_owned(),
        ]
    }

    /// Path of the `ext` status file of `worker_id`.
    #[must_use]
    pub fn status_file(&self, worker_id: &str, ext: &str) -> PathBuf {
        self.status_dir.join(format!("{worker_id}.{ext}"))
    }

    /// Workers with a task file but no completion report, as left behind by a
    /// previous scheduler instance.
    ///
    /// Unreadable task files are skipped with a warning.
    ///
    /// # Errors
    ///
    /// [`LaunchError::Io`] when the status directory cannot be listed.
    pub async fn rediscover(&self) -> Result<Vec<(WorkerId, BuildQueueTask)>, LaunchError> {
        let mut entries = match tokio::fs::read_dir(&self.status_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut found = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(TASK_EXT) {
                continue;
            }
            let Some(worker_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if self.task_id_from_worker_id(worker_id).is_none() {
                continue;
            }
            if tokio::fs::try_exists(self.status_file(worker_id, DONE_EXT))
                .await
                .unwrap_or(false)
            {
                continue;
            }
            match read_task_file(&path).await {
                Ok(task) => found.push((worker_id.to_owned(), task)),
                Err(err) => warn!(path = %path.display(), error = %err, "skipping unreadable task file"),
            }
        }
        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found)
    }

    async fn write_task_file(&self, worker_id: &str, task: &BuildQueueTask) -> Result<(), LaunchError> {
        tokio::fs::create_dir_all(&self.status_dir).await?;
        let body = serde_json::to_vec(&TaskRecord::from(task))
            .map_err(|e| LaunchError::Io(e.to_string()))?;
        tokio::fs::write(self.status_file(worker_id, TASK_EXT), body).await?;
        Ok(())
    }

    async fn read_report(&self, worker_id: &str) -> Option<BuildOutcome> {
        let raw = tokio::fs::read(self.status_file(worker_id, DONE_EXT)).await.ok()?;
        Some(
            serde_json::from_slice::<WorkerReport>(&raw)
                .map_or(BuildOutcome::Unknown, |report| report.status),
        )
    }

    async fn read_pid(&self, worker_id: &str) -> Option<u32> {
        let raw = tokio::fs::read_to_string(self.status_file(worker_id, PID_EXT))
            .await
            .ok()?;
        raw.trim().parse().ok()
    }

    async fn remove_status_files(&self, worker_id: &str) {
        for ext in [TASK_EXT, PID_EXT, DONE_EXT] {
            let path = self.status_file(worker_id, ext);
            if let Err(e) = tokio::fs::remove_file(&path).await {
                if e.kind() != ErrorKind::NotFound {
                    warn!(path = %path.display(), error = %e, "failed to remove worker status file");
                }
            }
        }
    }
}

async fn read_task_file(path: &Path) -> Result<BuildQueueTask, String> {
    let raw = tokio::fs::read(path).await.map_err(|e| e.to_string())?;
    let value: serde_json::Value = serde_json::from_slice(&raw).map_err(|e| e.to_string())?;
    BuildQueueTask::from_value(value).map_err(|e| e.to_string())
}

/// Whether `pid` names a live, non-zombie process.
#[cfg(target_os = "linux")]
async fn process_alive(pid: u32) -> bool {
    match tokio::fs::read_to_string(format!("/proc/{pid}/stat")).await {
        // The state letter follows the parenthesized command name.
        Ok(stat) => stat
            .rsplit_once(") ")
            .and_then(|(_, rest)| rest.chars().next())
            .is_some_and(|state| state != 'Z' && state != 'X'),
        Err(_) => false,
    }
}

/// Whether `pid` names a process we may signal, via the shell's `kill -0`.
#[cfg(unix)]
#[cfg_attr(target_os = "linux", allow(dead_code))]
async fn signalable(pid: u32) -> bool {
    Command::new("sh")
        .arg("-c")
        .arg(format!("kill -0 {pid} 2>/dev/null"))
        .stdin(Stdio::null())
        .status()
        .await
        .is_ok_and(|status| status.success())
}

#[cfg(all(unix, not(target_os = "linux")))]
async fn process_alive(pid: u32) -> bool {
    signalable(pid).await
}

#[cfg(not(unix))]
async fn process_alive(_pid: u32) -> bool {
    static WARNED: std::sync::Once = std::sync::Once::new();
    WARNED.call_once(|| {
        warn!("no process liveness check on this platform, only worker reports end a build");
    });
    true
}

#[async_trait]
impl WorkerLauncher for RpmBuildLauncher {
    fn worker_prefix(&self) -> &str {
        RPM_WORKER_PREFIX
    }

    async fn start_task(&self, worker_id: &str, task: &BuildQueueTask) -> Result<(), LaunchError> {
        self.remove_status_files(worker_id).await;
        self.write_task_file(worker_id, task).await?;

        let args = Self::command_args(worker_id, task);
        info!(
            worker_id,
            command = %format!("{} {}", self.entrypoint.display(), args.join(" ")),
            "running worker"
        );
        let status = Command::new(&self.entrypoint)
            .args(&args)
            .stdin(Stdio::null())
            .status()
            .await
            .map_err(|e| LaunchError::Spawn(e.to_string()));

        let result = match status {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(status
                .code()
                .map_or(LaunchError::KilledBySignal, |code| LaunchError::NonZeroExit { code })),
            Err(err) => Err(err),
        };
        if result.is_err() {
            self.remove_status_files(worker_id).await;
        }
        result
    }

    async fn probe(&self, worker: &Worker) -> WorkerProbe {
        if let Some(outcome) = self.read_report(&worker.worker_id).await {
            return WorkerProbe::Ended(outcome);
        }
        let Some(pid) = self.read_pid(&worker.worker_id).await else {
            let waited = now_ms().saturating_sub(worker.started_at_ms);
            if waited < self.start_grace.as_millis() {
                return WorkerProbe::Alive;
            }
            debug!(worker_id = %worker.worker_id, "worker never reported a pid");
            return WorkerProbe::Dead;
        };
        if process_alive(pid).await {
            return WorkerProbe::Alive;
        }
        // The report may have landed between the two reads.
        if let Some(outcome) = self.read_report(&worker.worker_id).await {
            return WorkerProbe::Ended(outcome);
        }
        debug!(worker_id = %worker.worker_id, pid, "worker process is gone");
        WorkerProbe::Dead
    }

    async fn finish_task(&self, worker_id: &str, outcome: BuildOutcome) -> bool {
        let task_id = self.task_id_from_worker_id(worker_id).unwrap_or("unknown");
        self.remove_status_files(worker_id).await;
        info!(worker_id, task_id, outcome = ?outcome, "worker slot released");
        true
    }
}
