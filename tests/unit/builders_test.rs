//! Tests for builder helpers

use std::path::{Path, PathBuf};

use rpm_dispatch::builders::{build_limits, build_manager, build_source, restore_workers};
use rpm_dispatch::config::{DispatchConfig, IntakeConfig, LauncherConfig};
use rpm_dispatch::core::{BuildQueueTask, DispatchError, TaskRecord, TaskSource};
use rpm_dispatch::infra::{InMemoryLauncher, RpmBuildLauncher};

fn config() -> DispatchConfig {
    config_in(Path::new("/var/lib/rpm-dispatch/workers"))
}

fn config_in(status_dir: &Path) -> DispatchConfig {
    DispatchConfig {
        poll_interval_secs: 5,
        max_workers: 4,
        arch_limits: [("x86_64".to_string(), 2), ("aarch64".to_string(), 1)]
            .into_iter()
            .collect(),
        sandbox_limit: Some(1),
        owner_limit: None,
        launcher: LauncherConfig {
            entrypoint: PathBuf::from("copr-backend-process-build"),
            status_dir: status_dir.to_path_buf(),
            start_grace_secs: 60,
        },
        intake: IntakeConfig::InMemory,
    }
}

#[test]
fn test_build_limits_from_config() {
    let limits = build_limits(&config());
    let names: Vec<&str> = limits.iter().map(|l| l.name()).collect();
    assert_eq!(names, ["global", "arch_aarch64", "arch_x86_64", "sandbox"]);
    assert_eq!(limits.get("global").map(|l| l.capacity()), Some(4));
    assert_eq!(limits.get("arch_x86_64").map(|l| l.capacity()), Some(2));
}

#[test]
fn test_build_limits_with_owner_limit() {
    let mut cfg = config();
    cfg.owner_limit = Some(3);
    cfg.sandbox_limit = None;
    let limits = build_limits(&cfg);
    assert!(limits.get("owner").is_some());
    assert!(limits.get("sandbox").is_none());
}

#[test]
fn test_build_manager_rejects_invalid_config() {
    let mut cfg = config();
    cfg.max_workers = 0;
    assert!(matches!(
        build_manager(&cfg, InMemoryLauncher::new()),
        Err(DispatchError::Config(_))
    ));
}

#[tokio::test]
async fn test_build_manager_applies_limits() {
    let manager = build_manager(&config(), InMemoryLauncher::new()).unwrap();
    assert_eq!(manager.stats().limits.len(), 4);
    assert_eq!(manager.limit_usage("arch_aarch64"), Some(0));
}

#[tokio::test]
async fn test_zero_arch_limit_disables_architecture() {
    let mut cfg = config();
    cfg.arch_limits.insert("ppc64le".into(), 0);
    let manager = build_manager(&cfg, InMemoryLauncher::new()).unwrap();

    let ppc = BuildQueueTask::new("1-fedora-39-ppc64le", 1, "alice").with_chroot("fedora-39-ppc64le");
    let x86 = BuildQueueTask::new("2-fedora-39-x86_64", 2, "alice").with_chroot("fedora-39-x86_64");
    let pending = [&ppc, &x86]
        .iter()
        .map(|task| serde_json::to_value(TaskRecord::from(*task)).unwrap())
        .collect();

    let report = manager.run_pass(pending).await;
    assert_eq!(report.started, vec!["2-fedora-39-x86_64".to_owned()]);
    assert_eq!(report.blocked, 1);
    assert_eq!(manager.limit_usage("arch_ppc64le"), Some(0));
}

#[tokio::test]
async fn test_build_source_variants() {
    let tmp = tempfile::tempdir().unwrap();
    let mut cfg = config();
    let source = build_source(&cfg).unwrap();
    assert!(source.load_pending().await.unwrap().is_empty());

    cfg.intake = IntakeConfig::File {
        path: tmp.path().join("missing.json"),
    };
    let source = build_source(&cfg).unwrap();
    assert!(matches!(
        source.load_pending().await,
        Err(DispatchError::Intake(_))
    ));
}

#[cfg(unix)]
#[tokio::test]
async fn test_restore_workers_counts_leftover_workers() {
    let tmp = tempfile::tempdir().unwrap();
    let cfg = config_in(tmp.path());
    let task = BuildQueueTask::new("1", 1, "alice");
    std::fs::write(
        tmp.path().join("rpm_build_worker:1.task"),
        serde_json::to_vec(&TaskRecord::from(&task)).unwrap(),
    )
    .unwrap();

    let manager = build_manager(&cfg, RpmBuildLauncher::from_config(&cfg.launcher)).unwrap();
    assert_eq!(restore_workers(&manager).await.unwrap(), 1);
    assert!(manager.is_running("1"));
    assert_eq!(manager.limit_usage("global"), Some(1));
}

#[tokio::test]
async fn test_restore_workers_reports_unreadable_status_dir() {
    let tmp = tempfile::NamedTempFile::new().unwrap();
    let cfg = config_in(tmp.path());
    let manager = build_manager(&cfg, RpmBuildLauncher::from_config(&cfg.launcher)).unwrap();
    assert!(matches!(
        restore_workers(&manager).await,
        Err(DispatchError::Launch(_))
    ));
}

#[cfg(feature = "http-intake")]
#[test]
fn test_build_http_source() {
    let mut cfg = config();
    cfg.intake = IntakeConfig::Http {
        url: "http://127.0.0.1:5000/backend/pending-jobs/".into(),
    };
    assert!(build_source(&cfg).is_ok());
}
