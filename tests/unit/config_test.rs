//! Tests for configuration validation

use rpm_dispatch::config::{DispatchConfig, IntakeConfig};

const VALID: &str = r#"{
    "poll_interval_secs": 10,
    "max_workers": 40,
    "arch_limits": {"x86_64": 20, "aarch64": 8},
    "sandbox_limit": 1,
    "owner_limit": 15,
    "launcher": {
        "entrypoint": "/usr/bin/copr-backend-process-build",
        "status_dir": "/var/lib/copr/workers",
        "start_grace_secs": 120
    },
    "intake": {"type": "http", "url": "https://copr.example.org/backend/pending-jobs/"}
}"#;

fn valid() -> DispatchConfig {
    DispatchConfig::from_json_str(VALID).unwrap()
}

#[test]
fn test_full_config_parses() {
    let cfg = valid();
    assert_eq!(cfg.poll_interval_secs, 10);
    assert_eq!(cfg.max_workers, 40);
    assert_eq!(cfg.arch_limits.get("aarch64"), Some(&8));
    assert_eq!(cfg.owner_limit, Some(15));
    assert_eq!(cfg.launcher.start_grace_secs, 120);
    assert!(matches!(cfg.intake, IntakeConfig::Http { .. }));
}

#[test]
fn test_defaults_apply() {
    let cfg = DispatchConfig::from_json_str(
        r#"{"launcher": {"status_dir": "/tmp/workers"}, "intake": {"type": "in_memory"}}"#,
    )
    .unwrap();
    assert_eq!(cfg.poll_interval_secs, 5);
    assert_eq!(cfg.max_workers, num_cpus::get());
    assert!(cfg.arch_limits.is_empty());
    assert_eq!(cfg.sandbox_limit, None);
    assert_eq!(
        cfg.launcher.entrypoint.to_str(),
        Some("copr-backend-process-build")
    );
    assert_eq!(cfg.launcher.start_grace_secs, 60);
}

#[test]
fn test_zero_values_rejected() {
    let mut cfg = valid();
    cfg.poll_interval_secs = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = valid();
    cfg.max_workers = 0;
    assert!(cfg.validate().is_err());

    let mut cfg = valid();
    cfg.sandbox_limit = Some(0);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_zero_arch_limit_accepted() {
    let mut cfg = valid();
    cfg.arch_limits.insert("ppc64le".into(), 0);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_aliased_arch_limits_rejected() {
    let mut cfg = valid();
    cfg.arch_limits.insert("i686".into(), 4);
    let err = cfg.validate().unwrap_err();
    assert!(err.contains("same architecture"));
}

#[test]
fn test_bad_intake_and_launcher_rejected() {
    let mut cfg = valid();
    cfg.intake = IntakeConfig::Http {
        url: "ftp://example.org".into(),
    };
    assert!(cfg.validate().unwrap_err().starts_with("intake invalid"));

    let mut cfg = valid();
    cfg.launcher.status_dir = "".into();
    assert!(cfg.validate().unwrap_err().starts_with("launcher invalid"));
}

#[test]
fn test_parse_errors_reported() {
    assert!(DispatchConfig::from_json_str("{")
        .unwrap_err()
        .starts_with("parse error"));
    assert!(DispatchConfig::from_json_str(r#"{"intake": {"type": "in_memory"}}"#).is_err());
}
