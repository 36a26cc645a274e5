//! Tests for error types

use rpm_dispatch::core::{AppResult, DispatchError, LaunchError, TaskError};

#[test]
fn test_intake_error() {
    let err = DispatchError::Intake("timeout".to_string());
    assert_eq!(format!("{err}"), "intake unavailable: timeout");
}

#[test]
fn test_task_running_error() {
    let err = DispatchError::TaskRunning("12-fedora-39-x86_64".to_string());
    assert_eq!(format!("{err}"), "task 12-fedora-39-x86_64 is running");
}

#[test]
fn test_launch_error_conversion() {
    let err: DispatchError = LaunchError::NonZeroExit { code: 3 }.into();
    assert_eq!(format!("{err}"), "launch failed: non-zero exit code: 3");

    let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
    assert_eq!(LaunchError::from(io), LaunchError::Io("denied".to_string()));
}

#[test]
fn test_task_error_messages() {
    assert_eq!(
        TaskError::MissingField("build_id").to_string(),
        "missing required field `build_id`"
    );
    assert!(TaskError::Malformed("oops".into()).to_string().contains("oops"));
}

#[test]
fn test_app_result_wraps_dispatch_error() {
    fn load() -> AppResult<()> {
        let loaded: Result<(), DispatchError> =
            Err(DispatchError::Config("poll_interval_secs must be greater than 0".into()));
        loaded?;
        Ok(())
    }
    let err = load().unwrap_err();
    assert!(err.to_string().starts_with("invalid configuration"));
    assert!(err.downcast_ref::<DispatchError>().is_some());
}
