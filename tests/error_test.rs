//! Tests for error types

use trueno_lab::error::{ExperimentError, Interrupted};
use trueno_lab::Error;

#[test]
fn test_persistence_error() {
    let error = Error::Persistence("missing key 'status'".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Persistence error"));
    assert!(error_str.contains("missing key 'status'"));
    assert!(error_str.contains("save_state()"));
}

#[test]
fn test_unsupported_version_error() {
    let error = Error::UnsupportedVersion {
        found: 7,
        supported: 1,
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Unsupported state version 7"));
    assert!(error_str.contains("up to 1"));
}

#[test]
fn test_invalid_state_error() {
    let error = Error::InvalidState {
        id: 12,
        status: "Running".to_string(),
    };
    let error_str = format!("{error}");
    assert!(error_str.contains("Experiment 12 is Running"));
    assert!(error_str.contains("not allowed"));
}

#[test]
fn test_invalid_input_error() {
    let error = Error::InvalidInput("fraction must be in (0, 1)".to_string());
    let error_str = format!("{error}");
    assert!(error_str.contains("Invalid input"));
    assert!(error_str.contains("fraction"));
}

#[test]
fn test_thread_pool_error() {
    let error = Error::ThreadPool("worker count must be at least 1".to_string());
    assert!(format!("{error}").contains("Thread pool error"));
}

#[test]
fn test_json_error_conversion() {
    let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
    let error: Error = json_err.into();
    assert!(matches!(error, Error::Json(_)));
    assert!(format!("{error}").contains("JSON error"));
}

#[test]
fn test_other_error() {
    let error = Error::Other("custom".to_string());
    assert_eq!(format!("{error}"), "custom");
}

#[test]
fn test_error_debug() {
    let error = Error::InvalidInput("test".to_string());
    assert!(format!("{error:?}").contains("InvalidInput"));
}

#[test]
fn test_result_type() {
    fn returns_result() -> trueno_lab::Result<i32> {
        Ok(42)
    }
    assert_eq!(returns_result().unwrap(), 42);
}

// ============================================================================
// Experiment outcomes
// ============================================================================

#[test]
fn test_experiment_failure() {
    let error = ExperimentError::failed("division by zero");
    assert!(!error.is_interrupted());
    let error_str = format!("{error}");
    assert!(error_str.contains("experiment failed"));
    assert!(error_str.contains("division by zero"));
}

#[test]
fn test_experiment_failure_from_anyhow() {
    let error: ExperimentError = anyhow::anyhow!("bad input").context("loading table").into();
    assert!(matches!(error, ExperimentError::Failed(_)));
}

#[test]
fn test_interruption() {
    let error: ExperimentError = Interrupted.into();
    assert!(error.is_interrupted());
    assert_eq!(format!("{error}"), "interrupted");
}

#[test]
fn test_interruption_propagates_with_question_mark() {
    fn body() -> Result<(), ExperimentError> {
        Err(Interrupted)?;
        Ok(())
    }
    assert!(body().unwrap_err().is_interrupted());
}
