use aimodel_common::naming::NamingError;
use aimodel_common::InstanceState;
use aimodel_providers::ProviderError;
use std::time::Duration;

/// Failure of a step. Surfaces to the orchestrator as a failed task.
#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("required parameter {0} is not set")]
    MissingParameter(String),
    #[error("input field `{0}` is missing or empty")]
    MissingInput(&'static str),
    #[error("environment variable {0} is not set")]
    MissingEnvironment(&'static str),
    #[error("instance {instance_id} is {state} and will never be running")]
    InstanceNeverRunning {
        instance_id: String,
        state: InstanceState,
    },
    #[error("instance {instance_id} not running after {waited:?} (last state: {last_state})")]
    WaitTimeout {
        instance_id: String,
        last_state: String,
        waited: Duration,
    },
    #[error("secret {0} already exists; refusing to overwrite it with new key material")]
    SecretAlreadyExists(String),
    #[error("key pair {key_name} exists but its material was not stored ({store_error}) and it could not be deleted ({delete_error})")]
    OrphanedKeyPair {
        key_name: String,
        store_error: ProviderError,
        delete_error: ProviderError,
    },
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    #[error(transparent)]
    Naming(#[from] NamingError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl StepError {
    /// Action-log status for this failure.
    pub fn log_status(&self) -> &'static str {
        match self {
            StepError::WaitTimeout { .. } => "timeout",
            _ => "failed",
        }
    }
}

pub type StepResult<T> = Result<T, StepError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_keep_their_message() {
        let err: StepError = ProviderError::api("AttachVolume", "VolumeInUse").into();
        assert_eq!(err.to_string(), "AttachVolume failed: VolumeInUse");
        assert_eq!(err.log_status(), "failed");
    }

    #[test]
    fn timeout_is_logged_as_timeout() {
        let err = StepError::WaitTimeout {
            instance_id: "i-1".into(),
            last_state: "pending".into(),
            waited: Duration::from_secs(600),
        };
        assert_eq!(err.log_status(), "timeout");
        assert!(err.to_string().contains("i-1"));
    }
}
