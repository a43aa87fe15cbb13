use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

pub use aimodel_common::InstanceState;

/// Errors surfaced by control-plane clients.
///
/// Only the variants the steps branch on are distinguished; anything else is `Api`.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },
    #[error("resource conflict: {0}")]
    Conflict(String),
    #[error("{operation} failed: {message}")]
    Api {
        operation: &'static str,
        message: String,
    },
    #[error("unexpected {operation} response: {message}")]
    Malformed {
        operation: &'static str,
        message: String,
    },
}

impl ProviderError {
    pub fn api(operation: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Api {
            operation,
            message: message.into(),
        }
    }

    pub fn malformed(operation: &'static str, message: impl Into<String>) -> Self {
        ProviderError::Malformed {
            operation,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProviderError::NotFound { .. })
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(self, ProviderError::AlreadyExists { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, ProviderError::Conflict(_))
    }
}

pub type Result<T> = std::result::Result<T, ProviderError>;

pub mod requests {
    use aimodel_common::alarm::AlarmPolicy;

    /// One instance from a launch template.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct LaunchRequest {
        pub launch_template_id: String,
        pub subnet_id: String,
        pub security_group_id: String,
        pub key_name: Option<String>,
        /// Value of the `Name` tag.
        pub name_tag: Option<String>,
    }

    /// Threshold alarm on one instance's metric with a single action.
    #[derive(Clone, Debug, PartialEq)]
    pub struct AlarmSpec {
        pub alarm_name: String,
        pub instance_id: String,
        pub action_arn: String,
        pub policy: AlarmPolicy,
    }

    /// Permission for a service principal to invoke a function, limited to one source ARN.
    #[derive(Clone, Debug, PartialEq, Eq)]
    pub struct InvokePermission {
        pub function_name: String,
        pub statement_id: String,
        pub principal: String,
        pub source_arn: String,
    }

    /// Principal CloudWatch alarms invoke Lambda actions as.
    pub const ALARM_INVOKE_PRINCIPAL: &str = "lambda.alarms.cloudwatch.amazonaws.com";
}

use requests::{AlarmSpec, InvokePermission, LaunchRequest};

/// Compute control plane: key pairs, instances, volume attachment.
#[async_trait]
pub trait ComputeApi: Send + Sync {
    async fn key_pair_exists(&self, key_name: &str) -> Result<bool>;

    /// Create a key pair and return its private key material.
    /// A key that already exists yields `ProviderError::AlreadyExists`.
    async fn create_key_pair(&self, key_name: &str) -> Result<String>;

    async fn delete_key_pair(&self, key_name: &str) -> Result<()>;

    /// Start exactly one instance and return its id.
    async fn run_instance(&self, request: &LaunchRequest) -> Result<String>;

    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState>;

    async fn attach_volume(&self, volume_id: &str, instance_id: &str, device: &str) -> Result<()>;

    async fn terminate_instance(&self, instance_id: &str) -> Result<()>;
}

/// Shared string key-value configuration.
#[async_trait]
pub trait ParameterStore: Send + Sync {
    /// `None` when the parameter does not exist.
    async fn get_parameter(&self, name: &str) -> Result<Option<String>>;

    async fn put_parameter(&self, name: &str, value: &str, overwrite: bool) -> Result<()>;

    async fn delete_parameter(&self, name: &str) -> Result<()>;
}

#[async_trait]
pub trait MonitoringApi: Send + Sync {
    /// Create the alarm, replacing any alarm with the same name.
    async fn put_metric_alarm(&self, spec: &AlarmSpec) -> Result<()>;

    async fn delete_alarm(&self, alarm_name: &str) -> Result<()>;
}

#[async_trait]
pub trait SecretsStore: Send + Sync {
    async fn secret_exists(&self, name: &str) -> Result<bool>;

    /// Fails with `AlreadyExists` rather than replacing an existing secret.
    async fn create_secret(&self, name: &str, value: &str) -> Result<()>;

    /// Replace the value of an existing secret.
    async fn put_secret_value(&self, name: &str, value: &str) -> Result<()>;

    async fn delete_secret(&self, name: &str) -> Result<()>;
}

/// Configuration of deployed functions.
#[async_trait]
pub trait FunctionConfigApi: Send + Sync {
    async fn get_environment(&self, function_name: &str) -> Result<BTreeMap<String, String>>;

    /// Replace the full set of environment variables.
    async fn update_environment(
        &self,
        function_name: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<()>;

    /// An existing statement with the same id yields `ProviderError::Conflict`.
    async fn add_invoke_permission(&self, permission: &InvokePermission) -> Result<()>;

    /// Remove one statement from the function's resource policy.
    /// A missing statement yields `ProviderError::NotFound`.
    async fn remove_invoke_permission(&self, function_name: &str, statement_id: &str) -> Result<()>;
}

/// Clients handed to every step.
#[derive(Clone)]
pub struct CloudClients {
    pub compute: Arc<dyn ComputeApi>,
    pub parameters: Arc<dyn ParameterStore>,
    pub monitoring: Arc<dyn MonitoringApi>,
    pub secrets: Arc<dyn SecretsStore>,
    pub functions: Arc<dyn FunctionConfigApi>,
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "aws")]
pub mod aws;
