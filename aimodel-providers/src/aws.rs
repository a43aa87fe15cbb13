//! AWS SDK implementations of the control-plane traits.
//!
//! Service error codes the steps branch on are mapped to `ProviderError` variants;
//! everything else becomes `ProviderError::Api` with the code and message.

use crate::requests::{AlarmSpec, InvokePermission, LaunchRequest};
use crate::{
    CloudClients, ComputeApi, FunctionConfigApi, InstanceState, MonitoringApi, ParameterStore,
    ProviderError, Result, SecretsStore,
};
use async_trait::async_trait;
use aws_config::{retry::RetryConfig, BehaviorVersion, Region, SdkConfig};
use aws_sdk_cloudwatch::types::{ComparisonOperator, Dimension, Statistic};
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::types::{LaunchTemplateSpecification, ResourceType, Tag, TagSpecification};
use aws_sdk_lambda::types::Environment;
use aws_sdk_ssm::types::ParameterType;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Display;
use std::sync::Arc;
use tracing::debug;

/// Load shared SDK configuration from the environment and build every client.
pub async fn load_clients(region: Option<&str>, max_attempts: u32) -> CloudClients {
    let retry = RetryConfig::standard().with_max_attempts(max_attempts.max(1));
    let mut loader = aws_config::defaults(BehaviorVersion::latest()).retry_config(retry);
    if let Some(region) = region {
        loader = loader.region(Region::new(region.to_string()));
    }
    let config = loader.load().await;
    clients_from_config(&config)
}

pub fn clients_from_config(config: &SdkConfig) -> CloudClients {
    CloudClients {
        compute: Arc::new(Ec2Compute::new(config)),
        parameters: Arc::new(SsmParameters::new(config)),
        monitoring: Arc::new(CloudWatchMonitoring::new(config)),
        secrets: Arc::new(SecretsManagerStore::new(config)),
        functions: Arc::new(LambdaFunctions::new(config)),
    }
}

fn api_error<E>(operation: &'static str, err: E) -> ProviderError
where
    E: ProvideErrorMetadata + Display,
{
    let message = match (err.code(), err.message()) {
        (Some(code), Some(msg)) => format!("{}: {}", code, msg),
        (Some(code), None) => code.to_string(),
        _ => err.to_string(),
    };
    ProviderError::api(operation, message)
}

// --- EC2 ---

pub struct Ec2Compute {
    client: aws_sdk_ec2::Client,
}

impl Ec2Compute {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_ec2::Client::new(config),
        }
    }
}

#[async_trait]
impl ComputeApi for Ec2Compute {
    async fn key_pair_exists(&self, key_name: &str) -> Result<bool> {
        match self.client.describe_key_pairs().key_names(key_name).send().await {
            Ok(resp) => Ok(resp
                .key_pairs()
                .iter()
                .any(|k| k.key_name() == Some(key_name))),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("InvalidKeyPair.NotFound") {
                    Ok(false)
                } else {
                    Err(api_error("DescribeKeyPairs", err))
                }
            }
        }
    }

    async fn create_key_pair(&self, key_name: &str) -> Result<String> {
        let resp = match self.client.create_key_pair().key_name(key_name).send().await {
            Ok(resp) => resp,
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("InvalidKeyPair.Duplicate") {
                    return Err(ProviderError::AlreadyExists {
                        kind: "key pair",
                        id: key_name.to_string(),
                    });
                }
                return Err(api_error("CreateKeyPair", err));
            }
        };
        debug!(key_name, key_pair_id = ?resp.key_pair_id(), "created key pair");
        resp.key_material()
            .map(str::to_string)
            .ok_or_else(|| ProviderError::malformed("CreateKeyPair", "no key material returned"))
    }

    async fn delete_key_pair(&self, key_name: &str) -> Result<()> {
        self.client
            .delete_key_pair()
            .key_name(key_name)
            .send()
            .await
            .map_err(|e| api_error("DeleteKeyPair", e.into_service_error()))?;
        Ok(())
    }

    async fn run_instance(&self, request: &LaunchRequest) -> Result<String> {
        let template = LaunchTemplateSpecification::builder()
            .launch_template_id(&request.launch_template_id)
            .build();
        let mut req = self
            .client
            .run_instances()
            .launch_template(template)
            .min_count(1)
            .max_count(1)
            .subnet_id(&request.subnet_id)
            .security_group_ids(&request.security_group_id);
        if let Some(key_name) = &request.key_name {
            req = req.key_name(key_name);
        }
        if let Some(name) = &request.name_tag {
            req = req.tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Instance)
                    .tags(Tag::builder().key("Name").value(name).build())
                    .build(),
            );
        }
        let resp = req
            .send()
            .await
            .map_err(|e| api_error("RunInstances", e.into_service_error()))?;
        resp.instances()
            .first()
            .and_then(|i| i.instance_id())
            .map(str::to_string)
            .ok_or_else(|| ProviderError::malformed("RunInstances", "no instance in response"))
    }

    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState> {
        let resp = match self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("InvalidInstanceID.NotFound") {
                    return Err(ProviderError::NotFound {
                        kind: "instance",
                        id: instance_id.to_string(),
                    });
                }
                return Err(api_error("DescribeInstances", err));
            }
        };
        resp.reservations()
            .iter()
            .flat_map(|r| r.instances().iter())
            .find(|i| i.instance_id() == Some(instance_id))
            .and_then(|i| i.state())
            .and_then(|s| s.name())
            .map(|name| InstanceState::parse(name.as_str()))
            .ok_or_else(|| ProviderError::NotFound {
                kind: "instance",
                id: instance_id.to_string(),
            })
    }

    async fn attach_volume(&self, volume_id: &str, instance_id: &str, device: &str) -> Result<()> {
        let resp = self
            .client
            .attach_volume()
            .volume_id(volume_id)
            .instance_id(instance_id)
            .device(device)
            .send()
            .await
            .map_err(|e| api_error("AttachVolume", e.into_service_error()))?;
        debug!(volume_id, instance_id, state = ?resp.state(), "attach requested");
        Ok(())
    }

    async fn terminate_instance(&self, instance_id: &str) -> Result<()> {
        match self
            .client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("InvalidInstanceID.NotFound") {
                    return Err(ProviderError::NotFound {
                        kind: "instance",
                        id: instance_id.to_string(),
                    });
                }
                Err(api_error("TerminateInstances", err))
            }
        }
    }
}

// --- SSM Parameter Store ---

pub struct SsmParameters {
    client: aws_sdk_ssm::Client,
}

impl SsmParameters {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_ssm::Client::new(config),
        }
    }
}

#[async_trait]
impl ParameterStore for SsmParameters {
    async fn get_parameter(&self, name: &str) -> Result<Option<String>> {
        match self.client.get_parameter().name(name).send().await {
            Ok(resp) => Ok(resp
                .parameter()
                .and_then(|p| p.value())
                .map(str::to_string)),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("ParameterNotFound") {
                    Ok(None)
                } else {
                    Err(api_error("GetParameter", err))
                }
            }
        }
    }

    async fn put_parameter(&self, name: &str, value: &str, overwrite: bool) -> Result<()> {
        match self
            .client
            .put_parameter()
            .name(name)
            .value(value)
            .r#type(ParameterType::String)
            .overwrite(overwrite)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("ParameterAlreadyExists") {
                    return Err(ProviderError::AlreadyExists {
                        kind: "parameter",
                        id: name.to_string(),
                    });
                }
                Err(api_error("PutParameter", err))
            }
        }
    }

    async fn delete_parameter(&self, name: &str) -> Result<()> {
        match self.client.delete_parameter().name(name).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("ParameterNotFound") {
                    return Err(ProviderError::NotFound {
                        kind: "parameter",
                        id: name.to_string(),
                    });
                }
                Err(api_error("DeleteParameter", err))
            }
        }
    }
}

// --- CloudWatch ---

pub struct CloudWatchMonitoring {
    client: aws_sdk_cloudwatch::Client,
}

impl CloudWatchMonitoring {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_cloudwatch::Client::new(config),
        }
    }
}

#[async_trait]
impl MonitoringApi for CloudWatchMonitoring {
    async fn put_metric_alarm(&self, spec: &AlarmSpec) -> Result<()> {
        let policy = &spec.policy;
        let dimension = Dimension::builder()
            .name(policy.dimension_name)
            .value(&spec.instance_id)
            .build()
            .map_err(|e| ProviderError::malformed("PutMetricAlarm", e.to_string()))?;
        self.client
            .put_metric_alarm()
            .alarm_name(&spec.alarm_name)
            .alarm_description(format!(
                "Stop {} after {}s below {}% {}",
                spec.instance_id,
                policy.idle_window_secs(),
                policy.threshold_percent,
                policy.metric_name
            ))
            .metric_name(policy.metric_name)
            .namespace(policy.namespace)
            .statistic(Statistic::from(policy.statistic))
            .dimensions(dimension)
            .period(policy.period_secs)
            .evaluation_periods(policy.evaluation_periods)
            .datapoints_to_alarm(policy.datapoints_to_alarm)
            .threshold(policy.threshold_percent)
            .comparison_operator(ComparisonOperator::from(policy.comparison_operator))
            .alarm_actions(&spec.action_arn)
            .send()
            .await
            .map_err(|e| api_error("PutMetricAlarm", e.into_service_error()))?;
        Ok(())
    }

    async fn delete_alarm(&self, alarm_name: &str) -> Result<()> {
        match self.client.delete_alarms().alarm_names(alarm_name).send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("ResourceNotFound") {
                    return Err(ProviderError::NotFound {
                        kind: "alarm",
                        id: alarm_name.to_string(),
                    });
                }
                Err(api_error("DeleteAlarms", err))
            }
        }
    }
}

// --- Secrets Manager ---

pub struct SecretsManagerStore {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretsManagerStore {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_secretsmanager::Client::new(config),
        }
    }
}

fn secret_not_found(name: &str) -> ProviderError {
    ProviderError::NotFound {
        kind: "secret",
        id: name.to_string(),
    }
}

#[async_trait]
impl SecretsStore for SecretsManagerStore {
    async fn secret_exists(&self, name: &str) -> Result<bool> {
        // A secret scheduled for deletion still blocks its name, so it counts as existing.
        match self.client.describe_secret().secret_id(name).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("ResourceNotFoundException") {
                    Ok(false)
                } else {
                    Err(api_error("DescribeSecret", err))
                }
            }
        }
    }

    async fn create_secret(&self, name: &str, value: &str) -> Result<()> {
        match self
            .client
            .create_secret()
            .name(name)
            .secret_string(value)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("ResourceExistsException") {
                    return Err(ProviderError::AlreadyExists {
                        kind: "secret",
                        id: name.to_string(),
                    });
                }
                Err(api_error("CreateSecret", err))
            }
        }
    }

    async fn put_secret_value(&self, name: &str, value: &str) -> Result<()> {
        match self
            .client
            .put_secret_value()
            .secret_id(name)
            .secret_string(value)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("ResourceNotFoundException") {
                    return Err(secret_not_found(name));
                }
                Err(api_error("PutSecretValue", err))
            }
        }
    }

    async fn delete_secret(&self, name: &str) -> Result<()> {
        match self
            .client
            .delete_secret()
            .secret_id(name)
            .force_delete_without_recovery(true)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("ResourceNotFoundException") {
                    return Err(secret_not_found(name));
                }
                Err(api_error("DeleteSecret", err))
            }
        }
    }
}

// --- Lambda ---

pub struct LambdaFunctions {
    client: aws_sdk_lambda::Client,
}

impl LambdaFunctions {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            client: aws_sdk_lambda::Client::new(config),
        }
    }
}

fn function_not_found(function_name: &str) -> ProviderError {
    ProviderError::NotFound {
        kind: "function",
        id: function_name.to_string(),
    }
}

#[async_trait]
impl FunctionConfigApi for LambdaFunctions {
    async fn get_environment(&self, function_name: &str) -> Result<BTreeMap<String, String>> {
        let resp = match self
            .client
            .get_function_configuration()
            .function_name(function_name)
            .send()
            .await
        {
            Ok(resp) => resp,
            Err(e) => {
                let err = e.into_service_error();
                if err.code() == Some("ResourceNotFoundException") {
                    return Err(function_not_found(function_name));
                }
                return Err(api_error("GetFunctionConfiguration", err));
            }
        };
        Ok(resp
            .environment()
            .and_then(|env| env.variables())
            .map(|vars| {
                vars.iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn update_environment(
        &self,
        function_name: &str,
        variables: &BTreeMap<String, String>,
    ) -> Result<()> {
        let vars: HashMap<String, String> = variables
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let environment = Environment::builder().set_variables(Some(vars)).build();
        match self
            .client
            .update_function_configuration()
            .function_name(function_name)
            .environment(environment)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                match err.code() {
                    Some("ResourceNotFoundException") => Err(function_not_found(function_name)),
                    Some("ResourceConflictException") => Err(ProviderError::Conflict(format!(
                        "{}: {}",
                        function_name,
                        err.message().unwrap_or("update already in progress")
                    ))),
                    _ => Err(api_error("UpdateFunctionConfiguration", err)),
                }
            }
        }
    }

    async fn add_invoke_permission(&self, permission: &InvokePermission) -> Result<()> {
        match self
            .client
            .add_permission()
            .function_name(&permission.function_name)
            .statement_id(&permission.statement_id)
            .action("lambda:InvokeFunction")
            .principal(&permission.principal)
            .source_arn(&permission.source_arn)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                match err.code() {
                    Some("ResourceConflictException") => Err(ProviderError::Conflict(format!(
                        "statement {} on {}: {}",
                        permission.statement_id,
                        permission.function_name,
                        err.message().unwrap_or("already exists")
                    ))),
                    Some("ResourceNotFoundException") => {
                        Err(function_not_found(&permission.function_name))
                    }
                    _ => Err(api_error("AddPermission", err)),
                }
            }
        }
    }

    async fn remove_invoke_permission(&self, function_name: &str, statement_id: &str) -> Result<()> {
        match self
            .client
            .remove_permission()
            .function_name(function_name)
            .statement_id(statement_id)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => {
                let err = e.into_service_error();
                // Raised for a missing function and for a missing statement alike.
                if err.code() == Some("ResourceNotFoundException") {
                    return Err(ProviderError::NotFound {
                        kind: "permission statement",
                        id: format!("{} on {}", statement_id, function_name),
                    });
                }
                Err(api_error("RemovePermission", err))
            }
        }
    }
}
