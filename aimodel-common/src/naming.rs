//! Names of resources created on behalf of one instance.
//!
//! Every name that can exist more than once at a time carries the instance id.

use thiserror::Error;

pub const ALARM_NAME_PREFIX: &str = "LowCpuAlarm-";
pub const KEY_SECRET_PREFIX: &str = "EC2KeyPair-";
pub const PERMISSION_STATEMENT_PREFIX: &str = "AllowAlarmInvoke-";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NamingError {
    #[error("malformed ARN: {0}")]
    MalformedArn(String),
    #[error("expected a {expected} ARN, got service `{actual}`")]
    UnexpectedService { expected: &'static str, actual: String },
}

/// Low-utilization alarm name for an instance.
pub fn alarm_name(instance_id: &str) -> String {
    format!("{}{}", ALARM_NAME_PREFIX, instance_id.trim())
}

/// Secret holding the private material of a generated key pair.
pub fn key_secret_name(key_name: &str) -> String {
    format!("{}{}", KEY_SECRET_PREFIX, key_name.trim())
}

/// Statement id of the invoke permission granted to one alarm.
pub fn permission_statement_id(instance_id: &str) -> String {
    format!("{}{}", PERMISSION_STATEMENT_PREFIX, instance_id.trim())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn {
    pub partition: String,
    pub service: String,
    pub region: String,
    pub account: String,
    pub resource: String,
}

/// Split `arn:partition:service:region:account:resource`. The resource part may itself
/// contain colons (`function:name:alias`).
pub fn parse_arn(raw: &str) -> Result<Arn, NamingError> {
    let raw = raw.trim();
    let mut parts = raw.splitn(6, ':');
    let (Some("arn"), Some(partition), Some(service), Some(region), Some(account), Some(resource)) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return Err(NamingError::MalformedArn(raw.to_string()));
    };
    if partition.is_empty() || service.is_empty() || resource.is_empty() {
        return Err(NamingError::MalformedArn(raw.to_string()));
    }
    Ok(Arn {
        partition: partition.to_string(),
        service: service.to_string(),
        region: region.to_string(),
        account: account.to_string(),
        resource: resource.to_string(),
    })
}

/// ARN of the alarm, in the same partition/region/account as the stop function it invokes.
pub fn alarm_arn(stop_function_arn: &str, alarm_name: &str) -> Result<String, NamingError> {
    let arn = parse_arn(stop_function_arn)?;
    if arn.service != "lambda" {
        return Err(NamingError::UnexpectedService {
            expected: "lambda",
            actual: arn.service,
        });
    }
    if arn.region.is_empty() || arn.account.is_empty() {
        return Err(NamingError::MalformedArn(stop_function_arn.trim().to_string()));
    }
    Ok(format!(
        "arn:{}:cloudwatch:{}:{}:alarm:{}",
        arn.partition, arn.region, arn.account, alarm_name
    ))
}
