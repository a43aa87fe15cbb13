use crate::wait::WaitPolicy;
use aimodel_common::lifecycle::LifecycleStep;
use aimodel_common::params::{ParameterPaths, DEFAULT_PARAMETER_PREFIX};
use aimodel_common::INSTANCE_ID_ENV;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_KEY_PAIR_NAME: &str = "ai-model-key";
pub const DEFAULT_INSTANCE_NAME: &str = "ai-model-instance";
pub const DEFAULT_AWS_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("{var}: expected {expected}, got `{value}`")]
    Invalid {
        var: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Aws,
    Mock,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Aws => "aws",
            ProviderKind::Mock => "mock",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Runtime configuration shared by every step.
#[derive(Debug, Clone)]
pub struct Settings {
    pub provider: ProviderKind,
    pub paths: ParameterPaths,
    /// Key pair the launcher ensures exists.
    pub key_pair_name: String,
    /// `Name` tag of launched instances.
    pub instance_name: String,
    pub allow_secret_overwrite: bool,
    pub wait: WaitPolicy,
    pub delete_key_pair_on_terminate: bool,
    pub aws_region: Option<String>,
    pub aws_max_attempts: u32,
    /// Target of the terminator, injected by the stop-target updater.
    pub instance_id: Option<String>,
    pub log_format: LogFormat,
    /// Step this deployment runs when serving function invocations.
    pub step: Option<LifecycleStep>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            provider: ProviderKind::Aws,
            paths: ParameterPaths::default(),
            key_pair_name: DEFAULT_KEY_PAIR_NAME.to_string(),
            instance_name: DEFAULT_INSTANCE_NAME.to_string(),
            allow_secret_overwrite: false,
            wait: WaitPolicy::default(),
            delete_key_pair_on_terminate: false,
            aws_region: None,
            aws_max_attempts: DEFAULT_AWS_MAX_ATTEMPTS,
            instance_id: None,
            log_format: LogFormat::Pretty,
            step: None,
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Self, SettingsError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary variable source. Blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, SettingsError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Settings::default();

        let provider = match get("AIMODEL_PROVIDER").map(|v| v.to_lowercase()) {
            None => defaults.provider,
            Some(v) if v == "aws" => ProviderKind::Aws,
            Some(v) if v == "mock" => ProviderKind::Mock,
            Some(v) => {
                return Err(SettingsError::Invalid {
                    var: "AIMODEL_PROVIDER",
                    expected: "aws or mock",
                    value: v,
                })
            }
        };

        let log_format = match get("AIMODEL_LOG_FORMAT").map(|v| v.to_lowercase()) {
            None => defaults.log_format,
            Some(v) if v == "pretty" || v == "text" => LogFormat::Pretty,
            Some(v) if v == "json" => LogFormat::Json,
            Some(v) => {
                return Err(SettingsError::Invalid {
                    var: "AIMODEL_LOG_FORMAT",
                    expected: "pretty or json",
                    value: v,
                })
            }
        };

        let step = match get("AIMODEL_STEP") {
            None => None,
            Some(v) => Some(LifecycleStep::parse(&v).ok_or(SettingsError::Invalid {
                var: "AIMODEL_STEP",
                expected: "a step such as launch or attach-volume",
                value: v,
            })?),
        };

        let interval_secs: u64 = parse_number(
            &get,
            "AIMODEL_WAIT_INTERVAL_SECS",
            defaults.wait.interval.as_secs(),
        )?;
        let max_wait_secs: u64 = parse_number(
            &get,
            "AIMODEL_WAIT_TIMEOUT_SECS",
            defaults.wait.max_wait.as_secs(),
        )?;
        if interval_secs == 0 {
            return Err(SettingsError::Invalid {
                var: "AIMODEL_WAIT_INTERVAL_SECS",
                expected: "a positive number of seconds",
                value: "0".to_string(),
            });
        }

        Ok(Self {
            provider,
            paths: ParameterPaths::new(
                get("AIMODEL_PARAMETER_PREFIX")
                    .as_deref()
                    .unwrap_or(DEFAULT_PARAMETER_PREFIX),
            ),
            key_pair_name: get("AIMODEL_KEY_PAIR_NAME").unwrap_or(defaults.key_pair_name),
            instance_name: get("AIMODEL_INSTANCE_NAME").unwrap_or(defaults.instance_name),
            allow_secret_overwrite: parse_bool(&get, "AIMODEL_ALLOW_SECRET_OVERWRITE", false)?,
            wait: WaitPolicy::new(
                Duration::from_secs(interval_secs),
                Duration::from_secs(max_wait_secs),
            ),
            delete_key_pair_on_terminate: parse_bool(
                &get,
                "AIMODEL_DELETE_KEY_PAIR_ON_TERMINATE",
                false,
            )?,
            aws_region: get("AWS_REGION"),
            aws_max_attempts: parse_number(
                &get,
                "AIMODEL_AWS_MAX_ATTEMPTS",
                defaults.aws_max_attempts,
            )?,
            instance_id: get(INSTANCE_ID_ENV),
            log_format,
            step,
        })
    }
}

fn parse_bool<G>(get: &G, var: &'static str, default: bool) -> Result<bool, SettingsError>
where
    G: Fn(&str) -> Option<String>,
{
    match get(var).map(|v| v.to_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(SettingsError::Invalid {
            var,
            expected: "a boolean",
            value: other.to_string(),
        }),
    }
}

fn parse_number<G, T>(get: &G, var: &'static str, default: T) -> Result<T, SettingsError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(var) {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| SettingsError::Invalid {
            var,
            expected: "a non-negative integer",
            value: v,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings, SettingsError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.provider, ProviderKind::Aws);
        assert_eq!(s.paths.prefix(), "/ai-model");
        assert_eq!(s.key_pair_name, "ai-model-key");
        assert!(!s.allow_secret_overwrite);
        assert!(!s.delete_key_pair_on_terminate);
        assert_eq!(s.wait.interval, Duration::from_secs(5));
        assert_eq!(s.wait.max_wait, Duration::from_secs(600));
        assert_eq!(s.instance_id, None);
        assert_eq!(s.log_format, LogFormat::Pretty);
    }

    #[test]
    fn overrides_are_applied() {
        let s = settings(&[
            ("AIMODEL_PROVIDER", "Mock"),
            ("AIMODEL_PARAMETER_PREFIX", "/staging/ai-model/"),
            ("AIMODEL_WAIT_TIMEOUT_SECS", "120"),
            ("AIMODEL_DELETE_KEY_PAIR_ON_TERMINATE", "yes"),
            ("INSTANCE_ID", " i-0abc "),
            ("AIMODEL_LOG_FORMAT", "json"),
        ])
        .unwrap();
        assert_eq!(s.provider, ProviderKind::Mock);
        assert_eq!(s.paths.volume_id(), "/staging/ai-model/volume-id");
        assert_eq!(s.wait.max_wait, Duration::from_secs(120));
        assert!(s.delete_key_pair_on_terminate);
        assert_eq!(s.instance_id.as_deref(), Some("i-0abc"));
        assert_eq!(s.log_format, LogFormat::Json);
        assert_eq!(s.step, None);
    }

    #[test]
    fn served_step_is_parsed() {
        let s = settings(&[("AIMODEL_STEP", "configure-alarm")]).unwrap();
        assert_eq!(s.step, Some(LifecycleStep::ConfigureAlarm));
        let err = settings(&[("AIMODEL_STEP", "reboot")]).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid { var: "AIMODEL_STEP", .. }));
    }

    #[test]
    fn blank_instance_id_is_unset() {
        let s = settings(&[("INSTANCE_ID", "   ")]).unwrap();
        assert_eq!(s.instance_id, None);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let err = settings(&[("AIMODEL_ALLOW_SECRET_OVERWRITE", "maybe")]).unwrap_err();
        assert!(matches!(
            err,
            SettingsError::Invalid { var: "AIMODEL_ALLOW_SECRET_OVERWRITE", .. }
        ));
        assert!(settings(&[("AIMODEL_WAIT_TIMEOUT_SECS", "ten")]).is_err());
        assert!(settings(&[("AIMODEL_WAIT_INTERVAL_SECS", "0")]).is_err());
        assert!(settings(&[("AIMODEL_PROVIDER", "gcp")]).is_err());
    }
}
