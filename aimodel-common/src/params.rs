/// Parameter-store layout shared by every step.
///
/// Static configuration lives directly under the prefix. Bookkeeping values written
/// during a run are namespaced by instance id so concurrent runs never share a key.
pub const DEFAULT_PARAMETER_PREFIX: &str = "/ai-model";

const VOLUME_ID: &str = "volume-id";
const LAUNCH_TEMPLATE_ID: &str = "launch-template-id";
const PUBLIC_SUBNET_ID: &str = "public-subnet-id";
const SECURITY_GROUP_ID: &str = "security-group-id";
const STOP_LAMBDA_ARN: &str = "stop-lambda-arn";
const CLOUDWATCH_ALARM_NAME: &str = "cloudwatch-alarm-name";
const KEY_PAIR_NAME: &str = "key-pair-name";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterPaths {
    prefix: String,
}

impl Default for ParameterPaths {
    fn default() -> Self {
        Self::new(DEFAULT_PARAMETER_PREFIX)
    }
}

impl ParameterPaths {
    /// Build paths under `prefix`. Surrounding whitespace and trailing slashes are dropped,
    /// and a leading slash is added when missing.
    pub fn new(prefix: &str) -> Self {
        let trimmed = prefix.trim().trim_end_matches('/');
        let prefix = if trimmed.is_empty() {
            DEFAULT_PARAMETER_PREFIX.to_string()
        } else if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("/{}", trimmed)
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn path(&self, leaf: &str) -> String {
        format!("{}/{}", self.prefix, leaf)
    }

    pub fn volume_id(&self) -> String {
        self.path(VOLUME_ID)
    }

    pub fn launch_template_id(&self) -> String {
        self.path(LAUNCH_TEMPLATE_ID)
    }

    pub fn public_subnet_id(&self) -> String {
        self.path(PUBLIC_SUBNET_ID)
    }

    pub fn security_group_id(&self) -> String {
        self.path(SECURITY_GROUP_ID)
    }

    pub fn stop_lambda_arn(&self) -> String {
        self.path(STOP_LAMBDA_ARN)
    }

    pub fn key_pair_name(&self) -> String {
        self.path(KEY_PAIR_NAME)
    }

    /// Un-namespaced alarm-name key. Older deployments wrote a single value here, which
    /// concurrent runs clobbered. Read-only for operators; nothing in this workspace writes it.
    pub fn legacy_alarm_name(&self) -> String {
        self.path(CLOUDWATCH_ALARM_NAME)
    }

    /// Alarm-name bookkeeping key for one instance.
    pub fn alarm_name_for(&self, instance_id: &str) -> String {
        format!("{}/{}", self.legacy_alarm_name(), instance_id.trim())
    }
}
