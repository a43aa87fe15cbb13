// Common test fixtures: a mock cloud carrying every parameter the steps read
#![allow(dead_code)]

use aimodel_common::InstanceState;
use aimodel_functions::settings::Settings;
use aimodel_providers::mock::MockCloud;
use aimodel_providers::CloudClients;
use std::sync::Arc;

pub const VOLUME_ID: &str = "vol-0aaaabbbbccccdddd";
pub const LAUNCH_TEMPLATE_ID: &str = "lt-0123456789abcdef0";
pub const SUBNET_ID: &str = "subnet-0123456789abcdef0";
pub const SECURITY_GROUP_ID: &str = "sg-0123456789abcdef0";
pub const STOP_FUNCTION_ARN: &str =
    "arn:aws:lambda:eu-west-1:123456789012:function:ai-model-stop-instance";
pub const KEY_NAME: &str = "ai-model-key";
pub const KEY_SECRET: &str = "EC2KeyPair-ai-model-key";

pub struct TestCloud {
    pub cloud: Arc<MockCloud>,
    pub clients: CloudClients,
    pub settings: Settings,
}

impl TestCloud {
    /// Settings as a deployed function would see them before the stop target is set.
    pub fn new() -> Self {
        let cloud = MockCloud::new();
        let settings = Settings::default();
        let paths = &settings.paths;
        cloud.set_parameter(&paths.volume_id(), VOLUME_ID);
        cloud.set_parameter(&paths.launch_template_id(), LAUNCH_TEMPLATE_ID);
        cloud.set_parameter(&paths.public_subnet_id(), SUBNET_ID);
        cloud.set_parameter(&paths.security_group_id(), SECURITY_GROUP_ID);
        cloud.set_parameter(&paths.stop_lambda_arn(), STOP_FUNCTION_ARN);
        cloud.seed_function(STOP_FUNCTION_ARN, &[("LOG_LEVEL", "info")]);
        let clients = cloud.clients();
        Self {
            cloud,
            clients,
            settings,
        }
    }

    pub fn with_running_instance(self, instance_id: &str) -> Self {
        self.cloud.seed_instance(instance_id, InstanceState::Running);
        self
    }

    /// Settings of the stop function once the updater has pointed it at `instance_id`.
    pub fn stop_function_settings(&self) -> Settings {
        let env = self
            .cloud
            .environment(STOP_FUNCTION_ARN)
            .expect("stop function is seeded");
        Settings {
            instance_id: env.get("INSTANCE_ID").cloned(),
            ..self.settings.clone()
        }
    }
}
