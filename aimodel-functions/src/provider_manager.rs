use crate::settings::{ProviderKind, Settings};
use aimodel_providers::CloudClients;

#[derive(Debug, thiserror::Error)]
pub enum ProviderSelectionError {
    #[error("provider `{0}` is not compiled in (enable the provider-{0} feature)")]
    NotCompiled(&'static str),
}

pub struct ProviderManager;

impl ProviderManager {
    /// Build the clients for the provider selected in settings.
    pub async fn clients(settings: &Settings) -> Result<CloudClients, ProviderSelectionError> {
        match settings.provider {
            ProviderKind::Aws => Self::aws(settings).await,
            ProviderKind::Mock => Self::mock(settings),
        }
    }

    #[cfg(feature = "provider-aws")]
    async fn aws(settings: &Settings) -> Result<CloudClients, ProviderSelectionError> {
        Ok(aimodel_providers::aws::load_clients(
            settings.aws_region.as_deref(),
            settings.aws_max_attempts,
        )
        .await)
    }

    #[cfg(not(feature = "provider-aws"))]
    async fn aws(_settings: &Settings) -> Result<CloudClients, ProviderSelectionError> {
        Err(ProviderSelectionError::NotCompiled(ProviderKind::Aws.as_str()))
    }

    /// In-memory cloud seeded with a complete parameter set, for dry runs.
    #[cfg(feature = "provider-mock")]
    fn mock(settings: &Settings) -> Result<CloudClients, ProviderSelectionError> {
        use aimodel_common::InstanceState;
        use aimodel_providers::mock::MockCloud;

        let cloud = MockCloud::new();
        let paths = &settings.paths;
        cloud.set_parameter(&paths.volume_id(), MOCK_VOLUME_ID);
        cloud.set_parameter(&paths.launch_template_id(), MOCK_LAUNCH_TEMPLATE_ID);
        cloud.set_parameter(&paths.public_subnet_id(), MOCK_SUBNET_ID);
        cloud.set_parameter(&paths.security_group_id(), MOCK_SECURITY_GROUP_ID);
        cloud.set_parameter(&paths.stop_lambda_arn(), MOCK_STOP_FUNCTION_ARN);
        cloud.seed_function(MOCK_STOP_FUNCTION_ARN, &[]);
        if let Some(instance_id) = &settings.instance_id {
            cloud.seed_instance(instance_id, InstanceState::Running);
        }
        Ok(cloud.clients())
    }

    #[cfg(not(feature = "provider-mock"))]
    fn mock(_settings: &Settings) -> Result<CloudClients, ProviderSelectionError> {
        Err(ProviderSelectionError::NotCompiled(ProviderKind::Mock.as_str()))
    }
}

#[cfg(feature = "provider-mock")]
const MOCK_VOLUME_ID: &str = "vol-0mock0000000000001";
#[cfg(feature = "provider-mock")]
const MOCK_LAUNCH_TEMPLATE_ID: &str = "lt-0mock0000000000001";
#[cfg(feature = "provider-mock")]
const MOCK_SUBNET_ID: &str = "subnet-0mock000000001";
#[cfg(feature = "provider-mock")]
const MOCK_SECURITY_GROUP_ID: &str = "sg-0mock0000000000001";
#[cfg(feature = "provider-mock")]
const MOCK_STOP_FUNCTION_ARN: &str = "arn:aws:lambda:eu-west-1:000000000000:function:ai-model-stop";
