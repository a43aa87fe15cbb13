use crate::error::{StepError, StepResult};
use aimodel_providers::ParameterStore;

/// Read a configuration parameter that has no default. Blank values count as missing.
pub async fn require_parameter(parameters: &dyn ParameterStore, name: &str) -> StepResult<String> {
    match parameters.get_parameter(name).await? {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(StepError::MissingParameter(name.to_string())),
    }
}
