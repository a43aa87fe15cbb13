use crate::error::{StepError, StepResult};
use crate::logger;
use crate::parameters::require_parameter;
use crate::settings::Settings;
use aimodel_common::naming::key_secret_name;
use aimodel_common::payload::LaunchOutput;
use aimodel_providers::requests::LaunchRequest;
use aimodel_providers::{CloudClients, ProviderError};
use tracing::{error, info, warn};

/// What `ensure_key_pair` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPairOutcome {
    /// Key pair already present; nothing created, no secret touched.
    Existing,
    /// Key pair created and its private material stored.
    Created,
    /// Another run created the key between our check and our create. Its material
    /// is not ours to store.
    CreatedConcurrently,
}

/// Make sure the configured key pair exists, generating and storing it only when absent.
///
/// The secret is written at most once: a secret that already exists under the derived
/// name blocks creation unless overwriting is explicitly allowed.
pub async fn ensure_key_pair(
    clients: &CloudClients,
    settings: &Settings,
) -> StepResult<KeyPairOutcome> {
    let key_name = settings.key_pair_name.as_str();
    if clients.compute.key_pair_exists(key_name).await? {
        info!(key_name, "key pair already exists");
        return Ok(KeyPairOutcome::Existing);
    }

    let secret_name = key_secret_name(key_name);
    let secret_exists = clients.secrets.secret_exists(&secret_name).await?;
    if secret_exists && !settings.allow_secret_overwrite {
        return Err(StepError::SecretAlreadyExists(secret_name));
    }

    let material = match clients.compute.create_key_pair(key_name).await {
        Ok(material) => material,
        Err(e) if e.is_already_exists() => {
            warn!(key_name, "key pair created concurrently; leaving its secret alone");
            return Ok(KeyPairOutcome::CreatedConcurrently);
        }
        Err(e) => return Err(e.into()),
    };

    let stored = if secret_exists {
        warn!(secret = %secret_name, "overwriting existing key secret");
        clients.secrets.put_secret_value(&secret_name, &material).await
    } else {
        clients.secrets.create_secret(&secret_name, &material).await
    };
    if let Err(store_err) = stored {
        return Err(discard_unstored_key(clients, key_name, store_err).await);
    }
    info!(key_name, secret = %secret_name, "key pair created and stored");
    Ok(KeyPairOutcome::Created)
}

/// Delete a key pair whose material could not be stored, so the next launch generates
/// a fresh one instead of finding a key nobody can use.
async fn discard_unstored_key(
    clients: &CloudClients,
    key_name: &str,
    store_err: ProviderError,
) -> StepError {
    warn!(key_name, error = %store_err, "key material not stored; deleting key pair");
    match clients.compute.delete_key_pair(key_name).await {
        Ok(()) => store_err.into(),
        Err(delete_err) => {
            error!(key_name, error = %delete_err, "key pair left without stored material");
            StepError::OrphanedKeyPair {
                key_name: key_name.to_string(),
                store_error: store_err,
                delete_error: delete_err,
            }
        }
    }
}

/// Launch one instance from the configured template.
///
/// Not idempotent: a retry after a partial failure launches another instance.
pub async fn launch(clients: &CloudClients, settings: &Settings) -> StepResult<LaunchOutput> {
    logger::track("LAUNCH_INSTANCE", None, run_launch(clients, settings)).await
}

async fn run_launch(clients: &CloudClients, settings: &Settings) -> StepResult<LaunchOutput> {
    let key_outcome = ensure_key_pair(clients, settings).await?;

    let paths = &settings.paths;
    let params = &*clients.parameters;
    let launch_template_id = require_parameter(params, &paths.launch_template_id()).await?;
    let subnet_id = require_parameter(params, &paths.public_subnet_id()).await?;
    let security_group_id = require_parameter(params, &paths.security_group_id()).await?;

    let request = LaunchRequest {
        launch_template_id: launch_template_id.clone(),
        subnet_id,
        security_group_id,
        key_name: Some(settings.key_pair_name.clone()),
        name_tag: Some(settings.instance_name.clone()),
    };
    let instance_id = clients.compute.run_instance(&request).await?;
    info!(
        instance_id = %instance_id,
        launch_template_id = %launch_template_id,
        key_pair = ?key_outcome,
        "instance launched"
    );

    clients
        .parameters
        .put_parameter(&paths.key_pair_name(), &settings.key_pair_name, true)
        .await?;

    Ok(LaunchOutput {
        instance_id,
        key_pair_name: settings.key_pair_name.clone(),
        launch_template_id,
    })
}
