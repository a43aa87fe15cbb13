use aimodel_common::payload::{InstanceEvent, UpdateStopTargetEvent};
use aimodel_functions::provider_manager::ProviderManager;
use aimodel_functions::workflow::{self, TaskTargets};
use aimodel_functions::{
    alarm_configurator, handler, launcher, logger, stop_target_updater, terminator,
    volume_attacher, Settings,
};
use aimodel_providers::CloudClients;
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use lambda_runtime::{service_fn, LambdaEvent};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::io::Read;
use std::sync::Arc;

/// Lifecycle steps of the AI model instance. Each subcommand reads its event as JSON
/// (`--event` or stdin) and prints its result as JSON on stdout.
///
/// Without a subcommand the binary serves function invocations for the step named by
/// `AIMODEL_STEP`.
#[derive(Parser)]
#[command(name = "aimodel-functions", version, about)]
struct Cli {
    /// Input event; read from stdin when omitted.
    #[arg(long, global = true)]
    event: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Ensure the key pair and launch one instance.
    Launch,
    /// Wait for the instance to run and attach the data volume.
    AttachVolume,
    /// Create the low-CPU alarm that stops the instance.
    ConfigureAlarm,
    /// Point the stop function at the instance.
    UpdateStopTarget,
    /// Terminate the instance named by INSTANCE_ID and clean up after it.
    Terminate,
    /// Run the whole provisioning sequence in-process.
    Provision {
        /// Stop function to retarget; defaults to the stop-lambda-arn parameter.
        #[arg(long)]
        function_name: Option<String>,
    },
    /// Print the orchestrator state machine definition.
    WorkflowDefinition {
        #[arg(long, env = "AIMODEL_LAUNCH_FUNCTION_ARN")]
        launch_function: String,
        #[arg(long, env = "AIMODEL_ATTACH_FUNCTION_ARN")]
        attach_function: String,
        #[arg(long, env = "AIMODEL_ALARM_FUNCTION_ARN")]
        alarm_function: String,
        #[arg(long, env = "AIMODEL_UPDATE_FUNCTION_ARN")]
        update_function: String,
        #[arg(long, env = "AIMODEL_STOP_FUNCTION_ARN")]
        stop_function: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();
    let settings = Settings::from_env().context("invalid configuration")?;
    logger::init_tracing(settings.log_format);

    if let Some(Command::WorkflowDefinition {
        launch_function,
        attach_function,
        alarm_function,
        update_function,
        stop_function,
    }) = &cli.command
    {
        let targets = TaskTargets {
            launch: launch_function.clone(),
            attach_volume: attach_function.clone(),
            configure_alarm: alarm_function.clone(),
            update_stop_target: update_function.clone(),
            stop_function: stop_function.clone(),
            // Leave the attach step room to report its own timeout.
            attach_timeout_secs: Some(settings.wait.max_wait.as_secs() + 60),
        };
        return emit(&workflow::state_machine_definition(&targets));
    }

    tracing::info!(provider = settings.provider.as_str(), "starting");
    let clients = ProviderManager::clients(&settings)
        .await
        .context("failed to initialize provider clients")?;

    let Some(command) = cli.command else {
        return serve(clients, settings).await;
    };
    match command {
        Command::Launch => emit(&launcher::launch(&clients, &settings).await?),
        Command::AttachVolume => {
            let event: InstanceEvent = read_event(cli.event)?;
            emit(&volume_attacher::attach_volume(&clients, &settings, &event).await?)
        }
        Command::ConfigureAlarm => {
            let event: InstanceEvent = read_event(cli.event)?;
            emit(&alarm_configurator::configure_alarm(&clients, &settings, &event).await?)
        }
        Command::UpdateStopTarget => {
            let event: UpdateStopTargetEvent = read_event(cli.event)?;
            emit(&stop_target_updater::update_stop_target(&clients, &settings, &event).await?)
        }
        // Cleanup failures come back as a 500 payload, not an error.
        Command::Terminate => emit(&terminator::terminate(&clients, &settings).await?),
        Command::Provision { function_name } => emit(
            &workflow::run_provisioning(&clients, &settings, function_name.as_deref()).await?,
        ),
        Command::WorkflowDefinition { .. } => bail!("workflow definition already handled"),
    }
}

/// Poll the function runtime for invocations until the sandbox is shut down.
async fn serve(clients: CloudClients, settings: Settings) -> anyhow::Result<()> {
    let step = settings
        .step
        .context("AIMODEL_STEP must name the step this function runs")?;
    tracing::info!(step = step.task_name(), "serving invocations");

    let settings = Arc::new(settings);
    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let clients = clients.clone();
        let settings = Arc::clone(&settings);
        async move {
            handler::handle(&clients, &settings, event.payload)
                .await
                .map_err(lambda_runtime::Error::from)
        }
    }))
    .await
    .map_err(|e| anyhow::anyhow!(e))
    .context("function runtime stopped")
}

fn read_event<T: DeserializeOwned>(event: Option<String>) -> anyhow::Result<T> {
    parse_event(event, std::io::stdin())
}

fn parse_event<T, R>(event: Option<String>, mut input: R) -> anyhow::Result<T>
where
    T: DeserializeOwned,
    R: Read,
{
    let raw = match event {
        Some(raw) => raw,
        None => {
            let mut buf = String::new();
            input
                .read_to_string(&mut buf)
                .context("failed to read event from stdin")?;
            buf
        }
    };
    if raw.trim().is_empty() {
        bail!("no input event (pass --event or pipe JSON on stdin)");
    }
    serde_json::from_str(&raw).context("invalid input event")
}

fn emit<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", render(value)?);
    Ok(())
}

fn render<T: Serialize>(value: &T) -> anyhow::Result<String> {
    serde_json::to_string_pretty(value).context("failed to serialize result")
}
