// Library entry point for the binary and the integration tests

pub mod alarm_configurator;
pub mod error;
pub mod handler;
pub mod launcher;
pub mod logger;
pub mod parameters;
pub mod provider_manager;
pub mod settings;
pub mod stop_target_updater;
pub mod terminator;
pub mod volume_attacher;
pub mod wait;
pub mod workflow;

pub use error::{StepError, StepResult};
pub use settings::Settings;
