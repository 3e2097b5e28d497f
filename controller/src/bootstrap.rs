//! Starting a controller and making it addressable.

use std::sync::Arc;

use bucket_core::{Clock, ConfigBuilder, ConfigError, MonotonicClock};
use thiserror::Error;
use tracing::info;

use crate::address::Address;
use crate::controller::Controller;
use crate::handle::ControllerHandle;
use crate::registry::{Directory, RegistryError};

/// Reasons a controller could not be started. Nothing is left running when one
/// of these is returned.
#[derive(Debug, Error, PartialEq)]
pub enum StartError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("could not register controller: {0}")]
    Registry(#[from] RegistryError),
}

/// Everything needed to start one controller.
#[derive(Clone, Debug, Default)]
pub struct ControllerOptions {
    pub config: ConfigBuilder,
    /// Defaults to [`Address::default`].
    pub address: Option<Address>,
}

/// Validates the configuration, spawns the controller and registers it.
///
/// Must be called from within a Tokio runtime.
pub fn start(
    options: ControllerOptions,
    directory: &Directory,
) -> Result<ControllerHandle, StartError> {
    start_with_clock(options, directory, Arc::new(MonotonicClock::new()))
}

/// Like [`start`], with an explicit time source.
pub fn start_with_clock(
    options: ControllerOptions,
    directory: &Directory,
    clock: Arc<dyn Clock>,
) -> Result<ControllerHandle, StartError> {
    let config = options.config.build()?;
    let address = options.address.unwrap_or_default();

    let summary = format!(
        "max_accumulated={} refill={} interval_ms={}",
        config.max_accumulated, config.refill, config.interval_ms
    );
    let (handle, _task) = Controller::new(config, clock).spawn();

    if let Err(e) = directory.register(&address, handle.clone()) {
        handle.shutdown();
        return Err(e.into());
    }

    info!(
        namespace = handle.namespace(),
        address = %address,
        config = %summary,
        "controller registered"
    );
    Ok(handle)
}
