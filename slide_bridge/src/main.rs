use std::path::PathBuf;

use anyhow::Context as _;
use tokio::sync::mpsc;
use tracing::info;

use crate::{
    communication::service::run_communication_layer,
    config::{create_default_config, init_config},
    controller_service::SlideServer,
    controllers::slides::{create_executor, create_slides},
    model::{AddressSpace as _, server::ModelServer},
};

pub mod bridge;
pub mod command_executor;
pub mod communication;
pub mod config;
pub mod controller_service;
pub mod controllers;
pub mod logging;
pub mod model;

const NOTIFICATION_CAPACITY: usize = 256;
const REQUEST_QUEUE: usize = 64;

fn should_create_config() -> bool {
    std::env::var("CREATE_CONFIG")
        .map(|val| val == "1" || val.to_lowercase() == "true")
        .unwrap_or(false)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if should_create_config() {
        create_default_config(None::<PathBuf>)?;
    }

    let (config_manager, config) = init_config().map_err(|e| {
        eprintln!("Failed to load configuration: {:#}", e);
        eprintln!("Run with CREATE_CONFIG=1 to create a default configuration file.");
        e
    })?;

    let _log_guard = logging::init(&config);
    info!(
        "Configuration loaded from {}",
        config_manager.path().display()
    );

    let mut space = ModelServer::new(NOTIFICATION_CAPACITY);
    let ns = space.register_namespace(&config.namespace);

    let (executor, sender) = create_executor(&config)?;
    executor
        .spawn()
        .context("Failed to start the serial executor")?;

    let nodes = create_slides(&config, &sender, &mut space, ns)?;
    drop(sender);

    let notifier = space.notifier();
    let (request_tx, request_rx) = mpsc::channel(REQUEST_QUEUE);
    let server = SlideServer::new(space, nodes, config.refresh_period()?);
    let addr = config.server_addr()?;

    tokio::select! {
        result = server.run(request_rx) => result,
        result = run_communication_layer(addr, request_tx, notifier) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
            Ok(())
        }
    }
}
