// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Runs a bridge for every device of a configuration file until Ctrl-C.
//!
//! ```text
//! pushbot-bridge <config.json>
//! ```
//!
//! Commands are read from stdin, one per line:
//!
//! - `on <name|address>`: activate a device
//! - `status`: log the state of every device
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::process::ExitCode;
use std::sync::Arc;

use pushbot_bridge::adapter::BluestAdapter;
use pushbot_bridge::config::BridgeConfig;
use pushbot_bridge::event::BridgeEvent;
use pushbot_bridge::manager::DeviceRegistry;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let Some(path) = std::env::args().nth(1) else {
        eprintln!("usage: pushbot-bridge <config.json>");
        return ExitCode::from(2);
    };

    let config = match BridgeConfig::load(&path) {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let adapter = match BluestAdapter::new().await {
        Ok(adapter) => Arc::new(adapter),
        Err(e) => {
            tracing::error!(error = %e, "Failed to open Bluetooth adapter");
            return ExitCode::FAILURE;
        }
    };

    let registry = DeviceRegistry::from_config(&config, adapter);
    if registry.is_empty() {
        tracing::error!(path = %path, "No valid device in configuration");
        return ExitCode::FAILURE;
    }

    let mut events = registry.subscribe();
    let mut commands = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    registry.spawn_discovery();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = commands.next_line(), if stdin_open => match line {
                Ok(Some(line)) => run_command(&registry, line.trim()),
                Ok(None) => stdin_open = false,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to read command");
                    stdin_open = false;
                }
            },
            event = events.recv() => match event {
                Ok(event) => log_event(&registry, &event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event log fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    tracing::info!("Shutting down");
    registry.shutdown().await;
    ExitCode::SUCCESS
}

fn run_command(registry: &DeviceRegistry<BluestAdapter>, line: &str) {
    let mut words = line.split_whitespace();
    match (words.next(), words.next()) {
        (Some("on"), Some(target)) => {
            let controller = registry.find_by_address(target).or_else(|| {
                registry
                    .controllers()
                    .iter()
                    .find(|c| c.config().name.eq_ignore_ascii_case(target))
            });
            match controller {
                Some(controller) => controller.accessory().set(true),
                None => tracing::warn!(device = target, "No such device"),
            }
        }
        (Some("status"), None) => {
            for controller in registry.controllers() {
                let status = controller.status();
                tracing::info!(
                    device = %controller.config().name,
                    phase = %status.phase,
                    switch_on = status.switch_on,
                    heartbeat = status.heartbeat_active,
                    "Status"
                );
            }
        }
        (None, _) => {}
        _ => tracing::warn!(command = line, "Unknown command"),
    }
}

fn log_event(registry: &DeviceRegistry<BluestAdapter>, event: &BridgeEvent) {
    let device = registry
        .get(event.device_id())
        .map_or("?", |c| c.config().name.as_str());

    match event {
        BridgeEvent::DeviceAdded { .. } => tracing::info!(device, "Device added"),
        BridgeEvent::ConnectionChanged {
            connected, error, ..
        } => tracing::info!(device, connected, error = ?error, "Connection changed"),
        BridgeEvent::SwitchChanged { on, .. } => tracing::info!(device, on, "Switch changed"),
        BridgeEvent::PushCompleted {
            delivered, attempts, ..
        } => tracing::info!(device, delivered, attempts, "Push completed"),
    }
}
