// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::sync::Arc;

use clap::Parser;

use demo_service::UserService;
use rpc_config::Config;
use rpc_provider::ProviderServer;
use rpc_registry::{CoordinationStore, DEFAULT_SESSION_TIMEOUT};

#[derive(Parser)]
struct Cli {
    /// Path to a `key=value` deployment config (rpcserverip, rpcserverport,
    /// zookeeperip, zookeeperport).
    #[arg(long)]
    config: String,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let args = Cli::parse();
    let config = Config::from_file(&args.config)?;

    let registry = Arc::new(CoordinationStore::new(
        config.zookeeper_connect_string(),
        DEFAULT_SESSION_TIMEOUT,
    ));
    registry.start()?;

    let mut server = ProviderServer::new().with_registry(Arc::clone(&registry));
    server.notify_service(Arc::new(UserService::default()))?;

    server.run(&config.rpc_server_ip, config.rpc_server_port)?;
    Ok(())
}
