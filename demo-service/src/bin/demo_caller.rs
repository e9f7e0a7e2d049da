// SPDX-License-Identifier: BSD-3-Clause
// Copyright 2025. Triad National Security, LLC.

use std::sync::Arc;

use clap::Parser;

use demo_service::{LoginRequest, LoginResponse};
use rpc_caller::CallerChannel;
use rpc_config::Config;
use rpc_controller::Controller;
use rpc_registry::{CoordinationStore, DEFAULT_SESSION_TIMEOUT};
use rpc_wire::RpcPayload;

#[derive(Parser)]
struct Cli {
    #[arg(long)]
    config: String,

    #[arg(long)]
    name: String,

    #[arg(long)]
    pwd: String,
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

    let channel = CallerChannel::new(registry);
    let mut controller = Controller::new();

    let request = LoginRequest {
        name: args.name,
        pwd: args.pwd,
    };
    let response_bytes = channel.call(
        &mut controller,
        "UserService",
        "Login",
        &request.serialize_to_bytes()?,
    );

    if controller.failed() {
        eprintln!("call failed: {}", controller.error_text());
        std::process::exit(1);
    }

    let mut response = LoginResponse::default();
    response.parse_from_bytes(&response_bytes)?;
    println!("success={} message={}", response.success, response.message);
    Ok(())
}
