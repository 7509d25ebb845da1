// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;
use tracing::error;

use tether_server::config::{init_tracing, Config};

#[tokio::main]
async fn main() {
    let config = Config::parse();
    init_tracing(&config);

    if let Err(e) = tether_server::run(config).await {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
