// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// Control-plane server supervising agent runs: event journal, approval
/// and input rendezvous, and live subscriber fan-out.
#[derive(Debug, Parser)]
#[command(name = "tetherd", version, about)]
pub struct Config {
    /// Host address to bind to.
    #[arg(long, env = "TETHER_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// HTTP port to listen on.
    #[arg(long, env = "TETHER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Bearer token for API authentication. If unset, auth is disabled.
    #[arg(long, env = "TETHER_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Default long-poll deadline for interaction requests, in milliseconds.
    #[arg(long, env = "TETHER_WAIT_DEADLINE_MS", default_value_t = 300_000)]
    pub wait_deadline_ms: u64,

    /// Log format (json or text).
    #[arg(long, env = "TETHER_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "TETHER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn wait_deadline(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.wait_deadline_ms)
    }
}

/// Initialize tracing from config. Uses `try_init` so it is safe to call
/// more than once (e.g. from integration tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = if std::env::var("TETHER_LOG_LEVEL").is_err() && config.log_level == "info" {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level))
    } else {
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
