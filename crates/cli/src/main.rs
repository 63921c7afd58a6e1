// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! leash - run a command while holding a distributed lease lock

mod config;
mod logging;

use anyhow::Result;
use clap::Parser;
use config::{Backend, Overrides, Settings};
use leash_adapters::{RedisClient, TracedClient};
use leash_core::{AcquireOptions, Client, ExecOptions, HeartbeatConfig, LockManager, MemoryClient};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::process::Command;

#[derive(Parser)]
#[command(
    name = "leash",
    version,
    about = "Run a command while holding a distributed lease lock"
)]
struct Cli {
    /// TOML settings file
    #[arg(long, env = "LEASH_CONFIG")]
    config: Option<PathBuf>,

    /// Lease store to use
    #[arg(long, value_enum)]
    backend: Option<Backend>,

    /// Name of the lock to hold while the command runs
    #[arg(long)]
    lock: String,

    /// Identity to own the lock under (random by default)
    #[arg(long)]
    client_id: Option<String>,

    /// Lease TTL in seconds [default: 30]
    #[arg(long)]
    lock_ttl_seconds: Option<u64>,

    /// How long to wait for a held lock before giving up [default: 0]
    #[arg(long)]
    max_wait_seconds: Option<u64>,

    /// Payload stored with the lease
    #[arg(long)]
    data: Option<String>,

    /// Disable logging
    #[arg(short, long)]
    quiet: bool,

    /// Write logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    #[arg(long)]
    redis_url: Option<String>,

    #[arg(long)]
    redis_namespace: Option<String>,

    /// Command to run, after `--`
    #[arg(last = true, required = true, value_name = "COMMAND")]
    command: Vec<String>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        Overrides {
            backend: self.backend,
            client_id: self.client_id.clone(),
            ttl_seconds: self.lock_ttl_seconds,
            max_wait_seconds: self.max_wait_seconds,
            data: self.data.clone(),
            redis_url: self.redis_url.clone(),
            redis_namespace: self.redis_namespace.clone(),
        }
    }

    fn settings(&self) -> Result<Settings> {
        let file = match &self.config {
            Some(path) => Settings::load(path)?,
            None => Settings::default(),
        };
        let settings = file.apply(self.overrides());
        settings.validate()?;
        Ok(settings)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match cli.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let _guard = match logging::setup_logging(cli.quiet, cli.log_file.as_deref()) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let code = match settings.backend {
        Backend::Memory => run(TracedClient::new(MemoryClient::new()), &cli, &settings).await,
        Backend::Redis => match RedisClient::connect(settings.redis.clone()).await {
            Ok(client) => run(TracedClient::new(client), &cli, &settings).await,
            Err(e) => {
                tracing::error!(url = %settings.redis.url, error = %e, "cannot connect to redis");
                if cli.quiet {
                    eprintln!("Error: cannot connect to redis: {e}");
                }
                return ExitCode::FAILURE;
            }
        },
    };

    // -1 becomes 255, like any exit status outside 0..=255
    ExitCode::from((code & 0xff) as u8)
}

/// Run the command under the lock and return its exit code
async fn run<C: Client>(mut client: C, cli: &Cli, settings: &Settings) -> i32 {
    if let Some(id) = &settings.client_id {
        client.set_id(id.clone());
    }

    let defaults = AcquireOptions::new(settings.ttl)
        .with_max_wait(settings.max_wait)
        .with_data(settings.data.clone());
    let mut manager = LockManager::new(client, defaults)
        .with_heartbeat(HeartbeatConfig::default().with_tick(settings.heartbeat_tick));

    let (program, args) = match cli.command.split_first() {
        Some(split) => split,
        None => return -1,
    };
    let mut command = Command::new(program);
    command.args(args);

    let options = ExecOptions::default().with_kill_grace(settings.kill_grace);
    match manager.exec(&cli.lock, command, options).await {
        Ok(code) => {
            tracing::info!(lock = %cli.lock, code, "command finished");
            code
        }
        Err(e) => {
            tracing::error!(lock = %cli.lock, error = %e, "command failed");
            e.exit_code()
        }
    }
}
