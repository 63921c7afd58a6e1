// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Settings file and command-line overrides
//!
//! Precedence: explicit flags, then the TOML file, then built-in defaults.

use anyhow::{Context, Result};
use leash_adapters::RedisOptions;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// Lease store the command runs against
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Process-local table; only useful for trying things out
    #[default]
    Memory,
    Redis,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub backend: Backend,
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
    #[serde(with = "humantime_serde")]
    pub max_wait: Duration,
    pub data: String,
    #[serde(with = "humantime_serde")]
    pub heartbeat_tick: Duration,
    #[serde(with = "humantime_serde")]
    pub kill_grace: Duration,
    pub client_id: Option<String>,
    pub redis: RedisOptions,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            backend: Backend::Memory,
            ttl: Duration::from_secs(30),
            max_wait: Duration::ZERO,
            data: String::new(),
            heartbeat_tick: Duration::from_millis(10),
            kill_grace: Duration::from_secs(2),
            client_id: None,
            redis: RedisOptions::default(),
        }
    }
}

/// Values given explicitly on the command line
#[derive(Clone, Debug, Default)]
pub struct Overrides {
    pub backend: Option<Backend>,
    pub client_id: Option<String>,
    pub ttl_seconds: Option<u64>,
    pub max_wait_seconds: Option<u64>,
    pub data: Option<String>,
    pub redis_url: Option<String>,
    pub redis_namespace: Option<String>,
}

impl Settings {
    /// Read settings from a TOML file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn apply(mut self, overrides: Overrides) -> Self {
        if let Some(backend) = overrides.backend {
            self.backend = backend;
        }
        if let Some(id) = overrides.client_id {
            self.client_id = Some(id);
        }
        if let Some(secs) = overrides.ttl_seconds {
            self.ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = overrides.max_wait_seconds {
            self.max_wait = Duration::from_secs(secs);
        }
        if let Some(data) = overrides.data {
            self.data = data;
        }
        if let Some(url) = overrides.redis_url {
            self.redis.url = url;
        }
        if let Some(namespace) = overrides.redis_namespace {
            self.redis.namespace = namespace;
        }
        self
    }

    /// Reject values no backend can honour
    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            anyhow::bail!("lock ttl must be positive");
        }
        if self.heartbeat_tick.is_zero() {
            anyhow::bail!("heartbeat tick must be positive");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
