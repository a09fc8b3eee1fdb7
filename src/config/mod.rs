//! Configuration loading and validation.
//!
//! A config file declares the host-wide settings plus a map of named server
//! descriptors. Loading expands `${NAME}` environment references (with any
//! `.env` file in the process's current directory merged in, system
//! environment taking precedence), then validates the result: unique names,
//! an acyclic dependency graph, and stdio-only transports.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod env;
pub mod graph;
pub mod loader;
pub mod validation;

use crate::types::ServerDescriptor;

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub host: HostSettings,
    pub servers: HashMap<String, ServerDescriptor>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HostSettings {
    #[serde(default = "default_call_timeout_ms")]
    pub call_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            call_timeout_ms: default_call_timeout_ms(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            cache: CacheSettings::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_cache_capacity")]
    pub capacity: usize,
    #[serde(default = "default_cache_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_cache_sweep_seconds")]
    pub sweep_interval_seconds: u64,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: default_cache_capacity(),
            ttl_seconds: default_cache_ttl_seconds(),
            sweep_interval_seconds: default_cache_sweep_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct ObservabilityConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_call_timeout_ms() -> u64 {
    10_000
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_base_ms() -> u64 {
    100
}
fn default_shutdown_grace_ms() -> u64 {
    3_000
}
fn default_cache_capacity() -> usize {
    1_000
}
fn default_cache_ttl_seconds() -> u64 {
    300
}
fn default_cache_sweep_seconds() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
