//! Config-level validation: uniqueness, transport support, dependency graph.

use crate::config::Config;
use crate::config::graph::topological_order;
use crate::error::{Error, Result};
use crate::types::TransportKind;
use std::collections::{HashMap, HashSet};

impl Config {
    /// Validates the config, returning the server startup order on success.
    pub fn validate(&self) -> Result<Vec<String>> {
        if self.servers.is_empty() {
            tracing::warn!("config declares no servers");
        }

        let mut seen_lowercase: HashSet<String> = HashSet::new();
        for name in self.servers.keys() {
            if name.is_empty() {
                return Err(Error::Config("server name cannot be empty".to_string()));
            }
            let lower = name.to_ascii_lowercase();
            if !seen_lowercase.insert(lower) {
                return Err(Error::Config(format!(
                    "server name '{name}' collides case-insensitively with another server"
                )));
            }
        }

        for (name, descriptor) in &self.servers {
            if descriptor.transport != TransportKind::Stdio {
                return Err(Error::Config(format!(
                    "server '{name}' declares transport '{}', but only 'stdio' is supported",
                    descriptor.transport
                )));
            }
            if descriptor.command.as_deref().unwrap_or("").is_empty() {
                return Err(Error::Config(format!(
                    "server '{name}' has no command to launch"
                )));
            }
            for dep in &descriptor.dependencies {
                if dep == name {
                    return Err(Error::Config(format!("server '{name}' depends on itself")));
                }
            }
        }

        if self.host.call_timeout_ms == 0 {
            return Err(Error::Config("call_timeout_ms must be non-zero".to_string()));
        }
        if self.host.cache.enabled {
            if self.host.cache.capacity == 0 {
                return Err(Error::Config("cache capacity must be non-zero".to_string()));
            }
            if self.host.cache.ttl_seconds == 0 {
                return Err(Error::Config("cache ttl_seconds must be non-zero".to_string()));
            }
        }

        let names: Vec<String> = self.servers.keys().cloned().collect();
        let dependencies: HashMap<String, Vec<String>> = self
            .servers
            .iter()
            .map(|(name, descriptor)| (name.clone(), descriptor.dependencies.clone()))
            .collect();

        topological_order(&names, &dependencies)
    }
}
