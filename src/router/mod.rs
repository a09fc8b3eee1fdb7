//! Single entry point from the Host façade to the supervised servers:
//! resolve the target, probe the cache, dispatch with a per-call timeout,
//! and retry timeouts with bounded exponential backoff before promoting the
//! server to `Unavailable`.
//!
//! Unlike a load-balancing router, this one never chooses among several
//! servers offering the same capability -- the registry already resolved
//! that to exactly one owner (or raised an ambiguity error) before routing
//! ever sees the call.

use crate::cache::Cache;
use crate::config::HostSettings;
use crate::error::{Error, Result};
use crate::metrics::Metrics;
use crate::process::ServerHandle;
use crate::protocol;
use crate::registry::{CapabilityRegistry, Resolved};
use crate::types::ServerState;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Backoff never waits longer than this between retries, regardless of how
/// many attempts have been made.
const MAX_BACKOFF_MS: u64 = 30_000;

pub struct Router {
    servers: Arc<DashMap<String, Arc<ServerHandle>>>,
    registry: Arc<CapabilityRegistry>,
    cache: Arc<Cache>,
    metrics: Arc<Metrics>,
    settings: HostSettings,
}

impl Router {
    pub fn new(
        servers: Arc<DashMap<String, Arc<ServerHandle>>>,
        registry: Arc<CapabilityRegistry>,
        cache: Arc<Cache>,
        metrics: Arc<Metrics>,
        settings: HostSettings,
    ) -> Self {
        Self {
            servers,
            registry,
            cache,
            metrics,
            settings,
        }
    }

    pub async fn call_tool(&self, name: &str, arguments: Value, timeout: Option<Duration>) -> Result<Value> {
        let resolved = self.registry.resolve_tool(name)?;
        self.registry.validate_tool_arguments(&resolved, &arguments)?;
        let params = serde_json::json!({ "name": resolved.name, "arguments": arguments });
        self.dispatch(&resolved, protocol::METHOD_TOOLS_CALL, Some(params), None, timeout).await
    }

    pub async fn get_prompt(&self, name: &str, arguments: Value, timeout: Option<Duration>) -> Result<Value> {
        let resolved = self.registry.resolve_prompt(name)?;
        let cache_key = format!("prompt:{}.{}:{}", resolved.server, resolved.name, arguments);
        let params = serde_json::json!({ "name": resolved.name, "arguments": arguments });
        self.dispatch(&resolved, protocol::METHOD_PROMPTS_GET, Some(params), Some(cache_key), timeout)
            .await
    }

    pub async fn read_resource(&self, uri: &str, timeout: Option<Duration>) -> Result<Value> {
        let resolved = self.registry.resolve_resource(uri)?;
        let cache_key = format!("resource:{}:{}", resolved.server, resolved.name);
        let params = serde_json::json!({ "uri": resolved.name });
        self.dispatch(&resolved, protocol::METHOD_RESOURCES_READ, Some(params), Some(cache_key), timeout)
            .await
    }

    /// Resolves, probes the cache, then executes with retry. `cache_key` is
    /// `None` for tool calls -- they are never cached.
    async fn dispatch(
        &self,
        resolved: &Resolved,
        method: &str,
        params: Option<Value>,
        cache_key: Option<String>,
        timeout_override: Option<Duration>,
    ) -> Result<Value> {
        if let Some(key) = &cache_key {
            if let Some(cached) = self.cache.get(key) {
                debug!(server = %resolved.server, method, "cache hit");
                return Ok(cached);
            }
        }

        let timeout = timeout_override.unwrap_or_else(|| Duration::from_millis(self.settings.call_timeout_ms));
        let max_attempts = self.settings.max_retries + 1;
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            let handle = self
                .servers
                .get(&resolved.server)
                .map(|entry| entry.clone())
                .ok_or_else(|| Error::Unavailable(resolved.server.clone()))?;

            if handle.state() != ServerState::Ready {
                return Err(Error::Unavailable(resolved.server.clone()));
            }

            let started = Instant::now();
            let outcome = handle.call_raw(method, params.clone(), timeout).await;
            let latency = started.elapsed();

            match outcome {
                Ok(value) => {
                    self.metrics.record(&resolved.server, method, latency, true);
                    if let Some(key) = cache_key {
                        self.cache.set(key, value.clone());
                    }
                    return Ok(value);
                }
                Err(e) if e.is_retryable() => {
                    self.metrics.record(&resolved.server, method, latency, false);
                    warn!(server = %resolved.server, method, attempt, max_attempts, "call timed out");

                    if attempt >= max_attempts {
                        self.promote_unavailable(&resolved.server);
                        return Err(Error::Unavailable(resolved.server.clone()));
                    }

                    tokio::time::sleep(self.backoff_delay(attempt)).await;
                }
                Err(e) => {
                    self.metrics.record(&resolved.server, method, latency, false);
                    return Err(e);
                }
            }
        }
    }

    /// `initial_delay * base^(attempt-1)`, capped at `MAX_BACKOFF_MS`. The
    /// base is fixed at 2 per spec; only the initial delay is configurable.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 2u64.saturating_pow(exponent);
        let millis = self.settings.backoff_base_ms.saturating_mul(factor).min(MAX_BACKOFF_MS);
        Duration::from_millis(millis)
    }

    /// Moves a server to `Unavailable` and strips it from the registry and
    /// cache after it exhausts its retry budget. Terminal for the run.
    fn promote_unavailable(&self, server: &str) {
        if let Some(handle) = self.servers.get(server) {
            handle.set_state(ServerState::Unavailable);
        }
        self.registry.unregister_server(server);
        self.cache.invalidate_server(server);
        warn!(server, "server promoted to unavailable after exhausting retries");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CacheSettings;
    use crate::process::ServerCapabilities;
    use crate::registry::CapabilityRegistry;
    use crate::types::{ServerDescriptor, Tool, TransportKind};

    fn calc_server_descriptor() -> ServerDescriptor {
        let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([a-f0-9]*\)".*/\1/p')
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([a-zA-Z/_]*\)".*/\1/p')
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"protocolVersion":"2024-11-05","capabilities":{}}}\n' "$id"
      ;;
    tools/list)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"tools":[{"name":"add"}]}}\n' "$id"
      ;;
    tools/call)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"sum":5}}\n' "$id"
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":"%s","result":{}}\n' "$id"
      ;;
  esac
done
"#;
        ServerDescriptor {
            name: "calc".to_string(),
            transport: TransportKind::Stdio,
            command: Some("sh".to_string()),
            args: vec!["-c".to_string(), script.to_string()],
            env: Default::default(),
            dependencies: vec![],
            timeout_ms: None,
        }
    }

    fn tmpl_server_descriptor(counter_path: &std::path::Path) -> ServerDescriptor {
        let script = format!(
            r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([a-f0-9]*\)".*/\1/p')
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([a-zA-Z/_]*\)".*/\1/p')
  case "$method" in
    initialize)
      printf '{{"jsonrpc":"2.0","id":"%s","result":{{"protocolVersion":"2024-11-05","capabilities":{{}}}}}}\n' "$id"
      ;;
    prompts/list)
      printf '{{"jsonrpc":"2.0","id":"%s","result":{{"prompts":[{{"name":"hello"}}]}}}}\n' "$id"
      ;;
    prompts/get)
      echo x >> "{path}"
      printf '{{"jsonrpc":"2.0","id":"%s","result":{{"text":"hi"}}}}\n' "$id"
      ;;
    *)
      printf '{{"jsonrpc":"2.0","id":"%s","result":{{}}}}\n' "$id"
      ;;
  esac
done
"#,
            path = counter_path.display()
        );
        ServerDescriptor {
            name: "tmpl".to_string(),
            transport: TransportKind::Stdio,
            command: Some("sh".to_string()),
            args: vec!["-c".to_string(), script],
            env: Default::default(),
            dependencies: vec![],
            timeout_ms: None,
        }
    }

    fn test_router(
        servers: Arc<DashMap<String, Arc<ServerHandle>>>,
        registry: Arc<CapabilityRegistry>,
        settings: HostSettings,
    ) -> (Router, Arc<Metrics>) {
        let cache = Arc::new(Cache::new(&CacheSettings::default()));
        let metrics = Arc::new(Metrics::new());
        (Router::new(servers, registry, cache, metrics.clone(), settings), metrics)
    }

    #[tokio::test]
    async fn dispatches_tool_call_and_records_metrics() {
        let descriptor = calc_server_descriptor();
        let handle = Arc::new(ServerHandle::spawn(&descriptor).unwrap());
        let settings = HostSettings::default();
        let capabilities = handle.initialize(&settings).await.unwrap();
        handle.set_state(ServerState::Ready);

        let registry = Arc::new(CapabilityRegistry::default());
        registry.register_server("calc", &capabilities);

        let servers = Arc::new(DashMap::new());
        servers.insert("calc".to_string(), handle.clone());

        let (router, metrics) = test_router(servers, registry, settings);

        let result = router.call_tool("add", serde_json::json!({}), None).await.unwrap();
        assert_eq!(result["sum"], 5);

        let snapshot = metrics.snapshot("calc").unwrap();
        assert_eq!(snapshot.request_count, 1);
        assert_eq!(snapshot.success_count, 1);

        handle.shutdown(Duration::from_millis(200)).await.unwrap();
    }

    #[tokio::test]
    async fn timeout_exhausts_retries_then_marks_unavailable() {
        let descriptor = ServerDescriptor {
            name: "slow".to_string(),
            transport: TransportKind::Stdio,
            command: Some("sleep".to_string()),
            args: vec!["5".to_string()],
            env: Default::default(),
            dependencies: vec![],
            timeout_ms: None,
        };
        let handle = Arc::new(ServerHandle::spawn(&descriptor).unwrap());
        handle.set_state(ServerState::Ready);

        let registry = Arc::new(CapabilityRegistry::default());
        registry.register_server(
            "slow",
            &ServerCapabilities {
                tools: vec![Tool {
                    name: "ping".to_string(),
                    description: None,
                    input_schema: None,
                }],
                prompts: vec![],
                resources: vec![],
            },
        );

        let servers = Arc::new(DashMap::new());
        servers.insert("slow".to_string(), handle.clone());

        let settings = HostSettings {
            call_timeout_ms: 50,
            max_retries: 1,
            backoff_base_ms: 10,
            ..HostSettings::default()
        };

        let (router, _metrics) = test_router(servers, registry.clone(), settings);

        let result = router.call_tool("ping", serde_json::json!({}), None).await;
        assert!(matches!(result, Err(Error::Unavailable(_))));
        assert_eq!(handle.state(), ServerState::Unavailable);
        assert!(registry.resolve_tool("ping").is_err());

        handle.shutdown(Duration::from_millis(100)).await.unwrap();
    }

    #[tokio::test]
    async fn prompt_results_are_cached() {
        let dir = tempfile::tempdir().unwrap();
        let counter_path = dir.path().join("count");
        let descriptor = tmpl_server_descriptor(&counter_path);
        let handle = Arc::new(ServerHandle::spawn(&descriptor).unwrap());
        let settings = HostSettings::default();
        let capabilities = handle.initialize(&settings).await.unwrap();
        handle.set_state(ServerState::Ready);

        let registry = Arc::new(CapabilityRegistry::default());
        registry.register_server("tmpl", &capabilities);

        let servers = Arc::new(DashMap::new());
        servers.insert("tmpl".to_string(), handle.clone());

        let (router, _metrics) = test_router(servers, registry, settings);

        let first = router.get_prompt("hello", serde_json::json!({}), None).await.unwrap();
        let second = router.get_prompt("hello", serde_json::json!({}), None).await.unwrap();
        assert_eq!(first, second);

        let calls = std::fs::read_to_string(&counter_path).unwrap_or_default().lines().count();
        assert_eq!(calls, 1);

        handle.shutdown(Duration::from_millis(200)).await.unwrap();
    }
}
