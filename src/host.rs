//! The embedder-facing façade: owns every server, the registry, cache,
//! metrics, and router, and exposes the one surface callers actually use.
//!
//! There is no global or static state here -- every field lives on `Host`
//! itself, so a process can construct and run more than one `Host`
//! concurrently (each with its own servers, cache, and metrics) without any
//! cross-talk.

use crate::cache::{self, Cache};
use crate::config::Config;
use crate::error::Result;
use crate::metrics::{Metrics, ServerMetricsSnapshot};
use crate::process::ServerHandle;
use crate::registry::CapabilityRegistry;
use crate::router::Router;
use crate::types::{Prompt, QualifiedName, Resource, ServerInfo, ServerState, Tool, TransportKind};
use dashmap::DashMap;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

type NotificationHandler = Arc<dyn Fn(String, Option<Value>) + Send + Sync>;

pub struct Host {
    config: Config,
    servers: Arc<DashMap<String, Arc<ServerHandle>>>,
    registry: Arc<CapabilityRegistry>,
    cache: Arc<Cache>,
    metrics: Arc<Metrics>,
    router: Router,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    notification_tasks: Mutex<Vec<JoinHandle<()>>>,
    handlers: Arc<DashMap<String, Vec<NotificationHandler>>>,
}

impl Host {
    pub fn new(config: Config) -> Self {
        let registry = Arc::new(CapabilityRegistry::default());
        let cache = Arc::new(Cache::new(&config.host.cache));
        let metrics = Arc::new(Metrics::new());
        let servers = Arc::new(DashMap::new());
        let router = Router::new(
            servers.clone(),
            registry.clone(),
            cache.clone(),
            metrics.clone(),
            config.host.clone(),
        );

        Self {
            config,
            servers,
            registry,
            cache,
            metrics,
            router,
            sweeper: Mutex::new(None),
            notification_tasks: Mutex::new(Vec::new()),
            handlers: Arc::new(DashMap::new()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let config = Config::from_file(path)?;
        Ok(Self::new(config))
    }

    /// Validates the config, starts the cache sweeper, then starts every
    /// server in dependency order. Aborts and tears down anything already
    /// started on the first startup failure.
    pub async fn initialize(&self) -> Result<()> {
        let order = self.config.validate()?;

        if self.config.host.cache.enabled {
            let handle = cache::spawn_sweeper(
                self.cache.clone(),
                Duration::from_secs(self.config.host.cache.sweep_interval_seconds),
            );
            *self.sweeper.lock().await = Some(handle);
        }

        for name in &order {
            let descriptor = self
                .config
                .servers
                .get(name)
                .expect("validated order only names servers present in the config");

            let span = tracing::info_span!("start_server", server = %name);
            let _enter = span.enter();

            if let Err(e) = self.start_one(descriptor).await {
                error!(server = %name, error = %e, "failed to start server, aborting host startup");
                drop(_enter);
                self.shutdown().await;
                return Err(e);
            }
            info!(server = %name, "server ready");
        }

        Ok(())
    }

    async fn start_one(&self, descriptor: &crate::types::ServerDescriptor) -> Result<()> {
        let handle = Arc::new(ServerHandle::spawn(descriptor)?);
        let capabilities = handle.initialize(&self.config.host).await?;
        handle.set_state(ServerState::Ready);

        self.registry.register_server(&descriptor.name, &capabilities);
        self.servers.insert(descriptor.name.clone(), handle.clone());

        let handlers = self.handlers.clone();
        let mut notifications = handle.subscribe_notifications();
        let task = tokio::spawn(async move {
            while let Ok(notification) = notifications.recv().await {
                if let Some(registered) = handlers.get(&notification.method) {
                    for handler in registered.iter() {
                        handler(notification.server.clone(), notification.params.clone());
                    }
                }
            }
        });
        self.notification_tasks.lock().await.push(task);

        Ok(())
    }

    /// Idempotent teardown: stops the sweeper, shuts down every running
    /// server, and cancels the notification-forwarding tasks.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.sweeper.lock().await.take() {
            handle.abort();
        }

        let grace = Duration::from_millis(self.config.host.shutdown_grace_ms);
        let names: Vec<String> = self.servers.iter().map(|e| e.key().clone()).collect();
        for name in names {
            if let Some((_, handle)) = self.servers.remove(&name) {
                if let Err(e) = handle.shutdown(grace).await {
                    warn!(server = %name, error = %e, "error shutting down server");
                }
            }
        }

        for task in self.notification_tasks.lock().await.drain(..) {
            task.abort();
        }
    }

    pub async fn call_tool(&self, name: &str, arguments: Value, timeout: Option<Duration>) -> Result<Value> {
        self.router.call_tool(name, arguments, timeout).await
    }

    pub async fn get_prompt(&self, name: &str, arguments: Value, timeout: Option<Duration>) -> Result<Value> {
        self.router.get_prompt(name, arguments, timeout).await
    }

    pub async fn read_resource(&self, uri: &str, timeout: Option<Duration>) -> Result<Value> {
        self.router.read_resource(uri, timeout).await
    }

    pub fn get_tools(&self, server: Option<&str>) -> Vec<(QualifiedName, Tool)> {
        self.registry
            .all_tools()
            .into_iter()
            .filter(|(key, _)| server.map(|s| key.server == s).unwrap_or(true))
            .collect()
    }

    pub fn get_prompts(&self, server: Option<&str>) -> Vec<(QualifiedName, Prompt)> {
        self.registry
            .all_prompts()
            .into_iter()
            .filter(|(key, _)| server.map(|s| key.server == s).unwrap_or(true))
            .collect()
    }

    pub fn get_resources(&self, server: Option<&str>) -> Vec<(QualifiedName, Resource)> {
        self.registry
            .all_resources()
            .into_iter()
            .filter(|(key, _)| server.map(|s| key.server == s).unwrap_or(true))
            .collect()
    }

    /// One entry per currently-tracked server. A server that was promoted to
    /// `Unavailable` stays here (with a `None` pid once its process exits)
    /// until the next `shutdown()`.
    pub async fn get_servers(&self) -> Vec<ServerInfo> {
        let entries: Vec<(String, Arc<ServerHandle>)> =
            self.servers.iter().map(|e| (e.key().clone(), e.value().clone())).collect();

        let mut infos = Vec::with_capacity(entries.len());
        for (name, handle) in entries {
            let transport = self
                .config
                .servers
                .get(&name)
                .map(|d| d.transport.clone())
                .unwrap_or(TransportKind::Stdio);
            infos.push(ServerInfo {
                name: name.clone(),
                state: handle.state(),
                transport,
                pid: handle.pid().await,
                tool_count: self.registry.tool_count(&name),
                prompt_count: self.registry.prompt_count(&name),
                resource_count: self.registry.resource_count(&name),
            });
        }
        infos
    }

    pub fn get_metrics(&self, server: Option<&str>) -> Vec<ServerMetricsSnapshot> {
        match server {
            Some(name) => self.metrics.snapshot(name).into_iter().collect(),
            None => self.metrics.all_snapshots(),
        }
    }

    /// Registers `handler` to run whenever any server sends a notification
    /// named `method`. Handlers for the same method run in registration
    /// order on the task that drains that server's notification channel.
    pub fn register_notification_handler<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(String, Option<Value>) + Send + Sync + 'static,
    {
        self.handlers.entry(method.into()).or_default().push(Arc::new(handler));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ServerDescriptor, TransportKind};
    use std::collections::HashMap as Map;

    fn echo_descriptor(name: &str, deps: &[&str]) -> ServerDescriptor {
        let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([a-f0-9]*\)".*/\1/p')
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([a-zA-Z/_]*\)".*/\1/p')
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"protocolVersion":"2024-11-05","capabilities":{}}}\n' "$id"
      ;;
    tools/list)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"tools":[{"name":"ping"}]}}\n' "$id"
      ;;
    tools/call)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"ok":true}}\n' "$id"
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":"%s","result":{}}\n' "$id"
      ;;
  esac
done
"#;
        ServerDescriptor {
            name: name.to_string(),
            transport: TransportKind::Stdio,
            command: Some("sh".to_string()),
            args: vec!["-c".to_string(), script.to_string()],
            env: Default::default(),
            dependencies: deps.iter().map(|s| s.to_string()).collect(),
            timeout_ms: None,
        }
    }

    fn config_with(servers: Vec<ServerDescriptor>) -> Config {
        let mut map = Map::new();
        for descriptor in servers {
            map.insert(descriptor.name.clone(), descriptor);
        }
        Config {
            host: Default::default(),
            servers: map,
        }
    }

    #[tokio::test]
    async fn starts_servers_in_dependency_order_and_calls_tools() {
        let config = config_with(vec![echo_descriptor("a", &[]), echo_descriptor("b", &["a"])]);
        let host = Host::new(config);
        host.initialize().await.unwrap();

        let servers = host.get_servers().await;
        assert_eq!(servers.len(), 2);
        assert!(servers.iter().all(|s| s.state == ServerState::Ready));

        let result = host.call_tool("a.ping", serde_json::json!({}), None).await.unwrap();
        assert_eq!(result["ok"], true);

        host.shutdown().await;
        host.shutdown().await; // idempotent
        assert!(host.get_servers().await.is_empty());
    }

    #[tokio::test]
    async fn aborts_startup_and_tears_down_on_failure() {
        let mut bad = echo_descriptor("bad", &["good"]);
        bad.command = Some("/nonexistent/binary-does-not-exist".to_string());
        let config = config_with(vec![echo_descriptor("good", &[]), bad]);
        let host = Host::new(config);

        let result = host.initialize().await;
        assert!(result.is_err());
        assert!(host.get_servers().await.is_empty());
    }

    #[tokio::test]
    async fn notification_handlers_receive_forwarded_events() {
        // Uses a server that never emits notifications; this exercises
        // registration plumbing and shutdown cleanup without flaking on
        // scheduling order.
        let config = config_with(vec![echo_descriptor("a", &[])]);
        let host = Host::new(config);
        host.register_notification_handler("custom/event", |_server, _params| {});
        host.initialize().await.unwrap();
        host.shutdown().await;
    }
}
