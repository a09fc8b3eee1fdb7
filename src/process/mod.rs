//! Per-server child process supervision over stdio.
//!
//! Each [`ServerHandle`] owns exactly one writer task (fed by an `mpsc`
//! channel so callers never touch the child's stdin directly), one reader
//! task (correlating responses against a pending-request table and
//! forwarding notifications to a broadcast channel), and one stderr-drain
//! task that forwards lines to `tracing` so the child's own logging never
//! blocks on a full pipe buffer.

use crate::config::HostSettings;
use crate::error::{Error, Result};
use crate::protocol::{self, PROTOCOL_VERSION};
use crate::types::{McpResponse, Prompt, Resource, ServerDescriptor, ServerState, Tool};
use serde_json::Value;
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::sync::{broadcast, mpsc, oneshot, Mutex};
use tracing::{debug, error, info, warn};

const OUTGOING_CHANNEL_CAPACITY: usize = 128;
const NOTIFICATION_CHANNEL_CAPACITY: usize = 128;

/// Capabilities collected during the `initialize` handshake.
#[derive(Debug, Clone, Default)]
pub struct ServerCapabilities {
    pub tools: Vec<Tool>,
    pub prompts: Vec<Prompt>,
    pub resources: Vec<Resource>,
}

/// A notification the server sent outside of any request/response pair.
#[derive(Debug, Clone)]
pub struct ServerNotification {
    pub server: String,
    pub method: String,
    pub params: Option<Value>,
}

fn state_to_u8(state: ServerState) -> u8 {
    match state {
        ServerState::Starting => 0,
        ServerState::Ready => 1,
        ServerState::Unavailable => 2,
        ServerState::Shutdown => 3,
    }
}

fn u8_to_state(byte: u8) -> ServerState {
    match byte {
        0 => ServerState::Starting,
        1 => ServerState::Ready,
        2 => ServerState::Unavailable,
        _ => ServerState::Shutdown,
    }
}

type PendingTable = Arc<Mutex<HashMap<String, oneshot::Sender<McpResponse>>>>;

/// A supervised child process speaking MCP over stdio.
pub struct ServerHandle {
    pub name: String,
    child: Arc<Mutex<Child>>,
    outgoing_tx: Mutex<Option<mpsc::Sender<String>>>,
    pending: PendingTable,
    notifications_tx: broadcast::Sender<ServerNotification>,
    state: Arc<AtomicU8>,
}

impl ServerHandle {
    /// Spawns the child process and starts its writer/reader/stderr tasks.
    /// The returned handle is in `Starting` state; call [`Self::initialize`]
    /// to perform the MCP handshake before routing calls to it.
    pub fn spawn(descriptor: &ServerDescriptor) -> Result<Self> {
        let command_str = descriptor
            .command
            .as_deref()
            .ok_or_else(|| Error::Startup(descriptor.name.clone(), "no command configured".to_string()))?;

        let mut command = Command::new(command_str);
        command
            .args(&descriptor.args)
            .envs(&descriptor.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command
            .spawn()
            .map_err(|e| Error::Startup(descriptor.name.clone(), e.to_string()))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Startup(descriptor.name.clone(), "no stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Startup(descriptor.name.clone(), "no stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Startup(descriptor.name.clone(), "no stderr".to_string()))?;

        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_CHANNEL_CAPACITY);
        let pending: PendingTable = Arc::new(Mutex::new(HashMap::new()));
        let (notifications_tx, _) = broadcast::channel(NOTIFICATION_CHANNEL_CAPACITY);

        tokio::spawn(Self::run_writer(descriptor.name.clone(), stdin, outgoing_rx));
        tokio::spawn(Self::run_reader(
            descriptor.name.clone(),
            stdout,
            pending.clone(),
            notifications_tx.clone(),
        ));
        tokio::spawn(Self::drain_stderr(descriptor.name.clone(), stderr));

        info!(server = %descriptor.name, command = %command_str, "spawned server process");

        Ok(Self {
            name: descriptor.name.clone(),
            child: Arc::new(Mutex::new(child)),
            outgoing_tx: Mutex::new(Some(outgoing_tx)),
            pending,
            notifications_tx,
            state: Arc::new(AtomicU8::new(state_to_u8(ServerState::Starting))),
        })
    }

    /// Sends one pre-framed line to the writer task, if it's still open.
    async fn send_line(&self, line: String) -> Result<()> {
        let sender = { self.outgoing_tx.lock().await.clone() };
        match sender {
            Some(tx) => tx
                .send(line)
                .await
                .map_err(|_| Error::ServerError(self.name.clone(), "writer task closed".to_string())),
            None => Err(Error::ServerError(self.name.clone(), "connection closed".to_string())),
        }
    }

    pub fn state(&self) -> ServerState {
        u8_to_state(self.state.load(Ordering::Acquire))
    }

    /// The OS process id, if the child is still running.
    pub async fn pid(&self) -> Option<u32> {
        self.child.lock().await.id()
    }

    pub fn set_state(&self, state: ServerState) {
        self.state.store(state_to_u8(state), Ordering::Release);
    }

    pub fn subscribe_notifications(&self) -> broadcast::Receiver<ServerNotification> {
        self.notifications_tx.subscribe()
    }

    /// Runs the `initialize` -> `notifications/initialized` -> capability
    /// listing sequence, returning the server's advertised capabilities.
    pub async fn initialize(&self, settings: &HostSettings) -> Result<ServerCapabilities> {
        let timeout = Duration::from_millis(settings.call_timeout_ms);

        let init_params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": "mcp-host",
                "version": env!("CARGO_PKG_VERSION"),
            }
        });
        let init_result = self.call_raw("initialize", Some(init_params), timeout).await?;

        let server_protocol = init_result
            .get("protocolVersion")
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        if server_protocol != PROTOCOL_VERSION {
            warn!(
                server = %self.name,
                server_protocol,
                host_protocol = PROTOCOL_VERSION,
                "server speaks a different protocol version"
            );
        }

        let notification = protocol::build_initialized_notification();
        let line = protocol::encode_line(&notification)?;
        self.send_line(line).await?;

        let mut capabilities = ServerCapabilities::default();

        let tools_result = self.call_raw(protocol::METHOD_TOOLS_LIST, Option::<Value>::None, timeout).await?;
        if let Some(items) = protocol::list_array(&tools_result, "tools") {
            capabilities.tools = items
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect();
        }

        let prompts_result = self.call_raw(protocol::METHOD_PROMPTS_LIST, Option::<Value>::None, timeout).await;
        if let Ok(payload) = prompts_result {
            if let Some(items) = protocol::list_array(&payload, "prompts") {
                capabilities.prompts = items
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect();
            }
        }

        let resources_result = self.call_raw(protocol::METHOD_RESOURCES_LIST, Option::<Value>::None, timeout).await;
        if let Ok(payload) = resources_result {
            if let Some(items) = protocol::list_array(&payload, "resources") {
                capabilities.resources = items
                    .iter()
                    .filter_map(|v| serde_json::from_value(v.clone()).ok())
                    .collect();
            }
        }

        info!(
            server = %self.name,
            tools = capabilities.tools.len(),
            prompts = capabilities.prompts.len(),
            resources = capabilities.resources.len(),
            "server initialized"
        );

        Ok(capabilities)
    }

    /// Issues one request and awaits its response within `timeout`,
    /// returning the decoded `result` payload.
    pub async fn call_raw<P: serde::Serialize>(
        &self,
        method: &str,
        params: Option<P>,
        timeout: Duration,
    ) -> Result<Value> {
        let (id, request) = protocol::build_request(method, params)?;
        let (tx, rx) = oneshot::channel();

        {
            let mut pending = self.pending.lock().await;
            pending.insert(id.clone(), tx);
        }

        let line = protocol::encode_line(&request)?;
        if self.send_line(line).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(Error::ServerError(self.name.clone(), "writer task closed".to_string()));
        }

        let response = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => {
                return Err(Error::ServerError(
                    self.name.clone(),
                    "response channel dropped before a reply arrived".to_string(),
                ))
            }
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(Error::Timeout(self.name.clone()));
            }
        };

        protocol::into_result(&self.name, response)
    }

    /// Sends the writer a graceful shutdown: close stdin, wait up to `grace`
    /// for the process to exit, then force-kill and fail every outstanding
    /// pending request so no caller hangs forever.
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        self.set_state(ServerState::Shutdown);

        // Dropping the sender half closes the writer task's channel, which
        // in turn drops the child's stdin -- the polite way to ask a
        // well-behaved MCP server to exit on its own.
        self.outgoing_tx.lock().await.take();

        {
            let mut child = self.child.lock().await;

            match tokio::time::timeout(grace, child.wait()).await {
                Ok(Ok(status)) => {
                    debug!(server = %self.name, ?status, "server exited");
                }
                Ok(Err(e)) => {
                    warn!(server = %self.name, error = %e, "error waiting for server exit");
                }
                Err(_) => {
                    warn!(server = %self.name, "grace period elapsed, killing server");
                    let _ = child.kill().await;
                }
            }
        }

        let mut pending = self.pending.lock().await;
        for (_, tx) in pending.drain() {
            let _ = tx.send(McpResponse {
                jsonrpc: "2.0".to_string(),
                id: None,
                result: None,
                error: Some(crate::types::McpError {
                    code: -32000,
                    message: "server shut down".to_string(),
                    data: None,
                }),
            });
        }

        Ok(())
    }

    async fn run_writer(name: String, mut stdin: ChildStdin, mut rx: mpsc::Receiver<String>) {
        while let Some(line) = rx.recv().await {
            if let Err(e) = stdin.write_all(line.as_bytes()).await {
                error!(server = %name, error = %e, "failed to write to server stdin");
                break;
            }
            if let Err(e) = stdin.flush().await {
                error!(server = %name, error = %e, "failed to flush server stdin");
                break;
            }
        }
        debug!(server = %name, "writer task exiting");
    }

    async fn run_reader(
        name: String,
        stdout: ChildStdout,
        pending: PendingTable,
        notifications_tx: broadcast::Sender<ServerNotification>,
    ) {
        let mut lines = BufReader::new(stdout).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!(server = %name, "stdout closed");
                    break;
                }
                Err(e) => {
                    error!(server = %name, error = %e, "error reading server stdout");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }

            if let Some(response) = protocol::try_parse_response(&line) {
                let id = response
                    .id
                    .as_ref()
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if let Some(id) = id {
                    let sender = pending.lock().await.remove(&id);
                    if let Some(sender) = sender {
                        let _ = sender.send(response);
                    } else {
                        warn!(server = %name, id, "no pending request for response");
                    }
                }
                continue;
            }

            if let Some((method, params)) = protocol::try_parse_notification(&line) {
                let _ = notifications_tx.send(ServerNotification {
                    server: name.clone(),
                    method,
                    params,
                });
                continue;
            }

            debug!(server = %name, line, "ignoring unrecognized stdout line");
        }
    }

    async fn drain_stderr(name: String, stderr: ChildStderr) {
        let mut lines = BufReader::new(stderr).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if !line.trim().is_empty() {
                        debug!(server = %name, stderr = %line, "server stderr");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    debug!(server = %name, error = %e, "error reading server stderr");
                    break;
                }
            }
        }
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        let child = self.child.clone();
        tokio::spawn(async move {
            let mut child = child.lock().await;
            let _ = child.start_kill();
        });
    }
}
