//! Wire types and domain types shared across the host.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// MCP JSON-RPC request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// MCP JSON-RPC response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

/// MCP JSON-RPC notification (no `id`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<serde_json::Value>,
}

/// MCP error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Server identifier, unique within a `Config` (case-insensitively).
pub type ServerId = String;

/// Bare capability name, e.g. `"search"`.
pub type ToolName = String;

/// Transport kind a server descriptor may declare. Only `Stdio` is
/// constructible at runtime; the others are accepted at parse time so
/// config errors are reported uniformly, then rejected during validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Sse,
    WebSocket,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Stdio => write!(f, "stdio"),
            TransportKind::Sse => write!(f, "sse"),
            TransportKind::WebSocket => write!(f, "websocket"),
        }
    }
}

/// A tool capability advertised by a running server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tool {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Option<serde_json::Value>,
}

/// A single argument a prompt template accepts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptArgument {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// A prompt template advertised by a running server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prompt {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub arguments: Vec<PromptArgument>,
}

/// A resource advertised by a running server, addressed by URI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    pub uri: String,
    pub name: String,
    #[serde(rename = "mimeType", default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

/// A capability name qualified by the server that owns it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QualifiedName {
    pub server: String,
    pub name: String,
}

impl QualifiedName {
    pub fn new(server: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.server, self.name)
    }
}

/// The lifecycle state of a supervised server process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServerState {
    /// Spawned, performing the `initialize` handshake.
    Starting,
    /// Handshake complete, capabilities registered, accepting calls.
    Ready,
    /// Terminated after a startup failure or sustained timeouts. Terminal
    /// for the lifetime of the host; no automatic restart is attempted.
    Unavailable,
    /// Shutting down or shut down as part of an orderly host shutdown.
    Shutdown,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ServerState::Starting => "starting",
            ServerState::Ready => "ready",
            ServerState::Unavailable => "unavailable",
            ServerState::Shutdown => "shutdown",
        };
        write!(f, "{s}")
    }
}

/// Declared configuration for one server, parsed from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerDescriptor {
    /// Unique name used to qualify capabilities (`name.tool`).
    #[serde(skip)]
    pub name: String,
    pub transport: TransportKind,
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    /// Names of other servers that must reach `Ready` before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Milliseconds to wait for a response before treating a call as timed
    /// out. Falls back to the host-wide default when absent.
    #[serde(default, rename = "timeoutMs")]
    pub timeout_ms: Option<u64>,
}

/// A live snapshot of a server suitable for exposing to callers.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub state: ServerState,
    pub transport: TransportKind,
    pub pid: Option<u32>,
    pub tool_count: usize,
    pub prompt_count: usize,
    pub resource_count: usize,
}
