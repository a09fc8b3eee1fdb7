//! Common test utilities for integration tests.
//!
//! Every fixture here is a tiny POSIX shell script standing in for a real
//! MCP server: it reads one JSON-RPC request per line on stdin and writes
//! one response per line on stdout, exactly the wire shape `process::mod`
//! expects. Good enough to exercise handshake, routing, retries and caching
//! without a real MCP implementation on the test machine.

use mcp_host::config::{Config, HostSettings};
use mcp_host::types::{ServerDescriptor, TransportKind};
use std::collections::HashMap;
use std::time::Duration;

pub fn config_with(servers: Vec<ServerDescriptor>) -> Config {
    let mut map = HashMap::new();
    for descriptor in servers {
        map.insert(descriptor.name.clone(), descriptor);
    }
    Config {
        host: HostSettings::default(),
        servers: map,
    }
}

pub fn config_with_settings(servers: Vec<ServerDescriptor>, host: HostSettings) -> Config {
    let mut config = config_with(servers);
    config.host = host;
    config
}

fn shell_descriptor(name: &str, deps: &[&str], script: String) -> ServerDescriptor {
    ServerDescriptor {
        name: name.to_string(),
        transport: TransportKind::Stdio,
        command: Some("sh".to_string()),
        args: vec!["-c".to_string(), script],
        env: Default::default(),
        dependencies: deps.iter().map(|s| s.to_string()).collect(),
        timeout_ms: None,
    }
}

/// A server declaring one tool, `add`, that echoes back `{"sum": a + b}`
/// style canned results -- here it just always returns `{"sum": 5}`, which
/// is all the happy-path scenario needs.
pub fn calc_descriptor(name: &str, deps: &[&str]) -> ServerDescriptor {
    let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([a-f0-9]*\)".*/\1/p')
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([a-zA-Z/_]*\)".*/\1/p')
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"protocolVersion":"2024-11-05","capabilities":{}}}\n' "$id"
      ;;
    tools/list)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"tools":[{"name":"add","inputSchema":{"type":"object","required":["a","b"]}}]}}\n' "$id"
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
    shell_descriptor(name, deps, script.to_string())
}

/// A server advertising one tool named `echo` that reflects its `arguments`
/// back as the result. Used for the ambiguity scenario, where two servers
/// both register the same bare tool name.
pub fn echo_tool_descriptor(name: &str) -> ServerDescriptor {
    let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([a-f0-9]*\)".*/\1/p')
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([a-zA-Z/_]*\)".*/\1/p')
  args=$(printf '%s' "$line" | sed -n 's/.*"arguments":\({[^}]*}\).*/\1/p')
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"protocolVersion":"2024-11-05","capabilities":{}}}\n' "$id"
      ;;
    tools/list)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"tools":[{"name":"echo"}]}}\n' "$id"
      ;;
    tools/call)
      printf '{"jsonrpc":"2.0","id":"%s","result":%s}\n' "$id" "${args:-{}}"
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":"%s","result":{}}\n' "$id"
      ;;
  esac
done
"#;
    shell_descriptor(name, &[], script.to_string())
}

/// A server that never replies to anything at all, including `initialize`.
/// Useful for exercising `process::ServerHandle` directly, but `Host`-level
/// tests want [`half_slow_descriptor`] instead, since `Host::initialize`
/// would otherwise fail the handshake itself.
pub fn slow_descriptor(name: &str) -> ServerDescriptor {
    ServerDescriptor {
        name: name.to_string(),
        transport: TransportKind::Stdio,
        command: Some("sleep".to_string()),
        args: vec!["5".to_string()],
        env: Default::default(),
        dependencies: vec![],
        timeout_ms: None,
    }
}

/// A server that completes the handshake normally and advertises one tool,
/// `ping`, but never replies to a `tools/call` for it -- every call against
/// `ping` times out regardless of retry count.
pub fn half_slow_descriptor(name: &str) -> ServerDescriptor {
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
      sleep 5
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":"%s","result":{}}\n' "$id"
      ;;
  esac
done
"#;
    shell_descriptor(name, &[], script.to_string())
}

/// A server declaring prompt `hello`, which appends one line to
/// `counter_path` every time `prompts/get` actually runs -- a cache hit in
/// the router never reaches this process.
pub fn tmpl_descriptor(name: &str, counter_path: &std::path::Path) -> ServerDescriptor {
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
    shell_descriptor(name, &[], script)
}

/// A server declaring a fast-failing command, so `Host::initialize` observes
/// a startup error rather than a handshake timeout.
pub fn unstartable_descriptor(name: &str, deps: &[&str]) -> ServerDescriptor {
    ServerDescriptor {
        name: name.to_string(),
        transport: TransportKind::Stdio,
        command: Some("/nonexistent/binary-does-not-exist".to_string()),
        args: vec![],
        env: Default::default(),
        dependencies: deps.iter().map(|s| s.to_string()).collect(),
        timeout_ms: None,
    }
}

/// A server that answers `tools/call` from a backgrounded subshell whose
/// delay comes from the call's own `delayMs` argument, so replies to
/// concurrently-issued calls can arrive in a different order than the calls
/// were made. Each response echoes back the caller-supplied `tag` argument,
/// so a test can check that every caller's own result came back regardless
/// of reply order.
pub fn out_of_order_descriptor(name: &str) -> ServerDescriptor {
    let script = r#"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([a-f0-9]*\)".*/\1/p')
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([a-zA-Z/_]*\)".*/\1/p')
  case "$method" in
    initialize)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"protocolVersion":"2024-11-05","capabilities":{}}}\n' "$id"
      ;;
    tools/list)
      printf '{"jsonrpc":"2.0","id":"%s","result":{"tools":[{"name":"delay"}]}}\n' "$id"
      ;;
    tools/call)
      delay_ms=$(printf '%s' "$line" | sed -n 's/.*"delayMs":\([0-9]*\).*/\1/p')
      tag=$(printf '%s' "$line" | sed -n 's/.*"tag":\([0-9]*\).*/\1/p')
      (
        awk -v ms="${delay_ms:-0}" 'BEGIN{system("sleep " ms/1000.0)}'
        printf '{"jsonrpc":"2.0","id":"%s","result":{"tag":%s}}\n' "$id" "$tag"
      ) &
      ;;
    *)
      printf '{"jsonrpc":"2.0","id":"%s","result":{}}\n' "$id"
      ;;
  esac
done
wait
"#;
    shell_descriptor(name, &[], script.to_string())
}

/// A `calc`-style server that first touches `marker_dir/<name>`, so a test
/// can tell whether this process was ever spawned without hooking into
/// logging.
pub fn marked_descriptor(name: &str, deps: &[&str], marker_dir: &std::path::Path) -> ServerDescriptor {
    let marker_path = marker_dir.join(name);
    let script = format!(
        r#"
touch "{marker}"
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/.*"id":"\([a-f0-9]*\)".*/\1/p')
  method=$(printf '%s' "$line" | sed -n 's/.*"method":"\([a-zA-Z/_]*\)".*/\1/p')
  case "$method" in
    initialize)
      printf '{{"jsonrpc":"2.0","id":"%s","result":{{"protocolVersion":"2024-11-05","capabilities":{{}}}}}}\n' "$id"
      ;;
    tools/list)
      printf '{{"jsonrpc":"2.0","id":"%s","result":{{"tools":[]}}}}\n' "$id"
      ;;
    *)
      printf '{{"jsonrpc":"2.0","id":"%s","result":{{}}}}\n' "$id"
      ;;
  esac
done
"#,
        marker = marker_path.display()
    );
    shell_descriptor(name, deps, script)
}

pub async fn wait_for<F>(mut condition: F, timeout: Duration) -> bool
where
    F: FnMut() -> bool,
{
    let start = std::time::Instant::now();
    while start.elapsed() < timeout {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
