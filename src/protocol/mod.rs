//! JSON-RPC framing and MCP envelope helpers shared by every server process.
//!
//! Messages are newline-delimited JSON on the child's stdin/stdout, exactly
//! as the MCP stdio transport specifies. This module only builds and parses
//! the envelopes; the actual reading/writing tasks live in [`crate::process`].

use crate::error::{Error, Result};
use crate::types::{McpRequest, McpResponse};
use rand::RngCore;
use serde::Serialize;
use serde_json::Value;

/// Protocol version this host speaks during the `initialize` handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_INITIALIZED: &str = "notifications/initialized";
pub const METHOD_TOOLS_LIST: &str = "tools/list";
pub const METHOD_TOOLS_CALL: &str = "tools/call";
pub const METHOD_PROMPTS_LIST: &str = "prompts/list";
pub const METHOD_PROMPTS_GET: &str = "prompts/get";
pub const METHOD_RESOURCES_LIST: &str = "resources/list";
pub const METHOD_RESOURCES_READ: &str = "resources/read";

/// Generates a correlation id as 16 bytes of randomness rendered as hex.
/// Scoped to one process's pending table; never parsed back out.
pub fn generate_request_id() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Builds a `McpRequest` with the given method/params and a fresh id,
/// returning the id alongside so the caller can register it in the pending
/// table before the request is serialized onto the wire.
pub fn build_request<P: Serialize>(method: &str, params: Option<P>) -> Result<(String, McpRequest)> {
    let id = generate_request_id();
    let params = params
        .map(|p| serde_json::to_value(p))
        .transpose()
        .map_err(Error::Json)?;
    Ok((
        id.clone(),
        McpRequest {
            jsonrpc: "2.0".to_string(),
            id: Some(Value::String(id)),
            method: method.to_string(),
            params,
        },
    ))
}

/// Builds the `notifications/initialized` notification sent once after the
/// `initialize` handshake completes. Notifications carry no `id`.
pub fn build_initialized_notification() -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": METHOD_INITIALIZED,
    })
}

/// Serializes a value as a single JSON-RPC line terminated by `\n`.
pub fn encode_line<T: Serialize>(value: &T) -> Result<String> {
    let mut s = serde_json::to_string(value).map_err(Error::Json)?;
    s.push('\n');
    Ok(s)
}

/// Parses one line of stdout into a decoded `McpResponse`, if it looks like
/// one. Lines that are not valid JSON, or valid JSON that isn't a response
/// object, are tolerated -- some servers interleave banner text or their own
/// log lines onto stdout before the handshake completes.
///
/// A response carrying a non-standard `results` key in place of `result` is
/// normalized to `result` before being decoded, so list endpoints from
/// servers that pluralize the field still correlate correctly.
pub fn try_parse_response(line: &str) -> Option<McpResponse> {
    let mut value: Value = serde_json::from_str(line).ok()?;
    if !value.is_object() {
        return None;
    }
    if value.get("id").is_none() {
        return None;
    }
    if value.get("result").is_none() {
        if let Some(results) = value.get_mut("results").map(Value::take) {
            value["result"] = results;
        }
    }
    if value.get("result").is_none() && value.get("error").is_none() {
        return None;
    }
    serde_json::from_value(value).ok()
}

/// Parses one line of stdout into a server-initiated notification (a method
/// call with no `id`), if it looks like one.
pub fn try_parse_notification(line: &str) -> Option<(String, Option<Value>)> {
    let value: Value = serde_json::from_str(line).ok()?;
    if value.get("id").is_some() {
        return None;
    }
    let method = value.get("method")?.as_str()?.to_string();
    let params = value.get("params").cloned();
    Some((method, params))
}

/// Extracts the `result` payload from a response, turning a JSON-RPC error
/// object into a typed [`Error::ServerError`] attributed to `server`.
pub fn into_result(server: &str, response: McpResponse) -> Result<Value> {
    if let Some(err) = response.error {
        return Err(Error::ServerError(
            server.to_string(),
            format!("{} (code {})", err.message, err.code),
        ));
    }
    Ok(response.result.unwrap_or(Value::Null))
}

/// Reads the named array (e.g. `"tools"`, `"prompts"`, `"resources"`) out of
/// a list-endpoint result payload.
pub fn list_array<'a>(payload: &'a Value, key: &str) -> Option<&'a [Value]> {
    payload.get(key).and_then(Value::as_array).map(Vec::as_slice)
}
