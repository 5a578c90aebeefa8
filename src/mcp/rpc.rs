//! RPC envelope representations and formatting utilities
//!
//! Requests decode into a closed set of calls; responses carry exactly one of
//! `result` or `error` next to the echoed id.

use rust_mcp_sdk::schema::Tool;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Code carried by every application-level error.
pub const APPLICATION_ERROR_CODE: i64 = -1;

/// Id echoed when the envelope itself could not be decoded.
pub const UNKNOWN_REQUEST_ID: &str = "unknown";

#[derive(Debug, Clone, PartialEq)]
pub struct RpcRequest {
    pub id: String,
    pub call: RpcCall,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RpcCall {
    ToolsCall {
        name: String,
        arguments: Map<String, Value>,
    },
    ToolsList,
    Ping,
    Unknown {
        method: String,
    },
}

impl RpcCall {
    pub fn method(&self) -> &str {
        match self {
            Self::ToolsCall { .. } => "tools/call",
            Self::ToolsList => "tools/list",
            Self::Ping => "ping",
            Self::Unknown { method } => method,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireRequest {
    method: String,
    #[serde(default)]
    params: Option<Value>,
    id: WireId,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(Number),
}

impl From<WireId> for String {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Text(text) => text,
            WireId::Number(number) => number.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Map<String, Value>,
}

#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body is not a request envelope; no id can be echoed.
    #[error("Request processing error: {0}")]
    Envelope(serde_json::Error),
    #[error("Invalid params: {source}")]
    Params {
        id: String,
        source: serde_json::Error,
    },
}

impl DecodeError {
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::Envelope(_) => None,
            Self::Params { id, .. } => Some(id),
        }
    }
}

pub fn decode_request(body: &[u8]) -> Result<RpcRequest, DecodeError> {
    let wire: WireRequest = serde_json::from_slice(body).map_err(DecodeError::Envelope)?;
    let id = String::from(wire.id);

    let call = match wire.method.as_str() {
        "tools/call" => {
            let params = wire.params.unwrap_or(Value::Null);
            let ToolCallParams { name, arguments } = serde_json::from_value(params)
                .map_err(|source| DecodeError::Params {
                    id: id.clone(),
                    source,
                })?;
            RpcCall::ToolsCall { name, arguments }
        }
        "tools/list" => RpcCall::ToolsList,
        "ping" => RpcCall::Ping,
        _ => RpcCall::Unknown {
            method: wire.method,
        },
    };

    Ok(RpcRequest { id, call })
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RpcResponse {
    Success { id: String, result: RpcResult },
    Failure { id: String, error: RpcError },
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RpcResult {
    Content(ToolOutput),
    Tools { tools: Vec<Tool> },
    Empty {},
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ToolOutput {
    pub content: Vec<TextContent>,
    #[serde(rename = "isError")]
    pub is_error: bool,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcResponse {
    /// Wraps a tool's JSON document as the single text content entry.
    pub fn text_result(id: impl Into<String>, text: String) -> Self {
        Self::Success {
            id: id.into(),
            result: RpcResult::Content(ToolOutput {
                content: vec![TextContent { kind: "text", text }],
                is_error: false,
            }),
        }
    }

    pub fn tool_list(id: impl Into<String>, tools: Vec<Tool>) -> Self {
        Self::Success {
            id: id.into(),
            result: RpcResult::Tools { tools },
        }
    }

    pub fn empty(id: impl Into<String>) -> Self {
        Self::Success {
            id: id.into(),
            result: RpcResult::Empty {},
        }
    }

    pub fn error(id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Failure {
            id: id.into(),
            error: RpcError {
                code: APPLICATION_ERROR_CODE,
                message: message.into(),
            },
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Success { id, .. } | Self::Failure { id, .. } => id,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}

pub fn encode_response(response: &RpcResponse) -> String {
    serde_json::to_string(response).expect("rpc response serialization")
}
