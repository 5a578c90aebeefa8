//! The central Model Context Protocol engine
//!
//! Decodes request bodies, routes each call to its handler and encodes exactly
//! one response. Handler failures, including panics, become error responses
//! that echo the request id.

use std::{panic::AssertUnwindSafe, time::Instant};

use futures::FutureExt;
use tracing::{error, info, warn};

use crate::domain::tools::{build_tools_list, handle_tool_call};
use crate::mcp::rpc::{
    decode_request, encode_response, RpcCall, RpcRequest, RpcResponse, UNKNOWN_REQUEST_ID,
};
use crate::AppState;

/// Turns a raw request body into the encoded response body.
pub async fn handle_request_body(state: &AppState, body: &[u8]) -> String {
    let response = match decode_request(body) {
        Ok(request) => dispatch(state, request).await,
        Err(err) => {
            let id = err.request_id().unwrap_or(UNKNOWN_REQUEST_ID).to_string();
            warn!(id = %id, error = %err, body_len = body.len(), "request could not be decoded");
            RpcResponse::error(id, err.to_string())
        }
    };
    encode_response(&response)
}

pub async fn dispatch(state: &AppState, request: RpcRequest) -> RpcResponse {
    let started = Instant::now();
    let RpcRequest { id, call } = request;
    let method = call.method().to_string();

    let (tool, argument_keys, response) = match call {
        RpcCall::ToolsCall { name, arguments } => {
            let keys = arguments.keys().cloned().collect::<Vec<_>>().join(",");
            let response = run_tool(state, &id, &name, arguments).await;
            (Some(name), keys, response)
        }
        RpcCall::ToolsList => (None, String::new(), RpcResponse::tool_list(id, build_tools_list())),
        RpcCall::Ping => (None, String::new(), RpcResponse::empty(id)),
        RpcCall::Unknown { method } => {
            let message = format!("Unknown method: {method}");
            (None, String::new(), RpcResponse::error(id, message))
        }
    };

    info!(
        id = %response.id(),
        method = %method,
        tool = tool.as_deref().unwrap_or("-"),
        argument_keys = %argument_keys,
        outcome = if response.is_error() { "failure" } else { "success" },
        duration_ms = started.elapsed().as_millis() as u64,
        "mcp action audited"
    );

    response
}

async fn run_tool(
    state: &AppState,
    id: &str,
    name: &str,
    arguments: serde_json::Map<String, serde_json::Value>,
) -> RpcResponse {
    let outcome = AssertUnwindSafe(handle_tool_call(state, name, arguments))
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(document)) => RpcResponse::text_result(id, document),
        Ok(Err(err)) => {
            warn!(tool = %name, kind = err.kind(), error = %err, "tool call failed");
            RpcResponse::error(id, err.to_string())
        }
        Err(_) => {
            error!(tool = %name, "tool handler panicked");
            RpcResponse::error(id, format!("Internal error while handling {name}"))
        }
    }
}
