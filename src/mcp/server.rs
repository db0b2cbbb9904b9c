//! MCP server: line-delimited JSON-RPC over stdin/stdout.
//!
//! Each request runs on its own task, so a slow provider call never holds up
//! `ping` or a video submission queued behind it. Responses funnel through
//! one channel into a single writer, one line each, in completion order.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::protocol::{
    INVALID_PARAMS, INVALID_REQUEST, JsonRpcRequest, METHOD_NOT_FOUND, PARSE_ERROR, RpcError,
    serialize_response,
};
use crate::tools::ToolRegistry;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "mediagen-mcp";

pub struct McpServer {
    registry: ToolRegistry,
}

impl McpServer {
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self { registry }
    }

    /// Route one method call.
    pub async fn dispatch(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            })),
            "notifications/initialized" | "initialized" | "notifications/cancelled" => {
                Ok(Value::Null)
            }
            "ping" => Ok(json!({})),
            "tools/list" => Ok(json!({ "tools": self.registry.definitions() })),
            "tools/call" => self.call_tool(params).await,
            other => Err((METHOD_NOT_FOUND, format!("method not found: {other}"))),
        }
    }

    async fn call_tool(&self, params: &Value) -> Result<Value, RpcError> {
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| (INVALID_PARAMS, "tools/call requires a string 'name'".to_string()))?;
        let arguments = match params.get("arguments") {
            None | Some(Value::Null) => json!({}),
            Some(args @ Value::Object(_)) => args.clone(),
            Some(_) => {
                return Err((
                    INVALID_PARAMS,
                    "tools/call 'arguments' must be an object".to_string(),
                ));
            }
        };

        match self.registry.execute_full(name, arguments).await {
            Ok(result) => Ok(json!({
                "content": [{ "type": "text", "text": result.content }],
                "isError": !result.success,
            })),
            Err(e) => {
                tracing::warn!(tool = name, error = %e, "tool call failed");
                Err((e.code(), e.to_string()))
            }
        }
    }

    /// Handle one input line; `None` means nothing is written back.
    pub async fn handle_line(&self, line: &str) -> Option<String> {
        let raw: Value = match serde_json::from_str(line) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "failed to parse JSON-RPC message");
                return Some(serialize_response(
                    None,
                    Err((PARSE_ERROR, format!("parse error: {e}"))),
                ));
            }
        };
        let id = raw.get("id").cloned().filter(|id| !id.is_null());
        let request: JsonRpcRequest = match serde_json::from_value(raw) {
            Ok(request) => request,
            Err(e) => {
                return Some(serialize_response(
                    id,
                    Err((INVALID_REQUEST, format!("invalid request: {e}"))),
                ));
            }
        };
        if request.jsonrpc != "2.0" {
            return Some(serialize_response(
                id,
                Err((INVALID_REQUEST, "jsonrpc must be \"2.0\"".to_string())),
            ));
        }

        tracing::debug!(method = %request.method, "request received");
        let result = self.dispatch(&request.method, &request.params).await;
        if request.is_notification() {
            if let Err((code, message)) = result {
                tracing::debug!(code, message = %message, "notification failed");
            }
            return None;
        }
        Some(serialize_response(request.id, result))
    }

    /// Serve until the reader reaches end of input and every in-flight
    /// request has answered.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        // Dropped at end of input; `rx` then closes once in-flight requests finish.
        let mut tx = Some(tx);
        let mut lines = reader.lines();

        loop {
            tokio::select! {
                line = lines.next_line(), if tx.is_some() => {
                    match line.context("Failed to read request")? {
                        Some(line) if line.trim().is_empty() => {}
                        Some(line) => {
                            if let Some(sender) = &tx {
                                self.spawn_request(line, sender.clone());
                            }
                        }
                        None => tx = None,
                    }
                }
                response = rx.recv() => match response {
                    Some(response) => write_line(&mut writer, response).await?,
                    None => break,
                },
            }
        }
        Ok(())
    }

    fn spawn_request(self: &Arc<Self>, line: String, responses: mpsc::UnboundedSender<String>) {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(response) = server.handle_line(&line).await {
                // The writer only goes away when serving has already failed.
                let _ = responses.send(response);
            }
        });
    }

    /// Serve over the process's stdin and stdout.
    pub async fn run_stdio(self: Arc<Self>) -> Result<()> {
        tracing::info!(tools = self.registry.len(), "serving MCP over stdio");
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await?;
        tracing::info!("stdin closed; shutting down");
        Ok(())
    }
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, response: String) -> Result<()> {
    let mut out = response.into_bytes();
    out.push(b'\n');
    writer
        .write_all(&out)
        .await
        .context("Failed to write response")?;
    writer.flush().await.context("Failed to flush response")
}
