//! MCP Server Implementation
//!
//! Handles MCP protocol requests and routes tool calls to the memory
//! service. Every request runs on its own task so a slow embedding never
//! blocks other calls; a single writer task serializes the replies.

use super::protocol::*;
use super::tools::get_all_tools;
use super::transport::{Incoming, LineReader, LineWriter};
use kg_memory::MemoryService;
use serde::Serialize;
use serde_json::{json, Value};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

const PROTOCOL_VERSION: &str = "2024-11-05";
const SERVER_NAME: &str = "kg-memory";
const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// MCP Server - handles protocol messages
pub struct McpServer {
    service: Arc<MemoryService>,
    initialized: AtomicBool,
}

impl McpServer {
    pub fn new(service: Arc<MemoryService>) -> Self {
        Self {
            service,
            initialized: AtomicBool::new(false),
        }
    }

    /// Whether the client has completed the initialize handshake
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    /// Serve over stdin/stdout until the client disconnects
    pub async fn run(self: Arc<Self>) -> io::Result<()> {
        self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
            .await
    }

    /// Serve newline-delimited JSON-RPC over the given streams.
    ///
    /// Returns after EOF once every in-flight request has replied. A read
    /// failure also lets in-flight requests reply before it is returned.
    pub async fn serve<R, W>(self: Arc<Self>, reader: R, writer: W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<JsonRpcResponse>();

        let writer_task = tokio::spawn(async move {
            let mut writer = LineWriter::new(writer);
            while let Some(response) = rx.recv().await {
                writer.write_response(&response).await?;
            }
            Ok::<_, io::Error>(())
        });

        tracing::info!("MCP server starting...");

        let mut reader = LineReader::new(reader);
        let mut in_flight = JoinSet::new();
        let mut read_error = None;

        loop {
            let incoming = match reader.next().await {
                Ok(Some(incoming)) => incoming,
                Ok(None) => break,
                Err(e) => {
                    tracing::error!("Failed to read from client: {}", e);
                    read_error = Some(e);
                    break;
                }
            };

            match incoming {
                Incoming::Request(request) => {
                    let server = Arc::clone(&self);
                    let tx = tx.clone();
                    in_flight.spawn(async move {
                        if let Some(response) = server.handle_request(request).await {
                            // Receiver only closes if the writer failed
                            let _ = tx.send(response);
                        }
                    });
                }
                Incoming::Malformed(e) => {
                    let _ = tx.send(JsonRpcResponse::error(
                        None,
                        JsonRpcError::parse_error(format!("Parse error: {}", e)),
                    ));
                }
            }

            // Reap finished requests so the set does not grow unbounded
            while let Some(joined) = in_flight.try_join_next() {
                log_join_error(joined);
            }
        }

        tracing::info!("Client disconnected");

        while let Some(joined) = in_flight.join_next().await {
            log_join_error(joined);
        }
        drop(tx);

        writer_task
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))??;

        match read_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Handle a JSON-RPC message. Notifications yield no response.
    async fn handle_request(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        tracing::debug!("Handling request: {}", request.method);

        let Some(id) = request.id else {
            self.handle_notification(&request.method);
            return None;
        };
        let id = Some(id);

        if request.jsonrpc != "2.0" {
            return Some(JsonRpcResponse::error(
                id,
                JsonRpcError::invalid_request(format!(
                    "Unsupported jsonrpc version: {}",
                    request.jsonrpc
                )),
            ));
        }

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(id, request.params),
            "ping" => to_response(id, &PingResult {}),
            "tools/list" => self.handle_tools_list(id),
            "tools/call" => self.handle_tools_call(id, request.params).await,
            _ => JsonRpcResponse::error(id, JsonRpcError::method_not_found(&request.method)),
        };
        Some(response)
    }

    fn handle_notification(&self, method: &str) {
        match method {
            "notifications/initialized" | "initialized" => {
                self.initialized.store(true, Ordering::Release);
                tracing::debug!("Client initialized");
            }
            "notifications/cancelled" => {}
            other => tracing::debug!("Ignoring notification: {}", other),
        }
    }

    fn handle_initialize(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: InitializeParams = params
            .map(|p| serde_json::from_value(p).unwrap_or_default())
            .unwrap_or_default();

        if let Some(client) = &params.client_info {
            tracing::info!(
                "Client connected: {} {}",
                client.name,
                client.version.as_deref().unwrap_or("")
            );
        }

        self.initialized.store(true, Ordering::Release);

        let result = InitializeResult {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
            },
            server_info: ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(SERVER_VERSION.to_string()),
            },
        };

        to_response(id, &result)
    }

    fn handle_tools_list(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = ToolsListResult {
            tools: get_all_tools(),
        };
        to_response(id, &result)
    }

    async fn handle_tools_call(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ToolCallParams = match params {
            Some(p) => match serde_json::from_value(p) {
                Ok(p) => p,
                Err(e) => {
                    return JsonRpcResponse::error(
                        id,
                        JsonRpcError::invalid_params(format!("Invalid params: {}", e)),
                    );
                }
            },
            None => {
                return JsonRpcResponse::error(id, JsonRpcError::invalid_params("Missing params"));
            }
        };

        let args = params.arguments.unwrap_or(Value::Null);
        let tool_result = match self.service.call(&params.name, args).await {
            Ok(result) => ToolCallResult::json(&result),
            Err(failure) => {
                tracing::debug!("Tool {} failed: {}", params.name, failure.message);
                ToolCallResult::failure(&json!({ "error": failure }))
            }
        };

        to_response(id, &tool_result)
    }
}

fn to_response<T: Serialize>(id: Option<Value>, result: &T) -> JsonRpcResponse {
    match serde_json::to_value(result) {
        Ok(value) => JsonRpcResponse::success(id, value),
        Err(e) => JsonRpcResponse::error(id, JsonRpcError::internal_error(e.to_string())),
    }
}

fn log_join_error(joined: Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!("Request task failed: {}", e);
    }
}
