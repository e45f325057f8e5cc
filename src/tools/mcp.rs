//! MCP 工具客户端（HTTP JSON-RPC）
//!
//! 每个工具服务器对应一个 McpClient：connect 时发送 `initialize` 并记录响应头 `mcp-session-id`，
//! 随后发送 `notifications/initialized`；之后的请求都携带该会话头。响应可能是普通 JSON，
//! 也可能是 SSE（`data:` 行），两者统一解析。失败在此一次性分类为 RemoteError。
//!
//! discover_mcp_tools 并发连接所有服务器，把 `tools/list` 结果注册为 McpTool，合并到同一个 ToolRegistry。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use reqwest::StatusCode;
use serde_json::{json, Value};

use crate::config::{McpSection, McpServerSection};
use crate::core::RemoteError;
use crate::tools::{Tool, ToolRegistry};

const ACCEPT: &str = "application/json,text/event-stream";
const SESSION_HEADER: &str = "mcp-session-id";

/// JSON-RPC 中表示限流的错误码
const RATE_LIMIT_CODES: [i64; 2] = [429, -32029];

/// 单个工具服务器的 HTTP JSON-RPC 会话
pub struct McpClient {
    server: String,
    url: String,
    http: reqwest::Client,
    session_id: Option<String>,
    next_id: AtomicU64,
}

impl McpClient {
    /// 建立会话：initialize -> 记录 mcp-session-id -> notifications/initialized
    pub async fn connect(server: &McpServerSection, opts: &McpSection) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(opts.request_timeout_secs))
            .build()
            .map_err(|e| RemoteError::transport(e.to_string()))?;

        let mut client = Self {
            server: server.name.clone(),
            url: server.url.clone(),
            http,
            session_id: None,
            next_id: AtomicU64::new(1),
        };

        let init = client.request_body(
            "initialize",
            json!({
                "protocolVersion": opts.protocol_version,
                "capabilities": {},
                "clientInfo": {
                    "name": opts.client_name,
                    "version": env!("CARGO_PKG_VERSION"),
                }
            }),
        );
        let (session_id, body) = client.post(&init).await?;
        rpc_result(parse_rpc_body(&body)?)?;

        match &session_id {
            Some(id) => tracing::info!(server = %client.server, session_id = %id, "MCP session initialized"),
            None => tracing::info!(server = %client.server, "MCP server did not assign a session id"),
        }
        client.session_id = session_id;

        client
            .send_notification("notifications/initialized", json!({}))
            .await?;
        Ok(client)
    }

    pub fn server_name(&self) -> &str {
        &self.server
    }

    fn request_body(&self, method: &str, params: Value) -> Value {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        })
    }

    /// 发送一次 POST，返回（会话头, 响应文本）；HTTP 层失败在此分类
    async fn post(&self, body: &Value) -> Result<(Option<String>, String), RemoteError> {
        let mut req = self
            .http
            .post(&self.url)
            .header(reqwest::header::ACCEPT, ACCEPT)
            .json(body);
        if let Some(id) = &self.session_id {
            req = req.header(SESSION_HEADER, id);
        }

        let resp = req.send().await.map_err(classify_reqwest_error)?;
        let status = resp.status();
        let session_id = resp
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let text = resp.text().await.map_err(classify_reqwest_error)?;

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(RemoteError::rate_limited(format!(
                "{} returned HTTP 429: {}",
                self.server,
                truncate(&text)
            )));
        }
        if !status.is_success() {
            return Err(RemoteError::transport(format!(
                "{} returned HTTP {}: {}",
                self.server,
                status.as_u16(),
                truncate(&text)
            )));
        }
        Ok((session_id, text))
    }

    /// 发送 JSON-RPC 请求并返回 result
    pub async fn send_request(&self, method: &str, params: Value) -> Result<Value, RemoteError> {
        let body = self.request_body(method, params);
        tracing::debug!(server = %self.server, method, "MCP request");
        let (_, text) = self.post(&body).await?;
        rpc_result(parse_rpc_body(&text)?)
    }

    /// 发送通知（无 id，不期待结果）
    async fn send_notification(&self, method: &str, params: Value) -> Result<(), RemoteError> {
        let body = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
        });
        self.post(&body).await?;
        Ok(())
    }

    pub async fn list_tools(&self) -> Result<Vec<Value>, RemoteError> {
        let result = self.send_request("tools/list", json!({})).await?;
        Ok(result["tools"].as_array().cloned().unwrap_or_default())
    }

    /// tools/call：拼接 content 中的文本块，能解析为 JSON 则返回 JSON，否则返回字符串
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, RemoteError> {
        let result = self
            .send_request(
                "tools/call",
                json!({
                    "name": name,
                    "arguments": arguments,
                }),
            )
            .await?;
        extract_tool_result(name, &result)
    }
}

/// 远程工具：调用转发到所属服务器的会话
pub struct McpTool {
    name: String,
    description: String,
    schema: Value,
    client: Arc<McpClient>,
}

impl McpTool {
    pub fn from_listing(listing: &Value, client: Arc<McpClient>) -> Option<Self> {
        let name = listing["name"].as_str()?.to_string();
        Some(Self {
            name,
            description: listing["description"].as_str().unwrap_or_default().to_string(),
            schema: listing
                .get("inputSchema")
                .cloned()
                .unwrap_or_else(|| json!({ "type": "object", "properties": {} })),
            client,
        })
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        self.schema.clone()
    }

    async fn execute(&self, args: Value) -> Result<Value, RemoteError> {
        self.client.call_tool(&self.name, args).await
    }
}

/// 并发连接所有服务器并合并工具；连接或列举失败的服务器被跳过，同名工具保留先发现者
pub async fn discover_mcp_tools(servers: &[McpServerSection], opts: &McpSection) -> ToolRegistry {
    let sessions = join_all(servers.iter().map(|server| async move {
        let client = McpClient::connect(server, opts).await?;
        let tools = client.list_tools().await?;
        Ok::<_, RemoteError>((Arc::new(client), tools))
    }))
    .await;

    let mut registry = ToolRegistry::new();
    for (server, session) in servers.iter().zip(sessions) {
        let (client, tools) = match session {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(server = %server.name, url = %server.url, error = %e, "Skipping MCP server");
                continue;
            }
        };
        for listing in &tools {
            let Some(tool) = McpTool::from_listing(listing, Arc::clone(&client)) else {
                tracing::warn!(server = %server.name, "Ignoring tool listing without a name");
                continue;
            };
            tracing::debug!(
                server = %client.server_name(),
                tool = %tool.name(),
                description = %tool.description(),
                schema = %tool.parameters_schema(),
                "Discovered MCP tool"
            );
            let name = tool.name.clone();
            if !registry.register(Arc::new(tool)) {
                tracing::warn!(server = %server.name, tool = %name, "Duplicate tool name, keeping the first registration");
            }
        }
        tracing::info!(server = %server.name, tools = tools.len(), "MCP tools discovered");
    }
    registry
}

fn classify_reqwest_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::timeout(e.to_string())
    } else {
        RemoteError::transport(e.to_string())
    }
}

fn truncate(text: &str) -> String {
    if text.chars().count() > 300 {
        format!("{}...", text.chars().take(300).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 解析响应体：普通 JSON，或 SSE 中第一条带 result/error 的 `data:` 消息
pub fn parse_rpc_body(text: &str) -> Result<Value, RemoteError> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') {
        return serde_json::from_str(trimmed)
            .map_err(|e| RemoteError::malformed(format!("invalid JSON-RPC response: {e}")));
    }
    trimmed
        .lines()
        .filter_map(|line| line.strip_prefix("data:"))
        .filter_map(|data| serde_json::from_str::<Value>(data.trim()).ok())
        .find(|msg| msg.get("result").is_some() || msg.get("error").is_some())
        .ok_or_else(|| RemoteError::malformed(format!("no JSON-RPC message in response: {}", truncate(trimmed))))
}

/// 取出 result；error 对象按错误码分类
fn rpc_result(mut response: Value) -> Result<Value, RemoteError> {
    if let Some(error) = response.get("error").filter(|e| !e.is_null()) {
        return Err(classify_error_object(error));
    }
    match response.get_mut("result") {
        Some(result) => Ok(result.take()),
        None => Err(RemoteError::malformed("JSON-RPC response has neither result nor error")),
    }
}

/// 结构化错误对象 -> RemoteError：错误码 429 / -32029 或 status RESOURCE_EXHAUSTED / RATE_LIMITED 视为限流
pub fn classify_error_object(error: &Value) -> RemoteError {
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| error.as_str().map(str::to_string))
        .unwrap_or_else(|| error.to_string());

    if is_rate_limit_object(error) {
        RemoteError::rate_limited(message)
    } else if error.get("code").is_some() && error.get("status").is_none() {
        RemoteError::protocol(message)
    } else {
        RemoteError::tool_failed(message)
    }
}

fn is_rate_limit_object(error: &Value) -> bool {
    let code_hit = error
        .get("code")
        .and_then(Value::as_i64)
        .is_some_and(|c| RATE_LIMIT_CODES.contains(&c));
    let status_hit = error
        .get("status")
        .and_then(Value::as_str)
        .is_some_and(|s| matches!(s, "RESOURCE_EXHAUSTED" | "RATE_LIMITED"));
    code_hit || status_hit
}

/// tools/call 的 result -> 工具返回值
fn extract_tool_result(tool: &str, result: &Value) -> Result<Value, RemoteError> {
    let text = match result["content"].as_array() {
        Some(content) => content
            .iter()
            .filter_map(|c| c["text"].as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        None => return Ok(result.clone()),
    };
    let parsed = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));

    if result["isError"].as_bool().unwrap_or(false) {
        let err = match &parsed {
            Value::Object(obj) => obj
                .get("error")
                .map(classify_error_object)
                .unwrap_or_else(|| classify_error_object(&parsed)),
            other => RemoteError::tool_failed(other.as_str().unwrap_or_default().to_string()),
        };
        return Err(RemoteError::new(err.kind, format!("{tool}: {}", err.message)));
    }
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RemoteErrorKind;

    #[test]
    fn test_parse_plain_and_sse_bodies() {
        let plain = r#"{"jsonrpc":"2.0","id":1,"result":{"tools":[]}}"#;
        assert_eq!(parse_rpc_body(plain).unwrap()["id"], 1);

        let sse = "event: message\ndata: {\"jsonrpc\":\"2.0\",\"id\":2,\"result\":{\"ok\":true}}\n\n";
        assert_eq!(parse_rpc_body(sse).unwrap()["result"]["ok"], true);

        let err = parse_rpc_body("event: ping\n\n").unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Malformed);
    }

    #[test]
    fn test_rpc_error_classification() {
        let limited = json!({"jsonrpc":"2.0","id":3,"error":{"code":429,"message":"slow down"}});
        assert_eq!(rpc_result(limited).unwrap_err().kind, RemoteErrorKind::RateLimited);

        let limited = json!({"error":{"code":-32029,"message":"quota"}});
        assert_eq!(rpc_result(limited).unwrap_err().kind, RemoteErrorKind::RateLimited);

        let invalid = json!({"error":{"code":-32602,"message":"Invalid params"}});
        let err = rpc_result(invalid).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Protocol);
        assert_eq!(err.message, "Invalid params");
    }

    #[test]
    fn test_extract_tool_result_parses_json_text() {
        let result = json!({
            "content": [{"type": "text", "text": "{\"isError\": false, \"answer\": \"hi\"}"}]
        });
        let value = extract_tool_result("gemini_answer", &result).unwrap();
        assert_eq!(value["answer"], "hi");

        let plain = json!({"content": [{"type": "text", "text": "done"}]});
        assert_eq!(extract_tool_result("x", &plain).unwrap(), json!("done"));
    }

    #[test]
    fn test_extract_tool_result_is_error() {
        let exhausted = json!({
            "isError": true,
            "content": [{"type": "text", "text": "{\"error\": {\"code\": 429, \"status\": \"RESOURCE_EXHAUSTED\", \"message\": \"quota\"}}"}]
        });
        let err = extract_tool_result("gemini_planner", &exhausted).unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::RateLimited);
        assert!(err.message.starts_with("gemini_planner"));

        let failed = json!({"isError": true, "content": [{"type": "text", "text": "boom"}]});
        assert_eq!(
            extract_tool_result("create_task", &failed).unwrap_err().kind,
            RemoteErrorKind::ToolFailed
        );
    }
}
