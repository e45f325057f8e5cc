//! 工具注册表
//!
//! 远程发现的工具实现 Tool trait（name / description / execute），由 ToolRegistry 按名注册与查找，
//! ToolExecutor 在调用时加超时并输出审计日志。发现完成后注册表只读，无需加锁。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::RemoteError;

/// 工具 trait：名称、描述、参数 schema、异步执行（args 为 JSON 对象）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（tools/call 的 name）
    fn name(&self) -> &str;

    /// 工具描述
    fn description(&self) -> &str;

    /// 参数 JSON Schema（来自 tools/list 的 inputSchema）
    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 执行工具，返回解析后的结果（能解析为 JSON 则为 JSON，否则为字符串）
    async fn execute(&self, args: Value) -> Result<Value, RemoteError>;
}

/// 工具注册表：按名称存储 Arc<dyn Tool>，多个会话的工具合并到同一命名空间
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册工具；同名工具已存在时保留先注册者并返回 false
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> bool {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return false;
        }
        self.tools.insert(name, tool);
        true
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub async fn execute(&self, name: &str, args: Value) -> Result<Value, RemoteError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| RemoteError::unavailable(format!("Unknown tool: {name}")))?;
        tool.execute(args).await
    }

    /// 已注册的工具名（排序后）
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
