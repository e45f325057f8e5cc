//! 基于 MCP 工具的能力实现
//!
//! 每个方法把定型参数转成工具参数，经 ToolExecutor 调用配置中的远程工具名，再拆开协作者统一的载荷信封
//! `{ "isError": bool, "error"?: ..., <key>: payload }`。

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::config::ToolNamesSection;
use crate::core::{ItemKind, RemoteError};
use crate::services::types::{NewProject, NewTask, Plan, ProjectQuery, TaskQuery};
use crate::services::Services;
use crate::tools::mcp::classify_error_object;
use crate::tools::ToolExecutor;

pub struct McpServices {
    executor: ToolExecutor,
    names: ToolNamesSection,
}

impl McpServices {
    pub fn new(executor: ToolExecutor, names: ToolNamesSection) -> Self {
        Self { executor, names }
    }

    /// 配置了但未被发现的工具名
    pub fn missing_tools(&self) -> Vec<String> {
        self.names
            .all()
            .iter()
            .filter(|name| !self.executor.has_tool(name))
            .map(|name| name.to_string())
            .collect()
    }

    /// 启动时检查：缺失的工具逐个告警（调用时返回 Unavailable）
    pub fn verify_tools(&self) {
        let missing = self.missing_tools();
        for name in &missing {
            tracing::warn!(tool = %name, "Configured tool was not discovered on any MCP server");
        }
        if missing.is_empty() {
            tracing::info!(tools = ?self.executor.tool_names(), "All configured tools discovered");
        }
    }

    async fn call(&self, tool: &str, args: Value, key: &str) -> Result<Value, RemoteError> {
        let raw = self.executor.execute(tool, args).await?;
        unwrap_envelope(tool, raw, key)
    }
}

/// 拆开载荷信封：isError 为真时按 error 对象分类；否则取出 key 对应的载荷
pub fn unwrap_envelope(tool: &str, raw: Value, key: &str) -> Result<Value, RemoteError> {
    let mut envelope = match raw {
        Value::Object(obj) => obj,
        other => {
            return Err(RemoteError::malformed(format!(
                "{tool}: expected a JSON object, got {other}"
            )))
        }
    };

    if envelope.get("isError").and_then(Value::as_bool).unwrap_or(false) {
        let err = match envelope.get("error") {
            Some(Value::String(msg)) => RemoteError::tool_failed(msg.clone()),
            Some(obj @ Value::Object(_)) => classify_error_object(obj),
            Some(other) if !other.is_null() => RemoteError::tool_failed(other.to_string()),
            _ => RemoteError::tool_failed("unknown error"),
        };
        return Err(RemoteError::new(err.kind, format!("{tool}: {}", err.message)));
    }

    envelope
        .remove(key)
        .ok_or_else(|| RemoteError::malformed(format!("{tool}: response has no '{key}' field")))
}

fn to_args<T: serde::Serialize>(tool: &str, value: &T) -> Result<Value, RemoteError> {
    serde_json::to_value(value).map_err(|e| RemoteError::malformed(format!("{tool}: {e}")))
}

fn expect_list(tool: &str, value: Value) -> Result<Vec<Value>, RemoteError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(RemoteError::malformed(format!("{tool}: expected a list, got {other}"))),
    }
}

#[async_trait]
impl Services for McpServices {
    async fn plan(&self, question: &str) -> Result<Plan, RemoteError> {
        let tool = &self.names.planner;
        let plan = self.call(tool, json!({ "question": question }), "plan").await?;
        serde_json::from_value(plan).map_err(|e| RemoteError::malformed(format!("{tool}: invalid plan: {e}")))
    }

    async fn clarify(&self, missing_fields: &[String], original_question: &str) -> Result<String, RemoteError> {
        let tool = &self.names.clarifier;
        let args = json!({
            "missing_fields": missing_fields,
            "original_question": original_question,
        });
        match self.call(tool, args, "clarification").await? {
            Value::String(text) => Ok(text),
            Value::Null => Ok(String::new()),
            other => Err(RemoteError::malformed(format!("{tool}: clarification is not text: {other}"))),
        }
    }

    async fn analyze_duplicate(
        &self,
        new_item: &Map<String, Value>,
        existing_items: &[Value],
        kind: ItemKind,
    ) -> Result<bool, RemoteError> {
        let tool = &self.names.duplicate_analyzer;
        let args = json!({
            "new_item": Value::Object(new_item.clone()).to_string(),
            "existing_items": Value::Array(existing_items.to_vec()).to_string(),
            "item_type": kind.as_str(),
        });
        let verdict = self.call(tool, args, "result").await?;
        match verdict.get("duplicate").and_then(Value::as_bool) {
            Some(duplicate) => Ok(duplicate),
            None => Err(RemoteError::malformed(format!("{tool}: invalid verdict: {verdict}"))),
        }
    }

    async fn compose(&self, question: &str, tool_result: &str, previous_node: &str) -> Result<String, RemoteError> {
        let tool = &self.names.composer;
        let args = json!({
            "question": question,
            "tool_result": tool_result,
            "previous_node": previous_node,
        });
        match self.call(tool, args, "answer").await? {
            Value::String(text) => Ok(text),
            other => Err(RemoteError::malformed(format!("{tool}: answer is not text: {other}"))),
        }
    }

    async fn create_project(&self, project: &NewProject) -> Result<Value, RemoteError> {
        let tool = &self.names.create_project;
        self.call(tool, to_args(tool, project)?, "project").await
    }

    async fn create_task(&self, task: &NewTask) -> Result<Value, RemoteError> {
        let tool = &self.names.create_task;
        self.call(tool, to_args(tool, task)?, "task").await
    }

    async fn query_projects(&self, query: &ProjectQuery) -> Result<Vec<Value>, RemoteError> {
        let tool = &self.names.query_projects;
        let projects = self.call(tool, to_args(tool, query)?, "projects").await?;
        expect_list(tool, projects)
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<Value>, RemoteError> {
        let tool = &self.names.query_tasks;
        let tasks = self.call(tool, to_args(tool, query)?, "tasks").await?;
        expect_list(tool, tasks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RemoteErrorKind;
    use crate::tools::{Tool, ToolRegistry};
    use std::sync::{Arc, Mutex};

    /// 记录收到的参数并返回固定信封
    struct EnvelopeTool {
        name: &'static str,
        reply: Value,
        seen: Arc<Mutex<Vec<Value>>>,
    }

    #[async_trait]
    impl Tool for EnvelopeTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "fixed envelope"
        }

        async fn execute(&self, args: Value) -> Result<Value, RemoteError> {
            self.seen.lock().unwrap().push(args);
            Ok(self.reply.clone())
        }
    }

    fn services(tools: Vec<(&'static str, Value)>) -> (McpServices, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        for (name, reply) in tools {
            registry.register(Arc::new(EnvelopeTool {
                name,
                reply,
                seen: Arc::clone(&seen),
            }));
        }
        let executor = ToolExecutor::new(registry, 5);
        (McpServices::new(executor, ToolNamesSection::default()), seen)
    }

    #[test]
    fn test_unwrap_envelope() {
        let ok = json!({"isError": false, "answer": "Done."});
        assert_eq!(unwrap_envelope("gemini_answer", ok, "answer").unwrap(), json!("Done."));

        let limited = json!({"isError": true, "error": {"code": 429, "status": "RESOURCE_EXHAUSTED", "message": "quota"}});
        let err = unwrap_envelope("gemini_answer", limited, "answer").unwrap_err();
        assert!(err.is_rate_limited());

        let not_found = json!({"isError": true, "error": "No matching projects found."});
        let err = unwrap_envelope("query_projects", not_found, "projects").unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::ToolFailed);
        assert_eq!(err.message, "query_projects: No matching projects found.");

        let missing = json!({"isError": false});
        assert_eq!(
            unwrap_envelope("gemini_planner", missing, "plan").unwrap_err().kind,
            RemoteErrorKind::Malformed
        );
    }

    #[tokio::test]
    async fn test_duplicate_verdict_must_be_boolean() {
        let (svc, _) = services(vec![(
            "gemini_duplicate_analyzer",
            json!({"isError": false, "result": {"verdict": "likely duplicate"}}),
        )]);
        let new_item = json!({"name": "Alpha"}).as_object().cloned().unwrap();
        let err = svc
            .analyze_duplicate(&new_item, &[json!({"name": "Alpha"})], ItemKind::Project)
            .await
            .unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Malformed);

        let (svc, _) = services(vec![(
            "gemini_duplicate_analyzer",
            json!({"isError": false, "result": {"duplicate": "yes"}}),
        )]);
        let err = svc.analyze_duplicate(&new_item, &[], ItemKind::Project).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Malformed);

        let (svc, seen) = services(vec![(
            "gemini_duplicate_analyzer",
            json!({"isError": false, "result": {"duplicate": true}}),
        )]);
        assert!(svc.analyze_duplicate(&new_item, &[], ItemKind::Project).await.unwrap());
        assert_eq!(seen.lock().unwrap()[0]["item_type"], "project");
    }

    #[tokio::test]
    async fn test_plan_and_task_args() {
        let (svc, seen) = services(vec![
            (
                "gemini_planner",
                json!({"isError": false, "plan": {"tool_name": "query_tasks", "parameters": {"project_id": 2}}}),
            ),
            ("query_tasks", json!({"isError": false, "tasks": [{"id": 1, "title": "Spec"}]})),
        ]);

        let plan = svc.plan("tasks in project 2").await.unwrap();
        assert_eq!(plan.tool_name, "query_tasks");
        assert_eq!(plan.parameters["project_id"], 2);

        let tasks = svc
            .query_tasks(&TaskQuery {
                project_id: Some(2),
                title: None,
            })
            .await
            .unwrap();
        assert_eq!(tasks.len(), 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], json!({"question": "tasks in project 2"}));
        assert_eq!(seen[1], json!({"project_id": 2}));
    }

    #[tokio::test]
    async fn test_missing_tools_are_unavailable() {
        let (svc, _) = services(vec![]);
        assert_eq!(svc.missing_tools().len(), 8);
        let err = svc.compose("q", "r", "plan").await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Unavailable);
    }
}
