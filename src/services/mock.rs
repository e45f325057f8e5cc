//! 脚本化能力实现（用于测试与本地演示，无需远程服务）
//!
//! 规划结果按队列逐个返回；持久化工具落在进程内的简易项目/任务表上，行为与远端一致
//! （查询无结果时返回 "No matching ... found" 错误）。每次调用记录方法名，便于断言某步骤是否执行。

use std::collections::VecDeque;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;

use crate::core::{ItemKind, RemoteError};
use crate::services::types::{NewProject, NewTask, Plan, ProjectQuery, TaskQuery};
use crate::services::Services;

#[derive(Default)]
struct Tracker {
    projects: Vec<Value>,
    tasks: Vec<Value>,
    next_id: i64,
}

impl Tracker {
    fn insert(&mut self, kind: ItemKind, mut item: Value) -> Value {
        self.next_id += 1;
        if let Value::Object(obj) = &mut item {
            obj.insert("id".into(), json!(self.next_id));
            obj.insert("created_time".into(), json!(chrono::Utc::now().to_rfc3339()));
        }
        match kind {
            ItemKind::Project => self.projects.push(item.clone()),
            ItemKind::Task => self.tasks.push(item.clone()),
        }
        item
    }
}

fn same_text(value: &Value, wanted: &str) -> bool {
    value
        .as_str()
        .is_some_and(|s| s.trim().eq_ignore_ascii_case(wanted.trim()))
}

/// 脚本化 Services
#[derive(Default)]
pub struct ScriptedServices {
    plans: Mutex<VecDeque<Result<Plan, RemoteError>>>,
    clarification: Option<Result<String, RemoteError>>,
    duplicate_verdict: Option<Result<bool, RemoteError>>,
    compose_reply: Option<Result<String, RemoteError>>,
    query_failure: Option<RemoteError>,
    create_failure: Option<RemoteError>,
    tracker: Mutex<Tracker>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedServices {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一个规划结果（parameters 须为 JSON 对象）
    pub fn with_plan(mut self, tool_name: &str, parameters: Value) -> Self {
        self.plans.get_mut().push_back(Ok(scripted_plan(tool_name, parameters)));
        self
    }

    pub fn with_plan_error(mut self, err: RemoteError) -> Self {
        self.plans.get_mut().push_back(Err(err));
        self
    }

    pub fn with_clarification(mut self, reply: Result<String, RemoteError>) -> Self {
        self.clarification = Some(reply);
        self
    }

    /// 固定查重结论；未设置时按显示名是否相同判断
    pub fn with_duplicate_verdict(mut self, verdict: Result<bool, RemoteError>) -> Self {
        self.duplicate_verdict = Some(verdict);
        self
    }

    /// 固定回答；未设置时回显 tool_result
    pub fn with_compose(mut self, reply: Result<String, RemoteError>) -> Self {
        self.compose_reply = Some(reply);
        self
    }

    /// 所有查询都以该错误失败
    pub fn with_query_failure(mut self, err: RemoteError) -> Self {
        self.query_failure = Some(err);
        self
    }

    pub fn with_create_failure(mut self, err: RemoteError) -> Self {
        self.create_failure = Some(err);
        self
    }

    /// 预置一个已存在的项目（自动分配 id 与 created_time）
    pub fn with_project(mut self, project: Value) -> Self {
        self.tracker.get_mut().insert(ItemKind::Project, project);
        self
    }

    pub fn with_task(mut self, task: Value) -> Self {
        self.tracker.get_mut().insert(ItemKind::Task, task);
        self
    }

    /// 运行中追加规划结果（多回合测试）
    pub async fn push_plan(&self, tool_name: &str, parameters: Value) {
        self.plans
            .lock()
            .await
            .push_back(Ok(scripted_plan(tool_name, parameters)));
    }

    /// 按调用顺序记录的方法名
    pub async fn calls(&self) -> Vec<String> {
        self.calls.lock().await.clone()
    }

    pub async fn call_count(&self, method: &str) -> usize {
        self.calls.lock().await.iter().filter(|c| *c == method).count()
    }

    pub async fn projects(&self) -> Vec<Value> {
        self.tracker.lock().await.projects.clone()
    }

    pub async fn tasks(&self) -> Vec<Value> {
        self.tracker.lock().await.tasks.clone()
    }

    async fn record(&self, method: &str) {
        self.calls.lock().await.push(method.to_string());
    }
}

fn scripted_plan(tool_name: &str, parameters: Value) -> Plan {
    Plan::new(tool_name, parameters.as_object().cloned().unwrap_or_default())
}

#[async_trait]
impl Services for ScriptedServices {
    async fn plan(&self, _question: &str) -> Result<Plan, RemoteError> {
        self.record("plan").await;
        self.plans
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(RemoteError::unavailable("no scripted plan left")))
    }

    async fn clarify(&self, missing_fields: &[String], _original_question: &str) -> Result<String, RemoteError> {
        self.record("clarify").await;
        match &self.clarification {
            Some(reply) => reply.clone(),
            None => Ok(format!("Could you tell me the {}?", missing_fields.join(", "))),
        }
    }

    async fn analyze_duplicate(
        &self,
        new_item: &Map<String, Value>,
        existing_items: &[Value],
        kind: ItemKind,
    ) -> Result<bool, RemoteError> {
        self.record("analyze_duplicate").await;
        if let Some(verdict) = &self.duplicate_verdict {
            return verdict.clone();
        }
        let field = kind.label_field();
        let Some(label) = new_item.get(field).and_then(Value::as_str) else {
            return Ok(false);
        };
        Ok(existing_items.iter().any(|item| same_text(&item[field], label)))
    }

    async fn compose(&self, _question: &str, tool_result: &str, _previous_node: &str) -> Result<String, RemoteError> {
        self.record("compose").await;
        match &self.compose_reply {
            Some(reply) => reply.clone(),
            None => Ok(format!("Result: {tool_result}")),
        }
    }

    async fn create_project(&self, project: &NewProject) -> Result<Value, RemoteError> {
        self.record("create_project").await;
        if let Some(err) = &self.create_failure {
            return Err(err.clone());
        }
        let item = serde_json::to_value(project).map_err(|e| RemoteError::malformed(e.to_string()))?;
        Ok(self.tracker.lock().await.insert(ItemKind::Project, item))
    }

    async fn create_task(&self, task: &NewTask) -> Result<Value, RemoteError> {
        self.record("create_task").await;
        if let Some(err) = &self.create_failure {
            return Err(err.clone());
        }
        let item = serde_json::to_value(task).map_err(|e| RemoteError::malformed(e.to_string()))?;
        Ok(self.tracker.lock().await.insert(ItemKind::Task, item))
    }

    async fn query_projects(&self, query: &ProjectQuery) -> Result<Vec<Value>, RemoteError> {
        self.record("query_projects").await;
        if let Some(err) = &self.query_failure {
            return Err(err.clone());
        }
        let found: Vec<Value> = self
            .tracker
            .lock()
            .await
            .projects
            .iter()
            .filter(|p| query.name.as_deref().map_or(true, |name| same_text(&p["name"], name)))
            .cloned()
            .collect();
        if found.is_empty() {
            return Err(RemoteError::tool_failed("No matching projects found."));
        }
        Ok(found)
    }

    async fn query_tasks(&self, query: &TaskQuery) -> Result<Vec<Value>, RemoteError> {
        self.record("query_tasks").await;
        if let Some(err) = &self.query_failure {
            return Err(err.clone());
        }
        let found: Vec<Value> = self
            .tracker
            .lock()
            .await
            .tasks
            .iter()
            .filter(|t| query.project_id.map_or(true, |id| t["project_id"].as_i64() == Some(id)))
            .filter(|t| query.title.as_deref().map_or(true, |title| same_text(&t["title"], title)))
            .cloned()
            .collect();
        if found.is_empty() {
            return Err(RemoteError::tool_failed("No matching tasks found."));
        }
        Ok(found)
    }
}
