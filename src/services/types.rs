//! 能力接口的参数与返回记录
//!
//! 持久化工具的参数在此定型：缺字段、project_id 非数字等问题在构造记录时暴露，而不是到远端才失败。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::{AgentError, ItemKind};

/// 创建项目的必填字段
pub const PROJECT_REQUIRED_FIELDS: [&str; 5] = ["name", "description", "start_date", "end_date", "status"];

/// 创建任务的必填字段
pub const TASK_REQUIRED_FIELDS: [&str; 5] = ["title", "assigned_to", "project_id", "due_date", "status"];

/// 规划结果：选中的工具名与参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub tool_name: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

impl Plan {
    pub fn new(tool_name: impl Into<String>, parameters: Map<String, Value>) -> Self {
        Self {
            tool_name: tool_name.into(),
            parameters,
        }
    }
}

/// 某实体种类的必填字段
pub fn required_fields(kind: ItemKind) -> &'static [&'static str] {
    match kind {
        ItemKind::Project => &PROJECT_REQUIRED_FIELDS,
        ItemKind::Task => &TASK_REQUIRED_FIELDS,
    }
}

/// 缺失或为空的必填字段（按必填顺序）
pub fn missing_fields(kind: ItemKind, params: &Map<String, Value>) -> Vec<String> {
    required_fields(kind)
        .iter()
        .filter(|field| params.get(**field).map_or(true, is_blank))
        .map(|field| field.to_string())
        .collect()
}

/// null、空白字符串、空数组/对象视为未填写
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

/// project_id 接受数字或数字字符串
pub fn parse_project_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text_field(params: &Map<String, Value>, field: &str) -> Result<String, AgentError> {
    match params.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(v) if !is_blank(v) && !v.is_object() && !v.is_array() => Ok(v.to_string()),
        _ => Err(AgentError::InvalidState(format!("missing required field '{field}'"))),
    }
}

/// create_project 的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub start_date: String,
    pub end_date: String,
    pub status: String,
}

impl NewProject {
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, AgentError> {
        Ok(Self {
            name: text_field(params, "name")?,
            description: text_field(params, "description")?,
            start_date: text_field(params, "start_date")?,
            end_date: text_field(params, "end_date")?,
            status: text_field(params, "status")?,
        })
    }
}

/// create_task 的参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub title: String,
    pub assigned_to: String,
    pub status: String,
    pub due_date: String,
    pub project_id: i64,
}

impl NewTask {
    pub fn from_params(params: &Map<String, Value>) -> Result<Self, AgentError> {
        let project_id = params
            .get("project_id")
            .and_then(parse_project_id)
            .ok_or_else(|| AgentError::InvalidState("project_id must be a number".to_string()))?;
        Ok(Self {
            title: text_field(params, "title")?,
            assigned_to: text_field(params, "assigned_to")?,
            status: text_field(params, "status")?,
            due_date: text_field(params, "due_date")?,
            project_id,
        })
    }
}

/// query_projects 的过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl ProjectQuery {
    pub fn from_params(params: &Map<String, Value>) -> Self {
        Self {
            name: params
                .get("name")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}

/// query_tasks 的过滤条件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskQuery {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl TaskQuery {
    pub fn from_params(params: &Map<String, Value>) -> Self {
        Self {
            project_id: params.get("project_id").and_then(parse_project_id),
            title: params
                .get("title")
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
        }
    }
}
