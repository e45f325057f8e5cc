//! 状态定义：AgentState 及其组成部分
//!
//! 每个线程（thread_id）一份 AgentState：回合开始时新建或从检查点恢复，步骤逐个修改，回合结束时持久化。
//! 序列化后的 AgentState 即对外的不透明 `state`，可由调用方原样回传。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::memory::Message;

/// 重复确认在 missing_fields 中使用的标记字段
pub const CONFIRM_DUPLICATE_FIELD: &str = "confirm_duplicate";

/// 用户意图：仅当 used_tool_name 指向创建/查询动作时设置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    CreateProject,
    CreateTask,
    QueryProjects,
    QueryTasks,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateProject => "create_project",
            Self::CreateTask => "create_task",
            Self::QueryProjects => "query_projects",
            Self::QueryTasks => "query_tasks",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "create_project" => Some(Self::CreateProject),
            "create_task" => Some(Self::CreateTask),
            "query_projects" => Some(Self::QueryProjects),
            "query_tasks" => Some(Self::QueryTasks),
            _ => None,
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, Self::CreateProject | Self::CreateTask)
    }

    pub fn item_kind(&self) -> ItemKind {
        match self {
            Self::CreateProject | Self::QueryProjects => ItemKind::Project,
            Self::CreateTask | Self::QueryTasks => ItemKind::Task,
        }
    }
}

/// 被追踪实体的种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Project,
    Task,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Task => "task",
        }
    }

    /// 实体的显示名字段：项目为 name，任务为 title
    pub fn label_field(&self) -> &'static str {
        match self {
            Self::Project => "name",
            Self::Task => "title",
        }
    }

    pub fn create_intent(&self) -> Intent {
        match self {
            Self::Project => Intent::CreateProject,
            Self::Task => Intent::CreateTask,
        }
    }
}

/// 工作记忆：跨步骤/跨回合的信号
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Slots {
    /// 有序问题历史，长度不超过 N
    #[serde(default)]
    pub question_history: Vec<String>,
    /// 是否在等待用户确认重复创建
    #[serde(default)]
    pub awaiting_confirm_duplicate: bool,
    /// 本回合缓存的规划结果
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub planner_result: Option<Value>,
    /// 其余自由槽位，原样保留
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 澄清 / 重复确认挂起前暂存的参数，用户回复后恰好恢复一次
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagedPayload {
    pub original_question: String,
    #[serde(default)]
    pub missing_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clarify_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proposed_intent: Option<Intent>,
    #[serde(default)]
    pub proposed_tool_input: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_type: Option<ItemKind>,
}

impl StagedPayload {
    /// 是否为重复确认（而非缺字段澄清）
    pub fn is_duplicate_confirmation(&self) -> bool {
        self.missing_fields.iter().any(|f| f == CONFIRM_DUPLICATE_FIELD)
    }

    /// 是否仍有未完成的澄清
    pub fn awaits_clarification(&self) -> bool {
        !self.missing_fields.is_empty() || self.clarify_prompt.is_some()
    }

    /// 暂存实体的显示名（项目 name / 任务 title）
    pub fn item_label(&self) -> Option<&str> {
        let kind = self
            .item_type
            .or_else(|| self.proposed_intent.map(|i| i.item_kind()))?;
        self.proposed_tool_input
            .get(kind.label_field())
            .and_then(|v| v.as_str())
    }
}

/// 待执行动作的参数：普通参数对象，或挂起中的暂存载荷
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolInput {
    Staged(StagedPayload),
    Params(Map<String, Value>),
}

impl ToolInput {
    pub fn staged(&self) -> Option<&StagedPayload> {
        match self {
            Self::Staged(p) => Some(p),
            Self::Params(_) => None,
        }
    }

    pub fn params(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Params(p) => Some(p),
            Self::Staged(_) => None,
        }
    }
}

/// 结构化失败记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnError {
    pub step: String,
    pub message: String,
}

/// 单线程对话的回合状态
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentState {
    /// 本回合的有效问题（澄清时为拼接文本）
    pub question: String,
    pub slots: Slots,
    /// 完整对话记录，跨回合只追加
    pub messages: Vec<Message>,
    pub tool_input: Option<ToolInput>,
    pub tool_result: Option<String>,
    pub final_answer: Option<String>,
    pub intent: Option<Intent>,
    pub used_tool_name: Option<String>,
    pub previous_node: Option<String>,
    pub error: Option<TurnError>,
    pub user_id: String,
    pub thread_id: String,
}

impl AgentState {
    pub fn new(user_id: impl Into<String>, thread_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            thread_id: thread_id.into(),
            ..Default::default()
        }
    }

    /// 回合开始：记录用户消息，question 只取本条，清空本回合的临时字段（tool_input 与 slots 保留，供预处理判断续接）
    pub fn begin_turn(&mut self, message: &str) {
        self.messages.push(Message::user(message));
        self.question = message.to_string();
        self.reset_transients();
    }

    /// 清空每回合的临时路由字段
    pub fn reset_transients(&mut self) {
        self.used_tool_name = None;
        self.intent = None;
        self.final_answer = None;
        self.tool_result = None;
        self.previous_node = None;
        self.error = None;
        self.slots.planner_result = None;
    }

    /// 回合结束：把最终回复写入对话记录
    pub fn finish_turn(&mut self) {
        let answer = self.final_answer.clone().unwrap_or_default();
        self.messages.push(Message::assistant(answer));
    }

    /// 最近一条用户消息；没有时退回 question
    pub fn latest_user_message(&self) -> String {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::memory::Role::User)
            .map(|m| m.content.clone())
            .unwrap_or_else(|| self.question.clone())
    }

    pub fn staged_payload(&self) -> Option<&StagedPayload> {
        self.tool_input.as_ref().and_then(ToolInput::staged)
    }

    /// 当前动作参数（非暂存时）；无参数返回空对象
    pub fn params(&self) -> Map<String, Value> {
        self.tool_input
            .as_ref()
            .and_then(ToolInput::params)
            .cloned()
            .unwrap_or_default()
    }

    /// final_answer 是否已在本回合被某步骤写入
    pub fn has_staged_answer(&self) -> bool {
        self.final_answer
            .as_deref()
            .is_some_and(|a| !a.trim().is_empty())
    }
}
