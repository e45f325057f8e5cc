//! 工作流类型定义
//!
//! 步骤标签、回合阶段（预处理时一次性确定）、确认回复分类与引擎构建错误。

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{Intent, ItemKind, StagedPayload};

/// 单回合遍历的最大步骤数
pub const MAX_STEPS: usize = 12;

/// 图中的步骤；入口为 Preprocess，终点为 Answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Preprocess,
    Plan,
    Clarify,
    CheckProjectExists,
    CheckTaskExists,
    AnalyzeDuplicate,
    CreateProject,
    CreateTask,
    QueryProjects,
    QueryTasks,
    Answer,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Preprocess => "preprocess",
            Self::Plan => "plan",
            Self::Clarify => "clarify",
            Self::CheckProjectExists => "check_project_exists",
            Self::CheckTaskExists => "check_task_exists",
            Self::AnalyzeDuplicate => "analyze_duplicate",
            Self::CreateProject => "create_project",
            Self::CreateTask => "create_task",
            Self::QueryProjects => "query_projects",
            Self::QueryTasks => "query_tasks",
            Self::Answer => "answer",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Answer)
    }

    /// 意图对应的动作步骤（创建或查询）
    pub fn for_intent(intent: Intent) -> Self {
        match intent {
            Intent::CreateProject => Self::CreateProject,
            Intent::CreateTask => Self::CreateTask,
            Intent::QueryProjects => Self::QueryProjects,
            Intent::QueryTasks => Self::QueryTasks,
        }
    }

    /// 创建前的存在性检查步骤
    pub fn existence_check(kind: ItemKind) -> Self {
        match kind {
            ItemKind::Project => Self::CheckProjectExists,
            ItemKind::Task => Self::CheckTaskExists,
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 用户对重复确认的回复
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmReply {
    Yes,
    No,
    Ambiguous,
}

const YES_REPLIES: [&str; 12] = [
    "yes", "y", "yeah", "yep", "yup", "sure", "ok", "okay", "confirm", "go ahead", "create it", "do it",
];

const NO_REPLIES: [&str; 10] = [
    "no", "n", "nope", "nah", "cancel", "stop", "abort", "don't", "do not", "never mind",
];

impl ConfirmReply {
    /// 去首尾空白、转小写、去掉结尾标点后与 YES / NO 集合比较
    pub fn classify(reply: &str) -> Self {
        let normalized = reply.trim().to_lowercase().replace('\u{2019}', "'");
        let normalized = normalized
            .trim_end_matches(|c: char| c.is_ascii_punctuation() || c.is_whitespace())
            .trim();
        if YES_REPLIES.contains(&normalized) {
            Self::Yes
        } else if NO_REPLIES.contains(&normalized) {
            Self::No
        } else {
            Self::Ambiguous
        }
    }
}

/// 回合阶段：预处理根据状态中的结构信号选定，之后驱动路由
#[derive(Debug, Clone, PartialEq)]
pub enum TurnPhase {
    /// 普通回合
    Plain,
    /// 缺字段澄清的续接
    Clarify { payload: StagedPayload },
    /// 重复确认的续接
    Confirm {
        payload: StagedPayload,
        reply: ConfirmReply,
    },
}

impl TurnPhase {
    /// 澄清续接时的暂存载荷
    pub fn clarify_payload(&self) -> Option<&StagedPayload> {
        match self {
            Self::Clarify { payload } => Some(payload),
            _ => None,
        }
    }
}

/// 工作流错误类型
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Invalid workflow configuration: {0}")]
    InvalidConfiguration(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirm_reply_classification() {
        for reply in ["yes", " Yes! ", "OK.", "go ahead", "Create it!!", "y"] {
            assert_eq!(ConfirmReply::classify(reply), ConfirmReply::Yes, "{reply}");
        }
        for reply in ["no", "Nope.", "don't", "Don\u{2019}t", "never mind", "CANCEL"] {
            assert_eq!(ConfirmReply::classify(reply), ConfirmReply::No, "{reply}");
        }
        for reply in ["maybe", "yes please create two", "", "what?"] {
            assert_eq!(ConfirmReply::classify(reply), ConfirmReply::Ambiguous, "{reply}");
        }
    }

    #[test]
    fn test_step_names() {
        assert_eq!(Step::for_intent(Intent::QueryTasks), Step::QueryTasks);
        assert_eq!(Step::existence_check(ItemKind::Project).as_str(), "check_project_exists");
        assert!(Step::Answer.is_terminal());
    }
}
