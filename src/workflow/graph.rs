//! 步骤图与路由
//!
//! 无条件边与条件边统一由 next_step 计算：输入刚执行完的步骤、状态与回合阶段，输出下一步。
//! 纯函数，不做任何修改；每回合从 Preprocess 出发，沿唯一路径到达 Answer。

use crate::core::AgentState;
use crate::workflow::types::{ConfirmReply, Step, TurnPhase};

/// 规划器请求澄清时的工具名
pub const CLARIFY_TOOL: &str = "clarify";
/// 直接给出回答的工具名
pub const FINAL_ANSWER_TOOL: &str = "final_answer";

/// 计算下一步
pub fn next_step(step: Step, state: &AgentState, phase: &TurnPhase) -> Step {
    match step {
        Step::Preprocess => route_after_preprocess(state, phase),
        Step::Plan => route_after_plan(state),
        Step::CheckProjectExists | Step::CheckTaskExists => Step::AnalyzeDuplicate,
        Step::AnalyzeDuplicate => route_after_analyze(state),
        Step::Clarify
        | Step::CreateProject
        | Step::CreateTask
        | Step::QueryProjects
        | Step::QueryTasks
        | Step::Answer => Step::Answer,
    }
}

/// 确认 YES 直达暂存的创建步骤（跳过规划与存在性检查）；NO / 含糊回复直达回答
fn route_after_preprocess(state: &AgentState, phase: &TurnPhase) -> Step {
    match phase {
        TurnPhase::Plain | TurnPhase::Clarify { .. } => Step::Plan,
        TurnPhase::Confirm {
            reply: ConfirmReply::Yes,
            ..
        } => match state.intent {
            Some(intent) if intent.is_create() => Step::for_intent(intent),
            _ => Step::Answer,
        },
        TurnPhase::Confirm { .. } => Step::Answer,
    }
}

fn route_after_plan(state: &AgentState) -> Step {
    if state.error.is_some() {
        return Step::Answer;
    }
    match state.used_tool_name.as_deref() {
        Some(CLARIFY_TOOL) => return Step::Clarify,
        Some("query_projects") => return Step::QueryProjects,
        Some("query_tasks") => return Step::QueryTasks,
        _ => {}
    }
    match state.intent {
        Some(intent) if intent.is_create() => Step::existence_check(intent.item_kind()),
        _ => Step::Answer,
    }
}

fn route_after_analyze(state: &AgentState) -> Step {
    if state.error.is_some() {
        return Step::Answer;
    }
    if state.slots.awaiting_confirm_duplicate || state.used_tool_name.as_deref() == Some(CLARIFY_TOOL) {
        return Step::Clarify;
    }
    if state.used_tool_name.as_deref() == Some(FINAL_ANSWER_TOOL) {
        return Step::Answer;
    }
    match state.intent {
        Some(intent) if intent.is_create() => Step::for_intent(intent),
        _ => Step::Answer,
    }
}
