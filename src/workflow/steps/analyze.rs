//! 查重分析：把待创建实体与存在性检查结果交给查重服务
//!
//! 重复时暂存可读的冲突列表与 yes/no 提示，转入确认分支；不重复时直接进入创建步骤。
//! 查重服务失败以 Err 返回，由引擎转为诊断回答，不做猜测。

use serde_json::Value;

use crate::core::{AgentError, AgentState, ItemKind, StagedPayload, ToolInput, CONFIRM_DUPLICATE_FIELD};
use crate::services::Services;
use crate::workflow::graph::CLARIFY_TOOL;

pub async fn analyze_duplicate(state: &mut AgentState, services: &dyn Services) -> Result<(), AgentError> {
    tracing::info!("Analyzing results after existence check");

    let Some(intent) = state.intent.filter(|i| i.is_create()) else {
        tracing::debug!("No create intent, nothing to analyze");
        state.previous_node = Some("analyze_duplicate".to_string());
        return Ok(());
    };
    let kind = intent.item_kind();
    let params = state.params();
    let existing: Vec<Value> = state
        .tool_result
        .as_deref()
        .and_then(|raw| serde_json::from_str(raw).ok())
        .unwrap_or_default();

    let duplicate = services.analyze_duplicate(&params, &existing, kind).await?;
    tracing::info!(kind = kind.as_str(), duplicate, "Duplicate analysis verdict");

    if duplicate {
        let prompt = duplicate_prompt(kind, &existing);
        state.used_tool_name = Some(CLARIFY_TOOL.to_string());
        state.intent = None;
        state.tool_input = Some(ToolInput::Staged(StagedPayload {
            original_question: state.question.clone(),
            missing_fields: vec![CONFIRM_DUPLICATE_FIELD.to_string()],
            clarify_prompt: Some(prompt),
            proposed_intent: Some(intent),
            proposed_tool_input: params,
            item_type: Some(kind),
        }));
    } else {
        state.used_tool_name = Some(intent.as_str().to_string());
    }

    state.previous_node = Some("analyze_duplicate".to_string());
    Ok(())
}

/// 冲突实体列表与确认提示
pub fn duplicate_prompt(kind: ItemKind, existing: &[Value]) -> String {
    let lines: Vec<String> = existing
        .iter()
        .map(|item| {
            format!(
                "- {} (id={}, created_time={})",
                display(&item[kind.label_field()]),
                display(&item["id"]),
                display(&item["created_time"]),
            )
        })
        .collect();
    let detail = if lines.is_empty() {
        "(no details)".to_string()
    } else {
        lines.join("\n")
    };
    let kind = kind.as_str();
    format!("I found existing {kind}(s) that look similar:\n{detail}\n\nCreate this {kind} anyway? (yes/no)")
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "unknown".to_string(),
        other => other.to_string(),
    }
}
