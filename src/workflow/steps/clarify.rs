//! 澄清：两种互斥模式
//!
//! 重复确认：只重新展示已算好的确认提示并设置 awaiting_confirm_duplicate，不发起远程调用。
//! 缺字段：请澄清服务生成追问；服务失败或返回空文本时退回固定格式的字段列表。

use crate::core::{AgentError, AgentState};
use crate::services::Services;
use crate::workflow::graph::FINAL_ANSWER_TOOL;
use crate::workflow::steps::DEFAULT_CONFIRM_PROMPT;

pub async fn clarify(state: &mut AgentState, services: &dyn Services) -> Result<(), AgentError> {
    let payload = state
        .staged_payload()
        .cloned()
        .ok_or_else(|| AgentError::InvalidState("clarify reached without a staged payload".to_string()))?;

    if payload.is_duplicate_confirmation() {
        tracing::info!("Clarify: asking to confirm a possible duplicate");
        state.slots.awaiting_confirm_duplicate = true;
        state.final_answer = Some(
            payload
                .clarify_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_CONFIRM_PROMPT.to_string()),
        );
    } else {
        tracing::info!(missing = ?payload.missing_fields, "Clarify: asking for missing fields");
        let text = match services
            .clarify(&payload.missing_fields, &payload.original_question)
            .await
        {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => fallback_prompt(&payload.missing_fields),
            Err(e) => {
                tracing::warn!(error = %e, "Clarifier failed, using fallback prompt");
                state.tool_result = Some(format!("ERROR: Clarification failed due to {e}"));
                fallback_prompt(&payload.missing_fields)
            }
        };
        state.final_answer = Some(text);
    }

    state.used_tool_name = Some(FINAL_ANSWER_TOOL.to_string());
    state.previous_node = Some("clarify".to_string());
    Ok(())
}

/// 澄清服务不可用时的固定追问
pub fn fallback_prompt(missing_fields: &[String]) -> String {
    let fields = if missing_fields.is_empty() {
        "(none detected)".to_string()
    } else {
        missing_fields.join(", ")
    };
    format!("Please provide the following missing fields to proceed: {fields}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RemoteError, StagedPayload, ToolInput, CONFIRM_DUPLICATE_FIELD};
    use crate::services::ScriptedServices;

    fn staged(missing: &[&str], prompt: Option<&str>) -> AgentState {
        let mut state = AgentState::new("u", "u");
        state.tool_input = Some(ToolInput::Staged(StagedPayload {
            original_question: "add a task".into(),
            missing_fields: missing.iter().map(|s| s.to_string()).collect(),
            clarify_prompt: prompt.map(str::to_string),
            ..Default::default()
        }));
        state
    }

    #[tokio::test]
    async fn test_duplicate_confirmation_is_display_only() {
        let services = ScriptedServices::new();
        let mut state = staged(&[CONFIRM_DUPLICATE_FIELD], Some("Create this task anyway? (yes/no)"));
        clarify(&mut state, &services).await.unwrap();

        assert!(state.slots.awaiting_confirm_duplicate);
        assert_eq!(state.final_answer.as_deref(), Some("Create this task anyway? (yes/no)"));
        assert!(services.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_clarifier_failure_falls_back() {
        let services = ScriptedServices::new().with_clarification(Err(RemoteError::transport("down")));
        let mut state = staged(&["title", "due_date"], None);
        clarify(&mut state, &services).await.unwrap();

        assert_eq!(
            state.final_answer.as_deref(),
            Some("Please provide the following missing fields to proceed: title, due_date")
        );
        assert!(!state.slots.awaiting_confirm_duplicate);
    }

    #[tokio::test]
    async fn test_clarifier_text_is_used() {
        let services = ScriptedServices::new().with_clarification(Ok("Which project is it for?".into()));
        let mut state = staged(&["project_id"], None);
        clarify(&mut state, &services).await.unwrap();
        assert_eq!(state.final_answer.as_deref(), Some("Which project is it for?"));
    }

    #[tokio::test]
    async fn test_missing_payload_is_an_error() {
        let services = ScriptedServices::new();
        let mut state = AgentState::new("u", "u");
        assert!(clarify(&mut state, &services).await.is_err());
    }
}
