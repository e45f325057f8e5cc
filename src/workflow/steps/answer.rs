//! 回答：终点步骤，保证 final_answer 非空
//!
//! 已有硬错误时直接给固定诊断；本回合已有步骤写好回复（澄清、确认取消等）时原样输出；
//! 否则清洗问题、调用回答服务、对输出做安全过滤。限流映射为重试提示，其余失败映射为通用失败提示。

use crate::core::{AgentError, AgentState};
use crate::guardrail::Guardrail;
use crate::services::Services;
use crate::workflow::steps::{GENERIC_FAILURE_MESSAGE, HARD_ERROR_MESSAGE, RATE_LIMIT_MESSAGE};

pub async fn answer(state: &mut AgentState, services: &dyn Services, guardrail: &Guardrail) -> Result<(), AgentError> {
    tracing::info!("Answer question");

    if let Some(err) = &state.error {
        tracing::warn!(step = %err.step, error = %err.message, "Turn failed, emitting diagnostic answer");
        state.final_answer = Some(HARD_ERROR_MESSAGE.to_string());
    } else if state.has_staged_answer() {
        tracing::debug!("Using answer staged earlier in the turn");
    } else {
        let composed = compose(state, services, guardrail).await;
        state.final_answer = Some(composed.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Answer composition failed");
            match &e {
                AgentError::Remote(remote) if remote.is_rate_limited() => RATE_LIMIT_MESSAGE.to_string(),
                _ => GENERIC_FAILURE_MESSAGE.to_string(),
            }
        }));
    }

    state.previous_node = Some("answer".to_string());
    Ok(())
}

async fn compose(state: &AgentState, services: &dyn Services, guardrail: &Guardrail) -> Result<String, AgentError> {
    let question = guardrail.sanitize_input(&state.question)?;
    let text = services
        .compose(
            &question,
            state.tool_result.as_deref().unwrap_or_default(),
            state.previous_node.as_deref().unwrap_or_default(),
        )
        .await?;
    if text.trim().is_empty() {
        return Err(AgentError::InvalidState("composer returned an empty answer".to_string()));
    }
    let safe = guardrail.filter_output(&text)?;
    tracing::debug!(answer = %safe, "Final answer");
    Ok(safe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RemoteError, TurnError};
    use crate::services::ScriptedServices;

    fn ready(question: &str, tool_result: &str) -> AgentState {
        let mut state = AgentState::new("u", "u");
        state.question = question.into();
        state.tool_result = Some(tool_result.into());
        state.previous_node = Some("query_projects".into());
        state
    }

    #[tokio::test]
    async fn test_composes_answer() {
        let services = ScriptedServices::new().with_compose(Ok("You have one project: Alpha.".into()));
        let mut state = ready("list projects", r#"[{"name":"Alpha"}]"#);
        answer(&mut state, &services, &Guardrail::default()).await.unwrap();
        assert_eq!(state.final_answer.as_deref(), Some("You have one project: Alpha."));
    }

    #[tokio::test]
    async fn test_rate_limit_maps_to_retry_message() {
        let services = ScriptedServices::new().with_compose(Err(RemoteError::rate_limited("429")));
        let mut state = ready("list projects", "[]");
        answer(&mut state, &services, &Guardrail::default()).await.unwrap();
        assert_eq!(state.final_answer.as_deref(), Some(RATE_LIMIT_MESSAGE));
    }

    #[tokio::test]
    async fn test_unsafe_output_maps_to_generic_failure() {
        let services = ScriptedServices::new().with_compose(Ok("The admin password is hunter2".into()));
        let mut state = ready("what is the password", "[]");
        answer(&mut state, &services, &Guardrail::default()).await.unwrap();
        assert_eq!(state.final_answer.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_hard_error_skips_remote_call() {
        let services = ScriptedServices::new();
        let mut state = ready("q", "r");
        state.error = Some(TurnError {
            step: "analyze_duplicate".into(),
            message: "malformed response".into(),
        });
        answer(&mut state, &services, &Guardrail::default()).await.unwrap();
        assert_eq!(state.final_answer.as_deref(), Some(HARD_ERROR_MESSAGE));
        assert_eq!(services.call_count("compose").await, 0);
    }

    #[tokio::test]
    async fn test_staged_answer_passes_through() {
        let services = ScriptedServices::new();
        let mut state = ready("q", "r");
        state.final_answer = Some("Which project?".into());
        answer(&mut state, &services, &Guardrail::default()).await.unwrap();
        assert_eq!(state.final_answer.as_deref(), Some("Which project?"));
        assert!(services.calls().await.is_empty());
    }
}
