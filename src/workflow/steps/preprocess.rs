//! 预处理：回合归一化
//!
//! 只依据状态中已有的结构信号（awaiting_confirm_duplicate 标志、暂存载荷的形状）判定回合阶段，不发起任何远程调用。

use crate::core::{AgentError, AgentState, ToolInput};
use crate::workflow::graph::FINAL_ANSWER_TOOL;
use crate::workflow::steps::{CONFIRM_REMINDER, DEFAULT_CONFIRM_PROMPT};
use crate::workflow::types::{ConfirmReply, TurnPhase};

pub fn preprocess(state: &mut AgentState, max_history: usize) -> Result<TurnPhase, AgentError> {
    tracing::info!("Preprocess: normalizing turn");
    let latest = state.latest_user_message();
    let phase = detect_phase(state, &latest);

    match &phase {
        TurnPhase::Plain => {
            state.slots.question_history = vec![latest.clone()];
            state.tool_input = None;
            state.tool_result = None;
            state.final_answer = None;
            state.intent = None;
            state.used_tool_name = None;
            state.slots.planner_result = None;
            state.question = latest;
        }
        TurnPhase::Clarify { payload } => {
            let history = &mut state.slots.question_history;
            if history.is_empty() {
                history.push(payload.original_question.clone());
            }
            history.push(latest);
            trim_history(history, max_history);
            state.question = history.join(" ");
        }
        TurnPhase::Confirm { payload, reply } => match reply {
            ConfirmReply::Yes => {
                let intent = payload
                    .proposed_intent
                    .filter(|i| i.is_create())
                    .ok_or_else(|| {
                        AgentError::InvalidState("confirmed duplicate without a staged create intent".to_string())
                    })?;
                tracing::info!(intent = intent.as_str(), "Duplicate creation confirmed");
                state.slots.awaiting_confirm_duplicate = false;
                state.intent = Some(intent);
                state.used_tool_name = Some(intent.as_str().to_string());
                state.tool_input = Some(ToolInput::Params(payload.proposed_tool_input.clone()));
                state.question = payload.original_question.clone();
            }
            ConfirmReply::No => {
                tracing::info!("Duplicate creation declined");
                state.slots.awaiting_confirm_duplicate = false;
                state.slots.question_history = vec![latest];
                state.tool_input = None;
                state.intent = None;
                state.used_tool_name = Some(FINAL_ANSWER_TOOL.to_string());
                state.final_answer = Some(cancellation_message(payload));
            }
            ConfirmReply::Ambiguous => {
                tracing::info!(reply = %latest, "Ambiguous reply to duplicate confirmation");
                let prompt = payload.clarify_prompt.as_deref().unwrap_or(DEFAULT_CONFIRM_PROMPT);
                state.used_tool_name = Some(FINAL_ANSWER_TOOL.to_string());
                state.final_answer = Some(format!("{CONFIRM_REMINDER}{prompt}"));
            }
        },
    }

    state.previous_node = Some("preprocess".to_string());
    Ok(phase)
}

fn detect_phase(state: &mut AgentState, latest: &str) -> TurnPhase {
    let staged = state.staged_payload().cloned();
    if state.slots.awaiting_confirm_duplicate {
        match staged {
            Some(payload)
                if payload.is_duplicate_confirmation() && payload.proposed_intent.is_some_and(|i| i.is_create()) =>
            {
                return TurnPhase::Confirm {
                    reply: ConfirmReply::classify(latest),
                    payload,
                };
            }
            _ => {
                tracing::warn!("Awaiting duplicate confirmation without a staged create, starting a plain turn");
                state.slots.awaiting_confirm_duplicate = false;
                state.tool_input = None;
            }
        }
    } else if let Some(payload) = staged {
        if payload.awaits_clarification() && !payload.is_duplicate_confirmation() {
            return TurnPhase::Clarify { payload };
        }
    }
    TurnPhase::Plain
}

fn trim_history(history: &mut Vec<String>, max_history: usize) {
    if history.len() > max_history {
        history.drain(..history.len() - max_history);
    }
}

fn cancellation_message(payload: &crate::core::StagedPayload) -> String {
    let kind = payload
        .item_type
        .or_else(|| payload.proposed_intent.map(|i| i.item_kind()))
        .map(|k| k.as_str())
        .unwrap_or("item");
    match payload.item_label() {
        Some(label) => format!("Okay, I won't create the {kind} '{label}'."),
        None => format!("Okay, I won't create the {kind}."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Intent, ItemKind, StagedPayload, CONFIRM_DUPLICATE_FIELD};
    use serde_json::json;

    fn confirm_state(reply: &str) -> AgentState {
        let mut state = AgentState::new("u", "u");
        state.slots.awaiting_confirm_duplicate = true;
        state.tool_input = Some(ToolInput::Staged(StagedPayload {
            original_question: "create project Alpha".into(),
            missing_fields: vec![CONFIRM_DUPLICATE_FIELD.into()],
            clarify_prompt: Some("Create this project anyway? (yes/no)".into()),
            proposed_intent: Some(Intent::CreateProject),
            proposed_tool_input: json!({"name": "Alpha"}).as_object().cloned().unwrap(),
            item_type: Some(ItemKind::Project),
        }));
        state.begin_turn(reply);
        state
    }

    #[test]
    fn test_plain_turn_resets_history_and_scratch() {
        let mut state = AgentState::new("u", "u");
        state.slots.question_history = vec!["a".into(), "b".into()];
        state.tool_input = Some(ToolInput::Params(json!({"name": "x"}).as_object().cloned().unwrap()));
        state.begin_turn("list my projects");

        let phase = preprocess(&mut state, 4).unwrap();
        assert_eq!(phase, TurnPhase::Plain);
        assert_eq!(state.slots.question_history, vec!["list my projects"]);
        assert!(state.tool_input.is_none());
        assert_eq!(state.question, "list my projects");
    }

    #[test]
    fn test_clarify_continuation_stitches_question() {
        let mut state = AgentState::new("u", "u");
        state.slots.question_history = vec!["create project Alpha".into()];
        state.tool_input = Some(ToolInput::Staged(StagedPayload {
            original_question: "create project Alpha".into(),
            missing_fields: vec!["status".into()],
            ..Default::default()
        }));
        state.begin_turn("status is to do");

        let phase = preprocess(&mut state, 4).unwrap();
        assert!(matches!(phase, TurnPhase::Clarify { .. }));
        assert_eq!(state.question, "create project Alpha status is to do");
        assert!(state.staged_payload().is_some());
    }

    #[test]
    fn test_history_is_trimmed_to_limit() {
        let mut state = AgentState::new("u", "u");
        state.slots.question_history = vec!["q1".into(), "q2".into(), "q3".into()];
        state.tool_input = Some(ToolInput::Staged(StagedPayload {
            original_question: "q1".into(),
            missing_fields: vec!["title".into()],
            ..Default::default()
        }));
        state.begin_turn("q4");
        preprocess(&mut state, 2).unwrap();
        assert_eq!(state.slots.question_history, vec!["q3", "q4"]);
    }

    #[test]
    fn test_confirm_yes_adopts_staged_payload() {
        let mut state = confirm_state("yes");
        let phase = preprocess(&mut state, 4).unwrap();
        assert!(matches!(phase, TurnPhase::Confirm { reply: ConfirmReply::Yes, .. }));
        assert!(!state.slots.awaiting_confirm_duplicate);
        assert_eq!(state.intent, Some(Intent::CreateProject));
        assert_eq!(state.params()["name"], "Alpha");
    }

    #[test]
    fn test_confirm_no_cancels() {
        let mut state = confirm_state("nope");
        preprocess(&mut state, 4).unwrap();
        assert!(!state.slots.awaiting_confirm_duplicate);
        assert!(state.tool_input.is_none());
        assert_eq!(
            state.final_answer.as_deref(),
            Some("Okay, I won't create the project 'Alpha'.")
        );
    }

    #[test]
    fn test_confirm_ambiguous_keeps_flag() {
        let mut state = confirm_state("hmm, maybe");
        preprocess(&mut state, 4).unwrap();
        assert!(state.slots.awaiting_confirm_duplicate);
        assert!(state.staged_payload().is_some());
        assert_eq!(
            state.final_answer.as_deref(),
            Some("Please reply with 'yes' or 'no'.\n\nCreate this project anyway? (yes/no)")
        );
    }

    #[test]
    fn test_confirm_without_staged_intent_starts_plain_turn() {
        let mut state = confirm_state("yes");
        if let Some(ToolInput::Staged(payload)) = state.tool_input.as_mut() {
            payload.proposed_intent = None;
        }

        let phase = preprocess(&mut state, 4).unwrap();
        assert_eq!(phase, TurnPhase::Plain);
        assert!(!state.slots.awaiting_confirm_duplicate);
        assert!(state.tool_input.is_none());
        assert_eq!(state.question, "yes");
    }
}
