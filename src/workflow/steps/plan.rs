//! 规划：把清洗后的问题交给规划服务，得到 {tool_name, parameters} 并落到状态上
//!
//! 创建类动作先校验必填字段，缺字段则暂存部分参数转入澄清；澄清续接时已有字段补齐新规划留空的字段。
//! 规划服务的任何失败都降级为终态（used_tool_name = final_answer，诊断写入 tool_result），不会留下半设置的状态。

use serde_json::{Map, Value};

use crate::core::{AgentError, AgentState, Intent, RemoteError, StagedPayload, ToolInput};
use crate::guardrail::Guardrail;
use crate::services::types::{is_blank, missing_fields};
use crate::services::{Plan, Services};
use crate::workflow::graph::{CLARIFY_TOOL, FINAL_ANSWER_TOOL};
use crate::workflow::steps::PLANNER_FALLBACK_SUMMARY;
use crate::workflow::types::TurnPhase;

const CLARIFY_ALIAS: &str = "gemini_clarify";

pub async fn plan(
    state: &mut AgentState,
    phase: &TurnPhase,
    services: &dyn Services,
    guardrail: &Guardrail,
) -> Result<(), AgentError> {
    tracing::info!("Plan: resolving user intention");

    let planned = match guardrail.sanitize_input(&state.question) {
        Ok(question) => {
            tracing::debug!(question = %question, "Sanitized question for planner");
            services.plan(&question).await
        }
        Err(e) => Err(RemoteError::malformed(e.to_string())),
    };

    match planned.and_then(|plan| apply_plan(state, phase, plan)) {
        Ok(()) => {
            tracing::debug!(
                tool = state.used_tool_name.as_deref().unwrap_or_default(),
                intent = state.intent.map(|i| i.as_str()).unwrap_or_default(),
                "Plan resolved"
            );
        }
        Err(e) => {
            tracing::warn!(error = %e, "Cannot determine tools, degrading to final answer");
            degrade(state, &e);
        }
    }

    state.previous_node = Some("plan".to_string());
    Ok(())
}

fn apply_plan(state: &mut AgentState, phase: &TurnPhase, plan: Plan) -> Result<(), RemoteError> {
    state.slots.planner_result = serde_json::to_value(&plan).ok();
    let Plan { tool_name, parameters } = plan;

    if tool_name == FINAL_ANSWER_TOOL {
        state.used_tool_name = Some(FINAL_ANSWER_TOOL.to_string());
        state.intent = None;
        state.tool_input = None;
        state.tool_result = Some(match parameters.get("tool_result") {
            Some(Value::String(text)) => text.clone(),
            Some(other) => other.to_string(),
            None => Value::Object(parameters).to_string(),
        });
        return Ok(());
    }

    if tool_name == CLARIFY_TOOL || tool_name == CLARIFY_ALIAS {
        let resumed = phase.clarify_payload();
        let staged = StagedPayload {
            original_question: state.question.clone(),
            missing_fields: string_list(parameters.get("missing_fields")),
            clarify_prompt: parameters
                .get("clarify_prompt")
                .and_then(Value::as_str)
                .map(str::to_string),
            proposed_intent: resumed.and_then(|p| p.proposed_intent),
            proposed_tool_input: resumed.map(|p| p.proposed_tool_input.clone()).unwrap_or_default(),
            item_type: resumed.and_then(|p| p.item_type),
        };
        stage_clarification(state, staged);
        return Ok(());
    }

    let intent = Intent::parse(&tool_name)
        .ok_or_else(|| RemoteError::malformed(format!("planner chose unknown tool '{tool_name}'")))?;

    if !intent.is_create() {
        state.used_tool_name = Some(tool_name);
        state.intent = Some(intent);
        state.tool_input = Some(ToolInput::Params(parameters));
        return Ok(());
    }

    let params = match phase.clarify_payload() {
        Some(resumed) if resumed.proposed_intent == Some(intent) => {
            fill_blanks(parameters, &resumed.proposed_tool_input)
        }
        _ => parameters,
    };

    let kind = intent.item_kind();
    let missing = missing_fields(kind, &params);
    if missing.is_empty() {
        state.used_tool_name = Some(tool_name);
        state.intent = Some(intent);
        state.tool_input = Some(ToolInput::Params(params));
    } else {
        tracing::info!(intent = intent.as_str(), missing = ?missing, "Required fields missing, asking for clarification");
        stage_clarification(
            state,
            StagedPayload {
                original_question: state.question.clone(),
                missing_fields: missing,
                clarify_prompt: None,
                proposed_intent: Some(intent),
                proposed_tool_input: params,
                item_type: Some(kind),
            },
        );
    }
    Ok(())
}

fn stage_clarification(state: &mut AgentState, staged: StagedPayload) {
    state.used_tool_name = Some(CLARIFY_TOOL.to_string());
    state.intent = None;
    state.tool_input = Some(ToolInput::Staged(staged));
}

/// 新参数中缺失或为空的字段由上一轮暂存的参数补齐
fn fill_blanks(mut params: Map<String, Value>, staged: &Map<String, Value>) -> Map<String, Value> {
    for (key, value) in staged {
        let empty = params.get(key).map_or(true, is_blank);
        if empty && !is_blank(value) {
            params.insert(key.clone(), value.clone());
        }
    }
    params
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => s.split(',').map(|f| f.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

fn degrade(state: &mut AgentState, err: &RemoteError) {
    state.used_tool_name = Some(FINAL_ANSWER_TOOL.to_string());
    state.intent = None;
    state.tool_input = None;
    state.slots.planner_result = None;
    state.tool_result = Some(format!("{PLANNER_FALLBACK_SUMMARY} ({err})"));
}
