//! 工作流引擎
//!
//! 显式有限状态机：当前步骤标签 -> 对应处理函数 -> next_step 计算下一标签，由单个循环驱动到 Answer。
//! 每步执行前保存状态快照；步骤返回 Err 时恢复快照、写入 error 并跳转 Answer，错误不会逃出回合。

use std::sync::Arc;

use crate::core::{AgentError, AgentState, Intent, ItemKind, TurnError};
use crate::guardrail::Guardrail;
use crate::services::Services;
use crate::workflow::graph::next_step;
use crate::workflow::steps::{self, GENERIC_FAILURE_MESSAGE, HARD_ERROR_MESSAGE};
use crate::workflow::types::{Step, TurnPhase, MAX_STEPS};

/// 回合引擎：无内部可变状态，可被多个线程的回合并发共享
pub struct TurnEngine {
    services: Arc<dyn Services>,
    guardrail: Guardrail,
    max_history: usize,
}

impl TurnEngine {
    pub(crate) fn new(services: Arc<dyn Services>, guardrail: Guardrail, max_history: usize) -> Self {
        Self {
            services,
            guardrail,
            max_history,
        }
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// 从 Preprocess 遍历到 Answer，返回实际执行的步骤序列
    pub async fn run(&self, state: &mut AgentState) -> Vec<Step> {
        let mut path = Vec::new();
        let mut phase = TurnPhase::Plain;
        let mut step = Step::Preprocess;

        while path.len() < MAX_STEPS {
            path.push(step);
            tracing::info!(step = step.as_str(), "Running step");

            let snapshot = state.clone();
            if let Err(e) = self.run_step(step, state, &mut phase).await {
                tracing::warn!(step = step.as_str(), error = %e, "Step failed, routing to answer");
                *state = snapshot;
                state.error = Some(TurnError {
                    step: step.as_str().to_string(),
                    message: e.to_string(),
                });
                if step.is_terminal() {
                    state.final_answer = Some(HARD_ERROR_MESSAGE.to_string());
                    return path;
                }
                state.previous_node = Some(step.as_str().to_string());
                step = Step::Answer;
                continue;
            }

            if step.is_terminal() {
                self.ensure_answer(state);
                return path;
            }

            let next = next_step(step, state, &phase);
            tracing::debug!(from = step.as_str(), to = next.as_str(), "Route");
            step = next;
        }

        tracing::error!(steps = ?path, "Step limit exceeded, forcing answer");
        state.error = Some(TurnError {
            step: "router".to_string(),
            message: format!("step limit of {MAX_STEPS} exceeded"),
        });
        if let Err(e) = self.run_step(Step::Answer, state, &mut phase).await {
            tracing::warn!(error = %e, "Answer step failed after step limit");
        }
        path.push(Step::Answer);
        self.ensure_answer(state);
        path
    }

    async fn run_step(&self, step: Step, state: &mut AgentState, phase: &mut TurnPhase) -> Result<(), AgentError> {
        let services = self.services.as_ref();
        match step {
            Step::Preprocess => {
                *phase = steps::preprocess(state, self.max_history)?;
                Ok(())
            }
            Step::Plan => steps::plan(state, phase, services, &self.guardrail).await,
            Step::Clarify => steps::clarify(state, services).await,
            Step::CheckProjectExists => steps::check_exists(state, ItemKind::Project, services).await,
            Step::CheckTaskExists => steps::check_exists(state, ItemKind::Task, services).await,
            Step::AnalyzeDuplicate => steps::analyze_duplicate(state, services).await,
            Step::CreateProject => steps::act(state, Intent::CreateProject, services).await,
            Step::CreateTask => steps::act(state, Intent::CreateTask, services).await,
            Step::QueryProjects => steps::act(state, Intent::QueryProjects, services).await,
            Step::QueryTasks => steps::act(state, Intent::QueryTasks, services).await,
            Step::Answer => steps::answer(state, services, &self.guardrail).await,
        }
    }

    fn ensure_answer(&self, state: &mut AgentState) {
        if state.final_answer.as_deref().map_or(true, |a| a.trim().is_empty()) {
            state.final_answer = Some(GENERIC_FAILURE_MESSAGE.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RemoteError;
    use crate::services::ScriptedServices;
    use crate::workflow::EngineBuilder;
    use serde_json::json;

    fn engine(services: ScriptedServices) -> (TurnEngine, Arc<ScriptedServices>) {
        let services = Arc::new(services);
        let engine = EngineBuilder::new(services.clone()).build().unwrap();
        (engine, services)
    }

    fn turn(message: &str) -> AgentState {
        let mut state = AgentState::new("u", "u");
        state.begin_turn(message);
        state
    }

    #[tokio::test]
    async fn test_query_path() {
        let (engine, _) = engine(
            ScriptedServices::new()
                .with_project(json!({"name": "Alpha"}))
                .with_plan("query_projects", json!({})),
        );
        let mut state = turn("list projects");
        let path = engine.run(&mut state).await;

        assert_eq!(path, vec![Step::Preprocess, Step::Plan, Step::QueryProjects, Step::Answer]);
        assert!(state.final_answer.unwrap().contains("Alpha"));
        assert_eq!(state.intent, Some(Intent::QueryProjects));
    }

    #[tokio::test]
    async fn test_analysis_failure_restores_snapshot_and_answers() {
        let (engine, services) = engine(
            ScriptedServices::new()
                .with_plan(
                    "create_project",
                    json!({"name": "Alpha", "description": "d", "start_date": "2025-01-01",
                           "end_date": "2025-02-01", "status": "to do"}),
                )
                .with_duplicate_verdict(Err(RemoteError::malformed("not a verdict"))),
        );
        let mut state = turn("create project Alpha");
        let path = engine.run(&mut state).await;

        assert_eq!(
            path,
            vec![
                Step::Preprocess,
                Step::Plan,
                Step::CheckProjectExists,
                Step::AnalyzeDuplicate,
                Step::Answer
            ]
        );
        assert_eq!(state.error.as_ref().unwrap().step, "analyze_duplicate");
        assert_eq!(state.final_answer.as_deref(), Some(HARD_ERROR_MESSAGE));
        assert_eq!(services.call_count("create_project").await, 0);
    }

    #[tokio::test]
    async fn test_planner_outage_still_answers() {
        let (engine, _) = engine(
            ScriptedServices::new()
                .with_plan_error(RemoteError::transport("down"))
                .with_compose(Err(RemoteError::transport("down"))),
        );
        let mut state = turn("hello");
        let path = engine.run(&mut state).await;

        assert_eq!(path, vec![Step::Preprocess, Step::Plan, Step::Answer]);
        assert_eq!(state.final_answer.as_deref(), Some(GENERIC_FAILURE_MESSAGE));
    }
}
