//! 存在性检查：创建前按名称（项目）或 project_id + title（任务）查询可能冲突的实体
//!
//! 查重是尽力而为：查询失败（包括 "No matching ... found"）一律视为空结果，回合继续。

use serde_json::Value;

use crate::core::{AgentError, AgentState, ItemKind};
use crate::services::{ProjectQuery, Services, TaskQuery};

pub async fn check_exists(state: &mut AgentState, kind: ItemKind, services: &dyn Services) -> Result<(), AgentError> {
    tracing::info!(kind = kind.as_str(), "Check if item already exists");
    let params = state.params();

    let found = match kind {
        ItemKind::Project => {
            let query = ProjectQuery::from_params(&params);
            tracing::debug!(?query, "check_project_exists params");
            services.query_projects(&query).await
        }
        ItemKind::Task => {
            let query = TaskQuery::from_params(&params);
            tracing::debug!(?query, "check_task_exists params");
            services.query_tasks(&query).await
        }
    };

    let existing = found.unwrap_or_else(|e| {
        tracing::warn!(kind = kind.as_str(), error = %e, "Existence check failed, assuming no existing items");
        Vec::new()
    });
    tracing::info!(kind = kind.as_str(), count = existing.len(), "Existence check done");

    state.tool_result = Some(Value::Array(existing).to_string());
    state.previous_node = Some(
        match kind {
            ItemKind::Project => "check_project_exists",
            ItemKind::Task => "check_task_exists",
        }
        .to_string(),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{RemoteError, ToolInput};
    use crate::services::ScriptedServices;
    use serde_json::json;

    fn with_params(params: Value) -> AgentState {
        let mut state = AgentState::new("u", "u");
        state.tool_input = Some(ToolInput::Params(params.as_object().cloned().unwrap()));
        state
    }

    #[tokio::test]
    async fn test_failing_endpoint_yields_empty_result() {
        let services = ScriptedServices::new().with_query_failure(RemoteError::transport("connection refused"));
        let mut state = with_params(json!({"name": "Alpha"}));
        check_exists(&mut state, ItemKind::Project, &services).await.unwrap();

        assert_eq!(state.tool_result.as_deref(), Some("[]"));
        assert_eq!(state.previous_node.as_deref(), Some("check_project_exists"));
    }

    #[tokio::test]
    async fn test_task_check_filters_by_project_and_title() {
        let services = ScriptedServices::new()
            .with_task(json!({"title": "Write docs", "project_id": 1}))
            .with_task(json!({"title": "Write docs", "project_id": 2}));
        let mut state = with_params(json!({"title": "write docs", "project_id": "2"}));
        check_exists(&mut state, ItemKind::Task, &services).await.unwrap();

        let found: Vec<Value> = serde_json::from_str(state.tool_result.as_deref().unwrap()).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0]["project_id"], 2);
    }
}
