//! 创建 / 查询步骤
//!
//! 每个步骤恰好一次远程调用：成功时把原始结果写入 tool_result，失败时写入带错误与诊断信息的结构化字符串。
//! 失败只体现在数据里，步骤本身总是成功返回并进入回答。

use serde_json::Value;

use crate::core::{AgentError, AgentState, Intent};
use crate::services::{NewProject, NewTask, ProjectQuery, Services, TaskQuery};

pub async fn act(state: &mut AgentState, action: Intent, services: &dyn Services) -> Result<(), AgentError> {
    tracing::info!(action = action.as_str(), "Executing tool action");
    let params = state.params();
    let params_json = Value::Object(params.clone());
    tracing::debug!(action = action.as_str(), params = %params_json, "Action params");

    let outcome: Result<Value, AgentError> = match action {
        Intent::CreateProject => match NewProject::from_params(&params) {
            Ok(project) => services.create_project(&project).await.map_err(AgentError::from),
            Err(e) => Err(e),
        },
        Intent::CreateTask => match NewTask::from_params(&params) {
            Ok(task) => services.create_task(&task).await.map_err(AgentError::from),
            Err(e) => Err(e),
        },
        Intent::QueryProjects => services
            .query_projects(&ProjectQuery::from_params(&params))
            .await
            .map(Value::Array)
            .map_err(AgentError::from),
        Intent::QueryTasks => services
            .query_tasks(&TaskQuery::from_params(&params))
            .await
            .map(Value::Array)
            .map_err(AgentError::from),
    };

    state.tool_result = Some(match outcome {
        Ok(result) => {
            tracing::info!(action = action.as_str(), "Tool action succeeded");
            result.to_string()
        }
        Err(e) => {
            tracing::warn!(action = action.as_str(), error = %e, "Tool action failed");
            failure_report(action, &e, &params)
        }
    });
    state.previous_node = Some(action.as_str().to_string());
    Ok(())
}

/// 失败描述：错误本身 + 诊断信息（动作、错误类别、参数）
fn failure_report(action: Intent, err: &AgentError, params: &serde_json::Map<String, Value>) -> String {
    let (verb, noun) = match action {
        Intent::CreateProject => ("create", "project"),
        Intent::CreateTask => ("create", "task"),
        Intent::QueryProjects => ("query", "projects"),
        Intent::QueryTasks => ("query", "tasks"),
    };
    let kind = match err {
        AgentError::Remote(remote) => remote.kind.to_string(),
        _ => "invalid parameters".to_string(),
    };
    format!(
        "ERROR: Fail to {verb} {noun} because of {err}\n[step={} kind={kind} params={}]",
        action.as_str(),
        Value::Object(params.clone())
    )
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
    async fn test_create_project_records_result() {
        let services = ScriptedServices::new();
        let mut state = with_params(json!({
            "name": "Alpha", "description": "first", "start_date": "2025-01-01",
            "end_date": "2025-02-01", "status": "to do"
        }));
        act(&mut state, Intent::CreateProject, &services).await.unwrap();

        let created: Value = serde_json::from_str(state.tool_result.as_deref().unwrap()).unwrap();
        assert_eq!(created["name"], "Alpha");
        assert_eq!(state.previous_node.as_deref(), Some("create_project"));
        assert_eq!(services.projects().await.len(), 1);
    }

    #[tokio::test]
    async fn test_failures_are_encoded_in_tool_result() {
        let services = ScriptedServices::new().with_query_failure(RemoteError::transport("connection reset"));
        let mut state = with_params(json!({"project_id": 3}));
        act(&mut state, Intent::QueryTasks, &services).await.unwrap();

        let result = state.tool_result.unwrap();
        assert!(result.starts_with("ERROR: Fail to query tasks because of"));
        assert!(result.contains("connection reset"));
        assert!(result.contains("kind=transport error"));
    }

    #[tokio::test]
    async fn test_invalid_task_params_never_call_remote() {
        let services = ScriptedServices::new();
        let mut state = with_params(json!({"title": "x", "project_id": "abc"}));
        act(&mut state, Intent::CreateTask, &services).await.unwrap();

        assert!(state.tool_result.unwrap().starts_with("ERROR: Fail to create task"));
        assert_eq!(services.call_count("create_task").await, 0);
    }
}
