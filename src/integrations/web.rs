//! HTTP 对话接口
//!
//! - GET  /      健康检查
//! - POST /chat  {user_id?, message, state?} -> {answer, state}

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};

use crate::agent::{Agent, TurnRequest, TurnResponse};
use crate::core::AgentError;

/// 构建路由
pub fn create_router(agent: Arc<Agent>) -> Router {
    Router::new()
        .route("/", get(health))
        .route("/chat", post(chat))
        .with_state(agent)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// POST /chat - 运行一个回合
async fn chat(
    State(agent): State<Arc<Agent>>,
    Json(req): Json<TurnRequest>,
) -> Result<Json<TurnResponse>, (StatusCode, String)> {
    match agent.process_turn(req).await {
        Ok(resp) => Ok(Json(resp)),
        Err(AgentError::InvalidRequest(msg)) => Err((StatusCode::BAD_REQUEST, msg)),
        Err(e) => {
            tracing::error!(error = %e, "Turn failed");
            Err((StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::build_agent;
    use crate::config::AppConfig;
    use crate::services::ScriptedServices;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use serde_json::{json, Value};
    use tower::ServiceExt;

    async fn router(services: ScriptedServices) -> Router {
        let agent = build_agent(&AppConfig::default(), Arc::new(services)).await.unwrap();
        create_router(Arc::new(agent))
    }

    fn post_chat(body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(ScriptedServices::new()).await;
        let resp = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn test_chat_returns_answer_and_state() {
        let app = router(ScriptedServices::new().with_plan("final_answer", json!({"tool_result": "pong"}))).await;
        let resp = app
            .oneshot(post_chat(json!({"user_id": "web-user", "message": "ping"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let value: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["answer"], "Result: pong");
        assert_eq!(value["state"]["user_id"], "web-user");
        assert_eq!(value["state"]["thread_id"], "web-user");
    }

    #[tokio::test]
    async fn test_blank_message_is_bad_request() {
        let app = router(ScriptedServices::new()).await;
        let resp = app.oneshot(post_chat(json!({"message": "  "}))).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
