//! Headless Agent 运行时
//!
//! 供 REPL 与 HTTP API 调用的回合入口：process_turn 接收 {user_id, message, state?}，
//! 恢复或新建 AgentState，跑一遍步骤图，写检查点并返回 {answer, state}。
//! 同一线程的回合由线程级异步锁串行化，不同线程并发执行。

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::Instrument;

use crate::config::AppConfig;
use crate::core::{AgentError, AgentState};
use crate::guardrail::Guardrail;
use crate::memory::{create_checkpoint_store, CheckpointStore};
use crate::services::{McpServices, Services};
use crate::tools::{discover_mcp_tools, ToolExecutor};
use crate::workflow::{EngineBuilder, TurnEngine};

const ANONYMOUS_USER: &str = "anon";

/// 回合请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    pub message: String,
    /// 调用方回传的上一回合状态；缺省时从检查点恢复
    #[serde(default)]
    pub state: Option<AgentState>,
}

impl TurnRequest {
    pub fn new(user_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            message: message.into(),
            state: None,
        }
    }
}

/// 回合响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResponse {
    pub answer: String,
    pub state: AgentState,
}

/// 回合运行时：引擎 + 检查点 + 线程锁
pub struct Agent {
    engine: TurnEngine,
    store: Arc<dyn CheckpointStore>,
    thread_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Agent {
    pub fn new(engine: TurnEngine, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            engine,
            store,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn CheckpointStore> {
        Arc::clone(&self.store)
    }

    /// 处理一个回合
    pub async fn process_turn(&self, req: TurnRequest) -> Result<TurnResponse, AgentError> {
        let TurnRequest {
            user_id: requested_user,
            message,
            state: carried,
        } = req;
        let message = message.trim();
        if message.is_empty() {
            return Err(AgentError::InvalidRequest("message is required".to_string()));
        }

        let user_id = non_empty(requested_user.as_deref())
            .or_else(|| carried.as_ref().and_then(|s| non_empty(Some(s.user_id.as_str()))))
            .unwrap_or(ANONYMOUS_USER)
            .to_string();
        let thread_id = carried
            .as_ref()
            .and_then(|s| non_empty(Some(s.thread_id.as_str())))
            .unwrap_or(user_id.as_str())
            .to_string();

        let lock_key = thread_id.clone();
        let lock = self.thread_lock(&lock_key).await;
        let guard = lock.lock().await;

        let turn_id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("turn", thread_id = %thread_id, turn_id = %turn_id);
        let result = async move {
            let mut state = match carried {
                Some(state) => state,
                None => match self.store.load(&thread_id).await? {
                    Some(saved) => {
                        tracing::debug!("Rehydrated state from checkpoint");
                        saved
                    }
                    None => AgentState::new(user_id.clone(), thread_id.clone()),
                },
            };
            if state.user_id.is_empty() {
                state.user_id = user_id;
            }
            if state.thread_id.is_empty() {
                state.thread_id = thread_id;
            }

            state.begin_turn(message);
            let path = self.engine.run(&mut state).await;
            state.finish_turn();
            tracing::info!(steps = ?path, "Turn complete");

            self.store.save(&state).await?;
            Ok::<_, AgentError>(TurnResponse {
                answer: state.final_answer.clone().unwrap_or_default(),
                state,
            })
        }
        .instrument(span)
        .await;

        drop(guard);
        drop(lock);
        self.release_thread_lock(&lock_key).await;
        result
    }

    async fn thread_lock(&self, thread_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.thread_locks.lock().await;
        Arc::clone(locks.entry(thread_id.to_string()).or_default())
    }

    /// 没有其他回合持有或等待时移除线程锁
    async fn release_thread_lock(&self, thread_id: &str) {
        let mut locks = self.thread_locks.lock().await;
        if locks.get(thread_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(thread_id);
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// 用给定的能力实现组装 Agent（引擎参数与检查点存储取自配置）
pub async fn build_agent(cfg: &AppConfig, services: Arc<dyn Services>) -> Result<Agent, AgentError> {
    let guardrail = Guardrail::new(cfg.app.max_input_length, cfg.guardrail.forbidden_terms.clone());
    let engine = EngineBuilder::new(services)
        .max_history(cfg.app.max_question_history)
        .guardrail(guardrail)
        .build()
        .map_err(|e| AgentError::ConfigError(e.to_string()))?;
    let store = create_checkpoint_store(cfg.checkpoint.db_path.as_deref(), cfg.checkpoint.ttl_secs).await;
    Ok(Agent::new(engine, store))
}

/// 连接配置中的工具服务器、发现工具并组装 Agent；在处理任何回合之前完成
pub async fn create_agent(cfg: &AppConfig) -> Result<Agent, AgentError> {
    let servers = cfg.mcp.effective_servers();
    if servers.is_empty() {
        tracing::warn!("No MCP servers configured (set [mcp].servers or MCP_SERVER_URL)");
    }
    let registry = discover_mcp_tools(&servers, &cfg.mcp).await;
    tracing::info!(tools = registry.len(), "Tool discovery finished");

    let services = McpServices::new(
        ToolExecutor::new(registry, cfg.tools.tool_timeout_secs),
        cfg.tools.names.clone(),
    );
    services.verify_tools();
    build_agent(cfg, Arc::new(services)).await
}
