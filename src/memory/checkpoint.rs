//! 检查点存储抽象层
//!
//! 按 thread_id 保存每个线程的 AgentState，支持内存和 SQLite 两种实现；多线程并发访问安全。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::core::{AgentError, AgentState};

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 读取线程的最新状态
    async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, AgentError>;

    /// 保存状态（以 state.thread_id 为键，覆盖旧值）
    async fn save(&self, state: &AgentState) -> Result<(), AgentError>;

    /// 删除线程的检查点
    async fn remove(&self, thread_id: &str) -> Result<(), AgentError>;

    /// 清理过期检查点，返回清理数量
    async fn cleanup_expired(&self) -> usize;
}

/// 内存检查点：thread_id -> (状态, 最后写入时间)
pub struct MemoryCheckpointStore {
    entries: RwLock<HashMap<String, (AgentState, Instant)>>,
    ttl: Duration,
}

impl MemoryCheckpointStore {
    pub fn new(ttl_secs: u64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::from_secs(ttl_secs),
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for MemoryCheckpointStore {
    fn default() -> Self {
        Self::new(86_400)
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, AgentError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(thread_id)
            .filter(|(_, saved_at)| saved_at.elapsed() <= self.ttl)
            .map(|(state, _)| state.clone()))
    }

    async fn save(&self, state: &AgentState) -> Result<(), AgentError> {
        if state.thread_id.is_empty() {
            return Err(AgentError::Checkpoint("thread_id is required".to_string()));
        }
        self.entries
            .write()
            .await
            .insert(state.thread_id.clone(), (state.clone(), Instant::now()));
        Ok(())
    }

    async fn remove(&self, thread_id: &str) -> Result<(), AgentError> {
        self.entries.write().await.remove(thread_id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, (_, saved_at)| saved_at.elapsed() <= self.ttl);
        before - entries.len()
    }
}

/// 创建检查点存储
///
/// 如果提供了 db_path 且启用了 async-sqlite feature，则使用 SQLite；否则使用内存存储
pub async fn create_checkpoint_store(
    db_path: Option<&std::path::Path>,
    ttl_secs: u64,
) -> Arc<dyn CheckpointStore> {
    #[cfg(feature = "async-sqlite")]
    if let Some(path) = db_path {
        match super::sqlite::SqliteCheckpointStore::new(path).await {
            Ok(store) => {
                tracing::info!("Using SQLite checkpoint store: {:?}", path);
                return Arc::new(store);
            }
            Err(e) => {
                tracing::warn!("Failed to open SQLite checkpoint store, falling back to memory: {}", e);
            }
        }
    }

    #[cfg(not(feature = "async-sqlite"))]
    if db_path.is_some() {
        tracing::warn!("SQLite checkpoint store requested but async-sqlite feature not enabled, using memory store");
    }

    tracing::info!("Using in-memory checkpoint store");
    Arc::new(MemoryCheckpointStore::new(ttl_secs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_round_trip() {
        let store = MemoryCheckpointStore::default();
        let mut state = AgentState::new("alice", "alice");
        state.question = "list my projects".into();
        store.save(&state).await.unwrap();

        let loaded = store.load("alice").await.unwrap().expect("saved state");
        assert_eq!(loaded, state);
        assert!(store.load("bob").await.unwrap().is_none());

        store.remove("alice").await.unwrap();
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_store_rejects_missing_thread_id() {
        let store = MemoryCheckpointStore::default();
        let err = store.save(&AgentState::default()).await.unwrap_err();
        assert!(matches!(err, AgentError::Checkpoint(_)));
    }

    #[tokio::test]
    async fn test_expired_entries_are_evicted() {
        let store = MemoryCheckpointStore::new(0);
        store.save(&AgentState::new("a", "a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert!(store.load("a").await.unwrap().is_none());
        assert_eq!(store.cleanup_expired().await, 1);
        assert_eq!(store.len().await, 0);
    }
}
