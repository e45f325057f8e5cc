//! SQLite 检查点存储（sqlx，异步）
//!
//! 每个线程一行：state 列保存序列化后的 AgentState，保存即 upsert。需要启用 `async-sqlite` feature。

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::core::{AgentError, AgentState};
use crate::memory::CheckpointStore;

/// SQLite 检查点存储
pub struct SqliteCheckpointStore {
    pool: SqlitePool,
}

impl SqliteCheckpointStore {
    /// 打开（或创建）数据库并建表
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;

        let store = Self { pool };
        store.init_tables().await?;

        Ok(store)
    }

    async fn init_tables(&self) -> Result<(), sqlx::Error> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS checkpoints (
                thread_id TEXT PRIMARY KEY,
                state TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// 关闭连接池
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn db_error(e: sqlx::Error) -> AgentError {
    AgentError::Checkpoint(e.to_string())
}

#[async_trait]
impl CheckpointStore for SqliteCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<AgentState>, AgentError> {
        let row = sqlx::query("SELECT state FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        match row {
            Some(row) => {
                let raw: String = row.get("state");
                Ok(Some(serde_json::from_str(&raw)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, state: &AgentState) -> Result<(), AgentError> {
        if state.thread_id.is_empty() {
            return Err(AgentError::Checkpoint("thread_id is required".to_string()));
        }
        let raw = serde_json::to_string(state)?;
        let now = chrono::Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO checkpoints (thread_id, state, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(thread_id) DO UPDATE SET state = excluded.state, updated_at = excluded.updated_at",
        )
        .bind(&state.thread_id)
        .bind(&raw)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(())
    }

    async fn remove(&self, thread_id: &str) -> Result<(), AgentError> {
        sqlx::query("DELETE FROM checkpoints WHERE thread_id = ?")
            .bind(thread_id)
            .execute(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    /// SQLite 检查点不自动过期
    async fn cleanup_expired(&self) -> usize {
        0
    }
}
