//! 记忆层：对话记录与按线程的检查点持久化

pub mod checkpoint;
pub mod conversation;
#[cfg(feature = "async-sqlite")]
pub mod sqlite;

pub use checkpoint::{create_checkpoint_store, CheckpointStore, MemoryCheckpointStore};
pub use conversation::{Message, Role};
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteCheckpointStore;
