//! 核心层：回合状态模型与错误分类

pub mod error;
pub mod state;

pub use error::{AgentError, RemoteError, RemoteErrorKind};
pub use state::{
    AgentState, Intent, ItemKind, Slots, StagedPayload, ToolInput, TurnError,
    CONFIRM_DUPLICATE_FIELD,
};
