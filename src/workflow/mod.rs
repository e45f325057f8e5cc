//! 回合编排：步骤图、路由、引擎循环与各步骤处理函数

pub mod builder;
pub mod engine;
pub mod graph;
pub mod steps;
pub mod types;

pub use builder::EngineBuilder;
pub use engine::TurnEngine;
pub use graph::next_step;
pub use types::{ConfirmReply, Step, TurnPhase, WorkflowError, MAX_STEPS};
