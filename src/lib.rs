//! Trackbot - 项目/任务追踪对话智能体
//!
//! 模块划分：
//! - **agent**: 无头回合运行时（供 REPL / HTTP 调用）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 回合状态模型与错误分类
//! - **guardrail**: 输入清洗与输出过滤
//! - **integrations**: HTTP 对话接口
//! - **memory**: 对话消息与检查点存储
//! - **observability**: 日志初始化
//! - **services**: 规划 / 澄清 / 查重 / 作答 / 增查的类型化能力接口
//! - **tools**: 工具注册、执行器与 MCP over HTTP 客户端
//! - **workflow**: 步骤图、路由与回合引擎

pub mod agent;
pub mod config;
pub mod core;
pub mod guardrail;
pub mod integrations;
pub mod memory;
pub mod observability;
pub mod services;
pub mod tools;
pub mod workflow;

pub use agent::{Agent, TurnRequest, TurnResponse};
