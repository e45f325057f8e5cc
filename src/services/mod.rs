//! 能力层：步骤所需的外部协作者接口（规划、澄清、查重、回答与四个持久化工具）

pub mod mcp;
pub mod mock;
pub mod traits;
pub mod types;

pub use mcp::McpServices;
pub use mock::ScriptedServices;
pub use traits::Services;
pub use types::{NewProject, NewTask, Plan, ProjectQuery, TaskQuery};
