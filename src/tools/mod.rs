pub mod executor;
pub mod mcp;
pub mod registry;

pub use executor::ToolExecutor;
pub use mcp::{discover_mcp_tools, McpClient, McpTool};
pub use registry::{Tool, ToolRegistry};
