//! 外部接入面：HTTP 对话接口（需 web feature）

#[cfg(feature = "web")]
pub mod web;
