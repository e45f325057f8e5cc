//! 错误类型
//!
//! RemoteError 是远程工具/决策服务失败的结构化表示：在协议边界一次性分类（限流、超时、传输、协议…），
//! 各步骤按 kind 决定降级策略；AgentError 是步骤与运行时的统一错误，由引擎在步骤边界转为状态。

use std::fmt;

use thiserror::Error;

use crate::guardrail::GuardrailError;

/// 远程错误分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteErrorKind {
    /// 远端限流（HTTP 429 / RESOURCE_EXHAUSTED）
    RateLimited,
    /// 单次调用超时
    Timeout,
    /// 网络/HTTP 层失败
    Transport,
    /// JSON-RPC 协议错误（握手失败、error 对象等）
    Protocol,
    /// 工具执行返回 isError
    ToolFailed,
    /// 响应结构不符合约定
    Malformed,
    /// 工具未被发现或服务不可用
    Unavailable,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::RateLimited => "rate limited",
            Self::Timeout => "timeout",
            Self::Transport => "transport error",
            Self::Protocol => "protocol error",
            Self::ToolFailed => "tool failed",
            Self::Malformed => "malformed response",
            Self::Unavailable => "unavailable",
        };
        f.write_str(s)
    }
}

/// 远程调用失败：分类 + 描述
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::RateLimited, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Timeout, message)
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Transport, message)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Protocol, message)
    }

    pub fn tool_failed(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::ToolFailed, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Malformed, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Unavailable, message)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind == RemoteErrorKind::RateLimited
    }
}

/// 运行时错误（步骤、检查点、请求校验等）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Remote call failed: {0}")]
    Remote(#[from] RemoteError),

    #[error("Guardrail rejected content: {0}")]
    Guardrail(#[from] GuardrailError),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display() {
        let err = RemoteError::rate_limited("quota exhausted");
        assert!(err.is_rate_limited());
        assert_eq!(err.to_string(), "rate limited: quota exhausted");
    }

    #[test]
    fn test_agent_error_from_remote() {
        let err: AgentError = RemoteError::timeout("gemini_planner").into();
        assert!(matches!(err, AgentError::Remote(ref r) if r.kind == RemoteErrorKind::Timeout));
        assert!(err.to_string().contains("gemini_planner"));
    }
}
