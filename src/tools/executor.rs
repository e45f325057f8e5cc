//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用 registry.execute，
//! 超时转为 RemoteError(Timeout)；每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::RemoteError;
use crate::tools::ToolRegistry;

/// 工具执行器：对每次调用施加超时
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行指定工具；超时返回 Timeout，其余错误原样透传；输出 JSON 审计日志
    pub async fn execute(&self, tool_name: &str, args: Value) -> Result<Value, RemoteError> {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let result = timeout(self.timeout, self.registry.execute(tool_name, args)).await;

        let (ok, outcome): (bool, String) = match &result {
            Ok(Ok(_)) => (true, "ok".to_string()),
            Ok(Err(e)) => (false, e.kind.to_string()),
            Err(_) => (false, "timeout".to_string()),
        };
        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        match result {
            Ok(r) => r,
            Err(_) => Err(RemoteError::timeout(format!(
                "{tool_name} did not respond within {:?}",
                self.timeout
            ))),
        }
    }

    pub fn has_tool(&self, name: &str) -> bool {
        self.registry.contains(name)
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.registry.tool_names()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::RemoteErrorKind;
    use crate::tools::Tool;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct SlowTool;

    #[async_trait]
    impl Tool for SlowTool {
        fn name(&self) -> &str {
            "slow"
        }

        fn description(&self) -> &str {
            "never answers in time"
        }

        async fn execute(&self, _args: Value) -> Result<Value, RemoteError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(json!("late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_maps_to_remote_timeout() {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(SlowTool));
        let executor = ToolExecutor::new(registry, 1);

        let err = executor.execute("slow", json!({})).await.unwrap_err();
        assert_eq!(err.kind, RemoteErrorKind::Timeout);
    }

    #[test]
    fn test_args_preview_truncates() {
        let long = json!({ "text": "x".repeat(500) });
        let preview = args_preview(&long);
        assert!(preview.ends_with("..."));
        assert_eq!(preview.chars().count(), 203);
    }
}
