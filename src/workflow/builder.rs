//! 引擎构建器
//!
//! 提供流畅的 API 来组装 TurnEngine

use std::sync::Arc;

use crate::guardrail::Guardrail;
use crate::services::Services;
use crate::workflow::engine::TurnEngine;
use crate::workflow::types::WorkflowError;

/// 引擎构建器
pub struct EngineBuilder {
    services: Arc<dyn Services>,
    guardrail: Option<Guardrail>,
    max_history: usize,
}

impl EngineBuilder {
    pub fn new(services: Arc<dyn Services>) -> Self {
        Self {
            services,
            guardrail: None,
            max_history: 4,
        }
    }

    /// 设置问题历史上限（N）
    pub fn max_history(mut self, max_history: usize) -> Self {
        self.max_history = max_history;
        self
    }

    /// 设置护栏
    pub fn guardrail(mut self, guardrail: Guardrail) -> Self {
        self.guardrail = Some(guardrail);
        self
    }

    /// 构建引擎
    pub fn build(self) -> Result<TurnEngine, WorkflowError> {
        if self.max_history == 0 {
            return Err(WorkflowError::InvalidConfiguration(
                "max_history must be at least 1".to_string(),
            ));
        }

        Ok(TurnEngine::new(
            self.services,
            self.guardrail.unwrap_or_default(),
            self.max_history,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ScriptedServices;

    #[test]
    fn test_build_with_defaults() {
        let engine = EngineBuilder::new(Arc::new(ScriptedServices::new()))
            .max_history(6)
            .guardrail(Guardrail::new(100, vec!["secret".into()]))
            .build()
            .expect("Failed to build engine");
        assert_eq!(engine.max_history(), 6);
    }

    #[test]
    fn test_zero_history_fails() {
        let result = EngineBuilder::new(Arc::new(ScriptedServices::new()))
            .max_history(0)
            .build();

        assert!(result.is_err());
    }
}
