//! 护栏：输入清洗与输出安全过滤
//!
//! 无状态；由规划步骤与回答步骤调用。

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::config::GuardrailSection;

static CODE_FENCE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"```").expect("valid regex"));
static SCRIPT_TAG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)</?\s*script[^>]*>").expect("valid regex"));

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GuardrailError {
    #[error("Input too long: length {len} (max {max})")]
    InputTooLong { len: usize, max: usize },

    #[error("Unsafe content detected: {0}")]
    UnsafeContent(String),
}

/// 护栏配置：输入长度上限与输出禁用词
#[derive(Debug, Clone)]
pub struct Guardrail {
    max_input_length: usize,
    forbidden_terms: Vec<String>,
}

impl Default for Guardrail {
    fn default() -> Self {
        Self::new(2048, GuardrailSection::default().forbidden_terms)
    }
}

impl Guardrail {
    pub fn new(max_input_length: usize, forbidden_terms: Vec<String>) -> Self {
        Self {
            max_input_length,
            forbidden_terms: forbidden_terms
                .into_iter()
                .map(|t| t.to_lowercase())
                .collect(),
        }
    }

    /// 去掉代码围栏与 script 标签、首尾空白；超长则拒绝
    pub fn sanitize_input(&self, text: &str) -> Result<String, GuardrailError> {
        let clean = CODE_FENCE.replace_all(text, "");
        let clean = SCRIPT_TAG.replace_all(&clean, "");
        let clean = clean.trim().to_string();

        let len = clean.chars().count();
        if len > self.max_input_length {
            tracing::warn!(len, max = self.max_input_length, "Input too long");
            return Err(GuardrailError::InputTooLong {
                len,
                max: self.max_input_length,
            });
        }
        tracing::debug!(input = %clean, "Sanitized input");
        Ok(clean)
    }

    /// 输出中出现禁用词（不区分大小写）即拒绝
    pub fn filter_output(&self, text: &str) -> Result<String, GuardrailError> {
        let lower = text.to_lowercase();
        if let Some(term) = self.forbidden_terms.iter().find(|t| lower.contains(t.as_str())) {
            tracing::warn!(term = %term, "Unsafe content detected in composed answer");
            return Err(GuardrailError::UnsafeContent(term.clone()));
        }
        Ok(text.to_string())
    }
}
