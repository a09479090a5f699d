//! LLM 传输抽象与重试策略
//!
//! 所有后端（Gemini / OpenAI 兼容 / Mock）实现 ModelTransport：一次 generate 对应一次 HTTP 往返；
//! 重试、别名解析等策略在 ModelGateway 中统一处理。

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::llm::{GenerateRequest, ModelTurn};

/// 传输层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    /// 429 / RESOURCE_EXHAUSTED / quota：可重试
    #[error("Rate limited ({status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub fn is_rate_limit(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// 根据 HTTP 状态与响应体归类：429 或带配额关键字的错误视为限流
    pub fn from_status(status: u16, body: String) -> Self {
        if status == 429 || looks_like_quota_error(&body) {
            LlmError::RateLimited {
                status,
                message: body,
            }
        } else {
            LlmError::Api {
                status,
                message: body,
            }
        }
    }
}

fn looks_like_quota_error(body: &str) -> bool {
    body.contains("RESOURCE_EXHAUSTED") || body.to_lowercase().contains("quota")
}

/// 模型传输 trait：一次请求 -> 一个模型回合
#[async_trait]
pub trait ModelTransport: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelTurn, LlmError>;

    /// 用于日志
    fn provider(&self) -> &str;
}

/// 限流重试策略：最多 max_attempts 次调用，间隔从 initial_delay 起每次翻倍
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(4),
        }
    }
}

impl RetryConfig {
    /// 第 n 次重试前的等待（n 从 0 起）：4s, 8s, 16s, 32s ...
    pub fn delay_for(&self, retry: u32) -> Duration {
        self.initial_delay * 2u32.saturating_pow(retry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(LlmError::from_status(429, "Too Many Requests".into()).is_rate_limit());
        assert!(LlmError::from_status(400, "Quota exceeded for metric".into()).is_rate_limit());
        assert!(LlmError::from_status(503, "{\"status\":\"RESOURCE_EXHAUSTED\"}".into()).is_rate_limit());
        assert!(!LlmError::from_status(500, "internal".into()).is_rate_limit());
    }

    #[test]
    fn test_default_delays_double() {
        let retry = RetryConfig::default();
        let delays: Vec<u64> = (0..4).map(|n| retry.delay_for(n).as_secs()).collect();
        assert_eq!(delays, vec![4, 8, 16, 32]);
    }
}
