//! 模型网关：别名解析 + 限流重试 + 两种调用形态（plan / converse）
//!
//! 重试只针对限流类错误（429 / RESOURCE_EXHAUSTED / quota），其余错误立即上抛；
//! 等待时间从 initial_delay 起每次翻倍（默认 4s, 8s, 16s, 32s，共 5 次调用）。

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::core::AgentError;
use crate::llm::{
    Content, GenerateRequest, LlmError, ModelTransport, ModelTurn, ResponseFormat, RetryConfig,
    ToolSet,
};

pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";

/// 用户可见别名 -> 供应商模型 ID
#[derive(Debug, Clone)]
pub struct ModelAliases {
    default_model: String,
    table: HashMap<String, String>,
}

impl Default for ModelAliases {
    fn default() -> Self {
        let table = [
            ("gpt-5mini", "gemini-2.5-flash"),
            ("glm-4-6", "gemini-3-pro-preview"),
            ("gemini-3-pro", "gemini-3-pro-preview"),
            ("gemini-2.5-flash", "gemini-2.5-flash"),
            ("gemini-3-pro-preview", "gemini-3-pro-preview"),
        ]
        .into_iter()
        .map(|(a, m)| (a.to_string(), m.to_string()))
        .collect();
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            table,
        }
    }
}

impl ModelAliases {
    pub fn new(default_model: impl Into<String>) -> Self {
        Self {
            default_model: default_model.into(),
            ..Self::default()
        }
    }

    /// 追加或覆盖别名（配置文件 [llm.aliases]）
    pub fn with_overrides(mut self, extra: &HashMap<String, String>) -> Self {
        for (alias, model) in extra {
            self.table.insert(alias.clone(), model.clone());
        }
        self
    }

    /// 未知别名回落到默认模型
    pub fn resolve(&self, alias: &str) -> String {
        self.table
            .get(alias.trim())
            .cloned()
            .unwrap_or_else(|| self.default_model.clone())
    }
}

/// 采样温度配置
#[derive(Debug, Clone, Copy)]
pub struct SamplingConfig {
    pub plan_temperature: f32,
    pub converse_temperature: f32,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            plan_temperature: 0.2,
            converse_temperature: 0.5,
        }
    }
}

/// 模型网关：所有对 LLM 的调用都经过这里
pub struct ModelGateway {
    transport: Arc<dyn ModelTransport>,
    aliases: ModelAliases,
    retry: RetryConfig,
    sampling: SamplingConfig,
}

impl ModelGateway {
    pub fn new(transport: Arc<dyn ModelTransport>) -> Self {
        Self {
            transport,
            aliases: ModelAliases::default(),
            retry: RetryConfig::default(),
            sampling: SamplingConfig::default(),
        }
    }

    pub fn with_aliases(mut self, aliases: ModelAliases) -> Self {
        self.aliases = aliases;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_sampling(mut self, sampling: SamplingConfig) -> Self {
        self.sampling = sampling;
        self
    }

    pub fn resolve_model(&self, alias: &str) -> String {
        self.aliases.resolve(alias)
    }

    /// 发送请求；request.model 为别名，发送前解析为真实 ID
    pub async fn generate(&self, mut request: GenerateRequest) -> Result<ModelTurn, AgentError> {
        request.model = self.resolve_model(&request.model);
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            debug!(
                provider = self.transport.provider(),
                model = %request.model,
                attempt,
                "llm request"
            );
            match self.transport.generate(&request).await {
                Ok(turn) => return Ok(turn),
                Err(err @ LlmError::RateLimited { .. }) if attempt < max_attempts => {
                    let delay = self.retry.delay_for(attempt - 1);
                    warn!(
                        attempt,
                        max_attempts,
                        delay_secs = delay.as_secs_f64(),
                        error = %err,
                        "rate limited, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// 「计划」调用：输出约束为 JSON 字符串数组，低温度；返回原始文本
    pub async fn plan_call(
        &self,
        model: &str,
        prompt: String,
        system_instruction: Option<String>,
    ) -> Result<String, AgentError> {
        let turn = self
            .generate(GenerateRequest {
                model: model.to_string(),
                contents: vec![Content::user_text(prompt)],
                system_instruction,
                tools: ToolSet::default(),
                temperature: self.sampling.plan_temperature,
                response_format: ResponseFormat::string_array(),
            })
            .await?;
        Ok(turn.text())
    }

    /// 「对话」调用：附带工具声明，返回文本或函数调用
    pub async fn converse(
        &self,
        model: &str,
        contents: Vec<Content>,
        system_instruction: Option<String>,
        tools: ToolSet,
    ) -> Result<ModelTurn, AgentError> {
        self.generate(GenerateRequest {
            model: model.to_string(),
            contents,
            system_instruction,
            tools,
            temperature: self.sampling.converse_temperature,
            response_format: ResponseFormat::Text,
        })
        .await
    }

    /// 单轮纯文本调用（提示词增强、帮助助手）
    pub async fn text_call(
        &self,
        model: &str,
        prompt: String,
        system_instruction: Option<String>,
        temperature: f32,
    ) -> Result<String, AgentError> {
        let turn = self
            .generate(GenerateRequest {
                model: model.to_string(),
                contents: vec![Content::user_text(prompt)],
                system_instruction,
                tools: ToolSet::default(),
                temperature,
                response_format: ResponseFormat::Text,
            })
            .await?;
        Ok(turn.text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedTransport;

    #[test]
    fn test_alias_resolution() {
        let aliases = ModelAliases::default();
        assert_eq!(aliases.resolve("gpt-5mini"), "gemini-2.5-flash");
        assert_eq!(aliases.resolve("glm-4-6"), "gemini-3-pro-preview");
        assert_eq!(aliases.resolve("gemini-3-pro"), "gemini-3-pro-preview");
        assert_eq!(aliases.resolve("no-such-model"), DEFAULT_MODEL);
    }

    #[test]
    fn test_alias_overrides() {
        let extra = HashMap::from([("fast".to_string(), "gemini-2.0-flash".to_string())]);
        let aliases = ModelAliases::default().with_overrides(&extra);
        assert_eq!(aliases.resolve("fast"), "gemini-2.0-flash");
    }

    #[tokio::test]
    async fn test_non_rate_limit_error_is_not_retried() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_error(LlmError::Api {
            status: 400,
            message: "bad request".into(),
        });
        transport.push_text("never reached");
        let gateway = ModelGateway::new(transport.clone());
        let err = gateway
            .text_call("gpt-5mini", "hola".into(), None, 0.3)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::Provider(_)));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_exhaustion_surfaces_rate_limited() {
        let transport = Arc::new(ScriptedTransport::new());
        for _ in 0..5 {
            transport.push_error(LlmError::RateLimited {
                status: 429,
                message: "quota".into(),
            });
        }
        let gateway = ModelGateway::new(transport.clone());
        let err = gateway
            .text_call("gemini-2.5-flash", "hola".into(), None, 0.3)
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::RateLimited(_)));
        assert_eq!(transport.request_count(), 5);
    }

    #[tokio::test]
    async fn test_requests_carry_resolved_model_and_temperature() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.push_text("[\"a\",\"b\",\"c\"]");
        let gateway = ModelGateway::new(transport.clone());
        gateway
            .plan_call("glm-4-6", "planifica".into(), None)
            .await
            .unwrap();
        let sent = transport.requests();
        assert_eq!(sent[0].model, "gemini-3-pro-preview");
        assert!((sent[0].temperature - 0.2).abs() < f32::EPSILON);
        assert!(matches!(sent[0].response_format, ResponseFormat::Json { .. }));
    }
}
