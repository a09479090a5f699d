//! Planner：目标 + 智能体配置 -> 3..=6 个步骤
//!
//! 单次 JSON 约束调用，不重试（网关层的限流重试仍然生效）；结果为空或 JSON 非法时返回 Planning 错误。

use std::sync::Arc;

use serde::Deserialize;
use tracing::{info, warn};

use crate::core::{AgentConfiguration, AgentError};
use crate::llm::ModelGateway;
use crate::react::prompt::plan_prompt;

pub const MIN_STEPS: usize = 3;
pub const MAX_STEPS: usize = 6;

/// 兼容 `["..."]` 与 `{"steps": ["..."]}` 两种形态
#[derive(Deserialize)]
#[serde(untagged)]
enum PlanPayload {
    List(Vec<String>),
    Wrapped { steps: Vec<String> },
}

/// 去掉 ``` 代码块围栏
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// 解析模型输出为步骤列表；多于 MAX_STEPS 时截断
pub fn parse_plan(text: &str) -> Result<Vec<String>, AgentError> {
    let body = strip_fences(text);
    if body.is_empty() {
        return Err(AgentError::Planning("el modelo no devolvió ningún paso".into()));
    }
    let payload: PlanPayload = serde_json::from_str(body)
        .map_err(|e| AgentError::Planning(format!("JSON inválido: {}", e)))?;
    let raw = match payload {
        PlanPayload::List(steps) | PlanPayload::Wrapped { steps } => steps,
    };
    let mut steps: Vec<String> = raw
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if steps.is_empty() {
        return Err(AgentError::Planning("el plan está vacío".into()));
    }
    if steps.len() < MIN_STEPS {
        return Err(AgentError::Planning(format!(
            "el plan tiene {} pasos; se esperaban entre {} y {}",
            steps.len(),
            MIN_STEPS,
            MAX_STEPS
        )));
    }
    if steps.len() > MAX_STEPS {
        warn!(steps = steps.len(), "plan longer than allowed, truncating");
        steps.truncate(MAX_STEPS);
    }
    Ok(steps)
}

pub struct Planner {
    gateway: Arc<ModelGateway>,
}

impl Planner {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self { gateway }
    }

    pub async fn plan(&self, goal: &str, config: &AgentConfiguration) -> Result<Vec<String>, AgentError> {
        let prompt = plan_prompt(goal, config);
        let text = self.gateway.plan_call(&config.model, prompt, None).await?;
        let steps = parse_plan(&text)?;
        info!(agent = %config.name, steps = steps.len(), "plan ready");
        Ok(steps)
    }
}
