//! 两个独立的辅助调用：智能体描述增强、使用帮助问答
//!
//! 都不会返回错误：增强失败时原样返回输入，帮助失败时返回错误文本。

use tracing::warn;

use crate::llm::{ModelGateway, DEFAULT_MODEL};
use crate::react::prompt::{enhance_prompt, HELP_SYSTEM};

const ENHANCE_TEMPERATURE: f32 = 0.7;
const HELP_TEMPERATURE: f32 = 0.3;
const HELP_EMPTY_REPLY: &str = "Lo siento, hubo un error de comunicación.";

/// 改写智能体的系统描述
pub async fn enhance_description(gateway: &ModelGateway, current: &str) -> String {
    match gateway
        .text_call(DEFAULT_MODEL, enhance_prompt(current), None, ENHANCE_TEMPERATURE)
        .await
    {
        Ok(text) if !text.trim().is_empty() => text.trim().to_string(),
        Ok(_) => current.to_string(),
        Err(e) => {
            warn!(error = %e, "description enhancement failed, keeping original");
            current.to_string()
        }
    }
}

pub async fn help_answer(gateway: &ModelGateway, question: &str) -> String {
    match gateway
        .text_call(
            DEFAULT_MODEL,
            question.to_string(),
            Some(HELP_SYSTEM.to_string()),
            HELP_TEMPERATURE,
        )
        .await
    {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => HELP_EMPTY_REPLY.to_string(),
        Err(e) => format!("Error del sistema: {}", e),
    }
}
