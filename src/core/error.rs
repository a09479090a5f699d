//! Agent 错误类型
//!
//! 传播策略：工具内的错误（ToolExecution / NetworkTimeout）由 ToolExecutor 转为 `success:false` 的结果回灌给模型；
//! 网关重试耗尽后的错误与 Planning 错误上抛到 Orchestrator，变为整次运行的终止状态。

use thiserror::Error;

use crate::llm::LlmError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 限流重试次数用尽
    #[error("Límite de cuota alcanzado: {0}")]
    RateLimited(String),

    /// 模型提供方返回不可恢复的错误（或空内容）
    #[error("Error del proveedor: {0}")]
    Provider(String),

    /// 计划为空或 JSON 非法
    #[error("Error de planificación: {0}")]
    Planning(String),

    #[error("Fallo de herramienta: {0}")]
    ToolExecution(String),

    #[error("Tiempo de espera agotado: {0}")]
    NetworkTimeout(String),

    /// 任务失败升级为整次运行失败
    #[error("Fallo de ejecución: {0}")]
    RunFailure(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<LlmError> for AgentError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::RateLimited { message, .. } => AgentError::RateLimited(message),
            other => AgentError::Provider(other.to_string()),
        }
    }
}

impl From<crate::memory::StoreError> for AgentError {
    fn from(err: crate::memory::StoreError) -> Self {
        AgentError::Store(err.to_string())
    }
}
