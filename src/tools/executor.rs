//! 工具执行器
//!
//! 持有 ToolRegistry 与全局超时，execute(tool_name, args) 在超时内调用工具；
//! 未知工具、工具返回 Err、超时都转为 `success: false` 的 ToolOutput（给模型看，循环继续）；
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::{ToolContext, ToolOutput, ToolRegistry};

/// 工具执行器：对每次调用施加超时，并将失败映射为给模型的提示
pub struct ToolExecutor {
    registry: ToolRegistry,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: ToolRegistry, timeout: Duration) -> Self {
        Self { registry, timeout }
    }

    pub async fn execute(&self, tool_name: &str, args: Value, ctx: &ToolContext) -> ToolOutput {
        let start = Instant::now();
        let args_preview = args_preview(&args);

        let result = match self.registry.get(tool_name) {
            Some(tool) => match timeout(self.timeout, tool.execute(args, ctx)).await {
                Ok(inner) => inner,
                Err(_) => Err(AgentError::NetworkTimeout(format!(
                    "la herramienta '{}' superó {}s",
                    tool_name,
                    self.timeout.as_secs()
                ))),
            },
            None => Err(AgentError::ToolExecution(format!(
                "Herramienta desconocida: {}",
                tool_name
            ))),
        };

        let (ok, outcome) = match &result {
            Ok(out) if out.success => (true, "ok"),
            Ok(_) => (false, "reported_failure"),
            Err(AgentError::NetworkTimeout(_)) => (false, "timeout"),
            Err(_) => (false, "error"),
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
            Ok(out) => out,
            Err(e) => ToolOutput::fail(e.to_string()),
        }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
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
