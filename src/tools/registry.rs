//! 工具注册表
//!
//! 所有工具实现 Tool trait（name / description / parameters_schema / execute），由 ToolRegistry 按注册顺序保存，
//! ToolExecutor 在调用时加超时并把失败统一转成 `success: false` 的结果。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::{mpsc, Mutex};

use crate::core::{AgentConfiguration, AgentError};
use crate::llm::ToolDeclaration;
use crate::react::{send_event, AgentEvent};

/// 工具执行结果：给模型的结构化数据 + 可选的用户可见标记（HTML 小部件）
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    pub success: bool,
    /// 对象形式的附加字段（message / content / output ...）
    pub data: Value,
    pub markup: Option<String>,
}

impl ToolOutput {
    pub fn ok(data: Value) -> Self {
        Self {
            success: true,
            data,
            markup: None,
        }
    }

    /// 失败结果：message 即给模型的可操作提示
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: json!({ "message": message.into() }),
            markup: None,
        }
    }

    pub fn with_markup(mut self, markup: impl Into<String>) -> Self {
        self.markup = Some(markup.into());
        self
    }

    pub fn message(&self) -> Option<&str> {
        self.data.get("message").and_then(Value::as_str)
    }

    /// 回灌给模型的函数结果：`{"result": {"success": .., ...data}}`
    pub fn model_response(&self) -> Value {
        let mut result = Map::new();
        result.insert("success".into(), Value::Bool(self.success));
        match &self.data {
            Value::Object(fields) => {
                for (k, v) in fields {
                    result.insert(k.clone(), v.clone());
                }
            }
            Value::Null => {}
            other => {
                result.insert("data".into(), other.clone());
            }
        }
        json!({ "result": Value::Object(result) })
    }
}

/// 模拟浏览器的当前位置与页面内容（每个任务独立）
#[derive(Debug, Clone)]
pub struct BrowserState {
    pub current_url: String,
    pub content: String,
}

pub const INITIAL_URL: &str = "https://www.google.com";

impl Default for BrowserState {
    fn default() -> Self {
        Self {
            current_url: INITIAL_URL.to_string(),
            content: String::new(),
        }
    }
}

/// 单个任务内工具共享的上下文
pub struct ToolContext {
    pub config: Arc<AgentConfiguration>,
    pub browser: Mutex<BrowserState>,
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl ToolContext {
    pub fn new(config: Arc<AgentConfiguration>) -> Self {
        Self {
            config,
            browser: Mutex::new(BrowserState::default()),
            events: None,
        }
    }

    pub fn with_events(mut self, tx: Option<mpsc::UnboundedSender<AgentEvent>>) -> Self {
        self.events = tx;
        self
    }

    pub fn emit(&self, event: AgentEvent) {
        send_event(self.events.as_ref(), event);
    }
}

/// 工具 trait：名称、描述（供 LLM 理解）、参数 schema、异步执行（args 为 JSON）
#[async_trait]
pub trait Tool: Send + Sync {
    /// 工具名称（函数调用中的 name）
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// 参数 JSON Schema（类型名小写，由传输层按供应商要求转换）
    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {},
            "required": []
        })
    }

    /// 追加到系统指令中的使用提示
    fn system_hint(&self, _config: &AgentConfiguration) -> Option<String> {
        None
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, AgentError>;

    fn declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// 工具注册表：按注册顺序存储 Arc<dyn Tool>
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名工具后注册者覆盖先注册者
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.retain(|t| t.name() != tool.name());
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name).cloned()
    }

    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        self.tools.iter().map(|t| t.declaration()).collect()
    }

    pub fn system_hints(&self, config: &AgentConfiguration) -> Vec<String> {
        self.tools
            .iter()
            .filter_map(|t| t.system_hint(config))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_response_merges_fields() {
        let out = ToolOutput::ok(json!({ "message": "ok", "current_url": "https://a.com" }));
        let resp = out.model_response();
        assert_eq!(resp["result"]["success"], true);
        assert_eq!(resp["result"]["current_url"], "https://a.com");

        let failed = ToolOutput::fail("Página no encontrada (404).");
        assert_eq!(failed.model_response()["result"]["success"], false);
        assert_eq!(failed.message(), Some("Página no encontrada (404)."));
    }

    #[test]
    fn test_browser_state_starts_at_google() {
        let state = BrowserState::default();
        assert_eq!(state.current_url, INITIAL_URL);
        assert!(state.content.is_empty());
    }
}
