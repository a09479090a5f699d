//! OpenAI 兼容 API 传输（chat/completions）
//!
//! 可配置 base_url，适配 OpenAI、DeepSeek、自建代理等。函数调用走 `tools` / `tool_calls`，
//! 函数结果以 `role: "tool"` 消息回灌。原生联网搜索无对应能力，忽略。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm::{
    Content, FunctionCall, GenerateRequest, LlmError, ModelTransport, ModelTurn, Part,
    ResponseFormat, Role,
};

pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAiTransport {
    http: reqwest::Client,
    api_base: String,
    api_key: String,
}

impl OpenAiTransport {
    pub fn new(base_url: Option<&str>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            api_base: base_url
                .unwrap_or(OPENAI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ModelTransport for OpenAiTransport {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelTurn, LlmError> {
        let url = format!("{}/chat/completions", self.api_base);
        if request.tools.web_search {
            debug!("web search is not available on openai-compatible endpoints, ignored");
        }
        let body = build_request_body(request);

        let resp = self
            .http
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body_text = resp.text().await.unwrap_or_default();
            return Err(LlmError::from_status(status.as_u16(), body_text));
        }

        let value: Value = resp
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        parse_response(&value)
    }

    fn provider(&self) -> &str {
        "openai"
    }
}

pub fn build_request_body(request: &GenerateRequest) -> Value {
    let mut messages = Vec::new();
    if let Some(system) = &request.system_instruction {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for content in &request.contents {
        messages.extend(content_to_messages(content));
    }

    let mut body = json!({
        "model": request.model,
        "messages": messages,
        "temperature": request.temperature,
    });

    if !request.tools.declarations.is_empty() {
        let tools: Vec<Value> = request
            .tools
            .declarations
            .iter()
            .map(|d| {
                json!({
                    "type": "function",
                    "function": {
                        "name": d.name,
                        "description": d.description,
                        "parameters": d.parameters,
                    }
                })
            })
            .collect();
        body["tools"] = Value::Array(tools);
    }

    // json_schema 根节点必须是 object，数组包在 steps 字段里
    if let ResponseFormat::Json { schema } = &request.response_format {
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": "structured_output",
                "schema": {
                    "type": "object",
                    "properties": { "steps": schema },
                    "required": ["steps"],
                    "additionalProperties": false
                }
            }
        });
    }
    body
}

fn content_to_messages(content: &Content) -> Vec<Value> {
    match content.role {
        Role::Model => {
            let text = content.text();
            let calls: Vec<Value> = content
                .function_calls()
                .into_iter()
                .enumerate()
                .map(|(i, c)| {
                    json!({
                        "id": c.id.clone().unwrap_or_else(|| format!("call_{}", i)),
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.args.to_string() }
                    })
                })
                .collect();
            let mut msg = json!({ "role": "assistant", "content": text });
            if !calls.is_empty() {
                msg["tool_calls"] = Value::Array(calls);
            }
            vec![msg]
        }
        Role::User => {
            let mut out = Vec::new();
            let mut user_parts = Vec::new();
            for (i, part) in content.parts.iter().enumerate() {
                match part {
                    Part::Text(t) => user_parts.push(json!({ "type": "text", "text": t })),
                    Part::InlineData { mime_type, data } => user_parts.push(json!({
                        "type": "image_url",
                        "image_url": { "url": format!("data:{};base64,{}", mime_type, data) }
                    })),
                    Part::FunctionResponse(r) => out.push(json!({
                        "role": "tool",
                        "tool_call_id": r.id.clone().unwrap_or_else(|| format!("call_{}", i)),
                        "content": r.response.to_string(),
                    })),
                    Part::FunctionCall(_) | Part::Opaque(_) => {}
                }
            }
            if !user_parts.is_empty() {
                out.push(json!({ "role": "user", "content": user_parts }));
            }
            out
        }
    }
}

pub fn parse_response(value: &Value) -> Result<ModelTurn, LlmError> {
    let Some(choice) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        return Ok(ModelTurn::default());
    };
    let finish_reason = choice
        .get("finish_reason")
        .and_then(Value::as_str)
        .map(String::from);
    let Some(message) = choice.get("message") else {
        return Ok(ModelTurn {
            finish_reason,
            ..Default::default()
        });
    };

    let mut parts = Vec::new();
    if let Some(text) = message.get("content").and_then(Value::as_str) {
        if !text.is_empty() {
            parts.push(Part::Text(text.to_string()));
        }
    }
    if let Some(calls) = message.get("tool_calls").and_then(Value::as_array) {
        for call in calls {
            let Some(function) = call.get("function") else {
                continue;
            };
            let name = function
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let args = function
                .get("arguments")
                .and_then(Value::as_str)
                .and_then(|a| serde_json::from_str(a).ok())
                .unwrap_or_else(|| json!({}));
            parts.push(Part::FunctionCall(FunctionCall {
                id: call.get("id").and_then(Value::as_str).map(String::from),
                name,
                args,
                thought_signature: None,
            }));
        }
    }

    Ok(ModelTurn {
        content: Some(Content::model(parts)),
        grounding: Vec::new(),
        finish_reason,
    })
}
