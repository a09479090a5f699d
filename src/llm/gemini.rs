//! Gemini generateContent 传输
//!
//! 直接用 reqwest + serde_json 组装请求体；工具 schema 的 type 字段转为大写（OBJECT / STRING ...），
//! 联网搜索以 `googleSearch` 工具开启，安全过滤统一设为 BLOCK_NONE。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use crate::llm::{
    Content, FunctionCall, GenerateRequest, GroundingChunk, LlmError, ModelTransport, ModelTurn,
    Part, ResponseFormat, Role,
};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

const SAFETY_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

pub struct GeminiTransport {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl GeminiTransport {
    pub fn new(base_url: Option<&str>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.into(),
        }
    }
}

#[async_trait]
impl ModelTransport for GeminiTransport {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelTurn, LlmError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, request.model);
        let body = build_request_body(request);

        let resp = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
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
        "gemini"
    }
}

/// 组装 generateContent 请求体
pub fn build_request_body(request: &GenerateRequest) -> Value {
    let contents: Vec<Value> = request.contents.iter().map(content_to_json).collect();
    let mut body = json!({
        "contents": contents,
        "safetySettings": SAFETY_CATEGORIES
            .iter()
            .map(|c| json!({ "category": c, "threshold": "BLOCK_NONE" }))
            .collect::<Vec<_>>(),
    });

    if let Some(system) = &request.system_instruction {
        body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
    }

    let mut tools = Vec::new();
    if request.tools.web_search {
        tools.push(json!({ "googleSearch": {} }));
    }
    if !request.tools.declarations.is_empty() {
        let decls: Vec<Value> = request
            .tools
            .declarations
            .iter()
            .map(|d| {
                json!({
                    "name": d.name,
                    "description": d.description,
                    "parameters": uppercase_schema_types(&d.parameters),
                })
            })
            .collect();
        tools.push(json!({ "functionDeclarations": decls }));
    }
    if !tools.is_empty() {
        body["tools"] = Value::Array(tools);
    }

    let mut generation = json!({ "temperature": request.temperature });
    if let ResponseFormat::Json { schema } = &request.response_format {
        generation["responseMimeType"] = json!("application/json");
        generation["responseSchema"] = uppercase_schema_types(schema);
    }
    body["generationConfig"] = generation;
    body
}

fn content_to_json(content: &Content) -> Value {
    let role = match content.role {
        Role::User => "user",
        Role::Model => "model",
    };
    let parts: Vec<Value> = content
        .parts
        .iter()
        .map(|p| match p {
            Part::Text(t) => json!({ "text": t }),
            Part::InlineData { mime_type, data } => {
                json!({ "inlineData": { "mimeType": mime_type, "data": data } })
            }
            Part::FunctionCall(c) => {
                let mut part = json!({ "functionCall": { "name": c.name, "args": c.args } });
                if let Some(sig) = &c.thought_signature {
                    part["thoughtSignature"] = json!(sig);
                }
                part
            }
            Part::FunctionResponse(r) => {
                json!({ "functionResponse": { "name": r.name, "response": r.response } })
            }
            Part::Opaque(raw) => raw.clone(),
        })
        .collect();
    json!({ "role": role, "parts": parts })
}

/// 递归把 schema 中的 `type` 值转为大写
pub fn uppercase_schema_types(schema: &Value) -> Value {
    match schema {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                let v = match (k.as_str(), v) {
                    ("type", Value::String(t)) => Value::String(t.to_uppercase()),
                    _ => uppercase_schema_types(v),
                };
                out.insert(k.clone(), v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(uppercase_schema_types).collect()),
        other => other.clone(),
    }
}

/// 解析 generateContent 响应；缺少 candidates / content 时返回 content = None
pub fn parse_response(value: &Value) -> Result<ModelTurn, LlmError> {
    if let Some(err) = value.get("error") {
        let status = err
            .get("code")
            .and_then(Value::as_u64)
            .and_then(|c| u16::try_from(c).ok())
            .unwrap_or(500);
        return Err(LlmError::from_status(status, err.to_string()));
    }

    let Some(candidate) = value
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
    else {
        return Ok(ModelTurn::default());
    };

    let finish_reason = candidate
        .get("finishReason")
        .and_then(Value::as_str)
        .map(String::from);

    let content = candidate
        .get("content")
        .and_then(|c| c.get("parts"))
        .and_then(Value::as_array)
        .map(|parts| Content::model(parts.iter().filter_map(parse_part).collect()));

    let grounding = candidate
        .get("groundingMetadata")
        .and_then(|m| m.get("groundingChunks"))
        .and_then(Value::as_array)
        .map(|chunks| {
            chunks
                .iter()
                .filter_map(|c| c.get("web"))
                .map(|web| GroundingChunk {
                    uri: web.get("uri").and_then(Value::as_str).map(String::from),
                    title: web.get("title").and_then(Value::as_str).map(String::from),
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(ModelTurn {
        content,
        grounding,
        finish_reason,
    })
}

/// 文本与函数调用转成通用 Part（函数调用保留签名）；思考片段等其它形态保留原始 JSON
fn parse_part(part: &Value) -> Option<Part> {
    let is_thought = part.get("thought").and_then(Value::as_bool).unwrap_or(false);
    if let Some(text) = part.get("text").and_then(Value::as_str) {
        if !is_thought {
            return Some(Part::Text(text.to_string()));
        }
    }
    if let Some(call) = part.get("functionCall") {
        let name = call.get("name").and_then(Value::as_str)?;
        return Some(Part::FunctionCall(FunctionCall {
            id: call.get("id").and_then(Value::as_str).map(String::from),
            name: name.to_string(),
            args: call.get("args").cloned().unwrap_or_else(|| json!({})),
            thought_signature: part
                .get("thoughtSignature")
                .and_then(Value::as_str)
                .map(String::from),
        }));
    }
    part.is_object().then(|| Part::Opaque(part.clone()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ToolDeclaration, ToolSet};

    fn request() -> GenerateRequest {
        GenerateRequest {
            model: "gemini-2.5-flash".into(),
            contents: vec![Content::user_text("hola")],
            system_instruction: Some("Eres un agente".into()),
            tools: ToolSet {
                web_search: true,
                declarations: vec![ToolDeclaration {
                    name: "web_scrape".into(),
                    description: "Extrae texto".into(),
                    parameters: json!({
                        "type": "object",
                        "properties": { "url": { "type": "string" } },
                        "required": ["url"]
                    }),
                }],
            },
            temperature: 0.5,
            response_format: ResponseFormat::Text,
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = build_request_body(&request());
        assert_eq!(body["tools"][0], json!({ "googleSearch": {} }));
        let params = &body["tools"][1]["functionDeclarations"][0]["parameters"];
        assert_eq!(params["type"], "OBJECT");
        assert_eq!(params["properties"]["url"]["type"], "STRING");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "Eres un agente");
        assert_eq!(body["safetySettings"].as_array().unwrap().len(), 4);
        assert!(body["generationConfig"].get("responseMimeType").is_none());
    }

    #[test]
    fn test_json_format_sets_response_schema() {
        let mut req = request();
        req.tools = ToolSet::default();
        req.response_format = ResponseFormat::string_array();
        let body = build_request_body(&req);
        assert!(body.get("tools").is_none());
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["items"]["type"], "STRING");
    }

    #[test]
    fn test_parse_function_calls_and_grounding() {
        let raw = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "functionCall": { "name": "web_scrape", "args": { "url": "https://a.com" } } },
                    { "functionCall": { "name": "memory_system", "args": { "action": "RETRIEVE" } } }
                ]},
                "finishReason": "STOP",
                "groundingMetadata": { "groundingChunks": [ { "web": { "uri": "https://a.com", "title": "A" } } ] }
            }]
        });
        let turn = parse_response(&raw).unwrap();
        let content = turn.content.unwrap();
        assert_eq!(content.function_calls().len(), 2);
        assert_eq!(turn.grounding[0].title.as_deref(), Some("A"));
    }

    #[test]
    fn test_missing_content_is_none() {
        let raw = json!({ "candidates": [ { "finishReason": "SAFETY" } ] });
        let turn = parse_response(&raw).unwrap();
        assert!(turn.content.is_none());
        assert_eq!(turn.finish_reason.as_deref(), Some("SAFETY"));
    }

    #[test]
    fn test_error_payload_classified() {
        let raw = json!({ "error": { "code": 429, "status": "RESOURCE_EXHAUSTED" } });
        assert!(parse_response(&raw).unwrap_err().is_rate_limit());
    }

    #[test]
    fn test_out_of_range_error_code_is_not_truncated() {
        // 65965 截断成 u16 会变成 429
        let raw = json!({ "error": { "code": 65965, "message": "bad" } });
        match parse_response(&raw).unwrap_err() {
            LlmError::Api { status, .. } => assert_eq!(status, 500),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_model_turn_replays_signature_and_thoughts() {
        let raw = json!({
            "candidates": [{
                "content": { "role": "model", "parts": [
                    { "text": "pensando en la URL", "thought": true },
                    { "functionCall": { "name": "web_scrape", "args": { "url": "a" } }, "thoughtSignature": "SIG123" }
                ]}
            }]
        });
        let content = parse_response(&raw).unwrap().content.unwrap();
        assert_eq!(content.text(), "");
        assert_eq!(
            content.function_calls()[0].thought_signature.as_deref(),
            Some("SIG123")
        );

        let mut req = request();
        req.contents.push(content);
        let body = build_request_body(&req);
        let parts = &body["contents"][1]["parts"];
        assert_eq!(parts[0], json!({ "text": "pensando en la URL", "thought": true }));
        assert_eq!(
            parts[1],
            json!({
                "functionCall": { "name": "web_scrape", "args": { "url": "a" } },
                "thoughtSignature": "SIG123"
            })
        );
    }
}
