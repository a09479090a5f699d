//! 对话与请求类型（与具体供应商无关）
//!
//! Content = 一个 user / model 回合，包含若干 Part（文本、内联图片、函数调用、函数结果）。

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// 模型发出的函数调用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    /// 供应商给出的调用 ID（Gemini 可能为空，OpenAI 必有）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub args: Value,
    /// Gemini 的思考签名，回放历史时必须原样带回
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought_signature: Option<String>,
}

/// 回灌给模型的函数结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub response: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Part {
    Text(String),
    InlineData { mime_type: String, data: String },
    FunctionCall(FunctionCall),
    FunctionResponse(FunctionResponse),
    /// 供应商特有、本层不解释的 Part（如思考片段），原样回放
    Opaque(Value),
}

/// 一个对话回合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self {
            role: Role::User,
            parts,
        }
    }

    pub fn user_text(text: impl Into<String>) -> Self {
        Self::user(vec![Part::Text(text.into())])
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self {
            role: Role::Model,
            parts,
        }
    }

    pub fn model_text(text: impl Into<String>) -> Self {
        Self::model(vec![Part::Text(text.into())])
    }

    /// 所有文本 Part 拼接
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn function_calls(&self) -> Vec<&FunctionCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                Part::FunctionCall(c) => Some(c),
                _ => None,
            })
            .collect()
    }
}

/// 工具声明：名称、描述、参数 schema（JSON Schema 子集，类型名小写）
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// 请求所携带的工具：原生联网搜索开关 + 函数声明
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolSet {
    pub web_search: bool,
    pub declarations: Vec<ToolDeclaration>,
}

impl ToolSet {
    pub fn is_empty(&self) -> bool {
        !self.web_search && self.declarations.is_empty()
    }
}

/// 输出格式约束
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseFormat {
    #[default]
    Text,
    /// 约束为符合 schema 的 JSON
    Json { schema: Value },
}

impl ResponseFormat {
    /// 计划调用使用的「字符串数组」约束
    pub fn string_array() -> Self {
        ResponseFormat::Json {
            schema: serde_json::json!({ "type": "array", "items": { "type": "string" } }),
        }
    }
}

/// 发给传输层的完整请求（model 已解析为真实 ID）
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub model: String,
    pub contents: Vec<Content>,
    pub system_instruction: Option<String>,
    pub tools: ToolSet,
    pub temperature: f32,
    pub response_format: ResponseFormat,
}

/// 联网搜索的引用来源
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GroundingChunk {
    pub uri: Option<String>,
    pub title: Option<String>,
}

/// 模型返回的一个回合；content 为 None 表示供应商未给出候选内容
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelTurn {
    pub content: Option<Content>,
    pub grounding: Vec<GroundingChunk>,
    pub finish_reason: Option<String>,
}

impl ModelTurn {
    pub fn text(&self) -> String {
        self.content.as_ref().map(Content::text).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_skips_non_text_parts() {
        let content = Content::model(vec![
            Part::Text("Hola ".into()),
            Part::FunctionCall(FunctionCall {
                id: None,
                name: "web_scrape".into(),
                args: serde_json::json!({"url": "https://example.com"}),
                thought_signature: None,
            }),
            Part::Text("mundo".into()),
        ]);
        assert_eq!(content.text(), "Hola mundo");
        assert_eq!(content.function_calls().len(), 1);
    }

    #[test]
    fn test_empty_turn_text() {
        assert_eq!(ModelTurn::default().text(), "");
    }
}
