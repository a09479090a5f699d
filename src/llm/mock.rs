//! Mock 传输（用于测试与 `provider = "mock"`，无需 API）
//!
//! 按顺序弹出预置的回合；脚本用完后回显：计划请求返回三个固定步骤，对话请求回显最后一条用户文本。

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{
    Content, FunctionCall, GenerateRequest, GroundingChunk, LlmError, ModelTransport, ModelTurn,
    Part, ResponseFormat, Role,
};

/// 脚本化传输：记录所有请求，按队列返回结果
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<ModelTurn, LlmError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, item: Result<ModelTurn, LlmError>) {
        if let Ok(mut script) = self.script.lock() {
            script.push_back(item);
        }
    }

    pub fn push_turn(&self, turn: ModelTurn) {
        self.push(Ok(turn));
    }

    pub fn push_text(&self, text: impl Into<String>) {
        self.push_turn(ModelTurn {
            content: Some(Content::model_text(text)),
            ..Default::default()
        });
    }

    /// 带联网搜索引用的文本回合
    pub fn push_grounded_text(&self, text: impl Into<String>, sources: &[(&str, &str)]) {
        self.push_turn(ModelTurn {
            content: Some(Content::model_text(text)),
            grounding: sources
                .iter()
                .map(|(title, uri)| GroundingChunk {
                    title: Some(title.to_string()),
                    uri: Some(uri.to_string()),
                })
                .collect(),
            finish_reason: Some("STOP".into()),
        });
    }

    /// 一个回合内的若干函数调用
    pub fn push_calls(&self, calls: Vec<(&str, Value)>) {
        let parts = calls
            .into_iter()
            .enumerate()
            .map(|(i, (name, args))| {
                Part::FunctionCall(FunctionCall {
                    id: Some(format!("call_{}", i)),
                    name: name.to_string(),
                    args,
                    thought_signature: None,
                })
            })
            .collect();
        self.push_turn(ModelTurn {
            content: Some(Content::model(parts)),
            ..Default::default()
        });
    }

    pub fn push_error(&self, err: LlmError) {
        self.push(Err(err));
    }

    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    fn fallback(request: &GenerateRequest) -> ModelTurn {
        let text = match request.response_format {
            ResponseFormat::Json { .. } => {
                r#"["Analizar el objetivo","Reunir información","Redactar el resultado"]"#.to_string()
            }
            ResponseFormat::Text => {
                let last_user = request
                    .contents
                    .iter()
                    .rev()
                    .find(|c| c.role == Role::User)
                    .map(Content::text)
                    .unwrap_or_else(|| "(sin entrada)".to_string());
                format!("Echo from Mock: {}", last_user)
            }
        };
        ModelTurn {
            content: Some(Content::model_text(text)),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ModelTransport for ScriptedTransport {
    async fn generate(&self, request: &GenerateRequest) -> Result<ModelTurn, LlmError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(item) => item,
            None => Ok(Self::fallback(request)),
        }
    }

    fn provider(&self) -> &str {
        "mock"
    }
}
