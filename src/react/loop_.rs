//! 执行循环：驱动单个任务走完函数调用协议
//!
//! AWAITING_MODEL -> (TOOL_CALLS_PENDING -> AWAITING_MODEL)* -> DONE，最多 max_rounds 轮工具调用。
//! 模型看到的对话（contents）与用户看到的输出（model_text + widgets）分开保存。

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::core::{AgentConfiguration, AgentError, ToolType};
use crate::llm::{Content, FunctionCall, FunctionResponse, GroundingChunk, ModelGateway, Part};
use crate::react::events::{send_event, AgentEvent};
use crate::react::prompt::{system_instruction, task_prompt};
use crate::tools::web::truncate_chars;
use crate::tools::{ToolContext, ToolKit, INITIAL_URL};

pub const MAX_ROUNDS: usize = 6;
pub const FALLBACK_TEXT: &str = "No se pudo generar una respuesta final.";
pub const TRUNCATION_NOTICE: &str =
    "\n\n> ⚠️ Se alcanzó el límite de rondas de herramientas; la respuesta puede estar incompleta.";
/// 截图预览最多几条
const MAX_CAPTURES: usize = 3;
const OBSERVATION_PREVIEW_CHARS: usize = 200;

/// 执行一个任务所需的只读输入
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub task_id: String,
    pub task_description: String,
    /// 之前已完成任务的结果
    pub context: String,
    pub goal: String,
    pub config: Arc<AgentConfiguration>,
}

/// 工具产生的用户可见标记
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub tool: String,
    pub markup: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutcome {
    pub model_text: String,
    pub widgets: Vec<Widget>,
    /// 已完成的工具调用轮数
    pub rounds: usize,
    /// 轮次用尽，答案可能不完整
    pub truncated: bool,
}

impl TaskOutcome {
    /// 最终展示文本：模型回答 + 小部件；永远非空
    pub fn render(&self) -> String {
        let mut out = self.model_text.clone();
        for widget in &self.widgets {
            out.push_str("\n\n");
            out.push_str(&widget.markup);
        }
        if out.trim().is_empty() {
            out = FALLBACK_TEXT.to_string();
        }
        if self.truncated {
            out.push_str(TRUNCATION_NOTICE);
        }
        out
    }
}

/// 联网搜索引用：来源列表 + 最多 3 个网页截图预览
pub fn grounding_section(chunks: &[GroundingChunk]) -> String {
    let mut out = String::new();
    let sources: Vec<String> = chunks
        .iter()
        .filter_map(|c| match (&c.title, &c.uri) {
            (Some(title), Some(uri)) if !title.is_empty() && !uri.is_empty() => {
                Some(format!("- [{}]({})", title, uri))
            }
            _ => None,
        })
        .collect();
    if !sources.is_empty() {
        out.push_str("\n\n---\n### 📚 Fuentes\n");
        out.push_str(&sources.join("\n"));
    }
    let uris: Vec<&str> = chunks
        .iter()
        .filter_map(|c| c.uri.as_deref())
        .filter(|u| !u.is_empty())
        .take(MAX_CAPTURES)
        .collect();
    if !uris.is_empty() {
        out.push_str("\n\n---\n### 📸 Capturas\n");
        for uri in uris {
            let encoded: String = url::form_urlencoded::byte_serialize(uri.as_bytes()).collect();
            out.push_str(&format!(
                "\n[![Vista](https://s0.wp.com/mshots/v1/{}?w=600&h=400)]({})",
                encoded, uri
            ));
        }
    }
    out
}

pub struct ExecutionLoop {
    gateway: Arc<ModelGateway>,
    max_rounds: usize,
}

impl ExecutionLoop {
    pub fn new(gateway: Arc<ModelGateway>) -> Self {
        Self {
            gateway,
            max_rounds: MAX_ROUNDS,
        }
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds.max(1);
        self
    }

    fn initial_turn(request: &ExecutionRequest) -> Content {
        let config = &request.config;
        let initial_url = config
            .has_tool(ToolType::BrowserInteraction)
            .then_some(INITIAL_URL);
        let text = task_prompt(
            &request.goal,
            &request.context,
            &request.task_description,
            &config.documents,
            initial_url,
        );
        let mut parts = vec![Part::Text(text)];
        if config.has_vision() {
            parts.extend(config.images.iter().map(|img| Part::InlineData {
                mime_type: img.mime_type.clone(),
                data: img.data.clone(),
            }));
        }
        Content::user(parts)
    }

    pub async fn execute(
        &self,
        request: &ExecutionRequest,
        kit: &ToolKit,
        events: Option<&mpsc::UnboundedSender<AgentEvent>>,
    ) -> Result<TaskOutcome, AgentError> {
        let config = &request.config;
        let system = system_instruction(config, &kit.system_hints(config));
        let tools = kit.tool_set();
        let ctx = ToolContext::new(config.clone()).with_events(events.cloned());

        let mut contents = vec![Self::initial_turn(request)];
        let mut widgets: Vec<Widget> = Vec::new();
        let mut last_text = String::new();
        let mut rounds = 0;

        while rounds < self.max_rounds {
            send_event(
                events,
                AgentEvent::Round {
                    task_id: request.task_id.clone(),
                    round: rounds + 1,
                    max_rounds: self.max_rounds,
                },
            );
            debug!(task = %request.task_id, round = rounds + 1, "awaiting model");

            let turn = self
                .gateway
                .converse(&config.model, contents.clone(), Some(system.clone()), tools.clone())
                .await?;
            let Some(content) = turn.content.clone() else {
                return Err(AgentError::Provider(format!(
                    "el modelo no devolvió contenido (finishReason: {})",
                    turn.finish_reason.as_deref().unwrap_or("desconocido")
                )));
            };
            let calls: Vec<FunctionCall> = content.function_calls().into_iter().cloned().collect();
            let text = content.text();
            contents.push(content);
            if !text.trim().is_empty() {
                last_text = text.clone();
            }

            if calls.is_empty() {
                let mut model_text = text;
                if kit.web_search() {
                    model_text.push_str(&grounding_section(&turn.grounding));
                }
                info!(task = %request.task_id, rounds, "task answered");
                return Ok(TaskOutcome {
                    model_text,
                    widgets,
                    rounds,
                    truncated: false,
                });
            }

            let mut responses = Vec::with_capacity(calls.len());
            for call in calls {
                send_event(
                    events,
                    AgentEvent::ToolCall {
                        tool: call.name.clone(),
                        args: call.args.clone(),
                    },
                );
                let output = kit
                    .executor()
                    .execute(&call.name, call.args.clone(), &ctx)
                    .await;
                let preview = output
                    .message()
                    .map(str::to_string)
                    .unwrap_or_else(|| output.data.to_string());
                send_event(
                    events,
                    AgentEvent::Observation {
                        tool: call.name.clone(),
                        success: output.success,
                        preview: truncate_chars(&preview, OBSERVATION_PREVIEW_CHARS),
                    },
                );
                if let Some(markup) = output.markup.clone() {
                    widgets.push(Widget {
                        tool: call.name.clone(),
                        markup,
                    });
                }
                responses.push(Part::FunctionResponse(FunctionResponse {
                    id: call.id,
                    name: call.name,
                    response: output.model_response(),
                }));
            }
            contents.push(Content::user(responses));
            rounds += 1;
        }

        warn!(task = %request.task_id, rounds, "tool-call budget exhausted");
        Ok(TaskOutcome {
            model_text: last_text,
            widgets,
            rounds,
            truncated: true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ModelTurn, Role, ScriptedTransport};
    use crate::memory::InMemoryStore;
    use crate::tools::{FetchError, PageFetcher, ToolDeps, ToolSettings};
    use async_trait::async_trait;
    use serde_json::json;

    struct NoFetch;

    #[async_trait]
    impl PageFetcher for NoFetch {
        async fn fetch(&self, _url: &str) -> Result<String, FetchError> {
            Err(FetchError::NotFound)
        }
    }

    fn setup(tools: &[ToolType]) -> (Arc<ScriptedTransport>, ExecutionLoop, ToolKit, ExecutionRequest) {
        let transport = Arc::new(ScriptedTransport::new());
        let gateway = Arc::new(ModelGateway::new(transport.clone()));
        let config = Arc::new(AgentConfiguration::default().with_tools(tools.iter().copied()));
        let deps = ToolDeps {
            fetcher: Arc::new(NoFetch),
            store: Arc::new(InMemoryStore::empty()),
            settings: ToolSettings::default(),
        };
        let kit = ToolKit::for_agent(&config, &deps);
        let request = ExecutionRequest {
            task_id: "task-0".into(),
            task_description: "Hacer algo".into(),
            context: String::new(),
            goal: "Objetivo".into(),
            config,
        };
        (transport, ExecutionLoop::new(gateway), kit, request)
    }

    #[tokio::test]
    async fn test_direct_answer_with_grounding() {
        let (transport, exec, kit, req) = setup(&[ToolType::WebSearch]);
        transport.push_grounded_text(
            "Respuesta.",
            &[("Rust", "https://www.rust-lang.org"), ("Docs", "https://doc.rust-lang.org")],
        );
        let outcome = exec.execute(&req, &kit, None).await.unwrap();
        assert_eq!(outcome.rounds, 0);
        assert!(!outcome.truncated);
        assert!(outcome.model_text.contains("### 📚 Fuentes\n- [Rust](https://www.rust-lang.org)"));
        assert!(outcome
            .model_text
            .contains("https://s0.wp.com/mshots/v1/https%3A%2F%2Fwww.rust-lang.org?w=600&h=400"));
        assert!(transport.requests()[0].tools.web_search);
    }

    #[tokio::test]
    async fn test_grounding_ignored_without_web_search() {
        let (transport, exec, kit, req) = setup(&[]);
        transport.push_grounded_text("Hola.", &[("A", "https://a.example")]);
        let outcome = exec.execute(&req, &kit, None).await.unwrap();
        assert_eq!(outcome.model_text, "Hola.");
    }

    #[tokio::test]
    async fn test_multiple_calls_answered_in_one_turn() {
        let (transport, exec, kit, req) = setup(&[ToolType::GoogleDrive, ToolType::GoogleCalendar]);
        transport.push_calls(vec![
            ("google_drive", json!({"action": "SEARCH", "query": "presupuesto"})),
            (
                "google_calendar",
                json!({"title": "Revisión", "startTime": "2025-05-01 10:00", "endTime": "2025-05-01 11:00"}),
            ),
        ]);
        transport.push_text("Listo.");
        let outcome = exec.execute(&req, &kit, None).await.unwrap();
        assert_eq!(outcome.rounds, 1);
        assert_eq!(outcome.widgets.len(), 2);

        let second = &transport.requests()[1];
        let last = second.contents.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.parts.len(), 2);
        match &last.parts[0] {
            Part::FunctionResponse(r) => {
                assert_eq!(r.id.as_deref(), Some("call_0"));
                assert_eq!(r.response["result"]["success"], true);
            }
            other => panic!("unexpected part {:?}", other),
        }
        let rendered = outcome.render();
        assert!(rendered.starts_with("Listo.\n\n"));
        assert!(rendered.contains("Agregar a Google Calendar"));
    }

    #[tokio::test]
    async fn test_unknown_tool_keeps_looping() {
        let (transport, exec, kit, req) = setup(&[]);
        transport.push_calls(vec![("no_existe", json!({}))]);
        transport.push_text("Sin herramientas.");
        let outcome = exec.execute(&req, &kit, None).await.unwrap();
        assert_eq!(outcome.model_text, "Sin herramientas.");
        let resp = &transport.requests()[1].contents[2].parts[0];
        match resp {
            Part::FunctionResponse(r) => assert_eq!(r.response["result"]["success"], false),
            other => panic!("unexpected part {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_round_budget_exhausted() {
        let (transport, exec, kit, req) = setup(&[ToolType::GoogleDrive]);
        let exec = exec.with_max_rounds(2);
        for _ in 0..2 {
            transport.push_calls(vec![("google_drive", json!({"action": "CREATE"}))]);
        }
        let outcome = exec.execute(&req, &kit, None).await.unwrap();
        assert!(outcome.truncated);
        assert_eq!(outcome.rounds, 2);
        assert_eq!(transport.request_count(), 2);
        let rendered = outcome.render();
        assert!(rendered.contains("Abrir Drive"));
        assert!(rendered.ends_with(TRUNCATION_NOTICE));
    }

    #[tokio::test]
    async fn test_empty_content_is_fatal() {
        let (transport, exec, kit, req) = setup(&[]);
        transport.push_turn(ModelTurn {
            content: None,
            grounding: vec![],
            finish_reason: Some("SAFETY".into()),
        });
        let err = exec.execute(&req, &kit, None).await.unwrap_err();
        assert!(matches!(err, AgentError::Provider(ref m) if m.contains("SAFETY")));
    }

    #[test]
    fn test_render_fallback() {
        let outcome = TaskOutcome {
            model_text: "  ".into(),
            widgets: vec![],
            rounds: 0,
            truncated: false,
        };
        assert_eq!(outcome.render(), FALLBACK_TEXT);
    }

    #[tokio::test]
    async fn test_browser_agent_gets_initial_url() {
        let (transport, exec, kit, req) = setup(&[ToolType::BrowserInteraction]);
        transport.push_text("ok");
        exec.execute(&req, &kit, None).await.unwrap();
        let first = transport.requests()[0].contents[0].text();
        assert!(first.contains("URL INICIAL: https://www.google.com"));
    }
}
