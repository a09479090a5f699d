//! 集成测试：执行循环 + 工具处理器 + 运行时，全部走脚本化模型与桩抓取

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use agentnamix::agent::{spawn_agent, AgentComponents, Command};
use agentnamix::core::{AgentConfiguration, AgentError, FailurePolicy, RunStatus, TaskStatus, ToolType};
use agentnamix::llm::{LlmError, ModelGateway, Part, ScriptedTransport};
use agentnamix::memory::{AgentStore, InMemoryStore};
use agentnamix::react::{ExecutionLoop, ExecutionRequest, Planner};
use agentnamix::tools::{FetchError, PageFetcher, ToolDeps, ToolKit, ToolSettings};

/// 按 URL 返回固定页面，未登记的 URL 视为 404
#[derive(Default)]
struct StubFetcher {
    pages: HashMap<String, String>,
}

impl StubFetcher {
    fn with_page(mut self, url: &str, body: &str) -> Self {
        self.pages.insert(url.to_string(), body.to_string());
        self
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        self.pages.get(url).cloned().ok_or(FetchError::NotFound)
    }
}

fn deps(fetcher: StubFetcher, store: Arc<dyn AgentStore>) -> ToolDeps {
    ToolDeps {
        fetcher: Arc::new(fetcher),
        store,
        settings: ToolSettings::default(),
    }
}

fn request(task: &str, config: AgentConfiguration) -> ExecutionRequest {
    ExecutionRequest {
        task_id: "task-0".into(),
        task_description: task.into(),
        context: String::new(),
        goal: "Objetivo de prueba".into(),
        config: Arc::new(config),
    }
}

/// 最后一个请求里第 index 个函数结果
fn function_result(transport: &ScriptedTransport, request: usize, index: usize) -> serde_json::Value {
    let sent = &transport.requests()[request];
    let last = sent.contents.last().cloned().unwrap_or_else(|| panic!("no contents"));
    match &last.parts[index] {
        Part::FunctionResponse(r) => r.response["result"].clone(),
        other => panic!("expected function response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_scrape_answered_in_one_round() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_calls(vec![("web_scrape", json!({"url": "example.com/precios"}))]);
    transport.push_text("El plan básico cuesta 10 €.");

    let config = AgentConfiguration::default().with_tools([ToolType::WebScrape]);
    let fetcher = StubFetcher::default().with_page(
        "https://example.com/precios",
        "Precios\n\nPlan básico: 10 € al mes. Plan pro: 25 € al mes.",
    );
    let deps = deps(fetcher, Arc::new(InMemoryStore::empty()));
    let kit = ToolKit::for_agent(&config, &deps);
    let exec = ExecutionLoop::new(Arc::new(ModelGateway::new(transport.clone())));

    let outcome = exec
        .execute(&request("Extraer precios", config), &kit, None)
        .await
        .unwrap();
    assert_eq!(outcome.rounds, 1);
    assert!(!outcome.truncated);
    assert_eq!(outcome.model_text, "El plan básico cuesta 10 €.");

    let result = function_result(&transport, 1, 0);
    assert_eq!(result["success"], true);
    assert_eq!(result["url"], "https://example.com/precios");
    assert!(result["content"].as_str().unwrap().contains("Plan pro: 25 €"));
}

#[tokio::test]
async fn test_navigation_404_returns_advisory() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_calls(vec![(
        "browser_action",
        json!({"action": "NAVIGATE", "value": "https://example.com/no-existe"}),
    )]);
    transport.push_text("La página no existe; probaré otra fuente.");

    let config = AgentConfiguration::default().with_tools([ToolType::BrowserInteraction]);
    let deps = deps(StubFetcher::default(), Arc::new(InMemoryStore::empty()));
    let kit = ToolKit::for_agent(&config, &deps);
    let exec = ExecutionLoop::new(Arc::new(ModelGateway::new(transport.clone())));

    let outcome = exec
        .execute(&request("Visitar la página", config), &kit, None)
        .await
        .unwrap();
    assert_eq!(outcome.rounds, 1);

    let result = function_result(&transport, 1, 0);
    assert_eq!(result["success"], false);
    let message = result["message"].as_str().unwrap();
    assert!(message.contains("no encontrada"));
    assert!(message.contains("TYPE"));
}

#[tokio::test]
async fn test_memory_store_retrieve_forget() {
    let store: Arc<dyn AgentStore> = Arc::new(InMemoryStore::empty());
    let transport = Arc::new(ScriptedTransport::new());
    let config = AgentConfiguration::default().with_tools([ToolType::MemorySystem]);
    let deps = deps(StubFetcher::default(), store.clone());
    let exec = ExecutionLoop::new(Arc::new(ModelGateway::new(transport.clone())));

    // STORE
    transport.push_calls(vec![(
        "memory_system",
        json!({"action": "STORE", "content": "El cliente prefiere Rust", "priority": "high"}),
    )]);
    transport.push_text("Guardado.");
    let kit = ToolKit::for_agent(&config, &deps);
    exec.execute(&request("Recordar preferencia", config.clone()), &kit, None)
        .await
        .unwrap();
    let stored = store.high_priority().unwrap();
    assert_eq!(stored.len(), 1);
    let id = stored[0].id.clone();

    // RETRIEVE：系统指令已带上高优先级记忆
    transport.push_calls(vec![("memory_system", json!({"action": "RETRIEVE", "query": "rust"}))]);
    transport.push_text("Prefiere Rust.");
    exec.execute(&request("Consultar preferencia", config.clone()), &kit, None)
        .await
        .unwrap();
    let system = transport.requests()[2].system_instruction.clone().unwrap_or_default();
    assert!(system.contains("[MEMORIA A LARGO PLAZO - DATOS CRÍTICOS]"));
    assert!(system.contains("El cliente prefiere Rust"));
    let retrieved = function_result(&transport, 3, 0);
    assert_eq!(retrieved["count"], 1);

    // FORGET
    transport.push_calls(vec![("memory_system", json!({"action": "FORGET", "memoryId": id}))]);
    transport.push_text("Olvidado.");
    exec.execute(&request("Olvidar preferencia", config), &kit, None)
        .await
        .unwrap();
    assert_eq!(function_result(&transport, 5, 0)["success"], true);
    assert!(store.search_memories("rust").unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_backoff_schedule() {
    let transport = Arc::new(ScriptedTransport::new());
    for _ in 0..4 {
        transport.push_error(LlmError::RateLimited {
            status: 429,
            message: "RESOURCE_EXHAUSTED".into(),
        });
    }
    transport.push_text(r#"["Buscar","Comparar","Resumir"]"#);
    let planner = Planner::new(Arc::new(ModelGateway::new(transport.clone())));

    let start = tokio::time::Instant::now();
    let steps = planner
        .plan("Comparar lenguajes", &AgentConfiguration::default())
        .await
        .unwrap();
    // 4 + 8 + 16 + 32
    assert_eq!(start.elapsed(), Duration::from_secs(60));
    assert_eq!(steps, vec!["Buscar", "Comparar", "Resumir"]);
    assert_eq!(transport.request_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn test_rate_limit_gives_up_after_five_attempts() {
    let transport = Arc::new(ScriptedTransport::new());
    for _ in 0..5 {
        transport.push_error(LlmError::RateLimited {
            status: 429,
            message: "quota exceeded".into(),
        });
    }
    let planner = Planner::new(Arc::new(ModelGateway::new(transport.clone())));
    let start = tokio::time::Instant::now();
    let err = planner
        .plan("x", &AgentConfiguration::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AgentError::RateLimited(_)));
    assert_eq!(start.elapsed(), Duration::from_secs(60));
    assert_eq!(transport.request_count(), 5);
}

fn runtime_components(transport: Arc<ScriptedTransport>) -> AgentComponents {
    let deps = deps(StubFetcher::default(), Arc::new(InMemoryStore::empty()));
    AgentComponents::new(
        Arc::new(ModelGateway::new(transport)),
        deps,
        FailurePolicy::Halt,
        6,
    )
}

#[tokio::test]
async fn test_follow_up_after_finished_restarts_execution() {
    let transport = Arc::new(ScriptedTransport::new());
    let (cmd_tx, mut state_rx, _events) = spawn_agent(runtime_components(transport.clone()));

    cmd_tx
        .send(Command::Start {
            goal: "Escribir un resumen".into(),
            config: AgentConfiguration::default(),
        })
        .unwrap();
    state_rx
        .wait_for(|s| s.status == RunStatus::Finished)
        .await
        .unwrap();

    cmd_tx.send(Command::FollowUp("Traducir al inglés".into())).unwrap();
    let snapshot = state_rx
        .wait_for(|s| {
            s.status == RunStatus::Finished
                && s.tasks.len() == 4
                && s.tasks[3].status == TaskStatus::Completed
        })
        .await
        .unwrap()
        .clone();
    assert_eq!(snapshot.tasks[3].id, "followup-1");
    // 后续任务的上下文包含前三个任务的结果
    let last = transport.requests().last().cloned().unwrap();
    assert!(last.contents[0].text().contains("Tarea: Analizar el objetivo"));
    cmd_tx.send(Command::Quit).unwrap();
}

#[tokio::test]
async fn test_runtime_never_runs_two_tasks_at_once() {
    let transport = Arc::new(ScriptedTransport::new());
    transport.push_text(r#"["a","b","c","d","e","f"]"#);
    let (cmd_tx, mut state_rx, _events) = spawn_agent(runtime_components(transport));

    cmd_tx
        .send(Command::Start {
            goal: "Seis pasos".into(),
            config: AgentConfiguration::default(),
        })
        .unwrap();
    // 插入编辑请求与后续任务，运行中也不能出现第二个 processing
    cmd_tx
        .send(Command::EditorRequest {
            instruction: "Cambiar el título".into(),
            file: Some("index.html".into()),
        })
        .unwrap();
    cmd_tx.send(Command::FollowUp("Revisar todo".into())).unwrap();

    let mut max_processing = 0;
    loop {
        let snapshot = state_rx.borrow_and_update().clone();
        max_processing = max_processing.max(snapshot.processing_count());
        if snapshot.status == RunStatus::Finished {
            assert!(snapshot.tasks.iter().all(|t| t.status == TaskStatus::Completed));
            assert!(snapshot.tasks.iter().any(|t| t.id.starts_with("followup-")));
            break;
        }
        state_rx.changed().await.unwrap();
    }
    assert!(max_processing <= 1);
    cmd_tx.send(Command::Quit).unwrap();
}

#[tokio::test]
async fn test_stop_then_reset_discards_run() {
    let transport = Arc::new(ScriptedTransport::new());
    let (cmd_tx, mut state_rx, _events) = spawn_agent(runtime_components(transport));
    cmd_tx
        .send(Command::Start {
            goal: "Algo".into(),
            config: AgentConfiguration::default(),
        })
        .unwrap();
    state_rx.wait_for(|s| !s.goal.is_empty()).await.unwrap();
    cmd_tx.send(Command::Stop).unwrap();
    cmd_tx.send(Command::Reset).unwrap();
    let snapshot = state_rx
        .wait_for(|s| s.status == RunStatus::Idle && s.tasks.is_empty() && s.goal.is_empty())
        .await
        .unwrap()
        .clone();
    assert!(snapshot.logs.is_empty());
    cmd_tx.send(Command::Quit).unwrap();
}
