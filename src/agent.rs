//! Headless Agent 运行时
//!
//! create_agent_components 按配置构建 ModelGateway / Planner / ExecutionLoop / 存储；
//! spawn_agent 启动后台任务：唯一持有 Orchestrator，消费命令，规划与任务执行在独立 tokio 任务中进行，
//! 结果回到本循环再写入状态；对外提供三通道（命令 mpsc、快照 watch、事件 broadcast）。

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{gemini_api_key, openai_api_key, AppConfig};
use crate::core::{
    AgentConfiguration, AgentError, FailurePolicy, LogEntry, LogKind, Orchestrator, RunSnapshot,
    RunStatus, Step,
};
use crate::llm::{
    GeminiTransport, ModelAliases, ModelGateway, ModelTransport, OpenAiTransport,
    ScriptedTransport,
};
use crate::memory::{AgentStore, InMemoryStore, SqliteStore};
use crate::react::{AgentEvent, ExecutionLoop, Planner, TaskOutcome};
use crate::tools::{ProxyFetcher, ShellSession, ToolDeps, ToolKit};

const EVENT_CAPACITY: usize = 256;

/// 前端 -> 运行时的命令
#[derive(Debug, Clone)]
pub enum Command {
    /// 开始新运行（丢弃当前运行）
    Start {
        goal: String,
        config: AgentConfiguration,
    },
    FollowUp(String),
    /// 代码编辑器发来的修改请求
    EditorRequest {
        instruction: String,
        file: Option<String>,
    },
    AddDocument { name: String, content: String },
    Stop,
    Reset,
    Quit,
}

/// 预构建的 Agent 组件，可被多个运行时共享
#[derive(Clone)]
pub struct AgentComponents {
    pub gateway: Arc<ModelGateway>,
    pub planner: Arc<Planner>,
    pub exec_loop: Arc<ExecutionLoop>,
    pub deps: ToolDeps,
    pub policy: FailurePolicy,
}

impl AgentComponents {
    pub fn new(
        gateway: Arc<ModelGateway>,
        deps: ToolDeps,
        policy: FailurePolicy,
        max_rounds: usize,
    ) -> Self {
        Self {
            planner: Arc::new(Planner::new(gateway.clone())),
            exec_loop: Arc::new(ExecutionLoop::new(gateway.clone()).with_max_rounds(max_rounds)),
            gateway,
            deps,
            policy,
        }
    }

    pub fn store(&self) -> &Arc<dyn AgentStore> {
        &self.deps.store
    }
}

/// 按配置与环境变量选择后端；缺少 Key 时回落到 Mock
pub fn create_transport(cfg: &AppConfig) -> Arc<dyn ModelTransport> {
    let provider = cfg.llm.provider.to_lowercase();
    let base = cfg.llm.base_url.as_deref();
    let timeout = cfg.llm.request_timeout();
    let gemini = gemini_api_key();
    let openai = openai_api_key();

    match (provider.as_str(), gemini, openai) {
        ("mock", _, _) => {
            info!("Using Mock LLM (configured)");
            Arc::new(ScriptedTransport::new())
        }
        ("openai", _, Some(key)) | ("gemini", None, Some(key)) => {
            info!(model = %cfg.llm.default_model, "Using OpenAI-compatible LLM");
            Arc::new(OpenAiTransport::new(base, key, timeout))
        }
        (_, Some(key), _) => {
            info!(model = %cfg.llm.default_model, "Using Gemini LLM");
            Arc::new(GeminiTransport::new(base, key, timeout))
        }
        _ => {
            warn!(provider = %provider, "No API key set or provider unknown, using Mock LLM");
            Arc::new(ScriptedTransport::new())
        }
    }
}

/// 打开 data_dir 下的 SQLite；失败时退回内存存储
pub fn open_store(cfg: &AppConfig) -> Arc<dyn AgentStore> {
    if let Err(e) = std::fs::create_dir_all(&cfg.app.data_dir) {
        warn!(dir = %cfg.app.data_dir.display(), error = %e, "cannot create data dir");
    }
    let path = cfg.app.db_path();
    match SqliteStore::open(&path) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "SQLite unavailable, using in-memory store");
            Arc::new(InMemoryStore::new())
        }
    }
}

pub fn create_gateway(cfg: &AppConfig, transport: Arc<dyn ModelTransport>) -> ModelGateway {
    ModelGateway::new(transport)
        .with_aliases(ModelAliases::new(cfg.llm.default_model.clone()).with_overrides(&cfg.llm.aliases))
        .with_retry(cfg.llm.retry.to_retry_config())
        .with_sampling(cfg.llm.sampling())
}

/// 创建 Agent 组件：LLM 后端、存储、抓取代理、工具参数
pub fn create_agent_components(cfg: &AppConfig) -> AgentComponents {
    let gateway = Arc::new(create_gateway(cfg, create_transport(cfg)));
    let deps = ToolDeps {
        fetcher: Arc::new(ProxyFetcher::new(
            cfg.tools.proxy_url.clone(),
            cfg.tools.fetch_timeout(),
            cfg.tools.min_content_chars,
        )),
        store: open_store(cfg),
        settings: cfg.tools.settings(),
    };
    AgentComponents::new(gateway, deps, cfg.app.on_task_failure, cfg.app.max_rounds)
}

/// 后台任务回传给运行时的结果
enum Job {
    Planned {
        epoch: u64,
        result: Result<Vec<String>, AgentError>,
    },
    Executed {
        epoch: u64,
        task_id: String,
        result: Result<TaskOutcome, AgentError>,
    },
}

struct Runtime {
    components: AgentComponents,
    orchestrator: Orchestrator,
    job_tx: mpsc::UnboundedSender<Job>,
    /// 工具事件带上所属运行的 epoch
    tool_tx: mpsc::UnboundedSender<(u64, AgentEvent)>,
    event_tx: broadcast::Sender<AgentEvent>,
    state_tx: watch::Sender<RunSnapshot>,
    inflight: Option<JoinHandle<()>>,
    /// 本次运行的终端会话，随 Start 新建、随 Reset 丢弃
    shell: Option<ShellSession>,
    last_status: RunStatus,
}

impl Runtime {
    fn emit(&self, event: AgentEvent) {
        let _ = self.event_tx.send(event);
    }

    fn abort_inflight(&mut self) {
        if let Some(handle) = self.inflight.take() {
            handle.abort();
        }
    }

    fn report(&mut self, err: AgentError) {
        warn!(error = %err, "command rejected");
        self.emit(AgentEvent::Log {
            entry: LogEntry::new(err.to_string(), LogKind::Error),
        });
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Start { goal, config } => {
                self.abort_inflight();
                let settings = &self.components.deps.settings;
                self.shell = Some(ShellSession::for_agent(&config, settings));
                let ticket = self.orchestrator.begin_run(goal, config);
                let planner = self.components.planner.clone();
                let job_tx = self.job_tx.clone();
                self.inflight = Some(tokio::spawn(async move {
                    let result = planner.plan(&ticket.goal, &ticket.config).await;
                    let _ = job_tx.send(Job::Planned {
                        epoch: ticket.epoch,
                        result,
                    });
                }));
            }
            Command::FollowUp(description) => {
                if let Err(e) = self.orchestrator.follow_up(description) {
                    self.report(e);
                }
            }
            Command::EditorRequest { instruction, file } => {
                if let Err(e) = self.orchestrator.editor_request(&instruction, file.as_deref()) {
                    self.report(e);
                }
            }
            Command::AddDocument { name, content } => {
                if let Err(e) = self.orchestrator.add_document(&name, &content) {
                    self.report(e);
                }
            }
            Command::Stop => self.orchestrator.stop(),
            Command::Reset => {
                self.abort_inflight();
                self.shell = None;
                self.orchestrator.reset();
            }
            Command::Quit => {}
        }
    }

    fn handle_tool_event(&mut self, epoch: u64, event: AgentEvent) {
        if epoch != self.orchestrator.epoch() {
            debug!(epoch, current = self.orchestrator.epoch(), "discarding stale tool event");
            return;
        }
        if let AgentEvent::ProjectUpdated { project } = &event {
            self.orchestrator.set_project(project.clone());
        }
        self.emit(event);
    }

    fn handle_job(&mut self, job: Job) {
        match job {
            Job::Planned { epoch, result } => {
                if self.orchestrator.apply_plan(epoch, result) {
                    self.inflight = None;
                    let steps: Vec<String> = self
                        .orchestrator
                        .tasks()
                        .iter()
                        .map(|t| t.description.clone())
                        .collect();
                    if !steps.is_empty() {
                        self.emit(AgentEvent::PlanReady { steps });
                    }
                }
            }
            Job::Executed {
                epoch,
                task_id,
                result,
            } => {
                let failure = result.as_ref().err().map(ToString::to_string);
                let truncated = result.as_ref().map(|o| o.truncated).unwrap_or(false);
                if !self.orchestrator.apply_outcome(epoch, &task_id, result) {
                    return;
                }
                self.inflight = None;
                match failure {
                    None => self.emit(AgentEvent::TaskCompleted { task_id, truncated }),
                    Some(error) => self.emit(AgentEvent::TaskFailed { task_id, error }),
                }
            }
        }
    }

    /// 没有任务在执行时取下一个任务
    fn advance(&mut self) {
        let Step::Execute(ticket) = self.orchestrator.next_step() else {
            return;
        };
        self.emit(AgentEvent::TaskStarted {
            task_id: ticket.task_id.clone(),
            description: ticket.description.clone(),
        });
        let exec_loop = self.components.exec_loop.clone();
        let deps = self.components.deps.clone();
        let shell = self
            .shell
            .get_or_insert_with(|| ShellSession::for_agent(&ticket.config, &deps.settings))
            .clone();
        let job_tx = self.job_tx.clone();
        let tool_tx = self.tool_tx.clone();
        self.inflight = Some(tokio::spawn(async move {
            let epoch = ticket.epoch;
            let task_id = ticket.task_id.clone();
            let kit = ToolKit::for_run(&ticket.config, &deps, &shell);
            let (task_tx, mut task_rx) = mpsc::unbounded_channel();
            let run = async move {
                let result = exec_loop.execute(&ticket.request(), &kit, Some(&task_tx)).await;
                drop(task_tx);
                result
            };
            // 转发完全部工具事件后才回传结果
            let forward = async {
                while let Some(event) = task_rx.recv().await {
                    let _ = tool_tx.send((epoch, event));
                }
            };
            let (result, ()) = tokio::join!(run, forward);
            let _ = job_tx.send(Job::Executed {
                epoch,
                task_id,
                result,
            });
        }));
    }

    /// 推送新日志、状态变化与快照
    fn publish(&mut self) {
        for entry in self.orchestrator.take_new_logs() {
            self.emit(AgentEvent::Log { entry });
        }
        let status = self.orchestrator.status();
        if status != self.last_status {
            self.last_status = status;
            info!(status = status.label(), "run status");
            self.emit(AgentEvent::Status { status });
        }
        let snapshot = self.orchestrator.snapshot();
        debug_assert!(snapshot.processing_count() <= 1);
        let _ = self.state_tx.send(snapshot);
    }
}

/// 创建 Agent 运行时：返回命令发送端、快照接收端、事件接收端
pub fn spawn_agent(
    components: AgentComponents,
) -> (
    mpsc::UnboundedSender<Command>,
    watch::Receiver<RunSnapshot>,
    broadcast::Receiver<AgentEvent>,
) {
    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<Command>();
    let (state_tx, state_rx) = watch::channel(RunSnapshot::default());
    let (event_tx, event_rx) = broadcast::channel::<AgentEvent>(EVENT_CAPACITY);
    let (job_tx, mut job_rx) = mpsc::unbounded_channel::<Job>();
    let (tool_tx, mut tool_rx) = mpsc::unbounded_channel::<(u64, AgentEvent)>();

    let mut runtime = Runtime {
        orchestrator: Orchestrator::new(components.policy),
        components,
        job_tx,
        tool_tx,
        event_tx,
        state_tx,
        inflight: None,
        shell: None,
        last_status: RunStatus::Idle,
    };

    tokio::spawn(async move {
        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    match cmd {
                        None | Some(Command::Quit) => break,
                        Some(cmd) => runtime.handle_command(cmd),
                    }
                }
                Some(job) = job_rx.recv() => {
                    // 工具事件先于结果发出：先处理完，保证下一任务的上下文带上项目
                    while let Ok((epoch, event)) = tool_rx.try_recv() {
                        runtime.handle_tool_event(epoch, event);
                    }
                    runtime.handle_job(job);
                }
                Some((epoch, event)) = tool_rx.recv() => runtime.handle_tool_event(epoch, event),
            }
            runtime.advance();
            runtime.publish();
        }
        runtime.abort_inflight();
        info!("agent runtime stopped");
    });

    (cmd_tx, state_rx, event_rx)
}

/// 跑完一个目标（CLI 用）：逐条回调事件，直到 FINISHED 或 ERROR，返回最终快照
pub async fn run_goal(
    components: AgentComponents,
    goal: impl Into<String>,
    config: AgentConfiguration,
    mut on_event: impl FnMut(&AgentEvent),
) -> Result<RunSnapshot, AgentError> {
    let (cmd_tx, mut state_rx, mut event_rx) = spawn_agent(components);
    cmd_tx
        .send(Command::Start {
            goal: goal.into(),
            config,
        })
        .map_err(|_| AgentError::RunFailure("runtime closed".into()))?;

    let is_done = |s: &RunSnapshot| matches!(s.status, RunStatus::Finished | RunStatus::Error);
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Ok(event) => on_event(&event),
                Err(broadcast::error::RecvError::Lagged(n)) => warn!(skipped = n, "event stream lagged"),
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = state_rx.changed() => {
                if changed.is_err() || is_done(&*state_rx.borrow()) {
                    break;
                }
            }
        }
    }
    while let Ok(event) = event_rx.try_recv() {
        on_event(&event);
    }
    let snapshot = state_rx.borrow().clone();
    let _ = cmd_tx.send(Command::Quit);
    if is_done(&snapshot) {
        Ok(snapshot)
    } else {
        Err(AgentError::RunFailure("runtime stopped before the run ended".into()))
    }
}
