//! Orchestrator：任务列表与运行状态的唯一持有者
//!
//! 纯同步状态机，不做 I/O：运行时（agent.rs）取出 PlanTicket / ExecutionTicket，
//! 在锁外调用 Planner / ExecutionLoop，再把结果交回 apply_plan / apply_outcome。
//! 每次 begin_run / reset 递增 epoch，旧 epoch 的结果直接丢弃；stop 不改 epoch。

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::{
    AgentConfiguration, AgentError, LogEntry, LogKind, RunSnapshot, RunStatus, Task, TaskStatus,
    ToolType,
};
use crate::react::{ExecutionRequest, TaskOutcome};
use crate::tools::ProjectStructure;

/// 任务失败后的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// 整次运行进入 ERROR
    #[default]
    Halt,
    /// 标记失败后继续下一个任务
    Continue,
}

#[derive(Debug, Clone)]
pub struct PlanTicket {
    pub epoch: u64,
    pub goal: String,
    pub config: Arc<AgentConfiguration>,
}

/// 一个待执行任务的不可变快照
#[derive(Debug, Clone)]
pub struct ExecutionTicket {
    pub epoch: u64,
    pub task_id: String,
    pub description: String,
    pub context: String,
    pub goal: String,
    pub config: Arc<AgentConfiguration>,
}

impl ExecutionTicket {
    pub fn request(&self) -> ExecutionRequest {
        ExecutionRequest {
            task_id: self.task_id.clone(),
            task_description: self.description.clone(),
            context: self.context.clone(),
            goal: self.goal.clone(),
            config: self.config.clone(),
        }
    }
}

/// next_step 的结果
#[derive(Debug, Clone)]
pub enum Step {
    Execute(ExecutionTicket),
    /// 刚刚全部完成（每次运行只出现一次）
    Finished,
    /// 不在 EXECUTING 状态
    Idle,
    /// 已有任务在执行
    Busy,
}

#[derive(Debug, Default)]
pub struct Orchestrator {
    status: RunStatus,
    goal: String,
    tasks: Vec<Task>,
    logs: Vec<LogEntry>,
    logs_sent: usize,
    config: Option<Arc<AgentConfiguration>>,
    project: Option<ProjectStructure>,
    epoch: u64,
    seq: u64,
    policy: FailurePolicy,
}

impl Orchestrator {
    pub fn new(policy: FailurePolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    fn log(&mut self, message: impl Into<String>, kind: LogKind) {
        self.logs.push(LogEntry::new(message, kind));
    }

    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn config(&self) -> Option<&Arc<AgentConfiguration>> {
        self.config.as_ref()
    }

    pub fn project(&self) -> Option<&ProjectStructure> {
        self.project.as_ref()
    }

    /// 开始新运行：清空任务与日志，IDLE/任意 -> PLANNING
    pub fn begin_run(&mut self, goal: impl Into<String>, config: AgentConfiguration) -> PlanTicket {
        self.epoch += 1;
        self.goal = goal.into();
        self.tasks.clear();
        self.logs.clear();
        self.logs_sent = 0;
        self.project = None;
        let config = Arc::new(config);
        self.config = Some(config.clone());
        self.status = RunStatus::Planning;
        self.log(format!("Sistema Inicializado: \"{}\"", config.name), LogKind::System);
        self.log("Construyendo Plan Táctico...", LogKind::Ai);
        info!(epoch = self.epoch, agent = %config.name, "run started");
        PlanTicket {
            epoch: self.epoch,
            goal: self.goal.clone(),
            config,
        }
    }

    /// 写入规划结果；旧 epoch 返回 false
    pub fn apply_plan(&mut self, epoch: u64, plan: Result<Vec<String>, AgentError>) -> bool {
        if epoch != self.epoch {
            warn!(epoch, current = self.epoch, "discarding stale plan");
            return false;
        }
        match plan {
            Ok(steps) => {
                let planned = steps.len();
                // 规划期间追加的请求排在计划之后
                let queued = std::mem::take(&mut self.tasks);
                self.tasks = steps
                    .into_iter()
                    .enumerate()
                    .map(|(i, step)| Task::new(format!("task-{}", i), step))
                    .chain(queued)
                    .collect();
                self.log(
                    format!("Plan Autorizado: {} fases.", planned),
                    LogKind::Success,
                );
                if self.status == RunStatus::Planning {
                    self.status = RunStatus::Executing;
                }
            }
            Err(e) => {
                self.log(format!("Fallo Crítico: {}", e), LogKind::Error);
                self.status = RunStatus::Error;
            }
        }
        true
    }

    /// 已完成任务的结果 + 当前项目文件列表
    fn build_context(&self, config: &AgentConfiguration) -> String {
        let mut context = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .filter_map(|t| {
                t.result
                    .as_ref()
                    .filter(|r| !r.is_empty())
                    .map(|r| format!("Tarea: {}\nResultado: {}", t.description, r))
            })
            .collect::<Vec<_>>()
            .join("\n\n");
        if let Some(project) = self
            .project
            .as_ref()
            .filter(|_| config.has_tool(ToolType::SoftwareArchitect))
        {
            context.push_str(&format!("\n\n[PROYECTO ACTUAL]: {}", project.paths().join(", ")));
        }
        context
    }

    /// 推进：取第一个 pending 任务并标记为 processing
    pub fn next_step(&mut self) -> Step {
        if self.status != RunStatus::Executing {
            return Step::Idle;
        }
        if self.tasks.iter().any(|t| t.status == TaskStatus::Processing) {
            return Step::Busy;
        }
        let Some(config) = self.config.clone() else {
            return Step::Idle;
        };
        let Some(idx) = self.tasks.iter().position(Task::is_pending) else {
            self.status = RunStatus::Finished;
            self.log("Misión Cumplida.", LogKind::Success);
            info!(epoch = self.epoch, "run finished");
            return Step::Finished;
        };
        let context = self.build_context(&config);
        let task = &mut self.tasks[idx];
        task.status = TaskStatus::Processing;
        let ticket = ExecutionTicket {
            epoch: self.epoch,
            task_id: task.id.clone(),
            description: task.description.clone(),
            context,
            goal: self.goal.clone(),
            config,
        };
        self.log(format!("Ejecutando: {}", ticket.description), LogKind::Info);
        Step::Execute(ticket)
    }

    /// 写入任务结果；旧 epoch 或任务不在 processing 时返回 false
    pub fn apply_outcome(
        &mut self,
        epoch: u64,
        task_id: &str,
        outcome: Result<TaskOutcome, AgentError>,
    ) -> bool {
        if epoch != self.epoch {
            warn!(epoch, current = self.epoch, task = task_id, "discarding stale result");
            return false;
        }
        let Some(task) = self
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id && t.status == TaskStatus::Processing)
        else {
            return false;
        };
        match outcome {
            Ok(outcome) => {
                task.status = TaskStatus::Completed;
                task.result = Some(outcome.render());
                task.truncated = outcome.truncated;
                self.log("Fase Completa.", LogKind::Success);
            }
            Err(e) => {
                let message = e.to_string();
                task.status = TaskStatus::Failed;
                task.result = Some(message.clone());
                self.log(format!("Fallo: {}", message), LogKind::Error);
                if self.policy == FailurePolicy::Halt && self.status == RunStatus::Executing {
                    self.status = RunStatus::Error;
                }
            }
        }
        true
    }

    /// 停止推进；执行中的一轮仍会写回
    pub fn stop(&mut self) {
        self.status = RunStatus::Idle;
        self.log("Secuencia Abortada.", LogKind::System);
    }

    pub fn reset(&mut self) {
        self.epoch += 1;
        self.status = RunStatus::Idle;
        self.goal.clear();
        self.tasks.clear();
        self.logs.clear();
        self.logs_sent = 0;
        self.project = None;
    }

    fn require_run(&self) -> Result<(), AgentError> {
        if self.config.is_none() {
            return Err(AgentError::RunFailure(
                "no hay un agente activo; inicia una ejecución primero".into(),
            ));
        }
        Ok(())
    }

    /// 追加后续任务；IDLE / FINISHED / ERROR -> EXECUTING
    pub fn follow_up(&mut self, description: impl Into<String>) -> Result<String, AgentError> {
        self.require_run()?;
        let description = description.into();
        let id = format!("followup-{}", self.next_seq());
        self.tasks.push(Task::new(id.clone(), description.clone()));
        if matches!(
            self.status,
            RunStatus::Idle | RunStatus::Finished | RunStatus::Error
        ) {
            self.status = RunStatus::Executing;
        }
        self.log(
            format!("Nueva Directiva de Seguimiento: \"{}\"", description),
            LogKind::System,
        );
        Ok(id)
    }

    /// 代码编辑器的请求：插到 processing 任务之后（没有则放在最前）；仅 IDLE 时推进到 EXECUTING
    pub fn editor_request(
        &mut self,
        instruction: &str,
        file: Option<&str>,
    ) -> Result<String, AgentError> {
        self.require_run()?;
        let id = format!("edit-{}", self.next_seq());
        let description = match file {
            Some(f) if !f.is_empty() => format!("SOLICITUD EDITOR: {} en {}.", instruction, f),
            _ => format!("SOLICITUD EDITOR: {}.", instruction),
        };
        let at = self
            .tasks
            .iter()
            .position(|t| t.status == TaskStatus::Processing)
            .map(|i| i + 1)
            .unwrap_or(0);
        self.tasks.insert(at, Task::new(id.clone(), description));
        if self.status == RunStatus::Idle {
            self.status = RunStatus::Executing;
        }
        self.log(format!("Solicitud Editor: \"{}\"", instruction), LogKind::Ai);
        Ok(id)
    }

    /// 架构师工具生成的项目；之后的任务上下文会带上文件列表
    pub fn set_project(&mut self, project: ProjectStructure) {
        self.project = Some(project);
        self.log("Proyecto Actualizado.", LogKind::Success);
    }

    /// 给当前智能体追加文档；只影响之后开始的任务
    pub fn add_document(&mut self, name: &str, content: &str) -> Result<(), AgentError> {
        let Some(current) = self.config.as_ref() else {
            return Err(AgentError::RunFailure("no hay un agente activo".into()));
        };
        let updated = (**current).clone().with_document(name, content);
        self.config = Some(Arc::new(updated));
        self.log(format!("Archivo \"{}\" agregado.", name), LogKind::Success);
        Ok(())
    }

    /// 自上次调用以来新增的日志
    pub fn take_new_logs(&mut self) -> Vec<LogEntry> {
        let fresh = self.logs[self.logs_sent.min(self.logs.len())..].to_vec();
        self.logs_sent = self.logs.len();
        fresh
    }

    pub fn snapshot(&self) -> RunSnapshot {
        RunSnapshot {
            status: self.status,
            goal: self.goal.clone(),
            tasks: self.tasks.clone(),
            logs: self.logs.clone(),
        }
    }
}
