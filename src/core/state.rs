//! 状态定义：Task、RunStatus、日志条目与供前端渲染的 RunSnapshot 投影
//!
//! 前端只持有轻量的 RunSnapshot（状态、任务列表、日志）；完整状态由 Orchestrator 维护并投影出来。

use serde::{Deserialize, Serialize};

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

/// 一个计划步骤及其执行状态、结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    pub status: TaskStatus,
    /// completed 时为渲染后的回答；failed 时为错误信息
    pub result: Option<String>,
    /// 工具轮次用尽、答案可能不完整
    #[serde(default)]
    pub truncated: bool,
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            status: TaskStatus::Pending,
            result: None,
            truncated: false,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == TaskStatus::Pending
    }
}

/// 整次运行的粗粒度状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    #[default]
    Idle,
    Planning,
    Executing,
    Finished,
    Error,
}

impl RunStatus {
    /// 面向用户的标签
    pub fn label(&self) -> &'static str {
        match self {
            RunStatus::Idle => "INACTIVO",
            RunStatus::Planning => "PLANIFICANDO",
            RunStatus::Executing => "EJECUTANDO",
            RunStatus::Finished => "FINALIZADO",
            RunStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogKind {
    Info,
    Success,
    Error,
    Ai,
    System,
}

/// 用户可见的日志条目（tracing 之外单独保留，供前端的日志面板）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub id: String,
    /// 毫秒时间戳
    pub timestamp: i64,
    pub message: String,
    pub kind: LogKind,
}

impl LogEntry {
    pub fn new(message: impl Into<String>, kind: LogKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string()[..8].to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            message: message.into(),
            kind,
        }
    }
}

/// Orchestrator 的只读投影
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSnapshot {
    pub status: RunStatus,
    pub goal: String,
    pub tasks: Vec<Task>,
    pub logs: Vec<LogEntry>,
}

impl RunSnapshot {
    pub fn processing_count(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Processing)
            .count()
    }
}
