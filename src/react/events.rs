//! 运行过程事件：计划、任务、轮次、工具调用与两类副作用预览（浏览器动作 / 项目结构），以及 3D 场景
//!
//! 通过 broadcast 推给任意前端；序列化为带 `type` 标签的 JSON。

use serde::Serialize;

use crate::core::{LogEntry, RunStatus};
use crate::tools::{BrowserAction, ProjectStructure, SceneDescription};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// 运行状态变化
    Status { status: RunStatus },
    /// 计划生成
    PlanReady { steps: Vec<String> },
    /// 开始执行某个任务
    TaskStarted { task_id: String, description: String },
    /// 执行循环的一轮（从 1 开始）
    Round {
        task_id: String,
        round: usize,
        max_rounds: usize,
    },
    /// 模型发起的函数调用
    ToolCall {
        tool: String,
        args: serde_json::Value,
    },
    /// 工具返回（预览）
    Observation {
        tool: String,
        success: bool,
        preview: String,
    },
    /// 浏览器动作预览（导航 / 点击 / 输入 / 滚动）
    BrowserAction { action: BrowserAction },
    /// 软件架构师生成 / 更新的项目
    ProjectUpdated { project: ProjectStructure },
    /// 3D 场景（声明式）
    SceneGenerated { scene: SceneDescription },
    TaskCompleted {
        task_id: String,
        truncated: bool,
    },
    TaskFailed { task_id: String, error: String },
    /// 面向用户的日志条目
    Log { entry: LogEntry },
}

/// 事件发送：接收端已关闭时静默丢弃
pub fn send_event(
    tx: Option<&tokio::sync::mpsc::UnboundedSender<AgentEvent>>,
    event: AgentEvent,
) {
    if let Some(t) = tx {
        let _ = t.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_is_tagged() {
        let ev = AgentEvent::BrowserAction {
            action: BrowserAction::Navigate {
                value: "https://example.com".into(),
            },
        };
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "browser_action");
        assert_eq!(json["action"]["action"], "NAVIGATE");
        assert_eq!(json["action"]["value"], "https://example.com");
    }
}
