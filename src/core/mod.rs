//! 核心层：错误、智能体配置、运行状态与编排器

pub mod error;
pub mod orchestrator;
pub mod profile;
pub mod state;

pub use error::AgentError;
pub use orchestrator::{ExecutionTicket, FailurePolicy, Orchestrator, PlanTicket, Step};
pub use profile::{
    AgentConfiguration, AgentDocument, AgentImage, SshConfiguration, SshMode, ToolType,
};
pub use state::{LogEntry, LogKind, RunSnapshot, RunStatus, Task, TaskStatus};
