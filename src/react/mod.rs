//! 认知层：Planner、执行循环、提示词、事件与辅助调用

pub mod assist;
pub mod events;
pub mod loop_;
pub mod planner;
pub mod prompt;

pub use assist::{enhance_description, help_answer};
pub use events::{send_event, AgentEvent};
pub use loop_::{ExecutionLoop, ExecutionRequest, TaskOutcome, Widget, MAX_ROUNDS};
pub use planner::{parse_plan, Planner};
