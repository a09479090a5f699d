//! Agentnamix - 自主浏览智能体
//!
//! 模块划分：
//! - **agent**: 无头运行时（命令 / 快照 / 事件三通道）与组件构建
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误、智能体配置、运行状态、Orchestrator
//! - **llm**: 传输抽象与实现（Gemini / OpenAI 兼容 / Mock）+ 带重试的模型网关
//! - **memory**: 智能体预设与长期记忆（SQLite / 内存）
//! - **react**: Planner、执行循环、提示词、事件、辅助调用
//! - **tools**: 工具注册表、执行器与各工具处理器（浏览器、抓取、日历、云盘、架构师、记忆、SSH、3D）

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;
