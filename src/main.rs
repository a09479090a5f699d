//! Agentnamix 命令行入口
//!
//! 初始化日志、加载配置、构建 Agent 组件，然后分派子命令。

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use agentnamix::agent::{create_agent_components, run_goal};
use agentnamix::config::load_config;
use agentnamix::core::{AgentConfiguration, TaskStatus, ToolType};
use agentnamix::memory::AgentStore;
use agentnamix::react::{enhance_description, help_answer, AgentEvent};

/// Agentnamix - 目标 -> 计划 -> 逐任务执行的自主智能体
#[derive(Parser, Debug)]
#[command(name = "agentnamix")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 额外的配置文件（覆盖 config/default.toml）
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 规划并执行一个目标
    Run {
        #[arg(long)]
        goal: String,

        /// 使用已保存的智能体预设
        #[arg(long, value_name = "ID")]
        agent: Option<String>,

        /// 启用的工具（可重复），如 web_scrape、memory_system
        #[arg(long = "tool", value_name = "TOOL")]
        tools: Vec<String>,

        /// 模型别名
        #[arg(long)]
        model: Option<String>,

        /// 作为知识库文档附加的文件（可重复）
        #[arg(long = "doc", value_name = "PATH")]
        docs: Vec<PathBuf>,
    },

    /// 管理智能体预设
    Agents {
        #[command(subcommand)]
        action: AgentsAction,
    },

    /// 改写一段智能体描述
    Enhance {
        #[arg(value_name = "TEXT")]
        text: String,
    },

    /// 向帮助助手提问
    Ask {
        #[arg(value_name = "QUESTION")]
        question: String,
    },

    /// 长期记忆
    Memories {
        #[command(subcommand)]
        action: MemoriesAction,
    },
}

#[derive(Subcommand, Debug)]
enum AgentsAction {
    List,
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },
}

#[derive(Subcommand, Debug)]
enum MemoriesAction {
    Search {
        #[arg(value_name = "QUERY")]
        query: String,
    },
    Forget {
        #[arg(value_name = "ID")]
        id: String,
    },
}

fn build_agent(
    store: &dyn AgentStore,
    agent: Option<String>,
    tools: Vec<String>,
    model: Option<String>,
    docs: Vec<PathBuf>,
) -> anyhow::Result<AgentConfiguration> {
    let mut config = match agent {
        Some(id) => {
            let Some(saved) = store.find_agent(&id)? else {
                bail!("agent preset not found: {}", id);
            };
            saved.config
        }
        None => AgentConfiguration::default(),
    };
    if !tools.is_empty() {
        let parsed = tools
            .iter()
            .map(|t| ToolType::parse(t).with_context(|| format!("unknown tool: {}", t)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        config = config.with_tools(parsed);
    }
    if let Some(model) = model {
        config.model = model;
    }
    for path in docs {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read document {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        config = config.with_document(name, content);
    }
    Ok(config)
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::PlanReady { steps } => {
            println!("Plan:");
            for (i, step) in steps.iter().enumerate() {
                println!("  {}. {}", i + 1, step);
            }
        }
        AgentEvent::TaskStarted { description, .. } => println!("\n▶ {}", description),
        AgentEvent::ToolCall { tool, .. } => println!("  ⚙ {}", tool),
        AgentEvent::TaskFailed { error, .. } => println!("  ✗ {}", error),
        _ => {}
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    agentnamix::observability::init();

    let cli = Cli::parse();
    let cfg = load_config(cli.config.clone()).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    let components = create_agent_components(&cfg);

    match cli.command {
        Commands::Run {
            goal,
            agent,
            tools,
            model,
            docs,
        } => {
            let config = build_agent(components.store().as_ref(), agent, tools, model, docs)?;
            let snapshot = run_goal(components, goal, config, print_event)
                .await
                .context("Run failed")?;
            for task in &snapshot.tasks {
                let mark = match task.status {
                    TaskStatus::Completed => "✓",
                    TaskStatus::Failed => "✗",
                    _ => "·",
                };
                println!("\n{} {}", mark, task.description);
                if let Some(result) = &task.result {
                    println!("{}", result);
                }
            }
            println!("\nEstado: {}", snapshot.status.label());
        }
        Commands::Agents { action } => match action {
            AgentsAction::List => {
                for agent in components.store().list_agents()? {
                    let tools: Vec<&str> = agent.config.tools.iter().map(ToolType::as_str).collect();
                    println!(
                        "{}{}  {}  [{}]",
                        agent.id,
                        if agent.is_default { " (default)" } else { "" },
                        agent.config.name,
                        tools.join(", ")
                    );
                }
            }
            AgentsAction::Delete { id } => {
                components.store().delete_agent(&id)?;
                println!("Deleted {}", id);
            }
        },
        Commands::Enhance { text } => {
            println!("{}", enhance_description(&components.gateway, &text).await);
        }
        Commands::Ask { question } => {
            println!("{}", help_answer(&components.gateway, &question).await);
        }
        Commands::Memories { action } => match action {
            MemoriesAction::Search { query } => {
                for record in components.store().search_memories(&query)? {
                    println!(
                        "{}  [{}|{}]  {}",
                        record.id,
                        record.kind.as_str(),
                        record.priority.as_str(),
                        record.content
                    );
                }
            }
            MemoriesAction::Forget { id } => {
                if components.store().forget_memory(&id)? {
                    println!("Forgotten {}", id);
                } else {
                    bail!("memory not found: {}", id);
                }
            }
        },
    }

    Ok(())
}
