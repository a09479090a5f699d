//! 工具层：注册表、执行器与各工具处理器
//!
//! ToolKit 按智能体启用的 ToolType 组装：原生 web 搜索开关 + 函数声明 + 名称到处理器的分发表。

pub mod architect;
pub mod browser;
pub mod calendar;
pub mod drive;
pub mod executor;
pub mod markup;
pub mod memory;
pub mod modeler;
pub mod registry;
pub mod scrape;
pub mod ssh;
pub mod web;

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

pub use architect::{ArchitectTool, FileBlueprint, ProjectStructure};
pub use browser::{BrowserAction, BrowserTool};
pub use calendar::CalendarTool;
pub use drive::DriveTool;
pub use executor::ToolExecutor;
pub use memory::MemoryTool;
pub use modeler::{ModelerTool, Primitive, SceneDescription, SceneObject};
pub use registry::{BrowserState, Tool, ToolContext, ToolOutput, ToolRegistry, INITIAL_URL};
pub use scrape::ScrapeTool;
#[cfg(feature = "ssh-bridge")]
pub use ssh::BridgeShell;
pub use ssh::{DisconnectedShell, ShellBackend, SimulatedShell, SshTool};
pub use web::{FetchError, PageFetcher, ProxyFetcher};

use crate::core::{AgentConfiguration, ToolType};
use crate::llm::ToolSet;
use crate::memory::AgentStore;

/// 工具层的可调参数（来自 `[tools]` 配置段）
#[derive(Debug, Clone)]
pub struct ToolSettings {
    pub page_snippet_chars: usize,
    pub scrape_chars: usize,
    pub tool_timeout: Duration,
    pub ssh_poll_attempts: usize,
    pub ssh_poll_interval: Duration,
}

impl Default for ToolSettings {
    fn default() -> Self {
        Self {
            page_snippet_chars: 10_000,
            scrape_chars: 15_000,
            tool_timeout: Duration::from_secs(60),
            ssh_poll_attempts: 20,
            ssh_poll_interval: Duration::from_millis(500),
        }
    }
}

/// 处理器共享的外部依赖
#[derive(Clone)]
pub struct ToolDeps {
    pub fetcher: Arc<dyn PageFetcher>,
    pub store: Arc<dyn AgentStore>,
    pub settings: ToolSettings,
}

/// 一次运行使用的工具集合
pub struct ToolKit {
    web_search: bool,
    executor: ToolExecutor,
}

impl ToolKit {
    /// 独立终端会话的工具集（单次调用、测试用）
    pub fn for_agent(config: &AgentConfiguration, deps: &ToolDeps) -> Self {
        Self::for_run(config, deps, &ShellSession::for_agent(config, &deps.settings))
    }

    /// 运行内的工具集：终端会话由调用方持有，跨任务复用
    pub fn for_run(config: &AgentConfiguration, deps: &ToolDeps, shell: &ShellSession) -> Self {
        let settings = &deps.settings;
        let mut registry = ToolRegistry::new();
        for tool in &config.tools {
            match tool {
                ToolType::BrowserInteraction => registry.register(BrowserTool::new(
                    deps.fetcher.clone(),
                    settings.page_snippet_chars,
                )),
                ToolType::WebScrape => {
                    registry.register(ScrapeTool::new(deps.fetcher.clone(), settings.scrape_chars))
                }
                ToolType::GoogleCalendar => registry.register(CalendarTool),
                ToolType::GoogleDrive => registry.register(DriveTool),
                ToolType::SoftwareArchitect => registry.register(ArchitectTool),
                ToolType::MemorySystem => registry.register(MemoryTool::new(deps.store.clone())),
                ToolType::AuraSsh => registry.register(shell.tool()),
                ToolType::Model3d => registry.register(ModelerTool),
                // 无处理器：只影响请求参数或提示词
                ToolType::WebSearch
                | ToolType::CodeExecution
                | ToolType::DeepAnalysis
                | ToolType::ImageAnalyzer => {}
            }
        }
        debug!(agent = %config.name, tools = ?registry.tool_names(), "toolkit assembled");
        Self {
            web_search: config.has_tool(ToolType::WebSearch),
            executor: ToolExecutor::new(registry, settings.tool_timeout),
        }
    }

    pub fn web_search(&self) -> bool {
        self.web_search
    }

    pub fn tool_set(&self) -> ToolSet {
        ToolSet {
            web_search: self.web_search,
            declarations: self.executor.registry().declarations(),
        }
    }

    pub fn system_hints(&self, config: &AgentConfiguration) -> Vec<String> {
        self.executor.registry().system_hints(config)
    }

    pub fn executor(&self) -> &ToolExecutor {
        &self.executor
    }
}

/// 一次运行内共享的终端会话：虚拟文件系统、当前目录与桥接连接在任务之间保留
#[derive(Clone)]
pub struct ShellSession {
    backend: Arc<dyn ShellBackend>,
    host: String,
    real: bool,
}

impl ShellSession {
    pub fn for_agent(config: &AgentConfiguration, settings: &ToolSettings) -> Self {
        let Some(ssh) = config.ssh_config.as_ref() else {
            return Self::simulated("remoto");
        };
        let host = if ssh.host.trim().is_empty() {
            "remoto".to_string()
        } else {
            ssh.host.clone()
        };
        if !ssh.is_real() {
            return Self::simulated(host);
        }
        let backend: Arc<dyn ShellBackend> =
            match ssh.proxy_url.as_deref().filter(|u| !u.is_empty()) {
                #[cfg(feature = "ssh-bridge")]
                Some(proxy) => Arc::new(BridgeShell::new(
                    proxy,
                    ssh.clone(),
                    settings.ssh_poll_attempts,
                    settings.ssh_poll_interval,
                )),
                #[cfg(not(feature = "ssh-bridge"))]
                Some(_) => {
                    let _ = settings;
                    warn!("ssh bridge requested but the `ssh-bridge` feature is disabled");
                    Arc::new(DisconnectedShell)
                }
                None => {
                    warn!(host = %host, "real ssh mode without proxy url");
                    Arc::new(DisconnectedShell)
                }
            };
        Self {
            backend,
            host,
            real: true,
        }
    }

    fn simulated(host: impl Into<String>) -> Self {
        Self {
            backend: Arc::new(SimulatedShell::new()),
            host: host.into(),
            real: false,
        }
    }

    fn tool(&self) -> SshTool {
        SshTool::new(self.backend.clone(), self.host.clone(), self.real)
    }
}
