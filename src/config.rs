//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `AGENTNAMIX__*` 覆盖（双下划线表示嵌套，如 `AGENTNAMIX__LLM__PROVIDER=openai`）。
//! API Key 不放在配置文件里，只从环境变量读取。

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::FailurePolicy;
use crate::llm::{RetryConfig, SamplingConfig, DEFAULT_MODEL};
use crate::tools::web::DEFAULT_PROXY_URL;
use crate::tools::ToolSettings;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub tools: ToolsSection,
}

/// [app] 段：应用名、数据目录、执行循环轮数、任务失败策略
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
    /// SQLite 数据库所在目录
    pub data_dir: PathBuf,
    pub max_rounds: usize,
    pub on_task_failure: FailurePolicy,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "agentnamix".to_string(),
            data_dir: PathBuf::from("data"),
            max_rounds: crate::react::MAX_ROUNDS,
            on_task_failure: FailurePolicy::Halt,
        }
    }
}

impl AppSection {
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("agentnamix.db")
    }
}

/// [llm] 段：后端选择、默认模型、温度、重试与别名
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// gemini / openai / mock
    pub provider: String,
    pub base_url: Option<String>,
    pub default_model: String,
    pub plan_temperature: f32,
    pub converse_temperature: f32,
    pub request_timeout_secs: u64,
    pub retry: RetrySection,
    /// 额外的别名 -> 模型 ID
    pub aliases: HashMap<String, String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            base_url: None,
            default_model: DEFAULT_MODEL.to_string(),
            plan_temperature: 0.2,
            converse_temperature: 0.5,
            request_timeout_secs: 120,
            retry: RetrySection::default(),
            aliases: HashMap::new(),
        }
    }
}

impl LlmSection {
    pub fn sampling(&self) -> SamplingConfig {
        SamplingConfig {
            plan_temperature: self.plan_temperature,
            converse_temperature: self.converse_temperature,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// [llm.retry] 段：限流重试（总尝试次数与首次等待）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay_ms: 4000,
        }
    }
}

impl RetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.max_attempts,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
        }
    }
}

/// [tools] 段：抓取代理、超时、截断长度
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    pub proxy_url: String,
    pub fetch_timeout_secs: u64,
    /// 正文少于此字符数视为不可用
    pub min_content_chars: usize,
    pub page_snippet_chars: usize,
    pub scrape_chars: usize,
    /// 单次工具调用超时（秒）
    pub tool_timeout_secs: u64,
    pub ssh: SshSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            proxy_url: DEFAULT_PROXY_URL.to_string(),
            fetch_timeout_secs: 15,
            min_content_chars: 50,
            page_snippet_chars: 10_000,
            scrape_chars: 15_000,
            tool_timeout_secs: 60,
            ssh: SshSection::default(),
        }
    }
}

impl ToolsSection {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn settings(&self) -> ToolSettings {
        ToolSettings {
            page_snippet_chars: self.page_snippet_chars,
            scrape_chars: self.scrape_chars,
            tool_timeout: Duration::from_secs(self.tool_timeout_secs),
            ssh_poll_attempts: self.ssh.poll_attempts,
            ssh_poll_interval: Duration::from_millis(self.ssh.poll_interval_ms),
        }
    }
}

/// [tools.ssh] 段：桥接输出轮询
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SshSection {
    pub poll_attempts: usize,
    pub poll_interval_ms: u64,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            poll_attempts: 20,
            poll_interval_ms: 500,
        }
    }
}

/// Gemini Key：GEMINI_API_KEY 优先，其次 API_KEY
pub fn gemini_api_key() -> Option<String> {
    std::env::var("GEMINI_API_KEY")
        .or_else(|_| std::env::var("API_KEY"))
        .ok()
        .filter(|k| !k.trim().is_empty())
}

pub fn openai_api_key() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
}

/// 从 config 目录加载配置，环境变量 AGENTNAMIX__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 AGENTNAMIX__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("AGENTNAMIX")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
