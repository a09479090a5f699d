//! 智能体配置快照：名称、系统描述、启用的工具、模型别名、附件与 SSH 配置
//!
//! 在 `Orchestrator::begin_run` 时整体拷贝为 `Arc<AgentConfiguration>`，运行期间只读。

use std::fmt;

use serde::{Deserialize, Serialize};

/// 可启用的工具类型（web_search / image_analyzer 等没有处理器，只影响请求参数或提示词）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolType {
    WebSearch,
    CodeExecution,
    DeepAnalysis,
    BrowserInteraction,
    WebScrape,
    GoogleCalendar,
    GoogleDrive,
    SoftwareArchitect,
    MemorySystem,
    ImageAnalyzer,
    AuraSsh,
    #[serde(rename = "model_3d")]
    Model3d,
}

impl ToolType {
    pub const ALL: [ToolType; 12] = [
        ToolType::WebSearch,
        ToolType::CodeExecution,
        ToolType::DeepAnalysis,
        ToolType::BrowserInteraction,
        ToolType::WebScrape,
        ToolType::GoogleCalendar,
        ToolType::GoogleDrive,
        ToolType::SoftwareArchitect,
        ToolType::MemorySystem,
        ToolType::ImageAnalyzer,
        ToolType::AuraSsh,
        ToolType::Model3d,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::WebSearch => "web_search",
            ToolType::CodeExecution => "code_execution",
            ToolType::DeepAnalysis => "deep_analysis",
            ToolType::BrowserInteraction => "browser_interaction",
            ToolType::WebScrape => "web_scrape",
            ToolType::GoogleCalendar => "google_calendar",
            ToolType::GoogleDrive => "google_drive",
            ToolType::SoftwareArchitect => "software_architect",
            ToolType::MemorySystem => "memory_system",
            ToolType::ImageAnalyzer => "image_analyzer",
            ToolType::AuraSsh => "aura_ssh",
            ToolType::Model3d => "model_3d",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s.trim())
    }
}

impl fmt::Display for ToolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 上传的文本文档（作为知识库拼进提示词）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDocument {
    pub name: String,
    pub content: String,
}

/// 上传的图片（base64，不含 data: 前缀）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentImage {
    pub name: String,
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SshMode {
    #[default]
    Simulated,
    Real,
}

/// SSH 配置：simulated 使用虚拟文件系统；real 经 WebSocket 桥接到真实主机
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SshConfiguration {
    #[serde(default)]
    pub mode: SshMode,
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

impl SshConfiguration {
    pub fn is_real(&self) -> bool {
        self.mode == SshMode::Real
    }
}

/// 智能体配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentConfiguration {
    pub name: String,
    /// 系统提示词正文
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tools: Vec<ToolType>,
    pub model: String,
    #[serde(default)]
    pub documents: Vec<AgentDocument>,
    #[serde(default)]
    pub images: Vec<AgentImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_config: Option<SshConfiguration>,
}

impl AgentConfiguration {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            tools: Vec::new(),
            model: model.into(),
            documents: Vec::new(),
            images: Vec::new(),
            ssh_config: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_tools(mut self, tools: impl IntoIterator<Item = ToolType>) -> Self {
        for tool in tools {
            if !self.tools.contains(&tool) {
                self.tools.push(tool);
            }
        }
        self
    }

    pub fn with_document(mut self, name: impl Into<String>, content: impl Into<String>) -> Self {
        self.documents.push(AgentDocument {
            name: name.into(),
            content: content.into(),
        });
        self
    }

    pub fn with_ssh(mut self, ssh: SshConfiguration) -> Self {
        self.ssh_config = Some(ssh);
        self
    }

    pub fn has_tool(&self, tool: ToolType) -> bool {
        self.tools.contains(&tool)
    }

    /// 视觉能力：启用 image_analyzer 且确有图片
    pub fn has_vision(&self) -> bool {
        self.has_tool(ToolType::ImageAnalyzer) && !self.images.is_empty()
    }
}

impl Default for AgentConfiguration {
    fn default() -> Self {
        Self::new("AutoAgent", "gemini-2.5-flash")
    }
}
