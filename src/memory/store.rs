//! 本地持久化：智能体预设 + 长期记忆
//!
//! AgentStore trait 同步调用（SQLite 单次查询在毫秒级）；InMemoryStore 用于测试与无数据目录的运行。

use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::{AgentConfiguration, ToolType};

/// 关键词检索最多返回条数
pub const SEARCH_LIMIT: usize = 5;
/// 高优先级记忆最多返回条数
pub const HIGH_PRIORITY_LIMIT: usize = 10;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Store lock poisoned")]
    Poisoned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryKind {
    Fact,
    Preference,
    Summary,
    #[default]
    Note,
}

impl MemoryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryKind::Fact => "fact",
            MemoryKind::Preference => "preference",
            MemoryKind::Summary => "summary",
            MemoryKind::Note => "note",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "fact" => MemoryKind::Fact,
            "preference" => MemoryKind::Preference,
            "summary" => MemoryKind::Summary,
            _ => MemoryKind::Note,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }

    /// 未知值按 medium 处理
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "low" => Priority::Low,
            "high" => Priority::High,
            _ => Priority::Medium,
        }
    }
}

/// 一条长期记忆
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub id: String,
    pub content: String,
    #[serde(rename = "type")]
    pub kind: MemoryKind,
    pub priority: Priority,
    /// 毫秒时间戳
    pub timestamp: i64,
}

impl MemoryRecord {
    pub fn new(content: impl Into<String>, kind: MemoryKind, priority: Priority) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let suffix = uuid::Uuid::new_v4().simple().to_string();
        Self {
            id: format!("mem-{}-{}", now, &suffix[..9]),
            content: content.into(),
            kind,
            priority,
            timestamp: now,
        }
    }
}

/// 保存的智能体预设
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedAgent {
    pub id: String,
    #[serde(default)]
    pub is_default: bool,
    #[serde(flatten)]
    pub config: AgentConfiguration,
}

impl SavedAgent {
    pub fn new(config: AgentConfiguration) -> Self {
        Self {
            id: format!("agent-{}", chrono::Utc::now().timestamp_millis()),
            is_default: false,
            config,
        }
    }
}

/// 空表时写入的三个默认预设
pub fn default_agents() -> Vec<SavedAgent> {
    let preset = |id: &str, name: &str, description: &str, tools: [ToolType; 2], model: &str| {
        SavedAgent {
            id: id.to_string(),
            is_default: true,
            config: AgentConfiguration::new(name, model)
                .with_description(description)
                .with_tools(tools),
        }
    };
    vec![
        preset(
            "default-researcher",
            "Investigador",
            "Experto en búsqueda web y síntesis de información. Prioriza fuentes fiables y datos recientes.",
            [ToolType::WebSearch, ToolType::DeepAnalysis],
            "gemini-2.5-flash",
        ),
        preset(
            "default-coder",
            "Ingeniero de Software",
            "Especialista en generar código limpio, seguro y bien documentado.",
            [ToolType::CodeExecution, ToolType::SoftwareArchitect],
            "gemini-2.5-flash",
        ),
        preset(
            "default-analyst",
            "Analista de Datos",
            "Capaz de procesar información compleja y encontrar patrones.",
            [ToolType::DeepAnalysis, ToolType::MemorySystem],
            "gemini-3-pro",
        ),
    ]
}

/// 持久化接口：智能体预设 + 记忆
pub trait AgentStore: Send + Sync {
    fn list_agents(&self) -> Result<Vec<SavedAgent>, StoreError>;

    /// 按 id 插入或更新
    fn save_agent(&self, agent: &SavedAgent) -> Result<(), StoreError>;

    fn delete_agent(&self, id: &str) -> Result<(), StoreError>;

    fn add_memory(
        &self,
        content: &str,
        kind: MemoryKind,
        priority: Priority,
    ) -> Result<MemoryRecord, StoreError>;

    /// 大小写不敏感的子串匹配，最新在前，最多 SEARCH_LIMIT 条
    fn search_memories(&self, query: &str) -> Result<Vec<MemoryRecord>, StoreError>;

    /// priority = high，最新在前，最多 HIGH_PRIORITY_LIMIT 条
    fn high_priority(&self) -> Result<Vec<MemoryRecord>, StoreError>;

    /// 返回是否确有删除
    fn forget_memory(&self, id: &str) -> Result<bool, StoreError>;

    fn clear_memories(&self) -> Result<(), StoreError>;

    fn find_agent(&self, id: &str) -> Result<Option<SavedAgent>, StoreError> {
        Ok(self.list_agents()?.into_iter().find(|a| a.id == id))
    }
}

/// 内存实现（RwLock<Vec>）
pub struct InMemoryStore {
    agents: RwLock<Vec<SavedAgent>>,
    memories: RwLock<Vec<MemoryRecord>>,
}

impl InMemoryStore {
    /// 空存储（不写默认预设）
    pub fn empty() -> Self {
        Self {
            agents: RwLock::new(Vec::new()),
            memories: RwLock::new(Vec::new()),
        }
    }

    /// 带默认预设
    pub fn new() -> Self {
        Self {
            agents: RwLock::new(default_agents()),
            memories: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// 最新在前；同一毫秒内按插入顺序倒序
fn newest_first(records: Vec<&MemoryRecord>) -> Vec<MemoryRecord> {
    let mut out: Vec<MemoryRecord> = records.into_iter().rev().cloned().collect();
    out.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    out
}

impl AgentStore for InMemoryStore {
    fn list_agents(&self) -> Result<Vec<SavedAgent>, StoreError> {
        Ok(self.agents.read().map_err(|_| StoreError::Poisoned)?.clone())
    }

    fn save_agent(&self, agent: &SavedAgent) -> Result<(), StoreError> {
        let mut agents = self.agents.write().map_err(|_| StoreError::Poisoned)?;
        match agents.iter_mut().find(|a| a.id == agent.id) {
            Some(existing) => *existing = agent.clone(),
            None => agents.push(agent.clone()),
        }
        Ok(())
    }

    fn delete_agent(&self, id: &str) -> Result<(), StoreError> {
        self.agents
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .retain(|a| a.id != id);
        Ok(())
    }

    fn add_memory(
        &self,
        content: &str,
        kind: MemoryKind,
        priority: Priority,
    ) -> Result<MemoryRecord, StoreError> {
        let record = MemoryRecord::new(content, kind, priority);
        self.memories
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .push(record.clone());
        Ok(record)
    }

    fn search_memories(&self, query: &str) -> Result<Vec<MemoryRecord>, StoreError> {
        let needle = query.to_lowercase();
        let memories = self.memories.read().map_err(|_| StoreError::Poisoned)?;
        let mut hits = newest_first(
            memories
                .iter()
                .filter(|m| m.content.to_lowercase().contains(&needle))
                .collect(),
        );
        hits.truncate(SEARCH_LIMIT);
        Ok(hits)
    }

    fn high_priority(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        let memories = self.memories.read().map_err(|_| StoreError::Poisoned)?;
        let mut hits = newest_first(
            memories
                .iter()
                .filter(|m| m.priority == Priority::High)
                .collect(),
        );
        hits.truncate(HIGH_PRIORITY_LIMIT);
        Ok(hits)
    }

    fn forget_memory(&self, id: &str) -> Result<bool, StoreError> {
        let mut memories = self.memories.write().map_err(|_| StoreError::Poisoned)?;
        let before = memories.len();
        memories.retain(|m| m.id != id);
        Ok(memories.len() != before)
    }

    fn clear_memories(&self) -> Result<(), StoreError> {
        self.memories
            .write()
            .map_err(|_| StoreError::Poisoned)?
            .clear();
        Ok(())
    }
}
