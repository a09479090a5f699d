//! SQLite 实现：agents 表保存完整配置 JSON，memories 表按时间倒序检索

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, Row};
use tracing::info;

use crate::memory::store::{
    default_agents, AgentStore, MemoryKind, MemoryRecord, Priority, SavedAgent, StoreError,
    HIGH_PRIORITY_LIMIT, SEARCH_LIMIT,
};

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件，建表，空表时写入默认预设
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS agents (
                id TEXT PRIMARY KEY,
                is_default INTEGER NOT NULL DEFAULT 0,
                config TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                type TEXT NOT NULL,
                priority TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_memories_ts ON memories(timestamp);
            "#,
        )?;

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM agents", [], |row| row.get(0))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        if count == 0 {
            for agent in default_agents() {
                store.save_agent(&agent)?;
            }
            info!("seeded default agent presets");
        }
        Ok(store)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }
}

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryRecord> {
    let kind: String = row.get(2)?;
    let priority: String = row.get(3)?;
    Ok(MemoryRecord {
        id: row.get(0)?,
        content: row.get(1)?,
        kind: MemoryKind::parse(&kind),
        priority: Priority::parse(&priority),
        timestamp: row.get(4)?,
    })
}

impl AgentStore for SqliteStore {
    fn list_agents(&self) -> Result<Vec<SavedAgent>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT id, is_default, config FROM agents ORDER BY rowid")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, bool>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut agents = Vec::new();
        for row in rows {
            let (id, is_default, config) = row?;
            agents.push(SavedAgent {
                id,
                is_default,
                config: serde_json::from_str(&config)?,
            });
        }
        Ok(agents)
    }

    fn save_agent(&self, agent: &SavedAgent) -> Result<(), StoreError> {
        let config = serde_json::to_string(&agent.config)?;
        self.lock()?.execute(
            "INSERT INTO agents (id, is_default, config) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET config = excluded.config",
            params![agent.id, agent.is_default, config],
        )?;
        Ok(())
    }

    fn delete_agent(&self, id: &str) -> Result<(), StoreError> {
        self.lock()?
            .execute("DELETE FROM agents WHERE id = ?1", params![id])?;
        Ok(())
    }

    fn add_memory(
        &self,
        content: &str,
        kind: MemoryKind,
        priority: Priority,
    ) -> Result<MemoryRecord, StoreError> {
        let record = MemoryRecord::new(content, kind, priority);
        self.lock()?.execute(
            "INSERT INTO memories (id, content, type, priority, timestamp) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                record.id,
                record.content,
                record.kind.as_str(),
                record.priority.as_str(),
                record.timestamp
            ],
        )?;
        Ok(record)
    }

    fn search_memories(&self, query: &str) -> Result<Vec<MemoryRecord>, StoreError> {
        // SQLite 的 LOWER 只折叠 ASCII，匹配放在 Rust 侧，与内存实现一致
        let needle = query.to_lowercase();
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, type, priority, timestamp FROM memories
             ORDER BY timestamp DESC, rowid DESC",
        )?;
        let mut hits = Vec::new();
        for row in stmt.query_map([], memory_from_row)? {
            let record = row?;
            if record.content.to_lowercase().contains(&needle) {
                hits.push(record);
                if hits.len() == SEARCH_LIMIT {
                    break;
                }
            }
        }
        Ok(hits)
    }

    fn high_priority(&self) -> Result<Vec<MemoryRecord>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, content, type, priority, timestamp FROM memories
             WHERE priority = 'high'
             ORDER BY timestamp DESC, rowid DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![HIGH_PRIORITY_LIMIT as i64], memory_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn forget_memory(&self, id: &str) -> Result<bool, StoreError> {
        let changed = self
            .lock()?
            .execute("DELETE FROM memories WHERE id = ?1", params![id])?;
        Ok(changed > 0)
    }

    fn clear_memories(&self) -> Result<(), StoreError> {
        self.lock()?.execute("DELETE FROM memories", [])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ToolType;

    #[test]
    fn test_seeds_defaults_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.db");
        {
            let store = SqliteStore::open(&path).unwrap();
            assert_eq!(store.list_agents().unwrap().len(), 3);
            store.delete_agent("default-coder").unwrap();
        }
        let reopened = SqliteStore::open(&path).unwrap();
        assert_eq!(reopened.list_agents().unwrap().len(), 2);
    }

    #[test]
    fn test_save_agent_roundtrips_full_config() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut agent = SavedAgent::new(
            crate::core::AgentConfiguration::new("Ops", "gemini-3-pro")
                .with_tools([ToolType::AuraSsh])
                .with_document("runbook.md", "reiniciar nginx"),
        );
        agent.id = "ops".into();
        store.save_agent(&agent).unwrap();
        let loaded = store.find_agent("ops").unwrap().unwrap();
        assert_eq!(loaded, agent);
    }

    #[test]
    fn test_memory_search_forget_clear() {
        let store = SqliteStore::open_in_memory().unwrap();
        let a = store
            .add_memory("Servidor prod en 10.0.0.5", MemoryKind::Fact, Priority::High)
            .unwrap();
        store
            .add_memory("El usuario usa 100% PostgreSQL", MemoryKind::Preference, Priority::Low)
            .unwrap();

        let hits = store.search_memories("servidor PROD").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, a.id);
        assert_eq!(hits[0].kind, MemoryKind::Fact);

        // % es literal
        assert_eq!(store.search_memories("100%").unwrap().len(), 1);
        assert_eq!(store.high_priority().unwrap().len(), 1);

        assert!(store.forget_memory(&a.id).unwrap());
        assert!(store.search_memories("servidor").unwrap().is_empty());

        store.clear_memories().unwrap();
        assert!(store.search_memories("").unwrap().is_empty());
    }

    #[test]
    fn test_memory_search_folds_non_ascii_case() {
        let store = SqliteStore::open_in_memory().unwrap();
        let record = store
            .add_memory(
                "Árbol genealógico de la familia ÑANDÚ",
                MemoryKind::Fact,
                Priority::Medium,
            )
            .unwrap();

        let hits = store.search_memories("árbol").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, record.id);
        assert_eq!(store.search_memories("ñandú").unwrap().len(), 1);
        assert_eq!(store.search_memories("GENEALÓGICO").unwrap().len(), 1);
    }
}
