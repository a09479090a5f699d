//! 长期记忆工具（memory_system）：STORE / RETRIEVE / FORGET
//!
//! 系统指令提示中附带高优先级记忆，模型无需先检索即可看到关键事实。

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use crate::core::{AgentConfiguration, AgentError};
use crate::memory::{AgentStore, MemoryKind, MemoryRecord, Priority};
use crate::tools::markup::{card, escape_html};
use crate::tools::{Tool, ToolContext, ToolOutput};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
enum MemoryOp {
    Store,
    Retrieve,
    Forget,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MemoryArgs {
    action: MemoryOp,
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    priority: Option<String>,
    #[serde(default)]
    memory_id: Option<String>,
}

pub struct MemoryTool {
    store: Arc<dyn AgentStore>,
}

impl MemoryTool {
    pub fn new(store: Arc<dyn AgentStore>) -> Self {
        Self { store }
    }
}

fn stored_widget(record: &MemoryRecord) -> String {
    let ts = chrono::DateTime::from_timestamp_millis(record.timestamp)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_default();
    card(
        "memory",
        "🧠 Memoria Guardada",
        &format!(
            "<p><span class=\"priority-{}\">{}</span> <small>{}</small></p>\n  <p><em>\"{}\"</em></p>",
            record.priority.as_str(),
            record.priority.as_str(),
            ts,
            escape_html(&record.content)
        ),
        None,
    )
}

fn retrieved_widget(records: &[MemoryRecord]) -> String {
    let body = if records.is_empty() {
        "<p><em>No se encontraron recuerdos coincidentes.</em></p>".to_string()
    } else {
        let items: String = records
            .iter()
            .map(|m| {
                let star = if m.priority == Priority::High {
                    " <strong>★ IMPORTANTE</strong>"
                } else {
                    ""
                };
                format!(
                    "\n    <li><small>{}</small>{}<p>{}</p></li>",
                    m.kind.as_str(),
                    star,
                    escape_html(&m.content)
                )
            })
            .collect();
        format!("<ul>{}\n  </ul>", items)
    };
    card(
        "memory",
        &format!("🔍 Recuperación de Memoria ({} resultados)", records.len()),
        &body,
        None,
    )
}

#[async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "memory_system"
    }

    fn description(&self) -> &str {
        "Sistema de Memoria Persistente. Úsalo para recordar información importante para el futuro o recuperar información de sesiones pasadas."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["STORE", "RETRIEVE", "FORGET"], "description": "Guardar, Recuperar o Olvidar" },
                "content": { "type": "string", "description": "Lo que se debe recordar (solo para STORE)" },
                "query": { "type": "string", "description": "Término de búsqueda (solo para RETRIEVE)" },
                "priority": { "type": "string", "enum": ["low", "medium", "high"], "description": "Importancia del recuerdo (solo para STORE)" },
                "memoryId": { "type": "string", "description": "ID del recuerdo a borrar (solo para FORGET)" }
            },
            "required": ["action"]
        })
    }

    fn system_hint(&self, _config: &AgentConfiguration) -> Option<String> {
        let mut hint = "Usa 'memory_system' para guardar preferencias del usuario, hechos importantes o resultados clave que deban persistir. Antes de responder, verifica si hay información relevante en la memoria.".to_string();
        match self.store.high_priority() {
            Ok(memories) if !memories.is_empty() => {
                hint.push_str("\n\n[MEMORIA A LARGO PLAZO - DATOS CRÍTICOS]:");
                for m in memories {
                    hint.push_str(&format!(
                        "\n- [{}] {}",
                        m.kind.as_str().to_uppercase(),
                        m.content
                    ));
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to load high-priority memories"),
        }
        Some(hint)
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput, AgentError> {
        let args: MemoryArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutput::fail(format!("Acción de memoria inválida: {}", e))),
        };
        match args.action {
            MemoryOp::Store => {
                let Some(content) = args.content.filter(|c| !c.trim().is_empty()) else {
                    return Ok(ToolOutput::fail("Contenido requerido para guardar"));
                };
                let priority = args
                    .priority
                    .as_deref()
                    .map(Priority::parse)
                    .unwrap_or_default();
                let record = self.store.add_memory(&content, MemoryKind::Fact, priority)?;
                Ok(ToolOutput::ok(json!({
                    "message": format!("Memoria guardada con ID {}", record.id),
                    "id": record.id,
                }))
                .with_markup(stored_widget(&record)))
            }
            MemoryOp::Retrieve => {
                let results = self
                    .store
                    .search_memories(args.query.as_deref().unwrap_or(""))?;
                let markup = retrieved_widget(&results);
                Ok(ToolOutput::ok(json!({
                    "count": results.len(),
                    "results": results,
                }))
                .with_markup(markup))
            }
            MemoryOp::Forget => {
                let Some(id) = args.memory_id.filter(|i| !i.trim().is_empty()) else {
                    return Ok(ToolOutput::fail("ID requerido para borrar"));
                };
                if self.store.forget_memory(id.trim())? {
                    Ok(ToolOutput::ok(json!({ "message": "Memoria eliminada" })))
                } else {
                    Ok(ToolOutput::fail(format!("No existe un recuerdo con ID {}", id)))
                }
            }
        }
    }
}
