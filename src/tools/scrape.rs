//! 网页抓取工具（web_scrape）：一次性取回整页文本，不改变浏览器状态

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::core::{AgentConfiguration, AgentError};
use crate::tools::web::{normalize_url, truncate_chars, PageFetcher};
use crate::tools::{Tool, ToolContext, ToolOutput};

pub struct ScrapeTool {
    fetcher: Arc<dyn PageFetcher>,
    max_chars: usize,
}

impl ScrapeTool {
    pub fn new(fetcher: Arc<dyn PageFetcher>, max_chars: usize) -> Self {
        Self { fetcher, max_chars }
    }
}

#[async_trait]
impl Tool for ScrapeTool {
    fn name(&self) -> &str {
        "web_scrape"
    }

    fn description(&self) -> &str {
        "Extrae el contenido de texto completo de una URL específica. Úsalo cuando necesites leer datos masivos de una página sin navegar interactivamente."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "url": { "type": "string", "description": "La URL completa de la página a analizar." }
            },
            "required": ["url"]
        })
    }

    fn system_hint(&self, _config: &AgentConfiguration) -> Option<String> {
        Some("Usa 'web_scrape' para obtener datos masivos de una URL conocida sin navegar paso a paso.".into())
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput, AgentError> {
        let Some(url) = args
            .get("url")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|u| !u.is_empty())
        else {
            return Ok(ToolOutput::fail("URL requerida para la extracción."));
        };
        let target = normalize_url(url);
        match self.fetcher.fetch(&target).await {
            Ok(page) => Ok(ToolOutput::ok(json!({
                "url": target,
                "content": truncate_chars(&page, self.max_chars),
            }))),
            Err(e) => Ok(ToolOutput {
                success: false,
                data: json!({
                    "message": format!("Fallo al extraer {}: {}", target, e),
                    "content": "Failed to scrape",
                }),
                markup: None,
            }),
        }
    }
}
