//! 浏览器交互工具（browser_action）：NAVIGATE / CLICK / TYPE / SCROLL
//!
//! 没有真实浏览器：每个动作变成一次经代理的页面抓取，页面以 Markdown 文本保存在 ToolContext 中，
//! CLICK 在当前页面的 Markdown 链接里按文本查找 href。动作本身作为 AgentEvent 推给前端做预览。

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::core::AgentError;
use crate::tools::web::{
    find_link_in_markdown, normalize_url, resolve_url, truncate_chars, visible_links, PageFetcher,
};
use crate::tools::{Tool, ToolContext, ToolOutput};
use crate::react::AgentEvent;

/// CLICK 失败时最多列出的可见链接数
const SUGGESTED_LINKS: usize = 8;

/// 浏览器动作（前端预览用的强类型形式）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "UPPERCASE")]
pub enum BrowserAction {
    Navigate { value: String },
    Click { target: String },
    Type { value: String },
    Scroll,
}

/// 模型给出的原始参数
#[derive(Debug, Deserialize)]
struct BrowserArgs {
    action: String,
    #[serde(default)]
    target: Option<String>,
    #[serde(default)]
    value: Option<String>,
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl BrowserAction {
    /// 参数校验；错误信息直接给模型
    pub fn from_args(args: &Value) -> Result<Self, String> {
        let raw: BrowserArgs = serde_json::from_value(args.clone())
            .map_err(|e| format!("Argumentos inválidos: {}", e))?;
        match raw.action.trim().to_uppercase().as_str() {
            "NAVIGATE" => non_empty(raw.value)
                .map(|value| BrowserAction::Navigate { value })
                .ok_or_else(|| "URL requerida para navegación.".to_string()),
            "CLICK" => non_empty(raw.target)
                .map(|target| BrowserAction::Click { target })
                .ok_or_else(|| "Objetivo (target) requerido para clic.".to_string()),
            "TYPE" => non_empty(raw.value)
                .map(|value| BrowserAction::Type { value })
                .ok_or_else(|| "Valor (value) requerido para escribir.".to_string()),
            "SCROLL" => Ok(BrowserAction::Scroll),
            other => Err(format!("Acción desconocida: {}", other)),
        }
    }
}

/// 根据当前站点选择搜索 URL
pub fn search_url(current_url: &str, query: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    if current_url.contains("google") {
        format!("https://www.google.com/search?q={}", encoded)
    } else if current_url.contains("amazon") {
        format!("https://www.amazon.com/s?k={}", encoded)
    } else if current_url.contains("youtube") {
        format!("https://www.youtube.com/results?search_query={}", encoded)
    } else if current_url.contains("wikipedia") {
        format!("https://es.wikipedia.org/w/index.php?search={}", encoded)
    } else {
        match url::Url::parse(current_url)
            .ok()
            .and_then(|u| u.host_str().map(String::from))
        {
            Some(domain) => format!("https://www.google.com/search?q=site:{}+{}", domain, encoded),
            None => format!("https://www.google.com/search?q={}", encoded),
        }
    }
}

/// 单个动作的结果；page 为新页面内容（成功加载时）
struct Navigation {
    success: bool,
    message: String,
    page: Option<(String, String)>,
}

impl Navigation {
    fn loaded(url: String, content: String, message: String) -> Self {
        Self {
            success: true,
            message,
            page: Some((url, content)),
        }
    }

    fn failed(message: String) -> Self {
        Self {
            success: false,
            message,
            page: None,
        }
    }
}

pub struct BrowserTool {
    fetcher: Arc<dyn PageFetcher>,
    snippet_chars: usize,
}

impl BrowserTool {
    pub fn new(fetcher: Arc<dyn PageFetcher>, snippet_chars: usize) -> Self {
        Self {
            fetcher,
            snippet_chars,
        }
    }

    async fn perform(&self, action: &BrowserAction, current_url: &str, content: &str) -> Navigation {
        match action {
            BrowserAction::Navigate { value } => {
                let target = normalize_url(value);
                match self.fetcher.fetch(&target).await {
                    Ok(page) => {
                        let message = format!("Navegación exitosa a {}", target);
                        Navigation::loaded(target, page, message)
                    }
                    Err(e) => Navigation::failed(format!(
                        "Fallo al navegar: {}. SUGERENCIA: Usa la acción 'TYPE' para buscar este sitio en Google en su lugar.",
                        e
                    )),
                }
            }
            BrowserAction::Click { target } => {
                let Some(href) = find_link_in_markdown(content, target) else {
                    let links: Vec<String> = visible_links(content, SUGGESTED_LINKS)
                        .into_iter()
                        .map(|l| format!("\"{}\"", l))
                        .collect();
                    return Navigation::failed(format!(
                        "No se encontró el enlace \"{}\".\nSUGERENCIA: Intenta con uno de estos enlaces visibles: {}.\nO usa 'TYPE' para buscar.",
                        target,
                        links.join(", ")
                    ));
                };
                let absolute = resolve_url(&href, current_url);
                match self.fetcher.fetch(&absolute).await {
                    Ok(page) => {
                        let message = format!(
                            "Clic en \"{}\" exitoso. Página cargada: {}",
                            target, absolute
                        );
                        Navigation::loaded(absolute, page, message)
                    }
                    Err(e) => Navigation::failed(format!(
                        "El enlace fue encontrado pero falló la carga: {}. Intenta buscar la información en otra fuente.",
                        e
                    )),
                }
            }
            BrowserAction::Type { value } => {
                let url = search_url(current_url, value);
                match self.fetcher.fetch(&url).await {
                    Ok(page) => {
                        let host = url::Url::parse(&url)
                            .ok()
                            .and_then(|u| u.host_str().map(String::from))
                            .unwrap_or_default();
                        let message =
                            format!("Búsqueda \"{}\" realizada con éxito en {}.", value, host);
                        Navigation::loaded(url, page, message)
                    }
                    Err(e) => Navigation::failed(format!(
                        "Error al realizar la búsqueda: {}. Intenta navegar directamente a Google.com.",
                        e
                    )),
                }
            }
            BrowserAction::Scroll => Navigation {
                success: true,
                message: "Scroll simulado. Continúa analizando el contenido actual.".to_string(),
                page: None,
            },
        }
    }
}

#[async_trait]
impl Tool for BrowserTool {
    fn name(&self) -> &str {
        "browser_action"
    }

    fn description(&self) -> &str {
        "Realiza una acción en el navegador web simulado. Útil para navegar, hacer clic en enlaces visibles o buscar información interactivamente."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["NAVIGATE", "CLICK", "TYPE", "SCROLL"],
                    "description": "El tipo de acción a realizar."
                },
                "target": {
                    "type": "string",
                    "description": "Para CLICK: El texto exacto del enlace. Para TYPE: irrelevante."
                },
                "value": {
                    "type": "string",
                    "description": "Para NAVIGATE: La URL completa. Para TYPE: El texto a buscar."
                }
            },
            "required": ["action"]
        })
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, AgentError> {
        let action = match BrowserAction::from_args(&args) {
            Ok(a) => a,
            Err(e) => {
                return Ok(ToolOutput::fail(format!(
                    "Error Crítico del Navegador: {}",
                    e
                )))
            }
        };
        debug!(?action, "browser action");
        ctx.emit(AgentEvent::BrowserAction {
            action: action.clone(),
        });

        let (current_url, content) = {
            let state = ctx.browser.lock().await;
            (state.current_url.clone(), state.content.clone())
        };

        let nav = self.perform(&action, &current_url, &content).await;

        let mut state = ctx.browser.lock().await;
        let mut snippet = None;
        if let Some((url, page)) = nav.page {
            snippet = Some(truncate_chars(&page, self.snippet_chars));
            state.current_url = url;
            state.content = page;
        }
        Ok(ToolOutput {
            success: nav.success,
            data: json!({
                "message": nav.message,
                "current_url": state.current_url,
                "page_content_snippet": snippet.unwrap_or_else(|| "No data".to_string()),
            }),
            markup: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentConfiguration;
    use crate::tools::web::FetchError;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// 按 URL 返回预设页面；其余 404
    #[derive(Default)]
    struct StubFetcher {
        pages: HashMap<String, String>,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PageFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<String, FetchError> {
            self.seen.lock().unwrap().push(url.to_string());
            self.pages.get(url).cloned().ok_or(FetchError::NotFound)
        }
    }

    fn ctx() -> ToolContext {
        ToolContext::new(Arc::new(AgentConfiguration::default()))
    }

    fn stub(pages: &[(&str, &str)]) -> Arc<StubFetcher> {
        Arc::new(StubFetcher {
            pages: pages
                .iter()
                .map(|(u, p)| (u.to_string(), p.to_string()))
                .collect(),
            ..Default::default()
        })
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(
            BrowserAction::from_args(&json!({"action": "navigate", "value": "a.com"})).unwrap(),
            BrowserAction::Navigate { value: "a.com".into() }
        );
        assert!(BrowserAction::from_args(&json!({"action": "CLICK"})).is_err());
        assert!(BrowserAction::from_args(&json!({"action": "HOVER"}))
            .unwrap_err()
            .contains("HOVER"));
        assert_eq!(
            BrowserAction::from_args(&json!({"action": "SCROLL"})).unwrap(),
            BrowserAction::Scroll
        );
    }

    #[test]
    fn test_search_url_per_site() {
        assert_eq!(
            search_url("https://www.google.com", "rust async"),
            "https://www.google.com/search?q=rust+async"
        );
        assert!(search_url("https://www.amazon.com/dp/1", "libro").starts_with("https://www.amazon.com/s?k="));
        assert!(search_url("https://www.youtube.com", "x").contains("search_query=x"));
        assert!(search_url("https://es.wikipedia.org/wiki/Rust", "x").starts_with("https://es.wikipedia.org/w/index.php"));
        assert_eq!(
            search_url("https://docs.rs/tokio", "mpsc"),
            "https://www.google.com/search?q=site:docs.rs+mpsc"
        );
    }

    #[tokio::test]
    async fn test_navigate_then_click_relative_link() {
        let home = "# Blog\n[Últimas noticias](/news)\n".repeat(3);
        let news = "Noticia principal: Rust 1.80 publicado con LazyLock".repeat(2);
        let fetcher = stub(&[
            ("https://blog.example.com", home.as_str()),
            ("https://blog.example.com/news", news.as_str()),
        ]);
        let tool = BrowserTool::new(fetcher.clone(), 10_000);
        let ctx = ctx();

        let out = tool
            .execute(json!({"action": "NAVIGATE", "value": "blog.example.com"}), &ctx)
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.data["current_url"], "https://blog.example.com");

        let out = tool
            .execute(json!({"action": "CLICK", "target": "últimas noticias"}), &ctx)
            .await
            .unwrap();
        assert!(out.success, "{:?}", out);
        assert_eq!(out.data["current_url"], "https://blog.example.com/news");
        assert!(out.data["page_content_snippet"].as_str().unwrap().contains("LazyLock"));
    }

    #[tokio::test]
    async fn test_navigate_404_is_advisory() {
        let tool = BrowserTool::new(stub(&[]), 10_000);
        let ctx = ctx();
        let out = tool
            .execute(json!({"action": "NAVIGATE", "value": "https://x.org/missing"}), &ctx)
            .await
            .unwrap();
        assert!(!out.success);
        assert!(out.message().unwrap().contains("no encontrada"));
        assert_eq!(out.data["current_url"], "https://www.google.com");
        assert_eq!(out.data["page_content_snippet"], "No data");
    }

    #[tokio::test]
    async fn test_click_miss_lists_visible_links() {
        let page = "[Documentación](/docs) [FAQ](/faq) [Descargas](/dl)";
        let tool = BrowserTool::new(stub(&[("https://rust-lang.org", page)]), 10_000);
        let ctx = ctx();
        tool.execute(json!({"action": "NAVIGATE", "value": "https://rust-lang.org"}), &ctx)
            .await
            .unwrap();
        let out = tool
            .execute(json!({"action": "CLICK", "target": "Comunidad"}), &ctx)
            .await
            .unwrap();
        assert!(!out.success);
        let msg = out.message().unwrap();
        assert!(msg.contains("\"Documentación\""));
        assert!(msg.contains("\"Descargas\""));
        assert!(!msg.contains("\"FAQ\""));
    }

    #[tokio::test]
    async fn test_emits_browser_event() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = ctx().with_events(Some(tx));
        let tool = BrowserTool::new(stub(&[]), 100);
        tool.execute(json!({"action": "SCROLL"}), &ctx).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            AgentEvent::BrowserAction {
                action: BrowserAction::Scroll
            }
        );
    }
}
