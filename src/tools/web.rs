//! 页面抓取：经文本提取代理（默认 r.jina.ai）GET 目标 URL
//!
//! 每次抓取 15s 超时；失败归类为 access-denied / not-found / http / timeout / empty，
//! 由调用方转成给模型的可操作提示，而不是向上抛错。
//! 代理未生效而直接返回 HTML 时，用 html2text 提取可读文本。

use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use thiserror::Error;

pub const DEFAULT_PROXY_URL: &str = "https://r.jina.ai/";

/// 抓取失败分类（Display 即给模型看的西语提示）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("Acceso Denegado ({0}). El sitio bloquea bots.")]
    AccessDenied(u16),

    #[error("Página no encontrada (404).")]
    NotFound,

    #[error("Error HTTP {status}: {reason}")]
    Http { status: u16, reason: String },

    #[error("Tiempo de espera agotado al conectar con el sitio.")]
    Timeout,

    #[error("Contenido vacío o ilegible recibido del proxy.")]
    Empty,

    #[error("Error de red: {0}")]
    Transport(String),
}

impl FetchError {
    /// 非 2xx 状态归类
    pub fn classify_status(status: u16, reason: &str) -> Self {
        match status {
            401 | 403 => FetchError::AccessDenied(status),
            404 => FetchError::NotFound,
            _ => FetchError::Http {
                status,
                reason: reason.to_string(),
            },
        }
    }
}

/// 页面抓取 trait（测试中替换为桩实现）
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// 经代理抓取
pub struct ProxyFetcher {
    client: Client,
    proxy_url: String,
    timeout: Duration,
    min_content_chars: usize,
}

impl ProxyFetcher {
    pub fn new(proxy_url: impl Into<String>, timeout: Duration, min_content_chars: usize) -> Self {
        let client = Client::builder().timeout(timeout).build().unwrap_or_default();
        Self {
            client,
            proxy_url: proxy_url.into(),
            timeout,
            min_content_chars,
        }
    }

    /// 将 HTML 转为可读文本（去除 script/style 等）
    fn html_to_text(html: &str) -> String {
        match from_read(html.as_bytes(), 120) {
            Ok(text) if !text.trim().is_empty() => text,
            _ => strip_html_tags(html),
        }
    }

    async fn fetch_inner(&self, url: &str) -> Result<String, FetchError> {
        let resp = self
            .client
            .get(format!("{}{}", self.proxy_url, url))
            .header("X-Target-Selector", "body")
            .header("Accept", "text/plain")
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout
                } else {
                    FetchError::Transport(e.to_string())
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::classify_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or(""),
            ));
        }

        let mut body = resp.text().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout
            } else {
                FetchError::Transport(e.to_string())
            }
        })?;
        if body.starts_with('\u{FEFF}') {
            body = body['\u{FEFF}'.len_utf8()..].to_string();
        }
        let body = if looks_like_html(&body) {
            Self::html_to_text(&body)
        } else {
            body
        };
        check_content(body, self.min_content_chars)
    }
}

#[async_trait]
impl PageFetcher for ProxyFetcher {
    async fn fetch(&self, url: &str) -> Result<String, FetchError> {
        match tokio::time::timeout(self.timeout, self.fetch_inner(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout),
        }
    }
}

/// 过短的正文视为不可用
pub fn check_content(body: String, min_chars: usize) -> Result<String, FetchError> {
    if body.trim().chars().count() < min_chars {
        Err(FetchError::Empty)
    } else {
        Ok(body)
    }
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!") || s.starts_with("<html") || s.starts_with("<HTML")
}

/// 相对链接按当前绝对 URL 解析；无法解析（javascript: 等）时原样返回
pub fn resolve_url(link: &str, base: &str) -> String {
    match url::Url::parse(base).and_then(|b| b.join(link)) {
        Ok(u) => u.to_string(),
        Err(_) => link.to_string(),
    }
}

/// 补全协议
pub fn normalize_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    }
}

/// 在 Markdown 中按链接文本查找 href：先精确匹配，再部分匹配（均不区分大小写）
pub fn find_link_in_markdown(markdown: &str, selector: &str) -> Option<String> {
    let selector = selector.trim();
    if selector.is_empty() {
        return None;
    }
    if selector.starts_with("http") || selector.starts_with("www") {
        return Some(selector.to_string());
    }
    let escaped = regex::escape(selector);
    let patterns = [
        format!(r"(?i)\[\s*{}\s*\]\(([^)]*)\)", escaped),
        format!(r"(?i)\[[^\]]*{}[^\]]*\]\(([^)]*)\)", escaped),
    ];
    for pattern in &patterns {
        let Ok(re) = Regex::new(pattern) else {
            continue;
        };
        if let Some(href) = re
            .captures(markdown)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().trim().to_string())
            .filter(|h| !h.is_empty())
        {
            return Some(href);
        }
    }
    None
}

/// 页面中可见的链接文本（长度 > 3），最多 limit 个
pub fn visible_links(markdown: &str, limit: usize) -> Vec<String> {
    let Ok(re) = Regex::new(r"\[([^\]]*)\]\(([^)]*)\)") else {
        return Vec::new();
    };
    re.captures_iter(markdown)
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_string()))
        .filter(|text| text.chars().count() > 3)
        .take(limit)
        .collect()
}

/// 按字符数截取
pub fn truncate_chars(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = "# Noticias\n[Inicio](/)\n[Ver más artículos](/articulos?page=2)\n[Rust 1.80 publicado](https://blog.rust-lang.org/2024/07/25/Rust-1.80.0.html)\n[FAQ](faq.html)";

    #[test]
    fn test_status_classification() {
        assert_eq!(FetchError::classify_status(403, "Forbidden"), FetchError::AccessDenied(403));
        assert_eq!(FetchError::classify_status(401, ""), FetchError::AccessDenied(401));
        assert_eq!(FetchError::classify_status(404, "Not Found"), FetchError::NotFound);
        assert!(FetchError::NotFound.to_string().contains("no encontrada"));
        assert!(matches!(
            FetchError::classify_status(502, "Bad Gateway"),
            FetchError::Http { status: 502, .. }
        ));
    }

    #[test]
    fn test_resolve_relative_links() {
        assert_eq!(
            resolve_url("/articulos?page=2", "https://example.com/news/today"),
            "https://example.com/articulos?page=2"
        );
        assert_eq!(
            resolve_url("faq.html", "https://example.com/news/today"),
            "https://example.com/news/faq.html"
        );
        assert_eq!(
            resolve_url("https://other.org/x", "https://example.com/"),
            "https://other.org/x"
        );
        assert_eq!(resolve_url("/x", "not a url"), "/x");
    }

    #[test]
    fn test_find_link_exact_then_partial() {
        assert_eq!(find_link_in_markdown(PAGE, "inicio").as_deref(), Some("/"));
        assert_eq!(
            find_link_in_markdown(PAGE, "más artículos").as_deref(),
            Some("/articulos?page=2")
        );
        assert_eq!(find_link_in_markdown(PAGE, "Python"), None);
        assert_eq!(
            find_link_in_markdown(PAGE, "https://x.org").as_deref(),
            Some("https://x.org")
        );
    }

    #[test]
    fn test_visible_links_skip_short_text() {
        let links = visible_links(PAGE, 8);
        assert_eq!(links, vec!["Inicio", "Ver más artículos", "Rust 1.80 publicado"]);
    }

    #[test]
    fn test_short_body_is_empty() {
        assert_eq!(check_content("hola".into(), 50), Err(FetchError::Empty));
        assert!(check_content("x".repeat(60), 50).is_ok());
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("http://a.b"), "http://a.b");
    }
}
