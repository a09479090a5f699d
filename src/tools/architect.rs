//! 软件架构师工具：模型一次性给出多文件项目，生成文件树小部件与可预览的单页 HTML
//!
//! 项目通过 AgentEvent::ProjectUpdated 推给前端（代码编辑器），运行时据此维护「当前项目」上下文。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{AgentConfiguration, AgentError};
use crate::react::AgentEvent;
use crate::tools::markup::escape_html;
use crate::tools::{Tool, ToolContext, ToolOutput};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileBlueprint {
    pub path: String,
    pub language: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectStructure {
    pub project_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub files: Vec<FileBlueprint>,
}

impl ProjectStructure {
    pub fn paths(&self) -> Vec<&str> {
        self.files.iter().map(|f| f.path.as_str()).collect()
    }
}

/// 把 css / js 内联进入口 HTML；没有 HTML 入口时返回 None
pub fn assemble_preview(files: &[FileBlueprint]) -> Option<String> {
    let entry = files
        .iter()
        .find(|f| f.path.ends_with("index.html"))
        .or_else(|| files.iter().find(|f| f.language == "html"))?;
    let mut html = entry.content.clone();

    let css: String = files
        .iter()
        .filter(|f| f.language == "css")
        .map(|f| format!("\n/* {} */\n{}\n", f.path, f.content))
        .collect();
    if !css.is_empty() {
        let block = format!("<style>{}</style>", css);
        html = match html.find("</head>") {
            Some(idx) => format!("{}{}{}", &html[..idx], block, &html[idx..]),
            None => html + &block,
        };
    }

    let js: String = files
        .iter()
        .filter(|f| f.language == "javascript" || f.language == "js")
        .map(|f| format!("\n// {}\n{}\n", f.path, f.content))
        .collect();
    if !js.is_empty() {
        let block = format!("<script>{}</script>", js);
        html = match html.find("</body>") {
            Some(idx) => format!("{}{}{}", &html[..idx], block, &html[idx..]),
            None => html + &block,
        };
    }
    Some(html)
}

fn widget(project: &ProjectStructure) -> String {
    let mut files: Vec<&FileBlueprint> = project.files.iter().collect();
    files.sort_by(|a, b| a.path.cmp(&b.path));
    let tree: String = files
        .iter()
        .map(|f| {
            format!(
                "\n    <details><summary>{} <small>{}</small></summary><pre><code>{}</code></pre></details>",
                escape_html(&f.path),
                escape_html(&f.language),
                escape_html(&f.content)
            )
        })
        .collect();
    let preview = assemble_preview(&project.files)
        .map(|src| {
            format!(
                "\n  <iframe class=\"widget-preview\" sandbox=\"allow-scripts\" srcdoc=\"{}\"></iframe>",
                escape_html(&src)
            )
        })
        .unwrap_or_default();
    format!(
        "<div class=\"widget widget-architect\">\n  <h3>{}</h3>\n  <p>{}</p>\n  <div class=\"widget-files\">{}\n  </div>{}\n</div>",
        escape_html(&project.project_name),
        escape_html(project.description.as_deref().unwrap_or("")),
        tree,
        preview
    )
}

pub struct ArchitectTool;

#[async_trait]
impl Tool for ArchitectTool {
    fn name(&self) -> &str {
        "software_architect"
    }

    fn description(&self) -> &str {
        "Genera una estructura de proyecto de software completa con múltiples archivos y código. Úsalo cuando te pidan diseñar una app, script o arquitectura."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "projectName": { "type": "string", "description": "Nombre del proyecto" },
                "description": { "type": "string", "description": "Descripción breve de la arquitectura" },
                "files": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "path": { "type": "string", "description": "Ruta relativa del archivo (ej: src/utils/api.ts, index.html, css/style.css)" },
                            "language": { "type": "string", "description": "Lenguaje de programación (ts, js, py, html, css, json)" },
                            "content": { "type": "string", "description": "Código fuente completo del archivo" }
                        },
                        "required": ["path", "language", "content"]
                    }
                }
            },
            "required": ["projectName", "files"]
        })
    }

    fn system_hint(&self, _config: &AgentConfiguration) -> Option<String> {
        Some("Usa 'software_architect' para diseñar aplicaciones. SIEMPRE incluye 'index.html' si es una aplicación web para que el usuario pueda ver la VISTA PREVIA. Genera código completo, no omitas partes.".into())
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, AgentError> {
        let project: ProjectStructure = match serde_json::from_value(args) {
            Ok(p) => p,
            Err(e) => return Ok(ToolOutput::fail(format!("Estructura de proyecto inválida: {}", e))),
        };
        if project.files.is_empty() {
            return Ok(ToolOutput::fail("El proyecto no contiene archivos."));
        }
        let markup = widget(&project);
        let file_count = project.files.len();
        ctx.emit(AgentEvent::ProjectUpdated { project });
        Ok(ToolOutput::ok(json!({
            "message": "Arquitectura generada y renderizada con vista previa.",
            "files": file_count,
        }))
        .with_markup(markup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn file(path: &str, language: &str, content: &str) -> FileBlueprint {
        FileBlueprint {
            path: path.into(),
            language: language.into(),
            content: content.into(),
        }
    }

    #[test]
    fn test_preview_inlines_css_and_js() {
        let files = vec![
            file("index.html", "html", "<html><head></head><body><h1>Hola</h1></body></html>"),
            file("css/style.css", "css", "h1 { color: red; }"),
            file("js/app.js", "javascript", "console.log(1);"),
            file("README.md", "markdown", "# x"),
        ];
        let html = assemble_preview(&files).unwrap();
        assert!(html.contains("<style>\n/* css/style.css */\nh1 { color: red; }\n</style></head>"));
        assert!(html.contains("<script>\n// js/app.js\nconsole.log(1);\n</script></body>"));
        assert!(!html.contains("# x"));
    }

    #[test]
    fn test_preview_requires_html_entry() {
        assert!(assemble_preview(&[file("main.py", "py", "print(1)")]).is_none());
        let bare = assemble_preview(&[file("page.htm", "html", "<p>x</p>"), file("a.css", "css", "p{}")]).unwrap();
        assert!(bare.ends_with("</style>"));
    }

    #[tokio::test]
    async fn test_emits_project_event() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = ToolContext::new(Arc::new(AgentConfiguration::default())).with_events(Some(tx));
        let out = ArchitectTool
            .execute(
                json!({
                    "projectName": "todo-app",
                    "files": [{ "path": "index.html", "language": "html", "content": "<p>todo</p>" }]
                }),
                &ctx,
            )
            .await
            .unwrap();
        assert!(out.success);
        assert!(out.markup.unwrap().contains("srcdoc="));
        match rx.recv().await.unwrap() {
            AgentEvent::ProjectUpdated { project } => assert_eq!(project.paths(), vec!["index.html"]),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
