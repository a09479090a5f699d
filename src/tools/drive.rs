//! Google Drive 工具：生成搜索 / 新建文档的直达链接

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::{AgentConfiguration, AgentError};
use crate::tools::markup::{card, escape_html};
use crate::tools::{Tool, ToolContext, ToolOutput};

const MY_DRIVE: &str = "https://drive.google.com/drive/my-drive";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DriveOp {
    Search,
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriveFileType {
    Document,
    Spreadsheet,
    Presentation,
    Folder,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveAction {
    pub action: DriveOp,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub file_type: Option<DriveFileType>,
}

pub fn drive_link(cmd: &DriveAction) -> String {
    match cmd.action {
        DriveOp::Search => {
            let q: String =
                url::form_urlencoded::byte_serialize(cmd.query.as_deref().unwrap_or("").as_bytes())
                    .collect();
            format!("https://drive.google.com/drive/search?q={}", q)
        }
        DriveOp::Create => match cmd.file_type {
            Some(DriveFileType::Document) => "https://docs.google.com/document/create".into(),
            Some(DriveFileType::Spreadsheet) => "https://docs.google.com/spreadsheets/create".into(),
            Some(DriveFileType::Presentation) => {
                "https://docs.google.com/presentation/create".into()
            }
            _ => MY_DRIVE.into(),
        },
    }
}

fn widget(cmd: &DriveAction, link: &str) -> String {
    let (title, desc) = match cmd.action {
        DriveOp::Search => (
            "🔍 Búsqueda en Drive",
            format!("Consulta: \"{}\"", cmd.query.as_deref().unwrap_or("")),
        ),
        DriveOp::Create => {
            let title = match cmd.file_type {
                Some(DriveFileType::Spreadsheet) => "📊 Nueva Hoja de Cálculo",
                Some(DriveFileType::Presentation) => "📽️ Nueva Presentación",
                _ => "📝 Nuevo Documento",
            };
            (title, "Crear archivo vacío en Google Drive".to_string())
        }
    };
    card(
        "drive",
        title,
        &format!("<p>{}</p>", escape_html(&desc)),
        Some((link, "Abrir Drive")),
    )
}

pub struct DriveTool;

#[async_trait]
impl Tool for DriveTool {
    fn name(&self) -> &str {
        "google_drive"
    }

    fn description(&self) -> &str {
        "Interactúa con Google Drive. Permite generar enlaces para buscar archivos o crear nuevos documentos (Docs, Sheets, Slides)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": { "type": "string", "enum": ["SEARCH", "CREATE"], "description": "Buscar o Crear archivo" },
                "query": { "type": "string", "description": "Términos de búsqueda (solo si action es SEARCH)" },
                "fileType": {
                    "type": "string",
                    "enum": ["document", "spreadsheet", "presentation"],
                    "description": "Tipo de archivo a crear (solo si action es CREATE)"
                }
            },
            "required": ["action"]
        })
    }

    fn system_hint(&self, _config: &AgentConfiguration) -> Option<String> {
        Some("Usa 'google_drive' para buscar archivos existentes o crear nuevos documentos/hojas de cálculo.".into())
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput, AgentError> {
        let cmd: DriveAction = match serde_json::from_value(args) {
            Ok(c) => c,
            Err(e) => return Ok(ToolOutput::fail(format!("Acción de Drive inválida: {}", e))),
        };
        let link = drive_link(&cmd);
        Ok(
            ToolOutput::ok(json!({ "message": "Enlace de Drive generado.", "link": link }))
                .with_markup(widget(&cmd, &link)),
        )
    }
}
