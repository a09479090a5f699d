//! Google Calendar 工具：生成预填好的「添加事件」链接（无需 OAuth）
//!
//! 时间接受 RFC 3339 / ISO 8601 / `YYYY-MM-DD HH:MM`；不带时区的时间按 UTC 处理。

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::core::{AgentConfiguration, AgentError};
use crate::tools::markup::{card, escape_html};
use crate::tools::{Tool, ToolContext, ToolOutput};

const CALENDAR_RENDER_URL: &str = "https://calendar.google.com/calendar/render";

const NAIVE_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub start_time: String,
    pub end_time: String,
    #[serde(default)]
    pub location: Option<String>,
}

/// 解析为 UTC 时间；无法解析返回 None
pub fn parse_event_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// YYYYMMDDTHHMMSSZ
pub fn format_calendar_date(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn calendar_link(event: &CalendarEvent) -> String {
    let start = parse_event_time(&event.start_time);
    let end = parse_event_time(&event.end_time);

    let mut params = url::form_urlencoded::Serializer::new(String::new());
    params.append_pair("action", "TEMPLATE");
    params.append_pair("text", &event.title);
    if let (Some(s), Some(e)) = (start, end) {
        params.append_pair(
            "dates",
            &format!("{}/{}", format_calendar_date(&s), format_calendar_date(&e)),
        );
    }
    params.append_pair("details", &event.description);
    if let Some(location) = event.location.as_deref().filter(|l| !l.is_empty()) {
        params.append_pair("location", location);
    }
    format!("{}?{}", CALENDAR_RENDER_URL, params.finish())
}

pub struct CalendarTool;

#[async_trait]
impl Tool for CalendarTool {
    fn name(&self) -> &str {
        "google_calendar"
    }

    fn description(&self) -> &str {
        "Programa un evento en el Google Calendar. Genera un enlace directo para que el usuario guarde el evento."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "title": { "type": "string", "description": "Título del evento" },
                "description": { "type": "string", "description": "Descripción detallada del evento" },
                "startTime": { "type": "string", "description": "Fecha y hora de inicio (ISO 8601 o YYYY-MM-DD HH:MM)" },
                "endTime": { "type": "string", "description": "Fecha y hora de fin (ISO 8601 o YYYY-MM-DD HH:MM)" },
                "location": { "type": "string", "description": "Ubicación (opcional)" }
            },
            "required": ["title", "startTime", "endTime"]
        })
    }

    fn system_hint(&self, _config: &AgentConfiguration) -> Option<String> {
        Some("Usa 'google_calendar' cuando necesites agendar una reunión o evento.".into())
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput, AgentError> {
        let event: CalendarEvent = match serde_json::from_value(args) {
            Ok(e) => e,
            Err(e) => {
                return Ok(ToolOutput::fail(format!(
                    "Argumentos inválidos para el evento: {}",
                    e
                )))
            }
        };
        let link = calendar_link(&event);
        let body = format!(
            "<p><strong>{}</strong></p>\n  <p>{} - {}</p>\n  <p><em>{}</em></p>",
            escape_html(&event.title),
            escape_html(&event.start_time),
            escape_html(&event.end_time),
            escape_html(&event.description)
        );
        let widget = card(
            "calendar",
            "📅 Evento Programado",
            &body,
            Some((&link, "Agregar a Google Calendar")),
        );
        let mut message = "Evento creado. Widget generado.".to_string();
        if parse_event_time(&event.start_time).is_none() || parse_event_time(&event.end_time).is_none() {
            message.push_str(" Aviso: no se pudieron interpretar las fechas; el enlace no incluye horario.");
        }
        Ok(ToolOutput::ok(json!({ "message": message, "link": link })).with_markup(widget))
    }
}
