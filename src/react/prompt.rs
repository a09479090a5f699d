//! 提示词拼装：系统指令、任务首条 user 消息、规划提示词、知识库文档块，以及两个辅助调用的固定文本

use crate::core::{AgentConfiguration, AgentDocument, ToolType};

const VISION_HINT: &str = "Tienes CAPACIDAD VISUAL. Se te han proporcionado imágenes. Analízalas detalladamente para responder a la tarea. Describe objetos, lee textos (OCR) y detecta patrones visuales si es necesario.";

/// 上传文档拼成知识库块；无文档时为空串
pub fn format_documents(documents: &[AgentDocument]) -> String {
    if documents.is_empty() {
        return String::new();
    }
    let body = documents
        .iter()
        .map(|d| {
            format!(
                "--- INICIO DE DOCUMENTO: {} ---\n{}\n--- FIN DE DOCUMENTO ---",
                d.name, d.content
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");
    format!(
        "====== BASE DE CONOCIMIENTO (DOCUMENTOS CARGADOS) ======\n{}\n========================================================",
        body
    )
}

/// 系统指令：身份 + 固定规则 + 各工具提示（每条一行 `- `）
pub fn system_instruction(config: &AgentConfiguration, tool_hints: &[String]) -> String {
    let mut out = format!(
        "Eres {}. {}\nREGLAS:\n1. IDIOMA: Responde SIEMPRE en ESPAÑOL.\n2. FORMATO: Markdown profesional con emojis.\n",
        config.name, config.description
    );
    for hint in tool_hints {
        out.push_str("\n- ");
        out.push_str(hint);
    }
    if config.has_vision() {
        out.push_str("\n- ");
        out.push_str(VISION_HINT);
    }
    out
}

/// 任务首条 user 消息的文本部分
pub fn task_prompt(
    goal: &str,
    context: &str,
    task_description: &str,
    documents: &[AgentDocument],
    initial_url: Option<&str>,
) -> String {
    let mut out = format!("OBJETIVO GLOBAL: {}\n", goal);
    let docs = format_documents(documents);
    if !docs.is_empty() {
        out.push_str(&docs);
        out.push('\n');
    }
    out.push_str(&format!("CONTEXTO PREVIO: {}\n", context));
    out.push_str(&format!("TAREA ACTUAL: {}\n", task_description));
    if let Some(url) = initial_url {
        out.push_str(&format!("URL INICIAL: {}\n", url));
    }
    out.push_str("\nEjecuta la tarea utilizando las herramientas disponibles.");
    out
}

/// 规划提示词
pub fn plan_prompt(goal: &str, config: &AgentConfiguration) -> String {
    let tools = config
        .tools
        .iter()
        .map(ToolType::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    let mut out = format!(
        "IDENTIDAD DEL AGENTE: {}\nDESCRIPCIÓN DEL AGENTE: {}\nHERRAMIENTAS DISPONIBLES: {}\n",
        config.name, config.description, tools
    );
    let docs = format_documents(&config.documents);
    if !docs.is_empty() {
        out.push('\n');
        out.push_str(&docs);
        out.push('\n');
    }
    if !config.images.is_empty() {
        out.push_str(&format!(
            "\n[ENTRADA VISUAL]: Se han adjuntado {} imágenes para análisis.\n",
            config.images.len()
        ));
    }
    out.push_str(&format!(
        "\nEres un agente autónomo de planificación de tareas.\nObjetivo: \"{}\".\n\nDesglosa este objetivo en una secuencia lógica de 3 a 6 pasos ejecutables.\nCada paso debe ser una instrucción clara y concisa en ESPAÑOL.\nDevuelve SOLO la lista de pasos en formato JSON.",
        goal
    ));
    out
}

pub fn enhance_prompt(current: &str) -> String {
    format!(
        "Eres un experto Ingeniero de Prompts (Prompt Engineer) para sistemas de Inteligencia Artificial.\n\n\
TU TAREA:\nMejora, expande y profesionaliza la siguiente descripción/instrucción de sistema para un Agente de IA.\n\n\
ENTRADA ACTUAL:\n\"{}\"\n\n\
REQUISITOS:\n\
1. Mantén la intención original del usuario.\n\
2. Usa un tono imperativo, claro y profesional.\n\
3. Estructura el prompt mejorado para maximizar el rendimiento del modelo (rol, contexto, restricciones, estilo de respuesta).\n\
4. Devuelve SOLO el texto mejorado, sin introducciones ni explicaciones.\n\
5. El idioma de salida debe ser ESPAÑOL.",
        current
    )
}

pub const HELP_SYSTEM: &str = "Eres el Asistente de Soporte Técnico de AGENTNAMIX (v2.0).

INFORMACIÓN DEL SISTEMA:
AGENTNAMIX es un agente autónomo de IA: recibe un objetivo, lo divide en tareas y las ejecuta con herramientas.

HERRAMIENTAS DISPONIBLES:
1. Web Search (Google): Búsqueda tradicional con fuentes.
2. Interacción DOM (Browser Interaction): Navega, hace clic y lee webs reales usando un proxy (Jina).
3. Web Scraping: Extrae texto masivo de una URL sin navegar.
4. Arquitecto SW: Genera proyectos de código con múltiples archivos y vista previa.
5. Google Calendar: Crea enlaces para agendar eventos.
6. Google Drive: Crea enlaces para docs/sheets o buscar archivos.
7. Memoria L.P.: Base de datos local para recordar hechos entre sesiones.
8. Image Analyzer: Visión multimodal para analizar imágenes subidas por el usuario.
9. Deep Analysis: Razonamiento lógico puro.
10. Modelo 3D: Generación de escenas 3D a partir de primitivas.

TU OBJETIVO:
Responder dudas del usuario sobre CÓMO usar la aplicación.
Sé conciso, amigable y usa un tono \"Tech Support / Futurista\".
Usa emojis.
Si te preguntan sobre cosas fuera del uso de la app, diles amablemente que solo das soporte sobre AGENTNAMIX.";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::AgentImage;

    #[test]
    fn test_documents_block() {
        assert_eq!(format_documents(&[]), "");
        let docs = vec![
            AgentDocument { name: "a.txt".into(), content: "uno".into() },
            AgentDocument { name: "b.md".into(), content: "dos".into() },
        ];
        let block = format_documents(&docs);
        assert!(block.starts_with("====== BASE DE CONOCIMIENTO"));
        assert!(block.contains(
            "--- INICIO DE DOCUMENTO: a.txt ---\nuno\n--- FIN DE DOCUMENTO ---\n\n--- INICIO DE DOCUMENTO: b.md ---"
        ));
    }

    #[test]
    fn test_system_instruction_lists_hints() {
        let config = AgentConfiguration::new("Investigador", "gemini-2.5-flash")
            .with_description("Analista meticuloso.");
        let s = system_instruction(&config, &["Usa 'web_scrape'.".to_string()]);
        assert!(s.starts_with("Eres Investigador. Analista meticuloso.\nREGLAS:"));
        assert!(s.ends_with("\n- Usa 'web_scrape'."));
        assert!(!s.contains("CAPACIDAD VISUAL"));
    }

    #[test]
    fn test_vision_hint_requires_images() {
        let mut config = AgentConfiguration::default().with_tools([ToolType::ImageAnalyzer]);
        assert!(!system_instruction(&config, &[]).contains("CAPACIDAD VISUAL"));
        config.images.push(AgentImage {
            name: "x.png".into(),
            mime_type: "image/png".into(),
            data: "AAAA".into(),
        });
        assert!(system_instruction(&config, &[]).contains("CAPACIDAD VISUAL"));
    }

    #[test]
    fn test_task_prompt_layout() {
        let p = task_prompt("Comparar precios", "", "Buscar en Amazon", &[], Some("https://www.google.com"));
        assert_eq!(
            p,
            "OBJETIVO GLOBAL: Comparar precios\nCONTEXTO PREVIO: \nTAREA ACTUAL: Buscar en Amazon\nURL INICIAL: https://www.google.com\n\nEjecuta la tarea utilizando las herramientas disponibles."
        );
    }

    #[test]
    fn test_plan_prompt_mentions_tools_and_images() {
        let mut config = AgentConfiguration::default()
            .with_tools([ToolType::WebSearch, ToolType::Model3d]);
        config.images.push(AgentImage {
            name: "x.png".into(),
            mime_type: "image/png".into(),
            data: "AAAA".into(),
        });
        let p = plan_prompt("Diseñar un logo", &config);
        assert!(p.contains("HERRAMIENTAS DISPONIBLES: web_search, model_3d"));
        assert!(p.contains("Se han adjuntado 1 imágenes"));
        assert!(p.contains("Objetivo: \"Diseñar un logo\"."));
    }
}
