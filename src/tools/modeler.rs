//! 3D 场景工具（generate_3d_model）
//!
//! 模型给出声明式的图元列表而不是脚本；校验通过后以 AgentEvent::SceneGenerated 交给前端渲染。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{AgentConfiguration, AgentError};
use crate::react::AgentEvent;
use crate::tools::markup::escape_html;
use crate::tools::{Tool, ToolContext, ToolOutput};

pub const MAX_OBJECTS: usize = 64;
const MAX_SCALE: f32 = 100.0;
const MAX_COORD: f32 = 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Primitive {
    Box,
    Sphere,
    Cylinder,
    Cone,
    Torus,
    Plane,
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

fn default_color() -> String {
    "#cccccc".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneObject {
    pub primitive: Primitive,
    #[serde(default)]
    pub position: [f32; 3],
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
    /// 弧度
    #[serde(default)]
    pub rotation: [f32; 3],
    #[serde(default = "default_color")]
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneDescription {
    #[serde(default)]
    pub description: String,
    pub objects: Vec<SceneObject>,
}

/// `#rrggbb`
fn is_hex_color(s: &str) -> bool {
    s.len() == 7
        && s.starts_with('#')
        && s[1..].chars().all(|c| c.is_ascii_hexdigit())
}

impl SceneDescription {
    /// 边界校验；错误信息给模型
    pub fn validate(&self) -> Result<(), String> {
        if self.objects.is_empty() {
            return Err("La escena no contiene objetos.".into());
        }
        if self.objects.len() > MAX_OBJECTS {
            return Err(format!(
                "Demasiados objetos ({}); máximo {}.",
                self.objects.len(),
                MAX_OBJECTS
            ));
        }
        for (i, obj) in self.objects.iter().enumerate() {
            let mut all = obj.position.iter().chain(&obj.scale).chain(&obj.rotation);
            if all.any(|v| !v.is_finite()) {
                return Err(format!("Objeto {}: valores numéricos no válidos.", i));
            }
            if obj.position.iter().any(|v| v.abs() > MAX_COORD) {
                return Err(format!("Objeto {}: posición fuera de rango (±{}).", i, MAX_COORD));
            }
            if obj.scale.iter().any(|v| *v <= 0.0 || *v > MAX_SCALE) {
                return Err(format!("Objeto {}: escala debe estar en (0, {}].", i, MAX_SCALE));
            }
            if !is_hex_color(&obj.color) {
                return Err(format!("Objeto {}: color '{}' no es #rrggbb.", i, obj.color));
            }
        }
        Ok(())
    }
}

pub struct ModelerTool;

#[async_trait]
impl Tool for ModelerTool {
    fn name(&self) -> &str {
        "generate_3d_model"
    }

    fn description(&self) -> &str {
        "Genera una escena 3D declarativa (lista de primitivas con posición, escala, rotación y color). Úsalo cuando el usuario pida visualizar o crear objetos 3D."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "description": { "type": "string", "description": "Descripción detallada del objeto a crear" },
                "objects": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "primitive": { "type": "string", "enum": ["box", "sphere", "cylinder", "cone", "torus", "plane"] },
                            "position": { "type": "array", "items": { "type": "number" }, "description": "[x, y, z]" },
                            "scale": { "type": "array", "items": { "type": "number" }, "description": "[x, y, z], mayor que 0" },
                            "rotation": { "type": "array", "items": { "type": "number" }, "description": "[x, y, z] en radianes" },
                            "color": { "type": "string", "description": "Color hexadecimal #rrggbb" }
                        },
                        "required": ["primitive"]
                    }
                }
            },
            "required": ["description", "objects"]
        })
    }

    fn system_hint(&self, _config: &AgentConfiguration) -> Option<String> {
        Some("Tienes acceso a un ESTUDIO 3D. Si el usuario pide crear objetos 3D, figuras o escenas, usa la herramienta 'generate_3d_model' describiendo la escena como primitivas.".into())
    }

    async fn execute(&self, args: Value, ctx: &ToolContext) -> Result<ToolOutput, AgentError> {
        let scene: SceneDescription = match serde_json::from_value(args) {
            Ok(s) => s,
            Err(e) => return Ok(ToolOutput::fail(format!("Escena inválida: {}", e))),
        };
        if let Err(msg) = scene.validate() {
            return Ok(ToolOutput::fail(msg));
        }
        let count = scene.objects.len();
        let markup = format!(
            "🧩 **Escena 3D**: \"{}\" ({} objetos). Ábrela en el panel **MODELO 3D** para visualizarla.",
            escape_html(&scene.description),
            count
        );
        ctx.emit(AgentEvent::SceneGenerated { scene });
        Ok(ToolOutput::ok(json!({
            "message": "Escena 3D enviada al panel de visualización.",
            "objects": count,
        }))
        .with_markup(markup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn scene(v: Value) -> SceneDescription {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_defaults_and_validation() {
        let s = scene(json!({"description": "cubo", "objects": [{"primitive": "box"}]}));
        assert_eq!(s.objects[0].scale, [1.0, 1.0, 1.0]);
        assert_eq!(s.objects[0].color, "#cccccc");
        assert!(s.validate().is_ok());

        let bad_scale = scene(json!({"objects": [{"primitive": "sphere", "scale": [0, 1, 1]}]}));
        assert!(bad_scale.validate().unwrap_err().contains("escala"));

        let bad_color = scene(json!({"objects": [{"primitive": "cone", "color": "red"}]}));
        assert!(bad_color.validate().is_err());

        let far = scene(json!({"objects": [{"primitive": "plane", "position": [0, 5000, 0]}]}));
        assert!(far.validate().is_err());

        assert!(scene(json!({"objects": []})).validate().is_err());
    }

    #[test]
    fn test_unknown_primitive_rejected() {
        assert!(serde_json::from_value::<SceneDescription>(
            json!({"objects": [{"primitive": "teapot"}]})
        )
        .is_err());
    }

    #[tokio::test]
    async fn test_emits_scene() {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let ctx = ToolContext::new(Arc::new(AgentConfiguration::default())).with_events(Some(tx));
        let out = ModelerTool
            .execute(
                json!({
                    "description": "muñeco de nieve",
                    "objects": [
                        {"primitive": "sphere", "position": [0, 0.5, 0], "color": "#ffffff"},
                        {"primitive": "sphere", "position": [0, 1.4, 0], "scale": [0.6, 0.6, 0.6], "color": "#ffffff"}
                    ]
                }),
                &ctx,
            )
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.data["objects"], 2);
        match rx.recv().await.unwrap() {
            AgentEvent::SceneGenerated { scene } => assert_eq!(scene.objects.len(), 2),
            other => panic!("unexpected event {:?}", other),
        }
    }
}
