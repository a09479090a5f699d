//! 远程终端工具（aura_ssh_command）
//!
//! 两种后端：
//! - SimulatedShell：进程内的虚拟文件系统，用于演示与测试
//! - BridgeShell：经 WebSocket 桥接（AUTH / EXEC / OUTPUT 消息）到真实主机，需 `ssh-bridge` feature
//!
//! 同一后端上的命令串行执行：桥接的输出缓冲区是共享的。

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::core::{AgentConfiguration, AgentError};
use crate::tools::markup::escape_html;
use crate::tools::{Tool, ToolContext, ToolOutput};

pub const NO_BRIDGE_ERROR: &str =
    "ERROR: No hay conexión activa con el puente SSH (WebSocket). Verifica la configuración.";
pub const BRIDGE_TIMEOUT: &str =
    "[TIMEOUT] El servidor tardó demasiado en responder o no hubo salida.";

/// 命令执行后端：总是返回文本（错误也以文本形式回给模型）
#[async_trait]
pub trait ShellBackend: Send + Sync {
    async fn exec(&self, command: &str) -> String;

    /// 终端小部件里显示的当前目录
    fn working_dir(&self) -> String {
        "~".to_string()
    }
}

// ---------------------------------------------------------------------------
// 模拟终端
// ---------------------------------------------------------------------------

struct SimState {
    cwd: String,
    fs: HashMap<String, Vec<String>>,
}

pub struct SimulatedShell {
    state: std::sync::Mutex<SimState>,
}

impl Default for SimulatedShell {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedShell {
    pub fn new() -> Self {
        let fs = HashMap::from([
            (
                "/home/user".to_string(),
                vec!["documents".into(), "projects".into(), "readme.txt".into()],
            ),
            (
                "/var/www/html".to_string(),
                vec!["index.html".into(), "style.css".into()],
            ),
            ("/etc/nginx".to_string(), vec!["nginx.conf".into()]),
        ]);
        Self {
            state: std::sync::Mutex::new(SimState {
                cwd: "/home/user".to_string(),
                fs,
            }),
        }
    }

    fn run(state: &mut SimState, command: &str) -> String {
        let command = command.trim();
        let arg = command.split(' ').nth(1).unwrap_or("").to_string();

        if command.starts_with("ls") {
            return match state.fs.get(&state.cwd) {
                Some(entries) if !entries.is_empty() => entries.join("\n"),
                _ => "(empty directory)".to_string(),
            };
        }
        if command.starts_with("cd ") {
            state.cwd = if arg == ".." {
                let mut parts: Vec<&str> = state.cwd.split('/').collect();
                parts.pop();
                let parent = parts.join("/");
                if parent.is_empty() {
                    "/".to_string()
                } else {
                    parent
                }
            } else if arg.starts_with('/') {
                arg
            } else {
                format!("{}/{}", state.cwd, arg).replacen("//", "/", 1)
            };
            return String::new();
        }
        if command.starts_with("pwd") {
            return state.cwd.clone();
        }
        if command.starts_with("mkdir ") {
            state.fs.entry(state.cwd.clone()).or_default().push(arg);
            return String::new();
        }
        if ["touch ", "nano ", "vim "].iter().any(|p| command.starts_with(p)) {
            let entries = state.fs.entry(state.cwd.clone()).or_default();
            if !entries.contains(&arg) {
                entries.push(arg);
            }
            return String::new();
        }
        if command.starts_with("cat ") {
            return "Contenido del archivo simulado:\n# Config File\nuser=admin\nport=8080".to_string();
        }
        if ["apt", "yum", "npm"].iter().any(|p| command.contains(p)) {
            return "[PROGRESS] 20%...\n[PROGRESS] 50%...\n[PROGRESS] 80%...\n[SUCCESS] Paquetes instalados/actualizados correctamente.".to_string();
        }
        if command.contains("systemctl") || command.contains("service") {
            return "[SYSTEM] Servicio reiniciado correctamente. Estado: Active (Running)".to_string();
        }
        if command.contains("whoami") {
            return "root".to_string();
        }
        if command.contains("uptime") {
            return " 14:32:01 up 45 days, 10:22,  1 user,  load average: 0.05, 0.03, 0.01"
                .to_string();
        }
        format!("[AURA EXEC] Comando simulado ejecutado: {}", command)
    }
}

#[async_trait]
impl ShellBackend for SimulatedShell {
    async fn exec(&self, command: &str) -> String {
        match self.state.lock() {
            Ok(mut state) => Self::run(&mut state, command),
            Err(_) => "ERROR: estado del terminal simulado no disponible".to_string(),
        }
    }

    fn working_dir(&self) -> String {
        self.state
            .lock()
            .map(|s| s.cwd.clone())
            .unwrap_or_else(|_| "~".to_string())
    }
}

/// real 模式但没有可用的桥接（未配置 proxyUrl 或未启用 feature）
pub struct DisconnectedShell;

#[async_trait]
impl ShellBackend for DisconnectedShell {
    async fn exec(&self, _command: &str) -> String {
        NO_BRIDGE_ERROR.to_string()
    }
}

// ---------------------------------------------------------------------------
// WebSocket 桥接
// ---------------------------------------------------------------------------

/// 桥接协议消息（JSON，`type` 字段区分）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum BridgeMessage {
    Auth {
        host: String,
        port: u16,
        username: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>,
    },
    Exec {
        command: String,
    },
    Output {
        content: String,
    },
}

#[cfg(feature = "ssh-bridge")]
pub use bridge::BridgeShell;

#[cfg(feature = "ssh-bridge")]
mod bridge {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures_util::stream::SplitSink;
    use futures_util::{SinkExt, StreamExt};
    use tokio::net::TcpStream;
    use tokio::task::JoinHandle;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
    use tracing::{debug, info, warn};

    use super::{BridgeMessage, ShellBackend, BRIDGE_TIMEOUT, NO_BRIDGE_ERROR};
    use crate::core::SshConfiguration;

    type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

    struct BridgeLink {
        sink: WsSink,
        buffer: Arc<std::sync::Mutex<String>>,
        reader: JoinHandle<()>,
    }

    impl Drop for BridgeLink {
        fn drop(&mut self) {
            self.reader.abort();
        }
    }

    pub struct BridgeShell {
        proxy_url: String,
        ssh: SshConfiguration,
        poll_attempts: usize,
        poll_interval: Duration,
        /// 持有期间独占桥接：一次只跑一条命令
        link: tokio::sync::Mutex<Option<BridgeLink>>,
    }

    impl BridgeShell {
        pub fn new(
            proxy_url: impl Into<String>,
            ssh: SshConfiguration,
            poll_attempts: usize,
            poll_interval: Duration,
        ) -> Self {
            Self {
                proxy_url: proxy_url.into(),
                ssh,
                poll_attempts: poll_attempts.max(1),
                poll_interval,
                link: tokio::sync::Mutex::new(None),
            }
        }

        async fn connect(&self) -> Result<BridgeLink, String> {
            info!(proxy = %self.proxy_url, host = %self.ssh.host, "connecting to ssh bridge");
            let (stream, _) = tokio_tungstenite::connect_async(self.proxy_url.as_str())
                .await
                .map_err(|e| e.to_string())?;
            let (mut sink, mut source) = stream.split();

            let auth = BridgeMessage::Auth {
                host: self.ssh.host.clone(),
                port: self.ssh.port,
                username: self.ssh.username.clone(),
                password: self.ssh.password.clone(),
            };
            let payload = serde_json::to_string(&auth).map_err(|e| e.to_string())?;
            sink.send(WsMessage::Text(payload))
                .await
                .map_err(|e| e.to_string())?;

            let buffer = Arc::new(std::sync::Mutex::new(String::new()));
            let sink_buffer = buffer.clone();
            let reader = tokio::spawn(async move {
                while let Some(msg) = source.next().await {
                    match msg {
                        Ok(WsMessage::Text(text)) => {
                            match serde_json::from_str::<BridgeMessage>(&text) {
                                Ok(BridgeMessage::Output { content }) => {
                                    if let Ok(mut buf) = sink_buffer.lock() {
                                        buf.push_str(&content);
                                    }
                                }
                                Ok(_) => {}
                                Err(e) => debug!(error = %e, "ignoring bridge message"),
                            }
                        }
                        Ok(WsMessage::Close(_)) => break,
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "ssh bridge read failed");
                            break;
                        }
                    }
                }
            });
            Ok(BridgeLink {
                sink,
                buffer,
                reader,
            })
        }

        fn take_output(buffer: &std::sync::Mutex<String>) -> Option<String> {
            let mut buf = buffer.lock().ok()?;
            if buf.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut *buf))
            }
        }
    }

    #[async_trait]
    impl ShellBackend for BridgeShell {
        async fn exec(&self, command: &str) -> String {
            let mut guard = self.link.lock().await;
            if guard.as_ref().is_some_and(|l| l.reader.is_finished()) {
                *guard = None;
            }
            if guard.is_none() {
                match self.connect().await {
                    Ok(link) => *guard = Some(link),
                    Err(e) => {
                        warn!(error = %e, "ssh bridge unavailable");
                        return NO_BRIDGE_ERROR.to_string();
                    }
                }
            }
            let Some(link) = guard.as_mut() else {
                return NO_BRIDGE_ERROR.to_string();
            };

            if let Ok(mut buf) = link.buffer.lock() {
                buf.clear();
            }
            let exec = BridgeMessage::Exec {
                command: command.to_string(),
            };
            let payload = match serde_json::to_string(&exec) {
                Ok(p) => p,
                Err(e) => return format!("ERROR: {}", e),
            };
            let sent = link.sink.send(WsMessage::Text(payload)).await;
            if let Err(e) = sent {
                warn!(error = %e, "ssh bridge send failed");
                *guard = None;
                return NO_BRIDGE_ERROR.to_string();
            }

            for _ in 0..self.poll_attempts {
                tokio::time::sleep(self.poll_interval).await;
                if let Some(output) = Self::take_output(&link.buffer) {
                    return output;
                }
            }
            BRIDGE_TIMEOUT.to_string()
        }
    }
}

// ---------------------------------------------------------------------------
// 工具
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct SshArgs {
    command: String,
    #[serde(default)]
    reasoning: String,
}

pub struct SshTool {
    backend: Arc<dyn ShellBackend>,
    host: String,
    real: bool,
}

impl SshTool {
    pub fn new(backend: Arc<dyn ShellBackend>, host: impl Into<String>, real: bool) -> Self {
        Self {
            backend,
            host: host.into(),
            real,
        }
    }

    fn widget(&self, args: &SshArgs, cwd: &str, output: &str) -> String {
        let status = if self.real {
            "<span class=\"ssh-live\">LIVE CONNECTION</span>"
        } else {
            "<span class=\"ssh-sim\">SIMULATION MODE</span>"
        };
        format!(
            "<div class=\"widget widget-terminal\">\n  <div class=\"terminal-header\">{} | root@{}</div>\n  <div class=\"terminal-body\">\n    <div class=\"terminal-reason\">// Razón: {}</div>\n    <div class=\"terminal-prompt\">➜ ~{} {}</div>\n    <pre class=\"terminal-output\">{}</pre>\n  </div>\n</div>",
            status,
            escape_html(&self.host),
            escape_html(&args.reasoning),
            escape_html(cwd),
            escape_html(&args.command),
            escape_html(output)
        )
    }
}

#[async_trait]
impl Tool for SshTool {
    fn name(&self) -> &str {
        "aura_ssh_command"
    }

    fn description(&self) -> &str {
        "Ejecuta comandos en un servidor remoto vía SSH. Úsalo para administrar servidores, instalar paquetes o revisar logs."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "El comando de shell a ejecutar (ej: ls -la, mkdir test, git clone ...)" },
                "reasoning": { "type": "string", "description": "Breve explicación de por qué ejecutas este comando" }
            },
            "required": ["command", "reasoning"]
        })
    }

    fn system_hint(&self, _config: &AgentConfiguration) -> Option<String> {
        let mode = if self.real { "REAL (PRODUCCIÓN)" } else { "SIMULADO" };
        Some(format!(
            "Tienes ACCESO SSH ({}) al servidor {}. Usa 'aura_ssh_command' para ejecutar comandos. Eres un SysAdmin experto.",
            mode, self.host
        ))
    }

    async fn execute(&self, args: Value, _ctx: &ToolContext) -> Result<ToolOutput, AgentError> {
        let args: SshArgs = match serde_json::from_value(args) {
            Ok(a) => a,
            Err(e) => return Ok(ToolOutput::fail(format!("Comando SSH inválido: {}", e))),
        };
        if args.command.trim().is_empty() {
            return Ok(ToolOutput::fail("Comando vacío."));
        }
        let output = self.backend.exec(&args.command).await;
        let cwd = self.backend.working_dir();
        let markup = self.widget(&args, &cwd, &output);
        Ok(ToolOutput::ok(json!({ "output": output })).with_markup(markup))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_navigation() {
        let shell = SimulatedShell::new();
        assert_eq!(shell.exec("pwd").await, "/home/user");
        assert_eq!(shell.exec("ls -la").await, "documents\nprojects\nreadme.txt");

        assert_eq!(shell.exec("cd /var/www/html").await, "");
        assert_eq!(shell.exec("ls").await, "index.html\nstyle.css");
        assert_eq!(shell.exec("cd ..").await, "");
        assert_eq!(shell.exec("pwd").await, "/var/www");
        assert_eq!(shell.exec("ls").await, "(empty directory)");

        shell.exec("mkdir backups").await;
        shell.exec("touch notes.md").await;
        shell.exec("touch notes.md").await;
        assert_eq!(shell.exec("ls").await, "backups\nnotes.md");

        shell.exec("cd backups").await;
        assert_eq!(shell.working_dir(), "/var/www/backups");
    }

    #[tokio::test]
    async fn test_simulated_canned_outputs() {
        let shell = SimulatedShell::new();
        assert_eq!(shell.exec("whoami").await, "root");
        assert!(shell.exec("sudo apt install nginx").await.ends_with("correctamente."));
        assert!(shell.exec("systemctl restart nginx").await.contains("Active (Running)"));
        assert!(shell.exec("cat /etc/nginx/nginx.conf").await.contains("port=8080"));
        assert_eq!(
            shell.exec("df -h").await,
            "[AURA EXEC] Comando simulado ejecutado: df -h"
        );
    }

    #[tokio::test]
    async fn test_tool_output_and_widget() {
        let tool = SshTool::new(Arc::new(SimulatedShell::new()), "srv-01", false);
        let ctx = ToolContext::new(Arc::new(AgentConfiguration::default()));
        let out = tool
            .execute(json!({"command": "whoami", "reasoning": "comprobar usuario"}), &ctx)
            .await
            .unwrap();
        assert!(out.success);
        assert_eq!(out.data["output"], "root");
        let markup = out.markup.unwrap();
        assert!(markup.contains("SIMULATION MODE"));
        assert!(markup.contains("root@srv-01"));
        assert!(tool
            .system_hint(&AgentConfiguration::default())
            .unwrap()
            .contains("(SIMULADO) al servidor srv-01"));
    }

    #[tokio::test]
    async fn test_disconnected_bridge_reports_error() {
        let tool = SshTool::new(Arc::new(DisconnectedShell), "prod", true);
        let ctx = ToolContext::new(Arc::new(AgentConfiguration::default()));
        let out = tool
            .execute(json!({"command": "ls", "reasoning": "listar"}), &ctx)
            .await
            .unwrap();
        assert_eq!(out.data["output"], NO_BRIDGE_ERROR);
    }

    #[test]
    fn test_bridge_message_wire_format() {
        let v = serde_json::to_value(BridgeMessage::Exec {
            command: "uptime".into(),
        })
        .unwrap();
        assert_eq!(v, json!({"type": "EXEC", "command": "uptime"}));
        let out: BridgeMessage =
            serde_json::from_str(r#"{"type":"OUTPUT","content":"ok\n"}"#).unwrap();
        assert_eq!(out, BridgeMessage::Output { content: "ok\n".into() });
    }
}
