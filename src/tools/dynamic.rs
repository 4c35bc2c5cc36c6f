//! Script execution for synthesized tools
//!
//! Synthesized tools are plain scripts. The runner receives the tool input as
//! a JSON string in the first argument and treats stdout as the result.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::debug;

use crate::agent::{AgentError, AgentResult};
use super::{PersistedTool, ScriptDefinition, ToolOutput, ToolSpec};

pub const SUPPORTED_LANGUAGES: &[&str] = &["python", "shell", "node"];

/// Executes the code of a synthesized tool
#[async_trait]
pub trait ScriptRunner: Send + Sync {
    async fn run(&self, script: &ScriptDefinition, input: &Value) -> AgentResult<ToolOutput>;
}

/// Runs scripts as child processes with a wall-clock limit
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn command(script: &ScriptDefinition, input_json: String) -> Option<Command> {
        let mut cmd = match script.language.as_str() {
            "python" => {
                let mut c = Command::new("python3");
                c.arg("-c").arg(&script.code).arg(input_json);
                c
            }
            "node" => {
                let mut c = Command::new("node");
                c.arg("-e").arg(&script.code).arg(input_json);
                c
            }
            "shell" => {
                // $0 is the tool label, $1 the input
                let mut c = Command::new("sh");
                c.arg("-c").arg(&script.code).arg("tool").arg(input_json);
                c
            }
            _ => return None,
        };
        cmd.stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        Some(cmd)
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl ScriptRunner for ProcessRunner {
    async fn run(&self, script: &ScriptDefinition, input: &Value) -> AgentResult<ToolOutput> {
        let input_json = serde_json::to_string(input)?;
        let Some(mut cmd) = Self::command(script, input_json) else {
            return Ok(ToolOutput::failure(format!("Unsupported language: {}", script.language)));
        };

        debug!("Running {} script ({} bytes)", script.language, script.code.len());

        match timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code().unwrap_or(-1);

                if exit_code == 0 {
                    Ok(ToolOutput::success(json!({ "stdout": stdout, "stderr": stderr }), stdout))
                } else {
                    Ok(ToolOutput {
                        success: false,
                        data: json!({ "stdout": stdout, "stderr": stderr, "exit_code": exit_code }),
                        summary: format!("Script failed with exit code {}.\nError: {}", exit_code, stderr),
                        error: Some(stderr),
                    })
                }
            }
            Ok(Err(e)) => Err(AgentError::Tool(format!("Failed to spawn {} script: {}", script.language, e))),
            Err(_) => Ok(ToolOutput::failure(format!(
                "Script timed out after {}s",
                self.timeout.as_secs()
            ))),
        }
    }
}

/// Write a synthesized tool to `<dir>/<name>.json`
pub fn save_tool(dir: &Path, spec: &ToolSpec) -> anyhow::Result<Option<PathBuf>> {
    let Some(persisted) = PersistedTool::from_spec(spec) else {
        return Ok(None);
    };
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create tools dir {:?}", dir))?;
    let path = dir.join(format!("{}.json", spec.name));
    std::fs::write(&path, serde_json::to_string_pretty(&persisted)?)
        .with_context(|| format!("Failed to write tool metadata at {:?}", path))?;
    Ok(Some(path))
}

pub fn load_tool(path: &Path) -> anyhow::Result<ToolSpec> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tool metadata at {:?}", path))?;
    let persisted: PersistedTool = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse tool metadata at {:?}", path))?;
    Ok(persisted.into_spec())
}
