use crate::error::{AgentError, Result};
use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::sync::OnceLock;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

const LIST_MODELS_TIMEOUT: Duration = Duration::from_secs(10);

/// Produces candidate SQL for a natural-language request.
#[async_trait]
pub trait SqlGenerator: Send + Sync {
    async fn generate(&self, prompt: &str, schema: &str) -> Result<String>;

    /// Short name reported by the status endpoint.
    fn name(&self) -> &str;
}

pub fn build_prompt(prompt: &str, schema: &str) -> String {
    format!(
        "You are an expert SQLite SQL generator.\n\
         \n\
         Database schema:\n\
         {schema}\n\
         \n\
         Rules:\n\
         - Use existing tables only\n\
         - SELECT only\n\
         - SQLite syntax\n\
         - No explanation\n\
         - Output only SQL\n\
         \n\
         User request:\n\
         {prompt}\n"
    )
}

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)```[a-z]*\s*\n?(.*?)```").expect("static regex"))
}

/// Trims generator output and unwraps a markdown code fence if present.
pub fn extract_sql(output: &str) -> Result<String> {
    let text = output.trim();
    let text = match fence_re().captures(text) {
        Some(caps) => caps.get(1).map_or(text, |m| m.as_str()).trim(),
        None => text,
    };
    if text.is_empty() {
        return Err(AgentError::GenerationFailure(
            "generator returned empty output".to_string(),
        ));
    }
    Ok(text.to_string())
}

/// Runs an external program with the rendered prompt on stdin and reads the
/// SQL from stdout, e.g. `ollama run llama3`.
#[derive(Debug, Clone)]
pub struct CommandGenerator {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandGenerator {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            timeout,
        }
    }

    async fn run(&self, input: String) -> Result<String> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentError::GenerationFailure(format!("{}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A generator that ignores stdin may close it early.
            if let Err(e) = stdin.write_all(input.as_bytes()).await {
                debug!(error = %e, "generator closed stdin");
            }
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| AgentError::GenerationFailure(e.to_string()))?;

        if !output.status.success() {
            return Err(AgentError::GenerationFailure(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl SqlGenerator for CommandGenerator {
    async fn generate(&self, prompt: &str, schema: &str) -> Result<String> {
        let input = build_prompt(prompt, schema);
        let out = tokio::time::timeout(self.timeout, self.run(input))
            .await
            .map_err(|_| {
                AgentError::GenerationFailure(format!(
                    "{} timed out after {}s",
                    self.program,
                    self.timeout.as_secs()
                ))
            })??;
        debug!(raw = %out.trim(), "generator output");
        extract_sql(&out)
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Output of `<program> list`, e.g. the locally installed models.
pub async fn list_models(program: &str) -> Result<String> {
    let run = Command::new(program)
        .arg("list")
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .output();
    let output = tokio::time::timeout(LIST_MODELS_TIMEOUT, run)
        .await
        .map_err(|_| AgentError::GenerationFailure(format!("{program} list timed out")))?
        .map_err(|e| AgentError::GenerationFailure(format!("{program} is not available: {e}")))?;

    if !output.status.success() {
        return Err(AgentError::GenerationFailure(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
