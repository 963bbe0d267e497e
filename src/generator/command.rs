//! Generator backed by an LLM command-line tool.
//!
//! Each call spawns `<command> <args...>`, writes the prompt to stdin and
//! takes the first JSON value printed on stdout as the answer.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use super::{
    ComposeRequest, Draft, Generator, InstructionRequest, JudgeRequest, PlanRequest,
    RepairRequest, ReviseRequest, StructureRequest, prompts,
};
use crate::util::extract_json_value;

/// How to reach the LLM CLI.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub command: String,
    pub args: Vec<String>,
    pub timeout: Duration,
    pub working_dir: Option<PathBuf>,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            command: "claude".to_string(),
            args: vec!["--print".to_string()],
            timeout: Duration::from_secs(300),
            working_dir: None,
        }
    }
}

pub struct CommandGenerator {
    settings: GeneratorSettings,
}

impl CommandGenerator {
    pub fn new(settings: GeneratorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &GeneratorSettings {
        &self.settings
    }

    /// Run the command once and return everything it printed.
    async fn run(&self, prompt: &str) -> Result<String> {
        let mut cmd = Command::new(&self.settings.command);
        cmd.args(&self.settings.args);

        if let Some(ref working_dir) = self.settings.working_dir {
            cmd.current_dir(working_dir);
        }

        cmd.stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn generator command '{}'", self.settings.command))?;

        let exchange = async {
            if let Some(mut stdin) = child.stdin.take() {
                stdin
                    .write_all(prompt.as_bytes())
                    .await
                    .context("Failed to write prompt to stdin")?;
                stdin.shutdown().await.context("Failed to close stdin")?;
            }

            let mut output = String::new();
            if let Some(mut stdout) = child.stdout.take() {
                stdout
                    .read_to_string(&mut output)
                    .await
                    .context("Failed to read generator output")?;
            }

            let status = child.wait().await.context("Failed to wait for generator process")?;
            anyhow::Ok((status, output))
        };

        let (status, output) = tokio::time::timeout(self.settings.timeout, exchange)
            .await
            .with_context(|| {
                format!(
                    "Generator timed out after {}s",
                    self.settings.timeout.as_secs()
                )
            })??;

        if !status.success() {
            bail!(
                "Generator process exited with code {}",
                status.code().unwrap_or(-1)
            );
        }

        Ok(output)
    }

    /// Run a prompt and parse the first JSON value in the reply.
    async fn call_json(&self, label: &str, prompt: String) -> Result<Value> {
        debug!(call = label, prompt_chars = prompt.len(), "calling generator");
        let output = self.run(&prompt).await?;
        let json = extract_json_value(&output)
            .with_context(|| format!("{} reply contained no JSON value", label))?;
        let value: Value = serde_json::from_str(&json)
            .with_context(|| format!("{} reply contained invalid JSON", label))?;
        debug!(call = label, reply_chars = json.len(), "generator replied");
        Ok(value)
    }
}

#[async_trait]
impl Generator for CommandGenerator {
    async fn design_structure(&self, request: &StructureRequest<'_>) -> Result<Value> {
        self.call_json("design_structure", prompts::design_structure(request))
            .await
    }

    async fn plan_composition(&self, request: &PlanRequest<'_>) -> Result<Value> {
        self.call_json("plan_composition", prompts::plan_composition(request))
            .await
    }

    async fn write_instruction(&self, request: &InstructionRequest<'_>) -> Result<Value> {
        self.call_json("write_instruction", prompts::write_instruction(request))
            .await
    }

    async fn compose(&self, request: &ComposeRequest<'_>) -> Result<Draft> {
        self.call_json("compose", prompts::compose(request)).await
    }

    async fn repair(&self, request: &RepairRequest<'_>) -> Result<Draft> {
        self.call_json("repair", prompts::repair(request)).await
    }

    async fn revise(&self, request: &ReviseRequest<'_>) -> Result<Draft> {
        self.call_json("revise", prompts::revise(request)).await
    }

    async fn judge(&self, request: &JudgeRequest<'_>) -> Result<Value> {
        self.call_json("judge", prompts::judge(request)).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::generator::DraftDefect;

    fn shell(script: &str, timeout: Duration) -> CommandGenerator {
        CommandGenerator::new(GeneratorSettings {
            command: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout,
            working_dir: None,
        })
    }

    fn judge_request<'a>(instruments: &'a [String], score: &'a Value) -> JudgeRequest<'a> {
        JudgeRequest {
            criteria: &["harmonic variety"],
            score,
            instruments,
        }
    }

    #[test]
    fn test_default_settings_use_claude_print() {
        let settings = GeneratorSettings::default();
        assert_eq!(settings.command, "claude");
        assert_eq!(settings.args, vec!["--print"]);
        assert_eq!(settings.timeout, Duration::from_secs(300));
    }

    #[tokio::test]
    async fn test_extracts_json_from_chatty_output() {
        let generator = shell(
            r#"cat > /dev/null; printf 'Here you go:\n```json\n{"passed": true, "feedback": []}\n```\n'"#,
            Duration::from_secs(10),
        );
        let instruments = vec!["violin".to_string()];
        let score = Value::Null;
        let verdict = generator
            .judge(&judge_request(&instruments, &score))
            .await
            .unwrap();
        assert_eq!(verdict["passed"], true);
    }

    #[tokio::test]
    async fn test_bare_note_array_reply_is_kept_whole() {
        let generator = shell(
            r#"cat > /dev/null; printf 'Repaired:\n[{"pitch": "G3", "duration": 1.0, "technique": "arco"}, {"pitch": "A3", "duration": 1.0, "technique": "arco"}]\n'"#,
            Duration::from_secs(10),
        );
        let violin = crate::instruments::lookup("violin").unwrap();
        let defect = DraftDefect {
            kind: "empty_part".to_string(),
            message: "part has no notes".to_string(),
            note_index: None,
            offending_value: None,
        };
        let failed = serde_json::json!({"notes": []});
        let draft = generator
            .repair(&RepairRequest {
                profile: violin,
                defect: &defect,
                draft: &failed,
            })
            .await
            .unwrap();

        assert_eq!(draft.as_array().map(Vec::len), Some(2));
        let part = crate::score::Part::from_draft(&draft, violin).unwrap();
        assert_eq!(part.note_count(), 2);
    }

    #[tokio::test]
    async fn test_prompt_is_written_to_stdin() {
        let generator = shell(
            r#"if grep -q 'Score Evaluation'; then echo '{"seen": true}'; else echo '{"seen": false}'; fi"#,
            Duration::from_secs(10),
        );
        let instruments = vec!["violin".to_string()];
        let score = Value::Null;
        let reply = generator
            .judge(&judge_request(&instruments, &score))
            .await
            .unwrap();
        assert_eq!(reply["seen"], true);
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_an_error() {
        let generator = shell("cat > /dev/null; exit 3", Duration::from_secs(10));
        let instruments = vec!["violin".to_string()];
        let score = Value::Null;
        let err = generator
            .judge(&judge_request(&instruments, &score))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("exited with code 3"));
    }

    #[tokio::test]
    async fn test_reply_without_json_is_an_error() {
        let generator = shell("cat > /dev/null; echo 'I cannot help with that'", Duration::from_secs(10));
        let instruments = vec!["violin".to_string()];
        let score = Value::Null;
        let err = generator
            .judge(&judge_request(&instruments, &score))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no JSON value"));
    }

    #[tokio::test]
    async fn test_slow_generator_times_out() {
        let generator = shell("sleep 5", Duration::from_millis(200));
        let instruments = vec!["violin".to_string()];
        let score = Value::Null;
        let err = generator
            .judge(&judge_request(&instruments, &score))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
