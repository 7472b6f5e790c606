//! Advisor backends

use async_trait::async_trait;
use std::collections::VecDeque;
use std::process::{Output, Stdio};
use std::sync::Mutex;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::AdvisorError;

/// Takes a prompt, returns the advisor's raw reply text
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Advisor: Send + Sync {
    async fn consult(&self, prompt: &str) -> Result<String, AdvisorError>;
}

/// Runs an external command, feeding the prompt on stdin and reading the
/// reply from stdout. The child is killed when the timeout fires.
#[derive(Debug, Clone)]
pub struct ProcessAdvisor {
    command: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessAdvisor {
    pub fn new(command: impl Into<String>, args: Vec<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            args,
            timeout,
        }
    }
}

#[async_trait]
impl Advisor for ProcessAdvisor {
    async fn consult(&self, prompt: &str) -> Result<String, AdvisorError> {
        let mut cmd = Command::new(&self.command);
        cmd.args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|source| AdvisorError::Spawn {
            command: self.command.clone(),
            source,
        })?;
        // a child that never drains stdin must not outlive the timeout
        let exchange = async move {
            if let Some(mut stdin) = child.stdin.take() {
                stdin.write_all(prompt.as_bytes()).await?;
                stdin.shutdown().await?;
            }
            child.wait_with_output().await
        };
        let output: Output = tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| AdvisorError::Timeout(self.timeout))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdvisorError::Unavailable(format!(
                "{} exited with {}: {}",
                self.command,
                output.status,
                stderr.trim()
            )));
        }
        debug!(command = %self.command, bytes = output.stdout.len(), "🔮 Advisor replied");
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Replays canned replies in order; used for offline runs and tests
#[derive(Debug, Default)]
pub struct ScriptedAdvisor {
    replies: Mutex<VecDeque<String>>,
}

impl ScriptedAdvisor {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
        }
    }

    pub fn remaining(&self) -> usize {
        match self.replies.lock() {
            Ok(g) => g.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn consult(&self, _prompt: &str) -> Result<String, AdvisorError> {
        let next = match self.replies.lock() {
            Ok(mut g) => g.pop_front(),
            Err(poisoned) => poisoned.into_inner().pop_front(),
        };
        next.ok_or_else(|| AdvisorError::Unavailable("script exhausted".to_string()))
    }
}

/// Always unavailable; the default when no advisor is configured
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledAdvisor;

#[async_trait]
impl Advisor for DisabledAdvisor {
    async fn consult(&self, _prompt: &str) -> Result<String, AdvisorError> {
        Err(AdvisorError::Unavailable("advisor disabled".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_advisor_replays_then_runs_dry() {
        let advisor = ScriptedAdvisor::new(["first", "second"]);
        assert_eq!(advisor.consult("p").await.unwrap(), "first");
        assert_eq!(advisor.remaining(), 1);
        assert_eq!(advisor.consult("p").await.unwrap(), "second");
        assert!(matches!(
            advisor.consult("p").await,
            Err(AdvisorError::Unavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_missing_binary_is_a_spawn_error() {
        let advisor = ProcessAdvisor::new(
            "evoarena-no-such-advisor-binary",
            vec![],
            Duration::from_secs(1),
        );
        assert!(matches!(
            advisor.consult("p").await,
            Err(AdvisorError::Spawn { .. })
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_process_advisor_echoes_stdin() {
        let advisor = ProcessAdvisor::new("cat", vec![], Duration::from_secs(5));
        let reply = advisor.consult(r#"{"recommendation":"NO_ACTION"}"#).await.unwrap();
        assert!(reply.contains("NO_ACTION"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_slow_process_times_out() {
        let advisor = ProcessAdvisor::new(
            "sleep",
            vec!["5".to_string()],
            Duration::from_millis(100),
        );
        assert!(matches!(
            advisor.consult("").await,
            Err(AdvisorError::Timeout(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_child_ignoring_stdin_times_out_on_large_prompt() {
        let advisor = ProcessAdvisor::new(
            "sleep",
            vec!["30".to_string()],
            Duration::from_millis(200),
        );
        // well past any pipe buffer
        let prompt = "x".repeat(4 * 1024 * 1024);
        let started = std::time::Instant::now();
        assert!(matches!(
            advisor.consult(&prompt).await,
            Err(AdvisorError::Timeout(_))
        ));
        assert!(started.elapsed() < Duration::from_secs(10));
    }
}
