//! Sink that runs a local download program

use super::traits::DownloadSink;
use crate::types::SubmissionId;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Runs `program [script] [args...] id1 id2 ...` once per batch
///
/// The default configuration is `python3 download.py`, where the script
/// resolves each submission and stores its media.
///
/// # Examples
///
/// ```no_run
/// use rippl::SubmissionId;
/// use rippl::sink::{CommandSink, DownloadSink};
/// use std::path::Path;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let sink = CommandSink::from_path(Path::new("python3"))
///     .expect("python3 not found in PATH")
///     .with_script(Some("download.py".into()));
///
/// sink.deliver(&[SubmissionId::from("abc123")]).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CommandSink {
    program: PathBuf,
    script: Option<PathBuf>,
    args: Vec<String>,
}

impl CommandSink {
    /// Create a sink running an explicit program path
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            script: None,
            args: Vec::new(),
        }
    }

    /// Resolve `program` through PATH
    ///
    /// Returns `None` if the program cannot be found.
    pub fn from_path(program: &Path) -> Option<Self> {
        which::which(program).ok().map(Self::new)
    }

    /// Script passed as the first argument
    pub fn with_script(mut self, script: Option<PathBuf>) -> Self {
        self.script = script;
        self
    }

    /// Extra arguments placed before the identifiers
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Program that will be executed
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn command(&self, batch: &[SubmissionId]) -> Command {
        let mut cmd = Command::new(&self.program);
        if let Some(script) = &self.script {
            cmd.arg(script);
        }
        cmd.args(&self.args);
        cmd.args(batch.iter().map(SubmissionId::as_str));
        cmd.kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl DownloadSink for CommandSink {
    async fn deliver(&self, batch: &[SubmissionId]) -> crate::Result<()> {
        tracing::info!(
            program = %self.program.display(),
            batch_size = batch.len(),
            "Running download command"
        );

        let output = self.command(batch).output().await.map_err(|e| {
            crate::Error::ExternalTool(format!(
                "failed to execute {}: {}",
                self.program.display(),
                e
            ))
        })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        let combined = combined.trim();
        if !combined.is_empty() {
            tracing::info!(output = %combined, "Download command output");
        }

        if output.status.success() {
            Ok(())
        } else {
            Err(crate::Error::ExternalTool(format!(
                "{} exited with {}",
                self.program.display(),
                output.status
            )))
        }
    }

    fn name(&self) -> &'static str {
        "command"
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write_script(dir: &TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("download.sh");
        std::fs::write(&path, body).unwrap();
        path
    }

    fn batch(ids: &[&str]) -> Vec<SubmissionId> {
        ids.iter().map(|id| SubmissionId::from(*id)).collect()
    }

    #[tokio::test]
    async fn passes_script_args_and_ids_in_order() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("args.txt");
        let script = write_script(
            &dir,
            &format!("printf '%s\\n' \"$@\" > '{}'\n", out.display()),
        );

        let sink = CommandSink::new(PathBuf::from("sh"))
            .with_script(Some(script))
            .with_args(vec!["--flag".into()]);
        sink.deliver(&batch(&["a1", "b2", "c3"])).await.unwrap();

        let written = std::fs::read_to_string(&out).unwrap();
        assert_eq!(written.lines().collect::<Vec<_>>(), ["--flag", "a1", "b2", "c3"]);
    }

    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "echo boom >&2\nexit 3\n");

        let sink = CommandSink::new(PathBuf::from("sh")).with_script(Some(script));
        let err = sink.deliver(&batch(&["a1"])).await.unwrap_err();
        assert!(matches!(err, crate::Error::ExternalTool(msg) if msg.contains("exited")));
    }

    #[tokio::test]
    async fn missing_program_is_an_external_tool_error() {
        let sink = CommandSink::new(PathBuf::from("/nonexistent/rippl-download-xyz"));
        let err = sink.deliver(&batch(&["a1"])).await.unwrap_err();
        assert!(matches!(err, crate::Error::ExternalTool(msg) if msg.contains("failed to execute")));
    }

    #[test]
    fn from_path_returns_none_for_unknown_program() {
        assert!(CommandSink::from_path(Path::new("nonexistent-rippl-binary-xyz")).is_none());
    }

    #[test]
    fn from_path_resolves_sh() {
        let sink = CommandSink::from_path(Path::new("sh")).expect("sh should be on PATH");
        assert!(sink.program().is_absolute());
    }
}
