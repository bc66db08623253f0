//! Execution service
//!
//! Runs one pipeline's external script as a child process:
//! - Builds the command line from the pipeline's script kind
//! - Collects stdout and stderr while the child runs
//! - Stops the child on cancellation or timeout
//!
//! The service knows nothing about pipeline state; the engine turns the
//! returned [`ExecutionOutcome`] into a status, a health signal and a log
//! line.

use async_trait::async_trait;
use pipeterm_core::domain::log::LogEntry;
use pipeterm_core::domain::pipeline::{PipelineStatus, ScriptKind};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;

/// How long to wait for output pipes to close after killing a child
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// What to run
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub pipeline_id: u64,
    pub pipeline_name: String,
    pub script: ScriptKind,
}

/// How an execution ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Succeeded { output: String },
    Failed { error: String, output: String },
    Canceled { output: String },
    TimedOut { after: Duration, output: String },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Terminal status the pipeline moves to
    pub fn status(&self) -> PipelineStatus {
        match self {
            Self::Succeeded { .. } => PipelineStatus::Completed,
            Self::Failed { .. } | Self::TimedOut { .. } => PipelineStatus::Failed,
            Self::Canceled { .. } => PipelineStatus::Canceled,
        }
    }

    /// Health signal the outcome carries; a canceled run says nothing
    /// about the pipeline's health
    pub fn execution_healthy(&self) -> Option<bool> {
        match self {
            Self::Succeeded { .. } => Some(true),
            Self::Failed { .. } | Self::TimedOut { .. } => Some(false),
            Self::Canceled { .. } => None,
        }
    }

    /// Combined stdout then stderr of the child
    pub fn output(&self) -> &str {
        match self {
            Self::Succeeded { output }
            | Self::Failed { output, .. }
            | Self::Canceled { output }
            | Self::TimedOut { output, .. } => output,
        }
    }

    /// Convert the outcome into the log line recorded on the pipeline
    pub fn to_log_entry(&self) -> LogEntry {
        let output = self.output().trim();
        let with_output = |message: String| {
            if output.is_empty() {
                message
            } else {
                format!("{}\nOutput: {}", message, output)
            }
        };

        match self {
            Self::Succeeded { .. } => {
                LogEntry::info(with_output("Pipeline executed successfully".to_string()))
            }
            Self::Failed { error, .. } => {
                LogEntry::error(with_output(format!("Pipeline execution failed: {}", error)))
            }
            Self::TimedOut { after, .. } => LogEntry::error(with_output(format!(
                "Pipeline execution failed: timed out after {}s",
                after.as_secs()
            ))),
            Self::Canceled { .. } => LogEntry::warning(with_output(
                "Pipeline execution canceled".to_string(),
            )),
        }
    }
}

/// Service trait for executing pipelines
#[async_trait]
pub trait ExecutionService: Send + Sync {
    /// Runs the pipeline to completion
    ///
    /// Must return promptly once `cancel` fires, reporting
    /// [`ExecutionOutcome::Canceled`].
    async fn execute(&self, request: ExecutionRequest, cancel: CancellationToken)
    -> ExecutionOutcome;
}

/// Runs pipelines as `<interpreter> <script> [user path]`
///
/// Built-in pipelines run the built-in script; custom pipelines run the
/// custom runner script with the user's script path as its argument.
#[derive(Debug, Clone)]
pub struct ScriptExecutionService {
    interpreter: String,
    builtin_script: PathBuf,
    custom_runner_script: PathBuf,
    timeout: Option<Duration>,
}

enum Ended {
    Exited(std::io::Result<ExitStatus>),
    Canceled,
    TimedOut(Duration),
}

impl ScriptExecutionService {
    pub fn new(
        interpreter: impl Into<String>,
        builtin_script: impl Into<PathBuf>,
        custom_runner_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            interpreter: interpreter.into(),
            builtin_script: builtin_script.into(),
            custom_runner_script: custom_runner_script.into(),
            timeout: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.interpreter.clone(),
            config.builtin_script.clone(),
            config.custom_runner_script.clone(),
        )
        .with_timeout(config.execution_timeout)
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, script: &ScriptKind) -> Command {
        let mut cmd = Command::new(&self.interpreter);
        match script {
            ScriptKind::Builtin => {
                cmd.arg(&self.builtin_script);
            }
            ScriptKind::Custom { path } => {
                cmd.arg(&self.custom_runner_script).arg(path);
            }
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }
}

#[async_trait]
impl ExecutionService for ScriptExecutionService {
    async fn execute(
        &self,
        request: ExecutionRequest,
        cancel: CancellationToken,
    ) -> ExecutionOutcome {
        info!(
            pipeline_id = request.pipeline_id,
            "Executing pipeline '{}' ({})", request.pipeline_name, request.script
        );

        let mut child = match self.command(&request.script).spawn() {
            Ok(child) => child,
            Err(e) => {
                return ExecutionOutcome::Failed {
                    error: format!("failed to start {}: {}", self.interpreter, e),
                    output: String::new(),
                };
            }
        };

        let stdout = child.stdout.take().map(|s| tokio::spawn(read_all(s)));
        let stderr = child.stderr.take().map(|s| tokio::spawn(read_all(s)));

        let timeout = self.timeout;
        let deadline = async move {
            match timeout {
                Some(limit) => {
                    tokio::time::sleep(limit).await;
                    limit
                }
                None => std::future::pending().await,
            }
        };

        let ended = tokio::select! {
            status = child.wait() => Ended::Exited(status),
            _ = cancel.cancelled() => Ended::Canceled,
            limit = deadline => Ended::TimedOut(limit),
        };

        let killed = !matches!(ended, Ended::Exited(_));
        if killed {
            debug!(pipeline_id = request.pipeline_id, "Stopping child process");
            if let Err(e) = child.kill().await {
                warn!(pipeline_id = request.pipeline_id, "Failed to kill child: {}", e);
            }
        }

        let output = collect_output(stdout, stderr, killed).await;

        match ended {
            Ended::Exited(Ok(status)) if status.success() => ExecutionOutcome::Succeeded { output },
            Ended::Exited(Ok(status)) => ExecutionOutcome::Failed {
                error: describe_exit(status),
                output,
            },
            Ended::Exited(Err(e)) => ExecutionOutcome::Failed {
                error: format!("failed to wait for child: {}", e),
                output,
            },
            Ended::Canceled => ExecutionOutcome::Canceled { output },
            Ended::TimedOut(after) => ExecutionOutcome::TimedOut { after, output },
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(mut reader: R) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Err(e) = reader.read_to_end(&mut buf).await {
        debug!("Output stream closed with error: {}", e);
    }
    buf
}

/// Joins the reader tasks, stdout first
///
/// After a kill, grandchildren may still hold the pipes open, so the wait
/// is bounded and whatever did not arrive is dropped.
async fn collect_output(
    stdout: Option<JoinHandle<Vec<u8>>>,
    stderr: Option<JoinHandle<Vec<u8>>>,
    killed: bool,
) -> String {
    let mut combined = Vec::new();
    for reader in [stdout, stderr].into_iter().flatten() {
        let bytes = if killed {
            let abort = reader.abort_handle();
            match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, reader).await {
                Ok(joined) => joined.ok(),
                Err(_) => {
                    abort.abort();
                    None
                }
            }
        } else {
            reader.await.ok()
        };
        combined.extend(bytes.unwrap_or_default());
    }
    String::from_utf8_lossy(&combined).into_owned()
}

fn describe_exit(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit status {}", code),
        None => "terminated by signal".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_mapping() {
        let ok = ExecutionOutcome::Succeeded {
            output: String::new(),
        };
        assert_eq!(ok.status(), PipelineStatus::Completed);
        assert_eq!(ok.execution_healthy(), Some(true));

        let failed = ExecutionOutcome::Failed {
            error: "exit status 1".into(),
            output: String::new(),
        };
        assert_eq!(failed.status(), PipelineStatus::Failed);
        assert_eq!(failed.execution_healthy(), Some(false));

        let timed_out = ExecutionOutcome::TimedOut {
            after: Duration::from_secs(5),
            output: String::new(),
        };
        assert_eq!(timed_out.status(), PipelineStatus::Failed);
        assert_eq!(timed_out.execution_healthy(), Some(false));

        let canceled = ExecutionOutcome::Canceled {
            output: String::new(),
        };
        assert_eq!(canceled.status(), PipelineStatus::Canceled);
        assert_eq!(canceled.execution_healthy(), None);
    }

    #[test]
    fn test_log_entry_includes_error_and_output() {
        let entry = ExecutionOutcome::Failed {
            error: "exit status 2".into(),
            output: "Traceback...\n".into(),
        }
        .to_log_entry();

        assert_eq!(
            entry.message,
            "Pipeline execution failed: exit status 2\nOutput: Traceback..."
        );
        assert_eq!(entry.level, pipeterm_core::domain::log::LogLevel::Error);
    }

    #[test]
    fn test_log_entry_without_output() {
        let entry = ExecutionOutcome::Succeeded {
            output: "  \n".into(),
        }
        .to_log_entry();
        assert_eq!(entry.message, "Pipeline executed successfully");
    }

    #[test]
    fn test_command_line() {
        let service = ScriptExecutionService::new("python3", "/s/ingest.py", "/s/byod.py");

        let builtin = service.command(&ScriptKind::Builtin);
        let args: Vec<_> = builtin.as_std().get_args().collect();
        assert_eq!(builtin.as_std().get_program(), "python3");
        assert_eq!(args, vec!["/s/ingest.py"]);

        let custom = service.command(&ScriptKind::Custom {
            path: "/home/me/job.py".into(),
        });
        let args: Vec<_> = custom.as_std().get_args().collect();
        assert_eq!(args, vec!["/s/byod.py", "/home/me/job.py"]);
    }

    #[cfg(unix)]
    mod unix {
        use super::*;
        use std::io::Write;

        fn script(body: &str) -> tempfile::NamedTempFile {
            let mut file = tempfile::NamedTempFile::new().unwrap();
            writeln!(file, "{}", body).unwrap();
            file
        }

        fn request() -> ExecutionRequest {
            ExecutionRequest {
                pipeline_id: 1,
                pipeline_name: "test".into(),
                script: ScriptKind::Builtin,
            }
        }

        #[tokio::test]
        async fn test_success_collects_stdout_then_stderr() {
            let file = script("echo out; echo err 1>&2");
            let service = ScriptExecutionService::new("sh", file.path(), "/unused");

            let outcome = service.execute(request(), CancellationToken::new()).await;
            assert_eq!(
                outcome,
                ExecutionOutcome::Succeeded {
                    output: "out\nerr\n".into()
                }
            );
        }

        #[tokio::test]
        async fn test_nonzero_exit_fails() {
            let file = script("echo broken; exit 3");
            let service = ScriptExecutionService::new("sh", file.path(), "/unused");

            let outcome = service.execute(request(), CancellationToken::new()).await;
            assert_eq!(
                outcome,
                ExecutionOutcome::Failed {
                    error: "exit status 3".into(),
                    output: "broken\n".into()
                }
            );
        }

        #[tokio::test]
        async fn test_custom_script_receives_path() {
            let runner = script("echo \"running $1\"");
            let service = ScriptExecutionService::new("sh", "/unused", runner.path());

            let mut req = request();
            req.script = ScriptKind::Custom {
                path: "/data/job.py".into(),
            };
            let outcome = service.execute(req, CancellationToken::new()).await;
            assert_eq!(outcome.output(), "running /data/job.py\n");
        }

        #[tokio::test]
        async fn test_missing_interpreter_fails() {
            let service =
                ScriptExecutionService::new("/nonexistent/interpreter", "/unused", "/unused");

            let outcome = service.execute(request(), CancellationToken::new()).await;
            match outcome {
                ExecutionOutcome::Failed { error, .. } => {
                    assert!(error.contains("failed to start"))
                }
                other => panic!("expected failure, got {:?}", other),
            }
        }

        #[tokio::test]
        async fn test_timeout_kills_child() {
            let file = script("exec sleep 30");
            let service = ScriptExecutionService::new("sh", file.path(), "/unused")
                .with_timeout(Some(Duration::from_millis(200)));

            let started = std::time::Instant::now();
            let outcome = service.execute(request(), CancellationToken::new()).await;

            assert!(matches!(outcome, ExecutionOutcome::TimedOut { .. }));
            assert!(started.elapsed() < Duration::from_secs(10));
        }

        #[tokio::test]
        async fn test_cancel_kills_child() {
            let file = script("exec sleep 30");
            let service = ScriptExecutionService::new("sh", file.path(), "/unused");
            let cancel = CancellationToken::new();

            let trigger = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                trigger.cancel();
            });

            let started = std::time::Instant::now();
            let outcome = service.execute(request(), cancel).await;

            assert!(matches!(outcome, ExecutionOutcome::Canceled { .. }));
            assert!(started.elapsed() < Duration::from_secs(10));
        }
    }
}
