use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::supervisor::{self, ExitOutcome};
use super::TransferOrchestrator;
use crate::registry::{TransferDirection, TransferProcess, TransferStatus};
use crate::types::{FsError, FsResult, ReceiveResponse};

const MAX_CODE_LENGTH: usize = 256;

enum Wake {
    Exit(Option<ExitOutcome>),
    TimedOut,
    RequestCancelled,
}

impl TransferOrchestrator {
    /// Receive into `output_dir` (default: first allowed root) and block
    /// until the transfer binary exits.
    ///
    /// Ends early with `TransferTimeout` after the configured ceiling and
    /// with `TransferCancelled` when `request` fires or the pid is cancelled
    /// through [`TransferOrchestrator::cancel`]. The process is killed and
    /// evicted on every path, including when this future is dropped.
    #[instrument(skip(self, code, request))]
    pub async fn receive(
        &self,
        code: &str,
        output_dir: Option<&str>,
        request: CancellationToken,
    ) -> FsResult<ReceiveResponse> {
        validate_code(code)?;

        let destination = match output_dir.map(str::trim).filter(|d| !d.is_empty()) {
            Some(dir) => self.guard.validate_path(dir)?,
            None => self.guard.default_root().to_path_buf(),
        };
        let shown = destination.display().to_string();

        match tokio::fs::metadata(&destination).await {
            Ok(m) if m.is_dir() => {}
            Ok(_) => {
                return Err(FsError::OutputDirectoryInvalid(format!(
                    "{shown} is not a directory"
                )))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FsError::OutputDirectoryInvalid(format!(
                    "{shown} does not exist"
                )))
            }
            Err(e) => return Err(FsError::IoError(e)),
        }

        let args = [OsStr::new("--yes"), OsStr::new("--out"), destination.as_os_str()];
        let (mut child, pid) = supervisor::spawn(&self.config, &args, code, Some(&destination))?;

        let process = Arc::new(TransferProcess::new(
            pid,
            TransferDirection::Receive,
            destination.clone(),
            None,
            TransferStatus::Receiving,
        ));
        self.registry.add(pid, process.clone()).await;
        info!(pid, output_dir = %shown, "Transfer receive started");

        // Dropping this (caller went away) kills the child
        let kill_on_drop = process.cancellation_token().clone().drop_guard();

        let keep = self.config.output_tail_lines;
        let stdout = supervisor::drain_output(child.stdout.take(), process.clone(), None, keep);
        let stderr = supervisor::drain_output(child.stderr.take(), process.clone(), None, keep);
        let mut exit = supervisor::supervise(child, process.clone(), self.registry.clone());

        let timeout = Duration::from_secs(self.config.receive_timeout_secs);
        let wake = tokio::select! {
            outcome = &mut exit => Wake::Exit(outcome.ok()),
            _ = tokio::time::sleep(timeout) => Wake::TimedOut,
            _ = request.cancelled() => Wake::RequestCancelled,
        };

        let result = match wake {
            Wake::TimedOut => {
                process.cancellation_token().cancel();
                // Wait for the supervisor to reap the child
                let _ = exit.await;
                warn!(pid, timeout_secs = timeout.as_secs(), "Transfer receive timed out");
                Err(FsError::TransferTimeout(timeout.as_secs()))
            }
            Wake::RequestCancelled => {
                process.cancellation_token().cancel();
                let _ = exit.await;
                info!(pid, "Transfer receive abandoned by client");
                Err(FsError::TransferCancelled(
                    "request was cancelled by the client".to_string(),
                ))
            }
            Wake::Exit(Some(ExitOutcome::Exited(status))) if status.success() => {
                process.set_status(TransferStatus::Completed);
                let lines = supervisor::collect_tail(stdout).await;
                let message = if lines.is_empty() {
                    "File received".to_string()
                } else {
                    supervisor::join_lines(&lines)
                };
                info!(pid, output_dir = %shown, "Transfer receive completed");
                Ok(ReceiveResponse {
                    status: TransferStatus::Completed.to_string(),
                    message,
                    output_dir: shown,
                })
            }
            Wake::Exit(Some(ExitOutcome::Exited(status))) => {
                process.set_status(TransferStatus::Failed);
                let lines = supervisor::collect_tail(stderr).await;
                let status = supervisor::describe_exit(&status);
                warn!(pid, status = %status, "Transfer receive failed");
                Err(FsError::ExternalProcessFailed {
                    status,
                    stderr: supervisor::join_lines(&lines),
                })
            }
            Wake::Exit(Some(ExitOutcome::Killed)) => Err(FsError::TransferCancelled(format!(
                "transfer {pid} was cancelled"
            ))),
            Wake::Exit(Some(ExitOutcome::WaitFailed(e))) => {
                process.set_status(TransferStatus::Failed);
                Err(FsError::IoError(e))
            }
            Wake::Exit(None) => {
                process.set_status(TransferStatus::Failed);
                Err(FsError::IoError(std::io::Error::other(
                    "transfer supervisor stopped unexpectedly",
                )))
            }
        };

        let _ = kill_on_drop.disarm();
        self.registry.remove_if_same(pid, &process).await;
        result
    }
}

/// Codes travel through the environment, so only reject what no shell
/// environment can carry or what is clearly not a code
fn validate_code(code: &str) -> FsResult<()> {
    if code.trim().is_empty() {
        return Err(FsError::InvalidArgument("code must not be empty".to_string()));
    }
    if code.len() > MAX_CODE_LENGTH {
        return Err(FsError::InvalidArgument(format!(
            "code is longer than {MAX_CODE_LENGTH} characters"
        )));
    }
    if code.chars().any(char::is_control) {
        return Err(FsError::InvalidArgument(
            "code must not contain control characters".to_string(),
        ));
    }
    Ok(())
}
