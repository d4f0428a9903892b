use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{info, instrument, warn};

use super::supervisor::{self, ExitOutcome};
use super::{code, TransferOrchestrator};
use crate::registry::{ProcessRegistry, TransferDirection, TransferProcess, TransferStatus};
use crate::types::{FsError, FsResult, SendResponse};

impl TransferOrchestrator {
    /// Start sending `path` and return as soon as the process is registered.
    ///
    /// The process keeps running after this returns; its status moves to
    /// `transferring` when the receiver connects and to `completed` or
    /// `failed` on exit, after which it stays visible for the grace period.
    #[instrument(skip(self))]
    pub async fn send(&self, path: &str) -> FsResult<SendResponse> {
        let validated = self.guard.validate_path(path)?;

        let metadata = tokio::fs::metadata(&validated).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FsError::NotFound(path.to_string())
            } else {
                FsError::IoError(e)
            }
        })?;

        let filename = validated
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| validated.display().to_string());
        let size_bytes = if metadata.is_dir() {
            directory_size(&validated).await?
        } else {
            metadata.len()
        };

        let code = code::generate(self.config.code_length);
        let args = [OsStr::new("--yes"), OsStr::new("send"), validated.as_os_str()];
        let (mut child, pid) = supervisor::spawn(&self.config, &args, &code, None)?;

        let process = Arc::new(TransferProcess::new(
            pid,
            TransferDirection::Send,
            validated.clone(),
            Some(code.clone()),
            TransferStatus::WaitingForReceiver,
        ));
        // Registered before any output is read so the marker always finds it
        self.registry.add(pid, process.clone()).await;

        let marker = Some(self.config.transferring_marker.clone());
        let keep = self.config.output_tail_lines;
        // stdout only matters for the marker; its tail is dropped
        let _ = supervisor::drain_output(child.stdout.take(), process.clone(), marker.clone(), keep);
        let stderr = supervisor::drain_output(child.stderr.take(), process.clone(), marker, keep);
        let exit = supervisor::supervise(child, process.clone(), self.registry.clone());

        tokio::spawn(finish_send(
            exit,
            stderr,
            process,
            self.registry.clone(),
            Duration::from_secs(self.config.send_grace_secs),
        ));

        info!(pid, path = %validated.display(), size_bytes, "Transfer send started");

        Ok(SendResponse {
            code,
            status: TransferStatus::WaitingForReceiver.to_string(),
            filename,
            size_bytes,
            size_human: format_size(size_bytes),
            pid,
        })
    }
}

/// Record how a send ended, keep it visible for `grace`, then drop it
async fn finish_send(
    exit: oneshot::Receiver<ExitOutcome>,
    stderr: JoinHandle<Vec<String>>,
    process: Arc<TransferProcess>,
    registry: ProcessRegistry,
    grace: Duration,
) {
    let pid = process.pid();
    let final_status = match exit.await {
        Ok(ExitOutcome::Exited(status)) if status.success() => {
            info!(pid, "Transfer send completed");
            TransferStatus::Completed
        }
        Ok(ExitOutcome::Exited(status)) => {
            let stderr = supervisor::collect_tail(stderr).await;
            warn!(
                pid,
                status = %supervisor::describe_exit(&status),
                stderr = %supervisor::join_lines(&stderr),
                "Transfer send failed"
            );
            TransferStatus::Failed
        }
        Ok(ExitOutcome::WaitFailed(e)) => {
            warn!(pid, error = %e, "Lost track of transfer send");
            TransferStatus::Failed
        }
        // Killed: the supervisor already evicted the entry
        Ok(ExitOutcome::Killed) | Err(_) => return,
    };

    if process.status() != TransferStatus::Cancelled {
        process.set_status(final_status);
    }

    tokio::time::sleep(grace).await;
    registry.remove_if_same(pid, &process).await;
}

/// Total size of regular files under `root`, without following links
async fn directory_size(root: &Path) -> FsResult<u64> {
    let mut total = 0u64;
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let metadata = match tokio::fs::symlink_metadata(entry.path()).await {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.is_dir() {
                pending.push(entry.path());
            } else if metadata.is_file() {
                total += metadata.len();
            }
        }
    }

    Ok(total)
}

/// Byte count with two decimals in the largest fitting unit (`1.50 KB`)
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];
    const UNIT: f64 = 1024.0;

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64 / UNIT;
    let mut unit = 0;
    while value >= UNIT && unit < UNITS.len() - 1 {
        value /= UNIT;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}
