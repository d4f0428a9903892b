use std::fmt::Write as _;

use tracing::info;

use super::TransferOrchestrator;
use crate::registry::{TransferDirection, TransferSnapshot, TransferStatus};
use crate::types::{FsError, FsResult};

impl TransferOrchestrator {
    /// Human-readable listing of every tracked transfer
    pub async fn status(&self) -> String {
        format_status(&self.registry.list().await)
    }

    /// Stop a tracked transfer and forget it.
    ///
    /// Unknown pids fail with `ProcessNotFound` and touch nothing, so
    /// cancelling twice reports the second call as not found.
    pub async fn cancel(&self, pid: u32) -> FsResult<String> {
        let process = self
            .registry
            .get(pid)
            .await
            .ok_or(FsError::ProcessNotFound(pid))?;

        process.set_status(TransferStatus::Cancelled);
        process.terminate(false);
        self.registry.remove_if_same(pid, &process).await;

        info!(pid, direction = %process.direction(), "Transfer cancelled");
        Ok(format!("Transfer with PID {pid} has been cancelled."))
    }
}

fn format_status(transfers: &[TransferSnapshot]) -> String {
    if transfers.is_empty() {
        return "No active transfers.".to_string();
    }

    let mut out = String::from("Active transfers:\n");
    for t in transfers {
        let _ = writeln!(out);
        let _ = writeln!(out, "PID: {}", t.pid);
        let _ = writeln!(out, "  Direction: {}", t.direction);
        let _ = writeln!(out, "  Status: {}", t.status);
        let label = match t.direction {
            TransferDirection::Send => "File",
            TransferDirection::Receive => "Output dir",
        };
        let _ = writeln!(out, "  {}: {}", label, t.target.display());
        if let Some(code) = &t.code {
            let _ = writeln!(out, "  Code: {code}");
        }
        let _ = writeln!(out, "  Started: {}", t.started_at.to_rfc3339());
        let _ = writeln!(out, "  Elapsed: {}s", t.elapsed_secs());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::path::PathBuf;

    #[test]
    fn test_empty_status() {
        assert_eq!(format_status(&[]), "No active transfers.");
    }

    #[test]
    fn test_status_lists_each_transfer() {
        let transfers = vec![
            TransferSnapshot {
                pid: 101,
                direction: TransferDirection::Send,
                status: TransferStatus::WaitingForReceiver,
                target: PathBuf::from("/data/report.pdf"),
                code: Some("abc123defg".to_string()),
                started_at: Utc::now(),
            },
            TransferSnapshot {
                pid: 202,
                direction: TransferDirection::Receive,
                status: TransferStatus::Receiving,
                target: PathBuf::from("/data/inbox"),
                code: None,
                started_at: Utc::now(),
            },
        ];

        let out = format_status(&transfers);
        assert!(out.contains("PID: 101"));
        assert!(out.contains("Status: waiting_for_receiver"));
        assert!(out.contains("File: /data/report.pdf"));
        assert!(out.contains("Code: abc123defg"));
        assert!(out.contains("PID: 202"));
        assert!(out.contains("Output dir: /data/inbox"));
        assert_eq!(out.matches("Code:").count(), 1);
    }
}
