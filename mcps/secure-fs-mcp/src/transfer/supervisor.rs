//! Spawning and supervising the transfer binary

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::registry::{ProcessRegistry, TransferProcess, TransferStatus};
use crate::types::{FsError, FsResult, TransferConfig};

/// How long to wait for output readers after the child is gone
const TAIL_WAIT: Duration = Duration::from_secs(2);

/// Longest output line kept; the rest of an overlong line is dropped
const MAX_LINE: usize = 4096;

/// How a supervised child ended
#[derive(Debug)]
pub(crate) enum ExitOutcome {
    Exited(ExitStatus),
    /// Killed because its cancellation token fired
    Killed,
    WaitFailed(std::io::Error),
}

/// Spawn `<binary> <global_args…> <args…>` with the code in the secret
/// environment variable. The code never appears in argv.
pub(crate) fn spawn(
    config: &TransferConfig,
    args: &[&OsStr],
    code: &str,
    cwd: Option<&Path>,
) -> FsResult<(Child, u32)> {
    let mut cmd = Command::new(&config.binary);
    cmd.args(&config.global_args)
        .args(args)
        .env(&config.secret_env, code)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }

    let child = cmd.spawn().map_err(|e| {
        warn!(binary = %config.binary, error = %e, "Failed to spawn transfer binary");
        FsError::ProcessStart(e)
    })?;

    let pid = child.id().ok_or_else(|| {
        FsError::ProcessStart(std::io::Error::other(
            "process exited before it could be tracked",
        ))
    })?;

    Ok((child, pid))
}

/// Read `stream` line by line until EOF, keeping the last `keep` lines.
/// Progress redraws end in `\r`, so that counts as a line break too.
///
/// With a marker, the first line containing it moves the process from
/// waiting to transferring.
pub(crate) fn drain_output<R>(
    stream: Option<R>,
    process: Arc<TransferProcess>,
    marker: Option<String>,
    keep: usize,
) -> JoinHandle<Vec<String>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let Some(stream) = stream else {
            return Vec::new();
        };
        let mut reader = BufReader::new(stream);
        let mut tail: VecDeque<String> = VecDeque::with_capacity(keep);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match read_line_capped(&mut reader, &mut buf).await {
                Ok(false) => break,
                Ok(true) => {
                    let line = String::from_utf8_lossy(&buf).trim_end().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    if let Some(marker) = marker.as_deref() {
                        if line.contains(marker)
                            && process.advance(
                                TransferStatus::WaitingForReceiver,
                                TransferStatus::Transferring,
                            )
                        {
                            debug!(pid = process.pid(), "Receiver connected");
                        }
                    }
                    if keep > 0 {
                        if tail.len() == keep {
                            tail.pop_front();
                        }
                        tail.push_back(line);
                    }
                }
                Err(e) => {
                    debug!(pid = process.pid(), error = %e, "Stopped reading transfer output");
                    break;
                }
            }
        }

        tail.into()
    })
}

/// Read up to the next `\n` or `\r` into `buf`, storing at most
/// [`MAX_LINE`] bytes. Returns `false` at EOF when nothing was read.
async fn read_line_capped<R>(reader: &mut BufReader<R>, buf: &mut Vec<u8>) -> std::io::Result<bool>
where
    R: AsyncRead + Unpin,
{
    let mut read_any = false;
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(read_any);
        }
        read_any = true;

        let end = available.iter().position(|b| *b == b'\n' || *b == b'\r');
        let chunk = &available[..end.unwrap_or(available.len())];
        let room = MAX_LINE.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);

        let used = end.map_or(available.len(), |i| i + 1);
        reader.consume(used);
        if end.is_some() {
            return Ok(true);
        }
    }
}

/// Collect an output tail, giving up if the reader is still blocked
/// (e.g. a grandchild holds the pipe open)
pub(crate) async fn collect_tail(handle: JoinHandle<Vec<String>>) -> Vec<String> {
    match tokio::time::timeout(TAIL_WAIT, handle).await {
        Ok(Ok(lines)) => lines,
        _ => Vec::new(),
    }
}

/// Own the child until it exits. Firing the process's cancellation token
/// kills and reaps it, and evicts the registry entry if it is still there.
pub(crate) fn supervise(
    mut child: Child,
    process: Arc<TransferProcess>,
    registry: ProcessRegistry,
) -> oneshot::Receiver<ExitOutcome> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let token = process.cancellation_token().clone();
        let outcome = tokio::select! {
            status = child.wait() => match status {
                Ok(status) => ExitOutcome::Exited(status),
                Err(e) => ExitOutcome::WaitFailed(e),
            },
            _ = token.cancelled() => {
                if let Err(e) = child.kill().await {
                    warn!(pid = process.pid(), error = %e, "Failed to kill transfer process");
                }
                ExitOutcome::Killed
            }
        };
        process.mark_exited();

        if matches!(outcome, ExitOutcome::Killed) {
            process.set_status(TransferStatus::Cancelled);
            registry.remove_if_same(process.pid(), &process).await;
        }

        let _ = tx.send(outcome);
    });
    rx
}

/// Human-readable exit description for error messages
pub(crate) fn describe_exit(status: &ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("exit code {code}");
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("killed by signal {signal}");
        }
    }
    "unknown exit status".to_string()
}

pub(crate) fn join_lines(lines: &[String]) -> String {
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::TransferDirection;
    use std::path::PathBuf;

    async fn lines_of(input: &[u8]) -> Vec<String> {
        let mut reader = BufReader::new(input);
        let mut buf = Vec::new();
        let mut lines = Vec::new();
        loop {
            buf.clear();
            if !read_line_capped(&mut reader, &mut buf).await.unwrap() {
                break;
            }
            lines.push(String::from_utf8_lossy(&buf).to_string());
        }
        lines
    }

    #[tokio::test]
    async fn test_carriage_return_ends_a_line() {
        let lines = lines_of(b"10%\r55%\rdone\nlast").await;
        assert_eq!(lines, vec!["10%", "55%", "done", "last"]);
    }

    #[tokio::test]
    async fn test_overlong_line_is_capped() {
        let mut input = vec![b'#'; MAX_LINE * 3];
        input.extend_from_slice(b"\nnext\n");

        let lines = lines_of(&input).await;
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].len(), MAX_LINE);
        assert_eq!(lines[1], "next");
    }

    #[tokio::test]
    async fn test_marker_inside_progress_redraws() {
        let process = Arc::new(TransferProcess::new(
            4242,
            TransferDirection::Send,
            PathBuf::from("/data/report.pdf"),
            None,
            TransferStatus::WaitingForReceiver,
        ));
        let output: &'static [u8] = b"  0% |    |\r  3% |    |\rSending 'report.pdf'\r 90% |### |";

        let tail = drain_output(Some(output), process.clone(), Some("Sending".to_string()), 2)
            .await
            .unwrap();

        assert_eq!(process.status(), TransferStatus::Transferring);
        assert_eq!(tail, vec!["Sending 'report.pdf'", " 90% |### |"]);
    }
}
