//! Transfer orchestration tests
//!
//! `/bin/sh -c <script> croc` stands in for the croc binary: the script sees
//! the same arguments and environment croc would. `exec` keeps the pid the
//! shell's own, so killing it leaves no orphan holding the pipes.

#![cfg(unix)]

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use secure_fs_mcp::{
    DirectoryGuard, FsError, ProcessRegistry, TransferConfig, TransferDirection,
    TransferOrchestrator, TransferStatus,
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const HANG: &str = "exec sleep 30";

struct Sandbox {
    _dir: TempDir,
    root: PathBuf,
    transfers: TransferOrchestrator,
}

impl Sandbox {
    fn new(script: &str) -> Self {
        Self::with(script, |_| {})
    }

    fn with(script: &str, tweak: impl FnOnce(&mut TransferConfig)) -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path().canonicalize().unwrap();
        let guard = Arc::new(DirectoryGuard::new(&[root.display().to_string()]).unwrap());

        let mut config = TransferConfig {
            binary: "/bin/sh".to_string(),
            global_args: vec!["-c".to_string(), script.to_string(), "croc".to_string()],
            ..TransferConfig::default()
        };
        tweak(&mut config);

        let transfers = TransferOrchestrator::new(guard, ProcessRegistry::new(), config);
        Self {
            _dir: dir,
            root,
            transfers,
        }
    }

    fn file(&self, name: &str, content: &str) -> String {
        let path = self.root.join(name);
        std::fs::write(&path, content).unwrap();
        path.display().to_string()
    }

    fn registry(&self) -> &ProcessRegistry {
        self.transfers.registry()
    }
}

/// Poll `check` until it holds or five seconds pass
async fn wait_until<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    false
}

async fn status_of(registry: &ProcessRegistry, pid: u32) -> Option<TransferStatus> {
    registry.get(pid).await.map(|p| p.status())
}

// ============================================================================
// send
// ============================================================================

#[tokio::test]
async fn send_returns_without_a_receiver() {
    let sandbox = Sandbox::new(HANG);
    let path = sandbox.file("report.pdf", "0123456789");

    let started = Instant::now();
    let response = sandbox.transfers.send(&path).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(2));

    assert_eq!(response.status, "waiting_for_receiver");
    assert_eq!(response.filename, "report.pdf");
    assert_eq!(response.size_bytes, 10);
    assert_eq!(response.size_human, "10 B");
    assert_eq!(response.code.len(), 10);

    let status = sandbox.transfers.status().await;
    assert!(status.contains(&format!("PID: {}", response.pid)));
    assert!(status.contains("waiting_for_receiver"));
    assert!(status.contains("report.pdf"));

    sandbox.transfers.cancel(response.pid).await.unwrap();
}

#[tokio::test]
async fn send_passes_code_through_environment_only() {
    let record = TempDir::new().unwrap();
    let d = record.path().display();
    let script = format!(
        "printf '%s' \"$CROC_SECRET\" > '{d}/secret'; \
         printf '%s\\n' \"$@\" > '{d}/args.tmp' && mv '{d}/args.tmp' '{d}/args'"
    );
    let sandbox = Sandbox::new(&script);
    let path = sandbox.file("notes.txt", "hello");

    let response = sandbox.transfers.send(&path).await.unwrap();
    let args_file = record.path().join("args");
    let written = &args_file;
    assert!(wait_until(|| async move { written.exists() }).await);

    let args = std::fs::read_to_string(&args_file).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args, vec!["--yes", "send", path.as_str()]);
    assert!(!args.iter().any(|a| a.contains(&response.code)));

    let secret = std::fs::read_to_string(record.path().join("secret")).unwrap();
    assert_eq!(secret, response.code);
}

#[tokio::test]
async fn send_marker_flips_status_to_transferring() {
    let sandbox = Sandbox::new("echo \"Sending 'report.pdf' (10 B)\" >&2; exec sleep 30");
    let path = sandbox.file("report.pdf", "0123456789");

    let response = sandbox.transfers.send(&path).await.unwrap();
    let (registry, pid) = (sandbox.registry(), response.pid);
    assert!(
        wait_until(
            || async move { status_of(registry, pid).await == Some(TransferStatus::Transferring) }
        )
        .await
    );

    sandbox.transfers.cancel(response.pid).await.unwrap();
}

#[tokio::test]
async fn finished_send_stays_visible_for_grace_period() {
    let sandbox = Sandbox::with("exit 0", |c| c.send_grace_secs = 1);
    let path = sandbox.file("done.txt", "x");

    let response = sandbox.transfers.send(&path).await.unwrap();
    let (registry, pid) = (sandbox.registry(), response.pid);
    assert!(
        wait_until(
            || async move { status_of(registry, pid).await == Some(TransferStatus::Completed) }
        )
        .await
    );
    assert!(wait_until(|| async move { registry.get(pid).await.is_none() }).await);
}

#[tokio::test]
async fn failed_send_is_marked_failed() {
    let sandbox = Sandbox::new("echo 'relay unreachable' >&2; exit 3");
    let path = sandbox.file("doc.txt", "x");

    let response = sandbox.transfers.send(&path).await.unwrap();
    let (registry, pid) = (sandbox.registry(), response.pid);
    assert!(
        wait_until(|| async move { status_of(registry, pid).await == Some(TransferStatus::Failed) })
            .await
    );
}

#[tokio::test]
async fn send_directory_reports_total_size() {
    let sandbox = Sandbox::new(HANG);
    std::fs::create_dir_all(sandbox.root.join("album/disc1")).unwrap();
    std::fs::write(sandbox.root.join("album/cover.jpg"), vec![0u8; 2048]).unwrap();
    std::fs::write(sandbox.root.join("album/disc1/track.flac"), vec![0u8; 1024]).unwrap();

    let response = sandbox
        .transfers
        .send(&sandbox.root.join("album").display().to_string())
        .await
        .unwrap();
    assert_eq!(response.filename, "album");
    assert_eq!(response.size_bytes, 3072);
    assert_eq!(response.size_human, "3.00 KB");

    sandbox.transfers.cancel(response.pid).await.unwrap();
}

#[tokio::test]
async fn send_outside_roots_spawns_nothing() {
    let sandbox = Sandbox::new(HANG);
    let outside = TempDir::new().unwrap();
    let secret = outside.path().join("secret.txt");
    std::fs::write(&secret, "s").unwrap();

    let err = sandbox
        .transfers
        .send(&secret.display().to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::PathOutsideAllowedDirectories(_)));
    assert!(sandbox.registry().is_empty().await);
}

#[tokio::test]
async fn send_through_escaping_symlink_is_rejected() {
    let sandbox = Sandbox::new(HANG);
    let outside = TempDir::new().unwrap();
    std::fs::write(outside.path().join("passwd"), "root:x:0:0").unwrap();
    std::os::unix::fs::symlink(outside.path(), sandbox.root.join("evil")).unwrap();

    let err = sandbox
        .transfers
        .send(&sandbox.root.join("evil/passwd").display().to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::PathOutsideAllowedDirectories(_)));
    assert!(sandbox.registry().is_empty().await);
}

#[tokio::test]
async fn missing_binary_is_process_start_failure() {
    let sandbox = Sandbox::with(HANG, |c| {
        c.binary = "/nonexistent/croc".to_string();
        c.global_args.clear();
    });
    let path = sandbox.file("a.txt", "a");

    let err = sandbox.transfers.send(&path).await.unwrap_err();
    assert!(matches!(err, FsError::ProcessStart(_)));
    assert!(sandbox.registry().is_empty().await);
}

// ============================================================================
// cancel / status / cleanup
// ============================================================================

#[tokio::test]
async fn cancel_unknown_pid_has_no_side_effects() {
    let sandbox = Sandbox::new(HANG);
    let path = sandbox.file("a.txt", "a");
    let response = sandbox.transfers.send(&path).await.unwrap();

    let err = sandbox.transfers.cancel(u32::MAX - 1).await.unwrap_err();
    assert!(matches!(err, FsError::ProcessNotFound(_)));
    assert_eq!(sandbox.registry().len().await, 1);
    assert_eq!(
        status_of(sandbox.registry(), response.pid).await,
        Some(TransferStatus::WaitingForReceiver)
    );

    sandbox.transfers.cancel(response.pid).await.unwrap();
}

#[tokio::test]
async fn cancel_removes_transfer_and_stops_process() {
    let sandbox = Sandbox::new(HANG);
    let path = sandbox.file("a.txt", "a");
    let response = sandbox.transfers.send(&path).await.unwrap();
    let process = sandbox.registry().get(response.pid).await.unwrap();

    let message = sandbox.transfers.cancel(response.pid).await.unwrap();
    assert!(message.contains(&response.pid.to_string()));
    assert!(sandbox.registry().get(response.pid).await.is_none());
    assert_eq!(process.status(), TransferStatus::Cancelled);
    let exited = &process;
    assert!(wait_until(|| async move { exited.has_exited() }).await);

    let again = sandbox.transfers.cancel(response.pid).await.unwrap_err();
    assert!(matches!(again, FsError::ProcessNotFound(_)));
    assert_eq!(sandbox.transfers.status().await, "No active transfers.");
}

#[tokio::test]
async fn cleanup_all_terminates_every_transfer() {
    let sandbox = Sandbox::new(HANG);
    let a = sandbox.transfers.send(&sandbox.file("a.txt", "a")).await.unwrap();
    let b = sandbox.transfers.send(&sandbox.file("b.txt", "b")).await.unwrap();
    let process_a = sandbox.registry().get(a.pid).await.unwrap();
    let process_b = sandbox.registry().get(b.pid).await.unwrap();

    assert_eq!(sandbox.registry().cleanup_all().await, 2);
    assert!(sandbox.registry().is_empty().await);
    let (a, b) = (&process_a, &process_b);
    assert!(wait_until(|| async move { a.has_exited() && b.has_exited() }).await);
}

// ============================================================================
// receive
// ============================================================================

#[tokio::test]
async fn receive_writes_into_destination() {
    let sandbox = Sandbox::new("echo data > received.txt; echo \"Receiving 'received.txt'\"");
    let inbox = sandbox.root.join("inbox");
    std::fs::create_dir(&inbox).unwrap();

    let response = sandbox
        .transfers
        .receive(
            "abc123defg",
            Some(&inbox.display().to_string()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    assert_eq!(response.status, "completed");
    assert!(response.message.contains("received.txt"));
    assert_eq!(response.output_dir, inbox.display().to_string());
    assert!(inbox.join("received.txt").exists());
    assert!(sandbox.registry().is_empty().await);
}

#[tokio::test]
async fn receive_defaults_to_first_root() {
    let sandbox = Sandbox::new("touch here.txt");

    let response = sandbox
        .transfers
        .receive("abc123defg", None, CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(response.output_dir, sandbox.root.display().to_string());
    assert_eq!(response.message, "File received");
    assert!(sandbox.root.join("here.txt").exists());
}

#[tokio::test]
async fn receive_failure_carries_stderr() {
    let sandbox = Sandbox::new("echo 'room not ready' >&2; exit 2");

    let err = sandbox
        .transfers
        .receive("abc123defg", None, CancellationToken::new())
        .await
        .unwrap_err();

    match err {
        FsError::ExternalProcessFailed { status, stderr } => {
            assert_eq!(status, "exit code 2");
            assert!(stderr.contains("room not ready"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(sandbox.registry().is_empty().await);
}

#[tokio::test]
async fn receive_times_out_and_evicts() {
    let sandbox = Sandbox::with(HANG, |c| c.receive_timeout_secs = 1);

    let started = Instant::now();
    let err = sandbox
        .transfers
        .receive("abc123defg", None, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, FsError::TransferTimeout(1)));
    assert!(started.elapsed() < Duration::from_secs(10));
    assert!(sandbox.registry().is_empty().await);
}

#[tokio::test]
async fn receive_stops_when_request_is_cancelled() {
    let sandbox = Sandbox::new(HANG);
    let request = CancellationToken::new();
    let trigger = request.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let err = sandbox
        .transfers
        .receive("abc123defg", None, request)
        .await
        .unwrap_err();

    assert!(matches!(err, FsError::TransferCancelled(_)));
    assert!(sandbox.registry().is_empty().await);
}

#[tokio::test]
async fn receive_stops_when_pid_is_cancelled() {
    let sandbox = Sandbox::new(HANG);
    let transfers = sandbox.transfers.clone();
    let pending = tokio::spawn(async move {
        transfers
            .receive("abc123defg", None, CancellationToken::new())
            .await
    });

    let registry = sandbox.registry();
    assert!(wait_until(|| async move { !registry.is_empty().await }).await);
    let entry = registry.list().await.remove(0);
    assert_eq!(entry.direction, TransferDirection::Receive);
    assert_eq!(entry.status, TransferStatus::Receiving);

    sandbox.transfers.cancel(entry.pid).await.unwrap();
    let result = pending.await.unwrap();
    assert!(matches!(result, Err(FsError::TransferCancelled(_))));
}

#[tokio::test]
async fn receive_rejects_bad_output_dirs() {
    let sandbox = Sandbox::new(HANG);
    let file = sandbox.file("not-a-dir.txt", "x");
    let missing = sandbox.root.join("missing").display().to_string();
    let outside = TempDir::new().unwrap();

    for dir in [file.as_str(), missing.as_str()] {
        let err = sandbox
            .transfers
            .receive("abc123defg", Some(dir), CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, FsError::OutputDirectoryInvalid(_)), "{dir}: {err:?}");
    }

    let err = sandbox
        .transfers
        .receive(
            "abc123defg",
            Some(&outside.path().display().to_string()),
            CancellationToken::new(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::PathOutsideAllowedDirectories(_)));
    assert!(sandbox.registry().is_empty().await);
}

#[tokio::test]
async fn receive_rejects_empty_code() {
    let sandbox = Sandbox::new(HANG);
    let err = sandbox
        .transfers
        .receive("", None, CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, FsError::InvalidArgument(_)));
}

#[tokio::test]
async fn receive_runs_in_destination_with_out_flag() {
    let sandbox = Sandbox::new("printf '%s\\n' \"$@\" > args.txt; pwd -P > cwd.txt");
    let inbox = sandbox.root.join("inbox");
    std::fs::create_dir(&inbox).unwrap();

    sandbox
        .transfers
        .receive(
            "abc123defg",
            Some(&inbox.display().to_string()),
            CancellationToken::new(),
        )
        .await
        .unwrap();

    let args = std::fs::read_to_string(inbox.join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert_eq!(args, vec!["--yes", "--out", inbox.display().to_string().as_str()]);

    let cwd = std::fs::read_to_string(inbox.join("cwd.txt")).unwrap();
    assert_eq!(Path::new(cwd.trim()), inbox.as_path());
}
