//! Registry of transfer subprocesses
//!
//! The registry is owned by the server instance and shared by every tool
//! call. All map access goes through one `RwLock`; the lock is never held
//! while spawning, waiting on, or signalling a process.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

/// Lifecycle of a transfer as reported to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    WaitingForReceiver,
    Transferring,
    Receiving,
    Completed,
    Failed,
    Cancelled,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::WaitingForReceiver => "waiting_for_receiver",
            TransferStatus::Transferring => "transferring",
            TransferStatus::Receiving => "receiving",
            TransferStatus::Completed => "completed",
            TransferStatus::Failed => "failed",
            TransferStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Completed | TransferStatus::Failed | TransferStatus::Cancelled
        )
    }

    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TransferStatus::WaitingForReceiver,
            1 => TransferStatus::Transferring,
            2 => TransferStatus::Receiving,
            3 => TransferStatus::Completed,
            4 => TransferStatus::Failed,
            _ => TransferStatus::Cancelled,
        }
    }

    fn to_u8(self) -> u8 {
        match self {
            TransferStatus::WaitingForReceiver => 0,
            TransferStatus::Transferring => 1,
            TransferStatus::Receiving => 2,
            TransferStatus::Completed => 3,
            TransferStatus::Failed => 4,
            TransferStatus::Cancelled => 5,
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferDirection {
    Send,
    Receive,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::Send => f.write_str("send"),
            TransferDirection::Receive => f.write_str("receive"),
        }
    }
}

/// One transfer subprocess
///
/// The child handle itself is owned by the supervising task; this record
/// holds the pid for the signal backstop and the cancellation token that
/// makes the supervisor kill and reap the child.
#[derive(Debug)]
pub struct TransferProcess {
    pid: u32,
    direction: TransferDirection,
    target: PathBuf,
    code: Option<String>,
    started_at: DateTime<Utc>,
    // Advisory only: written by the output readers, the supervisor and
    // cancel with relaxed ordering, last write wins. Nothing branches on it
    // for correctness.
    status: AtomicU8,
    exited: AtomicBool,
    cancel: CancellationToken,
}

impl TransferProcess {
    pub fn new(
        pid: u32,
        direction: TransferDirection,
        target: PathBuf,
        code: Option<String>,
        status: TransferStatus,
    ) -> Self {
        Self {
            pid,
            direction,
            target,
            code,
            started_at: Utc::now(),
            status: AtomicU8::new(status.to_u8()),
            exited: AtomicBool::new(false),
            cancel: CancellationToken::new(),
        }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    pub fn status(&self) -> TransferStatus {
        TransferStatus::from_u8(self.status.load(Ordering::Relaxed))
    }

    pub fn set_status(&self, status: TransferStatus) {
        self.status.store(status.to_u8(), Ordering::Relaxed);
    }

    /// Move from `from` to `to`, leaving any other status untouched
    pub fn advance(&self, from: TransferStatus, to: TransferStatus) -> bool {
        self.status
            .compare_exchange(from.to_u8(), to.to_u8(), Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Called by the supervisor once the child has been reaped
    pub fn mark_exited(&self) {
        self.exited.store(true, Ordering::Release);
    }

    pub fn has_exited(&self) -> bool {
        self.exited.load(Ordering::Acquire)
    }

    /// Fire the cancellation token, then signal the pid directly as a
    /// backstop. `force` sends SIGKILL instead of SIGTERM.
    pub fn terminate(&self, force: bool) {
        self.cancel.cancel();
        // A reaped pid may already belong to another process
        if !self.has_exited() {
            signal_pid(self.pid, force);
        }
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        TransferSnapshot {
            pid: self.pid,
            direction: self.direction,
            status: self.status(),
            target: self.target.clone(),
            code: self.code.clone(),
            started_at: self.started_at,
        }
    }
}

#[cfg(unix)]
fn signal_pid(pid: u32, force: bool) {
    // pid 0 and negative values address process groups
    let Ok(raw) = i32::try_from(pid) else {
        return;
    };
    if raw <= 0 {
        return;
    }
    let signal = if force { libc::SIGKILL } else { libc::SIGTERM };
    let _ = unsafe { libc::kill(raw, signal) };
}

#[cfg(not(unix))]
fn signal_pid(_pid: u32, _force: bool) {
    // The supervisor's kill on cancellation is the only mechanism here
}

/// Point-in-time copy of a registry entry
#[derive(Debug, Clone, Serialize)]
pub struct TransferSnapshot {
    pub pid: u32,
    pub direction: TransferDirection,
    pub status: TransferStatus,
    pub target: PathBuf,
    pub code: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl TransferSnapshot {
    pub fn elapsed_secs(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds().max(0)
    }
}

/// Concurrency-safe map from pid to transfer process
#[derive(Clone, Default)]
pub struct ProcessRegistry {
    inner: Arc<RwLock<HashMap<u32, Arc<TransferProcess>>>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, pid: u32, process: Arc<TransferProcess>) {
        self.inner.write().await.insert(pid, process);
    }

    pub async fn get(&self, pid: u32) -> Option<Arc<TransferProcess>> {
        self.inner.read().await.get(&pid).cloned()
    }

    pub async fn remove(&self, pid: u32) -> Option<Arc<TransferProcess>> {
        self.inner.write().await.remove(&pid)
    }

    /// Remove `pid` only if it still maps to `process`, so a delayed removal
    /// never evicts a newer transfer that was handed the same pid
    pub async fn remove_if_same(&self, pid: u32, process: &Arc<TransferProcess>) -> bool {
        let mut map = self.inner.write().await;
        match map.get(&pid) {
            Some(current) if Arc::ptr_eq(current, process) => {
                map.remove(&pid);
                true
            }
            _ => false,
        }
    }

    /// Independent copy of every entry, ordered by pid
    pub async fn list(&self) -> Vec<TransferSnapshot> {
        let mut snapshots: Vec<TransferSnapshot> = self
            .inner
            .read()
            .await
            .values()
            .map(|p| p.snapshot())
            .collect();
        snapshots.sort_by_key(|s| s.pid);
        snapshots
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Cancel and force-kill every tracked process and empty the registry.
    /// Returns how many processes were terminated.
    pub async fn cleanup_all(&self) -> usize {
        let drained: Vec<Arc<TransferProcess>> = {
            let mut map = self.inner.write().await;
            map.drain().map(|(_, process)| process).collect()
        };

        for process in &drained {
            tracing::info!(pid = process.pid(), "Terminating transfer on shutdown");
            process.set_status(TransferStatus::Cancelled);
            process.terminate(true);
        }

        drained.len()
    }
}
