//! Transfer orchestration over the croc binary
//!
//! A send spawns the binary in the background and returns the code at
//! once; a receive blocks until the binary exits, the timeout elapses, or
//! the request is cancelled. Every spawned process is tracked in the
//! [`ProcessRegistry`] until it finishes.

pub mod code;
mod control;
mod receive;
mod send;
mod supervisor;

use std::sync::Arc;

use crate::guard::DirectoryGuard;
use crate::registry::ProcessRegistry;
use crate::types::TransferConfig;

pub use send::format_size;

#[derive(Clone)]
pub struct TransferOrchestrator {
    guard: Arc<DirectoryGuard>,
    registry: ProcessRegistry,
    config: TransferConfig,
}

impl TransferOrchestrator {
    pub fn new(guard: Arc<DirectoryGuard>, registry: ProcessRegistry, config: TransferConfig) -> Self {
        Self {
            guard,
            registry,
            config,
        }
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }
}
