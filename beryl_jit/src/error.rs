//! User-visible coordinator errors.

use std::fmt;

/// Errors surfaced to the host from lifecycle operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JitError {
    /// `pause`/`resume` called while the subsystem is disabled.
    NotEnabled,
    /// The worker thread could not be spawned on resume.
    WorkerSpawn,
}

impl fmt::Display for JitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitError::NotEnabled => write!(f, "JIT is not enabled"),
            JitError::WorkerSpawn => write!(f, "failed to start JIT worker thread"),
        }
    }
}

impl std::error::Error for JitError {}
