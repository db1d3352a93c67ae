//! Compiler backend interface.
//!
//! The coordination plane never generates code itself. A backend turns
//! one iseq into a loaded native artifact (emit source, run the C
//! toolchain, dlopen the result); the coordinator only schedules those
//! steps and owns the resulting handles. Dropping the last handle to an
//! artifact unloads it.

use std::fmt;
use std::sync::Arc;

use beryl_core::{CodePtr, Iseq};

use crate::paths::JitPaths;
use crate::unit::UnitId;

// =============================================================================
// PCH bootstrap
// =============================================================================

/// State of the backend's precompiled-header bootstrap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PchStatus {
    /// Bootstrap still running on the worker.
    NotReady,
    /// Header built; per-iseq compiles may proceed.
    Success,
    /// Bootstrap failed; every pending and future unit is doomed.
    Failed,
}

// =============================================================================
// Artifacts
// =============================================================================

/// A loaded native artifact. The handle keeps the underlying code
/// mapped; dropping the last clone unloads it.
pub trait LoadedArtifact: Send + Sync {
    /// Entry point of the unit this artifact was compiled for.
    fn entry(&self) -> CodePtr;

    /// Entry point for one member unit of a combined (compacted)
    /// artifact. Single-unit artifacts answer `None`.
    fn entry_for(&self, unit: UnitId) -> Option<CodePtr> {
        let _ = unit;
        None
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Why a per-iseq compile failed.
#[derive(Debug, Clone)]
pub enum CompileError {
    /// Source emission or toolchain invocation failed.
    Codegen(String),
    /// The produced artifact could not be loaded.
    Load(String),
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Codegen(msg) => write!(f, "code generation failed: {msg}"),
            CompileError::Load(msg) => write!(f, "artifact load failed: {msg}"),
        }
    }
}

impl std::error::Error for CompileError {}

// =============================================================================
// Backend
// =============================================================================

/// The external compiler driven by the JIT worker.
///
/// All methods are called from the worker thread, outside the engine
/// lock; `compile` and `compact` additionally run inside the compile
/// region, mutually exclusive with GC.
pub trait CompilerBackend: Send + Sync {
    /// Build the precompiled header. Runs once, first thing on the
    /// worker; the coordinator publishes the returned status.
    fn prepare(&self, paths: &JitPaths) -> PchStatus;

    /// Compile one iseq and load the result.
    fn compile(&self, iseq: &Arc<Iseq>, unit: UnitId)
        -> Result<Arc<dyn LoadedArtifact>, CompileError>;

    /// Combine every loaded artifact into one, so the per-unit files
    /// can be dropped at shutdown. Backends without this capability
    /// answer `None` (the default).
    fn compact(&self, units: &[(UnitId, Arc<Iseq>)]) -> Option<Arc<dyn LoadedArtifact>> {
        let _ = units;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedArtifact(CodePtr);

    impl LoadedArtifact for FixedArtifact {
        fn entry(&self) -> CodePtr {
            self.0
        }
    }

    #[test]
    fn test_single_unit_artifact_has_no_member_entries() {
        let artifact = FixedArtifact(CodePtr(0x4000));
        assert_eq!(artifact.entry(), CodePtr(0x4000));
        assert_eq!(artifact.entry_for(UnitId(1)), None);
    }
}
