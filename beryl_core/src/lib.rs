//! Core runtime model for the Beryl bytecode interpreter.
//!
//! This crate holds the pieces of the interpreter that other subsystems
//! (most importantly the method JIT in `beryl_jit`) consume through a
//! narrow surface:
//!
//! - **Iseqs**: compiled bytecode objects with the JIT binding cells
//!   (`jit_func`, `jit_unit`, `total_calls`)
//! - **Execution contexts**: control-frame stacks with an iseq-kind
//!   discriminator for stack walkers
//! - **Thread registry**: enumeration of living interpreter threads
//! - **Class serials**: guard identities for compiled code, plus the
//!   runtime-root snapshot used to seed the JIT's valid-serial set

#![deny(unsafe_op_in_unsafe_fn)]

pub mod exec;
pub mod iseq;
pub mod roots;
pub mod threads;

pub use exec::{ControlFrame, ExecutionContext, FrameSlot};
pub use iseq::{CodePtr, Iseq, IseqBody, IseqId, JitFuncCell, JitFuncState};
pub use roots::{ClassSerial, ConstEntry, ConstValue, RuntimeRoots, SerialAllocator};
pub use threads::{ThreadRegistry, VmThread};
