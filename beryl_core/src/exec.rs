//! Execution contexts and control-frame stacks.
//!
//! Every interpreter thread (and every saved continuation) owns an
//! [`ExecutionContext`]: a stack of control frames. The JIT cache
//! evictor walks these stacks to find iseqs whose compiled entry may be
//! live on a stack and therefore must not be unloaded.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::iseq::Iseq;

// =============================================================================
// Control Frames
// =============================================================================

/// What occupies a frame's program slot.
///
/// Only iseq frames are relevant to the JIT; native and dummy frames are
/// skipped by stack walkers.
#[derive(Debug, Clone)]
pub enum FrameSlot {
    /// A bytecode frame executing the given iseq.
    Iseq(Arc<Iseq>),
    /// A native (C-level) frame.
    Native,
}

/// One entry of a control-frame stack.
#[derive(Debug, Clone)]
pub struct ControlFrame {
    /// Program counter; `None` for dummy frames pushed around calls.
    pub pc: Option<u32>,
    /// Program slot discriminated by kind.
    pub slot: FrameSlot,
}

impl ControlFrame {
    /// Frame for an executing iseq.
    pub fn iseq(iseq: Arc<Iseq>, pc: u32) -> Self {
        ControlFrame {
            pc: Some(pc),
            slot: FrameSlot::Iseq(iseq),
        }
    }

    /// Native frame.
    pub fn native() -> Self {
        ControlFrame {
            pc: None,
            slot: FrameSlot::Native,
        }
    }

    /// The frame's iseq, if this is a live bytecode frame.
    #[inline]
    pub fn live_iseq(&self) -> Option<&Arc<Iseq>> {
        match (&self.pc, &self.slot) {
            (Some(_), FrameSlot::Iseq(iseq)) => Some(iseq),
            _ => None,
        }
    }
}

// =============================================================================
// ExecutionContext
// =============================================================================

/// A control-frame stack for one thread or continuation.
#[derive(Debug, Default)]
pub struct ExecutionContext {
    frames: RwLock<Vec<ControlFrame>>,
}

impl ExecutionContext {
    /// Create an empty context.
    pub fn new() -> Self {
        ExecutionContext {
            frames: RwLock::new(Vec::new()),
        }
    }

    /// Push a frame.
    pub fn push_frame(&self, frame: ControlFrame) {
        self.frames.write().push(frame);
    }

    /// Pop the top frame.
    pub fn pop_frame(&self) -> Option<ControlFrame> {
        self.frames.write().pop()
    }

    /// Current stack depth.
    pub fn frame_count(&self) -> usize {
        self.frames.read().len()
    }

    /// Visit the iseq of every live bytecode frame, bottom to top.
    pub fn each_live_iseq(&self, mut f: impl FnMut(&Arc<Iseq>)) {
        let frames = self.frames.read();
        for frame in frames.iter() {
            if let Some(iseq) = frame.live_iseq() {
                f(iseq);
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
