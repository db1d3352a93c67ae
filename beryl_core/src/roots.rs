//! Class serials and the runtime root model.
//!
//! Every class or module carries a monotonically assigned serial that
//! compiled code uses as a guard key: a method-dispatch guard compares
//! the receiver's class serial against the serial baked into the code
//! and falls back to the interpreter on mismatch. Redefining a class
//! retires its serial.
//!
//! [`RuntimeRoots`] is the snapshot of the root namespace handed to the
//! JIT at startup so it can seed the valid-serial set.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

// =============================================================================
// Class Serials
// =============================================================================

/// Monotonically assigned identity of one class or module generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassSerial(pub u64);

impl ClassSerial {
    /// Raw serial value.
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Allocator for class serials. The runtime holds exactly one.
#[derive(Debug)]
pub struct SerialAllocator(AtomicU64);

impl SerialAllocator {
    /// Create an allocator starting at serial 1.
    pub const fn new() -> Self {
        SerialAllocator(AtomicU64::new(1))
    }

    /// Hand out the next serial.
    #[inline]
    pub fn next(&self) -> ClassSerial {
        ClassSerial(self.0.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SerialAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Runtime Roots
// =============================================================================

/// Value of one constant in the root namespace.
#[derive(Debug, Clone, Copy)]
pub enum ConstValue {
    /// The constant names a class.
    Class(ClassSerial),
    /// The constant names a module.
    Module(ClassSerial),
    /// Anything else (strings, numbers, ...).
    Other,
}

/// One entry of the root constant table.
#[derive(Debug, Clone)]
pub struct ConstEntry {
    /// Whether the binding's name is a constant-style name. Non-constant
    /// bindings never contribute guard serials.
    pub const_name: bool,
    /// The bound value.
    pub value: ConstValue,
}

impl ConstEntry {
    /// The class or module serial this entry contributes, if any.
    #[inline]
    pub fn guard_serial(&self) -> Option<ClassSerial> {
        if !self.const_name {
            return None;
        }
        match self.value {
            ConstValue::Class(serial) | ConstValue::Module(serial) => Some(serial),
            ConstValue::Other => None,
        }
    }
}

/// Snapshot of the runtime roots consumed by the JIT at init.
#[derive(Debug, Clone)]
pub struct RuntimeRoots {
    /// Serial of the root object class.
    pub object_class: ClassSerial,
    /// Serial of the class of the top-level self.
    pub top_self_class: ClassSerial,
    /// The root constant table.
    pub constants: Vec<ConstEntry>,
    /// Installation prefix of the running interpreter.
    pub prefix_path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_allocator_is_monotonic() {
        let alloc = SerialAllocator::new();
        let a = alloc.next();
        let b = alloc.next();
        assert!(b > a);
    }

    #[test]
    fn test_guard_serial_filters_non_class_values() {
        let class = ConstEntry {
            const_name: true,
            value: ConstValue::Class(ClassSerial(3)),
        };
        let module = ConstEntry {
            const_name: true,
            value: ConstValue::Module(ClassSerial(4)),
        };
        let string = ConstEntry {
            const_name: true,
            value: ConstValue::Other,
        };
        let lowercase = ConstEntry {
            const_name: false,
            value: ConstValue::Class(ClassSerial(5)),
        };
        assert_eq!(class.guard_serial(), Some(ClassSerial(3)));
        assert_eq!(module.guard_serial(), Some(ClassSerial(4)));
        assert_eq!(string.guard_serial(), None);
        assert_eq!(lowercase.guard_serial(), None);
    }
}
