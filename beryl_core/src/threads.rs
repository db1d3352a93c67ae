//! Registry of living interpreter threads.
//!
//! The JIT evictor enumerates living threads to walk their stacks; the
//! interpreter registers a thread at spawn and unregisters it at exit.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::exec::ExecutionContext;

/// A living interpreter thread.
#[derive(Debug)]
pub struct VmThread {
    /// Registry-assigned thread id.
    pub id: u64,
    /// The thread's execution context.
    pub ec: Arc<ExecutionContext>,
}

/// Registry of all living threads.
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    threads: RwLock<Vec<Arc<VmThread>>>,
    next_id: AtomicU64,
}

impl ThreadRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        ThreadRegistry {
            threads: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register a thread around the given execution context.
    pub fn register(&self, ec: Arc<ExecutionContext>) -> Arc<VmThread> {
        let thread = Arc::new(VmThread {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            ec,
        });
        self.threads.write().push(Arc::clone(&thread));
        thread
    }

    /// Unregister a thread by id.
    pub fn unregister(&self, thread_id: u64) {
        let mut threads = self.threads.write();
        if let Some(pos) = threads.iter().position(|t| t.id == thread_id) {
            threads.swap_remove(pos);
        }
    }

    /// Visit every living thread.
    pub fn for_each(&self, mut f: impl FnMut(&Arc<VmThread>)) {
        let threads = self.threads.read();
        for thread in threads.iter() {
            f(thread);
        }
    }

    /// Number of living threads.
    pub fn len(&self) -> usize {
        self.threads.read().len()
    }

    /// Check whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_unregister() {
        let registry = ThreadRegistry::new();
        let t1 = registry.register(Arc::new(ExecutionContext::new()));
        let t2 = registry.register(Arc::new(ExecutionContext::new()));
        assert_ne!(t1.id, t2.id);
        assert_eq!(registry.len(), 2);

        registry.unregister(t1.id);
        assert_eq!(registry.len(), 1);

        let mut ids = Vec::new();
        registry.for_each(|t| ids.push(t.id));
        assert_eq!(ids, vec![t2.id]);
    }
}
