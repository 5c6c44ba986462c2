//! Scheduler trait definition.

use crate::thread::{ThreadId, ThreadTable};

/// Scheduling policy.
///
/// Called with interrupts masked and the thread table locked, so
/// implementations must not block and must not call back into the kernel.
pub trait Scheduler: Send + Sync + 'static {
    /// Pick the thread to run next.
    ///
    /// Must return either a READY thread, the current thread when it is
    /// still RUNNING, or the idle thread. The idle thread is always a valid
    /// answer.
    fn select_next(&self, table: &ThreadTable) -> ThreadId;
}
