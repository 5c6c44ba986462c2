//! Shared helpers for the unit tests.

use crate::arch::hosted::HostedArch;
use crate::config::KernelConfig;
use crate::kernel::Kernel;
use crate::mem::Stack;
use crate::sched::RoundRobinScheduler;
use crate::thread::{Tcb, ThreadTable};
use alloc::boxed::Box;
use core::fmt;
use std::string::String;
use std::sync::{Mutex, PoisonError};

pub(crate) type TestKernel = Kernel<HostedArch, RoundRobinScheduler>;

/// A kernel with the default configuration that lives for the rest of the
/// test process, as kernels are shared with their threads by `'static`
/// reference.
pub(crate) fn leak_kernel() -> &'static TestKernel {
    Box::leak(Box::new(Kernel::new(KernelConfig::default())))
}

/// Entry point for threads that are created but never dispatched.
pub(crate) extern "C" fn idle_entry(_arg: usize) -> ! {
    loop {
        core::hint::spin_loop();
    }
}

/// Fill the next `count` slots of `table` with READY threads.
pub(crate) fn fill_table(table: &mut ThreadTable, count: usize) {
    for _ in 0..count {
        let stack = Stack::allocate(64).unwrap();
        table
            .insert(|id| Tcb::new(id, "filler", idle_entry, stack))
            .unwrap();
    }
}

static CAPTURED: Mutex<String> = Mutex::new(String::new());

struct CaptureSink;

impl fmt::Write for CaptureSink {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        CAPTURED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_str(s);
        Ok(())
    }
}

/// View of everything printed to the kernel console since the capture
/// sink was first installed. Tests run in parallel, so only check for
/// lines they produce themselves.
pub(crate) struct CapturedConsole;

impl CapturedConsole {
    pub(crate) fn contains(&self, needle: &str) -> bool {
        CAPTURED
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(needle)
    }
}

pub(crate) fn capture_console() -> CapturedConsole {
    crate::console::install(Box::leak(Box::new(CaptureSink)));
    CapturedConsole
}
