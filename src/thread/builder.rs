use super::{ThreadEntry, ThreadId};
use crate::arch::Arch;
use crate::errors::ThreadResult;
use crate::kernel::Kernel;
use crate::sched::Scheduler;

/// Default stack size requested by [`ThreadBuilder`], on top of the
/// kernel's reserved frames.
pub const DEFAULT_STACK_SIZE: usize = 4096;

/// Thread configuration before creation.
///
/// ```ignore
/// let id = ThreadBuilder::new()
///     .name("sensor")
///     .stack_size(2048)
///     .spawn(&KERNEL, || loop { poll_sensor() })?;
/// ```
pub struct ThreadBuilder<'a> {
    name: &'a str,
    stack_size: usize,
}

impl<'a> ThreadBuilder<'a> {
    pub fn new() -> Self {
        Self {
            name: "",
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    pub fn name(mut self, name: &'a str) -> Self {
        self.name = name;
        self
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    /// Create the thread from an entry function and its argument.
    pub fn create<A: Arch, S: Scheduler>(
        self,
        kernel: &Kernel<A, S>,
        entry: ThreadEntry,
        arg: usize,
    ) -> ThreadResult<ThreadId> {
        kernel.create_thread(self.name, entry, arg, self.stack_size)
    }

    /// Create the thread from a closure.
    pub fn spawn<A, S, F>(self, kernel: &'static Kernel<A, S>, f: F) -> ThreadResult<ThreadId>
    where
        A: Arch,
        S: Scheduler,
        F: FnOnce() + Send + 'static,
    {
        kernel.spawn(self.name, self.stack_size, f)
    }
}

impl Default for ThreadBuilder<'_> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{idle_entry, leak_kernel};
    use portable_atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_builder_create() {
        let kernel = leak_kernel();
        let id = ThreadBuilder::new()
            .name("built")
            .stack_size(512)
            .create(kernel, idle_entry, 9)
            .unwrap();

        let info = kernel.thread_info(id).unwrap();
        assert_eq!(info.name.as_str(), "built");
        assert!(info.stack_size >= 512);
    }

    #[test]
    fn test_builder_spawn() {
        let kernel = leak_kernel();
        let ran = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&ran);

        ThreadBuilder::default()
            .name("closure")
            .spawn(kernel, move || flag.store(true, Ordering::SeqCst))
            .unwrap();
        kernel.start().unwrap();
        assert!(ran.load(Ordering::SeqCst));
    }
}
