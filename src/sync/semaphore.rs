//! Counting semaphore.

use super::{IrqSpinMutex, WaitQueue};
use crate::arch::{Arch, IrqGuard};
use crate::kernel::Kernel;
use crate::sched::Scheduler;
use crate::thread::ThreadId;

struct SemaphoreState {
    value: i32,
    waiters: WaitQueue,
}

/// Counting semaphore.
///
/// `signal` wakes the oldest waiter, which then competes for the count again
/// when it next runs. `signal_and_switch` also hands it the CPU at once.
pub struct Semaphore {
    state: IrqSpinMutex<SemaphoreState>,
}

impl Semaphore {
    pub const fn new(value: i32) -> Self {
        Self {
            state: IrqSpinMutex::new(SemaphoreState {
                value,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// Take one unit, blocking in WAITING until the count is positive.
    pub fn wait<A: Arch, S: Scheduler>(&self, kernel: &Kernel<A, S>) {
        loop {
            let _irq = IrqGuard::<A>::acquire();
            let me = kernel.current_id();
            {
                let mut state = self.state.lock();
                if state.value > 0 {
                    state.value -= 1;
                    return;
                }
                if !state.waiters.contains(me) {
                    state.waiters.put(me);
                }
            }
            kernel.block_current();
            kernel.reschedule();
        }
    }

    /// Return one unit and make the oldest waiter READY. The caller keeps
    /// running.
    pub fn signal<A: Arch, S: Scheduler>(&self, kernel: &Kernel<A, S>) {
        let _irq = IrqGuard::<A>::acquire();
        if let Some(woken) = self.release() {
            kernel.wake(woken);
        }
    }

    /// Like [`Semaphore::signal`], but switch to the woken thread
    /// immediately. The caller stays READY.
    pub fn signal_and_switch<A: Arch, S: Scheduler>(&self, kernel: &Kernel<A, S>) {
        let _irq = IrqGuard::<A>::acquire();
        if let Some(woken) = self.release() {
            kernel.wake(woken);
            kernel.switch_to(woken);
        }
    }

    fn release(&self) -> Option<ThreadId> {
        let mut state = self.state.lock();
        state.value = state.value.saturating_add(1);
        state.waiters.get()
    }

    /// Current count.
    pub fn value(&self) -> i32 {
        self.state.lock().value
    }

    /// Number of threads blocked in `wait`.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }
}
