//! Blocking, non-recursive mutex with FIFO handoff.

use super::{IrqSpinMutex, WaitQueue};
use crate::arch::{Arch, IrqGuard};
use crate::kernel::Kernel;
use crate::sched::Scheduler;
use crate::thread::ThreadId;

struct MutexState {
    owner: Option<ThreadId>,
    locked: bool,
    waiters: WaitQueue,
}

/// Mutual exclusion between kernel threads.
///
/// On unlock with threads waiting, ownership passes straight to the oldest
/// waiter and the CPU is handed to it, so the lock cannot be taken by a
/// third thread in between.
///
/// ```ignore
/// static LOCK: Mutex = Mutex::new();
///
/// LOCK.lock(&KERNEL);
/// /* critical section */
/// LOCK.unlock(&KERNEL);
/// ```
pub struct Mutex {
    state: IrqSpinMutex<MutexState>,
}

impl Mutex {
    /// An unlocked mutex with no waiters.
    pub const fn new() -> Self {
        Self {
            state: IrqSpinMutex::new(MutexState {
                owner: None,
                locked: false,
                waiters: WaitQueue::new(),
            }),
        }
    }

    /// Acquire the mutex, blocking in WAITING while another thread holds it.
    ///
    /// Returns immediately if the caller already owns it.
    pub fn lock<A: Arch, S: Scheduler>(&self, kernel: &Kernel<A, S>) {
        loop {
            let _irq = IrqGuard::<A>::acquire();
            let me = kernel.current_id();
            {
                let mut state = self.state.lock();
                if !state.locked {
                    state.locked = true;
                    state.owner = Some(me);
                    return;
                }
                // Either handed over by `unlock`, or a repeated lock.
                if state.owner == Some(me) {
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

    /// Release the mutex.
    ///
    /// Does nothing unless the caller is the owner. With threads waiting,
    /// the oldest one becomes the owner and runs immediately; the caller
    /// stays READY.
    pub fn unlock<A: Arch, S: Scheduler>(&self, kernel: &Kernel<A, S>) {
        let _irq = IrqGuard::<A>::acquire();
        let me = kernel.current_id();
        let next_owner = {
            let mut state = self.state.lock();
            if !state.locked || state.owner != Some(me) {
                return;
            }
            let next = state.waiters.get();
            state.owner = next;
            state.locked = next.is_some();
            next
        };

        if let Some(next) = next_owner {
            kernel.wake(next);
            kernel.switch_to(next);
        }
    }

    pub fn is_locked(&self) -> bool {
        self.state.lock().locked
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.state.lock().owner
    }

    /// Number of threads blocked in `lock`.
    pub fn waiting(&self) -> usize {
        self.state.lock().waiters.len()
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}
