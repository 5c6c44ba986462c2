//! Blocking synchronization between kernel threads.
//!
//! Both primitives keep their waiters in a FIFO [`WaitQueue`] and are
//! operated with interrupts masked. Every operation takes the kernel the
//! calling thread belongs to.

pub mod mutex;
pub mod semaphore;
pub mod wait_queue;

pub use mutex::Mutex;
pub use semaphore::Semaphore;
pub use wait_queue::{RingBuffer, WaitQueue};

use crate::arch::{DefaultArch, IrqGuard};
use core::ops::{Deref, DerefMut};

/// Spin lock that is only ever held with interrupts masked.
///
/// A thread preempted while holding the lock would leave every other thread
/// spinning on it, as the holder can only run again after they yield.
pub(crate) struct IrqSpinMutex<T> {
    inner: spin::Mutex<T>,
}

/// Guard of an [`IrqSpinMutex`]. The lock is released before interrupts are
/// restored.
pub(crate) struct IrqSpinGuard<'a, T> {
    guard: spin::MutexGuard<'a, T>,
    _irq: IrqGuard<DefaultArch>,
}

impl<T> IrqSpinMutex<T> {
    pub(crate) const fn new(value: T) -> Self {
        Self {
            inner: spin::Mutex::new(value),
        }
    }

    pub(crate) fn lock(&self) -> IrqSpinGuard<'_, T> {
        let irq = IrqGuard::<DefaultArch>::acquire();
        IrqSpinGuard {
            guard: self.inner.lock(),
            _irq: irq,
        }
    }
}

impl<T> Deref for IrqSpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.guard
    }
}

impl<T> DerefMut for IrqSpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.guard
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::Arch;

    #[test]
    fn test_irq_spin_mutex_masks_while_held() {
        let lock = IrqSpinMutex::new(0u32);
        assert!(DefaultArch::interrupts_enabled());
        {
            let mut value = lock.lock();
            *value += 1;
            assert!(!DefaultArch::interrupts_enabled());
        }
        assert!(DefaultArch::interrupts_enabled());
        assert_eq!(*lock.lock(), 1);
    }

    #[test]
    fn test_irq_spin_mutex_keeps_masked_caller_masked() {
        let lock = IrqSpinMutex::new(());
        let _outer = IrqGuard::<DefaultArch>::acquire();
        drop(lock.lock());
        assert!(!DefaultArch::interrupts_enabled());
    }
}
