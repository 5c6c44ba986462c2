//! Architecture abstraction layer for context switching and interrupt handling.
//!
//! The kernel is written against [`Arch`]. Two backends implement it:
//!
//! - `aarch64`: bare-metal ARM64 (`target_os = "none"`), with the GIC-400 and
//!   the EL1 physical timer driving the tick.
//! - `hosted`: used by `cargo test` and the `std-shim` feature. Each kernel
//!   thread is carried by a host thread, and ticks are delivered by calling
//!   [`Kernel::tick`](crate::Kernel::tick).

use crate::errors::TimerError;
use crate::mem::Stack;
use crate::thread::ThreadEntry;
use core::marker::PhantomData;

/// Architecture abstraction trait.
///
/// # Safety
///
/// Implementations manipulate stacks and processor state directly. All
/// methods marked as unsafe have preconditions that must be upheld by the
/// caller.
pub trait Arch: Send + Sync + 'static {
    /// Per-kernel processor state the backend needs to keep, if any.
    type Cpu: Default + Send + Sync;

    /// Bytes reserved at the top of every thread stack: one interrupt frame
    /// and one switch frame.
    const RESERVED_FRAME_BYTES: usize;

    /// Write the initial switch frame of a new thread at the high end of
    /// `stack` and return the stack pointer to save for it.
    ///
    /// The first switch to that stack pointer starts `entry(arg)` with
    /// interrupts enabled.
    ///
    /// # Safety
    ///
    /// `stack` must be at least [`Self::RESERVED_FRAME_BYTES`] long and not in
    /// use by any thread.
    unsafe fn init_stack(stack: &Stack, entry: ThreadEntry, arg: usize) -> usize;

    /// Save the current thread's callee-saved state on its stack, store its
    /// stack pointer in `*prev`, load the stack pointer in `*next` and
    /// resume that thread. Returns when some later switch resumes the
    /// current thread.
    ///
    /// # Safety
    ///
    /// - Must be called with interrupts disabled
    /// - `*next` must hold a stack pointer produced by `init_stack` or saved
    ///   by an earlier switch through the same `cpu`
    /// - `next` and `prev` must not alias
    unsafe fn context_switch(cpu: &Self::Cpu, next: *const usize, prev: *mut usize);

    /// Start the periodic tick source.
    fn start_tick_timer(cpu: &Self::Cpu, period_us: u32) -> Result<(), TimerError>;

    /// Enable interrupts on the current CPU.
    fn enable_interrupts();

    /// Disable interrupts on the current CPU.
    fn disable_interrupts();

    /// Check if interrupts are currently enabled.
    fn interrupts_enabled() -> bool;
}

/// Interrupts stay masked while this guard is alive.
///
/// On drop, interrupts are re-enabled only if they were enabled when the
/// guard was acquired, so guards nest and can be taken inside the tick
/// handler.
pub struct IrqGuard<A: Arch> {
    was_enabled: bool,
    _arch: PhantomData<A>,
    // The saved state belongs to this CPU context.
    _not_send: PhantomData<*const ()>,
}

impl<A: Arch> IrqGuard<A> {
    #[must_use]
    pub fn acquire() -> Self {
        let was_enabled = A::interrupts_enabled();
        A::disable_interrupts();
        Self {
            was_enabled,
            _arch: PhantomData,
            _not_send: PhantomData,
        }
    }
}

impl<A: Arch> Drop for IrqGuard<A> {
    fn drop(&mut self) {
        if self.was_enabled {
            A::enable_interrupts();
        }
    }
}

/// Run `f` with interrupts masked on the default architecture.
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    let _irq = IrqGuard::<DefaultArch>::acquire();
    f()
}

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod aarch64;
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod aarch64_gic;
#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub mod aarch64_vectors;

#[cfg(all(
    any(test, feature = "std-shim"),
    not(all(target_arch = "aarch64", target_os = "none"))
))]
pub mod hosted;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use aarch64::Aarch64Arch as DefaultArch;

#[cfg(all(
    any(test, feature = "std-shim"),
    not(all(target_arch = "aarch64", target_os = "none"))
))]
pub use hosted::HostedArch as DefaultArch;

#[cfg(not(any(
    all(target_arch = "aarch64", target_os = "none"),
    test,
    feature = "std-shim"
)))]
compile_error!("Unsupported target. Build for aarch64-unknown-none, or enable the std-shim feature to run on a host.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_irq_guard_nests() {
        assert!(DefaultArch::interrupts_enabled());
        {
            let _outer = IrqGuard::<DefaultArch>::acquire();
            assert!(!DefaultArch::interrupts_enabled());
            {
                let _inner = IrqGuard::<DefaultArch>::acquire();
                assert!(!DefaultArch::interrupts_enabled());
            }
            // Inner guard saw interrupts already masked.
            assert!(!DefaultArch::interrupts_enabled());
        }
        assert!(DefaultArch::interrupts_enabled());
    }

    #[test]
    fn test_without_interrupts() {
        let enabled_inside = without_interrupts(DefaultArch::interrupts_enabled);
        assert!(!enabled_inside);
        assert!(DefaultArch::interrupts_enabled());
    }
}
