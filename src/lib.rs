#![no_std]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(unreachable_pub)]

//! Minimal preemptive kernel for single-core bare-metal AArch64.
//!
//! A fixed table of up to seven threads plus the idle thread, scheduled
//! round-robin on a periodic timer tick, with sleeping, yielding, a
//! handoff mutex and a counting semaphore.
//!
//! # Target Platform
//!
//! - **Architecture**: AArch64, EL1, single core
//! - **Environment**: Bare-metal (`aarch64-unknown-none`)
//! - **Interrupts**: GIC-400 + EL1 physical timer (Pi Zero 2 W, QEMU virt)
//!
//! Tests and the `std-shim` feature run the same kernel on a host, with host
//! threads standing in for kernel threads.
//!
//! # Features
//!
//! - `full-fpu`: Save FPU/NEON state across switches and interrupts (default)
//! - `std-shim`: Hosted backend outside of tests
//! - `qemu-virt`: GIC addresses of the QEMU virt machine
//!
//! # Quick Start
//!
//! ```ignore
//! use preemptive_kernel::{Kernel, KernelConfig};
//! use spin::Lazy;
//!
//! static KERNEL: Lazy<Kernel> = Lazy::new(|| Kernel::new(KernelConfig::default()));
//!
//! fn kernel_main() -> ! {
//!     let kernel: &'static Kernel = &KERNEL;
//!
//!     kernel.spawn("blink", 1024, move || loop {
//!         toggle_led();
//!         kernel.sleep(50);
//!     }).expect("failed to create thread");
//!
//!     kernel.start().expect("failed to start kernel");
//!     loop {
//!         // Idle thread: runs whenever nothing else is ready.
//!         kernel.report();
//!         kernel.sleep(100);
//!     }
//! }
//! ```

pub mod arch;
pub mod config;
pub mod console;
pub mod errors;
pub mod kernel;
pub mod mem;
pub mod sched;
pub mod sync;
pub mod thread;
pub mod time;

#[cfg(test)]
mod test_helpers;

#[cfg(any(test, feature = "std-shim"))]
extern crate std;

extern crate alloc;

#[cfg(all(target_os = "none", not(test)))]
use core::panic::PanicInfo;

#[cfg(all(target_os = "none", not(test)))]
#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    arch::DefaultArch::disable_interrupts();
    kprintln!("[kernel] panic: {}", info);
    loop {
        #[cfg(target_arch = "aarch64")]
        unsafe {
            core::arch::asm!("wfe", options(nomem, nostack));
        }
    }
}

// ============================================================================
// Public API
// ============================================================================

// Architecture abstraction
pub use arch::{Arch, DefaultArch, IrqGuard};

// Configuration
pub use config::{KernelConfig, MAX_NAME_LEN, MAX_THREADS};

// Kernel
pub use kernel::Kernel;

// Scheduler
pub use sched::{RoundRobinScheduler, Scheduler};

// Synchronization
pub use sync::{Mutex, RingBuffer, Semaphore, WaitQueue};

// Threads
pub use thread::{
    SystemStats, ThreadBuilder, ThreadEntry, ThreadId, ThreadInfo, ThreadState, MAIN_THREAD_ID,
};

// Memory management
pub use mem::Stack;

// Errors
pub use errors::{MemoryError, ScheduleError, SpawnError, ThreadError, ThreadResult, TimerError};
