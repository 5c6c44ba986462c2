//! AArch64 (ARM64) architecture implementation.
//!
//! Context switches are cooperative at the machine level: whatever calls
//! [`Arch::context_switch`] (a thread blocking, or the tick handler running
//! on top of an interrupted thread) pushes its callee-saved registers on its
//! own stack, parks its stack pointer and adopts the next one. Caller-saved
//! state of an interrupted thread is already on its stack in the
//! [`InterruptFrame`] pushed by the IRQ entry.
//!
//! Stack layout of a thread that is not running (high addresses on top):
//!
//! ```text
//! | ...thread frames...  |
//! | InterruptFrame       |  only when it was preempted by the tick
//! | irq handler frames   |
//! | SwitchFrame          |  <- saved stack pointer
//! ```

use super::Arch;
use crate::errors::TimerError;
use crate::mem::Stack;
use crate::thread::ThreadEntry;
use core::arch::{asm, naked_asm};
use core::mem::size_of;
use portable_atomic::{AtomicU64, Ordering};
use static_assertions::const_assert_eq;

/// Callee-saved state pushed by [`switch_stacks`].
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct SwitchFrame {
    /// x19-x28
    pub x: [u64; 10],
    pub fp: u64,
    /// Resume address; `thread_start` for a thread never run.
    pub lr: u64,
    /// d8-d15
    #[cfg(feature = "full-fpu")]
    pub d: [u64; 8],
}

/// Caller-saved state pushed by the IRQ entry on the interrupted stack.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct InterruptFrame {
    /// x0-x18
    pub x: [u64; 19],
    pub fp: u64,
    pub lr: u64,
    pub elr: u64,
    pub spsr: u64,
    _reserved: u64,
    #[cfg(feature = "full-fpu")]
    pub fpcr: u64,
    #[cfg(feature = "full-fpu")]
    pub fpsr: u64,
    /// q0-q7 and q16-q31
    #[cfg(feature = "full-fpu")]
    pub q: [u128; 24],
}

#[cfg(feature = "full-fpu")]
pub const SWITCH_FRAME_SIZE: usize = 160;
#[cfg(not(feature = "full-fpu"))]
pub const SWITCH_FRAME_SIZE: usize = 96;

#[cfg(feature = "full-fpu")]
pub const INTERRUPT_FRAME_SIZE: usize = 592;
#[cfg(not(feature = "full-fpu"))]
pub const INTERRUPT_FRAME_SIZE: usize = 192;

// Offsets below are baked into the assembly.
const_assert_eq!(size_of::<SwitchFrame>(), SWITCH_FRAME_SIZE);
const_assert_eq!(size_of::<InterruptFrame>(), INTERRUPT_FRAME_SIZE);
const_assert_eq!(SWITCH_FRAME_SIZE % 16, 0);
const_assert_eq!(INTERRUPT_FRAME_SIZE % 16, 0);

pub struct Aarch64Arch;

/// Builds [`switch_stacks`]; the extra lines save and restore the FPU
/// callee-saved registers when `full-fpu` is on.
macro_rules! define_switch_stacks {
    ($($save_fpu:literal)* ; $($restore_fpu:literal)*) => {
        /// `x0` = pointer to the next stack pointer, `x1` = where to park the
        /// current one.
        #[unsafe(naked)]
        unsafe extern "C" fn switch_stacks(_next: *const usize, _prev: *mut usize) {
            naked_asm!(
                "sub sp, sp, #{frame}",
                "stp x19, x20, [sp, #0]",
                "stp x21, x22, [sp, #16]",
                "stp x23, x24, [sp, #32]",
                "stp x25, x26, [sp, #48]",
                "stp x27, x28, [sp, #64]",
                "stp x29, x30, [sp, #80]",
                $($save_fpu,)*
                "mov x9, sp",
                "str x9, [x1]",
                "ldr x9, [x0]",
                "mov sp, x9",
                $($restore_fpu,)*
                "ldp x19, x20, [sp, #0]",
                "ldp x21, x22, [sp, #16]",
                "ldp x23, x24, [sp, #32]",
                "ldp x25, x26, [sp, #48]",
                "ldp x27, x28, [sp, #64]",
                "ldp x29, x30, [sp, #80]",
                "add sp, sp, #{frame}",
                "ret",
                frame = const SWITCH_FRAME_SIZE,
            )
        }
    };
}

#[cfg(feature = "full-fpu")]
define_switch_stacks!(
    "stp d8, d9, [sp, #96]"
    "stp d10, d11, [sp, #112]"
    "stp d12, d13, [sp, #128]"
    "stp d14, d15, [sp, #144]"
    ;
    "ldp d8, d9, [sp, #96]"
    "ldp d10, d11, [sp, #112]"
    "ldp d12, d13, [sp, #128]"
    "ldp d14, d15, [sp, #144]"
);

#[cfg(not(feature = "full-fpu"))]
define_switch_stacks!(;);

/// First code a new thread runs, reached through the `ret` of
/// [`switch_stacks`]. Entry point in x19, argument in x20.
#[unsafe(naked)]
unsafe extern "C" fn thread_start() -> ! {
    naked_asm!(
        "msr daifclr, #2",
        "mov x0, x20",
        "mov x29, xzr",
        "mov x30, xzr",
        "br x19",
    )
}

impl Arch for Aarch64Arch {
    type Cpu = ();

    const RESERVED_FRAME_BYTES: usize = INTERRUPT_FRAME_SIZE + SWITCH_FRAME_SIZE;

    unsafe fn init_stack(stack: &Stack, entry: ThreadEntry, arg: usize) -> usize {
        let frame_addr = (stack.high() - SWITCH_FRAME_SIZE) & !(Stack::ALIGN - 1);
        let mut frame = SwitchFrame::default();
        frame.x[0] = entry as usize as u64;
        frame.x[1] = arg as u64;
        frame.lr = thread_start as usize as u64;
        // SAFETY: the caller guarantees the frame fits in `stack`.
        unsafe { (frame_addr as *mut SwitchFrame).write(frame) };
        frame_addr
    }

    unsafe fn context_switch(_cpu: &(), next: *const usize, prev: *mut usize) {
        // SAFETY: forwarded caller contract.
        unsafe { switch_stacks(next, prev) }
    }

    fn start_tick_timer(_cpu: &(), period_us: u32) -> Result<(), TimerError> {
        // SAFETY: called once from `Kernel::start` at EL1 with interrupts
        // masked.
        unsafe {
            super::aarch64_vectors::install_vector_table();
            if !super::aarch64_gic::init() {
                return Err(TimerError::NotAvailable);
            }
        }

        let freq = counter_frequency();
        if freq == 0 {
            return Err(TimerError::NotAvailable);
        }
        let interval = freq * u64::from(period_us) / 1_000_000;
        if interval == 0 || interval > u64::from(u32::MAX) {
            return Err(TimerError::InvalidPeriod(period_us));
        }

        TIMER_INTERVAL.store(interval, Ordering::Relaxed);
        rearm_tick_timer();
        Ok(())
    }

    fn enable_interrupts() {
        unsafe {
            asm!("msr daifclr, #2", options(nostack, preserves_flags));
        }
    }

    fn disable_interrupts() {
        unsafe {
            asm!("msr daifset, #2", options(nostack, preserves_flags));
        }
    }

    fn interrupts_enabled() -> bool {
        let daif: u64;
        unsafe {
            asm!(
                "mrs {daif}, daif",
                daif = out(reg) daif,
                options(nomem, nostack, preserves_flags)
            );
        }
        (daif & 0x80) == 0
    }
}

/// Counter ticks between two scheduler ticks.
static TIMER_INTERVAL: AtomicU64 = AtomicU64::new(0);

fn counter_frequency() -> u64 {
    let freq: u64;
    unsafe {
        asm!(
            "mrs {freq}, cntfrq_el0",
            freq = out(reg) freq,
            options(nomem, nostack, preserves_flags)
        );
    }
    freq
}

/// Program the next tick one interval from now and enable the timer with
/// its interrupt unmasked. Writing the timer value also clears the pending
/// condition of the previous tick.
pub fn rearm_tick_timer() {
    let interval = TIMER_INTERVAL.load(Ordering::Relaxed);
    unsafe {
        asm!(
            "msr cntp_tval_el0, {interval}",
            "msr cntp_ctl_el0, {enable}",
            "isb",
            interval = in(reg) interval,
            enable = in(reg) 1u64,
            options(nostack, preserves_flags)
        );
    }
}
