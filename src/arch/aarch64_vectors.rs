//! AArch64 exception vector table.
//!
//! Only IRQs taken at EL1 with SP_EL1 are expected; every other vector parks
//! the core. The IRQ entry pushes an [`InterruptFrame`] on the interrupted
//! thread's own stack, so the tick handler may switch to another thread and
//! the interrupted one resumes later by unwinding through the same entry.

use super::aarch64::{rearm_tick_timer, InterruptFrame, INTERRUPT_FRAME_SIZE};
use super::aarch64_gic::{Gic400, SPURIOUS_IRQ, TIMER_IRQ};
use core::arch::{asm, naked_asm};

/// Vector table entry macro - each entry must be exactly 128 bytes.
macro_rules! vector_entry {
    ($handler:ident) => {
        concat!(".align 7\n", "b ", stringify!($handler), "\n")
    };
}

/// The exception vector table.
///
/// Must be 2048-byte aligned and placed in the `.vectors` section by the
/// linker script.
#[link_section = ".vectors"]
#[no_mangle]
#[unsafe(naked)]
pub unsafe extern "C" fn _vectors() {
    naked_asm!(
        ".align 11",

        // Current EL with SP0
        vector_entry!(unhandled_exception),
        vector_entry!(unhandled_exception),
        vector_entry!(unhandled_exception),
        vector_entry!(unhandled_exception),

        // Current EL with SPx
        vector_entry!(unhandled_exception),
        vector_entry!(irq_el1h),
        vector_entry!(unhandled_exception),
        vector_entry!(unhandled_exception),

        // Lower EL using AArch64
        vector_entry!(unhandled_exception),
        vector_entry!(unhandled_exception),
        vector_entry!(unhandled_exception),
        vector_entry!(unhandled_exception),

        // Lower EL using AArch32
        vector_entry!(unhandled_exception),
        vector_entry!(unhandled_exception),
        vector_entry!(unhandled_exception),
        vector_entry!(unhandled_exception),
    );
}

#[no_mangle]
#[unsafe(naked)]
unsafe extern "C" fn unhandled_exception() {
    naked_asm!("msr daifset, #0xf", "1:", "wfe", "b 1b");
}

/// Builds the IRQ entry; the extra lines spill the caller-saved SIMD state
/// and FPCR/FPSR when `full-fpu` is on.
macro_rules! define_irq_entry {
    ($($save_fpu:literal)* ; $($restore_fpu:literal)*) => {
        #[no_mangle]
        #[unsafe(naked)]
        unsafe extern "C" fn irq_el1h() {
            naked_asm!(
                "sub sp, sp, #{frame}",
                "stp x0, x1, [sp, #0]",
                "stp x2, x3, [sp, #16]",
                "stp x4, x5, [sp, #32]",
                "stp x6, x7, [sp, #48]",
                "stp x8, x9, [sp, #64]",
                "stp x10, x11, [sp, #80]",
                "stp x12, x13, [sp, #96]",
                "stp x14, x15, [sp, #112]",
                "stp x16, x17, [sp, #128]",
                "str x18, [sp, #144]",
                "stp x29, x30, [sp, #152]",
                "mrs x0, elr_el1",
                "mrs x1, spsr_el1",
                "stp x0, x1, [sp, #168]",
                $($save_fpu,)*

                "mov x0, sp",
                "bl {dispatch}",

                $($restore_fpu,)*
                "ldp x0, x1, [sp, #168]",
                "msr elr_el1, x0",
                "msr spsr_el1, x1",
                "ldp x0, x1, [sp, #0]",
                "ldp x2, x3, [sp, #16]",
                "ldp x4, x5, [sp, #32]",
                "ldp x6, x7, [sp, #48]",
                "ldp x8, x9, [sp, #64]",
                "ldp x10, x11, [sp, #80]",
                "ldp x12, x13, [sp, #96]",
                "ldp x14, x15, [sp, #112]",
                "ldp x16, x17, [sp, #128]",
                "ldr x18, [sp, #144]",
                "ldp x29, x30, [sp, #152]",
                "add sp, sp, #{frame}",
                "eret",
                frame = const INTERRUPT_FRAME_SIZE,
                dispatch = sym irq_dispatch,
            )
        }
    };
}

#[cfg(feature = "full-fpu")]
define_irq_entry!(
    "mrs x0, fpcr"
    "mrs x1, fpsr"
    "stp x0, x1, [sp, #192]"
    "stp q0, q1, [sp, #208]"
    "stp q2, q3, [sp, #240]"
    "stp q4, q5, [sp, #272]"
    "stp q6, q7, [sp, #304]"
    "stp q16, q17, [sp, #336]"
    "stp q18, q19, [sp, #368]"
    "stp q20, q21, [sp, #400]"
    "stp q22, q23, [sp, #432]"
    "stp q24, q25, [sp, #464]"
    "stp q26, q27, [sp, #496]"
    "stp q28, q29, [sp, #528]"
    "stp q30, q31, [sp, #560]"
    ;
    "ldp q0, q1, [sp, #208]"
    "ldp q2, q3, [sp, #240]"
    "ldp q4, q5, [sp, #272]"
    "ldp q6, q7, [sp, #304]"
    "ldp q16, q17, [sp, #336]"
    "ldp q18, q19, [sp, #368]"
    "ldp q20, q21, [sp, #400]"
    "ldp q22, q23, [sp, #432]"
    "ldp q24, q25, [sp, #464]"
    "ldp q26, q27, [sp, #496]"
    "ldp q28, q29, [sp, #528]"
    "ldp q30, q31, [sp, #560]"
    "ldp x0, x1, [sp, #192]"
    "msr fpcr, x0"
    "msr fpsr, x1"
);

#[cfg(not(feature = "full-fpu"))]
define_irq_entry!(;);

/// High-level IRQ handler, running on the interrupted thread's stack.
///
/// The timer is rearmed and the interrupt completed before the kernel tick
/// runs, because the tick may switch to another thread and this call only
/// returns once the interrupted thread is scheduled again.
extern "C" fn irq_dispatch(_frame: *mut InterruptFrame) {
    // SAFETY: called from the IRQ entry after `Gic400::init`.
    let irq = unsafe { Gic400::acknowledge_interrupt() };
    if irq == SPURIOUS_IRQ {
        return;
    }

    if irq == TIMER_IRQ {
        rearm_tick_timer();
        unsafe { Gic400::end_interrupt(irq) };
        crate::kernel::dispatch_tick();
    } else {
        unsafe { Gic400::end_interrupt(irq) };
    }
}

/// Point VBAR_EL1 at [`_vectors`].
///
/// # Safety
///
/// Must be called at EL1 with interrupts masked.
pub unsafe fn install_vector_table() {
    unsafe {
        asm!(
            "adrp {tmp}, _vectors",
            "add {tmp}, {tmp}, :lo12:_vectors",
            "msr vbar_el1, {tmp}",
            "isb",
            tmp = out(reg) _,
            options(nostack, preserves_flags)
        );
    }
}
