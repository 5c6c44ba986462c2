//! GIC-400 (Generic Interrupt Controller v2) driver.
//!
//! Just enough of the controller to route the EL1 physical timer PPI to the
//! only core and acknowledge it from the IRQ entry.
//!
//! - **BCM2837 (Pi Zero 2 W)**: GIC @ `0xFF84_1000`
//! - **QEMU virt** (`qemu-virt` feature): GICv2 @ `0x0800_0000`

use core::ptr::{read_volatile, write_volatile};

#[cfg(feature = "qemu-virt")]
const GICD_BASE: usize = 0x0800_0000;
#[cfg(feature = "qemu-virt")]
const GICC_BASE: usize = 0x0801_0000;

#[cfg(not(feature = "qemu-virt"))]
const GICD_BASE: usize = 0xFF84_1000;
#[cfg(not(feature = "qemu-virt"))]
const GICC_BASE: usize = 0xFF84_2000;

// Distributor registers
const GICD_CTLR: usize = 0x000;
const GICD_TYPER: usize = 0x004;
const GICD_ISENABLER: usize = 0x100;
const GICD_ICENABLER: usize = 0x180;
const GICD_ICPENDR: usize = 0x280;
const GICD_IPRIORITYR: usize = 0x400;

// CPU interface registers
const GICC_CTLR: usize = 0x000;
const GICC_PMR: usize = 0x004;
const GICC_BPR: usize = 0x008;
const GICC_IAR: usize = 0x00C;
const GICC_EOIR: usize = 0x010;

/// EL1 physical timer interrupt (PPI).
pub const TIMER_IRQ: u32 = 30;

/// Interrupt id read back when nothing is pending.
pub const SPURIOUS_IRQ: u32 = 1023;

const TIMER_PRIORITY: u8 = 0x80;

#[inline]
unsafe fn gicd_write(offset: usize, value: u32) {
    unsafe { write_volatile((GICD_BASE + offset) as *mut u32, value) }
}

#[inline]
unsafe fn gicd_read(offset: usize) -> u32 {
    unsafe { read_volatile((GICD_BASE + offset) as *const u32) }
}

#[inline]
unsafe fn gicc_write(offset: usize, value: u32) {
    unsafe { write_volatile((GICC_BASE + offset) as *mut u32, value) }
}

pub struct Gic400;

impl Gic400 {
    /// Reset the distributor to "everything disabled" and open the CPU
    /// interface to all priorities.
    ///
    /// Returns false if no GIC answers at the configured address.
    ///
    /// # Safety
    ///
    /// Must be called once, at EL1, with interrupts masked.
    pub unsafe fn init() -> bool {
        let typer = unsafe { gicd_read(GICD_TYPER) };
        if typer == 0xFFFF_FFFF || typer == 0 {
            return false;
        }
        let words = ((typer & 0x1F) + 1) as usize;

        unsafe {
            gicd_write(GICD_CTLR, 0);
            for word in 0..words {
                gicd_write(GICD_ICENABLER + word * 4, 0xFFFF_FFFF);
                gicd_write(GICD_ICPENDR + word * 4, 0xFFFF_FFFF);
            }
            for word in 0..words * 8 {
                gicd_write(GICD_IPRIORITYR + word * 4, 0xFFFF_FFFF);
            }
            gicd_write(GICD_CTLR, 1);

            gicc_write(GICC_PMR, 0xFF);
            gicc_write(GICC_BPR, 0);
            gicc_write(GICC_CTLR, 1);
        }
        true
    }

    /// # Safety
    ///
    /// Must be called after [`Gic400::init`].
    pub unsafe fn enable_irq(irq: u32, priority: u8) {
        let index = irq as usize;
        let shift = (index & 3) * 8;
        let priority_reg = GICD_IPRIORITYR + (index & !3);

        unsafe {
            let mut value = gicd_read(priority_reg);
            value &= !(0xFF << shift);
            value |= u32::from(priority) << shift;
            gicd_write(priority_reg, value);

            gicd_write(GICD_ISENABLER + (index / 32) * 4, 1 << (index % 32));
        }
    }

    /// Acknowledge the highest priority pending interrupt and return its id,
    /// or [`SPURIOUS_IRQ`].
    ///
    /// # Safety
    ///
    /// Must be called from the IRQ path after [`Gic400::init`].
    #[inline]
    pub unsafe fn acknowledge_interrupt() -> u32 {
        unsafe { read_volatile((GICC_BASE + GICC_IAR) as *const u32) & 0x3FF }
    }

    /// # Safety
    ///
    /// `irq` must be the id returned by the matching `acknowledge_interrupt`.
    #[inline]
    pub unsafe fn end_interrupt(irq: u32) {
        unsafe { gicc_write(GICC_EOIR, irq) }
    }
}

/// Initialize the GIC and enable the tick interrupt.
///
/// Returns false if the GIC is not available.
///
/// # Safety
///
/// Must be called once during kernel start, with interrupts masked.
pub unsafe fn init() -> bool {
    unsafe {
        if !Gic400::init() {
            return false;
        }
        Gic400::enable_irq(TIMER_IRQ, TIMER_PRIORITY);
    }
    true
}
