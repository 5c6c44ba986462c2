//! Hosted backend.
//!
//! Runs the kernel inside an ordinary process, for tests and the `std-shim`
//! feature. Every kernel thread is carried by a host thread that waits on
//! its own gate; a context switch opens the next gate and then waits on the
//! current one, so exactly one carrier runs kernel code at a time.
//!
//! The kernel's view is unchanged: it still keeps a saved stack pointer per
//! thread and passes pointers to those slots to `context_switch`. The slot
//! address identifies the carrier. A slot seen for the first time holds the
//! stack pointer returned by `init_stack`, and the switch frame found there
//! says which entry point the new carrier has to run.
//!
//! There is no timer thread. A tick is whatever the running thread does by
//! calling [`Kernel::tick`](crate::Kernel::tick), which is how an interrupt
//! handler runs on the interrupted thread's stack anyway.

extern crate std;

use super::Arch;
use crate::errors::TimerError;
use crate::mem::Stack;
use crate::thread::ThreadEntry;
use core::cell::Cell;
use core::mem::size_of;
use portable_atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::vec::Vec;

/// Host stack size for each carrier thread.
const CARRIER_STACK_BYTES: usize = 256 * 1024;

std::thread_local! {
    static IRQ_ENABLED: Cell<bool> = const { Cell::new(true) };
}

/// Frame placed on a new thread's stack by `init_stack`.
#[repr(C, align(16))]
#[derive(Debug, Default, Clone, Copy)]
pub struct SwitchFrame {
    pub entry: usize,
    pub arg: usize,
    /// Routine the carrier starts in, `thread_start` for a new thread.
    pub resume: usize,
}

type StartRoutine = fn(ThreadEntry, usize) -> !;

/// Space kept free above the switch frame, matching the room an interrupt
/// frame takes on hardware.
#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct InterruptFrame {
    pub regs: [usize; 8],
}

#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    turn: Condvar,
}

impl Gate {
    fn open(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        *open = true;
        self.turn.notify_one();
    }

    /// Block until the gate is opened, then close it behind us.
    fn pass(&self) {
        let mut open = self.open.lock().unwrap_or_else(PoisonError::into_inner);
        while !*open {
            open = self.turn.wait(open).unwrap_or_else(PoisonError::into_inner);
        }
        *open = false;
    }
}

/// Carrier bookkeeping for one kernel.
#[derive(Default)]
pub struct HostCpu {
    /// Gate of each carrier, keyed by saved stack pointer slot address.
    gates: Mutex<Vec<(usize, Arc<Gate>)>>,
    tick_period_us: AtomicU32,
}

impl HostCpu {
    fn gate(&self, slot: usize) -> Option<Arc<Gate>> {
        let gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        gates
            .iter()
            .find(|(key, _)| *key == slot)
            .map(|(_, gate)| Arc::clone(gate))
    }

    fn gate_or_insert(&self, slot: usize) -> Arc<Gate> {
        let mut gates = self.gates.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some((_, gate)) = gates.iter().find(|(key, _)| *key == slot) {
            return Arc::clone(gate);
        }
        let gate = Arc::new(Gate::default());
        gates.push((slot, Arc::clone(&gate)));
        gate
    }

    /// Tick period recorded by `start_tick_timer`, zero before that.
    pub fn tick_period_us(&self) -> u32 {
        self.tick_period_us.load(Ordering::Relaxed)
    }

    /// Number of carriers launched so far, the idle thread included once it
    /// has been switched away from.
    pub fn carriers(&self) -> usize {
        self.gates.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Architecture stand-in for host processes.
pub struct HostedArch;

fn thread_start(entry: ThreadEntry, arg: usize) -> ! {
    HostedArch::enable_interrupts();
    entry(arg)
}

/// Start a carrier for the thread whose first switch frame is `frame`. It
/// waits on the returned gate before running anything.
fn launch(frame: SwitchFrame) -> Arc<Gate> {
    // SAFETY: `init_stack` stored `entry` from a `ThreadEntry` and `resume`
    // from a `StartRoutine`.
    let (entry, resume) = unsafe {
        (
            core::mem::transmute::<usize, ThreadEntry>(frame.entry),
            core::mem::transmute::<usize, StartRoutine>(frame.resume),
        )
    };
    let arg = frame.arg;

    let gate = Arc::new(Gate::default());
    let own_gate = Arc::clone(&gate);
    let spawned = std::thread::Builder::new()
        .stack_size(CARRIER_STACK_BYTES)
        .spawn(move || {
            own_gate.pass();
            resume(entry, arg)
        });
    if let Err(err) = spawned {
        panic!("failed to launch carrier thread: {}", err);
    }
    gate
}

impl Arch for HostedArch {
    type Cpu = HostCpu;

    const RESERVED_FRAME_BYTES: usize = size_of::<InterruptFrame>() + size_of::<SwitchFrame>();

    unsafe fn init_stack(stack: &Stack, entry: ThreadEntry, arg: usize) -> usize {
        let frame_addr = (stack.high() - size_of::<SwitchFrame>()) & !(Stack::ALIGN - 1);
        let frame = SwitchFrame {
            entry: entry as usize,
            arg,
            resume: thread_start as StartRoutine as usize,
        };
        // SAFETY: the caller guarantees the frame fits in `stack`.
        unsafe { (frame_addr as *mut SwitchFrame).write(frame) };
        frame_addr
    }

    unsafe fn context_switch(cpu: &HostCpu, next: *const usize, prev: *mut usize) {
        let outgoing = cpu.gate_or_insert(prev as usize);
        let incoming = match cpu.gate(next as usize) {
            Some(gate) => gate,
            None => {
                // SAFETY: a slot never switched to holds the stack pointer
                // returned by `init_stack`, which addresses a switch frame.
                let frame = unsafe { ((*next) as *const SwitchFrame).read() };
                let gate = launch(frame);
                let mut gates = cpu.gates.lock().unwrap_or_else(PoisonError::into_inner);
                gates.push((next as usize, Arc::clone(&gate)));
                gate
            }
        };

        incoming.open();
        outgoing.pass();
    }

    fn start_tick_timer(cpu: &HostCpu, period_us: u32) -> Result<(), TimerError> {
        if period_us == 0 {
            return Err(TimerError::InvalidPeriod(period_us));
        }
        cpu.tick_period_us.store(period_us, Ordering::Relaxed);
        Ok(())
    }

    fn enable_interrupts() {
        IRQ_ENABLED.with(|enabled| enabled.set(true));
    }

    fn disable_interrupts() {
        IRQ_ENABLED.with(|enabled| enabled.set(false));
    }

    fn interrupts_enabled() -> bool {
        IRQ_ENABLED.with(Cell::get)
    }
}
