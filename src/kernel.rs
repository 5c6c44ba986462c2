//! The kernel: thread table, dispatching and the tick handler.
//!
//! All mutation of scheduling state happens with interrupts masked through
//! [`IrqGuard`]. The table lock is always released before the context-switch
//! primitive runs; the saved stack pointers live outside the table so the
//! primitive can write them directly.

use crate::arch::{Arch, DefaultArch, IrqGuard};
use crate::config::{KernelConfig, MAX_THREADS};
use crate::errors::{ScheduleError, SpawnError, ThreadResult};
use crate::mem::Stack;
use crate::sched::{RoundRobinScheduler, Scheduler};
use crate::thread::{
    SystemStats, Tcb, ThreadEntry, ThreadId, ThreadInfo, ThreadState, ThreadTable,
};
use crate::time::TickCounter;
use alloc::boxed::Box;
use core::marker::PhantomData;
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};

/// Tick target of the interrupt path.
///
/// Implemented by every [`Kernel`]; the IRQ handler only knows this trait.
pub trait TickHandler: Sync {
    fn tick(&self);
}

/// Kernel the tick interrupt is routed to, set by the first `start`.
static GLOBAL_KERNEL: spin::Once<&'static dyn TickHandler> = spin::Once::new();

/// Route the tick interrupt to the started kernel. Called from the
/// architecture's IRQ handler; does nothing before `start`.
pub fn dispatch_tick() {
    if let Some(kernel) = GLOBAL_KERNEL.get() {
        kernel.tick();
    }
}

/// A single-core preemptive kernel.
///
/// # Type Parameters
///
/// * `A` - Architecture implementation
/// * `S` - Scheduling policy
pub struct Kernel<A: Arch = DefaultArch, S: Scheduler = RoundRobinScheduler> {
    config: KernelConfig,
    scheduler: S,
    table: spin::Mutex<ThreadTable>,
    /// Saved stack pointer of each table slot.
    stack_slots: [AtomicUsize; MAX_THREADS],
    cpu: A::Cpu,
    ticks: TickCounter,
    started: AtomicBool,
    _arch: PhantomData<A>,
}

/// Closure and kernel handed to a thread created by [`Kernel::spawn`].
struct SpawnPacket<A: Arch, S: Scheduler, F> {
    kernel: &'static Kernel<A, S>,
    body: F,
}

extern "C" fn spawn_trampoline<A, S, F>(arg: usize) -> !
where
    A: Arch,
    S: Scheduler,
    F: FnOnce() + Send + 'static,
{
    // SAFETY: `arg` came from `Box::into_raw` in `spawn` and is consumed
    // exactly once, by the thread it was created for.
    let packet = unsafe { Box::from_raw(arg as *mut SpawnPacket<A, S, F>) };
    let SpawnPacket { kernel, body } = *packet;
    body();
    kernel.park_current_forever()
}

impl<A: Arch, S: Scheduler + Default> Kernel<A, S> {
    pub fn new(config: KernelConfig) -> Self {
        Self::with_scheduler(config, S::default())
    }
}

impl<A: Arch, S: Scheduler> Kernel<A, S> {
    /// Create a kernel whose only thread is the caller, as the idle thread.
    pub fn with_scheduler(config: KernelConfig, scheduler: S) -> Self {
        Self {
            config,
            scheduler,
            table: spin::Mutex::new(ThreadTable::new()),
            stack_slots: core::array::from_fn(|_| AtomicUsize::new(0)),
            cpu: A::Cpu::default(),
            ticks: TickCounter::new(config.tick_period_us),
            started: AtomicBool::new(false),
            _arch: PhantomData,
        }
    }

    pub fn config(&self) -> &KernelConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &S {
        &self.scheduler
    }

    /// Architecture state, for backend-specific inspection.
    pub fn cpu(&self) -> &A::Cpu {
        &self.cpu
    }

    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    /// Create a READY thread that will run `entry(arg)`.
    ///
    /// `stack_size` is the room the thread itself needs; the frames the
    /// kernel keeps on every stack come on top of it.
    ///
    /// # Errors
    ///
    /// [`SpawnError::TableFull`] once every slot is in use, in which case
    /// nothing is allocated and the table is unchanged. Stack allocation
    /// failures are reported as [`ThreadError::Memory`](crate::ThreadError).
    pub fn create_thread(
        &self,
        name: &str,
        entry: ThreadEntry,
        arg: usize,
        stack_size: usize,
    ) -> ThreadResult<ThreadId> {
        let _irq = IrqGuard::<A>::acquire();
        let mut table = self.table.lock();
        if table.is_full() {
            crate::kprintln!("[kernel] thread table full, '{}' not created", name);
            return Err(SpawnError::TableFull.into());
        }

        let total = stack_size
            .checked_add(A::RESERVED_FRAME_BYTES)
            .ok_or(SpawnError::StackTooLarge(stack_size))?;
        let stack = Stack::allocate(total)?;
        // SAFETY: the stack is fresh and holds the reserved frames.
        let sp = unsafe { A::init_stack(&stack, entry, arg) };
        let size = stack.size();

        let id = table
            .insert(|id| Tcb::new(id, name, entry, stack))
            .ok_or(SpawnError::TableFull)?;
        self.stack_slots[id.index()].store(sp, Ordering::Release);

        crate::kprintln!("[kernel] created thread {} '{}' ({} byte stack)", id, name, size);
        Ok(id)
    }

    /// Create a thread running the closure `f`.
    ///
    /// When `f` returns the thread parks for good; its slot is not reused.
    pub fn spawn<F>(&'static self, name: &str, stack_size: usize, f: F) -> ThreadResult<ThreadId>
    where
        F: FnOnce() + Send + 'static,
    {
        let packet = Box::into_raw(Box::new(SpawnPacket { kernel: self, body: f }));
        let created = self.create_thread(
            name,
            spawn_trampoline::<A, S, F>,
            packet as usize,
            stack_size,
        );
        if created.is_err() {
            // SAFETY: no thread was created, so nothing else owns the packet.
            drop(unsafe { Box::from_raw(packet) });
        }
        created
    }

    /// Start multitasking.
    ///
    /// The caller becomes the idle thread: the tick timer is armed and the
    /// first READY thread is dispatched. The call returns the first time the
    /// idle thread is scheduled again, which happens once no other thread is
    /// READY, and it returns with interrupts enabled.
    pub fn start(&'static self) -> ThreadResult<()> {
        if self
            .started
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(ScheduleError::AlreadyStarted.into());
        }

        {
            let _irq = IrqGuard::<A>::acquire();
            if let Err(err) = A::start_tick_timer(&self.cpu, self.config.tick_period_us) {
                self.started.store(false, Ordering::Release);
                return Err(err.into());
            }
            GLOBAL_KERNEL.call_once(|| self as &'static dyn TickHandler);

            crate::kprintln!(
                "[kernel] starting {} thread(s), tick every {} us",
                self.thread_count(),
                self.config.tick_period_us
            );
            self.reschedule();
        }

        // The boot path usually enters with IRQs masked; the idle thread must
        // take ticks from here on.
        A::enable_interrupts();
        Ok(())
    }

    /// Id of the thread executing this call.
    pub fn current_id(&self) -> ThreadId {
        let _irq = IrqGuard::<A>::acquire();
        self.table.lock().current()
    }

    /// Number of created threads, not counting the idle thread.
    pub fn thread_count(&self) -> usize {
        let _irq = IrqGuard::<A>::acquire();
        self.table.lock().count()
    }

    pub fn elapsed_ticks(&self) -> u64 {
        self.ticks.ticks()
    }

    pub fn elapsed(&self) -> Duration {
        self.ticks.elapsed()
    }

    /// Ask the scheduler which thread should run next.
    pub fn select_next_thread(&self) -> ThreadId {
        let _irq = IrqGuard::<A>::acquire();
        let table = self.table.lock();
        self.scheduler.select_next(&table)
    }

    /// Dispatch `target`.
    ///
    /// The caller goes back to READY if it was RUNNING, `target` becomes
    /// RUNNING and its dispatch count goes up. The call returns once the
    /// caller is dispatched again.
    pub fn switch_to_thread(&self, target: ThreadId) -> Result<(), ScheduleError> {
        let _irq = IrqGuard::<A>::acquire();
        if !self.table.lock().contains(target) {
            return Err(ScheduleError::NoSuchThread(target));
        }
        self.switch_to(target);
        Ok(())
    }

    /// Timer interrupt body: advance time, wake sleepers whose countdown
    /// ran out, close the statistics interval when due, then reschedule.
    pub fn tick(&self) {
        let _irq = IrqGuard::<A>::acquire();
        let now = self.ticks.increment();
        {
            let mut table = self.table.lock();
            table.update_sleepers();
            let interval = u64::from(self.config.stats_interval_ticks);
            if interval != 0 && now % interval == 0 {
                table.roll_sched_counts();
            }
        }
        self.reschedule();
    }

    /// Block the caller for `ticks` ticks. Zero returns immediately without
    /// yielding.
    pub fn sleep(&self, ticks: u32) {
        if ticks == 0 {
            return;
        }
        let wake_at = self.ticks.ticks() + u64::from(ticks);
        loop {
            let _irq = IrqGuard::<A>::acquire();
            let now = self.ticks.ticks();
            if now >= wake_at {
                return;
            }
            {
                let mut table = self.table.lock();
                let current = table.current_mut();
                current.state = ThreadState::Sleeping;
                current.sleep_ticks = u32::try_from(wake_at - now).unwrap_or(u32::MAX);
            }
            self.reschedule();
        }
    }

    /// Let the next READY thread run. The caller stays READY and runs again
    /// on its next turn; with nothing else READY this returns immediately.
    pub fn yield_now(&self) {
        let _irq = IrqGuard::<A>::acquire();
        self.reschedule();
    }

    /// Block the caller permanently.
    pub fn park_current_forever(&self) -> ! {
        loop {
            let _irq = IrqGuard::<A>::acquire();
            self.block_current();
            self.reschedule();
        }
    }

    /// Snapshot of one thread's bookkeeping.
    pub fn thread_info(&self, id: ThreadId) -> Option<ThreadInfo> {
        let _irq = IrqGuard::<A>::acquire();
        let table = self.table.lock();
        let tcb = table.get(id)?;
        Some(self.describe(tcb, table.current()))
    }

    /// Snapshot of the whole system, in the shape of the periodic report.
    pub fn stats(&self) -> SystemStats {
        let _irq = IrqGuard::<A>::acquire();
        let table = self.table.lock();
        let current = table.current();
        let mut stats = SystemStats::new(self.ticks.elapsed(), table.count());
        for tcb in table.workers() {
            stats.push(self.describe(tcb, current));
        }
        stats
    }

    /// Print [`Kernel::stats`] to the console.
    pub fn report(&self) {
        let stats = self.stats();
        crate::kprintln!("{}", stats);
    }

    fn describe(&self, tcb: &Tcb, current: ThreadId) -> ThreadInfo {
        let saved_sp = (tcb.id() != current)
            .then(|| self.stack_slots[tcb.id().index()].load(Ordering::Acquire));
        ThreadInfo::from_tcb(tcb, saved_sp)
    }

    /// Mark the caller WAITING. The caller must hold an [`IrqGuard`] and
    /// reschedule before releasing it.
    pub(crate) fn block_current(&self) {
        self.table.lock().current_mut().state = ThreadState::Waiting;
    }

    /// Move `id` from WAITING to READY. Threads in any other state are left
    /// alone.
    pub(crate) fn wake(&self, id: ThreadId) {
        let _irq = IrqGuard::<A>::acquire();
        if let Some(tcb) = self.table.lock().get_mut(id) {
            if tcb.state == ThreadState::Waiting {
                tcb.state = ThreadState::Ready;
            }
        }
    }

    pub(crate) fn reschedule(&self) {
        let next = self.select_next_thread();
        self.switch_to(next);
    }

    /// Dispatch a thread known to be in the table.
    pub(crate) fn switch_to(&self, target: ThreadId) {
        let _irq = IrqGuard::<A>::acquire();
        let prev = self.table.lock().dispatch(target);
        if prev == target {
            return;
        }

        let next = self.stack_slots[target.index()].as_ptr();
        let prev = self.stack_slots[prev.index()].as_ptr();
        // SAFETY: interrupts are masked, the table lock is released and both
        // slots belong to this kernel; `next` holds the stack pointer saved
        // when `target` last left the CPU, or the one `init_stack` produced.
        unsafe { A::context_switch(&self.cpu, next, prev) };
    }
}

impl<A: Arch, S: Scheduler> TickHandler for Kernel<A, S> {
    fn tick(&self) {
        Kernel::tick(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arch::hosted::HostedArch;
    use crate::errors::ThreadError;
    use crate::sync::Semaphore;
    use crate::test_helpers::{capture_console, idle_entry, leak_kernel, TestKernel};
    use crate::thread::MAIN_THREAD_ID;
    use portable_atomic::AtomicU64;
    use std::string::ToString;
    use std::sync::Arc;

    #[test]
    fn test_new_kernel() {
        let kernel = leak_kernel();
        assert!(!kernel.is_started());
        assert_eq!(kernel.thread_count(), 0);
        assert_eq!(kernel.current_id(), MAIN_THREAD_ID);
        assert_eq!(kernel.elapsed_ticks(), 0);
    }

    #[test]
    fn test_table_capacity() {
        let kernel = leak_kernel();
        for i in 0..ThreadTable::CAPACITY {
            let id = kernel.create_thread("worker", idle_entry, i, 128).unwrap();
            assert_eq!(id, ThreadId::new(i));
            assert_eq!(kernel.thread_info(id).unwrap().state, ThreadState::Ready);
        }

        let err = kernel.create_thread("extra", idle_entry, 0, 128).unwrap_err();
        assert_eq!(err, ThreadError::Spawn(SpawnError::TableFull));
        assert_eq!(kernel.thread_count(), ThreadTable::CAPACITY);
    }

    #[test]
    fn test_create_thread_records_entry_and_stack() {
        let kernel = leak_kernel();
        let id = kernel.create_thread("blinker_thread", idle_entry, 0, 256).unwrap();

        let info = kernel.thread_info(id).unwrap();
        assert_eq!(info.name.as_str(), "blinker_th");
        assert_eq!(info.entry, idle_entry as usize);
        assert!(info.stack_size >= 256 + crate::arch::hosted::HostedArch::RESERVED_FRAME_BYTES);
        assert_eq!(info.stack_high % Stack::ALIGN, 0);
        assert!(info.saved_sp.unwrap() < info.stack_high);
        assert_eq!(info.sched_count, 0);
    }

    #[test]
    fn test_create_thread_stack_too_large() {
        let kernel = leak_kernel();
        let err = kernel.create_thread("huge", idle_entry, 0, usize::MAX).unwrap_err();
        assert_eq!(err, ThreadError::Spawn(SpawnError::StackTooLarge(usize::MAX)));
        assert_eq!(kernel.thread_count(), 0);
    }

    #[test]
    fn test_create_thread_logs() {
        let captured = capture_console();
        let kernel = leak_kernel();
        kernel.create_thread("logged", idle_entry, 0, 64).unwrap();
        assert!(captured.contains("'logged'"));
    }

    #[test]
    fn test_entry_receives_argument() {
        struct Probe {
            kernel: &'static TestKernel,
            seen: AtomicUsize,
        }

        extern "C" fn probe_entry(arg: usize) -> ! {
            let probe = unsafe { &*(arg as *const Probe) };
            probe.seen.store(arg, Ordering::SeqCst);
            probe.kernel.park_current_forever()
        }

        let kernel = leak_kernel();
        let probe: &'static Probe = Box::leak(Box::new(Probe {
            kernel,
            seen: AtomicUsize::new(0),
        }));
        let arg = probe as *const Probe as usize;
        kernel.create_thread("probe", probe_entry, arg, 256).unwrap();

        kernel.start().unwrap();
        assert_eq!(probe.seen.load(Ordering::SeqCst), arg);
        assert_eq!(kernel.current_id(), MAIN_THREAD_ID);
    }

    #[test]
    fn test_start_twice() {
        let kernel = leak_kernel();
        kernel.start().unwrap();
        assert!(kernel.is_started());
        assert_eq!(
            kernel.start().unwrap_err(),
            ThreadError::Schedule(ScheduleError::AlreadyStarted)
        );
    }

    #[test]
    fn test_start_unmasks_interrupts_on_idle_thread() {
        let kernel = leak_kernel();
        let sleeper = kernel.spawn("sleeper", 1024, move || kernel.sleep(1)).unwrap();

        // As after reset: the boot path enters with IRQs masked.
        HostedArch::disable_interrupts();
        kernel.start().unwrap();

        assert_eq!(kernel.current_id(), MAIN_THREAD_ID);
        assert_eq!(kernel.thread_info(sleeper).unwrap().state, ThreadState::Sleeping);
        assert!(HostedArch::interrupts_enabled());
    }

    #[test]
    fn test_idle_sleep_woken_by_worker_ticks() {
        let kernel = leak_kernel();
        let go: &'static Semaphore = Box::leak(Box::new(Semaphore::new(0)));

        let ticker = kernel
            .spawn("ticker", 1024, move || {
                go.wait(kernel);
                for _ in 0..3 {
                    kernel.tick();
                }
            })
            .unwrap();

        // The ticker parks on `go` and the idle thread gets the CPU back.
        kernel.start().unwrap();
        go.signal(kernel);

        kernel.sleep(3);
        assert_eq!(kernel.elapsed_ticks(), 3);
        assert_eq!(kernel.current_id(), MAIN_THREAD_ID);

        let main = kernel.thread_info(MAIN_THREAD_ID).unwrap();
        assert_eq!(main.state, ThreadState::Running);
        assert_eq!(main.sleep_ticks, 0);
        assert_eq!(kernel.thread_info(ticker).unwrap().state, ThreadState::Waiting);
    }

    #[test]
    fn test_start_rejects_zero_tick_period() {
        let kernel: &'static TestKernel =
            Box::leak(Box::new(Kernel::new(KernelConfig::new().with_tick_period_us(0))));
        assert!(matches!(kernel.start(), Err(ThreadError::Timer(_))));
        assert!(!kernel.is_started());
    }

    #[test]
    fn test_switch_to_unknown_thread() {
        let kernel = leak_kernel();
        assert_eq!(
            kernel.switch_to_thread(ThreadId::new(2)),
            Err(ScheduleError::NoSuchThread(ThreadId::new(2)))
        );
        // Switching to the running thread only counts the dispatch.
        kernel.switch_to_thread(MAIN_THREAD_ID).unwrap();
        assert_eq!(kernel.thread_info(MAIN_THREAD_ID).unwrap().sched_count, 2);
    }

    #[test]
    fn test_closure_threads_run_in_creation_order() {
        let kernel = leak_kernel();
        let order = Arc::new(spin::Mutex::new(std::vec::Vec::new()));

        for name in ["first", "second", "third"] {
            let order = Arc::clone(&order);
            kernel
                .spawn(name, 1024, move || order.lock().push(name))
                .unwrap();
        }

        kernel.start().unwrap();
        assert_eq!(*order.lock(), ["first", "second", "third"]);
        for i in 0..3 {
            let info = kernel.thread_info(ThreadId::new(i)).unwrap();
            assert_eq!(info.state, ThreadState::Waiting);
        }
    }

    #[test]
    fn test_yield_alternates_threads() {
        let kernel = leak_kernel();
        let trace = Arc::new(spin::Mutex::new(std::vec::Vec::new()));

        for name in ["a", "b"] {
            let trace = Arc::clone(&trace);
            kernel
                .spawn(name, 1024, move || {
                    for round in 0..3 {
                        trace.lock().push((name, round));
                        kernel.yield_now();
                    }
                })
                .unwrap();
        }

        kernel.start().unwrap();
        assert_eq!(
            *trace.lock(),
            [("a", 0), ("b", 0), ("a", 1), ("b", 1), ("a", 2), ("b", 2)]
        );
    }

    #[test]
    fn test_sleep_wakes_after_countdown() {
        let kernel = leak_kernel();
        let woke_at = Arc::new(AtomicU64::new(0));

        let woke = Arc::clone(&woke_at);
        let sleeper = kernel
            .spawn("sleeper", 1024, move || {
                kernel.sleep(3);
                woke.store(kernel.elapsed_ticks(), Ordering::SeqCst);
            })
            .unwrap();

        kernel.start().unwrap();
        let info = kernel.thread_info(sleeper).unwrap();
        assert_eq!(info.state, ThreadState::Sleeping);
        assert_eq!(info.sleep_ticks, 3);

        kernel.tick();
        kernel.tick();
        assert_eq!(kernel.thread_info(sleeper).unwrap().state, ThreadState::Sleeping);
        assert_eq!(woke_at.load(Ordering::SeqCst), 0);

        kernel.tick();
        assert_eq!(woke_at.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_sleep_zero_does_not_yield() {
        let kernel = leak_kernel();
        let trace = Arc::new(spin::Mutex::new(std::vec::Vec::new()));

        let t = Arc::clone(&trace);
        kernel
            .spawn("a", 1024, move || {
                kernel.sleep(0);
                t.lock().push("a done");
            })
            .unwrap();
        let t = Arc::clone(&trace);
        kernel.spawn("b", 1024, move || t.lock().push("b done")).unwrap();

        kernel.start().unwrap();
        assert_eq!(*trace.lock(), ["a done", "b done"]);
    }

    #[test]
    fn test_tick_preempts_round_robin() {
        let kernel = leak_kernel();
        let sleeper_loops = Arc::new(AtomicU64::new(0));
        let spinner_loops = Arc::new(AtomicU64::new(0));
        const TICKS: u64 = 20;

        let loops = Arc::clone(&sleeper_loops);
        kernel
            .spawn("sleeper", 1024, move || loop {
                loops.fetch_add(1, Ordering::SeqCst);
                kernel.sleep(1);
            })
            .unwrap();

        let loops = Arc::clone(&spinner_loops);
        kernel
            .spawn("spinner", 1024, move || {
                let mut n = 0u64;
                while kernel.elapsed_ticks() < TICKS {
                    loops.fetch_add(1, Ordering::SeqCst);
                    n += 1;
                    // The spinner plays the timer: one tick every 50 loops.
                    if n % 50 == 0 {
                        kernel.tick();
                    }
                }
            })
            .unwrap();

        kernel.start().unwrap();

        // Back on the idle thread once the spinner finished and the sleeper
        // sleeps.
        assert_eq!(kernel.elapsed_ticks(), TICKS);
        let x = sleeper_loops.load(Ordering::SeqCst);
        let y = spinner_loops.load(Ordering::SeqCst);
        assert!((TICKS..=TICKS + 1).contains(&x), "sleeper ran {} times", x);
        assert!(y > 10 * x, "spinner ran {} times", y);
    }

    #[test]
    fn test_stats_interval_rolls_counts() {
        let kernel: &'static TestKernel = Box::leak(Box::new(Kernel::new(
            KernelConfig::new().with_stats_interval_ticks(4),
        )));
        kernel.start().unwrap();

        // Idle thread alone: every tick dispatches it again.
        for _ in 0..4 {
            kernel.tick();
        }
        let main = kernel.thread_info(MAIN_THREAD_ID).unwrap();
        assert_eq!(main.prev_sched_count, 5);
        assert_eq!(main.sched_count, 1);
        assert_eq!(kernel.elapsed(), Duration::from_millis(40));
    }

    #[test]
    fn test_stats_report() {
        let kernel = leak_kernel();
        kernel.create_thread("reporter", idle_entry, 0, 128).unwrap();

        let stats = kernel.stats();
        assert_eq!(stats.thread_count, 1);
        assert_eq!(stats.threads.len(), 1);

        let text = stats.to_string();
        assert!(text.contains("Thread count: 1"));
        assert!(text.contains("Thread name: reporter"));
        assert!(text.contains("State: READY"));
    }
}
