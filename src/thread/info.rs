//! Read-only snapshots of thread and system state.

use super::{Tcb, ThreadId, ThreadName, ThreadState};
use crate::config::MAX_THREADS;
use core::fmt;
use core::time::Duration;

/// Copy of one thread's bookkeeping, taken with interrupts masked.
#[derive(Debug, Clone)]
pub struct ThreadInfo {
    pub id: ThreadId,
    pub name: ThreadName,
    pub state: ThreadState,
    /// Address of the entry function; zero for the idle thread.
    pub entry: usize,
    pub stack_low: usize,
    pub stack_high: usize,
    pub stack_size: usize,
    /// Saved stack pointer; `None` for the running thread, whose stack
    /// pointer is live in the CPU.
    pub saved_sp: Option<usize>,
    pub sleep_ticks: u32,
    /// Dispatches in the current statistics interval.
    pub sched_count: u32,
    /// Dispatches in the last completed statistics interval.
    pub prev_sched_count: u32,
}

impl ThreadInfo {
    pub(crate) fn from_tcb(tcb: &Tcb, saved_sp: Option<usize>) -> Self {
        let (stack_low, stack_high, stack_size) = tcb
            .stack()
            .map_or((0, 0, 0), |stack| (stack.low(), stack.high(), stack.size()));

        Self {
            id: tcb.id,
            name: tcb.name.clone(),
            state: tcb.state,
            entry: tcb.entry,
            stack_low,
            stack_high,
            stack_size,
            saved_sp,
            sleep_ticks: tcb.sleep_ticks,
            sched_count: tcb.sched_count,
            prev_sched_count: tcb.prev_sched_count,
        }
    }

    /// Bytes of stack in use at the saved stack pointer.
    pub fn stack_usage(&self) -> Option<usize> {
        let sp = self.saved_sp?;
        (self.stack_size != 0).then(|| self.stack_high.saturating_sub(sp))
    }
}

impl fmt::Display for ThreadInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Thread id: {}", self.id)?;
        writeln!(f, "Thread name: {}", self.name)?;
        writeln!(f, "Thread pc: {:#x}", self.entry)?;
        writeln!(f, "State: {}", self.state)?;
        writeln!(f, "Scheduled: {} last interval, {} so far", self.prev_sched_count, self.sched_count)?;
        match self.stack_usage() {
            Some(used) => writeln!(f, "Stack usage: {} bytes", used)?,
            None => writeln!(f, "Stack usage: -")?,
        }
        writeln!(f, "Total stack size: {} bytes", self.stack_size)?;
        match self.saved_sp {
            Some(sp) => writeln!(f, "Current top of stack: {:#x}", sp)?,
            None => writeln!(f, "Current top of stack: (running)")?,
        }
        writeln!(f, "Stack base: {:#x}", self.stack_high)?;
        write!(f, "Stack end: {:#x}", self.stack_low)
    }
}

/// System-wide snapshot, rendered as the periodic status report.
#[derive(Debug, Clone)]
pub struct SystemStats {
    pub elapsed: Duration,
    /// Created threads, the idle thread not included.
    pub thread_count: usize,
    pub threads: heapless::Vec<ThreadInfo, MAX_THREADS>,
}

impl SystemStats {
    pub(crate) fn new(elapsed: Duration, thread_count: usize) -> Self {
        Self {
            elapsed,
            thread_count,
            threads: heapless::Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, info: ThreadInfo) {
        // One entry per table slot at most.
        let _ = self.threads.push(info);
    }
}

impl fmt::Display for SystemStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Elapsed time: {} s", self.elapsed.as_secs())?;
        write!(f, "Thread count: {}", self.thread_count)?;
        for info in &self.threads {
            write!(f, "\n\n{}", info)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::Stack;
    use crate::test_helpers::idle_entry;
    use std::string::ToString;

    #[test]
    fn test_info_from_tcb() {
        let stack = Stack::allocate(256).unwrap();
        let high = stack.high();
        let tcb = Tcb::new(ThreadId::new(2), "stats", idle_entry, stack);

        let info = ThreadInfo::from_tcb(&tcb, Some(high - 48));
        assert_eq!(info.id, ThreadId::new(2));
        assert_eq!(info.state, ThreadState::Ready);
        assert_eq!(info.stack_size, 256);
        assert_eq!(info.stack_usage(), Some(48));

        let running = ThreadInfo::from_tcb(&tcb, None);
        assert_eq!(running.stack_usage(), None);
        assert!(running.to_string().contains("(running)"));
    }

    #[test]
    fn test_idle_thread_has_no_stack() {
        let info = ThreadInfo::from_tcb(&Tcb::main(), Some(0x1000));
        assert_eq!(info.stack_size, 0);
        assert_eq!(info.stack_usage(), None);
        assert_eq!(info.entry, 0);
    }

    #[test]
    fn test_stats_display() {
        let stack = Stack::allocate(128).unwrap();
        let tcb = Tcb::new(ThreadId::new(0), "worker", idle_entry, stack);

        let mut stats = SystemStats::new(Duration::from_secs(3), 1);
        stats.push(ThreadInfo::from_tcb(&tcb, None));
        let text = stats.to_string();
        assert!(text.starts_with("Elapsed time: 3 s\nThread count: 1\n\nThread id: 0\n"));
        assert!(text.contains("Thread name: worker"));
        assert!(text.contains("Total stack size: 128 bytes"));
    }
}
