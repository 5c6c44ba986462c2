//! Fixed-size thread table.
//!
//! Slots `0..count` hold created threads in creation order; the last slot
//! always holds the idle thread. Threads are never removed.

use super::{Tcb, ThreadId, ThreadState, MAIN_THREAD_ID};
use crate::config::MAX_THREADS;

pub struct ThreadTable {
    threads: [Tcb; MAX_THREADS],
    count: usize,
    current: ThreadId,
}

impl ThreadTable {
    /// Most threads that can be created next to the idle thread.
    pub const CAPACITY: usize = MAX_THREADS - 1;

    /// Table holding only the idle thread, which is current and running.
    pub fn new() -> Self {
        let threads = core::array::from_fn(|index| {
            let id = ThreadId::new(index);
            if id.is_main() {
                Tcb::main()
            } else {
                Tcb::vacant(id)
            }
        });

        Self {
            threads,
            count: 0,
            current: MAIN_THREAD_ID,
        }
    }

    /// Number of created threads, not counting the idle thread.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_full(&self) -> bool {
        self.count == Self::CAPACITY
    }

    pub fn current(&self) -> ThreadId {
        self.current
    }

    /// Whether `id` names the idle thread or a created one.
    pub fn contains(&self, id: ThreadId) -> bool {
        id.is_main() || id.index() < self.count
    }

    pub fn get(&self, id: ThreadId) -> Option<&Tcb> {
        self.contains(id).then(|| &self.threads[id.index()])
    }

    pub(crate) fn get_mut(&mut self, id: ThreadId) -> Option<&mut Tcb> {
        if self.contains(id) {
            Some(&mut self.threads[id.index()])
        } else {
            None
        }
    }

    pub(crate) fn current_mut(&mut self) -> &mut Tcb {
        &mut self.threads[self.current.index()]
    }

    /// Created threads in creation order.
    pub fn workers(&self) -> impl Iterator<Item = &Tcb> {
        self.threads[..self.count].iter()
    }

    /// Store the control block built by `build` in the next free slot.
    pub(crate) fn insert(&mut self, build: impl FnOnce(ThreadId) -> Tcb) -> Option<ThreadId> {
        if self.is_full() {
            return None;
        }
        let id = ThreadId::new(self.count);
        self.threads[id.index()] = build(id);
        self.count += 1;
        Some(id)
    }

    /// Make `target` the running thread.
    ///
    /// The outgoing thread goes back to READY only if it was still RUNNING;
    /// a thread that blocked keeps its SLEEPING or WAITING state. Returns the
    /// outgoing thread.
    ///
    /// Handing the CPU back to a blocked current thread (the idle thread
    /// when nothing is READY) is not a dispatch: it is neither counted nor
    /// marked RUNNING.
    pub(crate) fn dispatch(&mut self, target: ThreadId) -> ThreadId {
        let prev = self.current;
        let outgoing = &mut self.threads[prev.index()];
        if prev == target
            && matches!(outgoing.state, ThreadState::Sleeping | ThreadState::Waiting)
        {
            return prev;
        }
        if outgoing.state == ThreadState::Running {
            outgoing.state = ThreadState::Ready;
        }

        let incoming = &mut self.threads[target.index()];
        incoming.sched_count = incoming.sched_count.wrapping_add(1);
        incoming.state = ThreadState::Running;
        self.current = target;
        prev
    }

    /// Count one tick off every sleeping thread; those reaching zero become
    /// READY.
    pub(crate) fn update_sleepers(&mut self) {
        let (workers, main) = self.threads.split_at_mut(MAIN_THREAD_ID.index());
        for tcb in workers[..self.count].iter_mut().chain(main.iter_mut()) {
            if tcb.state != ThreadState::Sleeping {
                continue;
            }
            tcb.sleep_ticks = tcb.sleep_ticks.saturating_sub(1);
            if tcb.sleep_ticks == 0 {
                tcb.state = ThreadState::Ready;
            }
        }
    }

    /// Close a statistics interval: remember every thread's dispatch count
    /// and start counting from zero.
    pub(crate) fn roll_sched_counts(&mut self) {
        for tcb in self.threads.iter_mut() {
            tcb.prev_sched_count = tcb.sched_count;
            tcb.sched_count = 0;
        }
    }

    #[cfg(test)]
    pub(crate) fn running_count(&self) -> usize {
        let main = &self.threads[MAIN_THREAD_ID.index()];
        self.workers()
            .chain(core::iter::once(main))
            .filter(|tcb| tcb.state == ThreadState::Running)
            .count()
    }
}

impl Default for ThreadTable {
    fn default() -> Self {
        Self::new()
    }
}
