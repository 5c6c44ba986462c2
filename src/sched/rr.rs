//! Round-robin scheduler.

use super::trait_def::Scheduler;
use crate::thread::{ThreadId, ThreadState, ThreadTable, MAIN_THREAD_ID};

/// Round-robin over created threads in creation order.
///
/// - From the idle thread, the first READY thread in creation order wins.
/// - From a created thread, the search starts at the thread after it and
///   wraps around, ending just before the current thread. If nothing else
///   is READY, the current thread keeps the CPU while it is still RUNNING;
///   otherwise the idle thread runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RoundRobinScheduler;

impl RoundRobinScheduler {
    pub const fn new() -> Self {
        Self
    }
}

impl Scheduler for RoundRobinScheduler {
    fn select_next(&self, table: &ThreadTable) -> ThreadId {
        let current = table.current();

        if current.is_main() {
            return table
                .workers()
                .find(|tcb| tcb.state() == ThreadState::Ready)
                .map_or(MAIN_THREAD_ID, |tcb| tcb.id());
        }

        let count = table.count();
        let start = current.index();
        let next_ready = (1..count)
            .map(|offset| ThreadId::new((start + offset) % count))
            .find(|&id| table.get(id).map(|tcb| tcb.state()) == Some(ThreadState::Ready));

        match next_ready {
            Some(id) => id,
            None if table.get(current).map(|tcb| tcb.state()) == Some(ThreadState::Running) => current,
            None => MAIN_THREAD_ID,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::fill_table;

    fn set_state(table: &mut ThreadTable, index: usize, state: ThreadState) {
        table.get_mut(ThreadId::new(index)).unwrap().state = state;
    }

    #[test]
    fn test_idle_picks_first_ready() {
        let mut table = ThreadTable::new();
        let sched = RoundRobinScheduler::new();
        assert_eq!(sched.select_next(&table), MAIN_THREAD_ID);

        fill_table(&mut table, 3);
        set_state(&mut table, 0, ThreadState::Sleeping);
        assert_eq!(sched.select_next(&table), ThreadId::new(1));
    }

    #[test]
    fn test_rotation_wraps_around() {
        let mut table = ThreadTable::new();
        let sched = RoundRobinScheduler::new();
        fill_table(&mut table, 3);

        table.dispatch(ThreadId::new(2));
        assert_eq!(sched.select_next(&table), ThreadId::new(0));

        table.dispatch(ThreadId::new(0));
        assert_eq!(sched.select_next(&table), ThreadId::new(1));

        table.dispatch(ThreadId::new(1));
        assert_eq!(sched.select_next(&table), ThreadId::new(2));
    }

    #[test]
    fn test_running_thread_keeps_cpu_when_alone() {
        let mut table = ThreadTable::new();
        let sched = RoundRobinScheduler::new();
        fill_table(&mut table, 2);

        table.dispatch(ThreadId::new(0));
        set_state(&mut table, 1, ThreadState::Waiting);
        assert_eq!(sched.select_next(&table), ThreadId::new(0));

        // Once it blocks too, only the idle thread is left.
        table.current_mut().state = ThreadState::Sleeping;
        assert_eq!(sched.select_next(&table), MAIN_THREAD_ID);
    }
}
