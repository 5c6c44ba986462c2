//! Thread identities, states and control blocks.

use crate::config::{MAX_NAME_LEN, MAX_THREADS};
use crate::mem::Stack;
use core::fmt;

pub mod builder;
pub mod info;
pub mod table;

pub use builder::ThreadBuilder;
pub use info::{SystemStats, ThreadInfo};
pub use table::ThreadTable;

/// Entry point of a kernel thread. It receives the argument given at
/// creation and never returns.
pub type ThreadEntry = extern "C" fn(usize) -> !;

/// Bounded thread name.
pub type ThreadName = heapless::String<MAX_NAME_LEN>;

/// Id of the idle thread: the context that called `start`. It owns the last
/// table slot and is the fallback whenever nothing else is ready.
pub const MAIN_THREAD_ID: ThreadId = ThreadId((MAX_THREADS - 1) as u8);

/// Index of a thread in the thread table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u8);

impl ThreadId {
    /// # Panics
    ///
    /// Panics if `index` is not a table slot.
    pub const fn new(index: usize) -> Self {
        assert!(index < MAX_THREADS, "thread index out of range");
        Self(index as u8)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_main(self) -> bool {
        self.0 == MAIN_THREAD_ID.0
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThreadState {
    Running = 0,
    Ready = 1,
    Sleeping = 2,
    Waiting = 3,
}

impl fmt::Display for ThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ThreadState::Running => "RUNNING",
            ThreadState::Ready => "READY",
            ThreadState::Sleeping => "SLEEPING",
            ThreadState::Waiting => "WAITING",
        };
        f.write_str(label)
    }
}

/// Copy `name` into a [`ThreadName`], cutting it at [`MAX_NAME_LEN`] bytes
/// on a character boundary.
pub fn bounded_name(name: &str) -> ThreadName {
    let mut bounded = ThreadName::new();
    for c in name.chars() {
        if bounded.push(c).is_err() {
            break;
        }
    }
    bounded
}

/// Thread control block.
///
/// The saved stack pointer lives next to the table in the kernel, where the
/// context-switch primitive can write it without holding the table lock.
#[derive(Debug)]
pub struct Tcb {
    pub(crate) id: ThreadId,
    pub(crate) name: ThreadName,
    pub(crate) entry: usize,
    pub(crate) stack: Option<Stack>,
    pub(crate) state: ThreadState,
    pub(crate) sleep_ticks: u32,
    pub(crate) sched_count: u32,
    pub(crate) prev_sched_count: u32,
}

impl Tcb {
    pub(crate) fn new(id: ThreadId, name: &str, entry: ThreadEntry, stack: Stack) -> Self {
        Self {
            id,
            name: bounded_name(name),
            entry: entry as usize,
            stack: Some(stack),
            state: ThreadState::Ready,
            sleep_ticks: 0,
            sched_count: 0,
            prev_sched_count: 0,
        }
    }

    /// The idle thread: already running on the boot stack, so it owns no
    /// stack and no entry point.
    pub(crate) fn main() -> Self {
        Self {
            id: MAIN_THREAD_ID,
            name: bounded_name("main"),
            entry: 0,
            stack: None,
            state: ThreadState::Running,
            sleep_ticks: 0,
            sched_count: 1,
            prev_sched_count: 0,
        }
    }

    /// Placeholder for a slot nobody has created yet.
    pub(crate) fn vacant(id: ThreadId) -> Self {
        Self {
            id,
            name: ThreadName::new(),
            entry: 0,
            stack: None,
            state: ThreadState::Waiting,
            sleep_ticks: 0,
            sched_count: 0,
            prev_sched_count: 0,
        }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ThreadState {
        self.state
    }

    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_ref()
    }
}
