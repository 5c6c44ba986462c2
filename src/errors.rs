//! Error types for kernel operations.
//!
//! Every fallible kernel entry point returns [`ThreadResult`]. The individual
//! enums stay small so they can be matched on in bare-metal code without
//! pulling in formatting machinery; `Display` is there for console output.

#![allow(clippy::uninlined_format_args)]

use crate::thread::ThreadId;
use core::fmt;

/// Result type for kernel operations.
pub type ThreadResult<T> = Result<T, ThreadError>;

/// Top-level error type for kernel operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadError {
    /// Thread creation errors
    Spawn(SpawnError),
    /// Scheduling errors
    Schedule(ScheduleError),
    /// Stack allocation errors
    Memory(MemoryError),
    /// Tick timer errors
    Timer(TimerError),
}

/// Errors that can occur while creating a thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnError {
    /// Every slot of the thread table is already taken
    TableFull,
    /// Requested stack size overflows once the register frames are added
    StackTooLarge(usize),
}

/// Errors related to scheduling operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleError {
    /// The id does not name a live thread
    NoSuchThread(ThreadId),
    /// `start` was called on a kernel that is already running
    AlreadyStarted,
}

/// Stack allocation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryError {
    /// The global allocator returned null
    OutOfMemory,
    /// The size cannot be expressed as a valid layout
    InvalidLayout(usize),
}

/// Tick timer errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerError {
    /// The period cannot be programmed (zero, or below timer resolution)
    InvalidPeriod(u32),
    /// No usable timer or interrupt controller on this platform
    NotAvailable,
}

impl fmt::Display for ThreadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadError::Spawn(e) => write!(f, "Thread creation error: {}", e),
            ThreadError::Schedule(e) => write!(f, "Scheduling error: {}", e),
            ThreadError::Memory(e) => write!(f, "Memory error: {}", e),
            ThreadError::Timer(e) => write!(f, "Timer error: {}", e),
        }
    }
}

impl fmt::Display for SpawnError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpawnError::TableFull => write!(f, "Thread table is full"),
            SpawnError::StackTooLarge(size) => write!(f, "Stack size too large: {}", size),
        }
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleError::NoSuchThread(id) => write!(f, "No such thread: {}", id),
            ScheduleError::AlreadyStarted => write!(f, "Kernel already started"),
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::OutOfMemory => write!(f, "Out of memory"),
            MemoryError::InvalidLayout(size) => write!(f, "Invalid stack layout for {} bytes", size),
        }
    }
}

impl fmt::Display for TimerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimerError::InvalidPeriod(us) => write!(f, "Invalid tick period: {} us", us),
            TimerError::NotAvailable => write!(f, "Tick timer not available"),
        }
    }
}

impl From<SpawnError> for ThreadError {
    fn from(err: SpawnError) -> Self {
        ThreadError::Spawn(err)
    }
}

impl From<ScheduleError> for ThreadError {
    fn from(err: ScheduleError) -> Self {
        ThreadError::Schedule(err)
    }
}

impl From<MemoryError> for ThreadError {
    fn from(err: MemoryError) -> Self {
        ThreadError::Memory(err)
    }
}

impl From<TimerError> for ThreadError {
    fn from(err: TimerError) -> Self {
        ThreadError::Timer(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::string::ToString;

    #[test]
    fn test_error_display() {
        let err = ThreadError::Spawn(SpawnError::TableFull);
        assert_eq!(err.to_string(), "Thread creation error: Thread table is full");

        let err: ThreadError = TimerError::InvalidPeriod(0).into();
        assert_eq!(err.to_string(), "Timer error: Invalid tick period: 0 us");
    }

    #[test]
    fn test_error_conversion() {
        let err: ThreadError = ScheduleError::AlreadyStarted.into();
        assert!(matches!(err, ThreadError::Schedule(ScheduleError::AlreadyStarted)));

        let err: ThreadError = MemoryError::OutOfMemory.into();
        assert_eq!(err, ThreadError::Memory(MemoryError::OutOfMemory));
    }
}
