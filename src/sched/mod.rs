//! Thread scheduling policy.
//!
//! The kernel asks its [`Scheduler`] which thread to run next whenever it
//! reschedules; dispatching the chosen thread is the kernel's job.

pub mod rr;
pub mod trait_def;

pub use rr::RoundRobinScheduler;
pub use trait_def::Scheduler;

/// Default scheduler type.
pub type DefaultScheduler = RoundRobinScheduler;
