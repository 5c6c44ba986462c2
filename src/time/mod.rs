//! Kernel time keeping.

pub mod tick;

pub use tick::TickCounter;
