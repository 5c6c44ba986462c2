//! Kernel console.
//!
//! The kernel does not own a character driver. The application installs any
//! [`core::fmt::Write`] sink (a UART writer on hardware, a buffer in tests)
//! and the [`kprint!`](crate::kprint) / [`kprintln!`](crate::kprintln)
//! macros format into it. With no sink installed the macros do nothing.
//!
//! Output is written with interrupts masked, so a line is never interleaved
//! with output from a thread preempted halfway through it.

use crate::arch::without_interrupts;
use core::fmt::{self, Write};
use spin::Mutex;

type Sink = &'static mut (dyn Write + Send);

static CONSOLE: Mutex<Option<Sink>> = Mutex::new(None);

/// Route kernel output to `sink`, returning the previously installed one.
pub fn install(sink: Sink) -> Option<Sink> {
    without_interrupts(|| CONSOLE.lock().replace(sink))
}

/// Stop kernel output, handing back the installed sink.
pub fn remove() -> Option<Sink> {
    without_interrupts(|| CONSOLE.lock().take())
}

#[doc(hidden)]
pub fn _print(args: fmt::Arguments<'_>) {
    without_interrupts(|| {
        if let Some(sink) = CONSOLE.lock().as_mut() {
            let _ = sink.write_fmt(args);
        }
    });
}

/// Print a formatted string to the kernel console.
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::console::_print(format_args!($($arg)*))
    };
}

/// Print a formatted string to the kernel console with a newline.
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint!("\n")
    };
    ($($arg:tt)*) => {{
        $crate::kprint!($($arg)*);
        $crate::kprint!("\n");
    }};
}
