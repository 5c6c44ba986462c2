//! Thread stacks.
//!
//! A stack is one zeroed heap block. The register frames that let a new
//! thread be switched to for the first time are written at its high end by
//! the architecture backend.

use crate::errors::MemoryError;
use alloc::alloc::{alloc_zeroed, dealloc, Layout};
use core::ptr::NonNull;

/// A thread stack.
///
/// Stacks grow downwards: execution starts near [`Stack::high`] and the
/// stack pointer must stay above [`Stack::low`].
#[derive(Debug)]
pub struct Stack {
    /// Lowest address of the block
    memory: NonNull<u8>,
    size: usize,
}

impl Stack {
    /// Alignment of the block and of the initial stack pointer.
    pub const ALIGN: usize = 16;

    /// Allocate a zeroed stack of at least `size` bytes, rounded up to
    /// [`Stack::ALIGN`].
    pub fn allocate(size: usize) -> Result<Self, MemoryError> {
        let size = size
            .checked_add(Self::ALIGN - 1)
            .map(|s| s & !(Self::ALIGN - 1))
            .filter(|&s| s > 0)
            .ok_or(MemoryError::InvalidLayout(size))?;
        let layout =
            Layout::from_size_align(size, Self::ALIGN).map_err(|_| MemoryError::InvalidLayout(size))?;

        // SAFETY: `layout` has a non-zero size.
        let memory = unsafe { alloc_zeroed(layout) };
        let memory = NonNull::new(memory).ok_or(MemoryError::OutOfMemory)?;

        Ok(Self { memory, size })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Lowest usable address.
    pub fn low(&self) -> usize {
        self.memory.as_ptr() as usize
    }

    /// One past the highest usable address, 16-byte aligned.
    pub fn high(&self) -> usize {
        (self.low() + self.size) & !(Self::ALIGN - 1)
    }

    /// Bytes in use when the stack pointer is at `sp`.
    pub fn usage(&self, sp: usize) -> usize {
        self.high().saturating_sub(sp)
    }

    pub fn contains(&self, addr: usize) -> bool {
        (self.low()..=self.high()).contains(&addr)
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        if let Ok(layout) = Layout::from_size_align(self.size, Self::ALIGN) {
            // SAFETY: allocated in `allocate` with this exact layout.
            unsafe { dealloc(self.memory.as_ptr(), layout) };
        }
    }
}

// SAFETY: the block is owned exclusively by its thread control block.
unsafe impl Send for Stack {}
unsafe impl Sync for Stack {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_is_zeroed_and_aligned() {
        let stack = Stack::allocate(100).unwrap();
        assert_eq!(stack.size(), 112);
        assert_eq!(stack.low() % Stack::ALIGN, 0);
        assert_eq!(stack.high() % Stack::ALIGN, 0);
        assert_eq!(stack.high() - stack.low(), 112);

        let bytes = unsafe { core::slice::from_raw_parts(stack.low() as *const u8, stack.size()) };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_usage() {
        let stack = Stack::allocate(256).unwrap();
        assert_eq!(stack.usage(stack.high()), 0);
        assert_eq!(stack.usage(stack.high() - 96), 96);
        assert!(stack.contains(stack.high() - 96));
        assert!(!stack.contains(stack.high() + 16));
    }

    #[test]
    fn test_invalid_sizes() {
        assert_eq!(Stack::allocate(0).unwrap_err(), MemoryError::InvalidLayout(0));
        assert!(matches!(
            Stack::allocate(usize::MAX),
            Err(MemoryError::InvalidLayout(_))
        ));
    }
}
