// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Green thread stacks.
//!
//! One anonymous mapping per stack with a guard margin at each end. The
//! guards are never handed out: callers only see the usable range
//! between them.
//!
//! ```text
//! base                                              base + len
//! | guard | usable ............................... | guard |
//!         ^ usable_ptr()
//! ```

use std::io;
use std::ptr::{self, NonNull};

use crate::error::StackError;

/// How the guard margins are enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardPolicy {
    /// Guards rounded up to whole pages and mapped `PROT_NONE`, so an
    /// overflow faults immediately.
    Protect,
    /// Guards are reserved address range only. Overflow into them is not
    /// detected.
    Reserve,
}

/// An owned stack region. Unmapped on `free()` or drop.
#[derive(Debug)]
pub struct Stack {
    base: Option<NonNull<u8>>,
    len: usize,
    guard: usize,
}

impl Stack {
    /// Map a zeroed read/write region of at least `size` bytes with
    /// `guard` bytes reserved at each end.
    pub fn allocate(size: usize, guard: usize, policy: GuardPolicy) -> Result<Self, StackError> {
        let (len, guard) = match policy {
            GuardPolicy::Protect => {
                let page = page_size();
                match (round_up(size, page), round_up(guard, page)) {
                    (Some(len), Some(guard)) => (len, guard),
                    _ => return Err(StackError::TooLarge { size: size.max(guard) }),
                }
            }
            GuardPolicy::Reserve => (size, guard),
        };

        if len <= guard.saturating_mul(2) {
            return Err(StackError::TooSmall { size: len, guard });
        }

        // Anonymous mappings are zero-filled by the kernel.
        let raw = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_STACK,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(StackError::Map {
                size: len,
                source: io::Error::last_os_error(),
            });
        }

        let mut stack = Self {
            base: NonNull::new(raw as *mut u8),
            len,
            guard,
        };

        if policy == GuardPolicy::Protect {
            // On failure `stack` drops here and unmaps the region.
            stack.protect_guards().map_err(StackError::Protect)?;
        }

        log::trace!(
            "mapped stack at {:p}: {} bytes, {} usable",
            raw,
            len,
            stack.usable_len()
        );
        Ok(stack)
    }

    fn protect_guards(&mut self) -> io::Result<()> {
        let Some(base) = self.base else {
            return Ok(());
        };
        let low = base.as_ptr();
        // SAFETY: both guards lie inside the mapping; `len > 2 * guard`.
        let high = unsafe { low.add(self.len - self.guard) };
        for region in [low, high] {
            let ret = unsafe { libc::mprotect(region as *mut libc::c_void, self.guard, libc::PROT_NONE) };
            if ret != 0 {
                return Err(io::Error::last_os_error());
            }
        }
        Ok(())
    }

    /// Lowest usable address, just above the low guard.
    pub fn usable_ptr(&self) -> *mut u8 {
        match self.base {
            // SAFETY: `guard < len`, stays inside the mapping.
            Some(base) => unsafe { base.as_ptr().add(self.guard) },
            None => ptr::null_mut(),
        }
    }

    /// Usable bytes between the two guards. Zero once freed.
    pub fn usable_len(&self) -> usize {
        if self.base.is_some() {
            self.len - 2 * self.guard
        } else {
            0
        }
    }

    /// Effective guard size at each end, after page rounding.
    pub fn guard_len(&self) -> usize {
        self.guard
    }

    /// Total mapped bytes, guards included.
    pub fn total_len(&self) -> usize {
        self.len
    }

    pub fn is_freed(&self) -> bool {
        self.base.is_none()
    }

    /// The usable range as a byte slice.
    ///
    /// # Safety
    /// No green thread may be executing on this stack while the slice is
    /// alive.
    pub unsafe fn usable_mut(&mut self) -> &mut [u8] {
        match self.base {
            Some(_) => std::slice::from_raw_parts_mut(self.usable_ptr(), self.usable_len()),
            None => &mut [],
        }
    }

    /// Unmap the region. No-op when already freed.
    pub fn free(&mut self) {
        let Some(base) = self.base.take() else {
            return;
        };
        let ret = unsafe { libc::munmap(base.as_ptr() as *mut libc::c_void, self.len) };
        if ret != 0 {
            log::warn!(
                "munmap of stack at {:p} failed: {}",
                base.as_ptr(),
                io::Error::last_os_error()
            );
        }
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        self.free();
    }
}

pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

fn round_up(n: usize, align: usize) -> Option<usize> {
    n.checked_next_multiple_of(align)
}
