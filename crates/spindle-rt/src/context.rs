// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Execution context: saved machine state of one line of control.
//!
//! Backed by the platform user-context facility (`getcontext`,
//! `makecontext`, `swapcontext`). Nothing is passed across a switch;
//! threads communicate through memory the caller arranges.

use std::io;
use std::mem::MaybeUninit;
use std::ptr;

use crate::stack::Stack;

#[cfg(not(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86_64", target_arch = "aarch64")
)))]
compile_error!("spindle-rt supports only Linux glibc on x86_64 and aarch64");

/// Saved stack pointer, callee-saved registers and signal mask.
///
/// glibc stores a pointer into the context itself, so a context must not
/// move after `capture` or `prepare`. Keep it behind a `Box`.
#[repr(transparent)]
pub struct Context {
    uc: libc::ucontext_t,
}

impl Context {
    /// A zeroed context, boxed so its address is stable.
    pub fn empty() -> Box<Self> {
        // SAFETY: `ucontext_t` is plain data; all-zero is a valid value.
        let uc = unsafe { MaybeUninit::<libc::ucontext_t>::zeroed().assume_init() };
        Box::new(Self { uc })
    }

    /// Snapshot the current state into this slot.
    pub fn capture(&mut self) -> io::Result<()> {
        let ret = unsafe { libc::getcontext(&mut self.uc) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    /// Capture, then retarget this context to start `entry` on the usable
    /// range of `stack`. `entry` has no return continuation and must
    /// never return.
    ///
    /// # Safety
    /// `stack` must outlive every switch into this context, and `self`
    /// must not move afterwards.
    pub unsafe fn prepare(&mut self, stack: &Stack, entry: extern "C" fn()) -> io::Result<()> {
        self.capture()?;
        self.uc.uc_stack.ss_sp = stack.usable_ptr() as *mut libc::c_void;
        self.uc.uc_stack.ss_size = stack.usable_len();
        self.uc.uc_stack.ss_flags = 0;
        self.uc.uc_link = ptr::null_mut();
        libc::makecontext(&mut self.uc, entry, 0);
        Ok(())
    }

    /// Save the current state into `save` and resume `resume`.
    ///
    /// Returns once some other context swaps back into `save`.
    ///
    /// # Safety
    /// Both pointers must be valid for the whole suspension, `resume`
    /// must hold a captured or prepared context, and no live `&mut`
    /// reference may alias either one across the call.
    pub unsafe fn swap(save: *mut Context, resume: *const Context) -> io::Result<()> {
        let ret = libc::swapcontext(ptr::addr_of_mut!((*save).uc), ptr::addr_of!((*resume).uc));
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("stack", &self.uc.uc_stack.ss_sp)
            .field("stack_size", &self.uc.uc_stack.ss_size)
            .finish()
    }
}
