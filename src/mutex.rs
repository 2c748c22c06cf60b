//! Owning mutex with optional recursion and FIFO pend queue.

use core::cell::{Cell, UnsafeCell};
use core::ptr::NonNull;

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::list::{List, PendSel};
use crate::port::CpuPort;
use crate::thread::{Thread, ThreadId};

/// Mutual exclusion lock. `owner == None` means unlocked; a non-recursive
/// mutex rejects a second `lock` from its own owner by blocking it, which,
/// called from the owner itself, is a self-deadlock.
///
/// Non-goal: priority inheritance/ceiling. A low-priority holder can
/// indefinitely delay a high-priority waiter; deployments are expected to
/// avoid priority inversion by design (e.g. keep critical sections short,
/// don't hold a mutex across a blocking call to a lower-priority subsystem).
pub struct Mutex<P: CpuPort> {
    owner: Cell<Option<NonNull<Thread<P>>>>,
    depth: Cell<u32>,
    recursive: bool,
    pend: UnsafeCell<List<P, PendSel>>,
}

// SAFETY: every field access happens inside a critical section taken via
// `kernel.critical()`.
unsafe impl<P: CpuPort> Sync for Mutex<P> {}

impl<P: CpuPort> Mutex<P> {
    /// `recursive`: whether the owner may lock again without deadlocking.
    /// Non-recursive is the common case and matches a `std::sync::Mutex`.
    pub const fn new(recursive: bool) -> Self {
        Mutex { owner: Cell::new(None), depth: Cell::new(0), recursive, pend: UnsafeCell::new(List::new()) }
    }

    fn pend_list(&self) -> &mut List<P, PendSel> {
        unsafe { &mut *self.pend.get() }
    }

    pub fn is_locked(&self) -> bool {
        self.owner.get().is_some()
    }

    pub fn owner_id(&self) -> Option<ThreadId> {
        self.owner.get().map(|t| unsafe { t.as_ref() }.id())
    }

    pub fn waiters(&self) -> usize {
        self.pend_list().len()
    }

    /// Non-blocking: `Err(KernelError::WouldDeadlock)` instead of parking
    /// the caller when the mutex is held by someone else.
    pub fn try_lock(&self, kernel: &'static Kernel<P>) -> Result<()> {
        let g = kernel.critical();
        let cur = kernel.current().as_non_null();
        let outcome = self.lock_fast_path(cur);
        drop(g);
        outcome.ok_or(KernelError::WouldDeadlock)
    }

    /// `Some(())` if the fast path (unowned, or recursive re-entry by the
    /// owner) applies and the lock was taken; `None` if the caller must
    /// contend.
    fn lock_fast_path(&self, cur: NonNull<Thread<P>>) -> Option<()> {
        match self.owner.get() {
            None => {
                self.owner.set(Some(cur));
                self.depth.set(0);
                Some(())
            }
            Some(o) if o == cur && self.recursive => {
                self.depth.set(self.depth.get() + 1);
                Some(())
            }
            _ => None,
        }
    }

    /// Acquire the lock, blocking if it is held by another thread. Blocking
    /// on a non-recursive mutex already held by the caller is a
    /// self-deadlock, faithfully reproduced rather than detected.
    pub fn lock(&self, kernel: &'static Kernel<P>) {
        let g = kernel.critical();
        let cur = kernel.current().as_non_null();
        if self.lock_fast_path(cur).is_some() {
            return;
        }
        kernel.thread_block(cur);
        self.pend_list().push_back_tracked(cur);
        kernel.thread_load_context(g, false);
    }

    /// Release one level. Must be called by the current owner
    /// (`Err(KernelError::NotOwner)` otherwise). If the pend list
    /// is non-empty, ownership transfers directly to the head waiter — there
    /// is no intermediate unlocked state a third thread could slip into.
    pub fn unlock(&self, kernel: &'static Kernel<P>) -> Result<()> {
        let g = kernel.critical();
        let cur = kernel.current().as_non_null();
        if self.owner.get() != Some(cur) {
            drop(g);
            return Err(KernelError::NotOwner);
        }
        if self.depth.get() > 0 {
            self.depth.set(self.depth.get() - 1);
            drop(g);
            return Ok(());
        }
        match self.pend_list().pop_front_tracked() {
            Some(w) => {
                self.owner.set(Some(w));
                self.depth.set(0);
                kernel.thread_unblock(g, w);
            }
            None => {
                self.owner.set(None);
                drop(g);
            }
        }
        Ok(())
    }
}
