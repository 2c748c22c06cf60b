//! Counting semaphore with optional ticks-based timeout.

use core::cell::{Cell, UnsafeCell};

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::list::{List, PendSel};
use crate::port::CpuPort;

/// A non-negative counter plus a FIFO pend list of blocked waiters.
///
/// Every operation takes the owning [`Kernel<P>`] explicitly rather than the
/// semaphore storing a pointer to it internally — unlike
/// [`crate::thread::Thread`], which *does* stash an `owning_kernel` pointer
/// because the context-switch trampoline has no other way to reach it, a
/// semaphore's caller always already has the kernel handle in scope, so
/// there is nothing to gain from hiding it behind a second field.
///
/// The count is a plain `Cell<i32>`, not an atomic: every access already
/// runs inside a critical section, the same tradeoff the kernel itself
/// makes for `Inner`'s fields.
pub struct Semaphore<P: CpuPort> {
    count: Cell<i32>,
    pend: UnsafeCell<List<P, PendSel>>,
}

// SAFETY: every field access happens inside a critical section taken via
// `kernel.critical()` or `with_interrupt_gate`, same as `KernelCell` itself.
unsafe impl<P: CpuPort> Sync for Semaphore<P> {}

impl<P: CpuPort> Semaphore<P> {
    pub const fn new(initial: i32) -> Self {
        Semaphore { count: Cell::new(initial), pend: UnsafeCell::new(List::new()) }
    }

    fn pend_list(&self) -> &mut List<P, PendSel> {
        unsafe { &mut *self.pend.get() }
    }

    /// Current count, for diagnostics. A coherent snapshot requires the
    /// caller to already hold `kernel.critical()`, same as any other raw
    /// field in this crate.
    pub fn count(&self) -> i32 {
        self.count.get()
    }

    /// Number of threads currently blocked waiting for a unit.
    pub fn waiters(&self) -> usize {
        self.pend_list().len()
    }

    fn try_take_locked(&self) -> bool {
        let c = self.count.get();
        if c > 0 {
            self.count.set(c - 1);
            true
        } else {
            false
        }
    }

    /// Non-blocking take: succeeds only if a unit is immediately available.
    pub fn try_take(&self, kernel: &'static Kernel<P>) -> bool {
        let _g = kernel.critical();
        self.try_take_locked()
    }

    /// Block until a unit is available.
    pub fn pend(&self, kernel: &'static Kernel<P>) {
        let g = kernel.critical();
        if self.try_take_locked() {
            return;
        }
        let cur = kernel.current().as_non_null();
        unsafe { cur.as_ref() }.clear_woken_by_post();
        kernel.thread_block(cur);
        self.pend_list().push_back_tracked(cur);
        kernel.thread_load_context(g, false);
    }

    /// Block until a unit is available or `ticks` elapse, whichever comes
    /// first. `ticks == 0` behaves like [`Semaphore::try_take`].
    pub fn timed_pend(&self, kernel: &'static Kernel<P>, ticks: u32) -> Result<()> {
        let g = kernel.critical();
        if self.try_take_locked() {
            drop(g);
            return Ok(());
        }
        if ticks == 0 {
            drop(g);
            return Err(KernelError::TimedOut);
        }
        let cur = kernel.current().as_non_null();
        unsafe { cur.as_ref() }.clear_woken_by_post();
        self.pend_list().push_back_tracked(cur);
        kernel.thread_sleep_thread(cur, ticks);
        kernel.thread_load_context(g, false);
        // Re-check woken_by_post and, if false, self-remove from the pend
        // list under the same critical section — otherwise a post() could
        // land in the gap between thread_load_context returning and this
        // check, popping the waiter and setting woken_by_post a moment too
        // late for this thread to see it, losing the transferred unit.
        let g2 = kernel.critical();
        if unsafe { cur.as_ref() }.was_woken_by_post() {
            drop(g2);
            Ok(())
        } else {
            // Timed out: self-remove from the pend list. `remove_tracked` is
            // a no-op if the node isn't there, which would itself mean a
            // post raced the timeout without setting `woken_by_post`, an
            // invariant violation we'd rather catch below than paper over.
            debug_assert!(
                unsafe { cur.as_ref() }.pend_owner.get() == self.pend.get(),
                "timed out thread not found on its own pend list"
            );
            self.pend_list().remove_tracked(cur);
            drop(g2);
            Err(KernelError::TimedOut)
        }
    }

    /// Release one unit, waking the longest-waiting blocked thread if any.
    /// No waiter means no wakeup candidate exists; in that case, and only
    /// that case, the count is incremented — waking a waiter instead
    /// transfers the unit directly, leaving the count at `0` as invariant 5
    /// requires. Only valid from thread context; interrupt handlers must
    /// use [`Semaphore::post_irq`].
    pub fn post(&self, kernel: &'static Kernel<P>) {
        let g = kernel.critical();
        match self.pend_list().pop_front_tracked() {
            Some(w) => {
                unsafe { w.as_ref() }.mark_woken_by_post();
                kernel.thread_unblock(g, w);
            }
            None => {
                self.count.set(self.count.get() + 1);
                drop(g);
            }
        }
    }

    /// As [`Semaphore::post`], but safe to call from interrupt context:
    /// never performs a synchronous context switch of its own — the
    /// tick/IRQ epilogue dispatches instead.
    pub fn post_irq(&self, kernel: &'static Kernel<P>) {
        let woken = crate::kernel::with_interrupt_gate::<P, _>(|| match self.pend_list().pop_front_tracked() {
            Some(w) => {
                unsafe { w.as_ref() }.mark_woken_by_post();
                Some(w)
            }
            None => {
                self.count.set(self.count.get() + 1);
                None
            }
        });
        if let Some(w) = woken {
            kernel.thread_unblock_irq(w);
        }
    }
}
