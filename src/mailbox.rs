//! Bounded message mailbox behind a counting semaphore.

use core::cell::{Cell, UnsafeCell};

use crate::error::{KernelError, Result};
use crate::kernel::Kernel;
use crate::port::CpuPort;
use crate::semaphore::Semaphore;

/// Fixed-capacity ring of `N` 32-bit payload slots. `N` is a type-level
/// const generic rather than a runtime `size` field threaded through every
/// call — a C-style ring buffer needs a `size_t size` member only because
/// a raw array doesn't carry its own length; a const generic gives the same
/// information to the compiler instead.
pub struct Mailbox<P: CpuPort, const N: usize> {
    slots: UnsafeCell<[u32; N]>,
    head: Cell<usize>,
    tail: Cell<usize>,
    count: Cell<usize>,
    sem: Semaphore<P>,
}

unsafe impl<P: CpuPort, const N: usize> Sync for Mailbox<P, N> {}

impl<P: CpuPort, const N: usize> Mailbox<P, N> {
    pub const fn new() -> Self {
        Mailbox {
            slots: UnsafeCell::new([0; N]),
            head: Cell::new(0),
            tail: Cell::new(0),
            count: Cell::new(0),
            sem: Semaphore::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.count.get()
    }

    pub fn is_empty(&self) -> bool {
        self.count.get() == 0
    }

    pub fn is_full(&self) -> bool {
        self.count.get() == N
    }

    pub fn capacity(&self) -> usize {
        N
    }

    fn push_locked(&self, v: u32) -> bool {
        if self.count.get() == N {
            return false;
        }
        let tail = self.tail.get();
        unsafe { (*self.slots.get())[tail] = v };
        self.tail.set((tail + 1) % N);
        self.count.set(self.count.get() + 1);
        true
    }

    fn pop_locked(&self) -> u32 {
        debug_assert!(self.count.get() > 0, "mailbox semaphore signaled with an empty ring");
        let head = self.head.get();
        let v = unsafe { (*self.slots.get())[head] };
        self.head.set((head + 1) % N);
        self.count.set(self.count.get() - 1);
        v
    }

    /// Enqueue `v`. Fails with `Err(KernelError::MailboxFull)` instead of
    /// blocking when the ring is at capacity — a producer must not stall.
    pub fn post(&self, kernel: &'static Kernel<P>, v: u32) -> Result<()> {
        let g = kernel.critical();
        let ok = self.push_locked(v);
        drop(g);
        if !ok {
            return Err(KernelError::MailboxFull);
        }
        self.sem.post(kernel);
        Ok(())
    }

    /// As [`Mailbox::post`], but safe to call from interrupt context.
    pub fn post_irq(&self, kernel: &'static Kernel<P>, v: u32) -> Result<()> {
        let ok = crate::kernel::with_interrupt_gate::<P, _>(|| self.push_locked(v));
        if !ok {
            return Err(KernelError::MailboxFull);
        }
        self.sem.post_irq(kernel);
        Ok(())
    }

    /// Block until a message is available, then dequeue it.
    pub fn pend(&self, kernel: &'static Kernel<P>) -> u32 {
        self.sem.pend(kernel);
        let g = kernel.critical();
        let v = self.pop_locked();
        drop(g);
        v
    }

    /// As [`Mailbox::pend`], but gives up after `ticks` with
    /// `Err(KernelError::TimedOut)` and leaves the ring untouched.
    pub fn pend_timed(&self, kernel: &'static Kernel<P>, ticks: u32) -> Result<u32> {
        self.sem.timed_pend(kernel, ticks)?;
        let g = kernel.critical();
        let v = self.pop_locked();
        drop(g);
        Ok(v)
    }
}

impl<P: CpuPort, const N: usize> Default for Mailbox<P, N> {
    fn default() -> Self {
        Self::new()
    }
}
