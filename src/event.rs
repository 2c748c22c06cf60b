//! 32-bit bitmap event, coalesced behind an internal arrival semaphore.

use core::cell::Cell;

use crate::error::Result;
use crate::kernel::Kernel;
use crate::port::CpuPort;
use crate::semaphore::Semaphore;

/// An event coalesces however many `set` calls arrive between two `get`s
/// into a single wakeup carrying the OR of every bit posted — the contract
/// is "wake once per first bit set, deliver everything accumulated since",
/// not "wake once per `set` call".
pub struct Event<P: CpuPort> {
    value: Cell<u32>,
    sem: Semaphore<P>,
}

unsafe impl<P: CpuPort> Sync for Event<P> {}

impl<P: CpuPort> Event<P> {
    pub const fn new() -> Self {
        Event { value: Cell::new(0), sem: Semaphore::new(0) }
    }

    /// OR `bits` into the pending value. The arrival semaphore is only
    /// posted on the transition from "nothing pending" to "something
    /// pending"; later arrivals before the next `get`/`get_timed` coalesce
    /// into the same wakeup instead of queuing a second one.
    pub fn set(&self, kernel: &'static Kernel<P>, bits: u32) {
        let g = kernel.critical();
        let was_empty = self.value.get() == 0;
        self.value.set(self.value.get() | bits);
        drop(g);
        if was_empty {
            self.sem.post(kernel);
        }
    }

    /// As [`Event::set`], but safe to call from interrupt context.
    pub fn set_irq(&self, kernel: &'static Kernel<P>, bits: u32) {
        let was_empty = crate::kernel::with_interrupt_gate::<P, _>(|| {
            let was_empty = self.value.get() == 0;
            self.value.set(self.value.get() | bits);
            was_empty
        });
        if was_empty {
            self.sem.post_irq(kernel);
        }
    }

    /// Block until at least one bit has arrived, then atomically drain and
    /// return the accumulated bitmap.
    pub fn get(&self, kernel: &'static Kernel<P>) -> u32 {
        self.sem.pend(kernel);
        let g = kernel.critical();
        let v = self.value.get();
        self.value.set(0);
        drop(g);
        v
    }

    /// As [`Event::get`], but gives up after `ticks` with
    /// `Err(KernelError::TimedOut)` instead of blocking forever.
    pub fn get_timed(&self, kernel: &'static Kernel<P>, ticks: u32) -> Result<u32> {
        self.sem.timed_pend(kernel, ticks)?;
        let g = kernel.critical();
        let v = self.value.get();
        self.value.set(0);
        drop(g);
        Ok(v)
    }

    /// Non-blocking, non-draining read of the currently accumulated bitmap
    /// — for diagnostics, and for tests asserting on accumulated-but-
    /// unconsumed state.
    pub fn peek(&self) -> u32 {
        self.value.get()
    }
}

impl<P: CpuPort> Default for Event<P> {
    fn default() -> Self {
        Self::new()
    }
}
