//! Nestable critical sections.
//!
//! This is deliberately *not* "hold the kernel's data-structure lock": the
//! critical flag is per-thread, not global. A thread that calls a blocking
//! primitive while inside a critical section still yields the CPU — the
//! thread picked to run next may have a `critical_depth` of zero even though
//! the thread it replaced was nested several critical sections deep. Tests
//! rely on this (the mutex scenario sleeps inside a held mutex, for
//! instance).
//!
//! Concretely this means the nesting counter cannot live in one global
//! (unlike e.g. `x86_64::instructions::interrupts` style masks): it lives on
//! [`Thread`] itself (`critical_depth`), and [`CriticalGuard`] is handed the
//! *calling* thread once at construction so its `Drop` always unwinds the
//! same thread's counter, regardless of what [`crate::kernel`] considers
//! "current" by the time the guard actually drops (which, for the thread
//! that entered the section, is always itself again — see
//! `KernelCell::thread_pick`).

use core::ptr::NonNull;

use crate::port::CpuPort;
use crate::thread::Thread;

/// RAII guard for a critical section. Entering before any thread exists, or
/// from interrupt/tick context, is a deliberate no-op — represented here by
/// a guard holding no thread at all.
#[must_use = "the critical section ends when this guard drops"]
pub struct CriticalGuard<P: CpuPort> {
    thread: Option<NonNull<Thread<P>>>,
}

impl<P: CpuPort> CriticalGuard<P> {
    /// `current` is the thread on whose behalf the section is entered —
    /// `None` before `kernel_init` or when called from interrupt context,
    /// both of which are no-ops.
    pub(crate) fn enter(current: Option<NonNull<Thread<P>>>) -> Self {
        if let Some(t) = current {
            let thr = unsafe { t.as_ref() };
            let depth = thr.critical_depth.get();
            debug_assert!(depth < 255, "critical_depth overflow");
            thr.critical_depth.set(depth + 1);
            if depth == 0 {
                P::preempt_disable();
            }
        }
        CriticalGuard { thread: current }
    }
}

impl<P: CpuPort> Drop for CriticalGuard<P> {
    fn drop(&mut self) {
        if let Some(t) = self.thread {
            let thr = unsafe { t.as_ref() };
            let depth = thr.critical_depth.get();
            debug_assert!(depth > 0, "critical_end without matching critical_start");
            let depth = depth - 1;
            thr.critical_depth.set(depth);
            if depth == 0 {
                P::preempt_enable();
            }
        }
    }
}

/// Raw, non-nestable preemption gate for code that has no [`Thread`] of its
/// own to hang a nesting counter off of — the tick source and any `_irq`
/// entry point ("no-op from interrupt context" only holds because a real
/// ISR already runs with interrupts masked by hardware; the hosted
/// reference port has no such hardware guarantee and takes this instead).
///
/// Never held across a call that might itself try to acquire it again
/// (e.g. never across [`crate::kernel::KernelCell::thread_load_context`]
/// called on behalf of a *thread*, which uses [`CriticalGuard`]).
#[must_use = "the gate closes when this guard drops"]
pub(crate) struct InterruptGate<P: CpuPort>(core::marker::PhantomData<P>);

impl<P: CpuPort> InterruptGate<P> {
    pub(crate) fn enter() -> Self {
        P::preempt_disable();
        InterruptGate(core::marker::PhantomData)
    }
}

impl<P: CpuPort> Drop for InterruptGate<P> {
    fn drop(&mut self) {
        P::preempt_enable();
    }
}
