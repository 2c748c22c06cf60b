//! Reference [`CpuPort`] for hosted, general-purpose operating systems.
//! Gated behind the `std` feature and not part of the default `no_std`
//! build — per-architecture ports are out of scope for this crate; this
//! one exists so the scenarios in the test suite are runnable in CI on a
//! developer's workstation instead of only on target hardware.
//!
//! Strategy: one native OS thread backs each kernel thread. A context
//! switch doesn't move registers around — it wakes the native thread
//! backing `resume` and, if there is an outgoing thread, parks its native
//! thread until something wakes it again. The park/wake rendezvous for a
//! given context is a `(Mutex<bool>, Condvar)` pair belonging to that
//! context; both are `const`-constructible so `HostedContext` stays
//! `'static`-initializable with no runtime setup step, same as every other
//! port's `Context`.
//!
//! The one piece of state genuinely shared across every native thread is
//! the preemption gate itself: `preempt_disable`/`preempt_enable` must
//! compose across two separate, non-lexically-scoped calls, which a
//! borrow-checked `MutexGuard` cannot do on its own. A `spin::Mutex<()>`
//! plus a thread-local slot holding its guard gives exactly that — lock on
//! `preempt_disable`, stash the guard, drop it (and so unlock) on
//! `preempt_enable`. On a hosted port there is no hardware interrupt line to
//! mask, only the ticker thread's access to the same kernel state, so
//! holding this lock *is* masking the tick.

use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::kernel::{with_interrupt_gate, Kernel};
use crate::port::CpuPort;

/// Per-thread park/wake rendezvous. Stands in for a real CPU context:
/// "resuming" a `HostedContext` means waking the native OS thread parked on
/// it; "suspending" means parking the calling native thread on its own.
pub struct HostedContext {
    runnable: Mutex<bool>,
    cv: Condvar,
    spawned: AtomicBool,
}

impl HostedContext {
    const fn new() -> Self {
        HostedContext { runnable: Mutex::new(false), cv: Condvar::new(), spawned: AtomicBool::new(false) }
    }

    fn wake(&'static self) {
        let mut guard = self.runnable.lock().unwrap();
        *guard = true;
        self.cv.notify_one();
    }

    /// Park the calling native thread until [`HostedContext::wake`] is
    /// called on this same context, then consume the wakeup.
    fn park(&'static self) {
        let mut guard = self.runnable.lock().unwrap();
        while !*guard {
            guard = self.cv.wait(guard).unwrap();
        }
        *guard = false;
    }
}

static GATE: spin::Mutex<()> = spin::Mutex::new(());
static TICKS: AtomicU64 = AtomicU64::new(0);

thread_local! {
    /// The calling native thread's held span of [`GATE`], if any. Mirrors
    /// `CriticalGuard`'s per-thread nesting: the gate is acquired by one
    /// free-function call and released by a later, unrelated one, so the
    /// guard has to be stashed somewhere keyed on the calling OS thread
    /// rather than returned up a call stack.
    static HELD_GATE: RefCell<Option<spin::MutexGuard<'static, ()>>> = const { RefCell::new(None) };
}

/// Reference hosted [`CpuPort`]: one native OS thread per kernel thread, a
/// `spin::Mutex` standing in for interrupt masking, and a sleeping ticker
/// thread (see [`spawn_ticker`]) standing in for a real `ITIMER_VIRTUAL`
/// signal.
pub struct HostedPort;

impl CpuPort for HostedPort {
    type Context = HostedContext;

    const INIT_CONTEXT: Self::Context = HostedContext::new();

    fn init_tcb(ctx: &'static Self::Context, entry: fn(usize), arg: usize, _stack: &mut [u32]) {
        if ctx.spawned.swap(true, Ordering::SeqCst) {
            Self::assert_failed("init_tcb called twice on the same hosted context");
        }
        std::thread::Builder::new()
            .name(std::format!("kthread-{arg:#x}"))
            .spawn(move || {
                // Wait to be scheduled for the first time before running
                // any kernel-thread code at all.
                ctx.park();
                entry(arg);
            })
            .expect("failed to spawn hosted kernel thread");
    }

    fn context_switch(suspend: Option<&'static Self::Context>, resume: &'static Self::Context) {
        resume.wake();
        match suspend {
            Some(s) => s.park(),
            // `kernel_run`'s bootstrap caller has no context of its own to
            // resume into later; it just blocks forever, matching
            // `CpuPort::context_switch`'s contract that this call never
            // returns when `suspend` is `None`.
            None => loop {
                std::thread::park();
            },
        }
    }

    fn context_switch_irq(resume: &'static Self::Context) {
        resume.wake();
    }

    fn preempt_disable() {
        let guard = GATE.lock();
        HELD_GATE.with(|h| {
            let prev = h.borrow_mut().replace(guard);
            assert!(prev.is_none(), "preempt_disable re-entered on the same native thread");
        });
    }

    fn preempt_enable() {
        let had = HELD_GATE.with(|h| h.borrow_mut().take());
        assert!(had.is_some(), "preempt_enable without a matching preempt_disable");
    }

    fn assert_failed(msg: &str) -> ! {
        log::error!("kernel assertion failed: {msg}");
        std::process::abort();
    }

    fn idle() {
        std::thread::yield_now();
    }

    fn now_ticks() -> u64 {
        TICKS.load(Ordering::Relaxed)
    }
}

/// Spawn the reference port's tick source: a native thread that sleeps for
/// `period` (1 ms by default, matching the 1 kHz default tick rate), then
/// drives the kernel's tick handler under the same gate a real
/// hardware ISR would hold implicitly. Returns a handle the caller can
/// `join` (it never finishes on its own) or simply drop to detach.
pub fn spawn_ticker(kernel: &'static Kernel<HostedPort>, period: Duration) -> std::thread::JoinHandle<()> {
    std::thread::Builder::new()
        .name("hosted-ticker".into())
        .spawn(move || loop {
            std::thread::sleep(period);
            with_interrupt_gate::<HostedPort, _>(|| {
                TICKS.fetch_add(1, Ordering::Relaxed);
                kernel.thread_tick();
            });
        })
        .expect("failed to spawn hosted tick thread")
}
