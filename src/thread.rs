//! The thread control block.
//!
//! Every `alloc`-backed field (`Box`, `String`, `Vec`) a `Thread`/`ThreadState`
//! pair might otherwise carry is replaced here by a fixed-capacity or
//! caller-provided equivalent so a whole `Thread<P>` can live in `static`
//! storage with no heap and no runtime initialization step — `Thread::new()`
//! is a `const fn`.

use core::cell::{Cell, UnsafeCell};
use core::ptr::NonNull;

use heapless::String;

use crate::kernel::KernelCell;
use crate::list::Link;
use crate::port::CpuPort;

pub(crate) const NAME_CAP: usize = 16;

/// Opaque handle returned by `thread_init`; threads themselves are always
/// reached through `&'static Thread<P>`, this is just a stable identifier
/// for logging/equality (e.g. `thread_dump_list` printing each thread
/// exactly once needs no identity beyond the reference itself, but external
/// callers often want a `Copy` id they can stash).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct ThreadId(pub(crate) u32);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ThreadState {
    /// On the ready queue, or currently running (the running thread is
    /// always also the ready queue's head between ticks).
    Runnable,
    /// On the delta-ordered sleep queue, waiting for a tick deadline.
    Sleeping,
    /// On some synchronization primitive's pend queue.
    Blocked,
    /// Exited (via `thread_suicide`) or killed; still linked on the
    /// all-threads list and possibly has join waiters until `thread_kill`
    /// reclaims the slot.
    Dead,
    /// Slot has never been handed to `thread_init`, or was reclaimed by
    /// `thread_kill`.
    Unused,
}

pub struct Thread<P: CpuPort> {
    pub(crate) sentinel: Cell<u32>,
    id: Cell<u32>,
    name: UnsafeCell<String<NAME_CAP>>,
    priority: Cell<i8>,
    pub(crate) state: Cell<ThreadState>,

    pub(crate) sched_link: UnsafeCell<Link<P>>,
    pub(crate) pend_link: UnsafeCell<Link<P>>,
    pub(crate) all_link: UnsafeCell<Link<P>>,

    /// Ticks remaining until this thread wakes, counted relative to the
    /// thread *before* it in the sleep queue (delta encoding).
    pub(crate) sleep_delta: Cell<u32>,

    /// Nesting depth of this thread's own critical sections. Lives
    /// on the thread, not in a global, so a thread parked mid-critical-section
    /// by a blocking call doesn't leak its depth onto whichever thread gets
    /// picked next.
    pub(crate) critical_depth: Cell<u8>,

    /// Bumped every time [`crate::kernel::KernelCell::thread_pick`] selects
    /// this thread to run.
    pub(crate) run_count: Cell<u32>,

    pub(crate) join_waiters: UnsafeCell<crate::list::List<P, crate::list::PendSel>>,
    exit_value: Cell<i32>,

    /// Whichever pend queue `pend_link` is currently threaded into (a
    /// semaphore's, a mutex's, a mailbox's, or some other thread's
    /// `join_waiters`), or null when not blocked on one. Lets
    /// `thread_kill` rescue a blocked thread from a queue it has no other
    /// way to name generically.
    pub(crate) pend_owner: Cell<*mut crate::list::List<P, crate::list::PendSel>>,

    /// Set whenever `semaphore_post`/`semaphore_post_irq` (directly, or
    /// through mutex/event/mailbox) wakes this thread, cleared before a
    /// timed wait parks it. Lets a thread resuming from `timed_pend`
    /// distinguish "woken by a post" from "woken by timeout" without a race
    /// window, since both paths run under the same critical section.
    pub(crate) woken_by_post: Cell<bool>,

    entry: Cell<Option<fn(usize) -> i32>>,
    arg: Cell<usize>,
    owner: Cell<*const KernelCell<P>>,

    context: UnsafeCell<P::Context>,

    #[cfg(feature = "runtime-accounting")]
    pub(crate) runtime_ticks: Cell<u64>,
    #[cfg(feature = "runtime-accounting")]
    pub(crate) last_dispatch_tick: Cell<u64>,
}

// SAFETY: every field is only ever mutated from inside a critical section
// (see crate::critical) except the `context` field, which ports implement
// using their own internally-synchronized types (e.g. HostedContext uses a
// std Mutex+Condvar). Threads are always reached through `&'static`
// references so there is no lifetime concern, only the aliasing one
// critical sections resolve.
unsafe impl<P: CpuPort> Sync for Thread<P> {}

impl<P: CpuPort> Thread<P> {
    pub const fn new() -> Self {
        Thread {
            sentinel: Cell::new(crate::port::STACK_SENTINEL),
            id: Cell::new(0),
            name: UnsafeCell::new(String::new()),
            priority: Cell::new(crate::port::IDLE_PRIO),
            state: Cell::new(ThreadState::Unused),
            sched_link: UnsafeCell::new(Link::new()),
            pend_link: UnsafeCell::new(Link::new()),
            all_link: UnsafeCell::new(Link::new()),
            sleep_delta: Cell::new(0),
            critical_depth: Cell::new(0),
            run_count: Cell::new(0),
            join_waiters: UnsafeCell::new(crate::list::List::new()),
            exit_value: Cell::new(0),
            pend_owner: Cell::new(core::ptr::null_mut()),
            woken_by_post: Cell::new(false),
            entry: Cell::new(None),
            arg: Cell::new(0),
            owner: Cell::new(core::ptr::null()),
            context: UnsafeCell::new(P::INIT_CONTEXT),
            #[cfg(feature = "runtime-accounting")]
            runtime_ticks: Cell::new(0),
            #[cfg(feature = "runtime-accounting")]
            last_dispatch_tick: Cell::new(0),
        }
    }

    pub fn id(&self) -> ThreadId {
        ThreadId(self.id.get())
    }

    pub fn priority(&self) -> i8 {
        self.priority.get()
    }

    pub fn state(&self) -> ThreadState {
        self.state.get()
    }

    pub fn name(&self) -> String<NAME_CAP> {
        unsafe { (*self.name.get()).clone() }
    }

    pub fn context(&self) -> &P::Context {
        unsafe { &*self.context.get() }
    }

    pub(crate) fn check_sentinel(&self) {
        if self.sentinel.get() != crate::port::STACK_SENTINEL {
            P::assert_failed("stack sentinel corrupted");
        }
    }

    pub(crate) fn as_non_null(&'static self) -> NonNull<Thread<P>> {
        NonNull::from(self)
    }

    pub(crate) fn set_identity(&self, id: u32, name: &str, priority: i8) {
        self.id.set(id);
        self.priority.set(priority);
        unsafe {
            let s = &mut *self.name.get();
            s.clear();
            let _ = s.push_str(name);
        }
    }

    pub(crate) fn set_entry(&self, entry: fn(usize) -> i32, arg: usize, owner: *const KernelCell<P>) {
        self.entry.set(Some(entry));
        self.arg.set(arg);
        self.owner.set(owner);
    }

    pub(crate) fn entry(&self) -> fn(usize) -> i32 {
        self.entry.get().expect("trampoline on thread with no entry")
    }

    pub(crate) fn arg(&self) -> usize {
        self.arg.get()
    }

    pub(crate) fn owning_kernel(&self) -> &'static KernelCell<P> {
        // SAFETY: set once in thread_init to a 'static KernelCell<P> before
        // the trampoline can possibly run.
        unsafe { &*self.owner.get() }
    }

    pub(crate) fn exit_value(&self) -> i32 {
        self.exit_value.get()
    }

    pub(crate) fn set_exit_value(&self, v: i32) {
        self.exit_value.set(v);
    }

    /// Number of times this thread has been picked to run by the scheduler.
    pub fn run_count(&self) -> u32 {
        self.run_count.get()
    }

    /// Ticks remaining before a `SLEEPING` thread wakes; `0` otherwise.
    /// Reconstructed from the delta queue by summing from the head, since
    /// the stored field only holds the delta relative to the thread ahead
    /// of it.
    pub(crate) fn sleep_delta_raw(&self) -> u32 {
        self.sleep_delta.get()
    }

    pub(crate) fn join_waiters_mut(&self) -> &mut crate::list::List<P, crate::list::PendSel> {
        unsafe { &mut *self.join_waiters.get() }
    }

    pub(crate) fn mark_woken_by_post(&self) {
        self.woken_by_post.set(true);
    }

    pub(crate) fn clear_woken_by_post(&self) {
        self.woken_by_post.set(false);
    }

    pub(crate) fn was_woken_by_post(&self) -> bool {
        self.woken_by_post.get()
    }
}

/// Reconstruct a `&'static Thread<P>` from the `usize` passed to the
/// generic trampoline `fn(usize)`. Sound because `thread_init` only ever
/// encodes the address of a `'static` thread.
pub(crate) unsafe fn thread_from_addr<P: CpuPort>(addr: usize) -> &'static Thread<P> {
    unsafe { &*(addr as *const Thread<P>) }
}
