//! The abstract CPU/architecture contract the scheduler is built on.
//!
//! Everything in this crate outside of [`crate::hosted`] is
//! architecture-neutral: it never touches a register, a stack pointer or an
//! interrupt controller directly. All of that lives behind the [`CpuPort`]
//! trait, separating scheduling policy from per-architecture mechanism —
//! the whole mechanism side is a single trait a real firmware crate
//! implements for its own silicon.

/// Lowest real thread priority. Equal-priority threads round-robin.
pub const MIN_PRIO: i8 = 0;
/// Highest real thread priority.
pub const MAX_PRIO: i8 = 10;
/// Priority reserved for the kernel-provided idle thread; never assignable
/// to a user thread (see [`KernelError::BadPriority`](crate::error::KernelError::BadPriority)).
pub const IDLE_PRIO: i8 = -1;
/// Pseudo-priority used while `critical_start`/tick bookkeeping runs so
/// priority comparisons against "no thread at all" are well-ordered.
pub const INT_PRIO: i8 = MAX_PRIO + 1;

/// Stack-painting sentinel written to the last machine word of every
/// thread's stack. Checked on every context switch; a mismatch means a
/// stack overflowed into kernel memory and is fatal, reported through
/// [`CpuPort::assert_failed`].
pub const STACK_SENTINEL: u32 = 0xCAFE_FEAD;

/// Reference scheduling-tick rate assumed by doc comments and the hosted
/// port; not otherwise baked into the scheduler, which only ever counts
/// raw ticks.
pub const DEFAULT_TICK_HZ: u32 = 1000;

/// Everything the architecture-neutral scheduler needs from the machine:
/// how to build an initial register context for a new thread, how to swap
/// two of them, how to disable/enable preemption, and how to fail loudly
/// when an invariant breaks.
///
/// A port owns exactly one thing the scheduler cannot: the ability to stop
/// one flow of control and resume another. Everything else (ready queues,
/// sleep queues, synchronization primitives) is plain, portable Rust
/// generic over this trait.
pub trait CpuPort: Sized + 'static {
    /// Saved machine state for one thread: registers, stack pointer, and
    /// whatever else `context_switch` needs. Must be const-constructible
    /// so `static THREAD: Thread<P> = Thread::new();` works with no
    /// runtime initialization step.
    type Context: 'static;

    /// A context value usable as a `const` initializer, e.g. `static`
    /// storage for every not-yet-started thread. Plays the role a
    /// `Default` bound would, but `Default::default()` cannot run in
    /// const context, which `Thread::new()` requires.
    const INIT_CONTEXT: Self::Context;

    /// Prepare `ctx` so that, once selected to run, the thread begins
    /// executing `entry(arg)` on `stack`. Never called concurrently with
    /// itself on the same `ctx`; the thread has not been made runnable yet
    /// when this runs.
    fn init_tcb(ctx: &'static Self::Context, entry: fn(usize), arg: usize, stack: &mut [u32]);

    /// Voluntary switch: the calling thread (whose context is `suspend`,
    /// or `None` for the very first dispatch out of `kernel_run`) gives up
    /// the CPU and does not return until the scheduler selects it again.
    /// `resume` is the thread chosen to run next; if it equals `suspend`
    /// this is a no-op.
    fn context_switch(suspend: Option<&'static Self::Context>, resume: &'static Self::Context);

    /// Forced switch from tick/interrupt context: the caller is not itself
    /// a scheduled thread and must not block. Only wakes `resume`; the
    /// thread it is preempting notices on its own next kernel entry point.
    fn context_switch_irq(resume: &'static Self::Context);

    /// Raise the preemption-disable depth by one. The first call (depth
    /// 0 -> 1) must take whatever raw lock protects kernel data structures
    /// from concurrent mutation; nested calls are cheap no-ops.
    fn preempt_disable();

    /// Lower the preemption-disable depth by one, releasing the raw lock
    /// when it reaches zero.
    fn preempt_enable();

    /// Fatal invariant violation: log `msg` at error level and never
    /// return. Used for stack-sentinel corruption, double-free of a TCB,
    /// and similar programmer errors that a `Result` cannot represent
    /// safely.
    fn assert_failed(msg: &str) -> !;

    /// One iteration of the idle thread's body, run in a loop by the
    /// kernel-provided idle thread. Typically "wait for interrupt" on real
    /// hardware; a hosted port can sleep briefly or yield to the host
    /// scheduler instead of spinning.
    fn idle();

    /// Monotonic tick counter as seen by the port (e.g. for seeding a
    /// hosted ticker thread's first deadline). Not used by the
    /// architecture-neutral scheduler itself, which tracks ticks in
    /// [`crate::kernel::Kernel`].
    fn now_ticks() -> u64 {
        0
    }

    /// Free words left on `ctx`'s stack, counted from the low end by
    /// scanning for unmodified [`STACK_SENTINEL`] words. Default of `0` is
    /// safe but uninformative; ports that paint and track a real
    /// stack should override it. The hosted reference port has no real
    /// stack to scan and leaves the default.
    fn stack_free(_ctx: &'static Self::Context) -> usize {
        0
    }

    /// Total stack size, in words, backing `ctx`. Used only for
    /// diagnostics (`thread_dump_list`).
    fn stack_size(_ctx: &'static Self::Context) -> usize {
        0
    }
}
