//! A small preemptive, priority-based real-time multitasking kernel core.
//!
//! This crate is the architecture-neutral half of a real-time kernel: a
//! fixed-priority, preemptive scheduler with round-robin among
//! equal-priority threads, a tick-driven sleep/timeout mechanism, nestable
//! critical sections, and the synchronization primitives built on top of
//! the scheduler (counting semaphores, optionally-recursive mutexes,
//! bitmap events, bounded mailboxes). It allocates nothing: every thread,
//! stack, semaphore, mutex, event and mailbox is caller-provided `'static`
//! storage, so the whole crate is usable in a `#![no_std]`, no-`alloc`
//! firmware image.
//!
//! The other half — saving and restoring a real CPU's registers, building
//! an initial stack frame, arming a periodic tick interrupt — is out of
//! scope and lives behind the [`CpuPort`](port::CpuPort) trait, implemented
//! once per target. This crate bundles exactly one such implementation,
//! [`hosted::HostedPort`], gated behind the `std` feature: a reference port
//! for hosted, general-purpose operating systems, built from one native OS
//! thread per kernel thread, so the full test suite is runnable in CI
//! instead of only on target hardware.
//!
//! # Example
//!
//! ```no_run
//! use rtkernel::hosted::{spawn_ticker, HostedPort};
//! use rtkernel::kernel::Kernel;
//! use rtkernel::thread::{Thread, ThreadState};
//! use std::time::Duration;
//!
//! static KERNEL: Kernel<HostedPort> = Kernel::new();
//! static IDLE: Thread<HostedPort> = Thread::new();
//! static WORKER: Thread<HostedPort> = Thread::new();
//! static mut IDLE_STACK: [u32; 256] = [0; 256];
//! static mut WORKER_STACK: [u32; 256] = [0; 256];
//!
//! fn worker(_arg: usize) -> i32 {
//!     loop {
//!         KERNEL.thread_sleep(1);
//!     }
//! }
//!
//! # fn main() {
//! KERNEL.init(&IDLE, unsafe { &mut IDLE_STACK });
//! KERNEL
//!     .thread_init(&WORKER, "worker", 0, worker, 0, unsafe { &mut WORKER_STACK }, ThreadState::Runnable)
//!     .unwrap();
//! let _ticker = spawn_ticker(&KERNEL, Duration::from_millis(1));
//! // KERNEL.run() never returns.
//! # }
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod critical;
pub mod error;
pub mod event;
#[cfg(feature = "std")]
pub mod hosted;
pub mod kernel;
pub mod list;
pub mod mailbox;
pub mod mutex;
pub mod port;
pub mod semaphore;
pub mod thread;

pub use error::{KernelError, Result};
pub use event::Event;
pub use kernel::Kernel;
pub use mailbox::Mailbox;
pub use mutex::Mutex;
pub use port::{CpuPort, DEFAULT_TICK_HZ, IDLE_PRIO, INT_PRIO, MAX_PRIO, MIN_PRIO, STACK_SENTINEL};
pub use semaphore::Semaphore;
pub use thread::{Thread, ThreadId, ThreadState};
