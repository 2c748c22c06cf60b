//! Intrusive doubly-linked list shared by the ready queue, the sleep queue,
//! every synchronization primitive's pend queue, and the all-threads list.
//!
//! No allocation: the link fields live inside [`crate::thread::Thread`]
//! itself, the usual trick a TCB uses for its own run/pend bookkeeping, just
//! generalized to one list type reused across every queue in the kernel via
//! the [`LinkSelector`] marker trait instead of one struct per queue kind.

use core::marker::PhantomData;
use core::ptr::NonNull;

use crate::port::CpuPort;
use crate::thread::Thread;

/// One node's prev/next pointers within a particular list. `Thread<P>`
/// holds one of these per list it can simultaneously belong to (scheduling
/// list, pend list, all-threads list).
pub struct Link<P: CpuPort> {
    pub(crate) prev: Option<NonNull<Thread<P>>>,
    pub(crate) next: Option<NonNull<Thread<P>>>,
    pub(crate) linked: bool,
}

impl<P: CpuPort> Link<P> {
    pub const fn new() -> Self {
        Link { prev: None, next: None, linked: false }
    }
}

/// Selects which [`Link`] field of a `Thread<P>` a given `List<P, S>`
/// instance threads through, and how to compare threads for the
/// priority-ordered insert used by the ready and sleep queues.
///
/// Implemented by zero-sized marker types ([`SchedSel`], [`PendSel`],
/// [`AllSel`]) rather than by `List` itself, so one generic `List<P, S>`
/// body serves every queue in the kernel.
pub trait LinkSelector<P: CpuPort> {
    /// # Safety
    /// `t` must point to a live `Thread<P>` for the duration of the borrow.
    unsafe fn link(t: NonNull<Thread<P>>) -> *mut Link<P>;
}

pub struct SchedSel;
pub struct PendSel;
pub struct AllSel;

impl<P: CpuPort> LinkSelector<P> for SchedSel {
    unsafe fn link(t: NonNull<Thread<P>>) -> *mut Link<P> {
        unsafe { (*t.as_ptr()).sched_link.get() }
    }
}

impl<P: CpuPort> LinkSelector<P> for PendSel {
    unsafe fn link(t: NonNull<Thread<P>>) -> *mut Link<P> {
        unsafe { (*t.as_ptr()).pend_link.get() }
    }
}

impl<P: CpuPort> LinkSelector<P> for AllSel {
    unsafe fn link(t: NonNull<Thread<P>>) -> *mut Link<P> {
        unsafe { (*t.as_ptr()).all_link.get() }
    }
}

/// A doubly-linked, intrusive, non-owning list of `Thread<P>` nodes.
///
/// All methods require `&mut self`; callers reach that mutable access only
/// from inside a critical section (see [`crate::critical`]), which is what
/// makes the raw pointer traffic inside here sound despite threads being
/// shared across a whole program via `'static` references.
pub struct List<P: CpuPort, S> {
    head: Option<NonNull<Thread<P>>>,
    tail: Option<NonNull<Thread<P>>>,
    len: usize,
    _sel: PhantomData<S>,
}

impl<P: CpuPort, S: LinkSelector<P>> List<P, S> {
    pub const fn new() -> Self {
        List { head: None, tail: None, len: 0, _sel: PhantomData }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn front(&self) -> Option<NonNull<Thread<P>>> {
        self.head
    }

    fn link_mut(t: NonNull<Thread<P>>) -> &'static mut Link<P> {
        unsafe { &mut *S::link(t) }
    }

    pub fn push_back(&mut self, t: NonNull<Thread<P>>) {
        debug_assert!(!Self::link_mut(t).linked, "push_back on already-linked thread");
        let link = Self::link_mut(t);
        link.prev = self.tail;
        link.next = None;
        link.linked = true;
        match self.tail {
            Some(old_tail) => Self::link_mut(old_tail).next = Some(t),
            None => self.head = Some(t),
        }
        self.tail = Some(t);
        self.len += 1;
    }

    pub fn push_front(&mut self, t: NonNull<Thread<P>>) {
        debug_assert!(!Self::link_mut(t).linked, "push_front on already-linked thread");
        let link = Self::link_mut(t);
        link.prev = None;
        link.next = self.head;
        link.linked = true;
        match self.head {
            Some(old_head) => Self::link_mut(old_head).prev = Some(t),
            None => self.tail = Some(t),
        }
        self.head = Some(t);
        self.len += 1;
    }

    /// Insert `t` immediately before the first node for which `before`
    /// returns `true`, or at the tail if none does. Used by the
    /// priority-ordered ready queue (first strictly-lower-priority node
    /// wins, giving round robin among equals via `push_back` semantics at
    /// the same priority) and the delta-encoded sleep queue.
    pub fn insert_before(&mut self, t: NonNull<Thread<P>>, mut before: impl FnMut(NonNull<Thread<P>>) -> bool) {
        let mut cursor = self.head;
        while let Some(c) = cursor {
            if before(c) {
                return self.insert_before_node(t, c);
            }
            cursor = Self::link_mut(c).next;
        }
        self.push_back(t);
    }

    /// Insert `t` directly before a node already known to be a member of
    /// this list (e.g. found by a manual walk, as the sleep queue's delta
    /// bookkeeping needs). Prefer [`insert_before`] when a predicate will
    /// do.
    pub(crate) fn insert_before_node(&mut self, t: NonNull<Thread<P>>, before: NonNull<Thread<P>>) {
        debug_assert!(!Self::link_mut(t).linked, "insert on already-linked thread");
        let prev = Self::link_mut(before).prev;
        {
            let link = Self::link_mut(t);
            link.prev = prev;
            link.next = Some(before);
            link.linked = true;
        }
        match prev {
            Some(p) => Self::link_mut(p).next = Some(t),
            None => self.head = Some(t),
        }
        Self::link_mut(before).prev = Some(t);
        self.len += 1;
    }

    pub fn pop_front(&mut self) -> Option<NonNull<Thread<P>>> {
        let t = self.head?;
        self.remove(t);
        Some(t)
    }

    /// Unlink `t` from this list. A no-op if `t` is not currently linked in
    /// it. A single `remove` primitive avoids the separate "last element"
    /// vs. "interior element" removal paths a naive translation invites,
    /// along with the bug class that comes with it.
    pub fn remove(&mut self, t: NonNull<Thread<P>>) {
        let link = Self::link_mut(t);
        if !link.linked {
            return;
        }
        let (prev, next) = (link.prev, link.next);
        link.prev = None;
        link.next = None;
        link.linked = false;
        match prev {
            Some(p) => Self::link_mut(p).next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => Self::link_mut(n).prev = prev,
            None => self.tail = prev,
        }
        self.len -= 1;
    }

    pub fn iter(&self) -> ListIter<P, S> {
        ListIter { cursor: self.head, _sel: PhantomData }
    }

    /// The node following `t` in this list, or `None` at the tail. `t` must
    /// currently be linked into *some* `List<P, S>` of this selector kind
    /// (not necessarily `self`, since the link fields are per-selector, not
    /// per-instance) for the result to mean anything.
    pub(crate) fn next_of(t: NonNull<Thread<P>>) -> Option<NonNull<Thread<P>>> {
        Self::link_mut(t).next
    }
}

impl<P: CpuPort> List<P, PendSel> {
    /// Like [`List::push_back`], but also records this list as the
    /// thread's current pend queue so [`remove_from_pend_queue`] (used by
    /// `thread_kill`) can find it again without the caller naming the
    /// specific semaphore/mutex/mailbox/join list involved.
    pub fn push_back_tracked(&mut self, t: NonNull<Thread<P>>) {
        self.push_back(t);
        unsafe { t.as_ref() }.pend_owner.set(self as *mut _);
    }

    pub fn pop_front_tracked(&mut self) -> Option<NonNull<Thread<P>>> {
        let t = self.pop_front()?;
        unsafe { t.as_ref() }.pend_owner.set(core::ptr::null_mut());
        Some(t)
    }

    /// Like [`List::remove`], but also clears `pend_owner`. Needed wherever
    /// a thread leaves a tracked pend queue some way other than being
    /// popped from the front — e.g. a timed wait removing itself after its
    /// own timeout fires.
    pub fn remove_tracked(&mut self, t: NonNull<Thread<P>>) {
        self.remove(t);
        unsafe { t.as_ref() }.pend_owner.set(core::ptr::null_mut());
    }
}

/// Remove `t` from whatever pend queue it is currently blocked on, if any.
/// Used by `thread_kill` to rescue a thread off a semaphore/mutex/mailbox/
/// join-waiter queue that the kernel has no other handle on.
pub(crate) fn remove_from_pend_queue<P: CpuPort>(t: NonNull<Thread<P>>) {
    let owner = unsafe { t.as_ref() }.pend_owner.get();
    if !owner.is_null() {
        unsafe { (*owner).remove(t) };
        unsafe { t.as_ref() }.pend_owner.set(core::ptr::null_mut());
    }
}

pub struct ListIter<P: CpuPort, S> {
    cursor: Option<NonNull<Thread<P>>>,
    _sel: PhantomData<S>,
}

impl<P: CpuPort, S: LinkSelector<P>> Iterator for ListIter<P, S> {
    type Item = NonNull<Thread<P>>;

    fn next(&mut self) -> Option<Self::Item> {
        let t = self.cursor?;
        self.cursor = List::<P, S>::link_mut(t).next;
        Some(t)
    }
}
