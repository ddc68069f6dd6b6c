//! Process-wide catalog of live evaluator threads (SPEC_FULL §4.1).
//!
//! Grounded on the thread-local "current worker" pattern this pack's teacher uses
//! for its own per-OS-thread singleton (`src/main/core/worker.rs`'s
//! `std::thread_local! { static WORKER: ... }`), generalized from "one Worker per
//! OS thread, looked up lazily" to "one current EvalThread per OS thread, set
//! explicitly by the thread body protocol on start".

use std::collections::HashMap;
use std::sync::Arc;

use crate::gc::rc::RootedRc;
use crate::gc::root::Root;
use crate::gc::refcell::RootedRefCell;
use crate::gc::GcVisitor;
use crate::thread::{EvalThread, EvalThreadData, ThreadId, ThreadState};

std::thread_local! {
    // The EvalThread running on *this* OS thread, if any. Installed by the
    // thread body protocol (`EvalThread::run_thunk`) immediately on start, and
    // cleared when the thread body returns. `None` on any OS thread that was
    // never spawned by `EvalThread::start`.
    static CURRENT: std::cell::RefCell<Option<EvalThread>> = const { std::cell::RefCell::new(None) };
}

/// A catalog of live [`EvalThread`]s, plus the process-wide "current thread"
/// lookup. An embedding evaluator context owns one of these and creates it
/// explicitly (SPEC_FULL §9 "Global state") rather than relying on a
/// lazily-initialized global.
pub struct ThreadRegistry {
    root: Root,
    threads: RootedRefCell<HashMap<ThreadId, RootedRc<Arc<EvalThreadData>>>>,
}

impl Default for ThreadRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadRegistry {
    pub fn new() -> Self {
        let root = Root::new();
        let threads = RootedRefCell::new(&root, HashMap::new());
        Self { root, threads }
    }

    /// Register a freshly-started thread. Called by `EvalThread::start` before
    /// the OS thread is spawned.
    pub(crate) fn register(&self, data: &Arc<EvalThreadData>) {
        let guard = self.root.lock();
        let rc = RootedRc::new(&self.root, Arc::clone(data));
        self.threads.borrow_mut(&guard).insert(data.id(), rc);
    }

    /// Remove a terminated thread from the membership set. Called by the
    /// thread body protocol after publishing the result and waking joiners.
    pub(crate) fn unregister(&self, id: ThreadId) {
        let guard = self.root.lock();
        if let Some(rc) = self.threads.borrow_mut(&guard).remove(&id) {
            rc.safely_drop(&guard);
        }
    }

    /// Whether `id` is still a member of this registry (used for mutex
    /// abandonment lookups: a thread absent from the registry, or present but
    /// in the `Terminated` state, is a thread whose lock can be abandoned).
    pub(crate) fn contains(&self, id: ThreadId) -> bool {
        let guard = self.root.lock();
        self.threads.borrow(&guard).contains_key(&id)
    }

    /// The [`EvalThread`] running on the calling OS thread, or `None` if the
    /// calling OS thread was never started via [`EvalThread::start`].
    pub fn current() -> Option<EvalThread> {
        CURRENT.with(|c| c.borrow().clone())
    }

    /// Install `thread` as the current thread for the calling OS thread. Only
    /// ever called once, by the thread body protocol, immediately on entry.
    pub(crate) fn set_current(thread: EvalThread) {
        CURRENT.with(|c| *c.borrow_mut() = Some(thread));
    }

    /// Clear the current-thread slot. Called by the thread body protocol
    /// immediately before it returns.
    pub(crate) fn clear_current() {
        CURRENT.with(|c| *c.borrow_mut() = None);
    }

    /// Block the calling thread until `id`'s state is [`ThreadState::Terminated`].
    /// Used by the synchronous branch of `thread-terminate!`.
    pub fn wait_for_termination(&self, thread: &EvalThread) {
        // The thread's own join condvar already broadcasts exactly when the
        // state becomes Terminated (SPEC_FULL §4.4's "thread body protocol"),
        // so piggyback on the same join machinery used by `EvalThread::join`.
        let _ = thread.join_internal(None);
    }

    /// Hand the GC every live thread, so it can descend into each thread's
    /// evaluator stack, thunk, result slot, and pending references (SPEC_FULL
    /// §5 "GC interaction").
    pub fn enumerate_for_gc(&self, visitor: &mut dyn GcVisitor) {
        let guard = self.root.lock();
        for rc in self.threads.borrow(&guard).values() {
            rc.trace(visitor);
        }
    }

    /// Snapshot of live thread ids, for diagnostics and tests.
    pub fn live_thread_ids(&self) -> Vec<ThreadId> {
        let guard = self.root.lock();
        self.threads.borrow(&guard).keys().copied().collect()
    }
}
