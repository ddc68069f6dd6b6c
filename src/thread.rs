//! A Scheme-level thread wrapping an OS thread and an embedded evaluator
//! instance (SPEC_FULL §3/§4.4). Grounded on this pack's `src/main/host/thread.rs`
//! `Thread` wrapper (native handle + stable id + explicit lifecycle) and on
//! `src/main/core/worker.rs`'s "install self as current, run, tear down" body
//! protocol, generalized from "emulated Linux thread" to "Scheme evaluator
//! thread".

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use crate::error::{ConcurrencyError, Result};
use crate::gc::{GcVisitor, Value};
use crate::registry::ThreadRegistry;

static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identity of an [`EvalThread`], unique for the lifetime of the process.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ThreadId(u64);

impl ThreadId {
    fn next() -> Self {
        Self(NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// The thread's observable lifecycle state (SPEC_FULL §4.4 state machine).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ThreadState {
    Fresh,
    Runnable,
    Running,
    Terminating,
    Terminated,
}

impl ThreadState {
    fn to_u8(self) -> u8 {
        match self {
            ThreadState::Fresh => 0,
            ThreadState::Runnable => 1,
            ThreadState::Running => 2,
            ThreadState::Terminating => 3,
            ThreadState::Terminated => 4,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => ThreadState::Fresh,
            1 => ThreadState::Runnable,
            2 => ThreadState::Running,
            3 => ThreadState::Terminating,
            _ => ThreadState::Terminated,
        }
    }
}

/// The thunk a thread runs: a zero-argument procedure that either returns a
/// value normally or raises a condition. The evaluator itself is an external
/// collaborator (SPEC_FULL §1); this core only needs the thunk's *outcome*.
pub type Thunk = Box<dyn FnOnce() -> std::result::Result<Value, Value> + Send + 'static>;

/// What ended up in a thread's result slot (SPEC_FULL §3). Transitions
/// monotonically from absent to exactly one of these, once.
#[derive(Debug, Clone)]
pub(crate) enum ThreadResult {
    Normal(Value),
    Raised(Value),
    Terminated,
}

/// What a particular `join()` call observed. Distinct from [`ThreadResult`]:
/// a timeout is a property of the call that raced the slot, not of the thread
/// (SPEC_FULL §9, resolved Open Question on the fourth "join-timeout" slot
/// value — it is never written into the slot itself).
#[derive(Debug, Clone)]
pub enum JoinOutcome {
    Normal(Value),
    Raised(Value),
    Terminated,
    TimedOut,
}

/// Panic payload used to unwind a thread's thunk when its abort flag is
/// observed at a suspension point (SPEC_FULL §5 "Cancellation"). Caught only
/// by the thread body protocol in [`EvalThread::run_body`].
struct ThreadTerminatedSignal;

pub(crate) struct EvalThreadData {
    id: ThreadId,
    name: Option<Value>,
    tag: Option<Value>,
    thunk: Mutex<Option<Thunk>>,
    state: AtomicU32,
    abort_flag: AtomicBool,
    native: Mutex<Option<std::thread::JoinHandle<()>>>,
    native_tid: Mutex<Option<std::thread::ThreadId>>,
    result: Mutex<Option<ThreadResult>>,
    join_condvar: Condvar,
}

impl EvalThreadData {
    pub(crate) fn id(&self) -> ThreadId {
        self.id
    }

    pub(crate) fn state(&self) -> ThreadState {
        ThreadState::from_u8(self.state.load(Ordering::Acquire) as u8)
    }

    fn set_state(&self, state: ThreadState) {
        self.state.store(state.to_u8() as u32, Ordering::Release);
    }

    pub(crate) fn trace(&self, visitor: &mut dyn GcVisitor) {
        if let Some(name) = &self.name {
            visitor.visit_value(name);
        }
        if let Some(tag) = &self.tag {
            visitor.visit_value(tag);
        }
        if let Some(thunk_result) = self.result.lock().unwrap().as_ref() {
            match thunk_result {
                ThreadResult::Normal(v) | ThreadResult::Raised(v) => visitor.visit_value(v),
                ThreadResult::Terminated => {}
            }
        }
    }
}

impl std::fmt::Debug for EvalThreadData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvalThreadData")
            .field("id", &self.id)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// A Scheme-level thread (SPEC_FULL §3/§4.4). Cheap to clone: clones share the
/// same underlying thread, like the Scheme handles the spec describes as
/// "shared among the registry, the Scheme value that references it, and the
/// producer of its result".
#[derive(Clone, Debug)]
pub struct EvalThread {
    data: Arc<EvalThreadData>,
}

impl PartialEq for EvalThread {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}
impl Eq for EvalThread {}

impl EvalThread {
    /// Create a fresh thread object without an OS thread (SPEC_FULL §4.4 `new`).
    pub fn new(thunk: Thunk, name: Option<Value>, tag: Option<Value>) -> Self {
        let data = Arc::new(EvalThreadData {
            id: ThreadId::next(),
            name,
            tag,
            thunk: Mutex::new(Some(thunk)),
            state: AtomicU32::new(ThreadState::Fresh.to_u8() as u32),
            abort_flag: AtomicBool::new(false),
            native: Mutex::new(None),
            native_tid: Mutex::new(None),
            result: Mutex::new(None),
            join_condvar: Condvar::new(),
        });
        Self { data }
    }

    pub fn id(&self) -> ThreadId {
        self.data.id
    }

    pub fn name(&self) -> Option<&Value> {
        self.data.name.as_ref()
    }

    pub fn tag(&self) -> Option<&Value> {
        self.data.tag.as_ref()
    }

    pub fn state(&self) -> ThreadState {
        self.data.state()
    }

    pub(crate) fn data_arc(&self) -> &Arc<EvalThreadData> {
        &self.data
    }

    pub(crate) fn from_data_arc(data: Arc<EvalThreadData>) -> Self {
        Self { data }
    }

    /// A weak back-pointer to this thread, suitable for [`crate::mutex::Mutex`]'s
    /// `owner` field (SPEC_FULL §3 "Mutex's `owner` field is a weak reference").
    pub(crate) fn downgrade(&self) -> std::sync::Weak<EvalThreadData> {
        Arc::downgrade(&self.data)
    }

    /// Transition fresh → runnable and spawn the OS thread (SPEC_FULL §4.4 `start`).
    pub fn start(&self, registry: &Arc<ThreadRegistry>) -> Result<()> {
        match self.state() {
            ThreadState::Terminated => {
                return Err(ConcurrencyError::ThreadAlreadyTerminated(self.id()))
            }
            ThreadState::Fresh => {}
            _ => return Err(ConcurrencyError::ThreadAlreadyStarted(self.id())),
        }

        let thunk = self
            .data
            .thunk
            .lock()
            .unwrap()
            .take()
            .expect("fresh thread must still hold its thunk");

        self.data.set_state(ThreadState::Runnable);
        registry.register(&self.data);

        let this = self.clone();
        let registry = Arc::clone(registry);
        let handle = std::thread::Builder::new()
            .name(format!("eval-thread-{}", self.id().0))
            .spawn(move || this.run_body(thunk, &registry))
            .expect("failed to spawn OS thread");

        *self.data.native.lock().unwrap() = Some(handle);
        Ok(())
    }

    /// The thread body protocol: install as current, run the thunk, publish
    /// the outcome, wake joiners, unregister (SPEC_FULL §4.4).
    fn run_body(self, thunk: Thunk, registry: &Arc<ThreadRegistry>) {
        *self.data.native_tid.lock().unwrap() = Some(std::thread::current().id());
        self.data.set_state(ThreadState::Running);
        ThreadRegistry::set_current(self.clone());

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(thunk));

        let result = match outcome {
            Ok(Ok(value)) => ThreadResult::Normal(value),
            Ok(Err(condition)) => ThreadResult::Raised(condition),
            Err(payload) => {
                if payload.downcast_ref::<ThreadTerminatedSignal>().is_some() {
                    ThreadResult::Terminated
                } else {
                    // A genuine Rust panic inside the thunk is itself an
                    // uncaught condition from the evaluator's point of view,
                    // not a `thread-terminate!`-initiated wind-down.
                    std::panic::resume_unwind(payload);
                }
            }
        };

        self.data.set_state(ThreadState::Terminating);
        {
            let mut slot = self.data.result.lock().unwrap();
            *slot = Some(result);
        }
        self.data.set_state(ThreadState::Terminated);
        self.data.join_condvar.notify_all();

        ThreadRegistry::clear_current();
        registry.unregister(self.id());
    }

    /// Hint the OS to reschedule (SPEC_FULL §4.4 `yield`).
    pub fn yield_now() {
        std::thread::yield_now();
    }

    /// Suspend the calling thread for at least `duration`; cancellable by
    /// `abort` (SPEC_FULL §4.4 `sleep`, §5 suspension points).
    pub fn sleep(duration: Duration) -> Result<()> {
        let current = ThreadRegistry::current().ok_or(ConcurrencyError::MutexUseInInvalidContext)?;
        let deadline = Instant::now() + duration;
        loop {
            current.check_abort()?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(Duration::from_millis(50)));
        }
    }

    /// Check the abort flag; if set, unwind the calling (must be `self`)
    /// thread with a `thread-terminated` condition. Called at every
    /// suspension point this core owns.
    pub(crate) fn check_abort(&self) -> Result<()> {
        if self.data.abort_flag.load(Ordering::Acquire) {
            std::panic::panic_any(ThreadTerminatedSignal);
        }
        Ok(())
    }

    /// Set the abort flag (SPEC_FULL §4.4 `abort`). If `self` is not the
    /// calling thread, returns its OS thread id so the caller can wait for
    /// termination via [`ThreadRegistry::wait_for_termination`]. If `self`
    /// *is* the calling thread, raises a `thread-terminated` condition
    /// immediately, unwinding to the outermost evaluator frame, and never
    /// returns.
    pub fn abort(&self) -> Option<std::thread::ThreadId> {
        self.data.abort_flag.store(true, Ordering::SeqCst);
        let is_self = ThreadRegistry::current()
            .map(|c| c.id() == self.id())
            .unwrap_or(false);
        if is_self {
            std::panic::panic_any(ThreadTerminatedSignal);
        }
        *self.data.native_tid.lock().unwrap()
    }

    /// Block up to `timeout` until the result slot is populated, without
    /// converting the outcome. Used internally by [`ThreadRegistry::wait_for_termination`].
    pub(crate) fn join_internal(&self, timeout: Option<Duration>) -> JoinOutcome {
        let mut slot = self.data.result.lock().unwrap();
        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if let Some(result) = slot.as_ref() {
                return match result {
                    ThreadResult::Normal(v) => JoinOutcome::Normal(v.clone()),
                    ThreadResult::Raised(c) => JoinOutcome::Raised(c.clone()),
                    ThreadResult::Terminated => JoinOutcome::Terminated,
                };
            }
            match deadline {
                None => slot = self.data.join_condvar.wait(slot).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return JoinOutcome::TimedOut;
                    }
                    let (new_slot, timeout_result) = self
                        .data
                        .join_condvar
                        .wait_timeout(slot, deadline - now)
                        .unwrap();
                    slot = new_slot;
                    if timeout_result.timed_out() && slot.is_none() {
                        return JoinOutcome::TimedOut;
                    }
                }
            }
        }
    }

    /// Block up to `timeout` waiting for the thunk to finish, then apply the
    /// join semantics of SPEC_FULL §4.4: a normal return is returned as-is; a
    /// raised condition is wrapped as `uncaught-exception` and returned as an
    /// error; `terminated` raises `terminated-thread-exception`; a timeout
    /// either returns `default` or raises `join-timeout-exception`.
    pub fn join(&self, timeout: Option<Duration>, default: Option<Value>) -> Result<Value> {
        match self.join_internal(timeout) {
            JoinOutcome::Normal(v) => Ok(v),
            JoinOutcome::Raised(c) => Err(ConcurrencyError::UncaughtException(self.id(), c)),
            JoinOutcome::Terminated => Err(ConcurrencyError::ThreadTerminated(self.id())),
            JoinOutcome::TimedOut => match default {
                Some(v) => Ok(v),
                None => Err(ConcurrencyError::JoinTimeout(self.id())),
            },
        }
    }
}
