//! Thin adapter exposing the Scheme-visible procedures of SPEC_FULL §6 as
//! plain Rust functions over this crate's native types. No teacher file
//! grounds this module directly — it exists purely so the arity and result
//! contracts of §6 have one obvious, testable Rust entry point apiece, ready
//! to be wired into a reader/compiler/VM that is out of scope here.

use std::sync::Arc;
use std::time::Duration;

use crate::condvar::ConditionVariable;
use crate::error::{ConcurrencyError, Result};
use crate::future::Future;
use crate::gc::Value;
use crate::mutex::{Mutex, MutexState};
use crate::registry::ThreadRegistry;
use crate::thread::{EvalThread, JoinOutcome, Thunk};

/// `(current-thread)`.
pub fn current_thread() -> Option<EvalThread> {
    ThreadRegistry::current()
}

/// `(make-thread thunk [name [tag]])`.
pub fn make_thread(thunk: Thunk, name: Option<Value>, tag: Option<Value>) -> EvalThread {
    EvalThread::new(thunk, name, tag)
}

/// `(thread-name t)`.
pub fn thread_name(t: &EvalThread) -> Option<Value> {
    t.name().cloned()
}

/// `(thread-tag t)`.
pub fn thread_tag(t: &EvalThread) -> Option<Value> {
    t.tag().cloned()
}

/// `(thread-start! t)`.
pub fn thread_start(t: &EvalThread, registry: &Arc<ThreadRegistry>) -> Result<()> {
    t.start(registry)
}

/// `(thread-yield! t)`. The source API accepts a thread argument but only
/// ever yields the calling OS thread; the argument is discarded here rather
/// than silently changed to a different arity (SPEC_FULL §9, resolved Open
/// Question on `thread-yield!`'s ignored argument).
pub fn thread_yield(_t: &EvalThread) {
    EvalThread::yield_now();
}

/// `(thread-sleep! seconds)`.
pub fn thread_sleep(seconds: f64) -> Result<()> {
    EvalThread::sleep(Duration::from_secs_f64(seconds.max(0.0)))
}

/// `(thread-terminate! t)`. Blocks on `wait-for-termination` unless `t` is
/// the calling thread (in which case this call never returns normally).
pub fn thread_terminate(t: &EvalThread, registry: &ThreadRegistry) {
    let target_os_thread = t.abort();
    if target_os_thread.is_some() {
        registry.wait_for_termination(t);
    }
}

/// `(thread-join! t [timeout [default]])`.
pub fn thread_join(t: &EvalThread, timeout: Option<f64>, default: Option<Value>) -> Result<Value> {
    if ThreadRegistry::current().is_none() {
        return Err(ConcurrencyError::ThreadJoinInInvalidContext);
    }
    t.join(timeout.map(Duration::from_secs_f64), default)
}

/// `(mutex? x)` is a host-language type test, not modeled here; `make-mutex`.
pub fn make_mutex(name: Option<Value>, tag: Option<Value>) -> Mutex {
    Mutex::new(name, tag)
}

pub fn mutex_name(m: &Mutex) -> Option<Value> {
    m.name().cloned()
}

pub fn mutex_tag(m: &Mutex) -> Option<Value> {
    m.tag().cloned()
}

/// `(mutex-state m)` — a symbol in `{not-abandoned, abandoned, not-owned}` or
/// the owning thread. Modeled here as [`MutexState`] rather than a Scheme
/// symbol/thread union, since symbol interning is an external collaborator.
pub fn mutex_state(m: &Mutex) -> MutexState {
    m.state()
}

/// `(mutex-lock! m [timeout [thread|#f]])`.
pub fn mutex_lock(
    m: &Mutex,
    timeout: Option<f64>,
    for_thread: Option<&EvalThread>,
) -> Result<bool> {
    if ThreadRegistry::current().is_none() {
        return Err(ConcurrencyError::MutexUseInInvalidContext);
    }
    m.lock(for_thread, timeout.map(Duration::from_secs_f64))
}

/// `(mutex-unlock! m [condvar [timeout]])`.
pub fn mutex_unlock(m: &Mutex, condvar: Option<&ConditionVariable>, timeout: Option<f64>) -> Result<bool> {
    let current = ThreadRegistry::current();
    if current.is_none() {
        return Err(ConcurrencyError::MutexUseInInvalidContext);
    }
    Ok(m.unlock(current.as_ref(), condvar, timeout.map(Duration::from_secs_f64)))
}

pub fn make_condition_variable(name: Option<Value>, tag: Option<Value>) -> ConditionVariable {
    ConditionVariable::new(name, tag)
}

pub fn condition_variable_name(cv: &ConditionVariable) -> Option<Value> {
    cv.name().cloned()
}

pub fn condition_variable_tag(cv: &ConditionVariable) -> Option<Value> {
    cv.tag().cloned()
}

/// `(condition-variable-signal! cv)`.
pub fn condition_variable_signal(cv: &ConditionVariable) {
    cv.signal();
}

/// `(condition-variable-broadcast! cv)`.
pub fn condition_variable_broadcast(cv: &ConditionVariable) {
    cv.broadcast();
}

/// `(join-timeout-exception? e)`.
pub fn join_timeout_exception(e: &ConcurrencyError) -> bool {
    matches!(e, ConcurrencyError::JoinTimeout(_))
}

/// `(abandoned-mutex-exception? e)`.
pub fn abandoned_mutex_exception(e: &ConcurrencyError) -> bool {
    matches!(e, ConcurrencyError::AbandonedMutex(_))
}

/// `(terminated-thread-exception? e)`.
pub fn terminated_thread_exception(e: &ConcurrencyError) -> bool {
    matches!(e, ConcurrencyError::ThreadTerminated(_))
}

/// `(uncaught-exception? e)`.
pub fn uncaught_exception(e: &ConcurrencyError) -> bool {
    matches!(e, ConcurrencyError::UncaughtException(_, _))
}

/// `(uncaught-exception-reason e)`.
pub fn uncaught_exception_reason(e: &ConcurrencyError) -> Result<Value> {
    match e {
        ConcurrencyError::UncaughtException(_, reason) => Ok(reason.clone()),
        _ => Err(ConcurrencyError::ExpectedUncaughtException),
    }
}

/// `(make-future thunk)`.
pub fn make_future(
    thunk: Box<dyn FnOnce() -> std::result::Result<Value, Value> + Send + 'static>,
    registry: &Arc<ThreadRegistry>,
) -> Result<Future> {
    Future::spawn(thunk, registry, None, None)
}

/// `(future expr…)` macro-expands to `(make-future (lambda () expr…))` — it
/// exists only to avoid writing the `lambda` by hand, not to add behavior.
/// This crate has no reader or macro-expander (that's the evaluator's job,
/// out of scope here — SPEC_FULL §1 Non-goals), so the form has nothing to
/// expand at this layer; the body a `(future expr…)` call site would close
/// over is already a `thunk` by the time it reaches this API, i.e. this
/// *is* the macro's expansion, identical to [`make_future`].
pub fn future(
    thunk: Box<dyn FnOnce() -> std::result::Result<Value, Value> + Send + 'static>,
    registry: &Arc<ThreadRegistry>,
) -> Result<Future> {
    make_future(thunk, registry)
}

/// `(make-evaluated-future v)` — a future that is already resolved to `v`.
pub fn make_evaluated_future(v: Value, registry: &Arc<ThreadRegistry>) -> Result<Future> {
    Future::spawn(Box::new(move || Ok(v)), registry, None, None)
}

/// `(make-failing-future v)` — a future that is already resolved to the
/// raised condition `v`.
pub fn make_failing_future(v: Value, registry: &Arc<ThreadRegistry>) -> Result<Future> {
    Future::spawn(Box::new(move || Err(v)), registry, None, None)
}

/// `(future-get f [timeout [default]])`.
pub fn future_get(f: &Future, timeout: Option<f64>, default: Option<Value>) -> Result<Value> {
    f.get(timeout.map(Duration::from_secs_f64), default)
}

/// `(future-done? f)`.
pub fn future_done(f: &Future) -> bool {
    f.is_done()
}

/// `(touch f)` — alias of the zero-timeout-argument blocking form.
pub fn touch(f: &Future) -> Result<Value> {
    f.get(None, None)
}

/// The thread-level [`JoinOutcome`] rendered as the §6 exception-predicate
/// surface would see it, for callers that already have a raw outcome (e.g.
/// `thread-terminate!`'s synchronous wait) rather than a `Result`.
pub fn join_outcome_is_timeout(outcome: &JoinOutcome) -> bool {
    matches!(outcome, JoinOutcome::TimedOut)
}
