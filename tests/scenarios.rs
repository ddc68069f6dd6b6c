//! Black-box scenario tests against the public API (SPEC_FULL §8, scenarios
//! S1-S8). Kept outside `src/` as a behavioral integration suite, matching
//! this crate's convention of keeping cross-module tests separate from the
//! inline `#[cfg(test)]` unit tests next to each module.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lispkit_concurrency::gc::{GcVisitor, Traceable};
use lispkit_concurrency::{
    ConcurrencyError, ConditionVariable, EvalThread, Future, Mutex, MutexState, ThreadRegistry,
    Value,
};

#[derive(Debug)]
struct IntValue(i64);
impl Traceable for IntValue {
    fn trace(&self, _visitor: &mut dyn GcVisitor) {}
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
fn int_value(v: i64) -> Value {
    Arc::new(IntValue(v))
}
fn downcast(v: &Value) -> i64 {
    v.as_ref().as_any().downcast_ref::<IntValue>().unwrap().0
}

#[derive(Debug)]
struct SymbolValue(&'static str);
impl Traceable for SymbolValue {
    fn trace(&self, _visitor: &mut dyn GcVisitor) {}
    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

// S1 - basic join.
#[test]
fn s1_basic_join() {
    let registry = Arc::new(ThreadRegistry::new());
    let thread = EvalThread::new(Box::new(|| Ok(int_value(1 + 2))), None, None);
    thread.start(&registry).unwrap();
    let v = thread.join(None, None).unwrap();
    assert_eq!(downcast(&v), 3);
}

// S2 - uncaught exception surfaces as an uncaught-exception condition.
#[test]
fn s2_uncaught_exception() {
    let registry = Arc::new(ThreadRegistry::new());
    let thread = EvalThread::new(
        Box::new(|| Err(Arc::new(SymbolValue("boom")) as Value)),
        None,
        None,
    );
    thread.start(&registry).unwrap();
    let err = thread.join(None, None).unwrap_err();
    match err {
        ConcurrencyError::UncaughtException(_, reason) => {
            assert_eq!(
                reason.as_ref().as_any().downcast_ref::<SymbolValue>().unwrap().0,
                "boom"
            );
        }
        other => panic!("expected UncaughtException, got {other:?}"),
    }
}

// S3 - mutex handoff via a condition variable: a producer sets shared state
// and broadcasts; the consumer waits on the condvar until it observes the
// update.
#[test]
fn s3_mutex_handoff() {
    let registry = Arc::new(ThreadRegistry::new());
    let mutex = Arc::new(Mutex::new(None, None));
    let cv = Arc::new(ConditionVariable::new(None, None));
    let shared = Arc::new(std::sync::Mutex::new(None::<i64>));

    let mutex2 = Arc::clone(&mutex);
    let cv2 = Arc::clone(&cv);
    let shared2 = Arc::clone(&shared);
    let consumer = EvalThread::new(
        Box::new(move || {
            let current = ThreadRegistry::current();
            mutex2.lock(current.as_ref(), None).unwrap();
            loop {
                if shared2.lock().unwrap().is_some() {
                    break;
                }
                // `unlock` reacquires the mutex for `current` automatically
                // once woken, so no manual re-lock follows.
                mutex2.unlock(current.as_ref(), Some(&cv2), Some(Duration::from_secs(5)));
            }
            let v = shared2.lock().unwrap().unwrap();
            mutex2.unlock(current.as_ref(), None, None);
            Ok(int_value(v))
        }),
        None,
        None,
    );
    consumer.start(&registry).unwrap();

    // Give the consumer a head start so it's parked on the condvar before we
    // signal (a race here only delays the test, it never breaks correctness:
    // `mutex-lock!` simply spins until the producer releases the mutex).
    std::thread::sleep(Duration::from_millis(50));

    mutex.lock(None, None).unwrap();
    *shared.lock().unwrap() = Some(42);
    cv.broadcast();
    mutex.unlock(None, None, None);

    let v = consumer.join(Some(Duration::from_secs(5)), None).unwrap();
    assert_eq!(downcast(&v), 42);
}

// S4 - abandoned mutex.
#[test]
fn s4_abandoned_mutex() {
    let registry = Arc::new(ThreadRegistry::new());
    let mutex = Arc::new(Mutex::new(None, None));
    let mutex2 = Arc::clone(&mutex);
    let thread = EvalThread::new(
        Box::new(move || {
            mutex2.lock(ThreadRegistry::current().as_ref(), None).unwrap();
            Ok(int_value(0))
        }),
        None,
        None,
    );
    thread.start(&registry).unwrap();
    thread.join(None, None).unwrap();

    assert!(matches!(mutex.state(), MutexState::UnlockedAbandoned));
    let err = mutex.lock(None, None).unwrap_err();
    assert!(matches!(err, ConcurrencyError::AbandonedMutex(_)));
}

// S5 - future timeout with default.
#[test]
fn s5_future_timeout_with_default() {
    let registry = Arc::new(ThreadRegistry::new());
    let future = Future::spawn(
        Box::new(|| {
            std::thread::sleep(Duration::from_secs(5));
            Ok(Arc::new(SymbolValue("late")) as Value)
        }),
        &registry,
        None,
        None,
    )
    .unwrap();

    let v = future
        .get(
            Some(Duration::from_millis(10)),
            Some(Arc::new(SymbolValue("fallback")) as Value),
        )
        .unwrap();
    assert_eq!(
        v.as_ref().as_any().downcast_ref::<SymbolValue>().unwrap().0,
        "fallback"
    );
}

// S6 - a mutex can only be locked by one thread at a time; a contended
// acquisition blocks until release (exercising lock()'s timeout branch).
#[test]
fn s6_contended_lock_blocks_until_release() {
    let mutex = Arc::new(Mutex::new(None, None));
    mutex.lock(None, None).unwrap();

    let mutex2 = Arc::clone(&mutex);
    let acquired = Arc::new(AtomicBool::new(false));
    let acquired2 = Arc::clone(&acquired);
    let waiter = std::thread::spawn(move || {
        let ok = mutex2.lock(None, Some(Duration::from_secs(5))).unwrap();
        acquired2.store(true, Ordering::SeqCst);
        ok
    });

    std::thread::sleep(Duration::from_millis(50));
    assert!(!acquired.load(Ordering::SeqCst));
    mutex.release();

    assert!(waiter.join().unwrap());
    assert!(acquired.load(Ordering::SeqCst));
}

// S7 - timeout fidelity: a join with a short timeout and no competing event
// does not return before the requested duration has elapsed.
#[test]
fn s7_timeout_fidelity() {
    let registry = Arc::new(ThreadRegistry::new());
    let thread = EvalThread::new(
        Box::new(|| {
            std::thread::sleep(Duration::from_secs(5));
            Ok(int_value(0))
        }),
        None,
        None,
    );
    thread.start(&registry).unwrap();

    let requested = Duration::from_millis(100);
    let started = std::time::Instant::now();
    let err = thread.join(Some(requested), None).unwrap_err();
    assert!(matches!(err, ConcurrencyError::JoinTimeout(_)));
    assert!(started.elapsed() >= requested);
}

// S8 - abort at suspension: a thread looping over sleep terminates promptly
// after being asked to terminate.
#[test]
fn s8_abort_at_suspension() {
    let registry = Arc::new(ThreadRegistry::new());
    let thread = EvalThread::new(
        Box::new(|| loop {
            let _ = EvalThread::sleep(Duration::from_millis(20));
        }),
        None,
        None,
    );
    thread.start(&registry).unwrap();
    std::thread::sleep(Duration::from_millis(60));

    let started = std::time::Instant::now();
    thread.abort();
    let err = thread.join(Some(Duration::from_secs(2)), None).unwrap_err();
    assert!(matches!(err, ConcurrencyError::ThreadTerminated(_)));
    assert!(started.elapsed() < Duration::from_secs(1));
}
