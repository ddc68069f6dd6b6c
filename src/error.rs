//! Error taxonomy for the concurrency core (SPEC_FULL §7).
//!
//! Scheme code distinguishes these by *kind* via the exception predicates of
//! SPEC_FULL §6 (`join-timeout-exception?`, `abandoned-mutex-exception?`, ...),
//! so this is a real `enum`, not a string or an opaque `anyhow::Error` — callers
//! need to match on it.

use std::time::Duration;

use crate::gc::Value;
use crate::thread::ThreadId;

/// One of the error kinds a concurrency-core operation can raise.
#[derive(Debug, thiserror::Error)]
pub enum ConcurrencyError {
    /// `thread-join!` timed out with no default supplied.
    #[error("thread {0:?} did not terminate within the requested timeout")]
    JoinTimeout(ThreadId),

    /// A mutex was acquired whose previous owner terminated while holding it.
    #[error("mutex was abandoned by thread {0:?}, which terminated while holding it")]
    AbandonedMutex(ThreadId),

    /// Observed by a thread at a suspension point after `thread-terminate!`.
    #[error("thread {0:?} was terminated")]
    ThreadTerminated(ThreadId),

    /// A thread's thunk raised a condition that nothing in the thunk handled;
    /// surfaced (wrapped) at `thread-join!`.
    #[error("thread {0:?} exited with an uncaught exception")]
    UncaughtException(ThreadId, Value),

    /// Internal invariant violation: a future would be set a second time.
    #[error("attempted to set a future's value twice")]
    SettingFutureValueTwice,

    /// A thread/mutex/future operation was invoked with no current evaluator
    /// thread registered on the calling OS thread.
    #[error("operation requires a current evaluator thread, but none is registered")]
    MutexUseInInvalidContext,

    /// `thread-join!` was invoked outside a registered evaluator thread.
    #[error("thread-join! requires a current evaluator thread, but none is registered")]
    ThreadJoinInInvalidContext,

    /// `uncaught-exception-reason` was applied to a condition that isn't an
    /// uncaught-exception wrapper.
    #[error("expected an uncaught-exception condition")]
    ExpectedUncaughtException,

    /// `start()` called on a thread that is still fresh/runnable/running/terminating.
    #[error("thread {0:?} has already been started")]
    ThreadAlreadyStarted(ThreadId),

    /// `start()` called on a thread that has already run to completion.
    #[error("thread {0:?} has already terminated")]
    ThreadAlreadyTerminated(ThreadId),

    /// `future-get` with a timeout and no default, on expiry.
    #[error("future did not resolve within {0:?}")]
    FutureTimeout(Duration),
}

pub type Result<T> = std::result::Result<T, ConcurrencyError>;
