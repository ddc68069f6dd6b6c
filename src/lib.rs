// https://github.com/rust-lang/rfcs/blob/master/text/2585-unsafe-block-in-unsafe-fn.md
#![deny(unsafe_op_in_unsafe_fn)]

//! Thread, mutex, condition-variable and future primitives for a
//! multi-threaded Scheme evaluator core: thread lifecycle and join
//! semantics, an ownership- and abandonment-tracking mutex, a condition
//! variable, and a future built on top of them, plus the minimal interface
//! a tracing garbage collector needs from all of the above.
//!
//! The reader/parser, macro expander, bytecode compiler, virtual machine,
//! numeric tower, and library-loading mechanism of a host evaluator are
//! external collaborators and out of scope for this crate; see
//! [`scheme_api`] for the thin adapter layer where such a host would plug
//! in.

pub mod condvar;
pub mod error;
pub mod future;
pub mod gc;
pub mod mutex;
pub mod registry;
pub mod scheme_api;
pub mod thread;

pub use condvar::ConditionVariable;
pub use error::{ConcurrencyError, Result};
pub use future::Future;
pub use gc::{GcVisitor, Traceable, Value};
pub use mutex::{Mutex, MutexState};
pub use registry::ThreadRegistry;
pub use thread::{EvalThread, JoinOutcome, ThreadId, ThreadState, Thunk};