//! The minimal interface the tracing garbage collector needs from the
//! concurrency core: root enumeration and reachability marking (SPEC_FULL §5).
//! The collector itself, and the object model it collects, are external
//! collaborators; this module only models the calls a live thread, mutex, or
//! future makes *into* the collector, plus the safepoint lock
//! (`root`/`rc`/`refcell`) that guards the registry's membership set while a
//! collection enumerates it.

/// Carried over nearly unchanged from this crate's object-graph heritage
/// (SPEC_FULL §10.4); public so the benches in `benches/` can exercise it
/// directly, the way this crate's own upstream benchmarked it, but not part
/// of the Scheme-facing surface in [`crate::scheme_api`].
pub mod rc;
pub mod refcell;
pub mod root;

use std::fmt;
use std::sync::Arc;

/// Anything the collector must be able to trace into: an opaque Scheme value
/// (or structure of them) reachable from a thread's thunk, result slot, or a
/// future's stored value. The core never inspects the contents of a `Value`;
/// it only ever hands the collector a reference to one via [`Traceable::trace`].
pub trait Traceable: fmt::Debug + Send + Sync {
    /// Visit every `Value` directly reachable from `self`. Implementations
    /// outside this crate (the evaluator's object model) are responsible for
    /// descending into their own structure; this core only calls `trace` on
    /// the handful of slots it owns (thunks, result slots, future cells).
    fn trace(&self, visitor: &mut dyn GcVisitor);

    /// Escape hatch back to a concrete type. `Any` is deliberately not a
    /// supertrait here (that would make every `Value` already `Any`-castable
    /// in ways that don't interact well with the `Debug` supertrait above);
    /// implementations simply return `self`.
    fn as_any(&self) -> &dyn std::any::Any;
}

/// A handle to an opaque Scheme value, as far as this core is concerned.
/// Threads, mutexes and futures move these around without interpreting them.
pub type Value = Arc<dyn Traceable>;

/// Callback the collector supplies to enumerate reachable values during
/// marking. `enumerate_for_gc` on [`crate::registry::ThreadRegistry`] and the
/// `trace`-like accessors on [`crate::thread::EvalThread`] and
/// [`crate::future::Future`] all funnel into one of these.
pub trait GcVisitor {
    /// Mark `value` as reachable and, if not already visited, recurse into it.
    fn visit_value(&mut self, value: &Value);
}

