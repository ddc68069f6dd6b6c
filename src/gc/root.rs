//! Root of a rooted object graph, carried over from this crate's object-graph
//! heritage and repurposed as the concurrency core's GC safepoint lock.
//!
//! The `ThreadRegistry`'s membership set (`crate::registry`) is the one place this
//! crate needs "every live EvalThread suspended at a safepoint" (SPEC_FULL §5): a
//! tracing collector that wants to enumerate live threads takes the same lock a
//! `register`/`unregister` call would take. `Root` is that lock.

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Mutex, MutexGuard,
};

use once_cell::sync::OnceCell;

/// Every root is assigned a Tag, which we ensure is globally unique.
/// Each Tag value uniquely identifies a Root.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Tag {
    prefix: TagPrefixType,
    suffix: TagSuffixType,
}

/// Larger sizes here reduce the chance of collision, which could lead to
/// silently missing bugs in some cases. Note though that there would both
/// have to be a collision, and the code would need to incorrectly try to
/// access data using the wrong root lock.
type TagPrefixType = u32;

/// Larger sizes here support a greater number of tags within a given prefix.
type TagSuffixType = u32;
type TagSuffixAtomicType = AtomicU32;

impl Tag {
    pub fn new() -> Self {
        // Every instance of this module uses a random prefix for tags, in case
        // multiple `Root`s end up live within the same process (e.g. one per
        // embedded evaluator context, per SPEC_FULL's "Global state" note).
        static TAG_PREFIX: OnceCell<TagPrefixType> = OnceCell::new();
        let prefix = *TAG_PREFIX.get_or_init(|| rand::prelude::random());

        static NEXT_TAG_SUFFIX: TagSuffixAtomicType = TagSuffixAtomicType::new(0);
        let suffix: TagSuffixType = NEXT_TAG_SUFFIX.fetch_add(1, Ordering::Relaxed);

        // Detect overflow
        assert!(suffix != TagSuffixType::MAX);

        Self { prefix, suffix }
    }
}

pub(crate) struct InnerRoot {
    pub(crate) tag: Tag,
}

/// Root of a registry's object graph. Holds a lock over the registry's
/// membership set and tracks which tag is locked by the current thread.
///
/// We only support a thread holding one `Root` of a given type at once. Crate
/// users should use a private type to avoid conflicts.
pub struct Root {
    root: Mutex<InnerRoot>,
    tag: Tag,
}

impl Default for Root {
    fn default() -> Self {
        Self::new()
    }
}

impl Root {
    pub fn new() -> Self {
        let tag = Tag::new();
        Self {
            root: std::sync::Mutex::new(InnerRoot { tag }),
            tag,
        }
    }

    pub fn lock(&self) -> RootGuard {
        let lock = self.root.lock().unwrap();
        RootGuard::new(lock)
    }

    /// This root's globally unique tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }
}

/// Wrapper around a `MutexGuard` that proves a particular `Root`'s lock is held.
pub struct RootGuard<'a> {
    pub guard: MutexGuard<'a, InnerRoot>,
}

impl<'a> RootGuard<'a> {
    fn new(guard: MutexGuard<'a, InnerRoot>) -> Self {
        Self { guard }
    }
}
