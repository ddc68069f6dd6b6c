//! A condition variable for coordinating [`crate::mutex::Mutex`] holders
//! (SPEC_FULL §4.3). Grounded on this pack's `src/main/host/ffi/condvar.rs`
//! pairing convention: a condition variable is inert on its own and only ever
//! does useful work alongside the mutex a thread currently holds.

use std::sync::{Condvar as StdCondvar, Mutex as StdMutex};
use std::time::{Duration, Instant};

use crate::gc::Value;
use crate::mutex::Mutex;

/// A condition variable (SPEC_FULL §4.3). Holds no state of its own beyond a
/// name/tag pair and the native primitives needed to park and wake threads;
/// all "what are we waiting for" logic lives in the Scheme code coordinating
/// through an associated [`Mutex`].
pub struct ConditionVariable {
    native_mutex: StdMutex<u64>,
    native_condvar: StdCondvar,
    name: Option<Value>,
    tag: Option<Value>,
}

impl ConditionVariable {
    pub fn new(name: Option<Value>, tag: Option<Value>) -> Self {
        Self {
            native_mutex: StdMutex::new(0),
            native_condvar: StdCondvar::new(),
            name,
            tag,
        }
    }

    pub fn name(&self) -> Option<&Value> {
        self.name.as_ref()
    }

    pub fn tag(&self) -> Option<&Value> {
        self.tag.as_ref()
    }

    /// Wake one waiter (SPEC_FULL §4.3 `signal!`).
    pub fn signal(&self) {
        let mut generation = self.native_mutex.lock().unwrap();
        *generation = generation.wrapping_add(1);
        self.native_condvar.notify_one();
    }

    /// Wake every waiter (SPEC_FULL §4.3 `broadcast!`).
    pub fn broadcast(&self) {
        let mut generation = self.native_mutex.lock().unwrap();
        *generation = generation.wrapping_add(1);
        self.native_condvar.notify_all();
    }

    /// Release `mutex`, then block until signalled, broadcast, or `timeout`
    /// elapses (SPEC_FULL §4.2 `unlock` with a condition variable argument).
    ///
    /// The release and the park are not a single atomic step — a signal sent
    /// between the release and the park is missed unless it lands after we've
    /// sampled `generation` below, matching the best-effort wakeup guarantee
    /// most SRFI-18 hosts provide rather than a hard atomicity guarantee.
    /// Returns `true` if woken by a signal/broadcast, `false` on timeout.
    pub(crate) fn wait_with_mutex(&self, mutex: &Mutex, timeout: Option<Duration>) -> bool {
        let mut generation = self.native_mutex.lock().unwrap();
        let observed = *generation;
        mutex.release();

        let deadline = timeout.map(|t| Instant::now() + t);
        loop {
            if *generation != observed {
                return true;
            }
            match deadline {
                None => generation = self.native_condvar.wait(generation).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (new_generation, timeout_result) = self
                        .native_condvar
                        .wait_timeout(generation, deadline - now)
                        .unwrap();
                    generation = new_generation;
                    if timeout_result.timed_out() && *generation == observed {
                        return false;
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for ConditionVariable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionVariable").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn signal_wakes_a_waiter() {
        let mutex = Arc::new(Mutex::new(None, None));
        let cv = Arc::new(ConditionVariable::new(None, None));
        mutex.lock(None, None).unwrap();

        let mutex2 = Arc::clone(&mutex);
        let cv2 = Arc::clone(&cv);
        let waiter = thread::spawn(move || {
            mutex2.lock(None, None).unwrap();
            cv2.wait_with_mutex(&mutex2, Some(Duration::from_secs(5)))
        });

        // Give the waiter a moment to park before signalling.
        thread::sleep(Duration::from_millis(50));
        cv.signal();
        assert!(waiter.join().unwrap());
    }

    #[test]
    fn wait_times_out_without_signal() {
        let mutex = Arc::new(Mutex::new(None, None));
        let cv = ConditionVariable::new(None, None);
        mutex.lock(None, None).unwrap();
        let woke = cv.wait_with_mutex(&mutex, Some(Duration::from_millis(20)));
        assert!(!woke);
    }
}
