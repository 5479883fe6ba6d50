//! Single-assignment completion handles for accepted work.
//!
//! A [`Completion`] is handed to the submitter; the matching [`Resolver`]
//! travels with the task onto a pool thread. The resolver writes the outcome
//! exactly once and wakes every blocked reader and every registered async
//! waker. Dropping an unresolved resolver resolves the handle with
//! [`WorkError::Cancelled`], so an accepted task can never leave its handle
//! pending forever.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};

use convoy_core::Converted;
use parking_lot::{Condvar, Mutex};

use crate::error::WorkError;

/// Terminal result of an accepted work item.
pub type Outcome = Result<Converted, WorkError>;

#[derive(Debug, Default)]
struct SlotState {
    outcome: Option<Outcome>,
    wakers: Vec<Waker>,
}

#[derive(Debug, Default)]
struct Slot {
    state: Mutex<SlotState>,
    ready: Condvar,
}

/// Creates a connected resolver/handle pair.
pub(crate) fn pair() -> (Resolver, Completion) {
    let slot = Arc::new(Slot::default());
    (
        Resolver {
            slot: Some(Arc::clone(&slot)),
        },
        Completion { slot },
    )
}

// ---------------------------------------------------------------------------
// Resolver
// ---------------------------------------------------------------------------

/// Write side of a completion handle. Consumed by [`Resolver::resolve`].
#[derive(Debug)]
pub(crate) struct Resolver {
    slot: Option<Arc<Slot>>,
}

impl Resolver {
    /// Stores the outcome and wakes all waiters.
    pub(crate) fn resolve(mut self, outcome: Outcome) {
        if let Some(slot) = self.slot.take() {
            settle(&slot, outcome);
        }
    }
}

impl Drop for Resolver {
    fn drop(&mut self) {
        if let Some(slot) = self.slot.take() {
            settle(&slot, Err(WorkError::Cancelled));
        }
    }
}

fn settle(slot: &Slot, outcome: Outcome) {
    let wakers = {
        let mut state = slot.state.lock();
        if state.outcome.is_some() {
            return;
        }
        state.outcome = Some(outcome);
        std::mem::take(&mut state.wakers)
    };
    slot.ready.notify_all();
    for waker in wakers {
        waker.wake();
    }
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Handle to the eventual outcome of one accepted work item.
///
/// Reads are idempotent: once resolved, every call to [`get`](Self::get),
/// [`try_get`](Self::try_get) or `.await` yields a clone of the same outcome.
/// Cloning the handle yields another reader of the same slot.
#[derive(Debug, Clone)]
pub struct Completion {
    slot: Arc<Slot>,
}

impl Completion {
    /// Returns `true` once the item has completed, failed, or been cancelled.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.slot.state.lock().outcome.is_some()
    }

    /// Returns the outcome if already resolved, without blocking.
    #[must_use]
    pub fn try_get(&self) -> Option<Outcome> {
        self.slot.state.lock().outcome.clone()
    }

    /// Blocks the calling thread until the outcome is available.
    ///
    /// Must not be called from inside an async runtime worker thread; await
    /// the handle there instead.
    ///
    /// # Errors
    ///
    /// Returns the [`WorkError`] the item failed with.
    pub fn get(&self) -> Outcome {
        let mut state = self.slot.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            self.slot.ready.wait(&mut state);
        }
    }

    /// Like [`get`](Self::get) but gives up after `timeout`, returning `None`.
    #[must_use]
    pub fn get_timeout(&self, timeout: Duration) -> Option<Outcome> {
        let deadline = Instant::now() + timeout;
        let mut state = self.slot.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return Some(outcome.clone());
            }
            if self
                .slot
                .ready
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return state.outcome.clone();
            }
        }
    }
}

impl Future for Completion {
    type Output = Outcome;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.slot.state.lock();
        if let Some(outcome) = &state.outcome {
            return Poll::Ready(outcome.clone());
        }
        if !state.wakers.iter().any(|w| w.will_wake(cx.waker())) {
            state.wakers.push(cx.waker().clone());
        }
        Poll::Pending
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::thread;

    use convoy_core::{TransformError, WorkItem};

    use super::*;

    fn converted(output: f64) -> Converted {
        Converted::new(WorkItem::celsius_to_fahrenheit(40.0), output)
    }

    #[test]
    fn pending_until_resolved() {
        let (resolver, completion) = pair();
        assert!(!completion.is_done());
        assert!(completion.try_get().is_none());

        resolver.resolve(Ok(converted(104.0)));

        assert!(completion.is_done());
        assert_eq!(completion.try_get(), Some(Ok(converted(104.0))));
    }

    #[test]
    fn reads_are_idempotent() {
        let (resolver, completion) = pair();
        resolver.resolve(Ok(converted(104.0)));

        let first = completion.get();
        let second = completion.get();
        let third = completion.clone().get();
        assert_eq!(first, second);
        assert_eq!(second, third);
    }

    #[test]
    fn dropped_resolver_cancels() {
        let (resolver, completion) = pair();
        drop(resolver);
        assert_eq!(completion.get(), Err(WorkError::Cancelled));
    }

    #[test]
    fn get_blocks_until_another_thread_resolves() {
        let (resolver, completion) = pair();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(Err(WorkError::Transform(TransformError::Status {
                status: 500,
            })));
        });

        let outcome = completion.get();
        assert_eq!(
            outcome,
            Err(WorkError::Transform(TransformError::Status { status: 500 }))
        );
        handle.join().unwrap();
    }

    #[test]
    fn get_timeout_expires_while_pending() {
        let (_resolver, completion) = pair();
        assert!(completion.get_timeout(Duration::from_millis(10)).is_none());
        assert!(!completion.is_done());
    }

    #[tokio::test]
    async fn awaiting_resolves_from_a_plain_thread() {
        let (resolver, completion) = pair();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            resolver.resolve(Ok(converted(104.0)));
        });

        let outcome = completion.clone().await;
        assert_eq!(outcome, Ok(converted(104.0)));
        // Awaiting again yields the same outcome.
        assert_eq!(completion.await, Ok(converted(104.0)));
        handle.join().unwrap();
    }
}
