use std::cell::UnsafeCell;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, Waker};

use thiserror::Error;

use crate::owned::Owned;

/// Error returned when an upgrade cannot be granted.
///
/// An upgrade conflict is permanent for the lifetime of the control block:
/// retrying will deterministically fail again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum UpgradeError {
    /// Another handle already won the upgrade race for this control block.
    #[error("an upgrade is already being performed")]
    AlreadyInProgress,
}

// One-shot channel state shared between the promise half (held by the
// control block) and the future half (held by the winning upgrader).
//
// The protocol has a single writer and a single consumer:
// - fulfill() stores the value, then swaps is_signaled with Release.
// - poll observes is_signaled with Acquire before touching the value.
//
struct OneShotState<T> {
    is_signaled: AtomicBool,
    value: UnsafeCell<Option<T>>,
    waker: Mutex<Option<Waker>>,
}

// Safety: the value slot is written once by the fulfilling side before the
// Release swap and read once by the consuming side after an Acquire load,
// so no two threads access it unsynchronized.
unsafe impl<T: Send> Send for OneShotState<T> {}
unsafe impl<T: Send> Sync for OneShotState<T> {}

/// The promise half of the one-shot channel. Owned by the control block and
/// fulfilled exactly once, from its teardown path.
pub(crate) struct Promise<T> {
    state: Arc<OneShotState<T>>,
}

impl<T> Promise<T> {
    pub(crate) fn new() -> Self {
        Promise {
            state: Arc::new(OneShotState {
                is_signaled: AtomicBool::new(false),
                value: UnsafeCell::new(None),
                waker: Mutex::new(None),
            }),
        }
    }

    /// Hands out the future half. Called once, by the upgrade winner.
    pub(crate) fn subscribe(&self) -> Resolution<T> {
        Resolution {
            state: Arc::clone(&self.state),
        }
    }

    /// Delivers the value and wakes the subscriber, if it parked a waker.
    pub(crate) fn fulfill(&mut self, value: T) {
        // Safety: sole writer; the consumer does not read the slot until it
        // observes is_signaled below.
        unsafe {
            *self.state.value.get() = Some(value);
        }

        let was_signaled = self.state.is_signaled.swap(true, Ordering::Release);
        debug_assert!(!was_signaled, "one-shot promise fulfilled twice");

        if let Some(waker) = self.state.waker.lock().unwrap().take() {
            waker.wake();
        }
    }
}

/// The future half of the one-shot channel.
pub(crate) struct Resolution<T> {
    state: Arc<OneShotState<T>>,
}

impl<T> Resolution<T> {
    fn is_resolved(&self) -> bool {
        self.state.is_signaled.load(Ordering::Acquire)
    }

    // Safety precondition of the take: is_signaled was observed true with
    // Acquire, so the fulfilling write happens-before this read and the
    // promise side never touches the slot again.
    //
    fn take_value(&mut self) -> Option<T> {
        unsafe { (*self.state.value.get()).take() }
    }

    fn poll_take(&mut self, cx: &Context<'_>) -> Poll<Option<T>> {
        if self.is_resolved() {
            return Poll::Ready(self.take_value());
        }

        *self.state.waker.lock().unwrap() = Some(cx.waker().clone());

        // Re-check: fulfill() may have signaled between the load above and
        // the waker store, in which case nobody will wake us.
        //
        if self.is_resolved() {
            Poll::Ready(self.take_value())
        } else {
            Poll::Pending
        }
    }
}

enum UpgradeInner<T> {
    Resolved(Option<Result<Owned<T>, UpgradeError>>),
    Pending(Resolution<Owned<T>>),
}

/// The result of [`Shared::upgrade`](crate::Shared::upgrade).
///
/// Resolves to the exclusive [`Owned`] handle once every other holder has
/// released its reference, or immediately for the empty-handle and
/// conflict cases. Obtaining and holding an `Upgrade` never blocks; the
/// value is delivered by whichever thread drops the last `Shared` clone.
///
/// # Panics
///
/// Polling again after the future has returned `Poll::Ready` panics, as the
/// delivered value was already moved out.
pub struct Upgrade<T> {
    inner: UpgradeInner<T>,
}

// No field is structurally pinned; poll only moves the delivered value out.
impl<T> Unpin for Upgrade<T> {}

impl<T> Upgrade<T> {
    pub(crate) fn resolved(result: Result<Owned<T>, UpgradeError>) -> Self {
        Upgrade {
            inner: UpgradeInner::Resolved(Some(result)),
        }
    }

    pub(crate) fn pending(resolution: Resolution<Owned<T>>) -> Self {
        Upgrade {
            inner: UpgradeInner::Pending(resolution),
        }
    }

    /// True once polling would return `Poll::Ready`, without registering
    /// a waker.
    pub fn is_resolved(&self) -> bool {
        match &self.inner {
            UpgradeInner::Resolved(_) => true,
            UpgradeInner::Pending(resolution) => resolution.is_resolved(),
        }
    }
}

impl<T> Future for Upgrade<T> {
    type Output = Result<Owned<T>, UpgradeError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        match &mut this.inner {
            UpgradeInner::Resolved(result) => match result.take() {
                Some(result) => Poll::Ready(result),
                None => panic!("Upgrade polled after completion"),
            },
            UpgradeInner::Pending(resolution) => match resolution.poll_take(cx) {
                Poll::Ready(Some(owned)) => Poll::Ready(Ok(owned)),
                Poll::Ready(None) => panic!("Upgrade polled after completion"),
                Poll::Pending => Poll::Pending,
            },
        }
    }
}
