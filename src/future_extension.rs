use std::future::Future;
use std::pin::Pin;
use std::ptr;
use std::sync::Arc;
use std::task::{Context, Poll, RawWaker, RawWakerVTable, Wake, Waker};
use std::thread::{self, Thread};

/// Creates a waker that does nothing when woken.
pub fn noop_waker() -> Waker {
    static VTABLE: RawWakerVTable = RawWakerVTable::new(
        |_| RawWaker::new(ptr::null(), &VTABLE),
        |_| {},
        |_| {},
        |_| {},
    );
    unsafe { Waker::from_raw(RawWaker::new(ptr::null(), &VTABLE)) }
}

pub trait FutureExtension: Future {
    /// Gets a result from the future.
    /// This function will panic if the future returns `Poll::Pending`.
    ///
    fn unwrap_result(self) -> Self::Output;

    /// Gets a result from the future, parking the calling thread until the
    /// future resolves. The waker unparks this thread, so resolution driven
    /// by another thread (e.g. the thread dropping the last shared handle)
    /// is picked up without spinning.
    ///
    fn wait_result(self) -> Self::Output;
}

impl<F: Future> FutureExtension for F {
    fn unwrap_result(self) -> Self::Output {
        let waker = noop_waker();
        let mut cx = Context::from_waker(&waker);

        let mut future = self;

        // Pin the future on the stack
        let mut pinned = unsafe { Pin::new_unchecked(&mut future) };

        match pinned.as_mut().poll(&mut cx) {
            Poll::Ready(val) => val,
            Poll::Pending => panic!("expected completed future"),
        }
    }

    fn wait_result(self) -> Self::Output {
        struct ThreadWaker(Thread);

        impl Wake for ThreadWaker {
            fn wake(self: Arc<Self>) {
                self.0.unpark();
            }
        }

        let waker = Waker::from(Arc::new(ThreadWaker(thread::current())));
        let mut cx = Context::from_waker(&waker);

        let mut future = self;

        // Pin the future on the stack
        let mut pinned = unsafe { Pin::new_unchecked(&mut future) };

        loop {
            match pinned.as_mut().poll(&mut cx) {
                Poll::Ready(val) => return val,
                // A spurious unpark just loops back into poll.
                Poll::Pending => thread::park(),
            }
        }
    }
}
