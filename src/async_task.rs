use std::{pin::Pin, task::Context};

use futures::future::BoxFuture;
use futures::Future;

/// A future polled with a noop waker from the single thread that owns it.
///
/// Completions are only ever observed through `data()`, so whoever holds the
/// task is the only writer of whatever the result feeds into.
pub struct AsyncTask<T>(BoxFuture<'static, T>);

impl<T> AsyncTask<T> {
    pub fn new(b: BoxFuture<'static, T>) -> Self {
        Self(b)
    }

    pub fn data(&mut self) -> Option<T> {
        let waker = std::task::Waker::noop();
        let mut cx = Context::from_waker(waker);
        match Pin::new(&mut self.0).poll(&mut cx) {
            std::task::Poll::Ready(r) => {
                #[cfg(debug_assertions)]
                {
                    self.0 = Box::pin(std::future::poll_fn(|_| {
                        panic!("The result of AsyncTask mustn't be used after it returned")
                    }));
                }
                Some(r)
            }
            std::task::Poll::Pending => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::FutureExt;

    use super::*;

    #[test]
    fn ready_future_resolves_on_first_poll() {
        let mut task = AsyncTask::new(async { 42 }.boxed());
        assert_eq!(task.data(), Some(42));
    }

    #[test]
    fn pending_future_stays_pending() {
        let (_tx, rx) = futures::channel::oneshot::channel::<u8>();
        let mut task = AsyncTask::new(async move { rx.await.ok() }.boxed());
        assert_eq!(task.data(), None);
    }
}
