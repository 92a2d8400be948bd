//! Handles to operations running in the background

use crate::error::{Error, Result};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A spawned engine operation.
///
/// Await the handle for the result. [`cancel`](Self::cancel) stops new part
/// and object work from being issued; work already in flight finishes and
/// the operation then resolves to [`Error::Cancelled`]. Dropping the handle
/// detaches the operation without cancelling it.
pub struct OperationHandle<T> {
    task: JoinHandle<Result<T>>,
    token: CancellationToken,
}

impl<T: Send + 'static> OperationHandle<T> {
    /// Spawn `operation` on the current tokio runtime
    pub(crate) fn spawn<F, Fut>(operation: F) -> Self
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
    {
        let token = CancellationToken::new();
        let task = tokio::spawn(operation(token.clone()));
        Self { task, token }
    }
}

impl<T> OperationHandle<T> {
    /// Request cancellation
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this operation, for wiring cancellation into
    /// other tasks or callbacks
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Block the current thread until the operation completes. Must not be
    /// called from inside an async context.
    pub fn wait(self) -> Result<T> {
        futures::executor::block_on(self)
    }
}

impl<T> Future for OperationHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.task).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(e)) if e.is_cancelled() => Poll::Ready(Err(Error::Cancelled)),
            Poll::Ready(Err(e)) => Poll::Ready(Err(Error::Join(e))),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> fmt::Debug for OperationHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperationHandle")
            .field("finished", &self.task.is_finished())
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_await_result() {
        let handle = OperationHandle::spawn(|_token| async { Ok(42) });
        assert_eq!(handle.await.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_cancel_is_observed() {
        let handle = OperationHandle::spawn(|token| async move {
            token.cancelled().await;
            Err::<(), _>(Error::Cancelled)
        });
        assert!(!handle.is_finished());
        handle.cancel();
        assert!(handle.is_cancelled());

        let result = tokio::time::timeout(Duration::from_secs(5), handle).await.unwrap();
        assert!(matches!(result, Err(Error::Cancelled)));
    }

    #[test]
    fn test_wait_outside_runtime() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let handle = runtime.block_on(async {
            OperationHandle::spawn(|_token| async { Ok::<_, Error>("done") })
        });
        assert_eq!(handle.wait().unwrap(), "done");
    }
}
