//! [`WorkFuture`]: the future-like handle `submit()` returns.

use std::future::Future;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use serde_json::Value;
use tokio::task::JoinHandle;

use offload_error::WorkError;
use offload_error::WorkResult;
use offload_protocol::RequestId;
use offload_pool::ResultRouter;

/// A handle to one in-flight (or already-resolved, in the fail-open inline
/// path) submission. Poll it directly with `.await`, or call
/// [`WorkFuture::cancel`] to give up on the result early.
pub struct WorkFuture {
    pub(crate) id: RequestId,
    pub(crate) router: Option<ResultRouter>,
    pub(crate) join: JoinHandle<WorkResult<Value>>,
}

impl WorkFuture {
    /// The request id this future is waiting on, for logging/correlation.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Abandon the result: removes the router entry (so a late frame from
    /// the worker is dropped rather than logged as "unknown request") and
    /// aborts the task driving the result pipe.
    pub async fn cancel(self) {
        if let Some(router) = &self.router {
            router.lock().await.remove(&self.id);
        }
        self.join.abort();
    }
}

impl Future for WorkFuture {
    type Output = WorkResult<Value>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.join).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(WorkError::internal("result task was aborted or panicked"))),
            Poll::Pending => Poll::Pending,
        }
    }
}
