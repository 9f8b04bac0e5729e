use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use apdulink_frame::Response;
use tokio::sync::oneshot;

use crate::error::{Result, SessionError};
use crate::queue::SubmissionId;

/// Pending result of one submitted command.
///
/// Resolves once the command has been answered or has failed. Dropping the
/// handle does not cancel the command; it still runs in its turn.
#[derive(Debug)]
#[must_use = "a response handle does nothing unless awaited"]
pub struct ResponseHandle {
    id: SubmissionId,
    rx: oneshot::Receiver<Result<Response>>,
}

impl ResponseHandle {
    pub(crate) fn new(id: SubmissionId) -> (Self, oneshot::Sender<Result<Response>>) {
        let (tx, rx) = oneshot::channel();
        (Self { id, rx }, tx)
    }

    /// A handle that is already resolved with `result`.
    pub(crate) fn settled(id: SubmissionId, result: Result<Response>) -> Self {
        let (handle, tx) = Self::new(id);
        let _ = tx.send(result);
        handle
    }

    pub fn id(&self) -> SubmissionId {
        self.id
    }
}

impl Future for ResponseHandle {
    type Output = Result<Response>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        // A dropped sender means the scheduler went away.
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|result| result.unwrap_or(Err(SessionError::Closed)))
    }
}
